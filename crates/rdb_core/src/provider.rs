use crate::dialect::SqlDialect;
use crate::error::DbError;
use crate::value::{DbType, Value};
use async_trait::async_trait;
use std::time::Duration;

/// Everything the core learns about the provider's own connection object,
/// queried once at detection time and cached on the dialect
/// (`Connection::data_source_info`).
#[derive(Debug, Clone)]
pub struct DataSourceInfo {
    pub product_name: String,
    pub product_version: String,
    pub parameter_marker_pattern: String,
    pub parameter_name_max_length: usize,
    pub supports_named_parameters: bool,
}

/// Direction of a bound parameter, mirroring ADO-style provider APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDirection {
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// A single row produced by a `DataReader`: one cell per column, in
/// column order.
pub type ProviderRow = Vec<Value>;

/// Provider-facing contract for constructing the other four contracts plus
/// an optional pooled data source. This is the only entry point a real
/// driver crate needs to implement; the core never constructs `Connection`,
/// `Command`, `Parameter` or `DataReader` values directly.
#[async_trait]
pub trait Factory: Send + Sync {
    async fn create_connection(&self, connection_string: &str) -> Result<Box<dyn Connection>, DbError>;

    fn create_command(&self) -> Box<dyn Command>;

    fn create_parameter(&self) -> Box<dyn Parameter>;

    fn create_connection_string_builder(&self) -> Box<dyn ConnectionStringBuilder>;

    /// Pooled handle, if the provider supports external pooling. Absent
    /// for embedded engines (SQLite, DuckDB, Firebird embedded).
    fn create_data_source(&self, _builder: &dyn ConnectionStringBuilder) -> Option<Box<dyn DataSource>> {
        None
    }
}

/// A raw provider connection. The core never holds this directly — it is
/// always wrapped by `TrackedConnection`, which adds prepared-shape
/// tracking and the pinned-mode lock handle.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn open(&mut self) -> Result<(), DbError>;

    async fn close(&mut self) -> Result<(), DbError>;

    fn is_open(&self) -> bool;

    async fn data_source_info(&self) -> Result<DataSourceInfo, DbError>;

    async fn begin_transaction(&self, isolation: Option<&str>) -> Result<(), DbError>;

    /// Execute a command with no expectation of a result set; returns rows
    /// affected.
    async fn execute_non_query(&self, command: &dyn Command) -> Result<u64, DbError>;

    async fn execute_scalar(&self, command: &dyn Command) -> Result<Option<Value>, DbError>;

    async fn execute_reader(&self, command: &dyn Command) -> Result<Box<dyn DataReader>, DbError>;

    async fn prepare(&self, command: &dyn Command) -> Result<(), DbError>;
}

/// A provider command: SQL text, parameters, and a configured timeout.
pub trait Command: Send + Sync {
    fn set_text(&mut self, text: &str);

    fn text(&self) -> &str;

    fn add_parameter(&mut self, parameter: Box<dyn Parameter>);

    fn parameters(&self) -> &[Box<dyn Parameter>];

    fn set_timeout(&mut self, timeout: Option<Duration>);
}

/// A forward-only row cursor produced by `Connection::execute_reader`.
#[async_trait]
pub trait DataReader: Send {
    fn field_count(&self) -> usize;

    fn get_name(&self, ordinal: usize) -> &str;

    fn get_field_type(&self, ordinal: usize) -> DbType;

    async fn read(&mut self) -> Result<bool, DbError>;

    fn get_value(&self, ordinal: usize) -> &Value;

    fn is_db_null(&self, ordinal: usize) -> bool {
        matches!(self.get_value(ordinal), Value::Null)
    }
}

/// A single bound parameter.
pub trait Parameter: Send + Sync {
    fn set_name(&mut self, name: &str);

    fn name(&self) -> &str;

    fn set_db_type(&mut self, db_type: DbType);

    fn db_type(&self) -> DbType;

    fn set_value(&mut self, value: Value);

    fn value(&self) -> &Value;

    fn set_direction(&mut self, direction: ParameterDirection);

    fn direction(&self) -> ParameterDirection;
}

/// Parses/builds a provider connection string. The core injects pooling
/// defaults (§4.2.1) and read-only knobs through this contract rather than
/// string-splicing provider-specific syntax itself.
pub trait ConnectionStringBuilder: Send + Sync {
    fn set(&mut self, key: &str, value: &str);

    fn get(&self, key: &str) -> Option<&str>;

    fn contains_key(&self, key: &str) -> bool;

    fn remove(&mut self, key: &str) -> bool;

    fn to_connection_string(&self) -> String;
}

/// Optional pooled connection source (e.g. a provider-native pool handle).
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn get_connection(&self) -> Result<Box<dyn Connection>, DbError>;
}

/// Bundles a dialect with the factory that produced it, as returned by
/// product detection — kept together because the dialect is only valid
/// for connections created by this exact factory.
pub struct ProviderBinding {
    pub factory: Box<dyn Factory>,
    pub dialect: &'static dyn SqlDialect,
}
