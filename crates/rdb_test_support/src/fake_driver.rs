use async_trait::async_trait;
use rdb_core::{
    Command, Connection, ConnectionStringBuilder, DataReader, DataSource, DataSourceInfo, DbError,
    DbType, Factory, Parameter, ParameterDirection, ProviderRow, Value,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Scripted reply for one SQL shape, keyed by rendered command text.
#[derive(Debug, Clone)]
pub enum FakeQueryOutcome {
    NonQuery(u64),
    Scalar(Option<Value>),
    Rows {
        columns: Vec<(String, DbType)>,
        rows: Vec<ProviderRow>,
    },
    Error(String),
}

impl FakeQueryOutcome {
    fn into_non_query(&self) -> Result<u64, DbError> {
        match self {
            Self::NonQuery(affected) => Ok(*affected),
            Self::Error(message) => Err(DbError::invalid_operation(message.clone())),
            other => Err(DbError::invalid_operation(format!(
                "fake driver: {other:?} is not a non-query outcome"
            ))),
        }
    }

    fn into_scalar(&self) -> Result<Option<Value>, DbError> {
        match self {
            Self::Scalar(value) => Ok(value.clone()),
            Self::Error(message) => Err(DbError::invalid_operation(message.clone())),
            other => Err(DbError::invalid_operation(format!(
                "fake driver: {other:?} is not a scalar outcome"
            ))),
        }
    }

    fn into_reader(&self) -> Result<Box<dyn DataReader>, DbError> {
        match self {
            Self::Rows { columns, rows } => Ok(Box::new(FakeDataReader::new(columns.clone(), rows.clone()))),
            Self::Error(message) => Err(DbError::invalid_operation(message.clone())),
            other => Err(DbError::invalid_operation(format!(
                "fake driver: {other:?} is not a rows outcome"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDriverStats {
    pub executed_commands: Vec<String>,
    pub prepared_shapes: Vec<String>,
    pub opened_connections: usize,
    pub closed_connections: usize,
}

#[derive(Default)]
struct FakeDriverState {
    outcomes: RwLock<HashMap<String, FakeQueryOutcome>>,
    default_non_query: RwLock<Option<u64>>,
    default_scalar: RwLock<Option<Value>>,
    executed_commands: Mutex<Vec<String>>,
    prepared_shapes: Mutex<Vec<String>>,
    opened_connections: AtomicUsize,
    closed_connections: AtomicUsize,
    connect_error: RwLock<Option<String>>,
    prepare_error: RwLock<Option<String>>,
}

/// An in-memory `Factory` that scripts per-SQL-text outcomes for tests,
/// in place of a real `dbflux_driver_*` crate talking to a live backend.
#[derive(Clone)]
pub struct FakeDriver {
    product_name: &'static str,
    product_version: String,
    state: Arc<FakeDriverState>,
}

impl FakeDriver {
    pub fn new(product_name: &'static str) -> Self {
        Self {
            product_name,
            product_version: "0.0.0-fake".to_string(),
            state: Arc::new(FakeDriverState::default()),
        }
    }

    pub fn with_product_version(mut self, version: impl Into<String>) -> Self {
        self.product_version = version.into();
        self
    }

    pub fn with_non_query_result(self, sql: impl Into<String>, rows_affected: u64) -> Self {
        rwlock_write(&self.state.outcomes).insert(sql.into(), FakeQueryOutcome::NonQuery(rows_affected));
        self
    }

    pub fn with_scalar_result(self, sql: impl Into<String>, value: Option<Value>) -> Self {
        rwlock_write(&self.state.outcomes).insert(sql.into(), FakeQueryOutcome::Scalar(value));
        self
    }

    pub fn with_rows_result(self, sql: impl Into<String>, columns: Vec<(String, DbType)>, rows: Vec<ProviderRow>) -> Self {
        rwlock_write(&self.state.outcomes).insert(sql.into(), FakeQueryOutcome::Rows { columns, rows });
        self
    }

    pub fn with_error(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        rwlock_write(&self.state.outcomes).insert(sql.into(), FakeQueryOutcome::Error(message.into()));
        self
    }

    /// Every unscripted non-query command (e.g. a session-settings preamble
    /// batch) reports this many affected rows instead of failing.
    pub fn with_default_non_query(self, rows_affected: u64) -> Self {
        *rwlock_write(&self.state.default_non_query) = Some(rows_affected);
        self
    }

    pub fn with_default_scalar(self, value: Value) -> Self {
        *rwlock_write(&self.state.default_scalar) = Some(value);
        self
    }

    pub fn with_connect_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.connect_error) = Some(message.into());
        self
    }

    pub fn with_prepare_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.prepare_error) = Some(message.into());
        self
    }

    pub fn set_query_outcome(&self, sql: impl Into<String>, outcome: FakeQueryOutcome) {
        rwlock_write(&self.state.outcomes).insert(sql.into(), outcome);
    }

    pub fn stats(&self) -> FakeDriverStats {
        FakeDriverStats {
            executed_commands: mutex_lock(&self.state.executed_commands).clone(),
            prepared_shapes: mutex_lock(&self.state.prepared_shapes).clone(),
            opened_connections: self.state.opened_connections.load(Ordering::Relaxed),
            closed_connections: self.state.closed_connections.load(Ordering::Relaxed),
        }
    }

    pub fn as_factory_box(self) -> Box<dyn Factory> {
        Box::new(self)
    }
}

#[async_trait]
impl Factory for FakeDriver {
    async fn create_connection(&self, _connection_string: &str) -> Result<Box<dyn Connection>, DbError> {
        if let Some(message) = rwlock_read(&self.state.connect_error).clone() {
            return Err(DbError::connection_failed("open", "writer", FakeConnectError(message)));
        }
        Ok(Box::new(FakeConnection::new(
            self.product_name,
            self.product_version.clone(),
            self.state.clone(),
        )))
    }

    fn create_command(&self) -> Box<dyn Command> {
        Box::new(FakeCommand::default())
    }

    fn create_parameter(&self) -> Box<dyn Parameter> {
        Box::new(FakeParameter::default())
    }

    fn create_connection_string_builder(&self) -> Box<dyn ConnectionStringBuilder> {
        Box::new(FakeConnectionStringBuilder::default())
    }

    fn create_data_source(&self, _builder: &dyn ConnectionStringBuilder) -> Option<Box<dyn DataSource>> {
        None
    }
}

#[derive(Debug)]
struct FakeConnectError(String);

impl std::fmt::Display for FakeConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FakeConnectError {}

struct FakeConnection {
    product_name: &'static str,
    product_version: String,
    state: Arc<FakeDriverState>,
    open: AtomicBool,
}

impl FakeConnection {
    fn new(product_name: &'static str, product_version: String, state: Arc<FakeDriverState>) -> Self {
        Self {
            product_name,
            product_version,
            state,
            open: AtomicBool::new(false),
        }
    }

    fn outcome_for(&self, text: &str) -> Option<FakeQueryOutcome> {
        mutex_lock(&self.state.executed_commands).push(text.to_string());
        rwlock_read(&self.state.outcomes).get(text).cloned()
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn open(&mut self) -> Result<(), DbError> {
        self.open.store(true, Ordering::Relaxed);
        self.state.opened_connections.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.open.store(false, Ordering::Relaxed);
        self.state.closed_connections.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    async fn data_source_info(&self) -> Result<DataSourceInfo, DbError> {
        Ok(DataSourceInfo {
            product_name: self.product_name.to_string(),
            product_version: self.product_version.clone(),
            parameter_marker_pattern: "?".to_string(),
            parameter_name_max_length: 128,
            supports_named_parameters: true,
        })
    }

    async fn begin_transaction(&self, _isolation: Option<&str>) -> Result<(), DbError> {
        Ok(())
    }

    async fn execute_non_query(&self, command: &dyn Command) -> Result<u64, DbError> {
        match self.outcome_for(command.text()) {
            Some(outcome) => outcome.into_non_query(),
            None => Ok(rwlock_read(&self.state.default_non_query).unwrap_or(0)),
        }
    }

    async fn execute_scalar(&self, command: &dyn Command) -> Result<Option<Value>, DbError> {
        match self.outcome_for(command.text()) {
            Some(outcome) => outcome.into_scalar(),
            None => Ok(rwlock_read(&self.state.default_scalar).clone()),
        }
    }

    async fn execute_reader(&self, command: &dyn Command) -> Result<Box<dyn DataReader>, DbError> {
        match self.outcome_for(command.text()) {
            Some(outcome) => outcome.into_reader(),
            None => Ok(Box::new(FakeDataReader::new(Vec::new(), Vec::new()))),
        }
    }

    async fn prepare(&self, command: &dyn Command) -> Result<(), DbError> {
        if let Some(message) = rwlock_read(&self.state.prepare_error).clone() {
            return Err(DbError::not_supported(message));
        }
        mutex_lock(&self.state.prepared_shapes).push(command.text().to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeCommand {
    text: String,
    parameters: Vec<Box<dyn Parameter>>,
    timeout: Option<Duration>,
}

impl Command for FakeCommand {
    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn add_parameter(&mut self, parameter: Box<dyn Parameter>) {
        self.parameters.push(parameter);
    }

    fn parameters(&self) -> &[Box<dyn Parameter>] {
        &self.parameters
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }
}

pub struct FakeParameter {
    name: String,
    db_type: DbType,
    value: Value,
    direction: ParameterDirection,
}

impl Default for FakeParameter {
    fn default() -> Self {
        Self {
            name: String::new(),
            db_type: DbType::String,
            value: Value::Null,
            direction: ParameterDirection::Input,
        }
    }
}

impl Parameter for FakeParameter {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_db_type(&mut self, db_type: DbType) {
        self.db_type = db_type;
    }

    fn db_type(&self) -> DbType {
        self.db_type
    }

    fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn set_direction(&mut self, direction: ParameterDirection) {
        self.direction = direction;
    }

    fn direction(&self) -> ParameterDirection {
        self.direction
    }
}

/// Ordered key/value connection-string stand-in; good enough for tests that
/// only ever round-trip through `Factory::create_connection_string_builder`.
#[derive(Default)]
pub struct FakeConnectionStringBuilder {
    order: Vec<String>,
    values: HashMap<String, String>,
}

impl ConnectionStringBuilder for FakeConnectionStringBuilder {
    fn set(&mut self, key: &str, value: &str) {
        if !self.values.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.values.insert(key.to_string(), value.to_string());
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> bool {
        self.order.retain(|k| k != key);
        self.values.remove(key).is_some()
    }

    fn to_connection_string(&self) -> String {
        self.order
            .iter()
            .map(|key| format!("{key}={}", self.values[key]))
            .collect::<Vec<_>>()
            .join(";")
    }
}

struct FakeDataReader {
    columns: Vec<(String, DbType)>,
    rows: Vec<ProviderRow>,
    index: Option<usize>,
}

impl FakeDataReader {
    fn new(columns: Vec<(String, DbType)>, rows: Vec<ProviderRow>) -> Self {
        Self { columns, rows, index: None }
    }

    fn current_row(&self) -> &ProviderRow {
        let index = self.index.expect("read() must return true before accessing a row");
        &self.rows[index]
    }
}

#[async_trait]
impl DataReader for FakeDataReader {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn get_name(&self, ordinal: usize) -> &str {
        &self.columns[ordinal].0
    }

    fn get_field_type(&self, ordinal: usize) -> DbType {
        self.columns[ordinal].1
    }

    async fn read(&mut self) -> Result<bool, DbError> {
        let next = self.index.map(|i| i + 1).unwrap_or(0);
        if next >= self.rows.len() {
            return Ok(false);
        }
        self.index = Some(next);
        Ok(true)
    }

    fn get_value(&self, ordinal: usize) -> &Value {
        &self.current_row()[ordinal]
    }
}

fn rwlock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn rwlock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
