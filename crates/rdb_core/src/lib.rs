#![allow(clippy::result_large_err)]

mod coercion;
mod connection_strategy;
mod connection_string;
mod context;
mod db_mode;
mod dialect;
mod dialects;
mod entity;
mod error;
mod gateway;
mod identifiers;
mod lock;
mod lru_cache;
mod metrics;
mod parameter_bag;
mod provider;
mod reader_plan;
mod session_settings;
mod sql_container;
mod stored_procedure;
mod tracked_connection;
mod transaction;
mod value;
mod version;

pub use coercion::{coerce_parameter_for_product, load_rows, LoadStats, MappingMode};
pub use connection_strategy::{
    ConnectionGuard, ConnectionHandle, ConnectionKind, ConnectionStrategy, OwnedConnectionGuard,
};
pub use connection_string::{apply_pooling_defaults, apply_read_only_suffix, KeyValueConnectionStringBuilder};
pub use context::{ContextConfig, DatabaseContext};
pub use db_mode::{coerce_mode, DbMode, ModeCoercion, Topology};
pub use dialect::{
    DbProduct, DialectCapabilities, KeyRetrievalPlan, PlaceholderStyle, SqlDialect, StandardDialect,
};
pub use dialects::{
    dialect_for_product, DuckDbDialect, FirebirdDialect, MySqlDialect, OracleDialect, PostgresDialect,
    SqlServerDialect, SqliteDialect,
};
pub use entity::{ColumnDescriptor, IdType, IdValue, TableDescriptor, TableDescriptorBuilder};
pub use error::DbError;
pub use gateway::TableGateway;
pub use identifiers::{ParameterName, QualifiedName};
pub use lock::{ConnectionLock, PinnedLock, PinnedLockGuard};
pub use lru_cache::LruCache;
pub use metrics::{CommandOutcome, Metrics, MetricsSnapshot, SubscriptionId};
pub use parameter_bag::{BoundParameter, ParameterBag, ParameterHandle};
pub use provider::{
    Command, Connection, ConnectionStringBuilder, DataReader, DataSource, DataSourceInfo, Factory,
    Parameter, ParameterDirection, ProviderBinding, ProviderRow,
};
pub use reader_plan::{build_reader_plan, Coercer, ReaderPlan, ReaderPlanCache};
pub use session_settings::{
    apply_read_only_application_name_suffix, apply_read_only_connection_string, session_settings_preamble,
};
pub use sql_container::SqlContainer;
pub use stored_procedure::{proc_wrapping_style, wrap_procedure_call, ProcWrappingStyle};
pub use tracked_connection::TrackedConnection;
pub use transaction::TransactionContext;
pub use value::{DbType, Value};
pub use version::{
    database_info_from_banner, parse_version_banner, version_probe_query, DatabaseInfo, SqlStandardLevel,
};

pub use chrono;
pub use uuid;
