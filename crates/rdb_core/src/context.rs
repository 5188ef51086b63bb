use crate::connection_strategy::{ConnectionHandle, ConnectionKind, ConnectionStrategy};
use crate::db_mode::{coerce_mode, DbMode, ModeCoercion, Topology};
use crate::dialect::{DbProduct, SqlDialect};
use crate::error::DbError;
use crate::identifiers::ParameterName;
use crate::lock::ConnectionLock;
use crate::metrics::Metrics;
use crate::provider::{ConnectionStringBuilder, Factory, Parameter, ProviderBinding};
use crate::session_settings::session_settings_preamble;
use crate::sql_container::SqlContainer;
use crate::tracked_connection::TrackedConnection;
use crate::transaction::TransactionContext;
use crate::version::{database_info_from_banner, version_probe_query, DatabaseInfo};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};

/// Plain configuration struct, populated by the caller from whatever
/// configuration system its application uses — this crate never parses a
/// CLI flag or a file itself.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub connection_string: String,
    /// A dedicated read-replica connection string, if the caller has one.
    /// Absent, reads fall back to `connection_string` with the dialect's
    /// read-only session settings layered on top.
    pub read_only_connection_string: Option<String>,
    pub requested_mode: DbMode,
    pub topology: Topology,
    pub application_name: Option<String>,
    /// A context constructed with `read_only: true` never accepts a write
    /// connection (`assert_is_write_connection` always fails); used for
    /// reporting-only callers pointed at a replica.
    pub read_only: bool,
}

/// The portable entry point: one `DatabaseContext` per logical database,
/// constructed once and shared across the operations that use it. Owns the
/// resolved dialect, the chosen connection-lifecycle strategy, and the
/// shared `Metrics` collector.
pub struct DatabaseContext {
    factory: Box<dyn Factory>,
    dialect: &'static dyn SqlDialect,
    rw_connection_string: String,
    ro_connection_string: Option<String>,
    strategy: ConnectionStrategy,
    metrics: Metrics,
    database_info: DatabaseInfo,
    effective_mode: DbMode,
    mode_coercion: ModeCoercion,
    read_only: bool,
    disposed: AtomicBool,
}

impl DatabaseContext {
    /// Runs the full construction sequence: resolve the connection
    /// string(s), compute the effective mode, open (and, for pinned modes,
    /// retain) the initial connection, detect the product version, and
    /// apply the session-settings preamble. Fails eagerly — a
    /// `DatabaseContext` that exists has already proven it can reach the
    /// database.
    pub async fn new(config: ContextConfig, binding: ProviderBinding) -> Result<Self, DbError> {
        let ProviderBinding { factory, dialect } = binding;
        let product = dialect.product();

        let rw_connection_string = build_rw_connection_string(dialect, &config);
        let ro_connection_string = build_ro_connection_string(dialect, &config);

        let (effective_mode, mode_coercion) = coerce_mode(config.requested_mode, product, config.topology);
        log_mode_coercion(product, config.requested_mode, effective_mode, mode_coercion);

        let init_is_pinned = matches!(
            effective_mode,
            DbMode::KeepAlive | DbMode::SingleWriter | DbMode::SingleConnection
        );

        let mut init_connection = factory.create_connection(&rw_connection_string).await?;
        init_connection.open().await?;
        let database_info = detect_database_info(init_connection.as_ref(), product).await;

        apply_preamble(init_connection.as_ref(), factory.as_ref(), product, false).await?;

        let metrics = Metrics::new();
        metrics.connection_opened();

        let strategy = if init_is_pinned {
            ConnectionStrategy::pinned(
                effective_mode,
                TrackedConnection::new(init_connection, ConnectionLock::NoOp),
            )
        } else {
            // Standard mode never keeps a connection open between calls;
            // the initialization connection was only needed to prove
            // reachability and detect the product version.
            let _ = init_connection.close().await;
            metrics.connection_closed();
            ConnectionStrategy::standard()
        };

        Ok(Self {
            factory,
            dialect,
            rw_connection_string,
            ro_connection_string,
            strategy,
            metrics,
            database_info,
            effective_mode,
            mode_coercion,
            read_only: config.read_only,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.dialect
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn database_info(&self) -> &DatabaseInfo {
        &self.database_info
    }

    pub fn effective_mode(&self) -> DbMode {
        self.effective_mode
    }

    pub fn mode_coercion(&self) -> ModeCoercion {
        self.mode_coercion
    }

    pub fn create_sql_container(&self) -> SqlContainer {
        SqlContainer::new()
    }

    /// The reusable lock vended for this context's effective mode: a real
    /// `PinnedLock` in `KeepAlive`/`SingleWriter`/`SingleConnection`, a
    /// no-op in `Standard`, where there is no shared connection to
    /// serialize access to.
    pub fn lock(&self) -> &ConnectionLock {
        self.strategy.lock()
    }

    pub fn create_db_parameter(&self) -> Box<dyn Parameter> {
        self.factory.create_parameter()
    }

    /// Wraps `name` in the dialect's identifier-quoting syntax.
    pub fn wrap_object_name(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// Validates `base` as a bind-parameter name, per §3's `ParameterName`
    /// rules, falling back to a sanitized form (non-identifier characters
    /// replaced with `_`) rather than failing outright — the common case is
    /// a column name that is already a valid identifier.
    pub fn make_parameter_name(&self, base: &str) -> String {
        match ParameterName::new(base) {
            Ok(name) => name.as_str().to_string(),
            Err(_) => sanitize_parameter_name(base),
        }
    }

    /// A short random alphanumeric token, used for correlation-token
    /// generated-key plans and ad hoc savepoint names. Defaults to 12
    /// characters.
    pub fn generate_random_name(&self, len: Option<usize>) -> String {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let len = len.unwrap_or(12);
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    pub fn assert_is_read_connection(&self) -> Result<(), DbError> {
        Ok(())
    }

    pub fn assert_is_write_connection(&self) -> Result<(), DbError> {
        if self.read_only {
            return Err(DbError::not_supported(
                "this context was constructed read-only and cannot issue write connections",
            ));
        }
        Ok(())
    }

    fn assert_not_disposed(&self) -> Result<(), DbError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(DbError::ObjectDisposed);
        }
        Ok(())
    }

    /// Closes the pinned connection, if this context's mode retains one,
    /// and marks the context disposed. Idempotent: a second call is a
    /// no-op rather than an error.
    pub async fn dispose(&self) -> Result<(), DbError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(pinned) = self.strategy.pinned_connection() {
            let mut guard = pinned.lock().await;
            guard.connection_mut().close().await?;
            self.metrics.connection_closed();
        }
        Ok(())
    }

    /// Hands back a connection appropriate for `kind`: the pinned
    /// connection when the effective mode retains one for that kind (per
    /// `ConnectionStrategy::wants_pinned`), otherwise a freshly opened
    /// ephemeral connection with the matching session-settings preamble
    /// already applied.
    pub async fn get_connection(&self, kind: ConnectionKind) -> Result<ConnectionHandle, DbError> {
        self.assert_not_disposed()?;
        if kind == ConnectionKind::Write {
            self.assert_is_write_connection()?;
        }

        if self.strategy.wants_pinned(kind) {
            let pinned = self
                .strategy
                .pinned_connection()
                .expect("pinned mode always retains a pinned connection");
            return Ok(ConnectionHandle::Shared(pinned));
        }

        let tracked = self.open_ephemeral(kind).await?;
        Ok(ConnectionHandle::Owned(tracked))
    }

    async fn open_ephemeral(&self, kind: ConnectionKind) -> Result<TrackedConnection, DbError> {
        let read_only = kind == ConnectionKind::Read;
        let connection_string = match kind {
            ConnectionKind::Read => self.ro_connection_string.as_deref().unwrap_or(&self.rw_connection_string),
            ConnectionKind::Write => &self.rw_connection_string,
        };

        let mut connection = self.factory.create_connection(connection_string).await?;
        connection.open().await?;
        self.metrics.connection_opened();

        if let Err(err) = apply_preamble(connection.as_ref(), self.factory.as_ref(), self.dialect.product(), read_only).await {
            let _ = connection.close().await;
            self.metrics.connection_closed();
            return Err(err);
        }

        Ok(TrackedConnection::new(connection, ConnectionLock::NoOp))
    }

    /// Closes and releases an ephemeral connection. A `Shared` (pinned)
    /// handle is never actually closed here — disposing it is a no-op, and
    /// the open-connection counter is left untouched, matching §8's
    /// invariant that `close_and_dispose_connection(writer)` in a pinned
    /// mode does not decrement the count.
    pub async fn close_and_dispose_connection(&self, handle: ConnectionHandle) -> Result<(), DbError> {
        match handle {
            ConnectionHandle::Owned(mut tracked) => {
                tracked.connection_mut().close().await?;
                self.metrics.connection_closed();
                Ok(())
            }
            ConnectionHandle::Shared(_) => Ok(()),
        }
    }

    /// Begins a transaction against a connection appropriate for `kind`.
    /// Fails with `NotSupported` if `kind` is `Write` on a context that was
    /// constructed read-only (§4.1.3's "ReadOnly context + Write kind
    /// fails").
    pub async fn begin_transaction(
        &self,
        kind: ConnectionKind,
        isolation: Option<&str>,
    ) -> Result<TransactionContext<'_>, DbError> {
        self.assert_not_disposed()?;
        if kind == ConnectionKind::Write {
            self.assert_is_write_connection()?;
        }

        let handle = self.get_connection(kind).await?;
        let read_only = kind == ConnectionKind::Read;

        let guard = handle.into_owned_guard().await;

        if read_only {
            // The full read-only preamble is applied to this transaction's
            // connection before first use, per §9's open-question
            // resolution — not merely the read-only delta, since an
            // ephemeral connection handed to a read-only transaction may
            // not already carry the read-write preamble either.
            let preamble = session_settings_preamble(self.dialect.product(), true);
            if !preamble.is_empty() {
                run_batch(guard.connection(), self.factory.as_ref(), &preamble).await?;
            }
        }

        guard.connection().begin_transaction(isolation).await?;
        self.metrics.transaction_started();

        Ok(TransactionContext::new(guard, self.dialect, self.factory.as_ref(), &self.metrics, read_only))
    }
}

fn sanitize_parameter_name(base: &str) -> String {
    let mut out = String::with_capacity(base.len() + 1);
    let mut chars = base.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => out.push(c),
        Some(c) if c.is_ascii_digit() => {
            out.push('_');
            out.push(c);
        }
        _ => out.push('_'),
    }
    for c in chars {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

fn build_rw_connection_string(dialect: &dyn SqlDialect, config: &ContextConfig) -> String {
    let mut builder = crate::connection_string::KeyValueConnectionStringBuilder::parse(&config.connection_string);
    crate::connection_string::apply_pooling_defaults(dialect, is_single_connection(config), &mut builder);
    builder.to_connection_string()
}

fn build_ro_connection_string(dialect: &dyn SqlDialect, config: &ContextConfig) -> Option<String> {
    let source = config.read_only_connection_string.as_deref()?;
    let mut builder = crate::connection_string::KeyValueConnectionStringBuilder::parse(source);
    crate::connection_string::apply_pooling_defaults(dialect, is_single_connection(config), &mut builder);
    crate::session_settings::apply_read_only_connection_string(dialect.product(), is_file_based(source), &mut builder);
    if config.application_name.is_some() {
        crate::session_settings::apply_read_only_application_name_suffix(dialect.product(), &mut builder);
    }
    Some(builder.to_connection_string())
}

fn is_single_connection(config: &ContextConfig) -> bool {
    matches!(config.requested_mode, DbMode::SingleConnection)
}

fn is_file_based(connection_string: &str) -> bool {
    connection_string != ":memory:" && !connection_string.eq_ignore_ascii_case("memory")
}

fn log_mode_coercion(product: DbProduct, requested: DbMode, effective: DbMode, coercion: ModeCoercion) {
    match coercion {
        ModeCoercion::Unchanged => {}
        ModeCoercion::AutoSelected => {
            log::info!(
                "DbMode auto-selection: product={product:?} requested={requested:?} effective={effective:?}"
            );
        }
        ModeCoercion::Overridden => {
            log::warn!(
                "DbMode override: product={product:?} requested={requested:?} effective={effective:?}"
            );
        }
    }
}

async fn detect_database_info(connection: &dyn crate::provider::Connection, product: DbProduct) -> DatabaseInfo {
    let probe = version_probe_query(product);
    let command = NoOpCommandText(probe.to_string());
    match connection.execute_scalar(&command).await {
        Ok(Some(value)) => database_info_from_banner(product, &value.as_display_string()),
        _ => DatabaseInfo::default(),
    }
}

/// Minimal `Command` used only for the read-only version probe, which
/// never needs bound parameters or a custom timeout.
struct NoOpCommandText(String);

impl crate::provider::Command for NoOpCommandText {
    fn set_text(&mut self, text: &str) {
        self.0 = text.to_string();
    }

    fn text(&self) -> &str {
        &self.0
    }

    fn add_parameter(&mut self, _parameter: Box<dyn Parameter>) {}

    fn parameters(&self) -> &[Box<dyn Parameter>] {
        &[]
    }

    fn set_timeout(&mut self, _timeout: Option<std::time::Duration>) {}
}

async fn apply_preamble(
    connection: &dyn crate::provider::Connection,
    factory: &dyn Factory,
    product: DbProduct,
    read_only: bool,
) -> Result<(), DbError> {
    let preamble = session_settings_preamble(product, read_only);
    if preamble.is_empty() {
        return Ok(());
    }
    run_batch(connection, factory, &preamble).await
}

async fn run_batch(connection: &dyn crate::provider::Connection, factory: &dyn Factory, text: &str) -> Result<(), DbError> {
    let mut command = factory.create_command();
    command.set_text(text);
    connection.execute_non_query(command.as_ref()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialects::{DuckDbDialect, PostgresDialect, SqliteDialect};
    use rdb_test_support::FakeDriver;

    #[test]
    fn sanitize_parameter_name_replaces_invalid_leading_digit() {
        assert_eq!(sanitize_parameter_name("1id"), "_1id");
    }

    #[test]
    fn sanitize_parameter_name_replaces_invalid_interior_characters() {
        assert_eq!(sanitize_parameter_name("user-id"), "user_id");
    }

    #[test]
    fn is_file_based_treats_memory_marker_as_not_file_based() {
        assert!(!is_file_based(":memory:"));
        assert!(is_file_based("/var/db/app.sqlite"));
    }

    fn config(mode: DbMode) -> ContextConfig {
        ContextConfig {
            connection_string: "host=localhost".to_string(),
            read_only_connection_string: None,
            requested_mode: mode,
            topology: Topology::default(),
            application_name: Some("tests".to_string()),
            read_only: false,
        }
    }

    #[tokio::test]
    async fn new_in_standard_mode_opens_and_then_closes_the_init_connection() {
        let driver = FakeDriver::new("postgres").with_default_non_query(0);
        let binding = ProviderBinding {
            factory: driver.clone().as_factory_box(),
            dialect: &PostgresDialect,
        };

        let ctx = DatabaseContext::new(config(DbMode::Standard), binding).await.unwrap();

        assert_eq!(ctx.effective_mode(), DbMode::Standard);
        let stats = driver.stats();
        assert_eq!(stats.opened_connections, 1);
        assert_eq!(stats.closed_connections, 1);
        assert_eq!(ctx.metrics().snapshot().connections_current, 0);
    }

    #[tokio::test]
    async fn single_connection_mode_hands_back_the_same_pinned_connection_for_read_and_write() {
        let driver = FakeDriver::new("sqlite").with_default_non_query(0);
        let binding = ProviderBinding {
            factory: driver.clone().as_factory_box(),
            dialect: &SqliteDialect,
        };
        let topology = Topology {
            is_memory_isolated: true,
            ..Default::default()
        };
        let mut cfg = config(DbMode::Best);
        cfg.topology = topology;

        let ctx = DatabaseContext::new(cfg, binding).await.unwrap();
        assert_eq!(ctx.effective_mode(), DbMode::SingleConnection);

        let read_handle = ctx.get_connection(ConnectionKind::Read).await.unwrap();
        let write_handle = ctx.get_connection(ConnectionKind::Write).await.unwrap();
        assert!(read_handle.points_at_same_connection(&write_handle));

        // The init connection stays open for the whole context lifetime.
        assert_eq!(driver.stats().opened_connections, 1);
    }

    #[tokio::test]
    async fn single_writer_mode_pins_writes_but_reads_stay_ephemeral() {
        let driver = FakeDriver::new("duckdb").with_default_non_query(0);
        let binding = ProviderBinding {
            factory: driver.clone().as_factory_box(),
            dialect: &DuckDbDialect,
        };

        let ctx = DatabaseContext::new(config(DbMode::Best), binding).await.unwrap();
        assert_eq!(ctx.effective_mode(), DbMode::SingleWriter);

        let write_a = ctx.get_connection(ConnectionKind::Write).await.unwrap();
        let write_b = ctx.get_connection(ConnectionKind::Write).await.unwrap();
        assert!(write_a.points_at_same_connection(&write_b));

        let read_a = ctx.get_connection(ConnectionKind::Read).await.unwrap();
        let read_b = ctx.get_connection(ConnectionKind::Read).await.unwrap();
        assert!(!read_a.points_at_same_connection(&read_b));
        assert!(!matches!(read_a, ConnectionHandle::Shared(_)));

        // One init connection (pinned writer) plus one ephemeral connection per read.
        assert_eq!(driver.stats().opened_connections, 3);
    }

    #[tokio::test]
    async fn read_only_context_rejects_write_connections() {
        let driver = FakeDriver::new("postgres").with_default_non_query(0);
        let binding = ProviderBinding {
            factory: driver.clone().as_factory_box(),
            dialect: &PostgresDialect,
        };
        let mut cfg = config(DbMode::Standard);
        cfg.read_only = true;

        let ctx = DatabaseContext::new(cfg, binding).await.unwrap();

        let result = ctx.get_connection(ConnectionKind::Write).await;
        assert!(matches!(result, Err(DbError::NotSupported(_))));
    }

    #[tokio::test]
    async fn begin_transaction_applies_read_only_preamble_and_commits_once() {
        let driver = FakeDriver::new("postgres").with_default_non_query(0);
        let binding = ProviderBinding {
            factory: driver.clone().as_factory_box(),
            dialect: &PostgresDialect,
        };

        let ctx = DatabaseContext::new(config(DbMode::Standard), binding).await.unwrap();
        let mut tx = ctx.begin_transaction(ConnectionKind::Read, None).await.unwrap();
        assert!(tx.read_only());

        tx.commit().await.unwrap();
        let second_commit = tx.commit().await;
        assert!(matches!(second_commit, Err(DbError::InvalidOperation(_))));

        assert_eq!(ctx.metrics().snapshot().transactions_active, 0);
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_closes_pinned_connection() {
        let driver = FakeDriver::new("sqlite").with_default_non_query(0);
        let binding = ProviderBinding {
            factory: driver.clone().as_factory_box(),
            dialect: &SqliteDialect,
        };
        let topology = Topology {
            is_memory_isolated: true,
            ..Default::default()
        };
        let mut cfg = config(DbMode::Best);
        cfg.topology = topology;

        let ctx = DatabaseContext::new(cfg, binding).await.unwrap();
        ctx.dispose().await.unwrap();
        ctx.dispose().await.unwrap();

        assert_eq!(driver.stats().closed_connections, 1);
        assert!(matches!(
            ctx.get_connection(ConnectionKind::Read).await,
            Err(DbError::ObjectDisposed)
        ));
    }
}
