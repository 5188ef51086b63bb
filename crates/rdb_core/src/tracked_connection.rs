use crate::dialect::{DialectCapabilities, SqlDialect};
use crate::lock::ConnectionLock;
use crate::lru_cache::LruCache;
use crate::provider::{Command, Connection, DataSourceInfo};
use crate::error::DbError;
use std::sync::atomic::{AtomicBool, Ordering};

const DEFAULT_PREPARED_SHAPE_CAPACITY: usize = 256;

/// Wraps a raw provider `Connection`, adding the per-connection local state
/// described in §2/§4.3.1: which SQL shapes have already been prepared, and
/// whether preparing has been given up on for this connection.
pub struct TrackedConnection {
    connection: Box<dyn Connection>,
    shapes: LruCache<String, ()>,
    prepare_disabled: AtomicBool,
    lock: ConnectionLock,
}

impl TrackedConnection {
    pub fn new(connection: Box<dyn Connection>, lock: ConnectionLock) -> Self {
        Self::with_shape_capacity(connection, lock, DEFAULT_PREPARED_SHAPE_CAPACITY)
    }

    pub fn with_shape_capacity(connection: Box<dyn Connection>, lock: ConnectionLock, capacity: usize) -> Self {
        Self {
            connection,
            shapes: LruCache::new(capacity),
            prepare_disabled: AtomicBool::new(false),
            lock,
        }
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> &mut (dyn Connection + 'static) {
        self.connection.as_mut()
    }

    pub fn lock(&self) -> &ConnectionLock {
        &self.lock
    }

    pub fn prepare_disabled(&self) -> bool {
        self.prepare_disabled.load(Ordering::Relaxed)
    }

    /// Set after a failed attempt to prepare; the container must not try
    /// preparing against this connection again.
    pub fn disable_prepare(&self) {
        self.prepare_disabled.store(true, Ordering::Relaxed);
    }

    /// Returns `(true, evicted_count)` the first time `shape` is marked on
    /// this connection, `(false, 0)` on every subsequent call for the same
    /// shape (until a `reset`).
    pub fn mark_shape_prepared(&self, shape: &str) -> (bool, usize) {
        if self.shapes.get(&shape.to_string()).is_some() {
            return (false, 0);
        }
        let evicted = self.shapes.insert(shape.to_string(), ());
        (true, evicted)
    }

    /// Clears the prepared-shape set but preserves `prepare_disabled`: a
    /// connection that has given up on preparing stays given up after a
    /// reset.
    pub fn reset(&self) {
        self.shapes.clear();
    }

    pub async fn data_source_info(&self) -> Result<DataSourceInfo, DbError> {
        self.connection.data_source_info().await
    }

    /// Implements §4.3 step 4: if `dialect` advertises prepared-statement
    /// support and this connection has not given up on preparing, prepare
    /// `command`'s shape (its rendered text) the first time it is seen and
    /// record it so later executions of the same shape skip straight to
    /// execution. A failed prepare attempt disables preparing on this
    /// connection for good rather than retrying on every call.
    ///
    /// Returns `Some(evicted_count)` when this call newly prepared the
    /// shape, so callers can feed `Metrics::statement_prepared` /
    /// `statement_evicted`; `None` on a cache hit, an unsupported dialect,
    /// or a failed prepare attempt.
    pub async fn maybe_prepare(&self, dialect: &dyn SqlDialect, command: &dyn Command) -> Option<usize> {
        if !dialect.capabilities().contains(DialectCapabilities::PREPARE_STATEMENTS) {
            return None;
        }
        if self.prepare_disabled() {
            return None;
        }
        let (is_new_shape, evicted) = self.mark_shape_prepared(command.text());
        if !is_new_shape {
            return None;
        }
        if self.connection.prepare(command).await.is_err() {
            self.disable_prepare();
            return None;
        }
        Some(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Command, DataReader};
    use crate::value::Value;
    use async_trait::async_trait;

    struct NoopConnection;

    #[async_trait]
    impl Connection for NoopConnection {
        async fn open(&mut self) -> Result<(), DbError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), DbError> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        async fn data_source_info(&self) -> Result<DataSourceInfo, DbError> {
            Ok(DataSourceInfo {
                product_name: "noop".to_string(),
                product_version: "0".to_string(),
                parameter_marker_pattern: "?".to_string(),
                parameter_name_max_length: 64,
                supports_named_parameters: false,
            })
        }

        async fn begin_transaction(&self, _isolation: Option<&str>) -> Result<(), DbError> {
            Ok(())
        }

        async fn execute_non_query(&self, _command: &dyn Command) -> Result<u64, DbError> {
            Ok(0)
        }

        async fn execute_scalar(&self, _command: &dyn Command) -> Result<Option<Value>, DbError> {
            Ok(None)
        }

        async fn execute_reader(&self, _command: &dyn Command) -> Result<Box<dyn DataReader>, DbError> {
            Err(DbError::not_supported("no reader in this fixture"))
        }

        async fn prepare(&self, _command: &dyn Command) -> Result<(), DbError> {
            Ok(())
        }
    }

    fn tracked() -> TrackedConnection {
        TrackedConnection::new(Box::new(NoopConnection), ConnectionLock::NoOp)
    }

    #[test]
    fn first_mark_succeeds_repeat_does_not() {
        let tc = tracked();
        assert_eq!(tc.mark_shape_prepared("SELECT 1"), (true, 0));
        assert_eq!(tc.mark_shape_prepared("SELECT 1"), (false, 0));
    }

    #[test]
    fn reset_clears_shapes_but_keeps_prepare_disabled() {
        let tc = tracked();
        tc.mark_shape_prepared("SELECT 1");
        tc.disable_prepare();

        tc.reset();

        assert_eq!(tc.mark_shape_prepared("SELECT 1"), (true, 0));
        assert!(tc.prepare_disabled());
    }
}
