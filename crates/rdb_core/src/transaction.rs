use crate::connection_strategy::OwnedConnectionGuard;
use crate::dialect::{DialectCapabilities, SqlDialect};
use crate::error::DbError;
use crate::metrics::Metrics;
use crate::provider::{Connection, Factory, ProviderRow};
use crate::sql_container::SqlContainer;
use crate::tracked_connection::TrackedConnection;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// Exclusive ownership of one connection for the duration of a
/// transaction. Holds the connection's `OwnedConnectionGuard` for its
/// entire lifetime rather than re-acquiring it per call, so concurrent
/// callers genuinely wait for the transaction to finish in pinned modes.
pub struct TransactionContext<'ctx> {
    guard: OwnedConnectionGuard,
    dialect: &'static dyn SqlDialect,
    factory: &'ctx dyn Factory,
    metrics: &'ctx Metrics,
    read_only: bool,
    state: TxState,
}

impl<'ctx> TransactionContext<'ctx> {
    pub(crate) fn new(
        guard: OwnedConnectionGuard,
        dialect: &'static dyn SqlDialect,
        factory: &'ctx dyn Factory,
        metrics: &'ctx Metrics,
        read_only: bool,
    ) -> Self {
        Self {
            guard,
            dialect,
            factory,
            metrics,
            read_only,
            state: TxState::Active,
        }
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.dialect
    }

    fn connection(&self) -> &dyn Connection {
        self.guard.connection()
    }

    fn tracked(&self) -> &TrackedConnection {
        &self.guard
    }

    fn assert_active(&self) -> Result<(), DbError> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::Committed => Err(DbError::invalid_operation("transaction has already been committed")),
            TxState::RolledBack => Err(DbError::invalid_operation("transaction has already been rolled back")),
        }
    }

    pub async fn execute_non_query(&self, container: &SqlContainer) -> Result<u64, DbError> {
        self.assert_active()?;
        container
            .execute_non_query(self.tracked(), self.dialect, self.factory, self.metrics, self.read_only)
            .await
    }

    pub async fn execute_scalar(&self, container: &SqlContainer) -> Result<Option<Value>, DbError> {
        self.assert_active()?;
        container
            .execute_scalar(self.tracked(), self.dialect, self.factory, self.metrics)
            .await
    }

    pub async fn execute_reader_single_row(&self, container: &SqlContainer) -> Result<Option<ProviderRow>, DbError> {
        self.assert_active()?;
        container
            .execute_reader_single_row(self.tracked(), self.dialect, self.factory, self.metrics)
            .await
    }

    /// `SAVEPOINT name`, gated on the dialect advertising savepoint
    /// support.
    pub async fn savepoint(&self, name: &str) -> Result<(), DbError> {
        self.assert_active()?;
        self.assert_savepoints_supported()?;
        self.run_raw(&format!("SAVEPOINT {name}")).await
    }

    pub async fn rollback_to_savepoint(&self, name: &str) -> Result<(), DbError> {
        self.assert_active()?;
        self.assert_savepoints_supported()?;
        self.run_raw(&format!("ROLLBACK TO SAVEPOINT {name}")).await
    }

    fn assert_savepoints_supported(&self) -> Result<(), DbError> {
        if !self.dialect.capabilities().contains(DialectCapabilities::SAVEPOINTS) {
            return Err(DbError::not_supported("this dialect does not support savepoints"));
        }
        Ok(())
    }

    async fn run_raw(&self, text: &str) -> Result<(), DbError> {
        let mut command = self.factory.create_command();
        command.set_text(text);
        self.connection().execute_non_query(command.as_ref()).await?;
        Ok(())
    }

    /// Commits the transaction. Fails with `InvalidOperation` on a second
    /// call, per §8's exactly-once commit/rollback invariant.
    pub async fn commit(&mut self) -> Result<(), DbError> {
        self.assert_active()?;
        self.run_raw("COMMIT").await?;
        self.state = TxState::Committed;
        self.metrics.transaction_ended();
        Ok(())
    }

    /// Rolls the transaction back. Fails with `InvalidOperation` on a
    /// second call, and on a transaction that has already committed.
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        self.assert_active()?;
        self.run_raw("ROLLBACK").await?;
        self.state = TxState::RolledBack;
        self.metrics.transaction_ended();
        Ok(())
    }
}

impl Drop for TransactionContext<'_> {
    /// A transaction dropped without an explicit `commit`/`rollback` is
    /// left to the connection's own fate (closing a connection with an
    /// open transaction rolls it back on every target backend). `Drop`
    /// cannot run async code, so this only logs — callers that need a
    /// best-effort rollback must call `rollback` explicitly before
    /// dropping.
    fn drop(&mut self) {
        if self.state == TxState::Active {
            log::warn!("transaction dropped without commit or rollback; relying on connection teardown to roll back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_strategy::ConnectionHandle;
    use crate::dialects::PostgresDialect;
    use crate::lock::ConnectionLock;
    use crate::metrics::Metrics;
    use crate::provider::Connection;
    use crate::sql_container::SqlContainer;
    use rdb_test_support::FakeDriver;

    #[test]
    fn savepoints_rejected_without_capability() {
        let dialect: &dyn SqlDialect = &PostgresDialect;
        assert!(dialect.capabilities().contains(DialectCapabilities::SAVEPOINTS));
    }

    async fn begin<'f>(
        factory: &'f dyn Factory,
        metrics: &'f Metrics,
        read_only: bool,
    ) -> TransactionContext<'f> {
        let mut connection = factory.create_connection("cs").await.unwrap();
        connection.open().await.unwrap();
        let tracked = TrackedConnection::new(connection, ConnectionLock::NoOp);
        let guard = ConnectionHandle::Owned(tracked).into_owned_guard().await;
        TransactionContext::new(guard, &PostgresDialect, factory, metrics, read_only)
    }

    #[tokio::test]
    async fn second_commit_is_rejected_as_invalid_operation() {
        let driver = FakeDriver::new("postgres").with_default_non_query(0);
        let factory = driver.as_factory_box();
        let metrics = Metrics::new();
        let mut tx = begin(factory.as_ref(), &metrics, false).await;

        tx.commit().await.unwrap();
        let result = tx.commit().await;
        assert!(matches!(result, Err(DbError::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn rollback_after_commit_is_rejected() {
        let driver = FakeDriver::new("postgres").with_default_non_query(0);
        let factory = driver.as_factory_box();
        let metrics = Metrics::new();
        let mut tx = begin(factory.as_ref(), &metrics, false).await;

        tx.commit().await.unwrap();
        let result = tx.rollback().await;
        assert!(matches!(result, Err(DbError::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn read_only_transaction_rejects_mutating_statements() {
        let driver = FakeDriver::new("postgres").with_default_non_query(0);
        let factory = driver.as_factory_box();
        let metrics = Metrics::new();
        let tx = begin(factory.as_ref(), &metrics, true).await;

        let mut container = SqlContainer::new();
        container.query("DELETE FROM widgets");
        let result = tx.execute_non_query(&container).await;
        assert!(matches!(result, Err(DbError::InvalidOperation(_))));
    }
}
