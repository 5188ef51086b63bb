use crate::dialect::SqlDialect;
use crate::error::DbError;
use crate::metrics::{CommandOutcome, Metrics};
use crate::parameter_bag::{ParameterBag, ParameterHandle};
use crate::provider::{Command, DataReader, Factory, ParameterDirection, ProviderRow};
use crate::tracked_connection::TrackedConnection;
use crate::value::{DbType, Value};
use std::time::Instant;

const NEUTRAL_QUOTE_OPEN: &str = "{Q}";
const NEUTRAL_QUOTE_CLOSE: &str = "{q}";
const NEUTRAL_PARAMETER_PREFIX: &str = "{S}";

/// A dialect-neutral, append-only SQL buffer. Identifiers are written as
/// `{Q}name{q}` and parameter references as `{S}name`; `render` resolves
/// both against a concrete `SqlDialect` at execution time, so the same
/// container can be built once and rendered for any provider.
#[derive(Debug, Clone, Default)]
pub struct SqlContainer {
    buffer: String,
    parameters: ParameterBag,
    has_where_appended: bool,
}

impl SqlContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw SQL text (which may contain neutral tokens) to the
    /// buffer. Writing is append-only; use `clear` to start over.
    pub fn query(&mut self, text: &str) -> &mut Self {
        self.buffer.push_str(text);
        self
    }

    /// Appends a quoted identifier reference as a neutral token.
    pub fn quoted_identifier(&mut self, name: &str) -> &mut Self {
        self.buffer.push_str(NEUTRAL_QUOTE_OPEN);
        self.buffer.push_str(name);
        self.buffer.push_str(NEUTRAL_QUOTE_CLOSE);
        self
    }

    /// Appends a parameter-marker reference as a neutral token. The caller
    /// must separately bind the value via `add_parameter_with_value` using
    /// the same name.
    pub fn parameter_reference(&mut self, name: &str) -> &mut Self {
        self.buffer.push_str(NEUTRAL_PARAMETER_PREFIX);
        self.buffer.push_str(name);
        self
    }

    pub fn add_parameter_with_value(
        &mut self,
        name: Option<&str>,
        db_type: DbType,
        value: Value,
    ) -> ParameterHandle {
        self.parameters
            .add_parameter_with_value(name, db_type, value, ParameterDirection::Input)
    }

    /// Same as `add_parameter_with_value`, but an auto-allocated name uses
    /// `prefix` (e.g. `w` for a `WHERE … IN` list, `k` for a composite
    /// primary-key lookup) instead of the generic `p`.
    pub fn add_parameter_with_value_prefixed(
        &mut self,
        name: Option<&str>,
        db_type: DbType,
        value: Value,
        prefix: &str,
    ) -> ParameterHandle {
        self.parameters
            .add_parameter_with_value_prefixed(name, db_type, value, ParameterDirection::Input, prefix)
    }

    pub fn has_where_appended(&self) -> bool {
        self.has_where_appended
    }

    /// Marks a `WHERE` clause as already appended, for callers that write
    /// their own predicate text directly via `query` instead of going
    /// through `append_where`.
    pub(crate) fn mark_where_appended(&mut self) {
        self.has_where_appended = true;
    }

    /// Appends `WHERE` on the first call and `AND` on every subsequent call,
    /// tracking state in `has_where_appended`.
    pub fn append_where(&mut self, predicate: &str) -> &mut Self {
        if self.has_where_appended {
            self.buffer.push_str(" AND ");
        } else {
            self.buffer.push_str(" WHERE ");
            self.has_where_appended = true;
        }
        self.buffer.push_str(predicate);
        self
    }

    /// Resets the buffer, the parameter bag, and `has_where_appended`.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.parameters.clear();
        self.has_where_appended = false;
    }

    pub fn parameters(&self) -> &ParameterBag {
        &self.parameters
    }

    pub fn raw_buffer(&self) -> &str {
        &self.buffer
    }

    /// A shallow copy of the buffer, parameters, and where-state for reuse
    /// against a different locked connection (e.g. retrying a read on the
    /// pinned write connection after a `KeepAlive` failover).
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Resolves every `{Q}…{q}` and `{S}name` neutral token against
    /// `dialect`, producing the final SQL text for that dialect. Parameter
    /// markers are numbered by the bound parameter's position in insertion
    /// order, matching positional-placeholder dialects.
    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<String, DbError> {
        let mut rendered = String::with_capacity(self.buffer.len());
        let mut rest = self.buffer.as_str();

        while !rest.is_empty() {
            if let Some(after_open) = rest.strip_prefix(NEUTRAL_QUOTE_OPEN) {
                let close_pos = after_open.find(NEUTRAL_QUOTE_CLOSE).ok_or_else(|| {
                    DbError::invalid_operation("unterminated {Q}...{q} identifier token")
                })?;
                let identifier = &after_open[..close_pos];
                rendered.push_str(&dialect.quote_identifier(identifier));
                rest = &after_open[close_pos + NEUTRAL_QUOTE_CLOSE.len()..];
                continue;
            }

            if let Some(after_prefix) = rest.strip_prefix(NEUTRAL_PARAMETER_PREFIX) {
                let name_len = after_prefix
                    .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .unwrap_or(after_prefix.len());
                let name = &after_prefix[..name_len];
                let index = self
                    .parameters
                    .iter()
                    .position(|p| p.name == name)
                    .ok_or_else(|| {
                        DbError::invalid_operation(format!(
                            "parameter reference {{S}}{name} has no bound value"
                        ))
                    })?;
                rendered.push_str(&dialect.parameter_marker(name, index + 1));
                rest = &after_prefix[name_len..];
                continue;
            }

            // Advance by one char at a time, copying verbatim, until the
            // next token prefix or end of buffer.
            let mut chars = rest.char_indices();
            chars.next();
            let next_boundary = rest[1..]
                .find(NEUTRAL_QUOTE_OPEN)
                .map(|p| p + 1)
                .into_iter()
                .chain(rest[1..].find(NEUTRAL_PARAMETER_PREFIX).map(|p| p + 1))
                .min()
                .unwrap_or(rest.len());
            rendered.push_str(&rest[..next_boundary.max(1)]);
            rest = &rest[next_boundary.max(1)..];
        }

        Ok(rendered)
    }

    fn guard_against_read_only(&self, is_read_only: bool) -> Result<(), DbError> {
        if !is_read_only {
            return Ok(());
        }
        let trimmed = self.buffer.trim_start();
        let is_mutating = ["INSERT", "UPDATE", "DELETE", "MERGE"]
            .iter()
            .any(|verb| trimmed.len() >= verb.len() && trimmed[..verb.len()].eq_ignore_ascii_case(verb));
        if is_mutating {
            return Err(DbError::invalid_operation(
                "mutating statement issued against a read-only connection",
            ));
        }
        Ok(())
    }

    fn to_command(
        &self,
        dialect: &dyn SqlDialect,
        factory: &dyn Factory,
    ) -> Result<Box<dyn Command>, DbError> {
        let text = self.render(dialect)?;
        let mut command = factory.create_command();
        command.set_text(&text);

        for bound in self.parameters.iter() {
            let mut parameter = factory.create_parameter();
            parameter.set_name(&bound.name);
            parameter.set_db_type(bound.db_type);
            parameter.set_value(bound.value.clone());
            parameter.set_direction(bound.direction);
            command.add_parameter(parameter);
        }

        Ok(command)
    }

    /// Runs `maybe_prepare` and reports the outcome to `metrics`, regardless
    /// of whether the shape was newly prepared.
    async fn prepare_and_record(
        &self,
        connection: &TrackedConnection,
        dialect: &dyn SqlDialect,
        metrics: &Metrics,
        command: &dyn Command,
    ) {
        if let Some(evicted) = connection.maybe_prepare(dialect, command).await {
            metrics.statement_prepared();
            metrics.statement_cached();
            if evicted > 0 {
                metrics.statement_evicted(evicted);
            }
        }
    }

    pub async fn execute_non_query(
        &self,
        connection: &TrackedConnection,
        dialect: &dyn SqlDialect,
        factory: &dyn Factory,
        metrics: &Metrics,
        is_read_only: bool,
    ) -> Result<u64, DbError> {
        self.guard_against_read_only(is_read_only)?;
        let command = self.to_command(dialect, factory)?;
        self.prepare_and_record(connection, dialect, metrics, command.as_ref()).await;

        let started = Instant::now();
        let result = connection.connection().execute_non_query(command.as_ref()).await;
        metrics.record_command(CommandOutcome {
            duration: started.elapsed(),
            rows_affected: result.as_ref().ok().copied(),
            rows_read: None,
            failed: result.is_err(),
            timed_out: false,
            parameter_count: self.parameters.len(),
        });
        result
    }

    pub async fn execute_scalar(
        &self,
        connection: &TrackedConnection,
        dialect: &dyn SqlDialect,
        factory: &dyn Factory,
        metrics: &Metrics,
    ) -> Result<Option<Value>, DbError> {
        let command = self.to_command(dialect, factory)?;
        self.prepare_and_record(connection, dialect, metrics, command.as_ref()).await;

        let started = Instant::now();
        let result = connection.connection().execute_scalar(command.as_ref()).await;
        metrics.record_command(CommandOutcome {
            duration: started.elapsed(),
            rows_affected: None,
            rows_read: None,
            failed: result.is_err(),
            timed_out: false,
            parameter_count: self.parameters.len(),
        });
        result
    }

    /// Opens the reader without recording a `record_command` outcome; the
    /// caller times the call and attributes rows read, since that count
    /// isn't known until the reader has been drained.
    async fn open_reader(
        &self,
        connection: &TrackedConnection,
        dialect: &dyn SqlDialect,
        factory: &dyn Factory,
        metrics: &Metrics,
    ) -> Result<Box<dyn DataReader>, DbError> {
        let command = self.to_command(dialect, factory)?;
        self.prepare_and_record(connection, dialect, metrics, command.as_ref()).await;
        connection.connection().execute_reader(command.as_ref()).await
    }

    pub async fn execute_reader(
        &self,
        connection: &TrackedConnection,
        dialect: &dyn SqlDialect,
        factory: &dyn Factory,
        metrics: &Metrics,
    ) -> Result<Box<dyn DataReader>, DbError> {
        let started = Instant::now();
        let result = self.open_reader(connection, dialect, factory, metrics).await;
        metrics.record_command(CommandOutcome {
            duration: started.elapsed(),
            rows_affected: None,
            rows_read: None,
            failed: result.is_err(),
            timed_out: false,
            parameter_count: self.parameters.len(),
        });
        result
    }

    pub async fn execute_reader_single_row(
        &self,
        connection: &TrackedConnection,
        dialect: &dyn SqlDialect,
        factory: &dyn Factory,
        metrics: &Metrics,
    ) -> Result<Option<ProviderRow>, DbError> {
        let started = Instant::now();
        let result = self.read_single_row(connection, dialect, factory, metrics).await;
        metrics.record_command(CommandOutcome {
            duration: started.elapsed(),
            rows_affected: None,
            rows_read: Some(if matches!(result, Ok(Some(_))) { 1 } else { 0 }),
            failed: result.is_err(),
            timed_out: false,
            parameter_count: self.parameters.len(),
        });
        result
    }

    async fn read_single_row(
        &self,
        connection: &TrackedConnection,
        dialect: &dyn SqlDialect,
        factory: &dyn Factory,
        metrics: &Metrics,
    ) -> Result<Option<ProviderRow>, DbError> {
        let mut reader = self.open_reader(connection, dialect, factory, metrics).await?;
        if !reader.read().await? {
            return Ok(None);
        }
        let row = (0..reader.field_count())
            .map(|ordinal| reader.get_value(ordinal).clone())
            .collect();
        Ok(Some(row))
    }
}
