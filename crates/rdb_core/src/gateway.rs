use crate::dialect::{DbProduct, KeyRetrievalPlan, SqlDialect};
use crate::entity::{ColumnDescriptor, IdType, IdValue, TableDescriptor};
use crate::error::DbError;
use crate::metrics::Metrics;
use crate::provider::{DataReader, Factory};
use crate::reader_plan::{build_reader_plan, Coercer, ReaderPlan, ReaderPlanCache};
use crate::sql_container::SqlContainer;
use crate::tracked_connection::TrackedConnection;
use crate::value::{DbType, Value};
use rand::Rng;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// A reflection-free CRUD gateway for entity type `E`, keyed by `K`. Built
/// once per entity type against a `TableDescriptor<E>` and a concrete
/// dialect; the SQL it builds is still assembled into a dialect-neutral
/// `SqlContainer`, so the same gateway's containers can be forked and
/// rendered elsewhere if the caller needs that, even though the gateway
/// itself always executes against its own dialect.
pub struct TableGateway<E, K> {
    descriptor: &'static TableDescriptor<E>,
    dialect: &'static dyn SqlDialect,
    wrapped_table: OnceLock<String>,
    reader_plans: ReaderPlanCache<E>,
    audit_resolver: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    _id: PhantomData<K>,
}

impl<E, K: IdValue> TableGateway<E, K> {
    pub fn new(descriptor: &'static TableDescriptor<E>, dialect: &'static dyn SqlDialect, entity_type_name: &'static str) -> Self {
        Self {
            descriptor,
            dialect,
            wrapped_table: OnceLock::new(),
            reader_plans: ReaderPlanCache::new(entity_type_name, 32),
            audit_resolver: None,
            _id: PhantomData,
        }
    }

    /// Registers the resolver consulted for `created_by`/`last_updated_by`
    /// columns. Omitting this on a table that declares one of those
    /// columns fails the first create/update at the audit-field step
    /// rather than silently writing an empty string.
    pub fn with_audit_resolver(mut self, resolver: Arc<dyn Fn() -> String + Send + Sync>) -> Self {
        self.audit_resolver = Some(resolver);
        self
    }

    /// The dialect-quoted `schema.table` reference, computed once.
    pub fn wrapped_table_name(&self) -> &str {
        self.wrapped_table
            .get_or_init(|| self.dialect.qualified_table(self.descriptor.schema, self.descriptor.table))
    }

    fn append_qualified_table(&self, container: &mut SqlContainer) {
        if let Some(schema) = self.descriptor.schema {
            container.quoted_identifier(schema).query(".");
        }
        container.quoted_identifier(self.descriptor.table);
    }

    /// `SELECT <columns> FROM <table> [alias]`, with no `WHERE` clause.
    pub fn build_base_retrieve(&self, alias: Option<&str>) -> SqlContainer {
        let mut container = SqlContainer::new();
        container.query("SELECT ");

        for (i, column) in self.descriptor.select_columns().iter().enumerate() {
            if i > 0 {
                container.query(", ");
            }
            if let Some(alias) = alias {
                container.query(alias).query(".");
            }
            container.quoted_identifier(column.name);
        }

        container.query(" FROM ");
        self.append_qualified_table(&mut container);
        if let Some(alias) = alias {
            container.query(" ").query(alias);
        }

        container
    }

    /// Appends `WHERE {column} IN (...)` — splitting off `OR {column} IS
    /// NULL` for any `Value::Null` entries — guarded by the dialect's
    /// bind-parameter limit.
    pub fn build_where(
        &self,
        container: &mut SqlContainer,
        column_name: &str,
        db_type: DbType,
        values: &[Value],
    ) -> Result<(), DbError> {
        if values.is_empty() {
            return Err(DbError::invalid_argument("List of IDs cannot be empty."));
        }

        let limit = max_parameter_limit(self.dialect.product());
        if values.len() > limit {
            return Err(DbError::TooManyParameters {
                limit,
                actual: values.len(),
            });
        }

        let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
        let has_null = non_null.len() != values.len();

        let mut predicate = String::from("(");
        let mut wrote_any = false;

        if !non_null.is_empty() {
            predicate.push_str("{Q}");
            predicate.push_str(column_name);
            predicate.push_str("{q} IN (");
            for (i, value) in non_null.iter().enumerate() {
                if i > 0 {
                    predicate.push_str(", ");
                }
                let handle = container.add_parameter_with_value_prefixed(None, db_type, (*value).clone(), "w");
                predicate.push_str("{S}");
                predicate.push_str(&handle.name);
            }
            predicate.push(')');
            wrote_any = true;
        }

        if has_null {
            if wrote_any {
                predicate.push_str(" OR ");
            }
            predicate.push_str("{Q}");
            predicate.push_str(column_name);
            predicate.push_str("{q} IS NULL");
        }
        predicate.push(')');

        container.append_where(&predicate);
        Ok(())
    }

    /// Retrieves by the table's single `Id` column.
    pub fn build_retrieve(&self, ids: &[K]) -> Result<SqlContainer, DbError> {
        let id_column = self
            .descriptor
            .id_column()
            .ok_or_else(|| DbError::invalid_operation("table has no single Id column"))?;

        let mut container = self.build_base_retrieve(None);
        let values: Vec<Value> = ids.iter().map(IdValue::to_value).collect();
        self.build_where(&mut container, id_column.name, id_column.db_type, &values)?;
        Ok(container)
    }

    /// Retrieves by composite primary key: one OR-branch per tuple, each
    /// branch AND-ing every key column.
    pub fn build_retrieve_by_primary_key(&self, tuples: &[Vec<Value>]) -> Result<SqlContainer, DbError> {
        if tuples.is_empty() {
            return Err(DbError::invalid_argument("List of IDs cannot be empty."));
        }

        let pk_columns = self.descriptor.primary_key_columns();
        if pk_columns.is_empty() {
            return Err(DbError::invalid_operation("table has no primary key columns"));
        }
        for tuple in tuples {
            if tuple.len() != pk_columns.len() {
                return Err(DbError::invalid_argument(format!(
                    "primary key tuple has {} values, expected {}",
                    tuple.len(),
                    pk_columns.len()
                )));
            }
        }

        let mut container = self.build_base_retrieve(None);
        container.query("\n WHERE ");
        for (t_idx, tuple) in tuples.iter().enumerate() {
            if t_idx > 0 {
                container.query(" OR ");
            }
            container.query("(");
            for (c_idx, column) in pk_columns.iter().enumerate() {
                if c_idx > 0 {
                    container.query(" AND ");
                }
                let handle =
                    container.add_parameter_with_value_prefixed(None, column.db_type, tuple[c_idx].clone(), "k");
                container.quoted_identifier(column.name);
                container.query("=");
                container.parameter_reference(&handle.name);
            }
            container.query(")");
        }
        container.mark_where_appended();
        Ok(container)
    }

    pub fn build_delete_by_id(&self, ids: &[K]) -> Result<SqlContainer, DbError> {
        let id_column = self
            .descriptor
            .id_column()
            .ok_or_else(|| DbError::invalid_operation("table has no single Id column"))?;

        let mut container = SqlContainer::new();
        container.query("DELETE FROM ");
        self.append_qualified_table(&mut container);
        let values: Vec<Value> = ids.iter().map(IdValue::to_value).collect();
        self.build_where(&mut container, id_column.name, id_column.db_type, &values)?;
        Ok(container)
    }

    pub fn build_delete_by_entity(&self, entity: &E) -> Result<SqlContainer, DbError> {
        let mut container = SqlContainer::new();
        container.query("DELETE FROM ");
        self.append_qualified_table(&mut container);
        self.append_identity_where(&mut container, entity)?;
        Ok(container)
    }

    fn append_identity_where(&self, container: &mut SqlContainer, entity: &E) -> Result<(), DbError> {
        if let Some(id_column) = self.descriptor.id_column() {
            let value = (id_column.get)(entity);
            let handle = container.add_parameter_with_value(None, id_column.db_type, value);
            container.append_where(&format!("{{Q}}{}{{q}} = {{S}}{}", id_column.name, handle.name));
            return Ok(());
        }

        let pk_columns = self.descriptor.primary_key_columns();
        if pk_columns.is_empty() {
            return Err(DbError::invalid_operation(
                "table declares neither an Id column nor primary key columns",
            ));
        }
        for column in pk_columns {
            let value = (column.get)(entity);
            let handle = container.add_parameter_with_value(None, column.db_type, value);
            container.append_where(&format!("{{Q}}{}{{q}} = {{S}}{}", column.name, handle.name));
        }
        Ok(())
    }

    /// Applies the `created_*`/`last_updated_*` audit columns in place.
    /// `is_insert` gates whether `created_on`/`created_by` are touched;
    /// `last_updated_on`/`last_updated_by` are always refreshed.
    pub fn apply_audit_fields(&self, entity: &mut E, is_insert: bool) -> Result<(), DbError> {
        let now = Value::DateTime(chrono::Utc::now());
        for column in &self.descriptor.columns {
            if is_insert && column.is_created_on {
                (column.set)(entity, now.clone())?;
            }
            if is_insert && column.is_created_by {
                let user = self.resolve_audit_user()?;
                (column.set)(entity, Value::Text(user))?;
            }
            if column.is_last_updated_on {
                (column.set)(entity, now.clone())?;
            }
            if column.is_last_updated_by {
                let user = self.resolve_audit_user()?;
                (column.set)(entity, Value::Text(user))?;
            }
        }
        Ok(())
    }

    fn resolve_audit_user(&self) -> Result<String, DbError> {
        match &self.audit_resolver {
            Some(resolver) => Ok(resolver()),
            None => Err(DbError::invalid_operation(
                "entity declares an audit column but no audit-user resolver was configured",
            )),
        }
    }

    fn autofill_writable_id(&self, entity: &mut E) -> Result<(), DbError> {
        let Some(id_column) = self.descriptor.id_column() else {
            return Ok(());
        };
        if !id_column.id_is_writable {
            return Ok(());
        }

        let current = (id_column.get)(entity);
        let is_default = K::from_value(&current).map(|v| v.is_default()).unwrap_or(true);
        if !is_default {
            return Ok(());
        }

        if let Some(generated) = default_generated_id::<K>() {
            (id_column.set)(entity, generated)?;
        }
        Ok(())
    }

    fn build_insert_container(
        &self,
        entity: &E,
        id_column: Option<&ColumnDescriptor<E>>,
        prefetched: Option<&Value>,
        recovers_id: bool,
        plan: KeyRetrievalPlan,
    ) -> SqlContainer {
        let mut columns: Vec<&ColumnDescriptor<E>> = self
            .descriptor
            .insertable_columns()
            .filter(|c| !c.is_id || c.id_is_writable)
            .collect();

        let include_prefetched_id = prefetched.is_some()
            && id_column
                .map(|id_col| !columns.iter().any(|c| c.name == id_col.name))
                .unwrap_or(false);
        if include_prefetched_id {
            if let Some(id_col) = id_column {
                columns.push(id_col);
            }
        }

        let mut container = SqlContainer::new();
        container.query("INSERT INTO ");
        self.append_qualified_table(&mut container);
        container.query(" (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                container.query(", ");
            }
            container.quoted_identifier(column.name);
        }
        container.query(")");

        if recovers_id && plan == KeyRetrievalPlan::OutputInserted {
            if let Some(id_col) = id_column {
                container.query(" OUTPUT INSERTED.");
                container.quoted_identifier(id_col.name);
            }
        }

        container.query(" VALUES (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                container.query(", ");
            }
            let is_prefetched_slot = include_prefetched_id && id_column.map(|c| c.name == column.name).unwrap_or(false);
            let value = if is_prefetched_slot {
                prefetched.cloned().unwrap_or(Value::Null)
            } else {
                (column.get)(entity)
            };
            let handle = container.add_parameter_with_value(None, column.db_type, value);
            container.parameter_reference(&handle.name);
        }
        container.query(")");

        if recovers_id && plan == KeyRetrievalPlan::Returning {
            if let Some(id_col) = id_column {
                container.query(" RETURNING ");
                container.quoted_identifier(id_col.name);
            }
        }

        container
    }

    async fn prefetch_sequence_value(
        &self,
        connection: &TrackedConnection,
        factory: &dyn Factory,
        metrics: &Metrics,
    ) -> Result<Value, DbError> {
        let mut container = SqlContainer::new();
        let sequence_name = format!("{}_seq", self.descriptor.table);
        container.query(&self.dialect.sequence_next_value_sql(&sequence_name));
        container
            .execute_scalar(connection, self.dialect, factory, metrics)
            .await?
            .ok_or_else(|| DbError::invalid_operation("sequence prefetch returned no value"))
    }

    /// Inserts `entity`, auto-filling a writable id's default value,
    /// stamping audit columns, and running whichever generated-key dance
    /// the dialect's `KeyRetrievalPlan` calls for. Returns `false` (not an
    /// error) when the insert affects anything other than exactly one row
    /// — a constraint-driven no-op, not a failure worth propagating as an
    /// exception.
    ///
    /// `CorrelationToken` and `NaturalKeyLookup` plans run the insert but
    /// leave the id column untouched: recovering a generated key under
    /// those plans needs a caller-supplied lookup this gateway cannot
    /// infer generically.
    pub async fn create(
        &self,
        connection: &TrackedConnection,
        factory: &dyn Factory,
        metrics: &Metrics,
        entity: &mut E,
    ) -> Result<bool, DbError> {
        self.autofill_writable_id(entity)?;
        self.apply_audit_fields(entity, true)?;

        let id_column = self.descriptor.id_column();
        let recovers_id = id_column.map(|c| !c.id_is_writable).unwrap_or(false);
        let plan = self.dialect.generated_key_plan();

        let prefetched = if recovers_id && plan == KeyRetrievalPlan::PrefetchSequence {
            Some(self.prefetch_sequence_value(connection, factory, metrics).await?)
        } else {
            None
        };

        let container = self.build_insert_container(entity, id_column, prefetched.as_ref(), recovers_id, plan);

        let generated: Option<Value> = match (recovers_id, plan) {
            (true, KeyRetrievalPlan::Returning) | (true, KeyRetrievalPlan::OutputInserted) => {
                match container.execute_scalar(connection, self.dialect, factory, metrics).await? {
                    Some(value) => Some(value),
                    None => return Ok(false),
                }
            }
            _ => {
                let affected = container
                    .execute_non_query(connection, self.dialect, factory, metrics, false)
                    .await?;
                if affected != 1 {
                    return Ok(false);
                }
                match (recovers_id, plan) {
                    (true, KeyRetrievalPlan::SessionScopedFunction(func)) => {
                        let mut scalar = SqlContainer::new();
                        scalar.query("SELECT ").query(func);
                        scalar.execute_scalar(connection, self.dialect, factory, metrics).await?
                    }
                    (true, KeyRetrievalPlan::PrefetchSequence) => prefetched.clone(),
                    _ => None,
                }
            }
        };

        if let (Some(id_column), Some(value)) = (id_column, generated) {
            if !id_column.id_is_writable {
                match K::from_value(&value) {
                    Ok(id_value) => (id_column.set)(entity, id_value.to_value())?,
                    Err(_) => log::warn!(
                        "generated id value for table {} could not be coerced into the declared id type; leaving id at its default",
                        self.descriptor.table
                    ),
                }
            }
        }

        Ok(true)
    }

    /// Builds an `UPDATE` statement. With `original` supplied, only
    /// columns whose value actually changed are included in the `SET`
    /// list; without it, every updateable column is set unconditionally.
    /// A `version` column is always included, incremented, and added to
    /// the `WHERE` clause for optimistic-concurrency checking.
    pub fn build_update(&self, entity: &E, original: Option<&E>) -> Result<SqlContainer, DbError> {
        let mut container = SqlContainer::new();
        container.query("UPDATE ");
        self.append_qualified_table(&mut container);
        container.query(" SET ");

        let mut wrote_any = false;
        let mut version_column: Option<&ColumnDescriptor<E>> = None;

        for column in self.descriptor.updateable_columns() {
            if column.is_version {
                version_column = Some(column);
                continue;
            }
            if column.is_id || column.is_primary_key {
                continue;
            }
            let new_value = (column.get)(entity);
            if let Some(original) = original {
                if (column.get)(original) == new_value {
                    continue;
                }
            }
            if wrote_any {
                container.query(", ");
            }
            container.quoted_identifier(column.name);
            container.query(" = ");
            let handle = container.add_parameter_with_value(None, column.db_type, new_value);
            container.parameter_reference(&handle.name);
            wrote_any = true;
        }

        if let Some(version_column) = version_column {
            let current_version = (version_column.get)(entity);
            let incremented = increment_version(&current_version)?;
            if wrote_any {
                container.query(", ");
            }
            container.quoted_identifier(version_column.name);
            container.query(" = ");
            let handle = container.add_parameter_with_value(None, version_column.db_type, incremented);
            container.parameter_reference(&handle.name);
            wrote_any = true;
        }

        if !wrote_any {
            return Err(DbError::invalid_operation("update has no changed columns to set"));
        }

        self.append_identity_where(&mut container, entity)?;

        if let Some(version_column) = version_column {
            let current_version = (version_column.get)(entity);
            let handle = container.add_parameter_with_value(None, version_column.db_type, current_version);
            container.append_where(&format!("{{Q}}{}{{q}} = {{S}}{}", version_column.name, handle.name));
        }

        Ok(container)
    }

    /// The shape key used to cache reader plans for this gateway's base
    /// `SELECT` — stable for as long as the table's column set is, since
    /// `select_columns()` always produces the same shape.
    pub fn default_shape_key(&self) -> &'static str {
        self.descriptor.table
    }

    pub fn reader_plan_for(&self, reader: &dyn DataReader, shape_key: &str) -> Arc<ReaderPlan<E>> {
        self.reader_plans
            .get_or_build(shape_key, || build_reader_plan(reader, self.descriptor, default_coercer))
    }
}

fn default_generated_id<K: IdValue>() -> Option<Value> {
    match K::id_type() {
        IdType::Guid => Some(Value::Guid(Uuid::now_v7())),
        IdType::String => Some(Value::Text(random_alphanumeric(20))),
        IdType::Int32 | IdType::Int64 => None,
    }
}

fn random_alphanumeric(len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

fn increment_version(value: &Value) -> Result<Value, DbError> {
    match value {
        Value::Int(i) => Ok(Value::Int(i + 1)),
        other => Err(DbError::invalid_operation(format!(
            "version column must be an integer, found {other:?}"
        ))),
    }
}

/// Dialect-neutral, provider-agnostic coercion used when a reader's
/// reported field type does not match a column's declared `DbType`.
/// Provider-specific coercions (Firebird's `Int16` → `Boolean`) are
/// layered in `coercion.rs` for outbound parameter binding; this handles
/// the inbound direction for the handful of shapes providers commonly
/// report loosely (booleans as small ints, guids as raw byte buffers).
fn default_coercer(target: DbType, _source: DbType) -> Coercer {
    Arc::new(move |value: &Value| -> Result<Value, DbError> {
        match (target, value) {
            (DbType::Boolean, Value::Int(i)) => Ok(Value::Bool(*i != 0)),
            (DbType::Guid, Value::Bytes(bytes)) if bytes.len() == 16 => {
                let mut array = [0u8; 16];
                array.copy_from_slice(bytes);
                Ok(Value::Guid(Uuid::from_bytes(array)))
            }
            _ => Ok(value.clone()),
        }
    })
}

/// Conservative known bind-parameter ceilings per product, used by
/// `build_where`'s `TooManyParameters` guard.
fn max_parameter_limit(product: DbProduct) -> usize {
    match product {
        DbProduct::SqlServer => 2100,
        DbProduct::Postgres => 65535,
        DbProduct::MySql => 65535,
        DbProduct::Oracle => 64000,
        DbProduct::Sqlite => 32766,
        DbProduct::Firebird => 1499,
        DbProduct::DuckDb => 100_000,
        DbProduct::Standard => 2100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ColumnDescriptor, TableDescriptorBuilder};
    use crate::dialects::{MySqlDialect, OracleDialect, PostgresDialect, SqlServerDialect};
    use crate::lock::ConnectionLock;
    use crate::provider::Connection;
    use rdb_test_support::FakeDriver;
    use std::sync::OnceLock as StdOnceLock;

    #[derive(Default, Clone)]
    struct Widget {
        id: i64,
        name: String,
        version: i64,
    }

    fn get_id(w: &Widget) -> Value {
        Value::Int(w.id)
    }
    fn set_id(w: &mut Widget, v: Value) -> Result<(), DbError> {
        w.id = i64::from_value(&v)?;
        Ok(())
    }
    fn get_name(w: &Widget) -> Value {
        Value::Text(w.name.clone())
    }
    fn set_name(w: &mut Widget, v: Value) -> Result<(), DbError> {
        w.name = match v {
            Value::Text(s) => s,
            _ => return Err(DbError::invalid_argument("name must be text")),
        };
        Ok(())
    }
    fn get_version(w: &Widget) -> Value {
        Value::Int(w.version)
    }
    fn set_version(w: &mut Widget, v: Value) -> Result<(), DbError> {
        w.version = match v {
            Value::Int(i) => i,
            _ => return Err(DbError::invalid_argument("version must be int")),
        };
        Ok(())
    }

    fn descriptor() -> &'static TableDescriptor<Widget> {
        static DESCRIPTOR: StdOnceLock<TableDescriptor<Widget>> = StdOnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TableDescriptorBuilder::new("widgets")
                .column(ColumnDescriptor::new("id", DbType::Int64, get_id, set_id).id())
                .column(ColumnDescriptor::new("name", DbType::String, get_name, set_name))
                .column(ColumnDescriptor::new("version", DbType::Int64, get_version, set_version).version())
                .build()
                .unwrap()
        })
    }

    fn gateway() -> TableGateway<Widget, i64> {
        TableGateway::new(descriptor(), &PostgresDialect, "Widget")
    }

    #[derive(Default, Clone)]
    struct LineItem {
        order_id: i64,
        line_no: i64,
        qty: i64,
    }

    fn get_order_id(l: &LineItem) -> Value {
        Value::Int(l.order_id)
    }
    fn set_order_id(l: &mut LineItem, v: Value) -> Result<(), DbError> {
        l.order_id = i64::from_value(&v)?;
        Ok(())
    }
    fn get_line_no(l: &LineItem) -> Value {
        Value::Int(l.line_no)
    }
    fn set_line_no(l: &mut LineItem, v: Value) -> Result<(), DbError> {
        l.line_no = i64::from_value(&v)?;
        Ok(())
    }
    fn get_qty(l: &LineItem) -> Value {
        Value::Int(l.qty)
    }
    fn set_qty(l: &mut LineItem, v: Value) -> Result<(), DbError> {
        l.qty = i64::from_value(&v)?;
        Ok(())
    }

    fn line_item_descriptor() -> &'static TableDescriptor<LineItem> {
        static DESCRIPTOR: StdOnceLock<TableDescriptor<LineItem>> = StdOnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TableDescriptorBuilder::new("line_items")
                .column(ColumnDescriptor::new("order_id", DbType::Int64, get_order_id, set_order_id).primary_key(0))
                .column(ColumnDescriptor::new("line_no", DbType::Int64, get_line_no, set_line_no).primary_key(1))
                .column(ColumnDescriptor::new("qty", DbType::Int64, get_qty, set_qty))
                .build()
                .unwrap()
        })
    }

    fn line_item_gateway() -> TableGateway<LineItem, i64> {
        TableGateway::new(line_item_descriptor(), &PostgresDialect, "LineItem")
    }

    #[test]
    fn build_retrieve_rejects_empty_id_list() {
        let result = gateway().build_retrieve(&[]);
        assert!(matches!(result, Err(DbError::InvalidArgument(msg)) if msg == "List of IDs cannot be empty."));
    }

    #[test]
    fn build_retrieve_renders_in_clause() {
        let container = gateway().build_retrieve(&[1, 2, 3]).unwrap();
        let rendered = container.render(&PostgresDialect).unwrap();
        assert!(rendered.contains("WHERE (\"id\" IN (:w0, :w1, :w2))"));
    }

    #[test]
    fn build_retrieve_by_primary_key_renders_or_of_ands() {
        let container = line_item_gateway()
            .build_retrieve_by_primary_key(&[
                vec![Value::Int(1), Value::Int(2)],
                vec![Value::Int(3), Value::Int(4)],
            ])
            .unwrap();
        let rendered = container.render(&SqlServerDialect).unwrap();
        assert!(rendered.ends_with(
            "\n WHERE (\"order_id\"=@k0 AND \"line_no\"=@k1) OR (\"order_id\"=@k2 AND \"line_no\"=@k3)"
        ));
        assert!(container.has_where_appended());
    }

    #[test]
    fn build_where_splits_null_into_or_is_null() {
        let mut container = gateway().build_base_retrieve(None);
        gateway()
            .build_where(&mut container, "name", DbType::String, &[Value::Text("a".into()), Value::Null])
            .unwrap();
        let rendered = container.render(&PostgresDialect).unwrap();
        assert!(rendered.contains("OR \"name\" IS NULL"));
    }

    #[test]
    fn build_update_only_includes_changed_columns() {
        let original = Widget {
            id: 1,
            name: "old".into(),
            version: 5,
        };
        let updated = Widget {
            id: 1,
            name: "new".into(),
            version: 5,
        };
        let container = gateway().build_update(&updated, Some(&original)).unwrap();
        let rendered = container.render(&PostgresDialect).unwrap();
        assert!(rendered.contains("\"name\" = :p0"));
        assert!(rendered.contains("\"version\" = :p1"));
        assert!(rendered.contains("WHERE \"id\" = :p2 AND \"version\" = :p3"));
    }

    #[test]
    fn build_update_without_original_sets_every_updateable_column() {
        let entity = Widget {
            id: 1,
            name: "new".into(),
            version: 5,
        };
        let container = gateway().build_update(&entity, None).unwrap();
        let rendered = container.render(&PostgresDialect).unwrap();
        assert!(rendered.contains("\"name\" = :p0"));
    }

    #[test]
    fn build_update_with_no_changes_errors() {
        let entity = Widget {
            id: 1,
            name: "same".into(),
            version: 5,
        };
        let result = gateway().build_update(&entity, Some(&entity));
        assert!(result.is_err());
    }

    #[test]
    fn build_delete_by_id_targets_table() {
        let container = gateway().build_delete_by_id(&[1]).unwrap();
        let rendered = container.render(&PostgresDialect).unwrap();
        assert_eq!(rendered, "DELETE FROM \"widgets\" WHERE (\"id\" IN (:w0))");
    }

    #[test]
    fn sql_server_insert_uses_output_inserted_clause() {
        let gateway: TableGateway<Widget, i64> = TableGateway::new(descriptor(), &SqlServerDialect, "Widget");
        let entity = Widget {
            id: 0,
            name: "new".into(),
            version: 0,
        };
        let container = gateway.build_insert_container(
            &entity,
            descriptor().id_column(),
            None,
            true,
            KeyRetrievalPlan::OutputInserted,
        );
        let rendered = container.render(&SqlServerDialect).unwrap();
        assert!(rendered.contains("OUTPUT INSERTED.[id]"));
    }

    fn gateway_for(dialect: &'static dyn SqlDialect) -> TableGateway<Widget, i64> {
        TableGateway::new(descriptor(), dialect, "Widget")
    }

    async fn tracked_fake_connection(driver: &FakeDriver) -> (Box<dyn Factory>, TrackedConnection) {
        let factory = driver.clone().as_factory_box();
        let mut connection = factory.create_connection("cs").await.unwrap();
        connection.open().await.unwrap();
        (factory, TrackedConnection::new(connection, ConnectionLock::NoOp))
    }

    #[tokio::test]
    async fn create_with_returning_plan_sets_generated_id() {
        let driver = FakeDriver::new("postgres").with_default_scalar(Value::Int(42));
        let (factory, tracked) = tracked_fake_connection(&driver).await;
        let metrics = Metrics::new();

        let mut widget = Widget {
            id: 0,
            name: "new".into(),
            version: 0,
        };
        let created = gateway_for(&PostgresDialect)
            .create(&tracked, factory.as_ref(), &metrics, &mut widget)
            .await
            .unwrap();

        assert!(created);
        assert_eq!(widget.id, 42);
    }

    #[tokio::test]
    async fn create_with_returning_plan_returns_false_when_no_row_comes_back() {
        let driver = FakeDriver::new("postgres");
        let (factory, tracked) = tracked_fake_connection(&driver).await;
        let metrics = Metrics::new();

        let mut widget = Widget {
            id: 0,
            name: "new".into(),
            version: 0,
        };
        let created = gateway_for(&PostgresDialect)
            .create(&tracked, factory.as_ref(), &metrics, &mut widget)
            .await
            .unwrap();

        assert!(!created);
        assert_eq!(widget.id, 0);
    }

    #[tokio::test]
    async fn create_with_output_inserted_plan_sets_generated_id() {
        let driver = FakeDriver::new("sqlserver").with_default_scalar(Value::Int(7));
        let (factory, tracked) = tracked_fake_connection(&driver).await;
        let metrics = Metrics::new();

        let mut widget = Widget {
            id: 0,
            name: "new".into(),
            version: 0,
        };
        let created = gateway_for(&SqlServerDialect)
            .create(&tracked, factory.as_ref(), &metrics, &mut widget)
            .await
            .unwrap();

        assert!(created);
        assert_eq!(widget.id, 7);
    }

    #[tokio::test]
    async fn create_with_session_scoped_function_plan_sets_generated_id() {
        let driver = FakeDriver::new("mysql")
            .with_default_non_query(1)
            .with_default_scalar(Value::Int(99));
        let (factory, tracked) = tracked_fake_connection(&driver).await;
        let metrics = Metrics::new();

        let mut widget = Widget {
            id: 0,
            name: "new".into(),
            version: 0,
        };
        let created = gateway_for(&MySqlDialect)
            .create(&tracked, factory.as_ref(), &metrics, &mut widget)
            .await
            .unwrap();

        assert!(created);
        assert_eq!(widget.id, 99);
    }

    #[tokio::test]
    async fn create_with_prefetch_sequence_plan_uses_prefetched_value() {
        let driver = FakeDriver::new("oracle")
            .with_default_scalar(Value::Int(123))
            .with_default_non_query(1);
        let (factory, tracked) = tracked_fake_connection(&driver).await;
        let metrics = Metrics::new();

        let mut widget = Widget {
            id: 0,
            name: "new".into(),
            version: 0,
        };
        let created = gateway_for(&OracleDialect)
            .create(&tracked, factory.as_ref(), &metrics, &mut widget)
            .await
            .unwrap();

        assert!(created);
        assert_eq!(widget.id, 123);
    }

    #[tokio::test]
    async fn create_returns_false_when_insert_affects_no_rows() {
        let driver = FakeDriver::new("mysql")
            .with_default_non_query(0)
            .with_default_scalar(Value::Int(99));
        let (factory, tracked) = tracked_fake_connection(&driver).await;
        let metrics = Metrics::new();

        let mut widget = Widget {
            id: 0,
            name: "new".into(),
            version: 0,
        };
        let created = gateway_for(&MySqlDialect)
            .create(&tracked, factory.as_ref(), &metrics, &mut widget)
            .await
            .unwrap();

        assert!(!created);
        assert_eq!(widget.id, 0);
    }
}
