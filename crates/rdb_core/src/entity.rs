use crate::error::DbError;
use crate::value::{DbType, Value};
use uuid::Uuid;

/// Per-column metadata for an entity type `E`, built once (typically behind
/// a `OnceLock`) and never mutated afterward. No runtime reflection is
/// involved: `get`/`set` are plain function pointers supplied by the
/// registering code, usually trivial field accessors.
pub struct ColumnDescriptor<E> {
    pub name: &'static str,
    pub db_type: DbType,
    pub ordinal: Option<u32>,
    pub is_id: bool,
    pub id_is_writable: bool,
    pub is_primary_key: bool,
    pub pk_order: Option<u32>,
    pub is_non_insertable: bool,
    pub is_non_updateable: bool,
    pub is_version: bool,
    pub is_created_by: bool,
    pub is_created_on: bool,
    pub is_last_updated_by: bool,
    pub is_last_updated_on: bool,
    pub is_json: bool,
    pub is_enum: bool,
    pub get: fn(&E) -> Value,
    pub set: fn(&mut E, Value) -> Result<(), DbError>,
}

impl<E> ColumnDescriptor<E> {
    pub fn new(
        name: &'static str,
        db_type: DbType,
        get: fn(&E) -> Value,
        set: fn(&mut E, Value) -> Result<(), DbError>,
    ) -> Self {
        Self {
            name,
            db_type,
            ordinal: None,
            is_id: false,
            id_is_writable: false,
            is_primary_key: false,
            pk_order: None,
            is_non_insertable: false,
            is_non_updateable: false,
            is_version: false,
            is_created_by: false,
            is_created_on: false,
            is_last_updated_by: false,
            is_last_updated_on: false,
            is_json: false,
            is_enum: false,
            get,
            set,
        }
    }

    pub fn ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    /// Surrogate key populated post-insert; the caller may not set it.
    pub fn id(mut self) -> Self {
        self.is_id = true;
        self.id_is_writable = false;
        self
    }

    /// Surrogate key the caller may populate before insert.
    pub fn id_writable(mut self) -> Self {
        self.is_id = true;
        self.id_is_writable = true;
        self
    }

    pub fn primary_key(mut self, pk_order: u32) -> Self {
        self.is_primary_key = true;
        self.pk_order = Some(pk_order);
        self
    }

    pub fn non_insertable(mut self) -> Self {
        self.is_non_insertable = true;
        self
    }

    pub fn non_updateable(mut self) -> Self {
        self.is_non_updateable = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.is_version = true;
        self
    }

    pub fn created_by(mut self) -> Self {
        self.is_created_by = true;
        self
    }

    pub fn created_on(mut self) -> Self {
        self.is_created_on = true;
        self
    }

    pub fn last_updated_by(mut self) -> Self {
        self.is_last_updated_by = true;
        self
    }

    pub fn last_updated_on(mut self) -> Self {
        self.is_last_updated_on = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.is_json = true;
        self
    }

    pub fn enum_type(mut self) -> Self {
        self.is_enum = true;
        self
    }
}

/// Table-level metadata for an entity type, validated once at registration
/// time per §3's invariants.
pub struct TableDescriptor<E> {
    pub schema: Option<&'static str>,
    pub table: &'static str,
    pub columns: Vec<ColumnDescriptor<E>>,
}

impl<E> TableDescriptor<E> {
    pub fn id_column(&self) -> Option<&ColumnDescriptor<E>> {
        self.columns.iter().find(|c| c.is_id)
    }

    /// Primary-key columns ordered by `pk_order`.
    pub fn primary_key_columns(&self) -> Vec<&ColumnDescriptor<E>> {
        let mut pk: Vec<&ColumnDescriptor<E>> = self.columns.iter().filter(|c| c.is_primary_key).collect();
        pk.sort_by_key(|c| c.pk_order.unwrap_or(u32::MAX));
        pk
    }

    /// Columns in base-SELECT output order: by `ordinal` if any column sets
    /// one, else by declaration order.
    pub fn select_columns(&self) -> Vec<&ColumnDescriptor<E>> {
        let mut columns: Vec<&ColumnDescriptor<E>> = self.columns.iter().collect();
        if columns.iter().any(|c| c.ordinal.is_some()) {
            columns.sort_by_key(|c| c.ordinal.unwrap_or(u32::MAX));
        }
        columns
    }

    pub fn insertable_columns(&self) -> impl Iterator<Item = &ColumnDescriptor<E>> {
        self.columns.iter().filter(|c| !c.is_non_insertable)
    }

    pub fn updateable_columns(&self) -> impl Iterator<Item = &ColumnDescriptor<E>> {
        self.columns.iter().filter(|c| !c.is_non_updateable)
    }
}

/// Builder validating §3's registration invariants before producing a
/// `TableDescriptor`.
pub struct TableDescriptorBuilder<E> {
    schema: Option<&'static str>,
    table: &'static str,
    columns: Vec<ColumnDescriptor<E>>,
}

impl<E> TableDescriptorBuilder<E> {
    pub fn new(table: &'static str) -> Self {
        Self {
            schema: None,
            table,
            columns: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: &'static str) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn column(mut self, column: ColumnDescriptor<E>) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(self) -> Result<TableDescriptor<E>, DbError> {
        let id_count = self.columns.iter().filter(|c| c.is_id).count();
        let pk_count = self.columns.iter().filter(|c| c.is_primary_key).count();

        if id_count > 1 {
            return Err(DbError::invalid_argument(format!(
                "table {} declares {id_count} Id columns, expected exactly one",
                self.table
            )));
        }
        if id_count == 1 && pk_count > 0 {
            return Err(DbError::invalid_argument(format!(
                "table {} mixes an Id column with PrimaryKey columns",
                self.table
            )));
        }
        if id_count == 0 && pk_count == 0 {
            return Err(DbError::invalid_argument(format!(
                "table {} declares neither an Id column nor PrimaryKey columns",
                self.table
            )));
        }

        let mut pk_orders: Vec<u32> = self.columns.iter().filter_map(|c| c.pk_order).collect();
        pk_orders.sort_unstable();
        if pk_orders.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(DbError::invalid_argument(format!(
                "table {} has duplicate pk_order values",
                self.table
            )));
        }

        let mut ordinals: Vec<u32> = self.columns.iter().filter_map(|c| c.ordinal).collect();
        ordinals.sort_unstable();
        if ordinals.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(DbError::invalid_argument(format!(
                "table {} has duplicate ordinal values",
                self.table
            )));
        }

        Ok(TableDescriptor {
            schema: self.schema,
            table: self.table,
            columns: self.columns,
        })
    }
}

/// The closed set of types a table gateway's id parameter `K` may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    Int32,
    Int64,
    Guid,
    String,
}

/// Implemented by the closed set of valid table-gateway id types. Adding an
/// impl for an unsupported type is the registration-time failure mode
/// described in §4.4 ("registering another type fails at static
/// construction") — enforced here by the trait simply having no impl for
/// anything else.
pub trait IdValue: Clone + Send + Sync + 'static {
    fn id_type() -> IdType;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Result<Self, DbError>
    where
        Self: Sized;

    /// Whether this is the type's "unset" sentinel (`0`, `Guid::nil()`,
    /// empty string), used by `BuildCreate` to decide whether a
    /// writable-id column needs a fresh auto-generated value.
    fn is_default(&self) -> bool;
}

impl IdValue for i32 {
    fn id_type() -> IdType {
        IdType::Int32
    }

    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }

    fn from_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Int(i) => Ok(*i as i32),
            other => Err(DbError::invalid_argument(format!("cannot coerce {other:?} into i32 id"))),
        }
    }

    fn is_default(&self) -> bool {
        *self == 0
    }
}

impl IdValue for i64 {
    fn id_type() -> IdType {
        IdType::Int64
    }

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(DbError::invalid_argument(format!("cannot coerce {other:?} into i64 id"))),
        }
    }

    fn is_default(&self) -> bool {
        *self == 0
    }
}

impl IdValue for Uuid {
    fn id_type() -> IdType {
        IdType::Guid
    }

    fn to_value(&self) -> Value {
        Value::Guid(*self)
    }

    fn from_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Guid(g) => Ok(*g),
            other => Err(DbError::invalid_argument(format!("cannot coerce {other:?} into Guid id"))),
        }
    }

    fn is_default(&self) -> bool {
        self.is_nil()
    }
}

impl IdValue for String {
    fn id_type() -> IdType {
        IdType::String
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(DbError::invalid_argument(format!("cannot coerce {other:?} into String id"))),
        }
    }

    fn is_default(&self) -> bool {
        self.is_empty()
    }
}
