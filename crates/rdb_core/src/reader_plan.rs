use crate::entity::TableDescriptor;
use crate::error::DbError;
use crate::lru_cache::LruCache;
use crate::provider::DataReader;
use crate::value::{DbType, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Coerces a raw provider value into the representation a column setter
/// expects. Resolved once per plan entry from `(target_type,
/// provider_field_type)`, not per row.
pub type Coercer = Arc<dyn Fn(&Value) -> Result<Value, DbError> + Send + Sync>;

/// Default coercer: pass the value through unchanged. Dialect-specific
/// coercions (e.g. Firebird `Int16` → `Boolean`) are layered on top by the
/// caller's `coercer_for` lookup.
fn identity_coercer() -> Coercer {
    Arc::new(|value: &Value| Ok(value.clone()))
}

struct PlanEntry<E> {
    ordinal: usize,
    column_name: String,
    coerce: Coercer,
    set: fn(&mut E, Value) -> Result<(), DbError>,
}

/// A precomputed mapping from reader ordinals to entity-setter calls for one
/// observed column shape.
pub struct ReaderPlan<E> {
    entries: Vec<PlanEntry<E>>,
}

impl<E: Default> ReaderPlan<E> {
    /// Builds a new entity from the reader's current row, applying every
    /// planned coercion and setter. Setter/coercion failures are wrapped as
    /// `InvalidValue { column, row_index, .. }`.
    pub fn map_current_row(&self, reader: &dyn DataReader, row_index: usize) -> Result<E, DbError> {
        let mut entity = E::default();
        for entry in &self.entries {
            let raw = reader.get_value(entry.ordinal);
            let coerced = (entry.coerce)(raw).map_err(|source| {
                DbError::invalid_value(entry.column_name.clone(), row_index, SourceError(source.to_string()))
            })?;
            (entry.set)(&mut entity, coerced).map_err(|source| {
                DbError::invalid_value(entry.column_name.clone(), row_index, SourceError(source.to_string()))
            })?;
        }
        Ok(entity)
    }
}

#[derive(Debug)]
struct SourceError(String);

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SourceError {}

/// Builds a fresh `ReaderPlan` from the reader's current column shape,
/// reading `get_name`/`get_field_type` exactly once per ordinal. Reader
/// columns with no matching descriptor column (by case-insensitive name) are
/// skipped — common with `SELECT *` against a wider table.
pub fn build_reader_plan<E>(
    reader: &dyn DataReader,
    descriptor: &TableDescriptor<E>,
    coercer_for: impl Fn(DbType, DbType) -> Coercer,
) -> ReaderPlan<E> {
    let mut entries = Vec::with_capacity(reader.field_count());

    for ordinal in 0..reader.field_count() {
        let name = reader.get_name(ordinal).to_string();
        let field_type = reader.get_field_type(ordinal);

        let Some(column) = descriptor
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&name))
        else {
            continue;
        };

        let coerce = if field_type == column.db_type {
            identity_coercer()
        } else {
            coercer_for(column.db_type, field_type)
        };

        entries.push(PlanEntry {
            ordinal,
            column_name: name,
            coerce,
            set: column.set,
        });
    }

    ReaderPlan { entries }
}

fn hash_shape_key(entity_type_name: &str, shape_key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    entity_type_name.hash(&mut hasher);
    shape_key.hash(&mut hasher);
    hasher.finish()
}

/// Bounded LRU of reader plans for one entity type, keyed by a caller-chosen
/// shape identity (in practice the rendered SQL text: identical SQL against
/// the same entity type always yields the same column shape). Reusing the
/// shape key instead of deriving one from the reader's column-name vector
/// means a cache hit never touches the reader at all.
pub struct ReaderPlanCache<E> {
    entity_type_name: &'static str,
    cache: LruCache<u64, Arc<ReaderPlan<E>>>,
}

impl<E> ReaderPlanCache<E> {
    pub fn new(entity_type_name: &'static str, capacity: usize) -> Self {
        Self {
            entity_type_name,
            cache: LruCache::new(capacity),
        }
    }

    pub fn get_or_build(
        &self,
        shape_key: &str,
        build: impl FnOnce() -> ReaderPlan<E>,
    ) -> Arc<ReaderPlan<E>> {
        let key = hash_shape_key(self.entity_type_name, shape_key);
        self.cache.get_or_insert_with(key, || Arc::new(build()))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ColumnDescriptor, TableDescriptorBuilder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Widget {
        id: i32,
        name: String,
    }

    fn get_id(w: &Widget) -> Value {
        Value::Int(w.id as i64)
    }

    fn set_id(w: &mut Widget, v: Value) -> Result<(), DbError> {
        w.id = match v {
            Value::Int(i) => i as i32,
            _ => return Err(DbError::invalid_argument("bad id")),
        };
        Ok(())
    }

    fn get_name(w: &Widget) -> Value {
        Value::Text(w.name.clone())
    }

    fn set_name(w: &mut Widget, v: Value) -> Result<(), DbError> {
        w.name = match v {
            Value::Text(s) => s,
            _ => return Err(DbError::invalid_argument("bad name")),
        };
        Ok(())
    }

    fn descriptor() -> TableDescriptor<Widget> {
        TableDescriptorBuilder::new("widgets")
            .column(ColumnDescriptor::new("id", DbType::Int32, get_id, set_id).id())
            .column(ColumnDescriptor::new("name", DbType::String, get_name, set_name))
            .build()
            .unwrap()
    }

    struct CountingReader {
        names: Vec<&'static str>,
        types: Vec<DbType>,
        values: Vec<Value>,
        name_calls: AtomicUsize,
        type_calls: AtomicUsize,
        position: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl DataReader for CountingReader {
        fn field_count(&self) -> usize {
            self.names.len()
        }

        fn get_name(&self, ordinal: usize) -> &str {
            self.name_calls.fetch_add(1, Ordering::Relaxed);
            self.names[ordinal]
        }

        fn get_field_type(&self, ordinal: usize) -> DbType {
            self.type_calls.fetch_add(1, Ordering::Relaxed);
            self.types[ordinal]
        }

        async fn read(&mut self) -> Result<bool, DbError> {
            let already_read = self.position.swap(true, Ordering::Relaxed);
            Ok(!already_read)
        }

        fn get_value(&self, ordinal: usize) -> &Value {
            &self.values[ordinal]
        }
    }

    fn counting_reader() -> CountingReader {
        CountingReader {
            names: vec!["id", "name"],
            types: vec![DbType::Int32, DbType::String],
            values: vec![Value::Int(7), Value::Text("widget-7".to_string())],
            name_calls: AtomicUsize::new(0),
            type_calls: AtomicUsize::new(0),
            position: std::sync::atomic::AtomicBool::new(false),
        }
    }

    #[test]
    fn build_reader_plan_maps_matching_columns_by_name() {
        let reader = counting_reader();
        let descriptor = descriptor();
        let plan = build_reader_plan(&reader, &descriptor, |_, _| identity_coercer());
        let widget = plan.map_current_row(&reader, 0).unwrap();
        assert_eq!(widget.id, 7);
        assert_eq!(widget.name, "widget-7");
    }

    #[test]
    fn cache_hit_never_touches_the_reader_again() {
        let cache: ReaderPlanCache<Widget> = ReaderPlanCache::new("Widget", 4);
        let descriptor = descriptor();
        let reader = counting_reader();

        let _plan = cache.get_or_build("SELECT id, name FROM widgets", || {
            build_reader_plan(&reader, &descriptor, |_, _| identity_coercer())
        });
        assert_eq!(reader.name_calls.load(Ordering::Relaxed), 2);
        assert_eq!(reader.type_calls.load(Ordering::Relaxed), 2);

        // second lookup for the same shape key must not call the reader at all
        let reader2 = counting_reader();
        let _plan2 = cache.get_or_build("SELECT id, name FROM widgets", || {
            build_reader_plan(&reader2, &descriptor, |_, _| identity_coercer())
        });
        assert_eq!(reader2.name_calls.load(Ordering::Relaxed), 0);
        assert_eq!(reader2.type_calls.load(Ordering::Relaxed), 0);
        assert_eq!(cache.len(), 1);
    }
}
