use crate::dialect::DbProduct;
use crate::error::DbError;
use crate::provider::DataReader;
use crate::reader_plan::ReaderPlan;
use crate::value::{DbType, Value};

/// Provider-specific outbound parameter coercion, applied before binding.
/// Firebird has no native boolean column type and represents GUIDs as raw
/// bytes, so values of those logical types are rewritten to what the wire
/// protocol actually expects; every other product passes values through
/// unchanged.
pub fn coerce_parameter_for_product(product: DbProduct, db_type: DbType, value: Value) -> (DbType, Value) {
    match product {
        DbProduct::Firebird => match (db_type, value) {
            (DbType::Boolean, Value::Bool(b)) => (DbType::Int32, Value::Int(if b { 1 } else { 0 })),
            (DbType::Guid, Value::Guid(g)) => (DbType::Binary, Value::Bytes(g.as_bytes().to_vec())),
            (other_type, other_value) => (other_type, other_value),
        },
        _ => (db_type, value),
    }
}

/// How `load_rows` handles a row whose coercion or setter fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// The first failure aborts the load and propagates its error.
    Strict,
    /// A failing row is skipped (its entity keeps `Default::default()`
    /// field values) and counted in `LoadStats::lenient_drops`, per the
    /// "lenient mapping" design note: an unrecoverable coercion still
    /// yields a row rather than losing it silently.
    Lenient,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_read: usize,
    pub lenient_drops: usize,
}

/// Iterates every row of `reader` through `plan`, per §4.4.3's
/// `LoadAsync`. In `Strict` mode, the first coercion or setter failure is
/// returned immediately. In `Lenient` mode, a failing row still produces an
/// entity (built via `E::default()` with whatever fields were successfully
/// set before the failure) and increments `lenient_drops`; the row itself is
/// not dropped from the result set, only the specific field's value is.
pub async fn load_rows<E: Default>(
    reader: &mut dyn DataReader,
    plan: &ReaderPlan<E>,
    mode: MappingMode,
) -> Result<(Vec<E>, LoadStats), DbError> {
    let mut entities = Vec::new();
    let mut stats = LoadStats::default();

    let mut row_index = 0;
    while reader.read().await? {
        match plan.map_current_row(reader, row_index) {
            Ok(entity) => entities.push(entity),
            Err(err) => match mode {
                MappingMode::Strict => return Err(err),
                MappingMode::Lenient => {
                    stats.lenient_drops += 1;
                    entities.push(E::default());
                }
            },
        }
        stats.rows_read += 1;
        row_index += 1;
    }

    Ok((entities, stats))
}
