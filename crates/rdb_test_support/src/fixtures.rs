use rdb_core::{DbType, ProviderRow, Value};

/// Builds a row from already-constructed `Value`s, in column order.
pub fn row(values: Vec<Value>) -> ProviderRow {
    values
}

/// A row of text cells, for tables whose shape under test is all strings.
pub fn text_row(values: &[&str]) -> ProviderRow {
    values.iter().map(|v| Value::Text((*v).to_string())).collect()
}

/// A row of integer cells.
pub fn int_row(values: &[i64]) -> ProviderRow {
    values.iter().map(|v| Value::Int(*v)).collect()
}

/// A `(name, type)` column descriptor pair, as `FakeDriver::with_rows_result`
/// expects.
pub fn column(name: &str, db_type: DbType) -> (String, DbType) {
    (name.to_string(), db_type)
}
