use crate::Value;
use crate::dialect::{
    DbProduct, DialectCapabilities, KeyRetrievalPlan, PlaceholderStyle, SqlDialect,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct FirebirdDialect;

impl SqlDialect for FirebirdDialect {
    fn product(&self) -> DbProduct {
        DbProduct::Firebird
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::INSERT_RETURNING | DialectCapabilities::CTE
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn qualified_table(&self, _schema: Option<&str>, table: &str) -> String {
        // Firebird has no schema namespace; a database is one namespace.
        self.quote_identifier(table)
    }

    fn value_to_literal(&self, value: &Value) -> String {
        match value {
            // Firebird has no native BOOLEAN prior to 3.0 and no native
            // GUID type; both are coerced by `coercion.rs` before this
            // point is reached, but a literal fallback is kept here for
            // direct callers.
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Guid(g) => {
                let hex: String = g.as_bytes().iter().map(|byte| format!("{byte:02x}")).collect();
                format!("x'{hex}'")
            }
            other => crate::dialect::default_value_to_literal(self, other),
        }
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn generated_key_plan(&self) -> KeyRetrievalPlan {
        KeyRetrievalPlan::Returning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_and_guid_use_firebird_coercions() {
        let dialect = FirebirdDialect;
        assert_eq!(dialect.value_to_literal(&Value::Bool(true)), "1");
        assert!(dialect
            .value_to_literal(&Value::Guid(uuid::Uuid::nil()))
            .starts_with("x'"));
    }
}
