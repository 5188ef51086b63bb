use crate::Value;
use crate::dialect::{
    DbProduct, DialectCapabilities, KeyRetrievalPlan, PlaceholderStyle, SqlDialect,
    default_value_to_literal,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDialect;

impl SqlDialect for DuckDbDialect {
    fn product(&self) -> DbProduct {
        DbProduct::DuckDb
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::INSERT_RETURNING
            | DialectCapabilities::JSON_TYPES
            | DialectCapabilities::ARRAY_TYPES
            | DialectCapabilities::WINDOW_FUNCTIONS
            | DialectCapabilities::CTE
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.quote_identifier(s), self.quote_identifier(table)),
            None => self.quote_identifier(table),
        }
    }

    fn value_to_literal(&self, value: &Value) -> String {
        default_value_to_literal(self, value)
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
    fn duckdb_supports_returning() {
        assert!(DuckDbDialect.supports_returning());
    }
}
