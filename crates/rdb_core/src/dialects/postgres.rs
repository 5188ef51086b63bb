use crate::Value;
use crate::dialect::{
    DbProduct, DialectCapabilities, KeyRetrievalPlan, PlaceholderStyle, SqlDialect,
    default_value_to_literal,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn product(&self) -> DbProduct {
        DbProduct::Postgres
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::INSERT_RETURNING
            | DialectCapabilities::SAVEPOINTS
            | DialectCapabilities::JSON_TYPES
            | DialectCapabilities::ARRAY_TYPES
            | DialectCapabilities::MERGE
            | DialectCapabilities::WINDOW_FUNCTIONS
            | DialectCapabilities::CTE
            | DialectCapabilities::PREPARE_STATEMENTS
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
        PlaceholderStyle::ColonName
    }

    fn generated_key_plan(&self) -> KeyRetrievalPlan {
        KeyRetrievalPlan::Returning
    }
}
