use crate::Value;
use crate::dialect::{
    DbProduct, DialectCapabilities, KeyRetrievalPlan, PlaceholderStyle, SqlDialect,
    default_value_to_literal,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn product(&self) -> DbProduct {
        DbProduct::Sqlite
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::INSERT_RETURNING
            | DialectCapabilities::JSON_TYPES
            | DialectCapabilities::CTE
            | DialectCapabilities::PREPARE_STATEMENTS
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn qualified_table(&self, _schema: Option<&str>, table: &str) -> String {
        // SQLite has no server-side schema namespace beyond ATTACHed
        // databases, which this crate does not model.
        self.quote_identifier(table)
    }

    fn value_to_literal(&self, value: &Value) -> String {
        default_value_to_literal(self, value)
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        // SQLite's driver accepts `@name`-style named parameters alongside
        // `?`; this crate always binds by name.
        PlaceholderStyle::AtName
    }

    fn generated_key_plan(&self) -> KeyRetrievalPlan {
        // Modern SQLite (3.35+) supports RETURNING; this crate targets
        // that floor rather than the pre-RETURNING fallback.
        KeyRetrievalPlan::Returning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_table_ignores_schema() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.qualified_table(Some("main"), "users"), "\"users\"");
    }

    #[test]
    fn placeholder_style_is_named_at_marker() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.parameter_marker("w0", 1), "@w0");
    }
}
