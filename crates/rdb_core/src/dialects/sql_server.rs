use crate::Value;
use crate::dialect::{
    DbProduct, DialectCapabilities, KeyRetrievalPlan, PlaceholderStyle, SqlDialect,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn product(&self) -> DbProduct {
        DbProduct::SqlServer
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::OUTPUT_INSERTED
            | DialectCapabilities::SAVEPOINTS
            | DialectCapabilities::MERGE
            | DialectCapabilities::WINDOW_FUNCTIONS
            | DialectCapabilities::CTE
            | DialectCapabilities::PREPARE_STATEMENTS
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.quote_identifier(s), self.quote_identifier(table)),
            None => self.quote_identifier(table),
        }
    }

    fn value_to_literal(&self, value: &Value) -> String {
        match value {
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                format!("0x{hex}")
            }
            other => crate::dialect::default_value_to_literal(self, other),
        }
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtName
    }

    fn generated_key_plan(&self) -> KeyRetrievalPlan {
        KeyRetrievalPlan::OutputInserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_use_square_brackets() {
        let dialect = SqlServerDialect;
        assert_eq!(dialect.quote_identifier("user"), "[user]");
        assert_eq!(dialect.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn booleans_render_as_bit_literals() {
        let dialect = SqlServerDialect;
        assert_eq!(dialect.value_to_literal(&Value::Bool(true)), "1");
        assert_eq!(dialect.value_to_literal(&Value::Bool(false)), "0");
    }
}
