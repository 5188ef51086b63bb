use crate::Value;
use crate::dialect::{
    DbProduct, DialectCapabilities, KeyRetrievalPlan, PlaceholderStyle, SqlDialect,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn product(&self) -> DbProduct {
        DbProduct::MySql
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::JSON_TYPES
            | DialectCapabilities::CTE
            | DialectCapabilities::WINDOW_FUNCTIONS
            | DialectCapabilities::PREPARE_STATEMENTS
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.quote_identifier(s), self.quote_identifier(table)),
            None => self.quote_identifier(table),
        }
    }

    fn value_to_literal(&self, value: &Value) -> String {
        match value {
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                format!("0x{hex}")
            }
            other => crate::dialect::default_value_to_literal(self, other),
        }
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\\', "\\\\").replace('\'', "\\'")
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn generated_key_plan(&self) -> KeyRetrievalPlan {
        KeyRetrievalPlan::SessionScopedFunction("LAST_INSERT_ID()")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_use_backticks() {
        let dialect = MySqlDialect;
        assert_eq!(dialect.quote_identifier("order"), "`order`");
    }

    #[test]
    fn byte_literals_use_0x_prefix() {
        let dialect = MySqlDialect;
        assert_eq!(
            dialect.value_to_literal(&Value::Bytes(vec![0xde, 0xad])),
            "0xdead"
        );
    }

    #[test]
    fn generated_key_plan_uses_last_insert_id() {
        assert_eq!(
            MySqlDialect.generated_key_plan(),
            KeyRetrievalPlan::SessionScopedFunction("LAST_INSERT_ID()")
        );
    }
}
