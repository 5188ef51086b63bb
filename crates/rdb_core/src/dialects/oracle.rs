use crate::Value;
use crate::dialect::{
    DbProduct, DialectCapabilities, KeyRetrievalPlan, PlaceholderStyle, SqlDialect,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn product(&self) -> DbProduct {
        DbProduct::Oracle
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::SAVEPOINTS
            | DialectCapabilities::MERGE
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
        match value {
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            other => crate::dialect::default_value_to_literal(self, other),
        }
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::ColonName
    }

    fn generated_key_plan(&self) -> KeyRetrievalPlan {
        // Oracle sequences are drawn before the insert via `seq.NEXTVAL`
        // rather than recovered afterward (pre-12c has no identity columns).
        KeyRetrievalPlan::PrefetchSequence
    }

    fn sequence_next_value_sql(&self, sequence_name: &str) -> String {
        format!("SELECT {}.NEXTVAL FROM dual", self.quote_identifier(sequence_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_has_no_native_boolean_type() {
        let dialect = OracleDialect;
        assert_eq!(dialect.value_to_literal(&Value::Bool(true)), "1");
    }

    #[test]
    fn generated_key_plan_prefetches_sequence() {
        assert_eq!(OracleDialect.generated_key_plan(), KeyRetrievalPlan::PrefetchSequence);
    }

    #[test]
    fn sequence_next_value_sql_uses_nextval_from_dual() {
        let dialect = OracleDialect;
        assert_eq!(
            dialect.sequence_next_value_sql("widgets_seq"),
            "SELECT \"widgets_seq\".NEXTVAL FROM dual"
        );
    }

    #[test]
    fn placeholder_style_is_named_colon_marker() {
        let dialect = OracleDialect;
        assert_eq!(dialect.parameter_marker("k0", 1), ":k0");
    }
}
