use crate::Value;
use bitflags::bitflags;

/// Placeholder style for parameterized queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// Bare `?`, positional — the marker carries no name (MySQL, Firebird
    /// via ODBC).
    QuestionMark,
    /// `$1`, `$2`, etc., positional by index rather than by name.
    DollarNumber,
    /// `@name` — named, carries the bound parameter's own name (SQL Server,
    /// SQLite).
    AtName,
    /// `:name` — named, carries the bound parameter's own name
    /// (PostgreSQL, Oracle).
    ColonName,
}

/// The concrete product a dialect targets. Used by generic code to branch
/// on behavior that the `SqlDialect` trait intentionally does not expose
/// (session preamble text, pooling defaults) without downcasting trait
/// objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbProduct {
    SqlServer,
    Postgres,
    MySql,
    Oracle,
    Sqlite,
    Firebird,
    DuckDb,
    /// Unrecognized product; conservative ANSI behavior.
    Standard,
}

bitflags! {
    /// Capability flags a dialect may support. Generic code should check
    /// these rather than matching on `DbProduct` wherever a feature, not a
    /// product identity, is what actually matters.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DialectCapabilities: u32 {
        const INSERT_RETURNING   = 1 << 0;
        const OUTPUT_INSERTED    = 1 << 1;
        const SAVEPOINTS         = 1 << 2;
        const JSON_TYPES         = 1 << 3;
        const ARRAY_TYPES        = 1 << 4;
        const MERGE              = 1 << 5;
        const WINDOW_FUNCTIONS   = 1 << 6;
        const CTE                = 1 << 7;
        const PREPARE_STATEMENTS = 1 << 8;
    }
}

/// How a dialect recovers a database-generated key after an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRetrievalPlan {
    /// `RETURNING` clause appended to the INSERT (PostgreSQL, SQLite 3.35+,
    /// DuckDB).
    Returning,
    /// `OUTPUT INSERTED.col` clause (SQL Server).
    OutputInserted,
    /// A follow-up scalar query against a session function
    /// (`LAST_INSERT_ID()`, `SELECT last_insert_rowid()`).
    SessionScopedFunction(&'static str),
    /// The key is drawn from a sequence before the insert runs (Oracle,
    /// Firebird generators) rather than recovered after.
    PrefetchSequence,
    /// A caller-supplied correlation token is echoed back by the insert
    /// and used to look the row up afterward.
    CorrelationToken,
    /// No generated-key mechanism; look the row up by its natural key.
    NaturalKeyLookup,
}

/// Database-specific SQL syntax: quoting, escaping, literal rendering,
/// parameter markers and generated-key recovery strategy.
pub trait SqlDialect: Send + Sync {
    fn product(&self) -> DbProduct;

    fn capabilities(&self) -> DialectCapabilities;

    /// Quote an identifier (table/column name).
    fn quote_identifier(&self, name: &str) -> String;

    /// Build a qualified table reference (`schema.table`, dialect-quoted).
    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String;

    /// Convert a `Value` to a SQL literal string suitable for inlining.
    fn value_to_literal(&self, value: &Value) -> String;

    /// Escape a string for use inside a single-quoted literal.
    fn escape_string(&self, s: &str) -> String;

    /// Returns the placeholder style for this dialect.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// How generated keys are recovered after an insert.
    fn generated_key_plan(&self) -> KeyRetrievalPlan;

    /// Whether this dialect supports a `RETURNING`-shaped clause in
    /// INSERT/UPDATE/DELETE. Convenience derived from `capabilities()`.
    fn supports_returning(&self) -> bool {
        self.capabilities()
            .intersects(DialectCapabilities::INSERT_RETURNING | DialectCapabilities::OUTPUT_INSERTED)
    }

    /// Render a bind-parameter marker for position `index` (1-based) given
    /// a neutral parameter name, in this dialect's placeholder style.
    fn parameter_marker(&self, name: &str, index: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::DollarNumber => format!("${index}"),
            PlaceholderStyle::AtName => format!("@{name}"),
            PlaceholderStyle::ColonName => format!(":{name}"),
        }
    }

    /// Renders the SQL that fetches the next value of a named sequence, for
    /// `KeyRetrievalPlan::PrefetchSequence` dialects. The ANSI/SQL:2003
    /// default is overridden by dialects with their own sequence syntax
    /// (Oracle's `seq.NEXTVAL`).
    fn sequence_next_value_sql(&self, sequence_name: &str) -> String {
        format!("SELECT NEXT VALUE FOR {}", self.quote_identifier(sequence_name))
    }
}

/// ANSI-SQL fallback used for unrecognized products (`DbProduct::Standard`).
/// Conservative: no RETURNING, no MERGE, double-quoted identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect;

impl SqlDialect for StandardDialect {
    fn product(&self) -> DbProduct {
        DbProduct::Standard
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::CTE
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
        KeyRetrievalPlan::NaturalKeyLookup
    }
}

/// Shared `Value` -> literal rendering used by every dialect whose only
/// divergence from ANSI is identifier quoting and the generated-key plan.
/// Dialects with genuinely different literal syntax (e.g. SQL Server's
/// `0x`-prefixed binary literals) override `value_to_literal` directly.
pub(crate) fn default_value_to_literal(dialect: &dyn SqlDialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => {
            if f.is_nan() {
                "'NaN'".to_string()
            } else if f.is_infinite() {
                if *f > 0.0 { "'Infinity'".to_string() } else { "'-Infinity'".to_string() }
            } else {
                f.to_string()
            }
        }
        Value::Text(s) => format!("'{}'", dialect.escape_string(s)),
        Value::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("X'{hex}'")
        }
        Value::Guid(g) => format!("'{g}'"),
        Value::Json(s) => format!("'{}'", dialect.escape_string(s)),
        Value::Decimal(s) => s.clone(),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_dialect_quotes_identifier_with_double_quotes() {
        let dialect = StandardDialect;
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert_eq!(dialect.quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn standard_dialect_has_no_returning_support() {
        let dialect = StandardDialect;
        assert!(!dialect.supports_returning());
        assert_eq!(dialect.generated_key_plan(), KeyRetrievalPlan::NaturalKeyLookup);
    }

    #[test]
    fn float_literal_renders_special_values_as_quoted_strings() {
        let dialect = StandardDialect;
        assert_eq!(dialect.value_to_literal(&Value::Float(f64::NAN)), "'NaN'");
        assert_eq!(
            dialect.value_to_literal(&Value::Float(f64::INFINITY)),
            "'Infinity'"
        );
        assert_eq!(dialect.value_to_literal(&Value::Float(1.5)), "1.5");
    }
}
