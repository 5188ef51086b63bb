use crate::dialect::DbProduct;
use crate::error::DbError;

/// How a dialect wraps a stored-procedure call in SQL text, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcWrappingStyle {
    /// `EXEC proc arg1, arg2` (SQL Server).
    Exec,
    /// ANSI `{ CALL proc(arg1, arg2) }` (MySQL/MariaDB, SQLite via ODBC).
    Call,
    /// `SELECT proc(arg1, arg2)` (PostgreSQL).
    PostgreSql,
    /// `BEGIN proc(arg1, arg2); END;` (Oracle).
    Oracle,
    /// `EXECUTE PROCEDURE proc(arg1, arg2)` (Firebird).
    ExecuteProcedure,
    /// No procedure-wrapping support; calling always fails.
    Unsupported,
}

pub fn proc_wrapping_style(product: DbProduct) -> ProcWrappingStyle {
    match product {
        DbProduct::SqlServer => ProcWrappingStyle::Exec,
        DbProduct::MySql | DbProduct::Sqlite => ProcWrappingStyle::Call,
        DbProduct::Postgres => ProcWrappingStyle::PostgreSql,
        DbProduct::Oracle => ProcWrappingStyle::Oracle,
        DbProduct::Firebird => ProcWrappingStyle::ExecuteProcedure,
        DbProduct::DuckDb | DbProduct::Standard => ProcWrappingStyle::Unsupported,
    }
}

/// Renders a procedure call per `style`. `argument_markers` are already
/// dialect-rendered parameter markers (e.g. `@p1`, `$1`), in call order.
pub fn wrap_procedure_call(
    style: ProcWrappingStyle,
    procedure_name: &str,
    argument_markers: &[String],
) -> Result<String, DbError> {
    if procedure_name.trim().is_empty() {
        return Err(DbError::invalid_argument(
            "Procedure name cannot be null or empty.",
        ));
    }

    let args = argument_markers.join(", ");

    match style {
        ProcWrappingStyle::Exec => Ok(format!("EXEC {procedure_name} {args}")),
        ProcWrappingStyle::Call => Ok(format!("{{ CALL {procedure_name}({args}) }}")),
        ProcWrappingStyle::PostgreSql => Ok(format!("SELECT {procedure_name}({args})")),
        ProcWrappingStyle::Oracle => Ok(format!("BEGIN {procedure_name}({args}); END;")),
        ProcWrappingStyle::ExecuteProcedure => Ok(format!("EXECUTE PROCEDURE {procedure_name}({args})")),
        ProcWrappingStyle::Unsupported => Err(DbError::not_supported(
            "Stored procedures are not supported by this database.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_server_wraps_with_exec() {
        let sql = wrap_procedure_call(
            ProcWrappingStyle::Exec,
            "dbo.DoThing",
            &["@p1".to_string(), "@p2".to_string()],
        )
        .unwrap();
        assert_eq!(sql, "EXEC dbo.DoThing @p1, @p2");
    }

    #[test]
    fn oracle_wraps_with_begin_end_block() {
        let sql = wrap_procedure_call(ProcWrappingStyle::Oracle, "do_thing", &[":p1".to_string()]).unwrap();
        assert_eq!(sql, "BEGIN do_thing(:p1); END;");
    }

    #[test]
    fn unsupported_style_fails_with_not_supported() {
        let result = wrap_procedure_call(ProcWrappingStyle::Unsupported, "anything", &[]);
        assert!(matches!(result, Err(DbError::NotSupported(msg)) if msg == "Stored procedures are not supported by this database."));
    }

    #[test]
    fn empty_procedure_name_fails() {
        let result = wrap_procedure_call(ProcWrappingStyle::Exec, "  ", &[]);
        assert!(matches!(result, Err(DbError::InvalidArgument(msg)) if msg.starts_with("Procedure name cannot be null or empty.")));
    }

    #[test]
    fn duckdb_has_no_procedure_support() {
        assert_eq!(proc_wrapping_style(DbProduct::DuckDb), ProcWrappingStyle::Unsupported);
    }
}
