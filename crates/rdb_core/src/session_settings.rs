use crate::dialect::DbProduct;
use crate::provider::ConnectionStringBuilder;

/// The statements the context runs on every freshly opened physical
/// connection, per §4.1 step 5 / §4.2. Returned as a single string; a
/// provider connection with no multi-statement batching executes it as one
/// batch, matching every target dialect's session-settings convention.
fn read_write_preamble(product: DbProduct) -> &'static str {
    match product {
        DbProduct::Sqlite => "PRAGMA foreign_keys = ON;",
        DbProduct::Oracle => "ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY-MM-DD';",
        _ => "",
    }
}

/// The additional statements applied only for read-only connections and
/// read-only transactions (§4.1.3's "apply the dialect's read-only session
/// settings on the transaction's connection before first use").
fn read_only_delta(product: DbProduct) -> &'static str {
    match product {
        DbProduct::Postgres => "SET default_transaction_read_only=on;",
        DbProduct::MySql => "SET SESSION TRANSACTION READ ONLY;",
        DbProduct::Sqlite => "PRAGMA query_only = 1;",
        DbProduct::DuckDb => "PRAGMA read_only=1;",
        DbProduct::Oracle => "ALTER SESSION SET READ ONLY;",
        // SQL Server and Firebird express read-only at the transaction
        // isolation/API level rather than through a session statement.
        DbProduct::SqlServer | DbProduct::Firebird | DbProduct::Standard => "",
    }
}

/// Resolves the preamble a connection (or transaction) actually needs: the
/// read-write preamble always, plus the read-only delta appended when
/// `read_only` is set — per §8's S5 scenario, joined with `\n` when both
/// halves are non-empty.
pub fn session_settings_preamble(product: DbProduct, read_only: bool) -> String {
    let rw = read_write_preamble(product);
    if !read_only {
        return rw.to_string();
    }

    let ro = read_only_delta(product);
    match (rw.is_empty(), ro.is_empty()) {
        (true, true) => String::new(),
        (true, false) => ro.to_string(),
        (false, true) => rw.to_string(),
        (false, false) => format!("{rw}\n{ro}"),
    }
}

/// Injects the dialect's connection-string-level read-only knobs, per
/// §4.1.2. Absent for in-memory SQLite/DuckDB sources, where there is no
/// separate "open read-only" mode to request at the string level — those
/// rely entirely on the session-level `read_only_delta` pragma instead.
pub fn apply_read_only_connection_string(
    product: DbProduct,
    is_file_based: bool,
    builder: &mut dyn ConnectionStringBuilder,
) {
    match product {
        DbProduct::SqlServer => builder.set("ApplicationIntent", "ReadOnly"),
        DbProduct::Postgres => builder.set("Options", "-c default_transaction_read_only=on"),
        DbProduct::DuckDb if is_file_based => builder.set("access_mode", "READ_ONLY"),
        DbProduct::Sqlite if is_file_based => builder.set("Mode", "ReadOnly"),
        _ => {}
    }
}

/// Appends the `:ro` application-name suffix when the dialect exposes an
/// application-name connection-string key, per §4.1.2.
fn application_name_key(product: DbProduct) -> Option<&'static str> {
    match product {
        DbProduct::SqlServer => Some("Application Name"),
        DbProduct::Postgres => Some("Application Name"),
        DbProduct::MySql => Some("Program Name"),
        _ => None,
    }
}

pub fn apply_read_only_application_name_suffix(product: DbProduct, builder: &mut dyn ConnectionStringBuilder) {
    let Some(key) = application_name_key(product) else {
        return;
    };
    if let Some(existing) = builder.get(key).map(str::to_string) {
        builder.set(key, &crate::connection_string::apply_read_only_suffix(&existing));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_string::KeyValueConnectionStringBuilder;

    #[test]
    fn oracle_read_only_preamble_matches_scenario_s5() {
        let preamble = session_settings_preamble(DbProduct::Oracle, true);
        assert_eq!(
            preamble,
            "ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY-MM-DD';\nALTER SESSION SET READ ONLY;"
        );
    }

    #[test]
    fn oracle_read_write_preamble_omits_read_only_delta() {
        assert_eq!(
            session_settings_preamble(DbProduct::Oracle, false),
            "ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY-MM-DD';"
        );
    }

    #[test]
    fn postgres_has_no_read_write_preamble_but_has_read_only_delta() {
        assert_eq!(session_settings_preamble(DbProduct::Postgres, false), "");
        assert_eq!(
            session_settings_preamble(DbProduct::Postgres, true),
            "SET default_transaction_read_only=on;"
        );
    }

    #[test]
    fn sql_server_read_only_connection_string_sets_application_intent() {
        let mut builder = KeyValueConnectionStringBuilder::parse("Server=.;Database=db");
        apply_read_only_connection_string(DbProduct::SqlServer, false, &mut builder);
        assert_eq!(builder.get("ApplicationIntent"), Some("ReadOnly"));
    }

    #[test]
    fn sqlite_memory_source_gets_no_mode_readonly_knob() {
        let mut builder = KeyValueConnectionStringBuilder::parse(":memory:");
        apply_read_only_connection_string(DbProduct::Sqlite, false, &mut builder);
        assert!(!builder.contains_key("Mode"));
    }

    #[test]
    fn sqlite_file_source_gets_mode_readonly_knob() {
        let mut builder = KeyValueConnectionStringBuilder::parse("Data Source=app.db");
        apply_read_only_connection_string(DbProduct::Sqlite, true, &mut builder);
        assert_eq!(builder.get("Mode"), Some("ReadOnly"));
    }

    #[test]
    fn application_name_gets_ro_suffix_when_present() {
        let mut builder = KeyValueConnectionStringBuilder::parse("Host=db;Application Name=svc");
        apply_read_only_application_name_suffix(DbProduct::Postgres, &mut builder);
        assert_eq!(builder.get("Application Name"), Some("svc:ro"));
    }
}
