use crate::dialect::DbProduct;

/// Coarse SQL-conformance tier inferred from a detected product/version,
/// used by callers that want to gate a feature on "does the backend
/// understand window functions" without hard-coding a product check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SqlStandardLevel {
    /// Detection failed or the product is unrecognized; assume the least
    /// capable tier.
    Unknown,
    Ansi92,
    Ansi99,
    Modern,
}

/// What `detect_database_info` learned about the backend it connected to.
#[derive(Debug, Clone, Default)]
pub struct DatabaseInfo {
    pub product_version: String,
    pub standard_level: SqlStandardLevel,
    /// SQL Server only: whether READ_COMMITTED_SNAPSHOT is on for the
    /// current database.
    pub rcsi_enabled: bool,
    /// SQL Server only: whether ALLOW_SNAPSHOT_ISOLATION is on.
    pub snapshot_isolation_enabled: bool,
}

impl Default for SqlStandardLevel {
    fn default() -> Self {
        SqlStandardLevel::Unknown
    }
}

/// The scalar query run against each product to learn its version string,
/// in probe order. `detect_database_info` falls back silently to the next
/// probe (and finally to `Unknown`) on any query failure, per §7's
/// detection-failure propagation policy: a probe failing never surfaces as
/// an error to the caller, only as a less precise `DatabaseInfo`.
pub fn version_probe_query(product: DbProduct) -> &'static str {
    match product {
        DbProduct::SqlServer => "SELECT @@VERSION",
        DbProduct::Postgres => "SELECT version()",
        DbProduct::MySql => "SELECT VERSION()",
        DbProduct::Oracle => "SELECT * FROM v$version WHERE banner LIKE 'Oracle%'",
        DbProduct::Sqlite => "SELECT sqlite_version()",
        DbProduct::Firebird => "SELECT rdb$get_context('SYSTEM', 'ENGINE_VERSION') FROM rdb$database",
        DbProduct::DuckDb => "PRAGMA version",
        DbProduct::Standard => "SELECT 1",
    }
}

/// Parses a version banner into a `(major, minor)` pair, tolerant of the
/// surrounding free text each product wraps its version number in.
pub fn parse_version_banner(product: DbProduct, banner: &str) -> Option<(u32, u32)> {
    match product {
        DbProduct::SqlServer => parse_after_marker(banner, "SQL Server"),
        DbProduct::Postgres => parse_after_marker(banner, "PostgreSQL"),
        DbProduct::MySql | DbProduct::Oracle | DbProduct::Sqlite | DbProduct::DuckDb => {
            parse_leading_dotted_number(banner.trim())
        }
        DbProduct::Firebird => parse_firebird_banner(banner),
        DbProduct::Standard => None,
    }
}

fn parse_after_marker(banner: &str, marker: &str) -> Option<(u32, u32)> {
    let idx = banner.find(marker)?;
    let rest = banner[idx + marker.len()..].trim_start();
    parse_leading_dotted_number(rest)
}

fn parse_leading_dotted_number(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.split(|c: char| !c.is_ascii_digit() && c != '.');
    let token = parts.find(|p| !p.is_empty())?;
    let mut numbers = token.split('.');
    let major: u32 = numbers.next()?.parse().ok()?;
    let minor: u32 = numbers.next().unwrap_or("0").parse().unwrap_or(0);
    Some((major, minor))
}

/// Firebird reports its version as either a bare `"3.0.7"` (via
/// `ENGINE_VERSION`) or a legacy `"LI-V3.0.7 Firebird 3.0"` banner.
fn parse_firebird_banner(banner: &str) -> Option<(u32, u32)> {
    if let Some(idx) = banner.find("Firebird") {
        return parse_leading_dotted_number(banner[idx + "Firebird".len()..].trim_start());
    }
    if let Some(stripped) = banner.strip_prefix("LI-V").or_else(|| banner.strip_prefix("WI-V")) {
        return parse_leading_dotted_number(stripped);
    }
    parse_leading_dotted_number(banner.trim())
}

fn standard_level_for(product: DbProduct, version: Option<(u32, u32)>) -> SqlStandardLevel {
    let Some((major, _minor)) = version else {
        return SqlStandardLevel::Unknown;
    };

    match product {
        DbProduct::Postgres if major >= 9 => SqlStandardLevel::Modern,
        DbProduct::MySql if major >= 8 => SqlStandardLevel::Modern,
        DbProduct::SqlServer if major >= 11 => SqlStandardLevel::Modern,
        DbProduct::Sqlite if major == 3 => SqlStandardLevel::Modern,
        DbProduct::Oracle if major >= 12 => SqlStandardLevel::Modern,
        DbProduct::Firebird if major >= 3 => SqlStandardLevel::Modern,
        DbProduct::DuckDb => SqlStandardLevel::Modern,
        DbProduct::Standard => SqlStandardLevel::Ansi92,
        _ => SqlStandardLevel::Ansi99,
    }
}

/// Builds a `DatabaseInfo` from a successfully read banner (the RCSI/
/// snapshot-isolation flags are filled in separately by the caller, which
/// runs a second SQL-Server-only probe — see `context::DatabaseContext`).
pub fn database_info_from_banner(product: DbProduct, banner: &str) -> DatabaseInfo {
    let version = parse_version_banner(product, banner);
    DatabaseInfo {
        product_version: banner.to_string(),
        standard_level: standard_level_for(product, version),
        rcsi_enabled: false,
        snapshot_isolation_enabled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sql_server_banner() {
        let banner = "Microsoft SQL Server 2019 (RTM) - 15.0.2000.5 (X64)";
        assert_eq!(parse_version_banner(DbProduct::SqlServer, banner), Some((2019, 0)));
    }

    #[test]
    fn parses_postgres_banner() {
        let banner = "PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc";
        assert_eq!(parse_version_banner(DbProduct::Postgres, banner), Some((16, 2)));
    }

    #[test]
    fn parses_mysql_banner() {
        assert_eq!(parse_version_banner(DbProduct::MySql, "8.0.36-log"), Some((8, 0)));
    }

    #[test]
    fn parses_firebird_legacy_banner() {
        let banner = "LI-V3.0.7.33374 Firebird 3.0";
        assert_eq!(parse_version_banner(DbProduct::Firebird, banner), Some((3, 0)));
    }

    #[test]
    fn parses_firebird_bare_version() {
        assert_eq!(parse_version_banner(DbProduct::Firebird, "4.0.3"), Some((4, 0)));
    }

    #[test]
    fn unparseable_banner_yields_unknown_level() {
        let info = database_info_from_banner(DbProduct::Standard, "");
        assert_eq!(info.standard_level, SqlStandardLevel::Ansi92);
    }

    #[test]
    fn modern_postgres_is_modern_level() {
        let info = database_info_from_banner(DbProduct::Postgres, "PostgreSQL 16.2");
        assert_eq!(info.standard_level, SqlStandardLevel::Modern);
    }
}
