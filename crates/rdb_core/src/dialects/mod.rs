mod duckdb;
mod firebird;
mod mysql;
mod oracle;
mod postgres;
mod sql_server;
mod sqlite;

pub use duckdb::DuckDbDialect;
pub use firebird::FirebirdDialect;
pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sql_server::SqlServerDialect;
pub use sqlite::SqliteDialect;

use crate::dialect::{DbProduct, SqlDialect, StandardDialect};

/// Resolve the concrete dialect implementation for a detected product.
/// `DbProduct::Standard` maps to the ANSI fallback.
pub fn dialect_for_product(product: DbProduct) -> &'static dyn SqlDialect {
    match product {
        DbProduct::SqlServer => &SqlServerDialect,
        DbProduct::Postgres => &PostgresDialect,
        DbProduct::MySql => &MySqlDialect,
        DbProduct::Oracle => &OracleDialect,
        DbProduct::Sqlite => &SqliteDialect,
        DbProduct::Firebird => &FirebirdDialect,
        DbProduct::DuckDb => &DuckDbDialect,
        DbProduct::Standard => &StandardDialect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_for_product_round_trips_product_tag() {
        for product in [
            DbProduct::SqlServer,
            DbProduct::Postgres,
            DbProduct::MySql,
            DbProduct::Oracle,
            DbProduct::Sqlite,
            DbProduct::Firebird,
            DbProduct::DuckDb,
            DbProduct::Standard,
        ] {
            assert_eq!(dialect_for_product(product).product(), product);
        }
    }
}
