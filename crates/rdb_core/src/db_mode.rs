use crate::dialect::DbProduct;

/// Requested connection-lifecycle policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DbMode {
    /// Let `coerce_mode` pick the best policy for the detected product and
    /// topology.
    #[default]
    Best,
    /// A fresh tracked connection per `get_connection` call.
    Standard,
    /// One warm pinned connection kept alive alongside ephemeral traffic.
    KeepAlive,
    /// One pinned writer; reads are ephemeral.
    SingleWriter,
    /// One pinned connection serves both reads and writes.
    SingleConnection,
}

/// Topology facts about the target that `coerce_mode` needs but that are
/// not recoverable from `DbProduct` alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct Topology {
    /// SQL Server LocalDB or an equivalent single-process local server.
    pub is_local_db: bool,
    /// Firebird embedded (or any engine running in-process).
    pub is_embedded: bool,
    /// SQLite `:memory:` with no shared cache — invisible to any other
    /// connection, so pinning to exactly one connection is mandatory.
    pub is_memory_isolated: bool,
}

/// Why the effective mode differs from the caller's request, if at all.
/// `Best` requests always produce `AutoSelected` (informational); any
/// other request that gets coerced produces `Overridden` (a warning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCoercion {
    Unchanged,
    AutoSelected,
    Overridden,
}

/// Resolve the caller's requested `DbMode` to the effective mode for a
/// detected product and topology, per the coercion table.
pub fn coerce_mode(requested: DbMode, product: DbProduct, topology: Topology) -> (DbMode, ModeCoercion) {
    use DbMode::*;

    let effective = if product == DbProduct::Sqlite && topology.is_memory_isolated {
        SingleConnection
    } else if product == DbProduct::Sqlite {
        match requested {
            Best | Standard | SingleWriter => SingleWriter,
            KeepAlive | SingleConnection => SingleConnection,
        }
    } else if product == DbProduct::DuckDb {
        match requested {
            Best | Standard | SingleWriter | KeepAlive => SingleWriter,
            SingleConnection => SingleConnection,
        }
    } else if product == DbProduct::Firebird && topology.is_embedded {
        SingleConnection
    } else if product == DbProduct::SqlServer && topology.is_local_db {
        match requested {
            Best | Standard | KeepAlive => KeepAlive,
            SingleWriter => SingleWriter,
            SingleConnection => SingleConnection,
        }
    } else {
        // Full server products and Unknown share one row.
        match requested {
            Best | Standard => Standard,
            KeepAlive => KeepAlive,
            SingleWriter => SingleWriter,
            SingleConnection => SingleConnection,
        }
    };

    let coercion = if requested == Best {
        ModeCoercion::AutoSelected
    } else if effective != requested {
        ModeCoercion::Overridden
    } else {
        ModeCoercion::Unchanged
    };

    (effective, coercion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_memory_isolated_always_single_connection() {
        let topology = Topology {
            is_memory_isolated: true,
            ..Default::default()
        };
        for requested in [
            DbMode::Best,
            DbMode::Standard,
            DbMode::KeepAlive,
            DbMode::SingleWriter,
            DbMode::SingleConnection,
        ] {
            let (effective, _) = coerce_mode(requested, DbProduct::Sqlite, topology);
            assert_eq!(effective, DbMode::SingleConnection);
        }
    }

    #[test]
    fn duckdb_file_standard_request_coerces_to_single_writer_with_warning() {
        let (effective, coercion) =
            coerce_mode(DbMode::Standard, DbProduct::DuckDb, Topology::default());
        assert_eq!(effective, DbMode::SingleWriter);
        assert_eq!(coercion, ModeCoercion::Overridden);
    }

    #[test]
    fn duckdb_file_best_request_is_auto_selected_not_overridden() {
        let (effective, coercion) = coerce_mode(DbMode::Best, DbProduct::DuckDb, Topology::default());
        assert_eq!(effective, DbMode::SingleWriter);
        assert_eq!(coercion, ModeCoercion::AutoSelected);
    }

    #[test]
    fn full_server_standard_request_is_unchanged() {
        let (effective, coercion) =
            coerce_mode(DbMode::Standard, DbProduct::Postgres, Topology::default());
        assert_eq!(effective, DbMode::Standard);
        assert_eq!(coercion, ModeCoercion::Unchanged);
    }

    #[test]
    fn sql_server_localdb_coerces_standard_to_keep_alive() {
        let topology = Topology {
            is_local_db: true,
            ..Default::default()
        };
        let (effective, coercion) = coerce_mode(DbMode::Standard, DbProduct::SqlServer, topology);
        assert_eq!(effective, DbMode::KeepAlive);
        assert_eq!(coercion, ModeCoercion::Overridden);
    }

    #[test]
    fn firebird_embedded_always_single_connection() {
        let topology = Topology {
            is_embedded: true,
            ..Default::default()
        };
        let (effective, _) = coerce_mode(DbMode::KeepAlive, DbProduct::Firebird, topology);
        assert_eq!(effective, DbMode::SingleConnection);
    }
}
