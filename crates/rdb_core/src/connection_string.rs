use crate::dialect::{DbProduct, SqlDialect};
use crate::provider::ConnectionStringBuilder;

/// A minimal, dependency-free `ConnectionStringBuilder` for the
/// `key=value;key=value` convention most providers share. Providers whose
/// native builder differs (e.g. SQLite's raw-path datasource) supply their
/// own implementation of the trait; this one backs the abstract contracts
/// used throughout the core's own tests.
#[derive(Debug, Clone, Default)]
pub struct KeyValueConnectionStringBuilder {
    entries: Vec<(String, String)>,
}

impl KeyValueConnectionStringBuilder {
    pub fn parse(input: &str) -> Self {
        if !looks_like_key_value(input) {
            // A raw datasource (`:memory:`, a bare file path, a URI) is
            // left unmodified under the special `Data Source` key.
            return Self {
                entries: vec![("Data Source".to_string(), input.to_string())],
            };
        }

        let entries = input
            .split(';')
            .filter(|part| !part.trim().is_empty())
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        Self { entries }
    }
}

/// Whether `input` looks like `key=value;key=value…` rather than a raw
/// datasource string. A raw datasource has no `=` before its first `;` (or
/// no `;` and no `=` at all).
fn looks_like_key_value(input: &str) -> bool {
    let first_segment = input.split(';').next().unwrap_or("");
    first_segment.contains('=')
}

impl ConnectionStringBuilder for KeyValueConnectionStringBuilder {
    fn set(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        before != self.entries.len()
    }

    fn to_connection_string(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// The dialect-specific pooling key names consulted/set by
/// `apply_pooling_defaults`.
struct PoolingKeys {
    enabled: &'static str,
    min_size: &'static str,
}

fn pooling_keys(product: DbProduct) -> Option<PoolingKeys> {
    match product {
        DbProduct::Postgres | DbProduct::MySql | DbProduct::SqlServer => Some(PoolingKeys {
            enabled: "Pooling",
            min_size: "Minimum Pool Size",
        }),
        // Embedded/single-file engines manage their own connection
        // lifecycle; no external pool to configure.
        DbProduct::Sqlite | DbProduct::DuckDb | DbProduct::Firebird | DbProduct::Oracle | DbProduct::Standard => {
            None
        }
    }
}

/// Inject `Pooling=true` / `MinPoolSize=1` (dialect-specific key names) per
/// §4.2.1: only for dialects that advertise external pooling, only outside
/// `SingleConnection` mode, and never overriding a caller-supplied value.
pub fn apply_pooling_defaults(
    dialect: &dyn SqlDialect,
    is_single_connection_mode: bool,
    builder: &mut dyn ConnectionStringBuilder,
) {
    if is_single_connection_mode {
        return;
    }

    let Some(keys) = pooling_keys(dialect.product()) else {
        return;
    };

    if builder.contains_key(keys.enabled) {
        let pooling_disabled = builder
            .get(keys.enabled)
            .map(|v| v.eq_ignore_ascii_case("false"))
            .unwrap_or(false);
        if pooling_disabled {
            return;
        }
    } else {
        builder.set(keys.enabled, "true");
    }

    if !builder.contains_key(keys.min_size) {
        builder.set(keys.min_size, "1");
    }
}

/// Append the `:ro` suffix to an application-name value, per §4.1.2.
pub fn apply_read_only_suffix(application_name: &str) -> String {
    format!("{application_name}:ro")
}
