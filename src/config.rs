use std::path::PathBuf;

/// Process configuration, read once from `SEATLEDGER_*` environment
/// variables. Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub password: String,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5434,
            password: "seatledger".into(),
            max_connections: 256,
            metrics_port: None,
            catalog_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests need not touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: lookup("SEATLEDGER_BIND").unwrap_or(defaults.bind),
            port: lookup("SEATLEDGER_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            password: lookup("SEATLEDGER_PASSWORD").unwrap_or(defaults.password),
            max_connections: lookup("SEATLEDGER_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_connections),
            metrics_port: lookup("SEATLEDGER_METRICS_PORT").and_then(|s| s.parse().ok()),
            catalog_path: lookup("SEATLEDGER_CATALOG")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
