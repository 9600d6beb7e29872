//! Application state and configuration.

use std::sync::Arc;

use chronicle_ingest::{Aggregator, IngestConfig};

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8000").
    pub bind_addr: String,

    /// Prometheus exporter port, 0 when disabled.
    pub metrics_port: u16,

    /// Ingestion core settings.
    pub ingest: IngestConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `CHRONICLE_BIND_HOST`: Interface to bind (default: "0.0.0.0")
    /// - `APP_PORT`: HTTP port (default: 8000)
    /// - `METRICS_PORT`: Prometheus port (default: 0, disabled)
    /// - `DEDUPLICATION_DB_PATH`: SQLite database path (default: ".chronicle.db")
    pub fn from_env() -> anyhow::Result<Self> {
        let host =
            std::env::var("CHRONICLE_BIND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = port_from_env("APP_PORT", 8000)?;
        let metrics_port = port_from_env("METRICS_PORT", 0)?;
        let ingest = IngestConfig::from_env();

        let bind_addr = format!("{}:{}", host, port);

        tracing::info!(
            bind_addr = %bind_addr,
            metrics_port,
            db_path = %ingest.db_path.display(),
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            metrics_port,
            ingest,
        })
    }
}

fn port_from_env(name: &str, default: u16) -> anyhow::Result<u16> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a port number, got {:?}", name, raw)),
        _ => Ok(default),
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The ingestion pipeline.
    pub aggregator: Arc<Aggregator>,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Create the state and its (not yet initialized) aggregator.
    pub fn new(config: Config) -> Self {
        let aggregator = Arc::new(Aggregator::new(&config.ingest));
        Self {
            aggregator,
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 3] = ["CHRONICLE_BIND_HOST", "APP_PORT", "METRICS_PORT"];

    fn with_env<F: FnOnce()>(values: &[(&str, &str)], f: F) {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved: Vec<_> = VARS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        // SAFETY: Serialized by mutex; only test code touches these vars.
        unsafe {
            for key in VARS {
                std::env::remove_var(key);
            }
            for (key, value) in values {
                std::env::set_var(key, value);
            }
        }

        f();

        unsafe {
            for (key, value) in saved {
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_defaults() {
        with_env(&[], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.bind_addr, "0.0.0.0:8000");
            assert_eq!(config.metrics_port, 0);
        });
    }

    #[test]
    fn test_overrides() {
        with_env(
            &[
                ("CHRONICLE_BIND_HOST", "127.0.0.1"),
                ("APP_PORT", "9100"),
                ("METRICS_PORT", "9101"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.bind_addr, "127.0.0.1:9100");
                assert_eq!(config.metrics_port, 9101);
            },
        );
    }

    #[test]
    fn test_state_keeps_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = AppState::new(Config {
            bind_addr: "127.0.0.1:9100".to_string(),
            metrics_port: 9101,
            ingest: IngestConfig {
                db_path: tmp.path().join("db"),
            },
        });

        assert_eq!(state.config.bind_addr, "127.0.0.1:9100");
        assert_eq!(state.config.metrics_port, 9101);
        assert_eq!(state.config.ingest.db_path, tmp.path().join("db"));
        assert_eq!(state.aggregator.queue_depth(), 0);
    }

    #[test]
    fn test_invalid_port() {
        with_env(&[("APP_PORT", "eighty")], || {
            assert!(Config::from_env().is_err());
        });
    }
}
