// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use formation_webhook::WebhookClientConfig;

/// Formation engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Timeout applied to every webhook call
    pub client_timeout: Duration,
    /// PEM certificate chain and key for the mutual TLS webhook client
    pub mtls: Option<MtlsPaths>,
    /// Pairs processed concurrently by bulk operations
    pub max_concurrent_pairs: usize,
}

/// Locations of the mutual TLS client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `FORMATION_DATABASE_PATH`: SQLite file (default: .data/formations.db)
    /// - `FORMATION_CLIENT_TIMEOUT_SECS`: webhook timeout in seconds (default: 30)
    /// - `FORMATION_MTLS_CERT_PATH` / `FORMATION_MTLS_KEY_PATH`: mTLS identity, both or neither
    /// - `FORMATION_MAX_CONCURRENT_PAIRS`: bulk fan-out (default: 1)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = Self::database_path_from_env();

        let timeout_secs: u64 = std::env::var("FORMATION_CLIENT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::Invalid(
                "FORMATION_CLIENT_TIMEOUT_SECS",
                "must be a positive integer",
            ))?;

        let max_concurrent_pairs: usize = std::env::var("FORMATION_MAX_CONCURRENT_PAIRS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "FORMATION_MAX_CONCURRENT_PAIRS",
                "must be a positive integer",
            ))?;

        let cert = std::env::var("FORMATION_MTLS_CERT_PATH").ok();
        let key = std::env::var("FORMATION_MTLS_KEY_PATH").ok();
        let mtls = match (cert, key) {
            (Some(cert_path), Some(key_path)) => Some(MtlsPaths {
                cert_path: cert_path.into(),
                key_path: key_path.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("FORMATION_MTLS_KEY_PATH")),
            (None, Some(_)) => return Err(ConfigError::Missing("FORMATION_MTLS_CERT_PATH")),
        };

        Ok(Self {
            database_path,
            client_timeout: Duration::from_secs(timeout_secs),
            mtls,
            max_concurrent_pairs,
        })
    }

    /// `FORMATION_DATABASE_PATH`, for callers that only touch storage.
    pub fn database_path_from_env() -> PathBuf {
        std::env::var("FORMATION_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".data/formations.db"))
    }

    /// Webhook client settings, reading the mTLS identity from disk.
    pub fn webhook_client_config(&self) -> Result<WebhookClientConfig, ConfigError> {
        let mtls_identity_pem = match &self.mtls {
            Some(paths) => {
                let mut pem = read_pem(&paths.cert_path)?;
                pem.push(b'\n');
                pem.extend(read_pem(&paths.key_path)?);
                Some(pem)
            }
            None => None,
        };

        Ok(WebhookClientConfig {
            timeout: self.client_timeout,
            mtls_identity_pem,
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    /// A configured file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serializes tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const KEYS: [&str; 5] = [
        "FORMATION_DATABASE_PATH",
        "FORMATION_CLIENT_TIMEOUT_SECS",
        "FORMATION_MTLS_CERT_PATH",
        "FORMATION_MTLS_KEY_PATH",
        "FORMATION_MAX_CONCURRENT_PAIRS",
    ];

    /// Sets env vars for a test and restores them on drop
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for key in KEYS {
                guard.remove(key);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_path, PathBuf::from(".data/formations.db"));
        assert_eq!(config.client_timeout, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_pairs, 1);
        assert!(config.mtls.is_none());
    }

    #[test]
    fn test_config_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("FORMATION_DATABASE_PATH", "/var/lib/formations/db.sqlite");
        guard.set("FORMATION_CLIENT_TIMEOUT_SECS", "5");
        guard.set("FORMATION_MTLS_CERT_PATH", "/etc/tls/client.crt");
        guard.set("FORMATION_MTLS_KEY_PATH", "/etc/tls/client.key");
        guard.set("FORMATION_MAX_CONCURRENT_PAIRS", "8");

        let config = Config::from_env().unwrap();

        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/formations/db.sqlite")
        );
        assert_eq!(config.client_timeout, Duration::from_secs(5));
        assert_eq!(config.max_concurrent_pairs, 8);
        assert_eq!(
            config.mtls,
            Some(MtlsPaths {
                cert_path: "/etc/tls/client.crt".into(),
                key_path: "/etc/tls/client.key".into(),
            })
        );
    }

    #[test]
    fn test_config_invalid_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("FORMATION_CLIENT_TIMEOUT_SECS", "soon");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("FORMATION_CLIENT_TIMEOUT_SECS", _)
        ));

        guard.set("FORMATION_CLIENT_TIMEOUT_SECS", "0");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_invalid_max_concurrent_pairs() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("FORMATION_MAX_CONCURRENT_PAIRS", "-2");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("FORMATION_MAX_CONCURRENT_PAIRS", _)
        ));
    }

    #[test]
    fn test_config_mtls_requires_both_paths() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("FORMATION_MTLS_CERT_PATH", "/etc/tls/client.crt");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("FORMATION_MTLS_KEY_PATH")));
        assert!(err.to_string().contains("FORMATION_MTLS_KEY_PATH"));
    }

    #[test]
    fn test_webhook_client_config_reads_identity() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("client.crt");
        let key = dir.path().join("client.key");
        std::fs::write(&cert, "CERT").unwrap();
        std::fs::write(&key, "KEY").unwrap();

        guard.set("FORMATION_MTLS_CERT_PATH", cert.to_str().unwrap());
        guard.set("FORMATION_MTLS_KEY_PATH", key.to_str().unwrap());

        let config = Config::from_env().unwrap();
        let client_config = config.webhook_client_config().unwrap();

        assert_eq!(client_config.timeout, Duration::from_secs(30));
        assert_eq!(client_config.mtls_identity_pem.unwrap(), b"CERT\nKEY");
    }

    #[test]
    fn test_webhook_client_config_missing_identity_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("absent.crt");
        let key = dir.path().join("absent.key");
        guard.set("FORMATION_MTLS_CERT_PATH", cert.to_str().unwrap());
        guard.set("FORMATION_MTLS_KEY_PATH", key.to_str().unwrap());

        let err = Config::from_env()
            .unwrap()
            .webhook_client_config()
            .unwrap_err();

        assert!(matches!(&err, ConfigError::Unreadable { path, .. } if *path == cert));
        assert!(err.to_string().contains("absent.crt"));
    }

    #[test]
    fn test_database_path_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        assert_eq!(
            Config::database_path_from_env(),
            PathBuf::from(".data/formations.db")
        );

        guard.set("FORMATION_DATABASE_PATH", "/tmp/report.db");
        guard.set("FORMATION_CLIENT_TIMEOUT_SECS", "soon");
        assert_eq!(
            Config::database_path_from_env(),
            PathBuf::from("/tmp/report.db")
        );
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("MY_VAR");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: MY_VAR"
        );

        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
