//! Manager configuration and validation.

use std::time::Duration;

use thiserror::Error;

/// Selector of the only implemented backend.
pub const BACKEND_REDIS: &str = "redis";

/// A configuration invariant violation, detected by [`Config::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker name must not be empty")]
    EmptyWorkerName,

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("store host must not be empty")]
    EmptyHost,

    #[error("key namespace must not be empty")]
    EmptyNamespace,

    #[error("document TTL must be positive")]
    ZeroTtl,

    #[error("wait timeout must be positive")]
    ZeroTimeout,
}

/// Manager configuration, loaded by the embedding application.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker identity used in logs and thread names. Defaults to the
    /// hostname.
    pub worker_name: String,
    /// Backend selector; only [`BACKEND_REDIS`] is recognized.
    pub backend: String,
    /// Store host.
    pub host: String,
    /// Store port.
    pub port: u16,
    /// Optional store password.
    pub password: Option<String>,
    /// Namespace prefixed to every store key.
    pub namespace: String,
    /// TTL applied to job documents and progress streams, counted from
    /// enqueue. Jobs that never complete are still reclaimed.
    pub document_ttl: Duration,
    /// Bound for synchronous waits (`add_job_and_wait`).
    pub timeout: Duration,
    /// Interval between readiness probes.
    pub probe_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(),
            backend: BACKEND_REDIS.to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            namespace: "jobq".to_string(),
            document_ttl: Duration::from_secs(24 * 60 * 60),
            timeout: Duration::from_secs(30),
            probe_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Check invariants in order — worker name, backend, host, namespace,
    /// document TTL, wait timeout — returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_name.is_empty() {
            return Err(ConfigError::EmptyWorkerName);
        }
        if self.backend != BACKEND_REDIS {
            return Err(ConfigError::UnknownBackend(self.backend.clone()));
        }
        if self.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.document_ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Connection URL for the configured store.
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}", password, self.host, self.port),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

fn default_worker_name() -> String {
    let name = gethostname::gethostname().to_string_lossy().into_owned();
    if name.is_empty() {
        "worker".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn empty_worker_name_is_rejected() {
        let config = Config {
            worker_name: String::new(),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyWorkerName));
    }

    #[test]
    fn worker_name_is_checked_before_backend() {
        // Both invariants violated: the first-checked one wins.
        let config = Config {
            worker_name: String::new(),
            backend: "etcd".to_string(),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyWorkerName));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let config = Config {
            backend: "etcd".to_string(),
            host: String::new(),
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownBackend("etcd".to_string()))
        );
    }

    #[test]
    fn backend_checks_precede_timeout_checks() {
        let config = Config {
            host: String::new(),
            namespace: String::new(),
            document_ttl: Duration::ZERO,
            timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyHost));

        let config = Config {
            namespace: String::new(),
            document_ttl: Duration::ZERO,
            timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyNamespace));

        let config = Config {
            document_ttl: Duration::ZERO,
            timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTtl));

        let config = Config {
            timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn redis_url_includes_password_when_set() {
        let mut config = Config {
            host: "redis.internal".to_string(),
            port: 6380,
            ..Config::default()
        };
        assert_eq!(config.redis_url(), "redis://redis.internal:6380");

        config.password = Some("s3cret".to_string());
        assert_eq!(config.redis_url(), "redis://:s3cret@redis.internal:6380");
    }
}
