use std::{env, fmt, net::SocketAddr};

use super::{server_bind_address, DEFAULT_DATABASE_URL};

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub session_token_secret: Vec<u8>,
    pub identity_base_url: String,
    pub blob_base_url: String,
    pub sse_heartbeat_secs: u64,
}

const DEFAULT_SSE_HEARTBEAT_SECS: u64 = 15;

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let session_token_secret = env::var("SESSION_TOKEN_SECRET")
            .map(String::into_bytes)
            .map_err(|_| ConfigError::MissingSessionSecret)?;
        if session_token_secret.is_empty() {
            return Err(ConfigError::MissingSessionSecret);
        }

        let identity_base_url =
            env::var("IDENTITY_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8090/".to_string());
        let blob_base_url =
            env::var("BLOB_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8091/".to_string());

        let sse_heartbeat_secs = match env::var("SSE_HEARTBEAT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidHeartbeat(raw))?,
            Err(_) => DEFAULT_SSE_HEARTBEAT_SECS,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            session_token_secret,
            identity_base_url,
            blob_base_url,
            sse_heartbeat_secs,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingSessionSecret,
    InvalidHeartbeat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingSessionSecret => {
                write!(f, "SESSION_TOKEN_SECRET must be set and non-empty")
            }
            Self::InvalidHeartbeat(value) => {
                write!(f, "SSE_HEARTBEAT_SECS must be a number of seconds (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_BIND_ADDR, ENV_GUARD};

    fn clear_env() {
        for key in [
            "APP_ENV",
            "APP_BIND_ADDR",
            "DATABASE_URL",
            "SESSION_TOKEN_SECRET",
            "IDENTITY_BASE_URL",
            "BLOB_BASE_URL",
            "SSE_HEARTBEAT_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("SESSION_TOKEN_SECRET", "supersecret");

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.sse_heartbeat_secs, DEFAULT_SSE_HEARTBEAT_SECS);

        clear_env();
    }

    #[test]
    fn session_secret_is_required() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let err = AppConfig::from_env().expect_err("missing secret should error");
        assert!(matches!(err, ConfigError::MissingSessionSecret));
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("SESSION_TOKEN_SECRET", "supersecret");
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn parses_production_environment_and_overrides() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("SESSION_TOKEN_SECRET", "supersecret");
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("DATABASE_URL", "sqlite:///var/lib/joblane.db");
        env::set_var("SSE_HEARTBEAT_SECS", "30");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.database_url, "sqlite:///var/lib/joblane.db");
        assert_eq!(config.sse_heartbeat_secs, 30);

        clear_env();
    }
}
