use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MAX_SIZE: usize = 1024 * 1024 * 5 + 200;
const MAX_TTL_SECONDS: u64 = 60 * 60 * 24 * 30;
/// Upper bound accepted for `MAX_TTL_SECONDS`.
const MAX_TTL_CEILING_SECONDS: u64 = 60 * 60 * 24 * 365;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    Memory,
}

impl FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Everything the server reads from the environment at startup.
#[derive(Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub backend: BackendKind,
    pub database_url: Option<String>,
    pub secret_key: String,
    pub max_size: usize,
    pub max_ttl: Duration,
    pub backend_timeout: Duration,
    pub rate_limit_per_minute: u32,
    pub frontend_origin: Option<String>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("secret_key", &"<redacted>")
            .field("max_size", &self.max_size)
            .field("max_ttl", &self.max_ttl)
            .field("backend_timeout", &self.backend_timeout)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("frontend_origin", &self.frontend_origin)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the raw value
    /// of a variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backend = parse_or(&var, "STORE_BACKEND", BackendKind::Postgres)?;
        let database_url = var("DATABASE_URL");
        if backend == BackendKind::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let secret_key = var("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;

        let max_ttl_seconds: u64 = parse_or(&var, "MAX_TTL_SECONDS", MAX_TTL_SECONDS)?;
        let backend_timeout_secs: u64 = parse_or(&var, "BACKEND_TIMEOUT_SECS", 5)?;
        let rate_limit_per_minute: u32 = parse_or(&var, "RATE_LIMIT_PER_MINUTE", 5)?;

        for (name, value) in [
            ("MAX_TTL_SECONDS", max_ttl_seconds),
            ("BACKEND_TIMEOUT_SECS", backend_timeout_secs),
            ("RATE_LIMIT_PER_MINUTE", u64::from(rate_limit_per_minute)),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    value: value.to_string(),
                });
            }
        }

        if max_ttl_seconds > MAX_TTL_CEILING_SECONDS {
            return Err(ConfigError::Invalid {
                name: "MAX_TTL_SECONDS",
                value: max_ttl_seconds.to_string(),
            });
        }

        Ok(Self {
            address: var("ADDRESS").unwrap_or("127.0.0.1".to_string()),
            port: parse_or(&var, "PORT", 8080)?,
            backend,
            database_url,
            secret_key,
            max_size: parse_or(&var, "MAX_SIZE", MAX_SIZE)?,
            max_ttl: Duration::from_secs(max_ttl_seconds),
            backend_timeout: Duration::from_secs(backend_timeout_secs),
            rate_limit_per_minute,
            frontend_origin: var("FRONTEND_ORIGIN").or_else(|| var("VERCEL_URL")),
        })
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
