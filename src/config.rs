use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Environment variable names, one constant per config key.
pub mod env {
    pub const APP_HOST: &str = "APP_HOST";
    pub const APP_PORT: &str = "APP_PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";
    pub const DATABASE_MIN_CONNECTIONS: &str = "DATABASE_MIN_CONNECTIONS";
    pub const DATABASE_MAX_CONN_LIFETIME_SECS: &str = "DATABASE_MAX_CONN_LIFETIME_SECS";
    pub const DATABASE_MAX_CONN_IDLE_SECS: &str = "DATABASE_MAX_CONN_IDLE_SECS";
    pub const DATABASE_ACQUIRE_TIMEOUT_SECS: &str = "DATABASE_ACQUIRE_TIMEOUT_SECS";
    pub const JWT_SECRET: &str = "JWT_SECRET";
    pub const JWT_TTL_MINUTES: &str = "JWT_TTL_MINUTES";
    pub const ARGON2_MEMORY_KIB: &str = "ARGON2_MEMORY_KIB";
    pub const ARGON2_ITERATIONS: &str = "ARGON2_ITERATIONS";
    pub const ARGON2_PARALLELISM: &str = "ARGON2_PARALLELISM";

    pub const ALL: &[&str] = &[
        APP_HOST,
        APP_PORT,
        DATABASE_URL,
        DATABASE_MAX_CONNECTIONS,
        DATABASE_MIN_CONNECTIONS,
        DATABASE_MAX_CONN_LIFETIME_SECS,
        DATABASE_MAX_CONN_IDLE_SECS,
        DATABASE_ACQUIRE_TIMEOUT_SECS,
        JWT_SECRET,
        JWT_TTL_MINUTES,
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
    ];
}

/// Upper bound on `JWT_TTL_MINUTES`: one year.
pub const MAX_JWT_TTL_MINUTES: u64 = 60 * 24 * 365;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

// The URL may embed credentials.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("max_lifetime", &self.max_lifetime)
            .field("idle_timeout", &self.idle_timeout)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl: Duration,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Startup configuration; read once, never reloaded.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub hashing: HashingConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let server = ServerConfig {
            host: get(env::APP_HOST).unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, env::APP_PORT, 8080)?,
        };

        let lifetime_secs: u64 = parse_or(&get, env::DATABASE_MAX_CONN_LIFETIME_SECS, 3600)?;
        let idle_secs: u64 = parse_or(&get, env::DATABASE_MAX_CONN_IDLE_SECS, 1800)?;
        let acquire_secs: u64 = parse_or(&get, env::DATABASE_ACQUIRE_TIMEOUT_SECS, 5)?;
        let database = DatabaseConfig {
            url: required(env::DATABASE_URL)?,
            max_connections: parse_or(&get, env::DATABASE_MAX_CONNECTIONS, 10)?,
            min_connections: parse_or(&get, env::DATABASE_MIN_CONNECTIONS, 2)?,
            max_lifetime: Duration::from_secs(lifetime_secs),
            idle_timeout: Duration::from_secs(idle_secs),
            acquire_timeout: Duration::from_secs(acquire_secs),
        };
        if database.min_connections > database.max_connections {
            return Err(ConfigError::Invalid {
                key: env::DATABASE_MIN_CONNECTIONS,
                value: database.min_connections.to_string(),
            });
        }

        let ttl_minutes: u64 = parse_or(&get, env::JWT_TTL_MINUTES, 60 * 24)?;
        let ttl_secs = ttl_minutes
            .checked_mul(60)
            .filter(|_| ttl_minutes <= MAX_JWT_TTL_MINUTES)
            .ok_or_else(|| ConfigError::Invalid {
                key: env::JWT_TTL_MINUTES,
                value: ttl_minutes.to_string(),
            })?;
        let jwt = JwtConfig {
            secret: required(env::JWT_SECRET)?,
            ttl: Duration::from_secs(ttl_secs),
        };

        let hashing = HashingConfig {
            memory_kib: parse_or(&get, env::ARGON2_MEMORY_KIB, argon2::Params::DEFAULT_M_COST)?,
            iterations: parse_or(&get, env::ARGON2_ITERATIONS, argon2::Params::DEFAULT_T_COST)?,
            parallelism: parse_or(&get, env::ARGON2_PARALLELISM, argon2::Params::DEFAULT_P_COST)?,
        };

        Ok(Self {
            server,
            database,
            jwt,
            hashing,
        })
    }
}

fn parse_or<F, T>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
