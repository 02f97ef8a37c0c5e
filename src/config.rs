//! Environment-driven runtime configuration.

use std::env;

use thiserror::Error;

/// Default listener port when `PORT` is unset.
const DEFAULT_PORT: u16 = 8080;
/// Environment variable carrying the listener port.
const PORT_ENV: &str = "PORT";
/// Environment variable carrying the Postgres connection string.
const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Errors raised while reading the process environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    MissingVar(&'static str),
    #[error("invalid value `{value}` for environment variable `{name}`")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
}

impl AppConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var(PORT_ENV) {
            Ok(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidVar {
                name: PORT_ENV,
                value,
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let database_url =
            env::var(DATABASE_URL_ENV).map_err(|_| ConfigError::MissingVar(DATABASE_URL_ENV))?;

        Ok(Self { port, database_url })
    }
}
