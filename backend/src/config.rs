//! Configuration management for the stock procurement service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with SPS__ prefix

use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Purchasing workflow configuration
    pub purchasing: PurchasingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for verifying HS256 bearer tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PurchasingConfig {
    /// Markup applied to the buying price when finance omits a selling price
    pub default_markup_percent: Decimal,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("SPS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = Self::defaults(&environment)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (SPS__ prefix)
            .add_source(
                Environment::with_prefix("SPS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("environment", environment)?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default(
                "purchasing.default_markup_percent",
                shared::DEFAULT_MARKUP_PERCENT.to_string(),
            )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        shared::validate_markup_percent(self.purchasing.default_markup_percent)
            .map_err(|msg| ConfigError::Message(format!("purchasing.default_markup_percent: {}", msg)))?;
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::Message("jwt.secret must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(overrides: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let mut builder = Config::defaults("test")?
            .set_override("database.url", "postgres://localhost/sps_test")?
            .set_override("jwt.secret", "test-secret")?;
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = build(&[]).unwrap();
        assert_eq!(config.purchasing.default_markup_percent, Decimal::from(30));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.environment, "test");
    }

    #[test]
    fn test_markup_override() {
        let config = build(&[("purchasing.default_markup_percent", "12.5")]).unwrap();
        assert_eq!(
            config.purchasing.default_markup_percent,
            Decimal::new(125, 1)
        );
    }

    #[test]
    fn test_non_positive_markup_rejected() {
        assert!(build(&[("purchasing.default_markup_percent", "0")]).is_err());
        assert!(build(&[("purchasing.default_markup_percent", "-5")]).is_err());
    }

    #[test]
    fn test_blank_jwt_secret_rejected() {
        assert!(build(&[("jwt.secret", " ")]).is_err());
    }
}
