use crate::domain::Decimal;
use crate::engine::{ForfeitureConfig, ForfeitureRates};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub wallet_api_url: String,
    /// Seconds between background accrual refreshes; 0 disables the loop.
    pub accrual_refresh_interval_secs: u64,
    /// Liquidate a stake once principal + accrued reaches this value.
    pub stake_max_value: Option<Decimal>,
    /// An in-progress distribution claim older than this may be taken over.
    pub distribution_lease_ms: i64,
    pub forfeiture: ForfeitureConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let wallet_api_url = env_map
            .get("WALLET_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("WALLET_API_URL".to_string()))?;

        let accrual_refresh_interval_secs = env_map
            .get("ACCRUAL_REFRESH_INTERVAL_SECS")
            .map(|s| s.as_str())
            .unwrap_or("3600")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "ACCRUAL_REFRESH_INTERVAL_SECS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let stake_max_value = match env_map.get("STAKE_MAX_VALUE") {
            None => None,
            Some(raw) => {
                let cap = Decimal::from_str(raw.trim()).map_err(|_| {
                    ConfigError::InvalidValue(
                        "STAKE_MAX_VALUE".to_string(),
                        "must be a decimal amount".to_string(),
                    )
                })?;
                if !cap.is_positive() {
                    return Err(ConfigError::InvalidValue(
                        "STAKE_MAX_VALUE".to_string(),
                        "must be positive".to_string(),
                    ));
                }
                Some(cap)
            }
        };

        let distribution_lease_ms = env_map
            .get("DISTRIBUTION_LEASE_MS")
            .map(|s| s.as_str())
            .unwrap_or("300000")
            .parse::<i64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "DISTRIBUTION_LEASE_MS".to_string(),
                    "must be a positive i64".to_string(),
                )
            })?;

        let defaults = ForfeitureConfig::default();
        let forfeiture = ForfeitureConfig {
            individual: parse_rates(&env_map, "FORFEITURE_RATES_INDIVIDUAL", defaults.individual)?,
            corporate: parse_rates(&env_map, "FORFEITURE_RATES_CORPORATE", defaults.corporate)?,
            group: parse_rates(&env_map, "FORFEITURE_RATES_GROUP", defaults.group)?,
        };

        Ok(Config {
            port,
            database_path,
            wallet_api_url,
            accrual_refresh_interval_secs,
            stake_max_value,
            distribution_lease_ms,
            forfeiture,
        })
    }
}

fn parse_rates(
    env_map: &HashMap<String, String>,
    key: &str,
    default: ForfeitureRates,
) -> Result<ForfeitureRates, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => ForfeitureRates::parse(raw)
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "WALLET_API_URL".to_string(),
            "https://wallet.example.invalid".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.accrual_refresh_interval_secs, 3600);
        assert_eq!(config.stake_max_value, None);
        assert_eq!(config.distribution_lease_ms, 300_000);
        assert_eq!(config.forfeiture, ForfeitureConfig::default());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_wallet_api_url() {
        let mut env_map = setup_required_env();
        env_map.remove("WALLET_API_URL");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "WALLET_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_stake_max_value() {
        let mut env_map = setup_required_env();
        env_map.insert("STAKE_MAX_VALUE".to_string(), "5000.50".to_string());
        let config = Config::from_env_map(env_map.clone()).unwrap();
        assert_eq!(
            config.stake_max_value,
            Some(Decimal::from_str("5000.50").unwrap())
        );

        env_map.insert("STAKE_MAX_VALUE".to_string(), "-1".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "STAKE_MAX_VALUE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_lease() {
        let mut env_map = setup_required_env();
        env_map.insert("DISTRIBUTION_LEASE_MS".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DISTRIBUTION_LEASE_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_forfeiture_rates_override() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "FORFEITURE_RATES_GROUP".to_string(),
            "0.4,0.1,0.5".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(
            config.forfeiture.group.charity,
            Decimal::from_str("0.4").unwrap()
        );
        assert_eq!(config.forfeiture.individual, ForfeitureConfig::default().individual);
    }

    #[test]
    fn test_invalid_forfeiture_rates() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "FORFEITURE_RATES_CORPORATE".to_string(),
            "0.9,0.9,0".to_string(),
        );
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "FORFEITURE_RATES_CORPORATE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
