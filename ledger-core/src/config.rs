//! Configuration for the ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Smallest accepted deposit
    pub min_deposit: Decimal,

    /// Largest accepted withdrawal request
    pub max_withdrawal: Decimal,

    /// Balance compare-and-swap retry budget
    pub balance_retry_limit: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_deposit: Decimal::new(100, 2),        // $1.00
            max_withdrawal: Decimal::new(1_000_000, 2), // $10,000.00
            balance_retry_limit: 8,
        }
    }
}

impl LedgerConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: LedgerConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load defaults with environment variable overrides
    pub fn from_env() -> crate::Result<Self> {
        let mut config = LedgerConfig::default();

        if let Ok(raw) = std::env::var("LEDGER_MIN_DEPOSIT") {
            config.min_deposit = raw
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_MIN_DEPOSIT: {}", e)))?;
        }

        if let Ok(raw) = std::env::var("LEDGER_MAX_WITHDRAWAL") {
            config.max_withdrawal = raw
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_MAX_WITHDRAWAL: {}", e)))?;
        }

        if let Ok(raw) = std::env::var("LEDGER_BALANCE_RETRY_LIMIT") {
            config.balance_retry_limit = raw
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_BALANCE_RETRY_LIMIT: {}", e)))?;
        }

        Ok(config)
    }
}
