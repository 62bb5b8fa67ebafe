//! Configuration for the squares engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Squares engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquaresConfig {
    /// Platform fee withheld from each gross payout (fraction)
    pub platform_fee_rate: Decimal,

    /// Allowed deviation of the payout fractions from 1.0
    pub payout_tolerance: Decimal,
}

impl Default for SquaresConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(3, 2), // 3%
            payout_tolerance: Decimal::new(1, 3),  // 0.001
        }
    }
}

impl SquaresConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: SquaresConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load defaults with environment variable overrides
    pub fn from_env() -> crate::Result<Self> {
        let mut config = SquaresConfig::default();

        if let Ok(raw) = std::env::var("SQUARES_PLATFORM_FEE_RATE") {
            config.platform_fee_rate = raw
                .parse()
                .map_err(|e| crate::Error::Config(format!("SQUARES_PLATFORM_FEE_RATE: {}", e)))?;
        }

        if let Ok(raw) = std::env::var("SQUARES_PAYOUT_TOLERANCE") {
            config.payout_tolerance = raw
                .parse()
                .map_err(|e| crate::Error::Config(format!("SQUARES_PAYOUT_TOLERANCE: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = SquaresConfig::default();
        assert_eq!(config.platform_fee_rate, dec!(0.03));
        assert_eq!(config.payout_tolerance, dec!(0.001));
    }
}
