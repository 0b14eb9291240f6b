//! Pipeline configuration.
//!
//! Every component owns a serde-derived config struct; [`PrepConfig`]
//! groups them so a whole run can be described by one JSON document.
//! Missing sections and fields fall back to their defaults.

use crate::{NeutralizeConfig, QuarterConfig, Result, StandardizeConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for all pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    /// Quarterly delta reconstruction
    pub quarters: QuarterConfig,
    /// Factor neutralization
    pub neutralize: NeutralizeConfig,
    /// Reference-based standardization
    pub standardize: StandardizeConfig,
}

impl PrepConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = PrepConfig::from_json(
            r#"{
                "quarters": { "first_year": 2005, "last_year": 2024 },
                "neutralize": { "industries": ["banks", "tech"] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.quarters.first_year, 2005);
        assert_eq!(config.neutralize.industries, ["banks", "tech"]);
        assert_eq!(config.neutralize.market_cap_column, "market_cap");
        assert_eq!(config.standardize, StandardizeConfig::default());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PrepConfig::default();
        let parsed = PrepConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_json() {
        let err = PrepConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::PrepError::Config(_)));
    }
}
