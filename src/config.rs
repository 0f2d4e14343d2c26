use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{error::RentalError, fees::FeePolicy, import::ImportOptions, recommend::default_bicycle_costs};

/// Runtime settings, read from a JSON file with every field optional
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RentalConfig {
    /// Where the bicycles and rentals tables are persisted
    pub store_file: PathBuf,
    /// Membership data file
    pub membership_file: PathBuf,
    /// Late-fee rule
    pub fee_policy: FeePolicy,
    /// Substitute defaults for malformed fields during import
    pub lenient_import: bool,
    /// Unit cost per bicycle type for purchase recommendations
    pub bicycle_costs: BTreeMap<String, Decimal>,
}

impl Default for RentalConfig {
    fn default() -> Self {
        Self {
            store_file: PathBuf::from("rental_store.json"),
            membership_file: PathBuf::from("membership.json"),
            fee_policy: FeePolicy::default(),
            lenient_import: true,
            bicycle_costs: default_bicycle_costs(),
        }
    }
}

impl RentalConfig {
    /// Read the config file, or use defaults when it does not exist
    ///
    /// # Errors
    ///
    /// Returns `RentalError::Load` if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, RentalError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| RentalError::Load(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_json(&contents)
    }

    /// Parse a config document
    ///
    /// # Errors
    ///
    /// Returns `RentalError::Load` if the document is not valid config JSON.
    pub fn from_json(json: &str) -> Result<Self, RentalError> {
        serde_json::from_str(json).map_err(|e| RentalError::Load(format!("Invalid config: {e}")))
    }

    /// Import settings derived from this config
    #[must_use]
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions { lenient: self.lenient_import }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = RentalConfig::from_json(r#"{"fee_policy": {"allowed_days": 3}, "lenient_import": false}"#)
            .unwrap_or_default();
        assert_eq!(config.fee_policy.allowed_days, 3);
        assert_eq!(config.fee_policy.late_fee_per_day, dec!(5));
        assert_eq!(config.store_file, PathBuf::from("rental_store.json"));
        assert_eq!(config.bicycle_costs.get("BMX"), Some(&dec!(250)));
        assert!(!config.import_options().lenient);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("bike-rental-no-such-config.json");
        assert_eq!(RentalConfig::load(&path), Ok(RentalConfig::default()));
    }

    #[test]
    fn test_invalid_document_is_rejected() {
        assert!(matches!(RentalConfig::from_json("[1, 2]"), Err(RentalError::Load(_))));
    }
}
