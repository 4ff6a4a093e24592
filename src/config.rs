use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MfaError;
use crate::mineral::Mineral;

// ── Commodity selection ─────────────────────────────────────────────────────

/// Which classification codes make up one mineral's trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommoditySelection {
    pub descriptions: Vec<String>,
    pub level: i64,
    pub classification: String,
}

impl CommoditySelection {
    fn new(description: &str, level: i64) -> Self {
        Self {
            descriptions: vec![description.to_string()],
            level,
            classification: "H0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commodities {
    pub bauxite: CommoditySelection,
    pub alumina: CommoditySelection,
    pub aluminium: CommoditySelection,
}

impl Default for Commodities {
    fn default() -> Self {
        Self {
            bauxite: CommoditySelection::new("Aluminium ores and concentrates", 4),
            alumina: CommoditySelection::new("Aluminium oxide; other than artificial corundum", 6),
            aluminium: CommoditySelection::new("Aluminium; unwrought", 4),
        }
    }
}

impl Commodities {
    pub fn get(&self, mineral: Mineral) -> &CommoditySelection {
        match mineral {
            Mineral::Bauxite => &self.bauxite,
            Mineral::Alumina => &self.alumina,
            Mineral::Aluminium => &self.aluminium,
        }
    }
}

// ── Config ──────────────────────────────────────────────────────────────────

/// Settings for a material-flow run. Every field has a default, so a TOML
/// file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MfaConfig {
    /// Directory holding the input tables
    pub input_dir: PathBuf,
    /// Directory holding cached trade matrices
    pub cache_dir: PathBuf,
    pub registry_file: String,
    pub classification_file: String,
    pub correspondence_file: String,
    /// `{mineral}` is replaced by the mineral name
    pub production_file_pattern: String,
    /// `{mineral}` and `{year}` are replaced
    pub customs_file_pattern: String,
    /// Transactions at or below this relative gap count as accurate
    pub accuracy_threshold: f64,
    /// Quantity code of records reported in kilograms
    pub kilogram_quantity_code: i64,
    /// Partner code of the world aggregate
    pub world_partner_code: i64,
    /// Multiplier from production table units to kg
    pub production_scale: f64,
    /// Inventory adjustments above this share of total DMI are logged as warnings
    pub inventory_warning_share: f64,
    /// Slack allowed on shares that should sum to one
    pub mix_tolerance: f64,
    /// Relative shortfall of attributed consumption vs recorded production
    /// tolerated without a warning
    pub balance_tolerance: f64,
    pub commodities: Commodities,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("inputs"),
            cache_dir: PathBuf::from("inputs/internal"),
            registry_file: "area_registry.csv".to_string(),
            classification_file: "commodity_classification.csv".to_string(),
            correspondence_file: "country_correspondence.csv".to_string(),
            production_file_pattern: "{mineral}_production_data.csv".to_string(),
            customs_file_pattern: "customs_{mineral}_{year}.csv".to_string(),
            accuracy_threshold: 0.2,
            kilogram_quantity_code: 8,
            world_partner_code: 0,
            production_scale: 1e6,
            inventory_warning_share: 0.05,
            mix_tolerance: 1e-6,
            balance_tolerance: 1e-6,
            commodities: Commodities::default(),
        }
    }
}

impl MfaConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, MfaError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, MfaError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn production_file(&self, mineral: Mineral) -> PathBuf {
        self.input_dir.join(
            self.production_file_pattern
                .replace("{mineral}", mineral.as_str()),
        )
    }

    pub fn customs_file(&self, mineral: Mineral, year: i32) -> PathBuf {
        self.input_dir.join(
            self.customs_file_pattern
                .replace("{mineral}", mineral.as_str())
                .replace("{year}", &year.to_string()),
        )
    }
}
