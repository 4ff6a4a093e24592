use std::collections::HashMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::config::MfaConfig;
use crate::consumption::{self, ConsumptionMethod, OriginTracing, TracingOptions};
use crate::embodied;
use crate::error::MfaError;
use crate::matrix::{FlowMatrix, TradeCache};
use crate::mineral::{Mineral, TradeFlow};
use crate::production;
use crate::region::RegionGrouping;
use crate::registry::EntityRegistry;
use crate::schema::{classification, correspondence, registry};
use crate::trade::{self, require_columns};

/// Loaded inputs plus the trade matrix cache. Every computation is keyed by
/// (mineral, year) and independent of the others.
pub struct MfaModel {
    config: MfaConfig,
    cache: TradeCache,
    registry: Option<EntityRegistry>,
    classification: Option<DataFrame>,
    correspondence: Option<DataFrame>,
}

impl MfaModel {
    pub fn new(config: MfaConfig) -> Self {
        let cache = TradeCache::new(config.cache_dir.clone());
        Self {
            config,
            cache,
            registry: None,
            classification: None,
            correspondence: None,
        }
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, MfaError> {
        Ok(Self::new(MfaConfig::from_toml_file(path)?))
    }

    pub fn config(&self) -> &MfaConfig {
        &self.config
    }

    pub fn cache(&self) -> &TradeCache {
        &self.cache
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load the area registry. Required columns: area_code, area_name.
    pub fn load_registry(&mut self) -> Result<&EntityRegistry, MfaError> {
        let df = self.read_csv_as_strings(&self.input_path(&self.config.registry_file), None)?;
        require_columns(&df, &[registry::AREA_CODE, registry::AREA_NAME])?;
        let loaded = EntityRegistry::from_frame(&df)?;
        tracing::info!(areas = loaded.len(), "loaded area registry");
        Ok(&*self.registry.insert(loaded))
    }

    /// Load the commodity classification. Required columns: description,
    /// level, classification, commodity_code.
    pub fn load_classification(&mut self) -> Result<&DataFrame, MfaError> {
        let df =
            self.read_csv_as_strings(&self.input_path(&self.config.classification_file), None)?;
        require_columns(
            &df,
            &[
                classification::DESCRIPTION,
                classification::LEVEL,
                classification::CLASSIFICATION,
                classification::COMMODITY_CODE,
            ],
        )?;
        Ok(&*self.classification.insert(df))
    }

    /// Load the area-to-region correspondence. Required column: area_name;
    /// every other column is a region scheme.
    pub fn load_correspondence(&mut self) -> Result<&DataFrame, MfaError> {
        let df =
            self.read_csv_as_strings(&self.input_path(&self.config.correspondence_file), None)?;
        require_columns(&df, &[correspondence::AREA_NAME])?;
        Ok(&*self.correspondence.insert(df))
    }

    /// Load every input table.
    pub fn load_all(&mut self) -> Result<(), MfaError> {
        self.load_registry()?;
        self.load_classification()?;
        self.load_correspondence()?;
        Ok(())
    }

    pub fn registry(&self) -> Result<&EntityRegistry, MfaError> {
        self.registry
            .as_ref()
            .ok_or_else(|| MfaError::NotLoaded("registry".into()))
    }

    pub fn classification(&self) -> Result<&DataFrame, MfaError> {
        self.classification
            .as_ref()
            .ok_or_else(|| MfaError::NotLoaded("classification".into()))
    }

    pub fn correspondence(&self) -> Result<&DataFrame, MfaError> {
        self.correspondence
            .as_ref()
            .ok_or_else(|| MfaError::NotLoaded("correspondence".into()))
    }

    // ── Matrices ────────────────────────────────────────────────────────────

    /// Bilateral trade matrix, read from the cache when present, otherwise
    /// built from the customs CSV and stored.
    pub fn trade_matrix(
        &self,
        mineral: Mineral,
        year: i32,
        flow: TradeFlow,
    ) -> Result<FlowMatrix, MfaError> {
        let registry = self.registry()?;
        if let Some(m) = self.cache.load(flow, mineral, year, registry.len())? {
            tracing::debug!(%mineral, year, %flow, "trade matrix cache hit");
            return Ok(m);
        }
        tracing::info!(%mineral, year, %flow, "trade matrix cache miss, building from customs records");

        let codes = trade::commodity_codes(
            self.classification()?,
            self.config.commodities.get(mineral),
        )?;
        let raw = self.read_csv_as_strings(&self.config.customs_file(mineral, year), None)?;
        let records = trade::clean_records(&raw, &self.config, &codes)?;
        let m = trade::build_matrix(registry, &records, flow, self.config.accuracy_threshold)?;

        self.cache.store(flow, mineral, year, &m)?;
        Ok(m)
    }

    /// Diagonal production matrix for one mineral and year, kg.
    pub fn production_matrix(&self, mineral: Mineral, year: i32) -> Result<FlowMatrix, MfaError> {
        let table = self.read_csv_as_strings(&self.config.production_file(mineral), None)?;
        production::production_matrix(
            self.registry()?,
            &table,
            year,
            self.config.production_scale,
        )
    }

    /// Full origin-tracing result, including diagnostics.
    pub fn origin_tracing(
        &self,
        mineral: Mineral,
        year: i32,
        flow: TradeFlow,
    ) -> Result<OriginTracing, MfaError> {
        let trade = self.trade_matrix(mineral, year, flow)?;
        let production = self.production_matrix(mineral, year)?;
        consumption::kastner_consumption(
            &trade,
            &production,
            self.registry()?,
            &TracingOptions::from(&self.config),
        )
    }

    /// Consumption by origin: rows consumers, columns producers, kg.
    pub fn origin_matrix(
        &self,
        mineral: Mineral,
        year: i32,
        flow: TradeFlow,
        method: ConsumptionMethod,
    ) -> Result<FlowMatrix, MfaError> {
        let trade = self.trade_matrix(mineral, year, flow)?;
        let production = self.production_matrix(mineral, year)?;
        consumption::consumption_matrix(
            method,
            &trade,
            &production,
            self.registry()?,
            &TracingOptions::from(&self.config),
        )
    }

    /// `production_of` embodied in the consumption of `consumption_of`,
    /// traced with the origin-tracing model at every stage.
    pub fn embodied_consumption(
        &self,
        production_of: Mineral,
        consumption_of: Mineral,
        year: i32,
        flow: TradeFlow,
    ) -> Result<FlowMatrix, MfaError> {
        embodied::embodied_consumption(production_of, consumption_of, |mineral| {
            self.origin_matrix(mineral, year, flow, ConsumptionMethod::Kastner)
        })
    }

    /// Region grouping for one correspondence column.
    pub fn grouping(&self, scheme: &str) -> Result<RegionGrouping, MfaError> {
        RegionGrouping::from_correspondence(self.registry()?, self.correspondence()?, scheme)
    }

    // ── CSV helpers ─────────────────────────────────────────────────────────

    fn input_path(&self, filename: &str) -> PathBuf {
        self.config.input_dir.join(filename)
    }

    /// Read a CSV file with all columns as String dtype.
    /// Trims whitespace from column names and applies optional rename.
    pub fn read_csv_as_strings(
        &self,
        path: &Path,
        rename: Option<&HashMap<String, String>>,
    ) -> Result<DataFrame, MfaError> {
        let mut df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        let trimmed: Vec<String> = df
            .get_column_names_str()
            .iter()
            .map(|c| c.trim().to_string())
            .collect();
        df.set_column_names(trimmed.as_slice())?;

        if let Some(map) = rename {
            let old: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
            let new: Vec<&str> = map.values().map(|s| s.as_str()).collect();
            df = df.lazy().rename(old, new, true).collect()?;
        }
        Ok(df)
    }
}
