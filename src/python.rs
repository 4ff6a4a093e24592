use std::collections::HashMap;
use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::config::MfaConfig;
use crate::consumption::ConsumptionMethod;
use crate::error::MfaError;
use crate::matrix::{self, FlowMatrix};
use crate::mineral::{Mineral, TradeFlow};
use crate::model::MfaModel;
use crate::region::{aggregate, normalize, Axis};
use crate::report;
use crate::schema;

#[pyclass(name = "MfaModel")]
pub struct PyMfaModel {
    inner: MfaModel,
}

#[pymethods]
impl PyMfaModel {
    /// Create a model from a TOML config file, or with default settings.
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<String>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => MfaConfig::from_toml_file(path)?,
            None => MfaConfig::default(),
        };
        Ok(Self {
            inner: MfaModel::new(config),
        })
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load any CSV into a Polars DataFrame with all columns as strings.
    #[pyo3(signature = (path, rename=None))]
    fn load_csv(
        &self,
        path: &str,
        rename: Option<HashMap<String, String>>,
    ) -> PyResult<PyDataFrame> {
        let df = self
            .inner
            .read_csv_as_strings(&PathBuf::from(path), rename.as_ref())?;
        Ok(PyDataFrame(df))
    }

    /// Load registry, classification and correspondence tables.
    fn load_inputs(&mut self) -> PyResult<()> {
        self.inner.load_all()?;
        Ok(())
    }

    fn registry_df(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.inner.registry()?.to_frame()?))
    }

    // ── Matrices ────────────────────────────────────────────────────────────

    #[pyo3(signature = (mineral, year, flow="reconciled"))]
    fn trade_matrix(&self, mineral: &str, year: i32, flow: &str) -> PyResult<PyDataFrame> {
        let m = self
            .inner
            .trade_matrix(mineral.parse()?, year, flow.parse()?)?;
        self.area_frame(&m)
    }

    fn production_matrix(&self, mineral: &str, year: i32) -> PyResult<PyDataFrame> {
        let m = self.inner.production_matrix(mineral.parse()?, year)?;
        self.area_frame(&m)
    }

    /// Consumption by origin, long form (consumer, producer, quantity_kg).
    #[pyo3(signature = (mineral, year, flow="reconciled", method="kastner"))]
    fn origin_matrix(
        &self,
        mineral: &str,
        year: i32,
        flow: &str,
        method: &str,
    ) -> PyResult<PyDataFrame> {
        let m = self.origin(mineral, year, flow, method)?;
        self.area_frame(&m)
    }

    /// `production_of` embodied in the consumption of `consumption_of`.
    #[pyo3(signature = (production_of, consumption_of, year, flow="reconciled"))]
    fn embodied_consumption(
        &self,
        production_of: &str,
        consumption_of: &str,
        year: i32,
        flow: &str,
    ) -> PyResult<PyDataFrame> {
        let m = self.inner.embodied_consumption(
            production_of.parse()?,
            consumption_of.parse()?,
            year,
            flow.parse()?,
        )?;
        self.area_frame(&m)
    }

    // ── Regions ─────────────────────────────────────────────────────────────

    /// Origin matrix summed within regions. A scheme of None keeps areas on
    /// that axis; `normalize_by` may be "rows" or "columns".
    #[pyo3(signature = (mineral, year, consumer_scheme=None, producer_scheme=None, normalize_by=None, flow="reconciled", method="kastner"))]
    #[allow(clippy::too_many_arguments)]
    fn region_matrix(
        &self,
        mineral: &str,
        year: i32,
        consumer_scheme: Option<&str>,
        producer_scheme: Option<&str>,
        normalize_by: Option<&str>,
        flow: &str,
        method: &str,
    ) -> PyResult<PyDataFrame> {
        let m = self.origin(mineral, year, flow, method)?;
        let rows = consumer_scheme.map(|s| self.inner.grouping(s)).transpose()?;
        let cols = producer_scheme.map(|s| self.inner.grouping(s)).transpose()?;
        let mut regional = aggregate(&m, self.inner.registry()?, rows.as_ref(), cols.as_ref())?;
        if let Some(axis) = normalize_by {
            regional.matrix = normalize(&regional.matrix, parse_axis(axis)?);
        }
        Ok(PyDataFrame(regional.to_long_frame()?))
    }

    // ── Reports ─────────────────────────────────────────────────────────────

    #[pyo3(signature = (mineral, year, flow="reconciled", method="kastner"))]
    fn production_consumption(
        &self,
        mineral: &str,
        year: i32,
        flow: &str,
        method: &str,
    ) -> PyResult<PyDataFrame> {
        let m = self.origin(mineral, year, flow, method)?;
        let df = report::production_consumption_table(&m, self.inner.registry()?)?;
        Ok(PyDataFrame(df))
    }

    #[pyo3(signature = (mineral, year, flow="reconciled", method="kastner"))]
    fn domestic_production_ratio(
        &self,
        mineral: &str,
        year: i32,
        flow: &str,
        method: &str,
    ) -> PyResult<PyDataFrame> {
        let m = self.origin(mineral, year, flow, method)?;
        let df = report::domestic_production_ratio(&m, self.inner.registry()?)?;
        Ok(PyDataFrame(df))
    }

    /// Share of each producer location in the consumer location's supply.
    #[pyo3(signature = (mineral, year, scheme, consumer, producers, fallback="GLO", flow="reconciled", method="kastner"))]
    #[allow(clippy::too_many_arguments)]
    fn consumption_mix(
        &self,
        mineral: &str,
        year: i32,
        scheme: &str,
        consumer: &str,
        producers: Vec<String>,
        fallback: &str,
        flow: &str,
        method: &str,
    ) -> PyResult<PyDataFrame> {
        let m = self.origin(mineral, year, flow, method)?;
        let grouping = self.inner.grouping(scheme)?;
        let producers: Vec<&str> = producers.iter().map(|s| s.as_str()).collect();
        let mix = report::consumption_mix(
            &m,
            &grouping,
            consumer,
            &producers,
            fallback,
            self.inner.config().mix_tolerance,
        );
        Ok(PyDataFrame(report::mix_frame(&mix)?))
    }

    /// Share of each producer location in total production.
    #[pyo3(signature = (mineral, year, scheme, producers, fallback="GLO"))]
    fn production_mix(
        &self,
        mineral: &str,
        year: i32,
        scheme: &str,
        producers: Vec<String>,
        fallback: &str,
    ) -> PyResult<PyDataFrame> {
        let m = self.inner.production_matrix(mineral.parse()?, year)?;
        let grouping = self.inner.grouping(scheme)?;
        let producers: Vec<&str> = producers.iter().map(|s| s.as_str()).collect();
        let mix = report::production_mix(
            &m,
            &grouping,
            &producers,
            fallback,
            self.inner.config().mix_tolerance,
        );
        Ok(PyDataFrame(report::mix_frame(&mix)?))
    }

    /// Region-to-region flows for a flow diagram.
    #[pyo3(signature = (mineral, year, consumer_scheme, producer_scheme, flow="reconciled", method="kastner"))]
    fn region_flows(
        &self,
        mineral: &str,
        year: i32,
        consumer_scheme: &str,
        producer_scheme: &str,
        flow: &str,
        method: &str,
    ) -> PyResult<PyDataFrame> {
        let m = self.origin(mineral, year, flow, method)?;
        let consumers = self.inner.grouping(consumer_scheme)?;
        let producers = self.inner.grouping(producer_scheme)?;
        let df = report::region_flows(&m, self.inner.registry()?, &consumers, &producers)?;
        Ok(PyDataFrame(df))
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl PyMfaModel {
    fn origin(
        &self,
        mineral: &str,
        year: i32,
        flow: &str,
        method: &str,
    ) -> Result<FlowMatrix, MfaError> {
        let mineral: Mineral = mineral.parse()?;
        let flow: TradeFlow = flow.parse()?;
        let method: ConsumptionMethod = method.parse()?;
        self.inner.origin_matrix(mineral, year, flow, method)
    }

    fn area_frame(&self, m: &FlowMatrix) -> PyResult<PyDataFrame> {
        let names = self.inner.registry()?.names();
        Ok(PyDataFrame(matrix::to_long_frame(m, &names, &names)?))
    }
}

fn parse_axis(axis: &str) -> Result<Axis, MfaError> {
    match axis {
        "rows" => Ok(Axis::Rows),
        "columns" => Ok(Axis::Columns),
        other => Err(MfaError::InvalidData(format!("unknown axis '{other}'"))),
    }
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Registry
    let registry = PyModule::new(m.py(), "registry")?;
    registry.add("AREA_CODE", schema::registry::AREA_CODE)?;
    registry.add("AREA_NAME", schema::registry::AREA_NAME)?;
    registry.add("AREA_INDEX", schema::registry::AREA_INDEX)?;
    m.add_submodule(&registry)?;

    // Customs
    let customs = PyModule::new(m.py(), "customs")?;
    customs.add("REPORTER_CODE", schema::customs::REPORTER_CODE)?;
    customs.add("PARTNER_CODE", schema::customs::PARTNER_CODE)?;
    customs.add("FLOW_CODE", schema::customs::FLOW_CODE)?;
    customs.add("COMMODITY_CODE", schema::customs::COMMODITY_CODE)?;
    customs.add("NET_MASS_KG", schema::customs::NET_MASS_KG)?;
    customs.add("QUANTITY_CODE", schema::customs::QUANTITY_CODE)?;
    m.add_submodule(&customs)?;

    // Production
    let production = PyModule::new(m.py(), "production")?;
    production.add("COUNTRY", schema::production::COUNTRY)?;
    production.add("YEAR", schema::production::YEAR)?;
    production.add("VALUE", schema::production::VALUE)?;
    m.add_submodule(&production)?;

    // Result
    let result = PyModule::new(m.py(), "result")?;
    result.add("CONSUMER", schema::result::CONSUMER)?;
    result.add("PRODUCER", schema::result::PRODUCER)?;
    result.add("QUANTITY_KG", schema::result::QUANTITY_KG)?;
    m.add_submodule(&result)?;

    // Report
    let report = PyModule::new(m.py(), "report")?;
    report.add("AREA", schema::report::AREA)?;
    report.add("KIND", schema::report::KIND)?;
    report.add("QUANTITY_KG", schema::report::QUANTITY_KG)?;
    report.add("DOMESTIC_PRODUCTION", schema::report::DOMESTIC_PRODUCTION)?;
    report.add("APPARENT_CONSUMPTION", schema::report::APPARENT_CONSUMPTION)?;
    report.add(
        "DOMESTIC_PRODUCTION_RATIO",
        schema::report::DOMESTIC_PRODUCTION_RATIO,
    )?;
    report.add("LOCATION", schema::report::LOCATION)?;
    report.add("SHARE", schema::report::SHARE)?;
    m.add_submodule(&report)?;

    // Mineral
    let mineral = PyModule::new(m.py(), "mineral")?;
    for stage in Mineral::CHAIN {
        mineral.add(stage.as_str().to_uppercase(), stage.as_str())?;
    }
    m.add_submodule(&mineral)?;

    Ok(())
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyMfaModel>()?;
    add_schema_exports(m)?;
    Ok(())
}
