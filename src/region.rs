use std::collections::{BTreeSet, HashMap};

use nalgebra::DMatrix;
use polars::prelude::*;

use crate::error::MfaError;
use crate::matrix::{self, FlowMatrix};
use crate::registry::EntityRegistry;
use crate::schema::correspondence;
use crate::trade::require_columns;

/// Which sums a normalized matrix sets to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Every row divided by its row sum
    Rows,
    /// Every column divided by its column sum
    Columns,
}

/// Divide each row or column by its sum. Zero sums are left as all-zero
/// rows or columns.
pub fn normalize(m: &FlowMatrix, axis: Axis) -> FlowMatrix {
    let mut out = m.clone();
    match axis {
        Axis::Rows => {
            for mut row in out.row_iter_mut() {
                let sum = row.sum();
                row /= if sum == 0.0 { 1.0 } else { sum };
            }
        }
        Axis::Columns => {
            for mut column in out.column_iter_mut() {
                let sum = column.sum();
                column /= if sum == 0.0 { 1.0 } else { sum };
            }
        }
    }
    out
}

// ── Grouping ────────────────────────────────────────────────────────────────

/// Region label for every registry area, for one region scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGrouping {
    labels: Vec<String>,
}

impl RegionGrouping {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Every area in a region of its own.
    pub fn identity(registry: &EntityRegistry) -> Self {
        Self::new(registry.names())
    }

    /// Read one scheme column of a correspondence table (area_name plus one
    /// column per scheme, all strings). Areas absent from the table or with
    /// an empty label keep their own name. A label of "0" is the table's
    /// placeholder for "no region" and counts as empty.
    pub fn from_correspondence(
        registry: &EntityRegistry,
        table: &DataFrame,
        scheme: &str,
    ) -> Result<Self, MfaError> {
        require_columns(table, &[correspondence::AREA_NAME, scheme])?;
        let names = table.column(correspondence::AREA_NAME)?.str()?;
        let regions = table.column(scheme)?.str()?;

        let mut by_name: HashMap<&str, &str> = HashMap::new();
        for (name, region) in names.into_iter().zip(regions) {
            if let (Some(name), Some(region)) = (name, region) {
                let region = region.trim();
                if !region.is_empty() && region != "0" {
                    by_name.entry(name.trim()).or_insert(region);
                }
            }
        }

        let labels = registry
            .areas()
            .iter()
            .map(|area| {
                by_name
                    .get(area.name.as_str())
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| area.name.clone())
            })
            .collect();
        Ok(Self::new(labels))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Sorted distinct region labels.
    pub fn regions(&self) -> Vec<String> {
        self.labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Area indices labelled `region`.
    pub fn members(&self, region: &str) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.as_str() == region)
            .map(|(i, _)| i)
            .collect()
    }

    /// regions × areas 0/1 matrix.
    fn indicator(&self) -> (Vec<String>, DMatrix<f64>) {
        let regions = self.regions();
        let position: HashMap<&str, usize> = regions
            .iter()
            .enumerate()
            .map(|(i, r)| (r.as_str(), i))
            .collect();
        let mut g = DMatrix::zeros(regions.len(), self.labels.len());
        for (area, label) in self.labels.iter().enumerate() {
            g[(position[label.as_str()], area)] = 1.0;
        }
        (regions, g)
    }
}

// ── Aggregation ─────────────────────────────────────────────────────────────

/// A matrix whose rows and/or columns are regions.
#[derive(Debug, Clone)]
pub struct RegionMatrix {
    pub matrix: DMatrix<f64>,
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
}

impl RegionMatrix {
    /// Nonzero entries as (consumer, producer, quantity_kg).
    pub fn to_long_frame(&self) -> Result<DataFrame, MfaError> {
        matrix::to_long_frame(&self.matrix, &self.row_labels, &self.col_labels)
    }
}

/// Sum a country-level matrix within regions along rows, columns or both.
/// An axis without grouping keeps area names.
pub fn aggregate(
    m: &FlowMatrix,
    registry: &EntityRegistry,
    rows: Option<&RegionGrouping>,
    columns: Option<&RegionGrouping>,
) -> Result<RegionMatrix, MfaError> {
    matrix::ensure_square(m, registry.len())?;
    for grouping in [rows, columns].into_iter().flatten() {
        if grouping.len() != registry.len() {
            return Err(MfaError::InvalidData(format!(
                "grouping covers {} areas, registry has {}",
                grouping.len(),
                registry.len()
            )));
        }
    }

    let (row_labels, row_sum) = match rows {
        Some(g) => {
            let (labels, indicator) = g.indicator();
            (labels, indicator * m)
        }
        None => (registry.names(), m.clone()),
    };
    let (col_labels, matrix) = match columns {
        Some(g) => {
            let (labels, indicator) = g.indicator();
            (labels, row_sum * indicator.transpose())
        }
        None => (registry.names(), row_sum),
    };

    Ok(RegionMatrix {
        matrix,
        row_labels,
        col_labels,
    })
}
