//! Reconciliation of importer and exporter reports.
//!
//! Each commodity code is reconciled on its own. Every (importer, exporter)
//! pair gets both reported masses. A pair is accurate when the two reports
//! differ by at most `threshold` relative to the import report. Each area
//! then gets a reliability index per role: the share (0-100) of the mass it
//! reported in that role that sits in accurate pairs. The pair keeps the
//! import report when the importer is at least as reliable as the exporter,
//! and the export report otherwise. The matrix sums the kept values over
//! commodity codes.

use polars::prelude::*;

use crate::error::MfaError;
use crate::matrix::{self, FlowMatrix};
use crate::registry::EntityRegistry;
use crate::schema::{reliability, role, transaction};
use crate::trade::{entries_by_code, export_reports, import_reports};

const ACCURATE_IMPORTS: &str = "_accurate_imports";
const ACCURATE_EXPORTS: &str = "_accurate_exports";

/// 100 × accurate / total within each (`area`, commodity code); 0 when the
/// area reported nothing for that code.
fn reliability_index(reported: &str, accurate: &str, area: &str) -> Expr {
    let group = [col(area), col(transaction::COMMODITY_CODE)];
    let total = col(reported).sum().over(group.clone());
    let accurate = col(accurate).sum().over(group);
    when(total.clone().gt(lit(0.0)))
        .then(accurate / total * lit(100.0))
        .otherwise(lit(0.0))
}

/// One row per (importer, exporter, commodity code) of cleaned customs
/// records.
///
/// Columns: importer_code, exporter_code, commodity_code, reported_imports,
/// reported_exports, accuracy_level, ri_importer, ri_exporter, value.
/// A side nobody reported counts as 0.
pub fn transactions(records: &DataFrame, threshold: f64) -> Result<DataFrame, MfaError> {
    let order = [
        col(transaction::IMPORTER_CODE),
        col(transaction::EXPORTER_CODE),
        col(transaction::COMMODITY_CODE),
        col(transaction::REPORTED_IMPORTS),
        col(transaction::REPORTED_EXPORTS),
    ];
    let imports = import_reports(records.clone().lazy())
        .with_columns([lit(0.0).alias(transaction::REPORTED_EXPORTS)])
        .select(order.clone());
    let exports = export_reports(records.clone().lazy())
        .with_columns([lit(0.0).alias(transaction::REPORTED_IMPORTS)])
        .select(order);

    let df = concat([imports, exports], UnionArgs::default())?
        .group_by([
            col(transaction::IMPORTER_CODE),
            col(transaction::EXPORTER_CODE),
            col(transaction::COMMODITY_CODE),
        ])
        .agg([
            col(transaction::REPORTED_IMPORTS).sum(),
            col(transaction::REPORTED_EXPORTS).sum(),
        ])
        // No import report: maximally inaccurate
        .with_columns([when(col(transaction::REPORTED_IMPORTS).neq(lit(0.0)))
            .then(
                (col(transaction::REPORTED_IMPORTS) - col(transaction::REPORTED_EXPORTS)).abs()
                    / col(transaction::REPORTED_IMPORTS),
            )
            .otherwise(lit(1.0))
            .alias(transaction::ACCURACY_LEVEL)])
        .with_columns([
            when(col(transaction::ACCURACY_LEVEL).lt_eq(lit(threshold)))
                .then(col(transaction::REPORTED_IMPORTS))
                .otherwise(lit(0.0))
                .alias(ACCURATE_IMPORTS),
            when(col(transaction::ACCURACY_LEVEL).lt_eq(lit(threshold)))
                .then(col(transaction::REPORTED_EXPORTS))
                .otherwise(lit(0.0))
                .alias(ACCURATE_EXPORTS),
        ])
        .with_columns([
            reliability_index(
                transaction::REPORTED_IMPORTS,
                ACCURATE_IMPORTS,
                transaction::IMPORTER_CODE,
            )
            .alias(transaction::RI_IMPORTER),
            reliability_index(
                transaction::REPORTED_EXPORTS,
                ACCURATE_EXPORTS,
                transaction::EXPORTER_CODE,
            )
            .alias(transaction::RI_EXPORTER),
        ])
        .with_columns([when(
            col(transaction::RI_IMPORTER).gt_eq(col(transaction::RI_EXPORTER)),
        )
        .then(col(transaction::REPORTED_IMPORTS))
        .otherwise(col(transaction::REPORTED_EXPORTS))
        .alias(transaction::VALUE)])
        .select([
            col(transaction::IMPORTER_CODE),
            col(transaction::EXPORTER_CODE),
            col(transaction::COMMODITY_CODE),
            col(transaction::REPORTED_IMPORTS),
            col(transaction::REPORTED_EXPORTS),
            col(transaction::ACCURACY_LEVEL),
            col(transaction::RI_IMPORTER),
            col(transaction::RI_EXPORTER),
            col(transaction::VALUE),
        ])
        .sort(
            [
                transaction::IMPORTER_CODE,
                transaction::EXPORTER_CODE,
                transaction::COMMODITY_CODE,
            ],
            SortMultipleOptions::default(),
        )
        .collect()?;

    Ok(df)
}

/// Per-area reliability indices from a `transactions` table, one row per
/// area, role and commodity code.
///
/// Columns: area_code, role, commodity_code, total_reported,
/// reliability_index.
pub fn reliability_indices(transactions: &DataFrame) -> Result<DataFrame, MfaError> {
    let importers = transactions
        .clone()
        .lazy()
        .group_by([
            col(transaction::IMPORTER_CODE).alias(reliability::AREA_CODE),
            col(transaction::COMMODITY_CODE).alias(reliability::COMMODITY_CODE),
        ])
        .agg([
            col(transaction::REPORTED_IMPORTS)
                .sum()
                .alias(reliability::TOTAL_REPORTED),
            col(transaction::RI_IMPORTER)
                .first()
                .alias(reliability::RELIABILITY_INDEX),
        ])
        .with_columns([lit(role::IMPORTER).alias(reliability::ROLE)]);
    let exporters = transactions
        .clone()
        .lazy()
        .group_by([
            col(transaction::EXPORTER_CODE).alias(reliability::AREA_CODE),
            col(transaction::COMMODITY_CODE).alias(reliability::COMMODITY_CODE),
        ])
        .agg([
            col(transaction::REPORTED_EXPORTS)
                .sum()
                .alias(reliability::TOTAL_REPORTED),
            col(transaction::RI_EXPORTER)
                .first()
                .alias(reliability::RELIABILITY_INDEX),
        ])
        .with_columns([lit(role::EXPORTER).alias(reliability::ROLE)]);

    let order = [
        col(reliability::AREA_CODE),
        col(reliability::ROLE),
        col(reliability::COMMODITY_CODE),
        col(reliability::TOTAL_REPORTED),
        col(reliability::RELIABILITY_INDEX),
    ];
    let df = concat(
        [importers.select(order.clone()), exporters.select(order)],
        UnionArgs::default(),
    )?
    .sort(
        [
            reliability::AREA_CODE,
            reliability::ROLE,
            reliability::COMMODITY_CODE,
        ],
        SortMultipleOptions::default(),
    )
    .collect()?;
    Ok(df)
}

/// Reconciled bilateral matrix (rows importers, columns exporters), summed
/// over commodity codes after each code is reconciled.
pub fn reconciled_matrix(
    registry: &EntityRegistry,
    records: &DataFrame,
    threshold: f64,
) -> Result<FlowMatrix, MfaError> {
    let df = transactions(records, threshold)?;
    let entries = entries_by_code(&df, registry, transaction::VALUE)?;
    tracing::debug!(pairs = df.height(), "reconciled bilateral trade");
    matrix::from_triplets(registry.len(), entries)
}
