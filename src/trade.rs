use std::collections::BTreeSet;

use polars::prelude::*;

use crate::config::{CommoditySelection, MfaConfig};
use crate::error::MfaError;
use crate::matrix::{self, FlowMatrix};
use crate::mineral::TradeFlow;
use crate::reconcile;
use crate::registry::EntityRegistry;
use crate::schema::{classification, customs, flow, transaction};

const WHITESPACE: &str = " \t\r\n";

fn parse_int(name: &str) -> Expr {
    col(name)
        .str()
        .strip_chars(lit(WHITESPACE))
        .cast(DataType::Int64)
}

fn parse_float(name: &str) -> Expr {
    col(name)
        .str()
        .strip_chars(lit(WHITESPACE))
        .cast(DataType::Float64)
}

pub(crate) fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), MfaError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(MfaError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

// ── Commodity selection ─────────────────────────────────────────────────────

/// Commodity codes whose description, level and classification match the
/// selection. The classification table is read as strings.
pub fn commodity_codes(
    table: &DataFrame,
    selection: &CommoditySelection,
) -> Result<Vec<String>, MfaError> {
    require_columns(
        table,
        &[
            classification::DESCRIPTION,
            classification::LEVEL,
            classification::CLASSIFICATION,
            classification::COMMODITY_CODE,
        ],
    )?;

    let descriptions = Series::new("descriptions".into(), &selection.descriptions);
    let df = table
        .clone()
        .lazy()
        .filter(
            col(classification::DESCRIPTION)
                .str()
                .strip_chars(lit(WHITESPACE))
                .is_in(lit(descriptions), false)
                .and(parse_int(classification::LEVEL).eq(lit(selection.level)))
                .and(
                    col(classification::CLASSIFICATION)
                        .str()
                        .strip_chars(lit(WHITESPACE))
                        .eq(lit(selection.classification.as_str())),
                ),
        )
        .select([col(classification::COMMODITY_CODE)
            .str()
            .strip_chars(lit(WHITESPACE))])
        .collect()?;

    let codes: Vec<String> = df
        .column(classification::COMMODITY_CODE)?
        .str()?
        .into_iter()
        .filter_map(|v| v.map(|s| s.to_string()))
        .collect();

    if codes.is_empty() {
        tracing::warn!(
            descriptions = ?selection.descriptions,
            level = selection.level,
            classification = %selection.classification,
            "no commodity code matches selection"
        );
    }
    Ok(codes)
}

// ── Customs records ─────────────────────────────────────────────────────────

/// Type and filter raw customs records loaded as strings.
///
/// Drops rows whose partner is the world aggregate, self trade, missing
/// mass, quantities not reported in kilograms, flows other than import or
/// export, and commodity codes outside `codes`.
pub fn clean_records(
    records: &DataFrame,
    config: &MfaConfig,
    codes: &[String],
) -> Result<DataFrame, MfaError> {
    require_columns(records, &customs::ALL)?;

    let selected = Series::new("codes".into(), codes);
    let df = records
        .clone()
        .lazy()
        .with_columns([
            parse_int(customs::REPORTER_CODE),
            parse_int(customs::PARTNER_CODE),
            parse_int(customs::FLOW_CODE),
            parse_int(customs::QUANTITY_CODE),
            parse_float(customs::NET_MASS_KG),
            col(customs::COMMODITY_CODE)
                .str()
                .strip_chars(lit(WHITESPACE)),
        ])
        .filter(
            col(customs::PARTNER_CODE)
                .neq(lit(config.world_partner_code))
                .and(col(customs::REPORTER_CODE).neq(col(customs::PARTNER_CODE)))
                .and(col(customs::NET_MASS_KG).is_not_null())
                .and(col(customs::QUANTITY_CODE).eq(lit(config.kilogram_quantity_code)))
                .and(
                    col(customs::FLOW_CODE)
                        .eq(lit(flow::IMPORT))
                        .or(col(customs::FLOW_CODE).eq(lit(flow::EXPORT))),
                )
                .and(col(customs::COMMODITY_CODE).is_in(lit(selected), false)),
        )
        .select(customs::ALL.iter().map(|c| col(*c)).collect::<Vec<_>>())
        .collect()?;

    tracing::debug!(
        raw = records.height(),
        kept = df.height(),
        "cleaned customs records"
    );
    Ok(df)
}

/// Importer-reported mass per (importer, exporter, commodity code). Input
/// must be cleaned records.
pub(crate) fn import_reports(records: LazyFrame) -> LazyFrame {
    records
        .filter(col(customs::FLOW_CODE).eq(lit(flow::IMPORT)))
        .group_by([
            col(customs::REPORTER_CODE).alias(transaction::IMPORTER_CODE),
            col(customs::PARTNER_CODE).alias(transaction::EXPORTER_CODE),
            col(customs::COMMODITY_CODE).alias(transaction::COMMODITY_CODE),
        ])
        .agg([col(customs::NET_MASS_KG)
            .sum()
            .alias(transaction::REPORTED_IMPORTS)])
}

/// Exporter-reported mass per (importer, exporter, commodity code). The
/// reporter is the exporter here.
pub(crate) fn export_reports(records: LazyFrame) -> LazyFrame {
    records
        .filter(col(customs::FLOW_CODE).eq(lit(flow::EXPORT)))
        .group_by([
            col(customs::PARTNER_CODE).alias(transaction::IMPORTER_CODE),
            col(customs::REPORTER_CODE).alias(transaction::EXPORTER_CODE),
            col(customs::COMMODITY_CODE).alias(transaction::COMMODITY_CODE),
        ])
        .agg([col(customs::NET_MASS_KG)
            .sum()
            .alias(transaction::REPORTED_EXPORTS)])
}

// ── Matrix assembly ─────────────────────────────────────────────────────────

/// Map (importer_code, exporter_code, value) rows to registry indices.
/// Codes without a registry entry are skipped with a warning.
pub(crate) fn entries_by_code(
    df: &DataFrame,
    registry: &EntityRegistry,
    value_col: &str,
) -> Result<Vec<(usize, usize, f64)>, MfaError> {
    let importers = df.column(transaction::IMPORTER_CODE)?.i64()?;
    let exporters = df.column(transaction::EXPORTER_CODE)?.i64()?;
    let values = df.column(value_col)?.f64()?;

    let mut unknown = BTreeSet::new();
    let mut entries = Vec::with_capacity(df.height());
    for ((importer, exporter), value) in importers.into_iter().zip(exporters).zip(values) {
        let (Some(importer), Some(exporter)) = (importer, exporter) else {
            continue;
        };
        let row = registry.index_of_code(importer);
        let column = registry.index_of_code(exporter);
        match (row, column) {
            (Some(i), Some(j)) => entries.push((i, j, value.unwrap_or(0.0))),
            _ => {
                if row.is_none() {
                    unknown.insert(importer);
                }
                if column.is_none() {
                    unknown.insert(exporter);
                }
            }
        }
    }

    for code in unknown {
        tracing::warn!(code, "area code has no registry equivalency, skipping its trade");
    }
    Ok(entries)
}

/// Matrix from one side of the reports only: importer reports for
/// `TradeFlow::Imports`, exporter reports for `TradeFlow::Exports`.
/// Rows are importers, columns exporters; commodity codes add up.
pub fn one_sided_matrix(
    registry: &EntityRegistry,
    records: &DataFrame,
    side: TradeFlow,
) -> Result<FlowMatrix, MfaError> {
    let (view, value_col) = match side {
        TradeFlow::Imports => (
            import_reports(records.clone().lazy()),
            transaction::REPORTED_IMPORTS,
        ),
        TradeFlow::Exports => (
            export_reports(records.clone().lazy()),
            transaction::REPORTED_EXPORTS,
        ),
        TradeFlow::Reconciled => {
            return Err(MfaError::InvalidData(
                "reconciled trade has two sides, use reconcile::reconciled_matrix".into(),
            ))
        }
    };
    let df = view.collect()?;
    let entries = entries_by_code(&df, registry, value_col)?;
    matrix::from_triplets(registry.len(), entries)
}

/// Bilateral trade matrix for the requested view of cleaned records.
pub fn build_matrix(
    registry: &EntityRegistry,
    records: &DataFrame,
    view: TradeFlow,
    accuracy_threshold: f64,
) -> Result<FlowMatrix, MfaError> {
    match view {
        TradeFlow::Reconciled => {
            reconcile::reconciled_matrix(registry, records, accuracy_threshold)
        }
        side => one_sided_matrix(registry, records, side),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::{Area, EntityRegistry};

    type RawRow<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str, &'a str);

    fn field<'a>(rows: &[RawRow<'a>], k: usize) -> Vec<Option<&'a str>> {
        rows.iter()
            .map(|r| {
                let v = [r.0, r.1, r.2, r.3, r.4, r.5][k];
                (!v.is_empty()).then_some(v)
            })
            .collect()
    }

    /// (reporter, partner, flow, commodity, mass, quantity code), as strings.
    /// An empty field is a null.
    pub(crate) fn raw_records(rows: &[RawRow<'_>]) -> DataFrame {
        DataFrame::new(vec![
            Column::new(customs::REPORTER_CODE.into(), field(rows, 0)),
            Column::new(customs::PARTNER_CODE.into(), field(rows, 1)),
            Column::new(customs::FLOW_CODE.into(), field(rows, 2)),
            Column::new(customs::COMMODITY_CODE.into(), field(rows, 3)),
            Column::new(customs::NET_MASS_KG.into(), field(rows, 4)),
            Column::new(customs::QUANTITY_CODE.into(), field(rows, 5)),
        ])
        .unwrap()
    }

    pub(crate) fn coded_registry(codes: &[(i64, &str)]) -> EntityRegistry {
        EntityRegistry::new(
            codes
                .iter()
                .map(|(code, name)| Area {
                    code: *code,
                    name: name.to_string(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn codes() -> Vec<String> {
        vec!["2606".to_string()]
    }

    #[test]
    fn selects_codes_by_description_level_and_classification() {
        let table = DataFrame::new(vec![
            Column::new(
                classification::DESCRIPTION.into(),
                &[
                    "Aluminium ores and concentrates",
                    "Aluminium ores and concentrates",
                    "Aluminium; unwrought",
                ],
            ),
            Column::new(classification::LEVEL.into(), &["4", "6", "4"]),
            Column::new(classification::CLASSIFICATION.into(), &["H0", "H0", "H0"]),
            Column::new(classification::COMMODITY_CODE.into(), &["2606", "260600", "7601"]),
        ])
        .unwrap();
        let selection = CommoditySelection {
            descriptions: vec!["Aluminium ores and concentrates".into()],
            level: 4,
            classification: "H0".into(),
        };
        assert_eq!(commodity_codes(&table, &selection).unwrap(), vec!["2606"]);
    }

    #[test]
    fn cleaning_drops_invalid_rows() {
        let raw = raw_records(&[
            ("10", "20", "1", "2606", "100", "8"), // kept
            ("10", "0", "1", "2606", "100", "8"),  // world partner
            ("10", "10", "1", "2606", "100", "8"), // self trade
            ("10", "20", "1", "2606", "", "8"),    // no mass
            ("10", "20", "1", "2606", "100", "1"), // not kg
            ("10", "20", "3", "2606", "100", "8"), // re-export flow
            ("10", "20", "1", "7601", "100", "8"), // other commodity
            ("20", "10", "2", "2606", "40", "8"),  // kept
        ]);
        let clean = clean_records(&raw, &MfaConfig::default(), &codes()).unwrap();
        assert_eq!(clean.height(), 2);
        assert_eq!(
            clean.column(customs::NET_MASS_KG).unwrap().dtype(),
            &DataType::Float64
        );
    }

    #[test]
    fn missing_column_is_reported() {
        let df = DataFrame::new(vec![Column::new(customs::REPORTER_CODE.into(), &["1"])]).unwrap();
        assert!(matches!(
            clean_records(&df, &MfaConfig::default(), &codes()),
            Err(MfaError::MissingColumn(_))
        ));
    }

    #[test]
    fn one_sided_views_orient_reporter_correctly() {
        let registry = coded_registry(&[(10, "A"), (20, "B"), (30, "C")]);
        let raw = raw_records(&[
            ("10", "20", "1", "2606", "100", "8"),
            ("10", "20", "1", "2606", "5", "8"),
            ("20", "10", "2", "2606", "90", "8"),
            ("30", "20", "1", "2606", "7", "8"),
            ("10", "99", "1", "2606", "50", "8"), // unknown partner
        ]);
        let clean = clean_records(&raw, &MfaConfig::default(), &codes()).unwrap();

        let imports = one_sided_matrix(&registry, &clean, TradeFlow::Imports).unwrap();
        assert_eq!(imports[(0, 1)], 105.0);
        assert_eq!(imports[(2, 1)], 7.0);
        assert_eq!(imports.sum(), 112.0);

        let exports = one_sided_matrix(&registry, &clean, TradeFlow::Exports).unwrap();
        assert_eq!(exports[(0, 1)], 90.0);
        assert_eq!(exports.sum(), 90.0);

        assert!(one_sided_matrix(&registry, &clean, TradeFlow::Reconciled).is_err());
    }
}
