//! Apparent consumption by country of origin.
//!
//! Two models share the same inputs: a reconciled trade matrix `T` (rows
//! importers, columns exporters) and a diagonal production matrix `P`, both
//! in kg and indexed by one registry. Results have consuming areas as rows
//! and producing areas as columns.
//!
//! The Kastner model traces material through any number of re-export hops
//! by solving `(I - A) D = P`, where `A` holds each exporter's trade as a
//! share of its domestic material input (DMI). The direct model only looks
//! at first-hop imports.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use nalgebra::DVector;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;

use crate::config::MfaConfig;
use crate::error::MfaError;
use crate::matrix::{col_sums, ensure_square, row_sums, FlowMatrix};
use crate::registry::EntityRegistry;

/// Relative slack for treating a loop member as re-exporting all of its DMI.
const LOOP_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionMethod {
    /// Re-export tracing through the imports-of-imports system
    Kastner,
    /// First-hop imports only
    Direct,
}

impl fmt::Display for ConsumptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumptionMethod::Kastner => f.write_str("kastner"),
            ConsumptionMethod::Direct => f.write_str("direct"),
        }
    }
}

impl FromStr for ConsumptionMethod {
    type Err = MfaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kastner" => Ok(ConsumptionMethod::Kastner),
            "direct" | "no" => Ok(ConsumptionMethod::Direct),
            other => Err(MfaError::InvalidData(format!(
                "unknown consumption method '{other}'"
            ))),
        }
    }
}

/// Thresholds for the data-quality warnings logged while tracing.
#[derive(Debug, Clone, Copy)]
pub struct TracingOptions {
    /// Share of total DMI drawn from inventory above which a warning is logged
    pub inventory_warning_share: f64,
    /// Relative shortfall of attributed vs recorded production tolerated silently
    pub balance_tolerance: f64,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            inventory_warning_share: 0.05,
            balance_tolerance: 1e-6,
        }
    }
}

impl From<&MfaConfig> for TracingOptions {
    fn from(config: &MfaConfig) -> Self {
        Self {
            inventory_warning_share: config.inventory_warning_share,
            balance_tolerance: config.balance_tolerance,
        }
    }
}

/// Mass-balance figures of one tracing run.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingDiagnostics {
    /// Production plus imports over all areas
    pub total_dmi: f64,
    /// Exports in excess of DMI, summed over areas
    pub inventory_adjustment: f64,
    /// `inventory_adjustment / total_dmi`, 0 without DMI
    pub inventory_share: f64,
    pub recorded_production: f64,
    /// Sum of the consumption-by-origin matrix
    pub attributed_consumption: f64,
}

/// Result of the Kastner model.
#[derive(Debug, Clone)]
pub struct OriginTracing {
    /// Consumption by origin, rows consumers, columns producers, kg
    pub consumption: FlowMatrix,
    /// DMI attributable to each producer before re-exports are removed
    pub dmi_by_origin: FlowMatrix,
    /// Inventory-adjusted DMI per area
    pub dmi_adjusted: DVector<f64>,
    /// Share of each area's adjusted DMI kept for domestic use
    pub retention_share: DVector<f64>,
    pub diagnostics: TracingDiagnostics,
}

/// Kastner origin tracing.
///
/// Exports beyond an area's DMI are assumed to come from inventory and are
/// added to its DMI. Areas whose adjusted DMI is zero are masked out of the
/// inversion and end up with all-zero rows.
pub fn kastner_consumption(
    trade: &FlowMatrix,
    production: &FlowMatrix,
    registry: &EntityRegistry,
    options: &TracingOptions,
) -> Result<OriginTracing, MfaError> {
    let n = registry.len();
    ensure_square(trade, n)?;
    ensure_square(production, n)?;

    let dmi = row_sums(production) + row_sums(trade);
    let exports = col_sums(trade);
    let inventory = (&exports - &dmi).map(|x| x.max(0.0));

    let total_dmi = dmi.sum();
    let inventory_adjustment = inventory.sum();
    let inventory_share = if total_dmi > 0.0 {
        inventory_adjustment / total_dmi
    } else {
        0.0
    };
    if inventory_share > options.inventory_warning_share {
        tracing::warn!(
            share_pct = inventory_share * 100.0,
            "inventory changes are a large part of domestic production plus imports"
        );
    } else {
        tracing::info!(
            share_pct = inventory_share * 100.0,
            "inventory changes relative to domestic production plus imports"
        );
    }

    let dmi_adjusted = &dmi + &inventory;
    let has_dmi: Vec<bool> = dmi_adjusted.iter().map(|&x| x > 0.0).collect();

    // A = T · diag(dmi_adjusted)⁻¹ over areas with DMI; other columns stay 0.
    let mut export_share = trade.clone();
    for (j, mut column) in export_share.column_iter_mut().enumerate() {
        if has_dmi[j] {
            column /= dmi_adjusted[j];
        } else {
            column.fill(0.0);
        }
    }

    check_reexport_loops(trade, &dmi_adjusted, &has_dmi, registry)?;

    let system = FlowMatrix::identity(n, n) - &export_share;
    let dmi_by_origin = system
        .lu()
        .solve(production)
        .filter(|d| d.iter().all(|x| x.is_finite()))
        .ok_or_else(|| {
            MfaError::SingularSystem("I - A cannot be inverted for this trade matrix".into())
        })?;

    let retention_share = DVector::from_iterator(
        n,
        (0..n).map(|i| {
            if has_dmi[i] {
                ((dmi_adjusted[i] - exports[i]) / dmi_adjusted[i]).max(0.0)
            } else {
                0.0
            }
        }),
    );

    let mut consumption = dmi_by_origin.clone();
    for (i, mut row) in consumption.row_iter_mut().enumerate() {
        row *= retention_share[i];
    }
    // Round-off from the solve can leave tiny negatives.
    consumption.apply(|x| *x = x.max(0.0));

    let recorded_production = production.trace();
    let attributed_consumption = consumption.sum();
    check_balance(
        recorded_production,
        attributed_consumption,
        options.balance_tolerance,
    );

    Ok(OriginTracing {
        consumption,
        dmi_by_origin,
        dmi_adjusted,
        retention_share,
        diagnostics: TracingDiagnostics {
            total_dmi,
            inventory_adjustment,
            inventory_share,
            recorded_production,
            attributed_consumption,
        },
    })
}

/// Warn when less consumption is attributed than was produced, beyond the
/// relative `tolerance`. Returns whether it warned.
fn check_balance(recorded_production: f64, attributed_consumption: f64, tolerance: f64) -> bool {
    let short = attributed_consumption < recorded_production * (1.0 - tolerance);
    if short {
        tracing::warn!(
            recorded_production,
            attributed_consumption,
            "attributed consumption falls short of recorded production"
        );
    }
    short
}

/// Reject closed re-export loops.
///
/// A strongly connected group of trading areas in which every member sends
/// its whole adjusted DMI to other members gives `A` a spectral radius of
/// 1, so `I - A` has no inverse. The group is named in the error.
fn check_reexport_loops(
    trade: &FlowMatrix,
    dmi_adjusted: &DVector<f64>,
    has_dmi: &[bool],
    registry: &EntityRegistry,
) -> Result<(), MfaError> {
    let n = trade.nrows();
    let mut graph: DiGraph<usize, f64> = DiGraph::with_capacity(n, 0);
    let nodes: Vec<_> = (0..n).map(|i| graph.add_node(i)).collect();
    for importer in 0..n {
        for exporter in 0..n {
            let mass = trade[(importer, exporter)];
            if mass > 0.0 {
                graph.add_edge(nodes[exporter], nodes[importer], mass);
            }
        }
    }

    for component in tarjan_scc(&graph) {
        if component.len() < 2 {
            continue;
        }
        let members: HashSet<usize> = component.iter().map(|idx| graph[*idx]).collect();
        let closed = members.iter().all(|&c| {
            let internal_exports: f64 = members.iter().map(|&k| trade[(k, c)]).sum();
            has_dmi[c]
                && (internal_exports - dmi_adjusted[c]).abs()
                    <= LOOP_TOLERANCE * dmi_adjusted[c]
        });
        if closed {
            let mut areas: Vec<String> = members
                .iter()
                .map(|&c| registry.name(c).to_string())
                .collect();
            areas.sort();
            return Err(MfaError::ClosedReexportLoop { areas });
        }
    }
    Ok(())
}

/// Direct-import consumption: `(P + T)` with the columns of areas without
/// recorded production set to zero.
///
/// Areas with any nonzero production count as origins, however small.
pub fn direct_consumption(
    trade: &FlowMatrix,
    production: &FlowMatrix,
) -> Result<FlowMatrix, MfaError> {
    let n = production.nrows();
    ensure_square(production, n)?;
    ensure_square(trade, n)?;

    let mut consumption = production + trade;
    let mut dropped = 0.0;
    for (j, mut column) in consumption.column_iter_mut().enumerate() {
        if production[(j, j)] == 0.0 {
            dropped += column.sum();
            column.fill(0.0);
        }
    }
    tracing::debug!(dropped_kg = dropped, "trade from non-producing areas left out");
    Ok(consumption)
}

/// Consumption by origin with the chosen model.
pub fn consumption_matrix(
    method: ConsumptionMethod,
    trade: &FlowMatrix,
    production: &FlowMatrix,
    registry: &EntityRegistry,
    options: &TracingOptions,
) -> Result<FlowMatrix, MfaError> {
    match method {
        ConsumptionMethod::Kastner => {
            kastner_consumption(trade, production, registry, options).map(|t| t.consumption)
        }
        ConsumptionMethod::Direct => direct_consumption(trade, production),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::tests::{assert_close, capture_warnings};
    use crate::registry::tests::registry;

    fn diag(values: &[f64]) -> FlowMatrix {
        FlowMatrix::from_diagonal(&DVector::from_row_slice(values))
    }

    /// A produces 100 and ships 30 to B; B passes 10 on to C; D is idle.
    fn chain() -> (FlowMatrix, FlowMatrix, EntityRegistry) {
        let mut t = FlowMatrix::zeros(4, 4);
        t[(1, 0)] = 30.0;
        t[(2, 1)] = 10.0;
        (t, diag(&[100.0, 0.0, 0.0, 0.0]), registry(&["A", "B", "C", "D"]))
    }

    #[test]
    fn traces_origin_through_re_export() {
        let (t, p, reg) = chain();
        let r = kastner_consumption(&t, &p, &reg, &TracingOptions::default()).unwrap();

        assert_close(r.retention_share[0], 0.7);
        assert_close(r.consumption[(0, 0)], 70.0);
        assert_close(r.consumption[(1, 0)], 20.0);
        assert!(r.consumption[(2, 0)] > 0.0);
        assert_close(r.consumption[(2, 0)], 10.0);
        assert_close(r.dmi_by_origin[(2, 0)], 10.0);
        // Nothing originates in the non-producers.
        assert_close(r.consumption.column(1).sum(), 0.0);
        assert_close(r.diagnostics.attributed_consumption, 100.0);
        assert_close(r.diagnostics.inventory_share, 0.0);
    }

    #[test]
    fn small_inventory_share_is_not_a_warning() {
        let (t, p, reg) = chain();
        let (_, logs) = capture_warnings(|| {
            kastner_consumption(&t, &p, &reg, &TracingOptions::default()).unwrap()
        });
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn production_shortfall_is_a_warning() {
        let (short, logs) = capture_warnings(|| check_balance(100.0, 90.0, 1e-6));
        assert!(short);
        assert!(logs.contains("falls short of recorded production"), "{logs}");

        let (short, logs) = capture_warnings(|| check_balance(100.0, 100.0 - 1e-8, 1e-6));
        assert!(!short);
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn area_without_dmi_sinks_to_zero() {
        let (t, p, reg) = chain();
        let r = kastner_consumption(&t, &p, &reg, &TracingOptions::default()).unwrap();
        assert_eq!(r.dmi_adjusted[3], 0.0);
        assert_eq!(r.retention_share[3], 0.0);
        assert_eq!(r.consumption.row(3).sum(), 0.0);
        assert_eq!(r.consumption.column(3).sum(), 0.0);
    }

    #[test]
    fn all_entries_are_non_negative() {
        let mut t = FlowMatrix::zeros(4, 4);
        t[(1, 0)] = 40.0;
        t[(0, 1)] = 5.0;
        t[(2, 1)] = 12.0;
        t[(3, 2)] = 30.0; // more than C holds
        t[(0, 3)] = 1.0;
        let p = diag(&[100.0, 20.0, 3.0, 0.0]);
        let reg = registry(&["A", "B", "C", "D"]);
        let r = kastner_consumption(&t, &p, &reg, &TracingOptions::default()).unwrap();
        assert!(r.consumption.iter().all(|&x| x >= 0.0));
        assert!(r.diagnostics.inventory_adjustment > 0.0);
    }

    #[test]
    fn exports_beyond_dmi_come_from_inventory() {
        let mut t = FlowMatrix::zeros(2, 2);
        t[(1, 0)] = 30.0;
        let p = diag(&[10.0, 0.0]);
        let reg = registry(&["A", "B"]);
        let (r, logs) = capture_warnings(|| {
            kastner_consumption(&t, &p, &reg, &TracingOptions::default()).unwrap()
        });
        assert!(logs.contains("inventory changes are a large part"), "{logs}");

        assert_close(r.diagnostics.inventory_adjustment, 20.0);
        assert_close(r.diagnostics.inventory_share, 0.5);
        assert_close(r.dmi_adjusted[0], 30.0);
        assert_close(r.retention_share[0], 0.0);
        assert_close(r.consumption[(1, 0)], 10.0);
        assert_close(r.consumption.row(0).sum(), 0.0);
    }

    #[test]
    fn closed_loop_is_rejected() {
        let mut t = FlowMatrix::zeros(3, 3);
        t[(1, 2)] = 10.0;
        t[(2, 1)] = 10.0;
        let p = diag(&[50.0, 0.0, 0.0]);
        let reg = registry(&["A", "B", "C"]);
        match kastner_consumption(&t, &p, &reg, &TracingOptions::default()) {
            Err(MfaError::ClosedReexportLoop { areas }) => {
                assert_eq!(areas, vec!["B".to_string(), "C".to_string()])
            }
            other => panic!("expected closed loop, got {other:?}"),
        }
    }

    #[test]
    fn leaky_loop_is_solved() {
        // B and C trade back and forth but C keeps part of what it gets.
        let mut t = FlowMatrix::zeros(3, 3);
        t[(1, 0)] = 20.0;
        t[(2, 1)] = 25.0;
        t[(1, 2)] = 5.0;
        let p = diag(&[50.0, 0.0, 0.0]);
        let reg = registry(&["A", "B", "C"]);
        let r = kastner_consumption(&t, &p, &reg, &TracingOptions::default()).unwrap();
        assert_close(r.consumption.sum(), 50.0);
        assert!(r.consumption[(2, 0)] > 0.0);
    }

    #[test]
    fn shape_must_match_registry() {
        let reg = registry(&["A", "B"]);
        let t = FlowMatrix::zeros(3, 3);
        let p = FlowMatrix::zeros(3, 3);
        assert!(matches!(
            kastner_consumption(&t, &p, &reg, &TracingOptions::default()),
            Err(MfaError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn direct_model_masks_non_producers() {
        let (t, p, _) = chain();
        let r = direct_consumption(&t, &p).unwrap();
        assert_eq!(r[(0, 0)], 100.0);
        assert_eq!(r[(1, 0)], 30.0);
        // C bought from B, which produces nothing.
        assert_eq!(r[(2, 1)], 0.0);
        assert_eq!(r.sum(), 130.0);
    }

    #[test]
    fn dispatch_by_method() {
        let (t, p, reg) = chain();
        let opts = TracingOptions::default();
        let k = consumption_matrix(ConsumptionMethod::Kastner, &t, &p, &reg, &opts).unwrap();
        let d = consumption_matrix(ConsumptionMethod::Direct, &t, &p, &reg, &opts).unwrap();
        assert_close(k.sum(), 100.0);
        assert_eq!(d.sum(), 130.0);
        assert_eq!(
            "Kastner".parse::<ConsumptionMethod>().unwrap(),
            ConsumptionMethod::Kastner
        );
    }
}
