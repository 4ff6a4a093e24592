//! Summary tables over consumption-by-origin matrices.

use polars::prelude::*;

use crate::error::MfaError;
use crate::matrix::{col_sums, ensure_square, row_sums, FlowMatrix};
use crate::region::{aggregate, RegionGrouping};
use crate::registry::EntityRegistry;
use crate::schema::{kind, report};

/// Production (column sums) and apparent consumption (row sums) per area,
/// nonzero entries only. Columns: area, kind, quantity_kg.
pub fn production_consumption_table(
    m: &FlowMatrix,
    registry: &EntityRegistry,
) -> Result<DataFrame, MfaError> {
    ensure_square(m, registry.len())?;
    let mut areas = Vec::new();
    let mut kinds = Vec::new();
    let mut quantities = Vec::new();

    for (sums, label) in [
        (col_sums(m), kind::PRODUCTION),
        (row_sums(m), kind::CONSUMPTION),
    ] {
        for (i, &q) in sums.iter().enumerate() {
            if q != 0.0 {
                areas.push(registry.name(i));
                kinds.push(label);
                quantities.push(q);
            }
        }
    }

    let df = DataFrame::new(vec![
        Column::new(report::AREA.into(), &areas),
        Column::new(report::KIND.into(), &kinds),
        Column::new(report::QUANTITY_KG.into(), &quantities),
    ])?;
    Ok(df)
}

/// Share of each producing area's apparent consumption met by its own
/// production. Only areas with a nonzero diagonal are listed.
pub fn domestic_production_ratio(
    m: &FlowMatrix,
    registry: &EntityRegistry,
) -> Result<DataFrame, MfaError> {
    ensure_square(m, registry.len())?;
    let consumption = row_sums(m);

    let mut areas = Vec::new();
    let mut domestic = Vec::new();
    let mut apparent = Vec::new();
    let mut ratios = Vec::new();
    for i in 0..m.nrows() {
        let own = m[(i, i)];
        if own != 0.0 {
            areas.push(registry.name(i));
            domestic.push(own);
            apparent.push(consumption[i]);
            ratios.push(own / consumption[i]);
        }
    }

    let df = DataFrame::new(vec![
        Column::new(report::AREA.into(), &areas),
        Column::new(report::DOMESTIC_PRODUCTION.into(), &domestic),
        Column::new(report::APPARENT_CONSUMPTION.into(), &apparent),
        Column::new(report::DOMESTIC_PRODUCTION_RATIO.into(), &ratios),
    ])?;
    Ok(df)
}

/// Supply mix of one consuming location over a list of producing locations.
///
/// Locations are labels of `grouping`. Each share is the consumption of the
/// consumer's areas sourced from the producer's areas, over the consumer's
/// total apparent consumption. `fallback` is the catch-all location: it gets
/// no share when the consumer has consumption, and takes the whole mix when
/// the consumer has none and is not itself a producer location.
///
/// # Panics
///
/// Panics when the consumer has no consumption and `fallback` is not among
/// `producers`: the mix could not sum to one.
pub fn consumption_mix(
    m: &FlowMatrix,
    grouping: &RegionGrouping,
    consumer: &str,
    producers: &[&str],
    fallback: &str,
    tolerance: f64,
) -> Vec<(String, f64)> {
    let consumer_areas = grouping.members(consumer);
    let consumption = row_sums(m);
    let local: f64 = consumer_areas.iter().map(|&i| consumption[i]).sum();

    if local == 0.0 {
        assert!(
            producers.contains(&fallback),
            "no {fallback} producing location for {consumer}"
        );
        let sole = if producers.contains(&consumer) {
            consumer
        } else {
            fallback
        };
        return producers
            .iter()
            .map(|&p| (p.to_string(), if p == sole { 1.0 } else { 0.0 }))
            .collect();
    }

    let mix: Vec<(String, f64)> = producers
        .iter()
        .map(|&p| {
            if p == fallback {
                return (p.to_string(), 0.0);
            }
            let sourced: f64 = grouping
                .members(p)
                .iter()
                .map(|&j| consumer_areas.iter().map(|&i| m[(i, j)]).sum::<f64>())
                .sum();
            (p.to_string(), sourced / local)
        })
        .collect();

    let total: f64 = mix.iter().map(|(_, s)| s).sum();
    if total < 1.0 - tolerance {
        tracing::warn!(
            location = consumer,
            total_mix = total,
            "consumption mix sums to less than one"
        );
    }
    mix
}

/// Share of each producer location in total production.
///
/// Production per area is the column sum of `m`, so both a diagonal
/// production matrix and a consumption-by-origin matrix work. `fallback`
/// gets no share. Shares summing below `1 - tolerance` are logged, which
/// happens when some producing areas belong to no listed location.
pub fn production_mix(
    m: &FlowMatrix,
    grouping: &RegionGrouping,
    producers: &[&str],
    fallback: &str,
    tolerance: f64,
) -> Vec<(String, f64)> {
    let production = col_sums(m);
    let total = production.sum();

    let mix: Vec<(String, f64)> = producers
        .iter()
        .map(|&p| {
            if p == fallback || total == 0.0 {
                return (p.to_string(), 0.0);
            }
            let produced: f64 = grouping.members(p).iter().map(|&j| production[j]).sum();
            (p.to_string(), produced / total)
        })
        .collect();

    let covered: f64 = mix.iter().map(|(_, s)| s).sum();
    if covered < 1.0 - tolerance {
        tracing::warn!(
            covered_share = covered,
            total_production = total,
            "production mix does not cover total production"
        );
    }
    mix
}

/// A consumption mix as a (location, share) table.
pub fn mix_frame(mix: &[(String, f64)]) -> Result<DataFrame, MfaError> {
    let locations: Vec<&str> = mix.iter().map(|(l, _)| l.as_str()).collect();
    let shares: Vec<f64> = mix.iter().map(|(_, s)| *s).collect();
    let df = DataFrame::new(vec![
        Column::new(report::LOCATION.into(), &locations),
        Column::new(report::SHARE.into(), &shares),
    ])?;
    Ok(df)
}

/// Region-to-region flows as (consumer, producer, quantity_kg) rows.
pub fn region_flows(
    m: &FlowMatrix,
    registry: &EntityRegistry,
    consumers: &RegionGrouping,
    producers: &RegionGrouping,
) -> Result<DataFrame, MfaError> {
    aggregate(m, registry, Some(consumers), Some(producers))?.to_long_frame()
}
