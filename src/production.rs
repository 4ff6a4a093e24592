use std::collections::BTreeSet;

use nalgebra::DVector;
use polars::prelude::*;

use crate::error::MfaError;
use crate::matrix::FlowMatrix;
use crate::registry::EntityRegistry;
use crate::schema::production;
use crate::trade::require_columns;

/// Annual production per registry area, kg.
///
/// `table` is a production table read as strings (country, year, value).
/// Missing values count as 0 and are scaled by `scale` (1e6 for tables in
/// thousand tonnes). Countries without a registry entry are skipped with a
/// warning; repeated rows for one country add up.
pub fn production_vector(
    registry: &EntityRegistry,
    table: &DataFrame,
    year: i32,
    scale: f64,
) -> Result<DVector<f64>, MfaError> {
    require_columns(
        table,
        &[production::COUNTRY, production::YEAR, production::VALUE],
    )?;

    let df = table
        .clone()
        .lazy()
        .with_columns([
            col(production::YEAR)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Int64),
            col(production::VALUE)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Float64)
                .fill_null(lit(0.0)),
        ])
        .filter(col(production::YEAR).eq(lit(year as i64)))
        .collect()?;

    let countries = df.column(production::COUNTRY)?.str()?;
    let values = df.column(production::VALUE)?.f64()?;

    let mut out = DVector::zeros(registry.len());
    let mut unknown = BTreeSet::new();
    for (country, value) in countries.into_iter().zip(values) {
        let Some(country) = country else {
            continue;
        };
        match registry.index_of_name(country) {
            Some(i) => out[i] += value.unwrap_or(0.0) * scale,
            None => {
                unknown.insert(country.trim().to_string());
            }
        }
    }
    for country in unknown {
        tracing::warn!(%country, year, "producer has no registry equivalency, skipping");
    }
    Ok(out)
}

/// Diagonal production matrix P with `P[c, c]` = production of area c, kg.
pub fn production_matrix(
    registry: &EntityRegistry,
    table: &DataFrame,
    year: i32,
    scale: f64,
) -> Result<FlowMatrix, MfaError> {
    let v = production_vector(registry, table, year, scale)?;
    Ok(FlowMatrix::from_diagonal(&v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::registry;

    fn table() -> DataFrame {
        DataFrame::new(vec![
            Column::new(
                production::COUNTRY.into(),
                &["Australia", "Guinea", "Atlantis", "Australia", "Guinea"],
            ),
            Column::new(production::YEAR.into(), &["2010", "2010", "2010", "2011", " 2011"]),
            Column::new(
                production::VALUE.into(),
                &[Some("68.5"), None, Some("3"), Some("70"), Some("17.6")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn scales_and_places_on_diagonal() {
        let reg = registry(&["Australia", "Guinea", "Brazil"]);
        let p = production_matrix(&reg, &table(), 2011, 1e6).unwrap();
        assert_eq!(p.nrows(), 3);
        assert_eq!(p[(0, 0)], 70.0 * 1e6);
        assert_eq!(p[(1, 1)], 17.6 * 1e6);
        assert_eq!(p[(2, 2)], 0.0);
        assert_eq!(p[(0, 1)], 0.0);
    }

    #[test]
    fn missing_values_and_unknown_countries_are_skipped() {
        let reg = registry(&["Australia", "Guinea", "Brazil"]);
        let v = production_vector(&reg, &table(), 2010, 1e6).unwrap();
        assert_eq!(v[0], 68.5 * 1e6);
        assert_eq!(v[1], 0.0);
        assert_eq!(v.sum(), 68.5 * 1e6);
    }

    #[test]
    fn year_without_rows_is_all_zero() {
        let reg = registry(&["Australia"]);
        let v = production_vector(&reg, &table(), 1999, 1e6).unwrap();
        assert_eq!(v.sum(), 0.0);
    }
}
