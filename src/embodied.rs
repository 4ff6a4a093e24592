use crate::error::MfaError;
use crate::matrix::FlowMatrix;
use crate::mineral::Mineral;
use crate::region::{normalize, Axis};

/// Origin matrix of `production_of` embodied in the consumption of
/// `consumption_of`.
///
/// Starts from the consumption-by-origin matrix of `consumption_of` and
/// walks up the chain one stage at a time. At each precursor stage the
/// running matrix is scaled by the precursor's input intensity and
/// multiplied by the precursor's origin shares (each consuming area's row
/// divided by its total). Rows are final consumers, columns the areas where
/// `production_of` was produced.
///
/// `origin_matrix` supplies the consumption-by-origin matrix of a mineral.
pub fn embodied_consumption<F>(
    production_of: Mineral,
    consumption_of: Mineral,
    mut origin_matrix: F,
) -> Result<FlowMatrix, MfaError>
where
    F: FnMut(Mineral) -> Result<FlowMatrix, MfaError>,
{
    let stages = production_of
        .stages_to(consumption_of)
        .ok_or_else(|| MfaError::InvalidChain {
            production_of: production_of.to_string(),
            consumption_of: consumption_of.to_string(),
        })?;

    let mut embodied = origin_matrix(consumption_of)?;
    for &stage in stages.iter().rev().skip(1) {
        let shares = normalize(&origin_matrix(stage)?, Axis::Rows);
        if shares.shape() != embodied.shape() {
            return Err(MfaError::DimensionMismatch {
                expected: embodied.nrows(),
                found_rows: shares.nrows(),
                found_cols: shares.ncols(),
            });
        }
        embodied = (embodied * stage.input_intensity()) * shares;
        tracing::debug!(
            stage = %stage,
            total_kg = embodied.sum(),
            "propagated embodied consumption"
        );
    }
    Ok(embodied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::tests::assert_close;

    // Areas X, Y, Z.
    fn origins(mineral: Mineral) -> Result<FlowMatrix, MfaError> {
        let values: [f64; 9] = match mineral {
            Mineral::Aluminium => [10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0, 0.0, 5.0],
            Mineral::Alumina => [10.0, 30.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 20.0],
            Mineral::Bauxite => [0.0, 0.0, 0.0, 0.0, 40.0, 0.0, 60.0, 0.0, 20.0],
        };
        Ok(FlowMatrix::from_row_slice(3, 3, &values))
    }

    #[test]
    fn same_mineral_is_its_own_origin_matrix() {
        let m = embodied_consumption(Mineral::Alumina, Mineral::Alumina, origins).unwrap();
        assert_eq!(m, origins(Mineral::Alumina).unwrap());
    }

    #[test]
    fn alumina_in_aluminium_one_hop() {
        let m = embodied_consumption(Mineral::Alumina, Mineral::Aluminium, origins).unwrap();
        let k = 1.93538;
        // Alumina shares: X [0.25, 0.75, 0], Y none, Z [0, 0, 1]
        assert_close(m[(0, 0)], 2.5 * k);
        assert_close(m[(0, 1)], 7.5 * k);
        assert_close(m[(2, 0)], 1.25 * k);
        assert_close(m[(2, 1)], 3.75 * k);
        assert_close(m[(2, 2)], 5.0 * k);
        assert_close(m.row(1).sum(), 0.0);
    }

    #[test]
    fn bauxite_in_aluminium_two_hops() {
        let m = embodied_consumption(Mineral::Bauxite, Mineral::Aluminium, origins).unwrap();
        let k = 1.93538 * 2.8764;
        // Bauxite shares: X none, Y [0, 1, 0], Z [0.75, 0, 0.25]
        assert_close(m[(0, 0)], 0.0);
        assert_close(m[(0, 1)], 7.5 * k);
        assert_close(m[(2, 0)], 3.75 * k);
        assert_close(m[(2, 1)], 3.75 * k);
        assert_close(m[(2, 2)], 1.25 * k);
    }

    #[test]
    fn each_stage_matrix_is_requested() {
        let mut asked = Vec::new();
        embodied_consumption(Mineral::Bauxite, Mineral::Aluminium, |m| {
            asked.push(m);
            origins(m)
        })
        .unwrap();
        assert_eq!(
            asked,
            vec![Mineral::Aluminium, Mineral::Alumina, Mineral::Bauxite]
        );
    }

    #[test]
    fn downstream_to_upstream_is_invalid() {
        let err = embodied_consumption(Mineral::Aluminium, Mineral::Bauxite, origins);
        assert!(matches!(err, Err(MfaError::InvalidChain { .. })));
    }
}
