use rayon::prelude::*;
use serde::Serialize;

use crate::result::{GammaGrid, VoxelGamma};

/// Summary of a finalized gamma grid.
///
/// Excluded voxels never enter any figure; search-exhausted voxels count
/// at their reported gamma (and therefore against the pass rate).
#[derive(Clone, Copy, Debug, Serialize)]
pub struct GammaStats {
    /// Fraction of included voxels with γ ≤ 1, or `None` when every voxel
    /// was excluded.
    pub pass_rate: Option<f64>,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub total_voxels: usize,
    pub excluded_voxels: usize,
    pub exhausted_voxels: usize,
    pub passed_voxels: usize,
}

#[derive(Clone, Copy, Default)]
struct Partial {
    included: usize,
    excluded: usize,
    exhausted: usize,
    passed: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Partial {
    fn identity() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            ..Self::default()
        }
    }

    fn accept(mut self, voxel: &VoxelGamma) -> Self {
        match voxel {
            VoxelGamma::Excluded => self.excluded += 1,
            VoxelGamma::Computed { gamma, exhausted } => {
                self.included += 1;
                self.exhausted += usize::from(*exhausted);
                self.passed += usize::from(*gamma <= 1.0);
                self.sum += gamma;
                self.min = self.min.min(*gamma);
                self.max = self.max.max(*gamma);
            }
        }
        self
    }

    // sum/count/min/max are commutative and associative, so merge order
    // (and with it the rayon split) cannot change the outcome beyond
    // floating-point summation order
    fn merge(self, other: Self) -> Self {
        Self {
            included: self.included + other.included,
            excluded: self.excluded + other.excluded,
            exhausted: self.exhausted + other.exhausted,
            passed: self.passed + other.passed,
            sum: self.sum + other.sum,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Reduce a gamma grid into its summary statistics.
pub fn compute_stats(grid: &GammaGrid) -> GammaStats {
    let partial = grid
        .voxels()
        .par_iter()
        .fold(Partial::identity, |acc, v| acc.accept(v))
        .reduce(Partial::identity, Partial::merge);

    let included = partial.included;
    GammaStats {
        pass_rate: (included > 0).then(|| partial.passed as f64 / included as f64),
        mean: (included > 0).then(|| partial.sum / included as f64),
        min: (included > 0).then_some(partial.min),
        max: (included > 0).then_some(partial.max),
        total_voxels: grid.len(),
        excluded_voxels: partial.excluded,
        exhausted_voxels: partial.exhausted,
        passed_voxels: partial.passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::SearchStrategy;
    use approx::assert_abs_diff_eq;

    fn grid_of(voxels: Vec<VoxelGamma>) -> GammaGrid {
        let n = voxels.len();
        GammaGrid::new(
            voxels,
            [1, 1, n],
            [0.0; 3],
            [1.0; 3],
            SearchStrategy::FullLattice,
        )
    }

    fn computed(gamma: f64) -> VoxelGamma {
        VoxelGamma::Computed {
            gamma,
            exhausted: false,
        }
    }

    #[test]
    fn partitions_the_trichotomy() {
        let grid = grid_of(vec![
            computed(0.5),
            computed(1.5),
            VoxelGamma::Excluded,
            VoxelGamma::Computed {
                gamma: 3.0,
                exhausted: true,
            },
        ]);
        let stats = compute_stats(&grid);

        assert_eq!(stats.total_voxels, 4);
        assert_eq!(stats.excluded_voxels, 1);
        assert_eq!(stats.exhausted_voxels, 1);
        assert_eq!(stats.passed_voxels, 1);
        // 1 of 3 included voxels passes
        assert_abs_diff_eq!(stats.pass_rate.unwrap(), 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.mean.unwrap(), (0.5 + 1.5 + 3.0) / 3.0, epsilon = 1e-12);
        assert_eq!(stats.min.unwrap(), 0.5);
        assert_eq!(stats.max.unwrap(), 3.0);
    }

    #[test]
    fn all_excluded_reports_no_rates_instead_of_dividing_by_zero() {
        let grid = grid_of(vec![VoxelGamma::Excluded; 3]);
        let stats = compute_stats(&grid);

        assert_eq!(stats.excluded_voxels, 3);
        assert!(stats.pass_rate.is_none());
        assert!(stats.mean.is_none());
        assert!(stats.min.is_none());
        assert!(stats.max.is_none());
    }

    #[test]
    fn boundary_gamma_of_one_passes() {
        let stats = compute_stats(&grid_of(vec![computed(1.0)]));
        assert_abs_diff_eq!(stats.pass_rate.unwrap(), 1.0, epsilon = 1e-12);
    }
}
