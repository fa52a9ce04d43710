use crate::config::ResolvedThresholds;
use crate::grid::{BOUNDS_TOLERANCE, DoseGrid};
use crate::result::VoxelGamma;
use crate::search::SearchSpace;

/// Computes gamma for single reference voxels.
///
/// Borrows the two grids, the search space and the resolved thresholds for
/// the duration of the run; holds nothing mutable, so one evaluator can be
/// shared by every worker. All arithmetic is `f64` regardless of the `f32`
/// storage, so small dose differences don't lose precision to cancellation.
pub struct GammaEvaluator<'a> {
    reference: &'a DoseGrid,
    eval_values: &'a [f32],
    search: &'a SearchSpace,
    thresholds: ResolvedThresholds,
    /// Gamma reported when no in-bounds sample exists within the search
    /// radius: the distance-term lower bound at the radius.
    exhausted_gamma: f64,
    eval_origin: [f64; 3],
    eval_inv_spacing: [f64; 3],
    eval_min: [f64; 3],
    eval_max: [f64; 3],
    eval_size: [usize; 3],
}

impl<'a> GammaEvaluator<'a> {
    pub fn new(
        reference: &'a DoseGrid,
        evaluated: &'a DoseGrid,
        search: &'a SearchSpace,
        thresholds: ResolvedThresholds,
        max_search_distance: f64,
    ) -> Self {
        let spacing = evaluated.spacing();
        let bounds = evaluated.bounds();
        let mut eval_min = [0.0; 3];
        let mut eval_max = [0.0; 3];
        for axis in 0..3 {
            eval_min[axis] = bounds[axis][0] - BOUNDS_TOLERANCE;
            eval_max[axis] = bounds[axis][1] + BOUNDS_TOLERANCE;
        }
        Self {
            reference,
            eval_values: evaluated.values(),
            search,
            thresholds,
            exhausted_gamma: max_search_distance * thresholds.dta_inv_sq.sqrt(),
            eval_origin: evaluated.origin(),
            eval_inv_spacing: [1.0 / spacing[0], 1.0 / spacing[1], 1.0 / spacing[2]],
            eval_min,
            eval_max,
            eval_size: evaluated.size(),
        }
    }

    /// Gamma for the reference voxel at a flat row-major index.
    pub fn evaluate(&self, index: usize) -> VoxelGamma {
        let dose_ref = self.reference.get(index) as f64;

        if dose_ref < self.thresholds.cutoff_abs {
            return VoxelGamma::Excluded;
        }
        let Some(dd_factor) = self.thresholds.dd_factor(dose_ref) else {
            return VoxelGamma::Excluded;
        };

        let [zr, yr, xr] = self.reference.position(index);

        let mut min_gamma_sq = f64::INFINITY;
        let mut sampled = false;

        for point in self.search.points() {
            let dist_term = point.dist_sq * self.thresholds.dta_inv_sq;
            // candidates only grow in distance, so once the distance term
            // alone reaches the running minimum nothing later can beat it
            if dist_term >= min_gamma_sq {
                break;
            }

            let ze = zr + point.dz;
            let ye = yr + point.dy;
            let xe = xr + point.dx;

            if ze < self.eval_min[0]
                || ze > self.eval_max[0]
                || ye < self.eval_min[1]
                || ye > self.eval_max[1]
                || xe < self.eval_min[2]
                || xe > self.eval_max[2]
            {
                continue;
            }

            let dose_eval = self.sample_unchecked([ze, ye, xe]);
            sampled = true;

            let dose_diff = dose_eval - dose_ref;
            let gamma_sq = dose_diff * dose_diff * dd_factor + dist_term;
            if gamma_sq < min_gamma_sq {
                min_gamma_sq = gamma_sq;
            }
        }

        if sampled {
            VoxelGamma::Computed {
                gamma: min_gamma_sq.sqrt(),
                exhausted: false,
            }
        } else {
            // no agreement point could even be sampled; report the bound
            // implied by the search radius rather than failing
            VoxelGamma::Computed {
                gamma: self.exhausted_gamma,
                exhausted: true,
            }
        }
    }

    /// Trilinear sample of the evaluated grid at an in-bounds position.
    ///
    /// Inlined rather than routed through [`DoseGrid::sample`]: the bounds
    /// were already checked against the padded box, and skipping the
    /// per-call bound recomputation is worth a few percent in the hot loop.
    #[inline]
    fn sample_unchecked(&self, position: [f64; 3]) -> f64 {
        let [nz, ny, nx] = self.eval_size;

        let tz = ((position[0] - self.eval_origin[0]) * self.eval_inv_spacing[0]).max(0.0);
        let ty = ((position[1] - self.eval_origin[1]) * self.eval_inv_spacing[1]).max(0.0);
        let tx = ((position[2] - self.eval_origin[2]) * self.eval_inv_spacing[2]).max(0.0);

        let k0 = (tz as usize).min(nz - 1);
        let j0 = (ty as usize).min(ny - 1);
        let i0 = (tx as usize).min(nx - 1);
        let k1 = (k0 + 1).min(nz - 1);
        let j1 = (j0 + 1).min(ny - 1);
        let i1 = (i0 + 1).min(nx - 1);

        let zd = tz - k0 as f64;
        let yd = ty - j0 as f64;
        let xd = tx - i0 as f64;

        let at = |k: usize, j: usize, i: usize| self.eval_values[(k * ny + j) * nx + i] as f64;

        let c000 = at(k0, j0, i0);
        let c001 = at(k0, j0, i1);
        let c010 = at(k0, j1, i0);
        let c011 = at(k0, j1, i1);
        let c100 = at(k1, j0, i0);
        let c101 = at(k1, j0, i1);
        let c110 = at(k1, j1, i0);
        let c111 = at(k1, j1, i1);

        let c00 = c000 * (1.0 - xd) + c001 * xd;
        let c01 = c010 * (1.0 - xd) + c011 * xd;
        let c10 = c100 * (1.0 - xd) + c101 * xd;
        let c11 = c110 * (1.0 - xd) + c111 * xd;

        let c0 = c00 * (1.0 - yd) + c01 * yd;
        let c1 = c10 * (1.0 - yd) + c11 * yd;

        c0 * (1.0 - zd) + c1 * zd
    }
}
