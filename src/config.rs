use thiserror::Error;

use crate::enums::{Normalization, SearchStrategy};
use crate::grid::DoseGrid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dose difference threshold is not positive (dd = {0})")]
    NonPositiveDd(f64),

    #[error("distance-to-agreement threshold is not positive (dta = {0})")]
    NonPositiveDta(f64),

    #[error("dose cutoff must lie in [0, 1) (cutoff = {0})")]
    CutoffOutOfRange(f64),

    #[error("step size is not positive (step = {0})")]
    NonPositiveStep(f64),

    #[error("step size exceeds the maximum search distance ({step} > {max_search})")]
    StepExceedsSearchDistance { step: f64, max_search: f64 },

    #[error("maximum search distance is not positive (max search = {0})")]
    NonPositiveSearchDistance(f64),

    #[error("global normalization dose is not positive (norm dose = {0})")]
    NonPositiveNormDose(f64),

    #[error("dimensionality must be 1, 2 or 3 (dims = {0})")]
    InvalidDims(u8),

    #[error("{which} grid is {actual}D but the comparison is configured as {expected}D")]
    DimensionMismatch {
        which: &'static str,
        actual: u8,
        expected: u8,
    },
}

/// Parameters of a gamma-index comparison.
///
/// Distances are in millimeters, `dd` in percent. `dose_cutoff` is a
/// fraction of the maximum reference dose; voxels below it are excluded
/// from both the computation and the statistics.
#[derive(Clone, Debug)]
pub struct GammaConfig {
    /// Dose difference criterion in percent.
    pub dd: f64,
    /// Distance-to-agreement criterion in mm.
    pub dta: f64,
    pub normalization: Normalization,
    /// Dose used for global normalization. Defaults to the maximum
    /// reference dose when unset.
    pub global_norm_dose: Option<f64>,
    /// Fraction of the maximum reference dose below which voxels are excluded.
    pub dose_cutoff: f64,
    /// Search radius around each reference voxel in mm.
    pub max_search_distance: f64,
    /// Lattice pitch of the search in mm.
    pub step_size: f64,
    /// Dimensionality of the comparison (1, 2 or 3).
    pub dims: u8,
    /// Worker threads; 0 uses all available cores.
    pub threads: usize,
    pub search_strategy: SearchStrategy,
}

impl Default for GammaConfig {
    /// The customary 3%/3mm criteria with a 10mm search radius and a
    /// step of DTA/10.
    fn default() -> Self {
        Self {
            dd: 3.0,
            dta: 3.0,
            normalization: Normalization::Global,
            global_norm_dose: None,
            dose_cutoff: 0.0,
            max_search_distance: 10.0,
            step_size: 0.3,
            dims: 3,
            threads: 0,
            search_strategy: SearchStrategy::FullLattice,
        }
    }
}

impl GammaConfig {
    /// Check every invariant that must hold before any computation starts.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant. Nothing is ever coerced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dd <= 0.0 {
            return Err(ConfigError::NonPositiveDd(self.dd));
        }
        if self.dta <= 0.0 {
            return Err(ConfigError::NonPositiveDta(self.dta));
        }
        if !(0.0..1.0).contains(&self.dose_cutoff) {
            return Err(ConfigError::CutoffOutOfRange(self.dose_cutoff));
        }
        if self.max_search_distance <= 0.0 {
            return Err(ConfigError::NonPositiveSearchDistance(
                self.max_search_distance,
            ));
        }
        if self.step_size <= 0.0 {
            return Err(ConfigError::NonPositiveStep(self.step_size));
        }
        if self.step_size > self.max_search_distance {
            return Err(ConfigError::StepExceedsSearchDistance {
                step: self.step_size,
                max_search: self.max_search_distance,
            });
        }
        if let Some(norm_dose) = self.global_norm_dose
            && norm_dose <= 0.0
        {
            return Err(ConfigError::NonPositiveNormDose(norm_dose));
        }
        if !(1..=3).contains(&self.dims) {
            return Err(ConfigError::InvalidDims(self.dims));
        }
        Ok(())
    }

    /// Check that both grids have the rank this comparison is configured for.
    pub fn validate_grids(
        &self,
        reference: &DoseGrid,
        evaluated: &DoseGrid,
    ) -> Result<(), ConfigError> {
        for (which, grid) in [("reference", reference), ("evaluated", evaluated)] {
            if grid.dims() > self.dims {
                return Err(ConfigError::DimensionMismatch {
                    which,
                    actual: grid.dims(),
                    expected: self.dims,
                });
            }
        }
        Ok(())
    }
}

/// Thresholds resolved once per run and passed read-only into every worker.
///
/// The dose-difference factor is stored squared and inverted so the hot loop
/// multiplies instead of dividing, as in
/// `gamma² = (De - Dr)² · dd_factor + dist² · dta_inv_sq`.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedThresholds {
    /// `(100 / dd)² / norm_dose²` for global normalization.
    dd_global_inv_sq: f64,
    /// `(100 / dd)²`; divided by `dose_ref²` per voxel in local mode.
    dd_inv_sq: f64,
    pub dta_inv_sq: f64,
    /// Absolute dose floor; reference voxels below it are excluded.
    pub cutoff_abs: f64,
    local: bool,
}

impl ResolvedThresholds {
    pub fn resolve(reference: &DoseGrid, config: &GammaConfig) -> Self {
        let max_ref = reference.max_dose();
        let norm_dose = config.global_norm_dose.unwrap_or(max_ref);
        let dd_inv_sq = (100.0 / config.dd) * (100.0 / config.dd);
        Self {
            dd_global_inv_sq: dd_inv_sq / (norm_dose * norm_dose),
            dd_inv_sq,
            dta_inv_sq: 1.0 / (config.dta * config.dta),
            cutoff_abs: config.dose_cutoff * max_ref,
            local: config.normalization == Normalization::Local,
        }
    }

    /// Dose-difference factor for one reference voxel, or `None` when the
    /// voxel degenerates (local normalization with dose ≤ 0, where no
    /// finite threshold exists — the voxel is excluded).
    #[inline]
    pub fn dd_factor(&self, dose_ref: f64) -> Option<f64> {
        if self.local {
            if dose_ref <= 0.0 {
                return None;
            }
            Some(self.dd_inv_sq / (dose_ref * dose_ref))
        } else {
            Some(self.dd_global_inv_sq)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn flat_grid(value: f32, n: usize) -> DoseGrid {
        DoseGrid::new(vec![value; n], [1, 1, n], [0.0; 3], [1.0; 3]).unwrap()
    }

    #[test]
    fn default_config_is_valid() {
        GammaConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_criteria() {
        let mut cfg = GammaConfig::default();
        cfg.dd = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::NonPositiveDd(_))));

        let mut cfg = GammaConfig::default();
        cfg.dta = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::NonPositiveDta(_))));

        let mut cfg = GammaConfig::default();
        cfg.dose_cutoff = 1.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::CutoffOutOfRange(_))
        ));

        let mut cfg = GammaConfig::default();
        cfg.step_size = 20.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::StepExceedsSearchDistance { .. })
        ));

        let mut cfg = GammaConfig::default();
        cfg.dims = 4;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDims(4))));
    }

    #[test]
    fn grid_rank_must_fit_configured_dims() {
        let mut cfg = GammaConfig::default();
        cfg.dims = 1;
        let g1 = flat_grid(1.0, 4);
        let g2 = DoseGrid::new(vec![1.0; 4], [1, 2, 2], [0.0; 3], [1.0; 3]).unwrap();
        assert!(cfg.validate_grids(&g1, &g1).is_ok());
        assert!(matches!(
            cfg.validate_grids(&g1, &g2),
            Err(ConfigError::DimensionMismatch {
                which: "evaluated",
                ..
            })
        ));
    }

    #[test]
    fn global_factor_uses_configured_norm_dose() {
        let reference = flat_grid(2.0, 4);
        let mut cfg = GammaConfig::default();
        cfg.dd = 10.0;
        cfg.global_norm_dose = Some(5.0);
        let thresholds = ResolvedThresholds::resolve(&reference, &cfg);
        // abs dose diff = 10% of 5.0 = 0.5; factor = 1 / 0.5²
        assert_abs_diff_eq!(thresholds.dd_factor(2.0).unwrap(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn global_factor_falls_back_to_max_reference_dose() {
        let reference = flat_grid(4.0, 4);
        let mut cfg = GammaConfig::default();
        cfg.dd = 25.0;
        let thresholds = ResolvedThresholds::resolve(&reference, &cfg);
        // abs dose diff = 25% of 4.0 = 1.0
        assert_abs_diff_eq!(thresholds.dd_factor(0.0).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn local_factor_degenerates_at_non_positive_dose() {
        let reference = flat_grid(4.0, 4);
        let mut cfg = GammaConfig::default();
        cfg.dd = 50.0;
        cfg.normalization = Normalization::Local;
        let thresholds = ResolvedThresholds::resolve(&reference, &cfg);
        assert!(thresholds.dd_factor(0.0).is_none());
        assert!(thresholds.dd_factor(-1.0).is_none());
        // abs dose diff at dose 2.0 = 50% of 2.0 = 1.0
        assert_abs_diff_eq!(thresholds.dd_factor(2.0).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cutoff_is_resolved_against_max_reference_dose() {
        let reference = flat_grid(10.0, 4);
        let mut cfg = GammaConfig::default();
        cfg.dose_cutoff = 0.2;
        let thresholds = ResolvedThresholds::resolve(&reference, &cfg);
        assert_abs_diff_eq!(thresholds.cutoff_abs, 2.0, epsilon = 1e-12);
    }
}
