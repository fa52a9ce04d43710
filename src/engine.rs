use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{ConfigError, GammaConfig, ResolvedThresholds};
use crate::evaluator::GammaEvaluator;
use crate::grid::DoseGrid;
use crate::result::{GammaGrid, VoxelGamma};
use crate::search::SearchSpace;

#[derive(Debug, Error)]
pub enum GammaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("computation was cancelled")]
    Cancelled,

    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Caller-held flag for aborting a running computation.
///
/// Workers check it once per chunk, not per voxel, so cancellation is
/// coarse-grained and free on the hot path.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Compute the gamma index of `evaluated` against `reference`.
///
/// Every reference voxel is evaluated independently; the output grid has
/// the reference geometry. Insufficient overlap between the grids is not
/// an error — affected voxels come back search-exhausted and show up in
/// the statistics.
///
/// # Errors
///
/// Fails fast on invalid configuration or a rank mismatch between the
/// grids and the configured dimensionality; no partial grid is produced.
pub fn compute_gamma(
    reference: &DoseGrid,
    evaluated: &DoseGrid,
    config: &GammaConfig,
) -> Result<GammaGrid, GammaError> {
    compute_gamma_cancellable(reference, evaluated, config, &CancelToken::new())
}

/// [`compute_gamma`] with a caller-held [`CancelToken`]. Returns
/// [`GammaError::Cancelled`] if the token fires before completion.
pub fn compute_gamma_cancellable(
    reference: &DoseGrid,
    evaluated: &DoseGrid,
    config: &GammaConfig,
    cancel: &CancelToken,
) -> Result<GammaGrid, GammaError> {
    config.validate()?;
    config.validate_grids(reference, evaluated)?;

    if !reference.overlaps(evaluated) {
        warn!("reference and evaluated grids do not overlap; every voxel will be search-exhausted");
    }
    if config.max_search_distance < config.dta {
        warn!(
            "maximum search distance {} mm is below the DTA {} mm; gamma values are low-confidence",
            config.max_search_distance, config.dta
        );
    }

    let thresholds = ResolvedThresholds::resolve(reference, config);
    let search = SearchSpace::build(config);
    debug!(
        "search space: {} candidates ({:?}), {} voxels to evaluate",
        search.points().len(),
        search.strategy(),
        reference.len(),
    );

    let run = || evaluate_all(reference, evaluated, config, &thresholds, &search, cancel);
    let voxels = if config.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()?;
        pool.install(run)
    } else {
        run()
    };

    if cancel.is_cancelled() {
        return Err(GammaError::Cancelled);
    }

    Ok(GammaGrid::new(
        voxels,
        reference.size(),
        reference.origin(),
        reference.spacing(),
        search.strategy(),
    ))
}

/// Evaluate every reference voxel, chunked along the outermost
/// non-degenerate axis (z-slices for 3D, rows for 2D).
///
/// Each chunk is a disjoint `&mut` region of the output, the inputs are
/// shared read-only, and no cross-voxel state exists — so no locks, and
/// the result is independent of how rayon schedules the chunks.
fn evaluate_all(
    reference: &DoseGrid,
    evaluated: &DoseGrid,
    config: &GammaConfig,
    thresholds: &ResolvedThresholds,
    search: &SearchSpace,
    cancel: &CancelToken,
) -> Vec<VoxelGamma> {
    let [_, ny, nx] = reference.size();
    let chunk_len = match reference.dims() {
        3 => ny * nx,
        _ => nx,
    };

    let evaluator = GammaEvaluator::new(
        reference,
        evaluated,
        search,
        *thresholds,
        config.max_search_distance,
    );

    let mut voxels = vec![VoxelGamma::Excluded; reference.len()];
    voxels
        .par_chunks_mut(chunk_len)
        .enumerate()
        .for_each(|(chunk_index, chunk)| {
            if cancel.is_cancelled() {
                return;
            }
            let base = chunk_index * chunk_len;
            for (offset, out) in chunk.iter_mut().enumerate() {
                *out = evaluator.evaluate(base + offset);
            }
        });
    voxels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2d(values: Vec<f32>, ny: usize, nx: usize) -> DoseGrid {
        DoseGrid::new(values, [1, ny, nx], [0.0; 3], [1.0; 3]).unwrap()
    }

    fn config_2d() -> GammaConfig {
        GammaConfig {
            dd: 3.0,
            dta: 1.0,
            max_search_distance: 2.0,
            step_size: 0.5,
            dims: 2,
            ..GammaConfig::default()
        }
    }

    #[test]
    fn identical_grids_pass_everywhere() {
        let values: Vec<f32> = (1..=12).map(|v| v as f32).collect();
        let reference = grid_2d(values.clone(), 3, 4);
        let evaluated = grid_2d(values, 3, 4);

        let result = compute_gamma(&reference, &evaluated, &config_2d()).unwrap();
        assert_eq!(result.len(), 12);
        for v in result.voxels() {
            assert_eq!(v.gamma().unwrap(), 0.0);
        }
    }

    #[test]
    fn invalid_config_fails_before_computing() {
        let reference = grid_2d(vec![1.0; 4], 2, 2);
        let evaluated = grid_2d(vec![1.0; 4], 2, 2);
        let mut config = config_2d();
        config.dd = -3.0;
        assert!(matches!(
            compute_gamma(&reference, &evaluated, &config),
            Err(GammaError::Config(ConfigError::NonPositiveDd(_)))
        ));
    }

    #[test]
    fn rank_mismatch_fails_before_computing() {
        let reference = grid_2d(vec![1.0; 4], 2, 2);
        let evaluated = grid_2d(vec![1.0; 4], 2, 2);
        let mut config = config_2d();
        config.dims = 1;
        assert!(matches!(
            compute_gamma(&reference, &evaluated, &config),
            Err(GammaError::Config(ConfigError::DimensionMismatch { .. }))
        ));
    }

    #[test]
    fn pre_cancelled_token_aborts_without_a_grid() {
        let reference = grid_2d(vec![1.0; 4], 2, 2);
        let evaluated = grid_2d(vec![1.0; 4], 2, 2);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            compute_gamma_cancellable(&reference, &evaluated, &config_2d(), &cancel),
            Err(GammaError::Cancelled)
        ));
    }

    #[test]
    fn thread_count_does_not_change_results() {
        let values: Vec<f32> = (0..64).map(|v| (v % 9) as f32).collect();
        let shifted: Vec<f32> = (0..64).map(|v| ((v + 1) % 9) as f32).collect();
        let reference = grid_2d(values, 8, 8);
        let evaluated = grid_2d(shifted, 8, 8);

        let mut config = config_2d();
        config.threads = 1;
        let single = compute_gamma(&reference, &evaluated, &config).unwrap();
        config.threads = 4;
        let multi = compute_gamma(&reference, &evaluated, &config).unwrap();

        assert_eq!(single.voxels(), multi.voxels());
    }
}
