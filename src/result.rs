use crate::enums::SearchStrategy;

/// Value written to disk for voxels excluded by the dose cutoff (or by a
/// degenerate local normalization). Real gamma values are never negative,
/// so the sentinel cannot collide with one.
pub const EXCLUDED_SENTINEL: f32 = -1.0;

/// Outcome of evaluating one reference voxel.
///
/// The trichotomy excluded / search-exhausted / normal is kept explicit
/// here and only flattened to a numeric sentinel at the serialization
/// boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoxelGamma {
    /// Below the dose cutoff, or no finite dose-difference threshold could
    /// be derived. Skipped by the statistics.
    Excluded,
    /// A computed gamma value. `exhausted` marks voxels where no in-bounds
    /// evaluated sample existed within the search radius; their `gamma` is
    /// the lower bound implied by the radius, large but finite.
    Computed { gamma: f64, exhausted: bool },
}

impl VoxelGamma {
    #[inline]
    pub fn is_excluded(&self) -> bool {
        matches!(self, VoxelGamma::Excluded)
    }

    /// The gamma value, unless excluded.
    #[inline]
    pub fn gamma(&self) -> Option<f64> {
        match self {
            VoxelGamma::Excluded => None,
            VoxelGamma::Computed { gamma, .. } => Some(*gamma),
        }
    }
}

/// Per-voxel gamma results on the reference grid's geometry.
///
/// Produced exclusively by [`compute_gamma`](crate::engine::compute_gamma);
/// ownership passes to the caller on completion.
pub struct GammaGrid {
    voxels: Vec<VoxelGamma>,
    size: [usize; 3],
    origin: [f64; 3],
    spacing: [f64; 3],
    strategy: SearchStrategy,
}

impl GammaGrid {
    pub(crate) fn new(
        voxels: Vec<VoxelGamma>,
        size: [usize; 3],
        origin: [f64; 3],
        spacing: [f64; 3],
        strategy: SearchStrategy,
    ) -> Self {
        debug_assert_eq!(voxels.len(), size[0] * size[1] * size[2]);
        Self {
            voxels,
            size,
            origin,
            spacing,
            strategy,
        }
    }

    pub fn voxels(&self) -> &[VoxelGamma] {
        &self.voxels
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Same geometry accessors as the input grids, ordered `[z, y, x]`.
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Which candidate enumeration produced this grid.
    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Flatten to numeric values for serialization: gamma as `f32`,
    /// excluded voxels as [`EXCLUDED_SENTINEL`].
    pub fn to_values(&self) -> Vec<f32> {
        self.voxels
            .iter()
            .map(|v| match v {
                VoxelGamma::Excluded => EXCLUDED_SENTINEL,
                VoxelGamma::Computed { gamma, .. } => *gamma as f32,
            })
            .collect()
    }
}
