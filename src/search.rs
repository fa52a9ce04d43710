use crate::config::GammaConfig;
use crate::enums::SearchStrategy;

/// Tolerance applied to the search radius so lattice points sitting exactly
/// on the boundary sphere are kept.
const RADIUS_TOLERANCE: f64 = 1e-6;

/// One candidate offset around a reference voxel, in physical mm.
#[derive(Clone, Copy, Debug)]
pub struct SearchPoint {
    pub dz: f64,
    pub dy: f64,
    pub dx: f64,
    pub dist_sq: f64,
}

impl SearchPoint {
    fn new(dz: f64, dy: f64, dx: f64) -> Self {
        Self {
            dz,
            dy,
            dx,
            dist_sq: dz * dz + dy * dy + dx * dx,
        }
    }
}

/// Precomputed candidate offsets, sorted by non-decreasing distance.
///
/// The ordering is what makes the evaluator's early termination sound: once
/// the distance term alone reaches the running minimum, every later
/// candidate is worse. Built once per run from the configuration alone and
/// shared read-only across workers.
pub struct SearchSpace {
    points: Vec<SearchPoint>,
    strategy: SearchStrategy,
}

impl SearchSpace {
    pub fn build(config: &GammaConfig) -> Self {
        let radius = config.max_search_distance;
        let step = config.step_size;
        let mut points = match config.search_strategy {
            SearchStrategy::FullLattice => Self::lattice(radius, step, config.dims),
            SearchStrategy::RayWalk => Self::ray_walk(radius, step, config.dims),
        };
        // stable sort keeps the generation order among equidistant points,
        // so the sequence is fully deterministic
        points.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq));
        Self {
            points,
            strategy: config.search_strategy,
        }
    }

    /// Candidates in ascending distance order. The first point is always the
    /// zero offset.
    pub fn points(&self) -> &[SearchPoint] {
        &self.points
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// All lattice points of pitch `step` within `radius` (boundary
    /// inclusive). Degenerate axes contribute only the zero offset.
    fn lattice(radius: f64, step: f64, dims: u8) -> Vec<SearchPoint> {
        let n = ((radius + RADIUS_TOLERANCE) / step) as i64;
        let radius_sq = radius * radius + RADIUS_TOLERANCE;
        let axis_range = |active: bool| if active { -n..=n } else { 0..=0 };

        let mut points = Vec::new();
        for kz in axis_range(dims >= 3) {
            let dz = kz as f64 * step;
            for ky in axis_range(dims >= 2) {
                let dy = ky as f64 * step;
                for kx in -n..=n {
                    let dx = kx as f64 * step;
                    let point = SearchPoint::new(dz, dy, dx);
                    if point.dist_sq <= radius_sq {
                        points.push(point);
                    }
                }
            }
        }
        points
    }

    /// Zero offset plus rays outward along each principal axis at radii
    /// `step, 2·step, …` — a coarse approximation of the lattice that skips
    /// all off-axis candidates.
    fn ray_walk(radius: f64, step: f64, dims: u8) -> Vec<SearchPoint> {
        let n = ((radius + RADIUS_TOLERANCE) / step) as i64;

        let mut points = vec![SearchPoint::new(0.0, 0.0, 0.0)];
        for k in 1..=n {
            let d = k as f64 * step;
            points.push(SearchPoint::new(0.0, 0.0, -d));
            points.push(SearchPoint::new(0.0, 0.0, d));
            if dims >= 2 {
                points.push(SearchPoint::new(0.0, -d, 0.0));
                points.push(SearchPoint::new(0.0, d, 0.0));
            }
            if dims >= 3 {
                points.push(SearchPoint::new(-d, 0.0, 0.0));
                points.push(SearchPoint::new(d, 0.0, 0.0));
            }
        }
        points
    }
}
