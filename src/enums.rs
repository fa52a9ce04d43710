use clap::ValueEnum;
use serde::Serialize;

/// How the dose-difference criterion is turned into an absolute dose value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// One run-wide normalization dose (configured value or max reference dose).
    #[default]
    Global,
    /// Normalization dose is the reference dose at the current voxel.
    Local,
}

/// Candidate enumeration strategy used by [`SearchSpace`](crate::search::SearchSpace).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Every lattice point within the search radius, visited in ascending distance order.
    #[default]
    #[value(name = "lattice")]
    FullLattice,
    /// Walk outward along the principal axes only. Faster, coarser.
    #[value(name = "ray")]
    RayWalk,
}
