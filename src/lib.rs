//! # dose-gamma
//!
//! A gamma-index computation engine for radiotherapy dose verification.
//!
//! The gamma index compares a reference dose distribution against an
//! evaluated (measured or recomputed) one on regular 1D/2D/3D grids. For
//! every reference voxel the engine searches the neighborhood of the
//! evaluated grid for the point minimizing the combined
//! dose-difference/spatial-distance metric; voxels with γ ≤ 1 pass.
//!
//! The search visits candidate offsets in ascending distance order so it
//! can stop as soon as the distance term alone exceeds the running
//! minimum, and reference voxels are distributed across worker threads in
//! disjoint slice chunks using rayon. Dose grids can be loaded from DICOM
//! RT Dose files or a simple raw binary format.
//!
//! Acceptance criteria, normalization (global or local), dose cutoff,
//! search radius and lattice step are all configurable through
//! [`GammaConfig`]; the defaults are the customary 3%/3mm.
//!
//! # Examples
//!
//! Compare two dose grids and summarize the result:
//!
//! ```no_run
//! # use dose_gamma::{compute_gamma, compute_stats, GammaConfig};
//! # use dose_gamma::grid_io::load_dose_grid;
//! let reference = load_dose_grid("reference.dcm").expect("should have loaded reference dose");
//! let evaluated = load_dose_grid("evaluated.dcm").expect("should have loaded evaluated dose");
//!
//! let gamma = compute_gamma(&reference, &evaluated, &GammaConfig::default())
//!     .expect("grids and configuration should be consistent");
//! let stats = compute_stats(&gamma);
//! if let Some(pass_rate) = stats.pass_rate {
//!     println!("pass rate: {:.2}%", pass_rate * 100.0);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod enums;
pub mod evaluator;
pub mod grid;
pub mod grid_io;
pub mod report;
pub mod result;
pub mod search;
pub mod stats;

pub use config::{ConfigError, GammaConfig};
pub use engine::{CancelToken, GammaError, compute_gamma, compute_gamma_cancellable};
pub use enums::{Normalization, SearchStrategy};
pub use grid::{DoseGrid, GridError};
pub use result::{GammaGrid, VoxelGamma};
pub use stats::{GammaStats, compute_stats};
