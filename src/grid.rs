use ndarray::Array3;
use thiserror::Error;

/// Bounds are padded by this much (in mm) so that positions sitting exactly on
/// the grid edge are not rejected by floating-point noise.
pub(crate) const BOUNDS_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("grid has an empty axis (size {0:?})")]
    EmptyAxis([usize; 3]),

    #[error("spacing components must be strictly positive (spacing {0:?})")]
    NonPositiveSpacing([f64; 3]),

    #[error("data length {len} does not match size {size:?}")]
    DataLengthMismatch { len: usize, size: [usize; 3] },
}

/// An immutable regular sampled dose distribution.
///
/// Voxel values are stored as `f32` in a `(z, y, x)`-indexed array; geometry
/// (`origin`, `spacing`) is kept in `f64` millimeters, ordered `[z, y, x]`.
/// 2D grids are stored with `size[0] == 1` and 1D grids additionally with
/// `size[1] == 1`.
///
/// Grids are created once by a loader and only ever read afterwards.
#[derive(Debug)]
pub struct DoseGrid {
    data: Array3<f32>,
    origin: [f64; 3],
    spacing: [f64; 3],
}

impl DoseGrid {
    /// Build a grid from a flat row-major (x fastest) value buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if an axis is empty, a spacing component is not
    /// strictly positive, or the buffer length does not match the size.
    pub fn new(
        values: Vec<f32>,
        size: [usize; 3],
        origin: [f64; 3],
        spacing: [f64; 3],
    ) -> Result<Self, GridError> {
        if size.iter().any(|&s| s == 0) {
            return Err(GridError::EmptyAxis(size));
        }
        if spacing.iter().any(|&s| s <= 0.0) {
            return Err(GridError::NonPositiveSpacing(spacing));
        }
        let expected = size[0] * size[1] * size[2];
        if values.len() != expected {
            return Err(GridError::DataLengthMismatch {
                len: values.len(),
                size,
            });
        }
        let data = Array3::from_shape_vec((size[0], size[1], size[2]), values)
            .expect("shape already validated against buffer length");
        Ok(Self {
            data,
            origin,
            spacing,
        })
    }

    /// Size in voxels per axis, ordered `[z, y, x]`.
    pub fn size(&self) -> [usize; 3] {
        let (z, y, x) = self.data.dim();
        [z, y, x]
    }

    /// Physical position of voxel `(0, 0, 0)` in mm, ordered `[z, y, x]`.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Physical voxel pitch in mm, ordered `[z, y, x]`.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Rank of the grid: 3, or lower when leading axes are degenerate.
    ///
    /// `[1, n, m]` is a 2D grid and `[1, 1, n]` a 1D one, following the
    /// frames/rows/columns convention of the DICOM dose cube.
    pub fn dims(&self) -> u8 {
        let [z, y, _] = self.size();
        if z > 1 {
            3
        } else if y > 1 {
            2
        } else {
            1
        }
    }

    /// Flat reference to the underlying values, row-major (x fastest).
    pub fn values(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("owned Array3 is contiguous in standard layout")
    }

    /// Dose at a flat row-major index.
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.values()[index]
    }

    /// Maximum finite dose in the grid, or 0.0 for a grid of only
    /// non-finite values.
    pub fn max_dose(&self) -> f64 {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v as f64))
            .max(0.0)
    }

    /// Physical position of the voxel at a flat index, ordered `[z, y, x]`.
    #[inline]
    pub fn position(&self, index: usize) -> [f64; 3] {
        let [_, ny, nx] = self.size();
        let plane = ny * nx;
        let k = index / plane;
        let j = (index % plane) / nx;
        let i = index % nx;
        [
            self.origin[0] + k as f64 * self.spacing[0],
            self.origin[1] + j as f64 * self.spacing[1],
            self.origin[2] + i as f64 * self.spacing[2],
        ]
    }

    /// Inclusive physical bounds `[min, max]` per axis, ordered `[z, y, x]`.
    pub fn bounds(&self) -> [[f64; 2]; 3] {
        let size = self.size();
        let mut bounds = [[0.0; 2]; 3];
        for axis in 0..3 {
            let min = self.origin[axis];
            let max = min + (size[axis] - 1) as f64 * self.spacing[axis];
            bounds[axis] = [min, max];
        }
        bounds
    }

    /// Whether the bounding boxes of `self` and `other` intersect.
    pub fn overlaps(&self, other: &DoseGrid) -> bool {
        let a = self.bounds();
        let b = other.bounds();
        (0..3).all(|axis| {
            a[axis][0] <= b[axis][1] + BOUNDS_TOLERANCE
                && b[axis][0] <= a[axis][1] + BOUNDS_TOLERANCE
        })
    }

    /// Sample the grid at a physical position with linear interpolation.
    ///
    /// Interpolation collapses to bilinear/linear on degenerate axes; at the
    /// upper edge, where a full interpolation cell is unavailable, the
    /// neighbor index is clamped so the sample degrades to nearest-neighbor
    /// along that axis. Returns `None` outside the (tolerance-padded)
    /// physical bounds.
    pub fn sample(&self, position: [f64; 3]) -> Option<f64> {
        let bounds = self.bounds();
        for axis in 0..3 {
            if position[axis] < bounds[axis][0] - BOUNDS_TOLERANCE
                || position[axis] > bounds[axis][1] + BOUNDS_TOLERANCE
            {
                return None;
            }
        }

        let size = self.size();
        let mut idx0 = [0usize; 3];
        let mut idx1 = [0usize; 3];
        let mut frac = [0f64; 3];
        for axis in 0..3 {
            let t = ((position[axis] - self.origin[axis]) / self.spacing[axis]).max(0.0);
            let i0 = (t as usize).min(size[axis] - 1);
            let i1 = (i0 + 1).min(size[axis] - 1);
            idx0[axis] = i0;
            idx1[axis] = i1;
            frac[axis] = (t - i0 as f64).clamp(0.0, 1.0);
        }

        let at = |k: usize, j: usize, i: usize| self.data[[k, j, i]] as f64;

        let [zd, yd, xd] = frac;
        let c000 = at(idx0[0], idx0[1], idx0[2]);
        let c001 = at(idx0[0], idx0[1], idx1[2]);
        let c010 = at(idx0[0], idx1[1], idx0[2]);
        let c011 = at(idx0[0], idx1[1], idx1[2]);
        let c100 = at(idx1[0], idx0[1], idx0[2]);
        let c101 = at(idx1[0], idx0[1], idx1[2]);
        let c110 = at(idx1[0], idx1[1], idx0[2]);
        let c111 = at(idx1[0], idx1[1], idx1[2]);

        let c00 = c000 * (1.0 - xd) + c001 * xd;
        let c01 = c010 * (1.0 - xd) + c011 * xd;
        let c10 = c100 * (1.0 - xd) + c101 * xd;
        let c11 = c110 * (1.0 - xd) + c111 * xd;

        let c0 = c00 * (1.0 - yd) + c01 * yd;
        let c1 = c10 * (1.0 - yd) + c11 * yd;

        Some(c0 * (1.0 - zd) + c1 * zd)
    }
}
