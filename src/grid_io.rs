use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::PixelDecoder;
use dicom_dictionary_std::tags;
use thiserror::Error;

use crate::grid::{DoseGrid, GridError};
use crate::result::GammaGrid;

#[derive(Debug, Error)]
pub enum GridIoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported element width flag {0} (expected 32 or 64)")]
    BadElementWidth(u32),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("file is not an RT Dose object")]
    NotRtDose,

    #[error("missing or unreadable DICOM attribute: {0}")]
    MissingDicomAttribute(&'static str),

    #[error("grid frame offsets are not uniformly spaced")]
    NonUniformFrameOffsets,
}

/// Load a dose grid, choosing the format by file extension: `.dcm` is
/// read as DICOM RT Dose, anything else as the raw binary format.
pub fn load_dose_grid(path: impl AsRef<Path>) -> Result<DoseGrid, GridIoError> {
    let path = path.as_ref();
    let is_dicom = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"));
    if is_dicom {
        load_rtdose(path)
    } else {
        load_raw(path)
    }
}

/// Read a grid from the raw little-endian format:
/// a `u32` element-width flag (32 or 64 bits per value), three `u32` sizes
/// (z, y, x), three `f64` origin components, three `f64` spacing components,
/// then the voxel values row-major (x fastest).
pub fn load_raw(path: impl AsRef<Path>) -> Result<DoseGrid, GridIoError> {
    let mut reader = BufReader::new(File::open(path)?);

    let width = reader.read_u32::<LittleEndian>()?;
    let mut size = [0usize; 3];
    for s in &mut size {
        *s = reader.read_u32::<LittleEndian>()? as usize;
    }
    let mut origin = [0f64; 3];
    reader.read_f64_into::<LittleEndian>(&mut origin)?;
    let mut spacing = [0f64; 3];
    reader.read_f64_into::<LittleEndian>(&mut spacing)?;

    let count = size[0] * size[1] * size[2];
    let values = match width {
        32 => {
            let mut values = vec![0f32; count];
            reader.read_f32_into::<LittleEndian>(&mut values)?;
            values
        }
        64 => {
            let mut wide = vec![0f64; count];
            reader.read_f64_into::<LittleEndian>(&mut wide)?;
            wide.into_iter().map(|v| v as f32).collect()
        }
        other => return Err(GridIoError::BadElementWidth(other)),
    };

    Ok(DoseGrid::new(values, size, origin, spacing)?)
}

/// Persist a gamma grid in the raw 32-bit format, with excluded voxels
/// flattened to the negative sentinel so downstream tools can render them
/// as not-a-number.
pub fn write_gamma_grid(grid: &GammaGrid, path: impl AsRef<Path>) -> Result<(), GridIoError> {
    write_raw(
        &grid.to_values(),
        grid.size(),
        grid.origin(),
        grid.spacing(),
        path,
    )
}

fn write_raw(
    values: &[f32],
    size: [usize; 3],
    origin: [f64; 3],
    spacing: [f64; 3],
    path: impl AsRef<Path>,
) -> Result<(), GridIoError> {
    let mut writer = BufWriter::new(File::create(path)?);

    writer.write_u32::<LittleEndian>(32)?;
    for s in size {
        writer.write_u32::<LittleEndian>(s as u32)?;
    }
    for o in origin {
        writer.write_f64::<LittleEndian>(o)?;
    }
    for s in spacing {
        writer.write_f64::<LittleEndian>(s)?;
    }

    if cfg!(target_endian = "little") {
        // bulk path: f32 slices reinterpret directly as the on-disk bytes
        writer.write_all(bytemuck::cast_slice(values))?;
    } else {
        for &v in values {
            writer.write_f32::<LittleEndian>(v)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Load a DICOM RT Dose object: pixel array scaled by Dose Grid Scaling,
/// geometry from Image Position (Patient), Pixel Spacing and the Grid
/// Frame Offset Vector.
pub fn load_rtdose(path: impl AsRef<Path>) -> Result<DoseGrid, GridIoError> {
    let obj = open_file(path.as_ref())?;

    let modality = element_str(&obj, tags::MODALITY).ok_or(GridIoError::NotRtDose)?;
    if modality.trim() != "RTDOSE" {
        return Err(GridIoError::NotRtDose);
    }

    let rows = element_int(&obj, tags::ROWS)
        .ok_or(GridIoError::MissingDicomAttribute("Rows"))? as usize;
    let columns = element_int(&obj, tags::COLUMNS)
        .ok_or(GridIoError::MissingDicomAttribute("Columns"))? as usize;
    let frames = element_int(&obj, tags::NUMBER_OF_FRAMES).unwrap_or(1) as usize;

    let scaling = element_floats(&obj, tags::DOSE_GRID_SCALING)
        .and_then(|v| v.first().copied())
        .ok_or(GridIoError::MissingDicomAttribute("DoseGridScaling"))?;

    // Image Position (Patient) is (x, y, z); grid geometry is (z, y, x)
    let position = element_floats(&obj, tags::IMAGE_POSITION_PATIENT)
        .filter(|v| v.len() >= 3)
        .ok_or(GridIoError::MissingDicomAttribute("ImagePositionPatient"))?;
    let pixel_spacing = element_floats(&obj, tags::PIXEL_SPACING)
        .filter(|v| v.len() >= 2)
        .ok_or(GridIoError::MissingDicomAttribute("PixelSpacing"))?;

    let frame_spacing = if frames > 1 {
        let offsets = element_floats(&obj, tags::GRID_FRAME_OFFSET_VECTOR)
            .filter(|v| v.len() >= frames)
            .ok_or(GridIoError::MissingDicomAttribute("GridFrameOffsetVector"))?;
        uniform_offset_spacing(&offsets)?
    } else {
        1.0
    };

    let decoded = obj
        .decode_pixel_data()
        .ok()
        .and_then(|d| d.to_ndarray::<f32>().ok())
        .ok_or(GridIoError::MissingDicomAttribute("PixelData"))?;
    let values: Vec<f32> = decoded.iter().map(|&v| v * scaling as f32).collect();

    Ok(DoseGrid::new(
        values,
        [frames, rows, columns],
        [position[2], position[1], position[0]],
        [frame_spacing, pixel_spacing[0], pixel_spacing[1]],
    )?)
}

fn element_str(obj: &FileDicomObject<InMemDicomObject>, tag: dicom::core::Tag) -> Option<String> {
    obj.element(tag).ok()?.to_str().ok().map(|s| s.to_string())
}

fn element_int(obj: &FileDicomObject<InMemDicomObject>, tag: dicom::core::Tag) -> Option<i64> {
    obj.element(tag).ok()?.to_int::<i64>().ok()
}

fn element_floats(
    obj: &FileDicomObject<InMemDicomObject>,
    tag: dicom::core::Tag,
) -> Option<Vec<f64>> {
    obj.element(tag).ok()?.to_multi_float64().ok()
}

fn uniform_offset_spacing(offsets: &[f64]) -> Result<f64, GridIoError> {
    let first = offsets[1] - offsets[0];
    let uniform = offsets
        .windows(2)
        .all(|w| ((w[1] - w[0]) - first).abs() < 1e-3);
    if !uniform || first <= 0.0 {
        return Err(GridIoError::NonUniformFrameOffsets);
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::SearchStrategy;
    use crate::result::{EXCLUDED_SENTINEL, VoxelGamma};

    fn temp_path(name: &str) -> std::path::PathBuf {
        tempfile::tempdir().unwrap().keep().join(name)
    }

    #[test]
    fn raw_format_round_trips() {
        let path = temp_path("grid.bin");
        write_raw(
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            [1, 2, 3],
            [0.0, -1.5, 2.0],
            [1.0, 2.0, 2.5],
            &path,
        )
        .unwrap();

        let grid = load_raw(&path).unwrap();
        assert_eq!(grid.size(), [1, 2, 3]);
        assert_eq!(grid.origin(), [0.0, -1.5, 2.0]);
        assert_eq!(grid.spacing(), [1.0, 2.0, 2.5]);
        assert_eq!(grid.values(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn reader_accepts_64_bit_values() {
        let path = temp_path("grid64.bin");
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        writer.write_u32::<LittleEndian>(64).unwrap();
        for s in [1u32, 1, 2] {
            writer.write_u32::<LittleEndian>(s).unwrap();
        }
        for _ in 0..3 {
            writer.write_f64::<LittleEndian>(0.0).unwrap();
        }
        for _ in 0..3 {
            writer.write_f64::<LittleEndian>(1.0).unwrap();
        }
        for v in [0.25f64, 0.75] {
            writer.write_f64::<LittleEndian>(v).unwrap();
        }
        writer.flush().unwrap();
        drop(writer);

        let grid = load_raw(&path).unwrap();
        assert_eq!(grid.values(), &[0.25, 0.75]);
    }

    #[test]
    fn rejects_unknown_element_width() {
        let path = temp_path("bad.bin");
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        writer.write_u32::<LittleEndian>(16).unwrap();
        for _ in 0..3 {
            writer.write_u32::<LittleEndian>(1).unwrap();
        }
        for _ in 0..6 {
            writer.write_f64::<LittleEndian>(1.0).unwrap();
        }
        writer.write_f32::<LittleEndian>(0.0).unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert!(matches!(
            load_raw(&path),
            Err(GridIoError::BadElementWidth(16))
        ));
    }

    #[test]
    fn gamma_grid_serializes_excluded_voxels_as_sentinel() {
        let grid = GammaGrid::new(
            vec![
                VoxelGamma::Computed {
                    gamma: 0.5,
                    exhausted: false,
                },
                VoxelGamma::Excluded,
            ],
            [1, 1, 2],
            [0.0; 3],
            [1.0; 3],
            SearchStrategy::FullLattice,
        );
        let path = temp_path("gamma.bin");
        write_gamma_grid(&grid, &path).unwrap();

        let back = load_raw(&path).unwrap();
        assert_eq!(back.values(), &[0.5, EXCLUDED_SENTINEL]);
    }

    #[test]
    fn non_uniform_frame_offsets_are_rejected() {
        assert!(uniform_offset_spacing(&[0.0, 2.0, 4.0]).is_ok());
        assert!(matches!(
            uniform_offset_spacing(&[0.0, 2.0, 5.0]),
            Err(GridIoError::NonUniformFrameOffsets)
        ));
    }
}
