//! Row-addressable feature matrix storage
//!
//! The aggregated matrix can be far larger than memory, so producers write
//! disjoint row ranges and consumers read borrowed row ranges back. The
//! on-disk form is raw row-major `f32` with a JSON sidecar describing it.

use crate::error::{Error, Result};
use memmap2::MmapMut;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// numpy-style dtype string recorded in the sidecar.
pub const DTYPE: &str = "<f4";

/// A `rows × cols` matrix of `f32`, accessed by row ranges.
pub trait FeatureStore {
    fn rows(&self) -> usize;

    fn cols(&self) -> usize;

    /// Writes whole rows starting at `start_row`; `values.len()` must be a multiple of `cols`.
    fn write_rows(&mut self, start_row: usize, values: &[f32]) -> Result<()>;

    /// Borrows `count` rows starting at `start_row`.
    fn read_rows(&self, start_row: usize, count: usize) -> Result<&[f32]>;

    /// Makes every completed write durable/visible to later readers.
    fn flush(&mut self) -> Result<()>;
}

/// Range check shared by the implementations; returns the element range.
fn row_span(
    rows: usize,
    cols: usize,
    start_row: usize,
    count: usize,
) -> Result<std::ops::Range<usize>> {
    let end = start_row.checked_add(count).filter(|&end| end <= rows);
    match end {
        Some(end) => Ok(start_row * cols..end * cols),
        None => Err(Error::RowRange {
            start: start_row,
            end: start_row.saturating_add(count),
            rows,
        }),
    }
}

fn rows_in(values: &[f32], cols: usize) -> Result<usize> {
    if cols == 0 || values.len() % cols != 0 {
        return Err(Error::ShapeMismatch {
            context: "matrix row write",
            expected: vec![cols],
            actual: vec![values.len()],
        });
    }
    Ok(values.len() / cols)
}

/// Resident matrix for tests and small inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl InMemoryMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0f32; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                context: "in-memory matrix",
                expected: vec![rows, cols],
                actual: vec![data.len()],
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

impl FeatureStore for InMemoryMatrix {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn write_rows(&mut self, start_row: usize, values: &[f32]) -> Result<()> {
        let count = rows_in(values, self.cols)?;
        let span = row_span(self.rows, self.cols, start_row, count)?;
        self.data[span].copy_from_slice(values);
        Ok(())
    }

    fn read_rows(&self, start_row: usize, count: usize) -> Result<&[f32]> {
        let span = row_span(self.rows, self.cols, start_row, count)?;
        Ok(&self.data[span])
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Contents of `<matrix>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixHeader {
    pub rows: usize,
    pub cols: usize,
    pub dtype: String,
}

/// Path of the JSON sidecar for a matrix file.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Memory-mapped read/write matrix file.
pub struct MmapMatrix {
    path: PathBuf,
    rows: usize,
    cols: usize,
    mmap: MmapMut,
}

impl MmapMatrix {
    /// Creates (or truncates) `path` sized for `rows × cols` values and maps it.
    ///
    /// Any failure is reported with the requested shape and byte size.
    pub fn create(path: impl AsRef<Path>, rows: usize, cols: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = (rows as u64)
            .checked_mul(cols as u64)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>() as u64));
        let alloc_err = |bytes: u64, source: io::Error| Error::MatrixAllocation {
            path: path.clone(),
            rows,
            cols,
            bytes,
            source,
        };

        let bytes = match bytes {
            Some(bytes) if bytes > 0 => bytes,
            Some(_) => {
                return Err(alloc_err(
                    0,
                    io::Error::new(io::ErrorKind::InvalidInput, "matrix has no elements"),
                ))
            }
            None => {
                return Err(alloc_err(
                    u64::MAX,
                    io::Error::new(io::ErrorKind::InvalidInput, "matrix size overflows"),
                ))
            }
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| alloc_err(bytes, e))?;
        file.set_len(bytes).map_err(|e| alloc_err(bytes, e))?;
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| alloc_err(bytes, e))? };

        let header = MatrixHeader {
            rows,
            cols,
            dtype: DTYPE.to_string(),
        };
        let sidecar = serde_json::to_vec_pretty(&header)?;
        fs::write(sidecar_path(&path), sidecar).map_err(|e| alloc_err(bytes, e))?;

        log::info!(
            "Allocated feature matrix {} ({} x {}, {} bytes)",
            path.display(),
            rows,
            cols,
            bytes
        );

        Ok(Self {
            path,
            rows,
            cols,
            mmap,
        })
    }

    /// Maps an existing matrix described by its sidecar.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source: io::Error| Error::MatrixIo {
            path: path.clone(),
            source,
        };

        let sidecar = fs::read(sidecar_path(&path)).map_err(io_err)?;
        let header: MatrixHeader = serde_json::from_slice(&sidecar)?;
        if header.dtype != DTYPE {
            return Err(io_err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported dtype {}", header.dtype),
            )));
        }

        let file: File = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err)?;
        let expected = header
            .rows
            .checked_mul(header.cols)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| {
                io_err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} x {} matrix overflows the address space", header.rows, header.cols),
                ))
            })? as u64;
        let actual = file.metadata().map_err(io_err)?.len();
        if actual != expected || expected == 0 {
            return Err(Error::ShapeMismatch {
                context: "feature matrix file",
                expected: vec![expected as usize],
                actual: vec![actual as usize],
            });
        }
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(io_err)? };

        Ok(Self {
            path,
            rows: header.rows,
            cols: header.cols,
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn values(&self) -> &[f32] {
        bytemuck::cast_slice(&self.mmap[..])
    }

    fn values_mut(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.mmap[..])
    }
}

impl FeatureStore for MmapMatrix {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn write_rows(&mut self, start_row: usize, values: &[f32]) -> Result<()> {
        let count = rows_in(values, self.cols)?;
        let span = row_span(self.rows, self.cols, start_row, count)?;
        self.values_mut()[span].copy_from_slice(values);
        Ok(())
    }

    fn read_rows(&self, start_row: usize, count: usize) -> Result<&[f32]> {
        let span = row_span(self.rows, self.cols, start_row, count)?;
        Ok(&self.values()[span])
    }

    fn flush(&mut self) -> Result<()> {
        self.mmap.flush().map_err(|source| Error::MatrixIo {
            path: self.path.clone(),
            source,
        })
    }
}
