//! File-backed ragged array for fixed-width values.
//!
//! Layout: a 40-byte little-endian header followed by the values in
//! row-major ragged order.
//!
//! ```text
//! magic "AETHGRID" | version u32 | dimension u32 | cell width u32 |
//! reserved u32 | side u64 | cell count u64 | values...
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::arithmetic::FixedWidthValue;
use crate::error::{LatticeError, Result};
use crate::storage::{to_usize, RaggedShape};
use crate::FORMAT_VERSION;

pub const MAGIC: [u8; 8] = *b"AETHGRID";
pub const HEADER_LEN: u64 = 40;

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridFileHeader {
    pub version: u32,
    pub dimension: u32,
    pub cell_width: u32,
    pub side: u64,
    pub cell_count: u64,
}

impl GridFileHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut out = [0u8; HEADER_LEN as usize];
        out[0..8].copy_from_slice(&MAGIC);
        out[8..12].copy_from_slice(&self.version.to_le_bytes());
        out[12..16].copy_from_slice(&self.dimension.to_le_bytes());
        out[16..20].copy_from_slice(&self.cell_width.to_le_bytes());
        // 20..24 reserved
        out[24..32].copy_from_slice(&self.side.to_le_bytes());
        out[32..40].copy_from_slice(&self.cell_count.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN as usize {
            return Err(format!("header truncated: {} bytes", bytes.len()));
        }
        if bytes[0..8] != MAGIC {
            return Err("bad magic".to_string());
        }
        let u32_at = |at: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(raw)
        };
        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(raw)
        };
        Ok(GridFileHeader {
            version: u32_at(8),
            dimension: u32_at(12),
            cell_width: u32_at(16),
            side: u64_at(24),
            cell_count: u64_at(32),
        })
    }
}

/// A canonical orthant stored in one private file.
///
/// Reads and writes are positioned; the handle is shared behind a mutex
/// so `&self` reads stay sound when the grid is shared across threads.
#[derive(Debug)]
pub struct FileBackedArray<V> {
    path: PathBuf,
    file: Mutex<File>,
    shape: RaggedShape,
    side: u64,
    _values: PhantomData<V>,
}

impl<V: FixedWidthValue> FileBackedArray<V> {
    /// Create a zero-filled grid. Fails if `path` already exists.
    pub fn create(path: impl Into<PathBuf>, dimension: usize, side: u64) -> Result<Self> {
        let path = path.into();
        let shape = RaggedShape::new(dimension, side)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| LatticeError::storage(&path, "create grid file", e))?;
        let grid = FileBackedArray {
            path,
            file: Mutex::new(file),
            shape,
            side,
            _values: PhantomData,
        };
        grid.write_header()?;
        grid.set_file_len(side)?;
        Ok(grid)
    }

    /// Open an existing grid file, validating its header.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| LatticeError::storage(&path, "open grid file", e))?;
        let mut raw = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut raw)
            .map_err(|e| LatticeError::storage(&path, "read header", e))?;
        let header = GridFileHeader::decode(&raw).map_err(|reason| corrupt(&path, reason))?;
        if header.version != FORMAT_VERSION {
            return Err(corrupt(&path, format!("unsupported format version {}", header.version)));
        }
        if header.cell_width as usize != V::WIDTH {
            return Err(corrupt(
                &path,
                format!(
                    "cell width {} but value type {} has {}",
                    header.cell_width,
                    V::TYPE_NAME,
                    V::WIDTH
                ),
            ));
        }
        let shape = RaggedShape::new(header.dimension as usize, header.side)?;
        if shape.cell_count(header.side) != header.cell_count {
            return Err(corrupt(&path, "cell count does not match side".to_string()));
        }
        let len = file
            .metadata()
            .map_err(|e| LatticeError::storage(&path, "stat grid file", e))?
            .len();
        if len != HEADER_LEN + header.cell_count * V::WIDTH as u64 {
            return Err(corrupt(&path, format!("file length {} does not match header", len)));
        }
        Ok(FileBackedArray {
            path,
            file: Mutex::new(file),
            shape,
            side: header.side,
            _values: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimension(&self) -> usize {
        self.shape.dimension()
    }

    pub fn side(&self) -> u64 {
        self.side
    }

    pub fn shape(&self) -> &RaggedShape {
        &self.shape
    }

    pub fn cell_count(&self) -> u64 {
        self.shape.cell_count(self.side)
    }

    pub fn header(&self) -> GridFileHeader {
        GridFileHeader {
            version: FORMAT_VERSION,
            dimension: self.dimension() as u32,
            cell_width: V::WIDTH as u32,
            side: self.side,
            cell_count: self.cell_count(),
        }
    }

    /// Byte offset and length of `layer` in the file.
    pub fn layer_span(&self, layer: u64) -> (u64, usize) {
        let start = HEADER_LEN + self.shape.layer_start(layer) * V::WIDTH as u64;
        let len = self.shape.layer_len(layer) as usize * V::WIDTH;
        (start, len)
    }

    /// A second handle on the same file, for a writer thread.
    pub fn clone_handle(&self) -> Result<File> {
        self.lock()
            .try_clone()
            .map_err(|e| LatticeError::storage(&self.path, "clone grid file handle", e))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        let mut file = self.lock();
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(buf))
            .map_err(|e| {
                LatticeError::storage(&self.path, format!("read {} bytes at {}", len, offset), e)
            })
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let len = buf.len();
        let mut file = self.lock();
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(buf))
            .map_err(|e| {
                LatticeError::storage(&self.path, format!("write {} bytes at {}", len, offset), e)
            })
    }

    fn write_header(&self) -> Result<()> {
        self.write_at(0, &self.header().encode())
    }

    fn set_file_len(&self, side: u64) -> Result<()> {
        let len = HEADER_LEN + self.shape.cell_count(side) * V::WIDTH as u64;
        self.lock()
            .set_len(len)
            .map_err(|e| LatticeError::storage(&self.path, "resize grid file", e))
    }

    /// Value of a canonical cell; cells past the last layer read as zero.
    pub fn read_cell(&self, cell: &[i64]) -> Result<V> {
        if cell[0] < 0 || cell[0] as u64 >= self.side {
            return Ok(V::zero());
        }
        let mut buf = vec![0u8; V::WIDTH];
        self.read_at(HEADER_LEN + self.shape.offset(cell) * V::WIDTH as u64, &mut buf)?;
        Ok(V::read_le(&buf))
    }

    pub fn write_cell(&self, cell: &[i64], value: &V) -> Result<()> {
        if cell[0] < 0 || cell[0] as u64 >= self.side {
            return Err(LatticeError::out_of_bounds(cell));
        }
        let mut buf = vec![0u8; V::WIDTH];
        value.write_le(&mut buf);
        self.write_at(HEADER_LEN + self.shape.offset(cell) * V::WIDTH as u64, &buf)
    }

    pub fn read_layer(&self, layer: u64) -> Result<Vec<V>> {
        if layer >= self.side {
            return Ok(vec![V::zero(); to_usize(self.shape.layer_len(layer))?]);
        }
        let (offset, len) = self.layer_span(layer);
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf.chunks_exact(V::WIDTH).map(V::read_le).collect())
    }

    pub fn write_layer(&self, layer: u64, values: &[V]) -> Result<()> {
        let (offset, len) = self.layer_span(layer);
        if layer >= self.side || values.len() * V::WIDTH != len {
            return Err(LatticeError::InvalidArgument(format!(
                "layer {} with {} values does not fit side {}",
                layer,
                values.len(),
                self.side
            )));
        }
        self.write_at(offset, &encode_values(values))
    }

    /// Grow or shrink to `side` layers. New layers are zero.
    pub fn resize(&mut self, side: u64) -> Result<()> {
        self.shape.reserve(side)?;
        self.set_file_len(side)?;
        self.side = side;
        self.write_header()
    }

    pub fn sync(&self) -> Result<()> {
        self.lock()
            .sync_all()
            .map_err(|e| LatticeError::storage(&self.path, "sync grid file", e))
    }

    /// Visit every cell in row-major order, one layer in memory at a time.
    pub fn for_each_cell<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[i64], &V) -> Result<()>,
    {
        let mut cell = vec![0i64; self.dimension()];
        for layer in 0..self.side {
            for value in self.read_layer(layer)? {
                visit(&cell, &value)?;
                RaggedShape::advance(&mut cell);
            }
        }
        Ok(())
    }

    /// Delete the backing file.
    pub fn remove(self) -> Result<()> {
        let FileBackedArray { path, file, .. } = self;
        drop(file);
        fs::remove_file(&path).map_err(|e| LatticeError::storage(&path, "remove grid file", e))
    }
}

pub fn encode_values<V: FixedWidthValue>(values: &[V]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * V::WIDTH];
    for (chunk, value) in out.chunks_exact_mut(V::WIDTH).zip(values) {
        value.write_le(chunk);
    }
    out
}

fn corrupt(path: &Path, reason: String) -> LatticeError {
    LatticeError::storage(
        path,
        "validate grid file",
        std::io::Error::new(std::io::ErrorKind::InvalidData, reason),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("aether_file_grid_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir.join("grid.data")
    }

    #[test]
    fn test_create_is_zero_filled() {
        let grid = FileBackedArray::<i64>::create(temp_path("zero"), 3, 4).unwrap();
        assert_eq!(grid.cell_count(), 20);
        assert!(grid.read_layer(3).unwrap().iter().all(|v| *v == 0));
        grid.remove().unwrap();
    }

    #[test]
    fn test_layer_roundtrip_and_reopen() {
        let path = temp_path("reopen");
        let mut grid = FileBackedArray::<i32>::create(&path, 2, 3).unwrap();
        grid.write_layer(2, &[5, -6, 7]).unwrap();
        grid.write_cell(&[1, 1], &-9).unwrap();
        grid.resize(5).unwrap();
        drop(grid);

        let grid = FileBackedArray::<i32>::open(&path).unwrap();
        assert_eq!(grid.side(), 5);
        assert_eq!(grid.read_layer(2).unwrap(), vec![5, -6, 7]);
        assert_eq!(grid.read_cell(&[1, 1]).unwrap(), -9);
        assert_eq!(grid.read_cell(&[4, 4]).unwrap(), 0);
        assert_eq!(grid.read_cell(&[9, 0]).unwrap(), 0);
    }

    #[test]
    fn test_open_rejects_wrong_width() {
        let path = temp_path("width");
        drop(FileBackedArray::<i64>::create(&path, 2, 2).unwrap());
        assert!(FileBackedArray::<i32>::open(&path).is_err());
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let path = temp_path("truncated");
        drop(FileBackedArray::<i64>::create(&path, 2, 3).unwrap());
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(HEADER_LEN + 8).unwrap();
        assert!(matches!(
            FileBackedArray::<i64>::open(&path),
            Err(LatticeError::StorageIo { .. })
        ));
    }

    #[test]
    fn test_header_roundtrip() {
        let header = GridFileHeader {
            version: FORMAT_VERSION,
            dimension: 4,
            cell_width: 8,
            side: 11,
            cell_count: 1001,
        };
        assert_eq!(GridFileHeader::decode(&header.encode()).unwrap(), header);
        assert!(GridFileHeader::decode(&[0u8; 40]).is_err());
    }
}
