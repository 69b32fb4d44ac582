//! Snapshot codec — backup encoder/decoder.
//!
//! Pure codec layer over readers and writers; file handling lives in
//! `snapshot`.
//!
//! - `write_grid`:  stream any automaton's canonical orthant as `grid.bin`
//! - `GridReader`:  read the header, then the values layer by layer
//! - `encode_properties` / `decode_properties`: `properties.json`
//!
//! `grid.bin` layout (all integers little-endian):
//!   magic `AETHSNAP`, format version u32, dimension u32, family tag u8,
//!   changed u8 (0 = none, 1 = false, 2 = true), reserved u16, step u64,
//!   side u64, cell count u64, then every canonical cell in row-major
//!   ragged order as a u32 length and two's-complement bytes.
//!
//! Values are stored value-type independent, so a backup taken from an
//! `i64` model restores into a `BigInt` one and back (if it fits).

use std::io::{self, Read, Write};

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use aether_kernel::arithmetic::CellValue;
use aether_kernel::config::ModelConfig;
use aether_kernel::storage::RaggedShape;
use aether_kernel::{Automaton, EngineState, Family, LatticeError, FORMAT_VERSION};

pub const GRID_MAGIC: [u8; 8] = *b"AETHSNAP";
pub const GRID_HEADER_LEN: usize = 44;

/// Values longer than this are treated as corruption.
const MAX_VALUE_LEN: usize = 1 << 20;

// ---------------------------------------------------------------------------
// properties.json
// ---------------------------------------------------------------------------

/// Backup metadata. Written after `grid.bin`; its presence marks a complete
/// backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupProperties {
    pub format_version: u32,
    pub config: ModelConfig,
    /// Value type of the model that was backed up.
    pub value_type: String,
    pub step: u64,
    pub changed: Option<bool>,
    pub side: u64,
    pub cell_count: u64,
    /// `hashing::grid_hash` of the backed up model.
    pub hash: String,
    /// SHA-256 of the `grid.bin` bytes.
    pub grid_sha256: String,
}

impl BackupProperties {
    pub fn state(&self) -> EngineState {
        EngineState::restore(self.step, self.changed)
    }
}

/// Pretty JSON, stable field order.
pub fn encode_properties(properties: &BackupProperties) -> serde_json::Result<String> {
    serde_json::to_string_pretty(properties)
}

/// Strict: unknown fields and missing fields are errors.
pub fn decode_properties(json: &str) -> serde_json::Result<BackupProperties> {
    serde_json::from_str(json)
}

// ---------------------------------------------------------------------------
// grid.bin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridHeader {
    pub version: u32,
    pub dimension: usize,
    pub family: Family,
    pub state: EngineState,
    pub side: u64,
    pub cell_count: u64,
}

impl GridHeader {
    pub fn of<A: Automaton + ?Sized>(automaton: &A) -> Self {
        let shape_count = RaggedShape::new(automaton.dimension(), automaton.side())
            .map(|shape| shape.cell_count(automaton.side()))
            .unwrap_or(0);
        GridHeader {
            version: FORMAT_VERSION,
            dimension: automaton.dimension(),
            family: automaton.family(),
            state: automaton.state(),
            side: automaton.side(),
            cell_count: shape_count,
        }
    }

    pub fn encode(&self) -> [u8; GRID_HEADER_LEN] {
        let mut out = [0u8; GRID_HEADER_LEN];
        out[0..8].copy_from_slice(&GRID_MAGIC);
        out[8..12].copy_from_slice(&self.version.to_le_bytes());
        out[12..16].copy_from_slice(&(self.dimension as u32).to_le_bytes());
        out[16] = self.family.tag();
        out[17] = match self.state.last_changed() {
            None => 0,
            Some(false) => 1,
            Some(true) => 2,
        };
        out[20..28].copy_from_slice(&self.state.step().to_le_bytes());
        out[28..36].copy_from_slice(&self.side.to_le_bytes());
        out[36..44].copy_from_slice(&self.cell_count.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; GRID_HEADER_LEN]) -> Result<Self, String> {
        if bytes[0..8] != GRID_MAGIC {
            return Err("bad magic".to_string());
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(raw)
        };
        let version = u32_at(8);
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", version));
        }
        let family =
            Family::from_tag(bytes[16]).ok_or_else(|| format!("unknown family tag {}", bytes[16]))?;
        let changed = match bytes[17] {
            0 => None,
            1 => Some(false),
            2 => Some(true),
            other => return Err(format!("bad changed flag {}", other)),
        };
        let header = GridHeader {
            version,
            dimension: u32_at(12) as usize,
            family,
            state: EngineState::restore(u64_at(20), changed),
            side: u64_at(28),
            cell_count: u64_at(36),
        };
        let shape = RaggedShape::new(header.dimension, header.side).map_err(|e| e.to_string())?;
        if shape.cell_count(header.side) != header.cell_count {
            return Err(format!(
                "cell count {} does not match side {}",
                header.cell_count, header.side
            ));
        }
        Ok(header)
    }
}

/// Stream `automaton` as `grid.bin`. Returns the number of cells written.
pub fn write_grid<A, W>(automaton: &A, writer: &mut W) -> aether_kernel::Result<u64>
where
    A: Automaton + ?Sized,
    W: Write,
{
    let header = GridHeader::of(automaton);
    writer.write_all(&header.encode()).map_err(write_error)?;
    let mut written = 0u64;
    automaton.for_each_canonical(&mut |_, value| {
        let bytes = value.to_bigint().to_signed_bytes_le();
        writer.write_all(&(bytes.len() as u32).to_le_bytes()).map_err(write_error)?;
        writer.write_all(&bytes).map_err(write_error)?;
        written += 1;
        Ok(())
    })?;
    if written != header.cell_count {
        return Err(LatticeError::InvalidArgument(format!(
            "model produced {} cells, header promises {}",
            written, header.cell_count
        )));
    }
    Ok(written)
}

fn write_error(e: io::Error) -> LatticeError {
    LatticeError::storage("grid.bin", "write backup grid", e)
}

/// Reads `grid.bin` incrementally.
pub struct GridReader<R> {
    reader: R,
    header: GridHeader,
    shape: RaggedShape,
    next_layer: u64,
}

impl<R: Read> GridReader<R> {
    pub fn new(mut reader: R) -> Result<Self, String> {
        let mut raw = [0u8; GRID_HEADER_LEN];
        reader.read_exact(&mut raw).map_err(|e| format!("short header: {}", e))?;
        let header = GridHeader::decode(&raw)?;
        let shape = RaggedShape::new(header.dimension, header.side).map_err(|e| e.to_string())?;
        Ok(GridReader {
            reader,
            header,
            shape,
            next_layer: 0,
        })
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    /// The next outer layer. Layers must be read in order.
    pub fn read_layer<V: CellValue>(&mut self, layer: u64) -> Result<Vec<V>, String> {
        if layer != self.next_layer || layer >= self.header.side {
            return Err(format!("layer {} requested, next is {}", layer, self.next_layer));
        }
        let len = self.shape.layer_len(layer);
        let mut values = Vec::with_capacity(len as usize);
        for _ in 0..len {
            values.push(self.read_value()?);
        }
        self.next_layer += 1;
        Ok(values)
    }

    /// Every remaining value, checking nothing trails the last one.
    pub fn read_all<V: CellValue>(mut self) -> Result<Vec<V>, String> {
        let mut values = Vec::new();
        while self.next_layer < self.header.side {
            let layer = self.next_layer;
            values.extend(self.read_layer::<V>(layer)?);
        }
        self.finish()?;
        Ok(values)
    }

    /// Fails if bytes remain after the last layer.
    pub fn finish(mut self) -> Result<(), String> {
        let mut probe = [0u8; 1];
        match self.reader.read(&mut probe) {
            Ok(0) => Ok(()),
            Ok(_) => Err("trailing bytes after the last cell".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn read_value<V: CellValue>(&mut self) -> Result<V, String> {
        let mut len_buf = [0u8; 4];
        self.reader
            .read_exact(&mut len_buf)
            .map_err(|e| format!("truncated value: {}", e))?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_VALUE_LEN {
            return Err(format!("value length {} too large", len));
        }
        let mut raw = vec![0u8; len];
        self.reader
            .read_exact(&mut raw)
            .map_err(|e| format!("truncated value: {}", e))?;
        let value = BigInt::from_signed_bytes_le(&raw);
        V::from_bigint(&value)
            .ok_or_else(|| format!("value {} does not fit {}", value, V::TYPE_NAME))
    }
}
