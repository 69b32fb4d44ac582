//! Append-only checkpoint log — binary protobuf frames.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only — no mutation, no deletion, no reordering
//!   - fsync after every write
//!   - Sequence strictly increasing from 1 (validated on append)
//!   - Steps never go backwards

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::debug;

use crate::error::{Result, RuntimeError};
use crate::proto_types::CheckpointRecord;

/// Frames above this size are treated as corruption.
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Append-only checkpoint log backed by a binary file.
#[derive(Debug)]
pub struct CheckpointLog {
    path: PathBuf,
    last: Option<CheckpointRecord>,
}

impl CheckpointLog {
    /// Open or create a log at `path`, reading existing records to find
    /// the last one.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let last = if path.exists() {
            Self::read_all_from_file(path)?.pop()
        } else {
            None
        };
        Ok(Self {
            path: path.to_path_buf(),
            last,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record; its sequence must follow the last one.
    pub fn append(&mut self, record: &CheckpointRecord) -> Result<()> {
        let expected = self.last_sequence() + 1;
        if record.sequence != expected {
            return Err(RuntimeError::SequenceViolation {
                expected,
                got: record.sequence,
            });
        }
        if let Some(last) = &self.last {
            if record.step < last.step {
                return Err(RuntimeError::InvariantViolation(format!(
                    "checkpoint step {} is before step {}",
                    record.step, last.step
                )));
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let buf = record.encode_to_vec();
        let len = buf.len() as u32;
        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        debug!(sequence = record.sequence, step = record.step, "checkpoint appended");
        self.last = Some(record.clone());
        Ok(())
    }

    /// All records in sequence order.
    pub fn load_all(&self) -> Result<Vec<CheckpointRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Self::read_all_from_file(&self.path)
    }

    pub fn last_sequence(&self) -> u64 {
        self.last.as_ref().map(|r| r.sequence).unwrap_or(0)
    }

    pub fn last_record(&self) -> Option<&CheckpointRecord> {
        self.last.as_ref()
    }

    /// Read every record, validating frame integrity and sequence order.
    fn read_all_from_file(path: &Path) -> Result<Vec<CheckpointRecord>> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut records: Vec<CheckpointRecord> = Vec::new();
        let mut len_buf = [0u8; 4];
        let mut offset = 0u64;
        let corrupt = |offset: u64, reason: String| RuntimeError::CheckpointLogCorrupt {
            path: path.to_path_buf(),
            offset,
            reason,
        };

        loop {
            match read_prefix(&mut reader, &mut len_buf)? {
                0 => break,
                4 => {}
                partial => {
                    let reason = format!("torn length prefix ({} of 4 bytes)", partial);
                    return Err(corrupt(offset, reason));
                }
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                return Err(corrupt(offset, format!("invalid frame length {}", len)));
            }

            let mut frame = vec![0u8; len];
            reader
                .read_exact(&mut frame)
                .map_err(|e| corrupt(offset, format!("truncated frame: {}", e)))?;

            let record = CheckpointRecord::decode(frame.as_slice())
                .map_err(|e| corrupt(offset, format!("protobuf decode error: {}", e)))?;

            let expected = records.last().map(|r| r.sequence).unwrap_or(0) + 1;
            if record.sequence != expected {
                return Err(corrupt(
                    offset,
                    format!("sequence {} where {} was expected", record.sequence, expected),
                ));
            }

            offset += 4 + len as u64;
            records.push(record);
        }

        Ok(records)
    }
}

/// Fill `buf` from `reader`, returning how many bytes were read before EOF.
fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8; 4]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
