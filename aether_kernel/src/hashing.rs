/// Canonical grid hashing.
///
/// SHA-256 over a canonical byte encoding of a model, identical across
/// platforms, value types and storage backends:
///   - a compact JSON header with fixed field order
///     (format_version, dimension, family, step, side)
///   - then every canonical cell in row-major ragged order as a `u32` LE
///     length followed by the value's two's-complement LE bytes
///
/// The same grid held as `i32`, `i64` or `BigInt`, in memory or on disk,
/// hashes the same.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::arithmetic::CellValue;
use crate::error::Result;
use crate::model::Automaton;
use crate::FORMAT_VERSION;

/// Canonical header bytes. No whitespace, fixed field order.
pub fn canonical_header<A: Automaton + ?Sized>(automaton: &A) -> Vec<u8> {
    let mut root = Map::new();
    root.insert("format_version".to_string(), Value::from(FORMAT_VERSION));
    root.insert("dimension".to_string(), Value::from(automaton.dimension() as u64));
    root.insert("family".to_string(), Value::from(automaton.family().name()));
    root.insert("step".to_string(), Value::from(automaton.state().step()));
    root.insert("side".to_string(), Value::from(automaton.side()));
    Value::Object(root).to_string().into_bytes()
}

/// SHA-256 of the canonical encoding. Lowercase hex string.
pub fn grid_hash<A: Automaton + ?Sized>(automaton: &A) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(canonical_header(automaton));
    automaton.for_each_canonical(&mut |_, value| {
        let bytes = value.to_bigint().to_signed_bytes_le();
        hasher.update((bytes.len() as u32).to_le_bytes());
        hasher.update(&bytes);
        Ok(())
    })?;
    Ok(to_hex(&hasher.finalize()))
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::engine::ToppleEngine;
    use crate::model::Evolving;
    use crate::rule::Family;
    use num_bigint::BigInt;

    #[test]
    fn test_header_field_order() {
        let engine =
            ToppleEngine::<i64>::new(ModelConfig::single_source(2, Family::Aether, 7)).unwrap();
        let header = String::from_utf8(canonical_header(&engine)).unwrap();
        assert_eq!(
            header,
            r#"{"format_version":1,"dimension":2,"family":"aether","step":0,"side":2}"#
        );
    }

    #[test]
    fn test_hash_independent_of_value_type() {
        let config = ModelConfig::single_source(3, Family::Sunflower, 5000);
        let mut narrow = ToppleEngine::<i32>::new(config.clone()).unwrap();
        let mut wide = ToppleEngine::<BigInt>::new(config).unwrap();
        for _ in 0..5 {
            narrow.step().unwrap();
            wide.step().unwrap();
        }
        assert_eq!(grid_hash(&narrow).unwrap(), grid_hash(&wide).unwrap());
    }

    #[test]
    fn test_hash_tracks_step() {
        let mut engine =
            ToppleEngine::<i64>::new(ModelConfig::single_source(2, Family::Aether, 300)).unwrap();
        let before = grid_hash(&engine).unwrap();
        engine.step().unwrap();
        let after = grid_hash(&engine).unwrap();
        assert_ne!(before, after);
        assert_eq!(after.len(), 64);
        assert!(after.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
