//! Per-document column values for one segment.
//!
//! A segment's doc values live in two streams: `<segment>.dvd` holds the
//! encoded payloads back to back, and `<segment>.dvm` holds one metadata
//! record per entry pointing into it.
//!
//! # Metadata records
//! ```text
//! NUMBER  vint field, byte 0, long offset, byte format [, vint packed_version]
//! BYTES   vint field, byte 1, long offset, long num_bytes, vint min_len, vint max_len
//!         [, vint packed_version, vint block_size]        (when min_len != max_len)
//! FST     vint field, byte 2, long offset, vlong ord_count
//! ...
//! vint -1                                                 (end of fields)
//! ```
//! Sorted fields write a NUMBER entry for their ordinals followed by an FST
//! entry under the same field number. Sorted-set fields write BYTES (the
//! per-document ordinal payloads), NUMBER (per-document counts), then FST.

mod binary;
mod consumer;
mod numeric;
mod producer;
mod sorted;

pub use consumer::DocValuesConsumer;
pub use numeric::{NumericEncoding, NumericStats};
pub use producer::{
    BinaryDocValues, DocValuesProducer, FieldEntry, NumericDocValues, SortedDocValues,
    SortedSetDocValues,
};
pub use sorted::OrdRemap;

use crate::error::{Error, Result};
use crate::format::{DEFAULT_BLOCK_SIZE, MAX_BINARY_FIELD_LENGTH};
use crate::packed::check_block_size;

/// Identity of a field within a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, number: u32) -> Self {
        Self {
            name: name.into(),
            number,
        }
    }
}

/// Kind tag of a metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    Number = 0,
    Bytes = 1,
    Fst = 2,
}

impl EntryKind {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Number),
            1 => Some(Self::Bytes),
            2 => Some(Self::Fst),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Bytes => "bytes",
            Self::Fst => "fst",
        }
    }
}

/// Payload layout of a NUMBER entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NumericFormat {
    /// Block-packed raw values.
    Delta = 0,
    /// Table of distinct values plus packed per-document indices.
    Table = 1,
    /// One signed byte per document.
    Uncompressed = 2,
    /// Block-packed `(v - min) / gcd`.
    Gcd = 3,
}

impl NumericFormat {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Delta),
            1 => Some(Self::Table),
            2 => Some(Self::Uncompressed),
            3 => Some(Self::Gcd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Table => "table",
            Self::Uncompressed => "uncompressed",
            Self::Gcd => "gcd",
        }
    }
}

/// Tunables of the doc-values writer.
#[derive(Debug, Clone, PartialEq)]
pub struct DocValuesConfig {
    /// Values per block for block-packed numerics and binary address tables.
    pub block_size: usize,
    /// Extra space per value, as a fraction of the minimal width, that table
    /// compression may spend to reach a byte-aligned width.
    pub acceptable_overhead_ratio: f32,
    /// Longest binary value accepted.
    pub max_binary_length: usize,
}

impl Default for DocValuesConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            acceptable_overhead_ratio: 0.25,
            max_binary_length: MAX_BINARY_FIELD_LENGTH,
        }
    }
}

impl DocValuesConfig {
    pub fn validate(&self) -> Result<()> {
        check_block_size(self.block_size)?;
        if !self.acceptable_overhead_ratio.is_finite() || self.acceptable_overhead_ratio < 0.0 {
            return Err(Error::invalid(format!(
                "acceptable overhead ratio must be a non-negative number, got {}",
                self.acceptable_overhead_ratio
            )));
        }
        if self.max_binary_length == 0 || self.max_binary_length > MAX_BINARY_FIELD_LENGTH {
            return Err(Error::invalid(format!(
                "max binary length must be in [1, {MAX_BINARY_FIELD_LENGTH}], got {}",
                self.max_binary_length
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        DocValuesConfig::default().validate().unwrap();
    }

    #[test]
    fn test_config_rejections() {
        let bad_block = DocValuesConfig {
            block_size: 1000,
            ..Default::default()
        };
        assert!(bad_block.validate().is_err());

        let bad_ratio = DocValuesConfig {
            acceptable_overhead_ratio: f32::NAN,
            ..Default::default()
        };
        assert!(bad_ratio.validate().is_err());

        let bad_len = DocValuesConfig {
            max_binary_length: MAX_BINARY_FIELD_LENGTH + 1,
            ..Default::default()
        };
        assert!(bad_len.validate().is_err());
    }

    #[test]
    fn test_tags_round_trip() {
        for kind in [EntryKind::Number, EntryKind::Bytes, EntryKind::Fst] {
            assert_eq!(EntryKind::from_u8(kind as u8), Some(kind));
        }
        for format in [
            NumericFormat::Delta,
            NumericFormat::Table,
            NumericFormat::Uncompressed,
            NumericFormat::Gcd,
        ] {
            assert_eq!(NumericFormat::from_u8(format as u8), Some(format));
        }
        assert_eq!(EntryKind::from_u8(9), None);
        assert_eq!(NumericFormat::from_u8(4), None);
    }
}
