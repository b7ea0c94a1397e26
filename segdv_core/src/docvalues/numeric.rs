use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{MAX_TABLE_SIZE, PACKED_VERSION_CURRENT};
use crate::packed::{bits_required, fastest_format_and_bits, BlockPackedWriter, FormatAndBits, PackedWriter};
use crate::store::DataOutput;

use super::consumer::FieldWriter;
use super::{EntryKind, NumericFormat};

/// Whole-field statistics that drive the numeric encoding choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericStats {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    /// GCD of all `v - min`; 1 once any value is too large to subtract safely.
    pub gcd: i64,
    /// Distinct values, dropped once there are more than [`MAX_TABLE_SIZE`].
    pub uniques: Option<BTreeSet<i64>>,
}

impl Default for NumericStats {
    fn default() -> Self {
        Self {
            count: 0,
            min: i64::MAX,
            max: i64::MIN,
            gcd: 0,
            uniques: Some(BTreeSet::new()),
        }
    }
}

impl NumericStats {
    pub fn collect(values: impl Iterator<Item = i64>) -> Self {
        let mut stats = Self::default();
        for v in values {
            stats.add(v);
        }
        stats
    }

    pub fn add(&mut self, v: i64) {
        if self.gcd != 1 {
            if !(i64::MIN / 2..=i64::MAX / 2).contains(&v) {
                self.gcd = 1;
            } else if self.count != 0 {
                // the running min only moves toward v, so the gcd of
                // differences stays the gcd of differences from the final min
                self.gcd = gcd(self.gcd, v - self.min);
            }
        }
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        if let Some(uniques) = &mut self.uniques {
            if uniques.insert(v) && uniques.len() > MAX_TABLE_SIZE {
                self.uniques = None;
            }
        }
        self.count += 1;
    }

    /// Pick the encoding for this field. Table compression wins whenever the
    /// distinct values fit the table; GCD beats plain block packing when the
    /// values share a factor.
    pub fn choose(&self, acceptable_overhead_ratio: f32) -> NumericEncoding {
        if let Some(uniques) = &self.uniques {
            let bits = bits_required(uniques.len().saturating_sub(1) as u64);
            let format_and_bits = fastest_format_and_bits(bits, acceptable_overhead_ratio);
            if format_and_bits.bits_per_value == 8
                && self.min >= i8::MIN as i64
                && self.max <= i8::MAX as i64
            {
                NumericEncoding::Uncompressed
            } else {
                NumericEncoding::Table {
                    table: uniques.iter().copied().collect(),
                    format_and_bits,
                }
            }
        } else if self.gcd != 0 && self.gcd != 1 {
            NumericEncoding::Gcd {
                min: self.min,
                gcd: self.gcd,
            }
        } else {
            NumericEncoding::Delta
        }
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let mut a = a.unsigned_abs();
    let mut b = b.unsigned_abs();
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a as i64
}

#[derive(Debug, Clone, PartialEq)]
pub enum NumericEncoding {
    Uncompressed,
    Table {
        /// Sorted distinct values; a document stores its value's index.
        table: Vec<i64>,
        format_and_bits: FormatAndBits,
    },
    Gcd {
        min: i64,
        gcd: i64,
    },
    Delta,
}

impl NumericEncoding {
    pub fn format(&self) -> NumericFormat {
        match self {
            Self::Uncompressed => NumericFormat::Uncompressed,
            Self::Table { .. } => NumericFormat::Table,
            Self::Gcd { .. } => NumericFormat::Gcd,
            Self::Delta => NumericFormat::Delta,
        }
    }
}

// ── Writer ─────────────────────────────────────────────────────────────────

impl FieldWriter<'_> {
    /// Write one NUMBER entry. `values` is walked twice: once for the
    /// statistics and once for the payload.
    pub(super) fn numeric<I>(&mut self, field: u32, values: I) -> Result<NumericFormat>
    where
        I: Iterator<Item = Option<i64>> + Clone,
    {
        let stats = NumericStats::collect(values.clone().map(|v| v.unwrap_or(0)));
        self.check_count(field, stats.count)?;
        let encoding = stats.choose(self.config.acceptable_overhead_ratio);
        let format = encoding.format();

        self.meta.write_vint(field as i32)?;
        self.meta.write_byte(EntryKind::Number as u8)?;
        self.meta.write_long(self.data.file_pointer() as i64)?;
        self.meta.write_byte(format as u8)?;
        if format != NumericFormat::Uncompressed {
            self.meta.write_vint(PACKED_VERSION_CURRENT)?;
        }

        let start = self.data.file_pointer();
        let values = values.map(|v| v.unwrap_or(0));
        match &encoding {
            NumericEncoding::Uncompressed => {
                for v in values {
                    self.data.write_byte(v as i8 as u8)?;
                }
            }
            NumericEncoding::Table {
                table,
                format_and_bits,
            } => {
                self.data.write_vint(table.len() as i32)?;
                for &v in table {
                    self.data.write_long(v)?;
                }
                self.data.write_vint(format_and_bits.format.id())?;
                self.data.write_vint(format_and_bits.bits_per_value as i32)?;
                let mut writer = PackedWriter::new(format_and_bits.bits_per_value);
                for v in values {
                    let ord = table.binary_search(&v).map_err(|_| {
                        Error::invalid(format!("field {field}: value {v} changed between passes"))
                    })?;
                    writer.add(ord as u64, &mut *self.data)?;
                }
                writer.finish(&mut *self.data)?;
            }
            NumericEncoding::Gcd { min, gcd } => {
                self.data.write_long(*min)?;
                self.data.write_long(*gcd)?;
                self.data.write_vint(self.config.block_size as i32)?;
                let mut writer = BlockPackedWriter::new(self.config.block_size)?;
                for v in values {
                    writer.add((v - min) / gcd, &mut *self.data)?;
                }
                writer.finish(&mut *self.data)?;
            }
            NumericEncoding::Delta => {
                self.data.write_vint(self.config.block_size as i32)?;
                let mut writer = BlockPackedWriter::new(self.config.block_size)?;
                for v in values {
                    writer.add(v, &mut *self.data)?;
                }
                writer.finish(&mut *self.data)?;
            }
        }

        debug!(
            field,
            format = format.name(),
            docs = stats.count,
            min = stats.min,
            max = stats.max,
            gcd = stats.gcd,
            distinct = ?stats.uniques.as_ref().map(|u| u.len()),
            bytes = self.data.file_pointer() - start,
            "wrote numeric entry"
        );
        Ok(format)
    }
}
