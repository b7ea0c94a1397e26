//! Bit-packed integer layouts.
//!
//! Three layouts are provided, each with a streaming writer and an in-memory
//! reader:
//!
//! | Layout              | Per-block header                    | Payload                  |
//! |---------------------|-------------------------------------|--------------------------|
//! | Packed              | none                                | values at a fixed width  |
//! | BlockPacked         | token byte, optional zig-zag min    | `v - min` at block width |
//! | MonotonicBlockPacked| zig-zag origin, f32 slope, width    | deviation from the line  |
//!
//! Bits are packed MSB-first, so a value may straddle byte boundaries.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::store::{zigzag_decode, zigzag_encode, DataOutput, IndexInput};

/// Smallest block size accepted by the block-packed layouts.
pub const MIN_BLOCK_SIZE: usize = 64;

/// Largest block size accepted by the block-packed layouts.
pub const MAX_BLOCK_SIZE: usize = 1 << 27;

const MIN_VALUE_EQUALS_0: u8 = 1;
const BPV_SHIFT: u32 = 1;

/// Bits needed to store `max_value` as an unsigned integer (at least 1).
#[inline]
pub fn bits_required(max_value: u64) -> u32 {
    (64 - max_value.leading_zeros()).max(1)
}

/// Largest value representable in `bits` bits.
#[inline]
pub fn max_value(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Bytes needed to pack `count` values at `bits` bits each.
#[inline]
pub fn byte_count(count: usize, bits: u32) -> usize {
    ((count as u64 * bits as u64).div_ceil(8)) as usize
}

pub fn check_block_size(block_size: usize) -> Result<()> {
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) || !block_size.is_power_of_two() {
        return Err(Error::invalid(format!(
            "block size must be a power of two in [{MIN_BLOCK_SIZE}, {MAX_BLOCK_SIZE}], got {block_size}"
        )));
    }
    Ok(())
}

// ── Format selection ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PackedFormat {
    Packed = 0,
}

impl PackedFormat {
    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn by_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Packed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatAndBits {
    pub format: PackedFormat,
    pub bits_per_value: u32,
}

/// Widen `bits` to a byte-aligned width when the allowed overhead covers it.
///
/// `acceptable_overhead_ratio` is clamped to `[0, 7]`; 0 never widens,
/// 7 always widens to the next of 8/16/32/64.
pub fn fastest_format_and_bits(bits: u32, acceptable_overhead_ratio: f32) -> FormatAndBits {
    let ratio = acceptable_overhead_ratio.clamp(0.0, 7.0);
    let max_bits = bits + (bits as f32 * ratio) as u32;
    let bits_per_value = [8, 16, 32, 64]
        .into_iter()
        .find(|&aligned| bits <= aligned && max_bits >= aligned)
        .unwrap_or(bits);
    FormatAndBits {
        format: PackedFormat::Packed,
        bits_per_value,
    }
}

// ── Packed ─────────────────────────────────────────────────────────────────

/// Streams values at a fixed bit width with no header.
pub struct PackedWriter {
    bits: u32,
    acc: u128,
    acc_bits: u32,
    written: usize,
}

impl PackedWriter {
    pub fn new(bits: u32) -> Self {
        assert!((1..=64).contains(&bits), "bits per value out of range: {bits}");
        Self {
            bits,
            acc: 0,
            acc_bits: 0,
            written: 0,
        }
    }

    pub fn add<O: DataOutput + ?Sized>(&mut self, v: u64, out: &mut O) -> Result<()> {
        debug_assert!(v <= max_value(self.bits), "{v} does not fit in {} bits", self.bits);
        self.acc = (self.acc << self.bits) | v as u128;
        self.acc_bits += self.bits;
        while self.acc_bits >= 8 {
            self.acc_bits -= 8;
            out.write_byte((self.acc >> self.acc_bits) as u8)?;
        }
        self.acc &= (1u128 << self.acc_bits) - 1;
        self.written += 1;
        Ok(())
    }

    /// Flush the trailing partial byte, zero-padded on the right.
    pub fn finish<O: DataOutput + ?Sized>(&mut self, out: &mut O) -> Result<()> {
        if self.acc_bits > 0 {
            out.write_byte((self.acc << (8 - self.acc_bits)) as u8)?;
            self.acc = 0;
            self.acc_bits = 0;
        }
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

/// Random access over values written by [`PackedWriter`].
#[derive(Clone, Debug)]
pub struct PackedReader {
    data: Bytes,
    bits: u32,
    count: usize,
}

impl PackedReader {
    pub fn read(input: &mut IndexInput, count: usize, bits: u32) -> Result<Self> {
        if !(1..=64).contains(&bits) {
            return Err(Error::corrupt(format!("invalid bits per value {bits}")));
        }
        let data = input.read_slice(byte_count(count, bits))?;
        Ok(Self { data, bits, count })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bits_per_value(&self) -> u32 {
        self.bits
    }

    pub fn get(&self, index: usize) -> u64 {
        debug_assert!(index < self.count);
        let bit_pos = index as u64 * self.bits as u64;
        let start = (bit_pos / 8) as usize;
        let shift = (bit_pos % 8) as u32;
        let nbytes = (shift + self.bits).div_ceil(8) as usize;
        let mut acc = 0u128;
        for k in 0..nbytes {
            acc = (acc << 8) | *self.data.get(start + k).unwrap_or(&0) as u128;
        }
        let total = nbytes as u32 * 8;
        ((acc >> (total - shift - self.bits)) as u64) & max_value(self.bits)
    }
}

// ── Block packed ───────────────────────────────────────────────────────────

/// Splits a stream of `i64` into fixed-size blocks, each packed at the width
/// of its own `max - min`.
pub struct BlockPackedWriter {
    block_size: usize,
    values: Vec<i64>,
}

impl BlockPackedWriter {
    pub fn new(block_size: usize) -> Result<Self> {
        check_block_size(block_size)?;
        Ok(Self {
            block_size,
            values: Vec::with_capacity(block_size),
        })
    }

    pub fn add<O: DataOutput + ?Sized>(&mut self, v: i64, out: &mut O) -> Result<()> {
        self.values.push(v);
        if self.values.len() == self.block_size {
            self.flush(out)?;
        }
        Ok(())
    }

    pub fn finish<O: DataOutput + ?Sized>(&mut self, out: &mut O) -> Result<()> {
        if !self.values.is_empty() {
            self.flush(out)?;
        }
        Ok(())
    }

    fn flush<O: DataOutput + ?Sized>(&mut self, out: &mut O) -> Result<()> {
        let mut min = i64::MAX;
        let mut max = i64::MIN;
        for &v in &self.values {
            min = min.min(v);
            max = max.max(v);
        }
        let delta = max.wrapping_sub(min) as u64;
        let bits = if delta == 0 { 0 } else { bits_required(delta) };
        if bits == 64 {
            // full range, store raw two's-complement bits
            min = 0;
        } else if min > 0 {
            // smallest min that still covers the block keeps the vlong short
            min = 0i64.max(max - max_value(bits) as i64);
        }

        let token = ((bits as u8) << BPV_SHIFT) | if min == 0 { MIN_VALUE_EQUALS_0 } else { 0 };
        out.write_byte(token)?;
        if min != 0 {
            out.write_vlong(zigzag_encode(min) - 1)?;
        }
        if bits > 0 {
            let mut packed = PackedWriter::new(bits);
            for &v in &self.values {
                packed.add(v.wrapping_sub(min) as u64, out)?;
            }
            packed.finish(out)?;
        }
        self.values.clear();
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct PackedBlock {
    min: i64,
    values: Option<PackedReader>,
}

/// Eagerly loaded counterpart of [`BlockPackedWriter`].
#[derive(Clone, Debug)]
pub struct BlockPackedReader {
    block_shift: u32,
    block_mask: usize,
    blocks: Vec<PackedBlock>,
    count: usize,
}

impl BlockPackedReader {
    pub fn read(input: &mut IndexInput, block_size: usize, count: usize) -> Result<Self> {
        check_block_size(block_size).map_err(|e| Error::corrupt(e.to_string()))?;
        let mut blocks = Vec::with_capacity(count.div_ceil(block_size));
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(block_size);
            let token = input.read_byte()?;
            let bits = (token >> BPV_SHIFT) as u32;
            if bits > 64 {
                return Err(Error::corrupt(format!("block-packed width {bits} in {}", input.name())));
            }
            let min = if token & MIN_VALUE_EQUALS_0 != 0 {
                0
            } else {
                let raw = input.read_vlong()?;
                let zz = raw
                    .checked_add(1)
                    .ok_or_else(|| Error::corrupt("block-packed minimum overflows"))?;
                zigzag_decode(zz)
            };
            let values = if bits > 0 {
                Some(PackedReader::read(input, n, bits)?)
            } else {
                None
            };
            blocks.push(PackedBlock { min, values });
            remaining -= n;
        }
        Ok(Self {
            block_shift: block_size.trailing_zeros(),
            block_mask: block_size - 1,
            blocks,
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> i64 {
        let block = &self.blocks[index >> self.block_shift];
        let delta = match &block.values {
            Some(values) => values.get(index & self.block_mask),
            None => 0,
        };
        block.min.wrapping_add(delta as i64)
    }
}

// ── Monotonic block packed ─────────────────────────────────────────────────

#[inline]
fn expected(origin: i64, average: f32, index: usize) -> i64 {
    origin.wrapping_add((average * index as f32) as i64)
}

/// Block-packed variant for non-decreasing sequences such as address tables:
/// each block stores only the deviation of every value from a straight line.
pub struct MonotonicBlockPackedWriter {
    block_size: usize,
    values: Vec<i64>,
}

impl MonotonicBlockPackedWriter {
    pub fn new(block_size: usize) -> Result<Self> {
        check_block_size(block_size)?;
        Ok(Self {
            block_size,
            values: Vec::with_capacity(block_size),
        })
    }

    pub fn add<O: DataOutput + ?Sized>(&mut self, v: i64, out: &mut O) -> Result<()> {
        self.values.push(v);
        if self.values.len() == self.block_size {
            self.flush(out)?;
        }
        Ok(())
    }

    pub fn finish<O: DataOutput + ?Sized>(&mut self, out: &mut O) -> Result<()> {
        if !self.values.is_empty() {
            self.flush(out)?;
        }
        Ok(())
    }

    fn flush<O: DataOutput + ?Sized>(&mut self, out: &mut O) -> Result<()> {
        let n = self.values.len();
        let average = if n == 1 {
            0.0
        } else {
            self.values[n - 1].wrapping_sub(self.values[0]) as f32 / (n - 1) as f32
        };
        let mut origin = self.values[0];
        for i in 1..n {
            let e = expected(origin, average, i);
            if e > self.values[i] {
                origin = origin.wrapping_sub(e - self.values[i]);
            }
        }

        let mut max_delta = 0u64;
        for (i, v) in self.values.iter_mut().enumerate() {
            *v = v.wrapping_sub(expected(origin, average, i));
            max_delta = max_delta.max(*v as u64);
        }

        out.write_zlong(origin)?;
        out.write_int(average.to_bits() as i32)?;
        if max_delta == 0 {
            out.write_vint(0)?;
        } else {
            let bits = bits_required(max_delta);
            out.write_vint(bits as i32)?;
            let mut packed = PackedWriter::new(bits);
            for &v in &self.values {
                packed.add(v as u64, out)?;
            }
            packed.finish(out)?;
        }
        self.values.clear();
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct MonotonicBlock {
    origin: i64,
    average: f32,
    deltas: Option<PackedReader>,
}

/// Eagerly loaded counterpart of [`MonotonicBlockPackedWriter`].
#[derive(Clone, Debug)]
pub struct MonotonicBlockPackedReader {
    block_shift: u32,
    block_mask: usize,
    blocks: Vec<MonotonicBlock>,
    count: usize,
}

impl MonotonicBlockPackedReader {
    pub fn read(input: &mut IndexInput, block_size: usize, count: usize) -> Result<Self> {
        check_block_size(block_size).map_err(|e| Error::corrupt(e.to_string()))?;
        let mut blocks = Vec::with_capacity(count.div_ceil(block_size));
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(block_size);
            let origin = input.read_zlong()?;
            let average = f32::from_bits(input.read_int()? as u32);
            let bits = input.read_vint()?;
            if !(0..=64).contains(&bits) {
                return Err(Error::corrupt(format!("monotonic width {bits} in {}", input.name())));
            }
            let deltas = if bits > 0 {
                Some(PackedReader::read(input, n, bits as u32)?)
            } else {
                None
            };
            blocks.push(MonotonicBlock {
                origin,
                average,
                deltas,
            });
            remaining -= n;
        }
        Ok(Self {
            block_shift: block_size.trailing_zeros(),
            block_mask: block_size - 1,
            blocks,
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> i64 {
        let block = &self.blocks[index >> self.block_shift];
        let i = index & self.block_mask;
        let delta = block.deltas.as_ref().map_or(0, |d| d.get(i));
        expected(block.origin, block.average, i).wrapping_add(delta as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg(seed: &mut u64) -> u64 {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        *seed
    }

    fn input(buf: Vec<u8>) -> IndexInput {
        IndexInput::new("packed", Bytes::from(buf))
    }

    #[test]
    fn test_bits_required() {
        assert_eq!(bits_required(0), 1);
        assert_eq!(bits_required(1), 1);
        assert_eq!(bits_required(255), 8);
        assert_eq!(bits_required(256), 9);
        assert_eq!(bits_required(u64::MAX), 64);
    }

    #[test]
    fn test_fastest_bits_widening() {
        assert_eq!(fastest_format_and_bits(7, 0.25).bits_per_value, 8);
        assert_eq!(fastest_format_and_bits(8, 0.0).bits_per_value, 8);
        assert_eq!(fastest_format_and_bits(6, 0.25).bits_per_value, 6);
        assert_eq!(fastest_format_and_bits(6, 0.0).bits_per_value, 6);
        assert_eq!(fastest_format_and_bits(3, 7.0).bits_per_value, 8);
        assert_eq!(fastest_format_and_bits(13, 0.25).bits_per_value, 16);
        assert_eq!(fastest_format_and_bits(40, 0.25).bits_per_value, 40);
    }

    #[test]
    fn test_block_size_validation() {
        assert!(check_block_size(64).is_ok());
        assert!(check_block_size(4096).is_ok());
        assert!(check_block_size(32).is_err());
        assert!(check_block_size(100).is_err());
    }

    #[test]
    fn test_packed_all_widths() {
        let mut seed = 7;
        for bits in [1u32, 3, 7, 8, 13, 31, 33, 63, 64] {
            let values: Vec<u64> = (0..97).map(|_| lcg(&mut seed) & max_value(bits)).collect();
            let mut buf = Vec::new();
            let mut w = PackedWriter::new(bits);
            for &v in &values {
                w.add(v, &mut buf).unwrap();
            }
            w.finish(&mut buf).unwrap();
            assert_eq!(buf.len(), byte_count(values.len(), bits));

            let r = PackedReader::read(&mut input(buf), values.len(), bits).unwrap();
            for (i, &v) in values.iter().enumerate() {
                assert_eq!(r.get(i), v, "bits={bits} index={i}");
            }
        }
    }

    #[test]
    fn test_block_packed_mixed_blocks() {
        let mut values = Vec::new();
        values.extend(std::iter::repeat(5i64).take(64)); // constant block
        values.extend((0..64).map(|i| 1000 + i)); // positive min
        values.extend((0..64).map(|i| -500 + 3 * i)); // negative min
        values.extend([i64::MIN, i64::MAX, 0, -1]); // full range, partial block

        let mut buf = Vec::new();
        let mut w = BlockPackedWriter::new(64).unwrap();
        for &v in &values {
            w.add(v, &mut buf).unwrap();
        }
        w.finish(&mut buf).unwrap();

        let mut inp = input(buf);
        let r = BlockPackedReader::read(&mut inp, 64, values.len()).unwrap();
        assert_eq!(inp.file_pointer(), inp.len());
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(r.get(i), v, "index {i}");
        }
    }

    #[test]
    fn test_monotonic_irregular_growth() {
        let mut seed = 99;
        let mut acc = 0i64;
        let values: Vec<i64> = (0..300)
            .map(|_| {
                acc += (lcg(&mut seed) % 40) as i64;
                acc
            })
            .collect();

        let mut buf = Vec::new();
        let mut w = MonotonicBlockPackedWriter::new(128).unwrap();
        for &v in &values {
            w.add(v, &mut buf).unwrap();
        }
        w.finish(&mut buf).unwrap();

        let r = MonotonicBlockPackedReader::read(&mut input(buf), 128, values.len()).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(r.get(i), v, "index {i}");
        }
    }
}
