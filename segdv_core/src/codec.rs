//! Pluggable block formats for integer streams.
//!
//! The block-integer writers own buffering, file pointers and the seek index;
//! a block format only turns one buffered block into bytes and back. Fixed
//! formats are stateless and see exactly `block_size` values per call.
//! Variable formats keep their own buffer and decide when a block is done,
//! which lets them look ahead at values that follow a block before
//! committing it.

use crate::error::Result;
use crate::store::{IndexInput, IndexOutput};

/// Encodes and decodes blocks of exactly `block_size` values.
pub trait FixedBlockFormat: Send + Sync {
    /// Human-readable name for CLI display and logs.
    fn name(&self) -> &'static str;

    /// Encode one full block. Slots past the last valid value of a final
    /// partial block hold stale data and are written anyway.
    fn write_block(&self, block: &[u32], out: &mut dyn IndexOutput) -> Result<()>;

    /// Decode one block into `block`, which has the stream's block size.
    fn read_block(&self, input: &mut IndexInput, block: &mut [u32]) -> Result<()>;
}

/// Stateful encoder for a variable-length block stream.
///
/// # Contract
/// - `add` buffers `value` and returns how many buffered values (possibly
///   including earlier ones held back for lookahead) it has now committed
///   to `out`. It must never commit more values than it has been given.
/// - Every encoder must accept `add(0)` as padding: the writer calls it
///   repeatedly on close until all pending values are committed. Encoders
///   whose output changes meaning when zeros follow the real data cannot
///   be used with this writer.
/// - A committed block must not exceed the format's `max_block_size`.
pub trait VariableBlockEncoder: Send {
    fn add(&mut self, value: u32, out: &mut dyn IndexOutput) -> Result<usize>;
}

/// Stateful decoder for a variable-length block stream.
pub trait VariableBlockDecoder: Send {
    /// Decode the next block into the front of `buffer` (sized to the
    /// stream's max block size) and return how many values it holds.
    fn read_block(&mut self, input: &mut IndexInput, buffer: &mut [u32]) -> Result<usize>;

    /// Called when the reader repositions `input` to the block at `fp`.
    fn seek(&mut self, _fp: u64) -> Result<()> {
        Ok(())
    }
}

/// Factory for matched encoder/decoder pairs of a variable block format.
pub trait VariableBlockFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upper bound on values per committed block; persisted in the stream
    /// header so readers size their buffers without out-of-band agreement.
    fn max_block_size(&self) -> usize;

    fn encoder(&self) -> Box<dyn VariableBlockEncoder>;

    fn decoder(&self) -> Box<dyn VariableBlockDecoder>;
}
