//! Block-encoded integer streams with random-access seek.
//!
//! A stream starts with a small header holding its block size (fixed codec)
//! or maximum block size (variable codec), followed by encoded blocks. A
//! logical position in the stream is a [`BlockPointer`]: the file pointer of
//! the block that holds it plus the offset inside that block. Pointers are
//! captured on the writer with `mark()`, serialized compactly with
//! [`MarkWriter`], and replayed on any reader with `seek()`.

mod fixed;
mod index;
mod variable;

pub use fixed::{FixedIntBlockInput, FixedIntBlockReader, FixedIntBlockWriter};
pub use index::{MarkReader, MarkWriter};
pub use variable::{VariableIntBlockInput, VariableIntBlockReader, VariableIntBlockWriter};

use crate::error::Result;

/// Largest block a stream header may declare; readers allocate one block up
/// front, so anything bigger is treated as corruption.
pub const MAX_STREAM_BLOCK_SIZE: usize = crate::packed::MAX_BLOCK_SIZE;

/// Position of one logical value: block file pointer plus in-block offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockPointer {
    pub fp: u64,
    pub upto: usize,
}

/// Append side of an integer stream.
pub trait IntBlockWriter: Send {
    fn write(&mut self, value: u32) -> Result<()>;

    /// Pointer to the position the next `write` will fill.
    fn mark(&self) -> BlockPointer;

    /// Flush buffered values and release the output.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Read side of an integer stream. Each reader owns an independent cursor.
pub trait IntBlockReader: Send {
    fn next(&mut self) -> Result<u32>;

    /// Reposition to `pointer`. Decoding happens on the following `next`.
    fn seek(&mut self, pointer: BlockPointer) -> Result<()>;
}
