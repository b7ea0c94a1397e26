use std::sync::Arc;

use tracing::debug;

use crate::codec::FixedBlockFormat;
use crate::error::{Error, Result};
use crate::store::{DataOutput, IndexInput, IndexOutput};

use super::{BlockPointer, IntBlockReader, IntBlockWriter, MAX_STREAM_BLOCK_SIZE};

/// Buffers exactly `block_size` values and hands each full block to a
/// [`FixedBlockFormat`].
///
/// # Layout
/// ```text
/// [vint block_size] [block 0] [block 1] ... [block N-1]
/// ```
/// The final block is always written at full size; slots after the last
/// written value hold stale data from the previous block.
pub struct FixedIntBlockWriter {
    out: Box<dyn IndexOutput>,
    format: Arc<dyn FixedBlockFormat>,
    buffer: Vec<u32>,
    /// Values written into the current block.
    upto: usize,
}

impl FixedIntBlockWriter {
    pub fn new(
        mut out: Box<dyn IndexOutput>,
        format: Arc<dyn FixedBlockFormat>,
        block_size: usize,
    ) -> Result<Self> {
        if block_size == 0 || block_size > MAX_STREAM_BLOCK_SIZE {
            return Err(Error::invalid(format!("invalid fixed block size {block_size}")));
        }
        out.write_vint(block_size as i32)?;
        Ok(Self {
            out,
            format,
            buffer: vec![0; block_size],
            upto: 0,
        })
    }

    pub fn block_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn write(&mut self, value: u32) -> Result<()> {
        self.buffer[self.upto] = value;
        self.upto += 1;
        if self.upto == self.buffer.len() {
            self.upto = 0;
            self.format.write_block(&self.buffer, self.out.as_mut())?;
        }
        Ok(())
    }

    pub fn mark(&self) -> BlockPointer {
        BlockPointer {
            fp: self.out.file_pointer(),
            upto: self.upto,
        }
    }

    /// Flush a trailing partial block, then close the output. The output is
    /// closed even when the flush fails; the flush error wins.
    pub fn close(mut self) -> Result<()> {
        let flushed = if self.upto > 0 {
            debug!(
                file = self.out.name(),
                valid = self.upto,
                block_size = self.buffer.len(),
                "flushing partial block"
            );
            self.format.write_block(&self.buffer, self.out.as_mut())
        } else {
            Ok(())
        };
        let closed = self.out.close();
        flushed.and(closed)
    }
}

impl IntBlockWriter for FixedIntBlockWriter {
    fn write(&mut self, value: u32) -> Result<()> {
        FixedIntBlockWriter::write(self, value)
    }

    fn mark(&self) -> BlockPointer {
        FixedIntBlockWriter::mark(self)
    }

    fn close(self: Box<Self>) -> Result<()> {
        (*self).close()
    }
}

/// An opened fixed-block stream; hands out independent readers.
pub struct FixedIntBlockInput {
    input: IndexInput,
    block_size: usize,
    format: Arc<dyn FixedBlockFormat>,
}

impl FixedIntBlockInput {
    /// Read the stream header at the current position of `input`.
    pub fn open(mut input: IndexInput, format: Arc<dyn FixedBlockFormat>) -> Result<Self> {
        let block_size = input.read_vint()?;
        if block_size <= 0 || block_size as usize > MAX_STREAM_BLOCK_SIZE {
            return Err(Error::corrupt(format!(
                "invalid fixed block size {block_size} in {}",
                input.name()
            )));
        }
        Ok(Self {
            input,
            block_size: block_size as usize,
            format,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// A reader with its own cursor, positioned at the first block.
    pub fn reader(&self) -> FixedIntBlockReader {
        FixedIntBlockReader {
            input: self.input.clone(),
            format: self.format.clone(),
            buffer: vec![0; self.block_size],
            upto: self.block_size,
            seek_pending: false,
            pending_fp: 0,
            last_block_fp: None,
        }
    }
}

/// Sequential cursor over a fixed-block stream with lazy seeking: a seek
/// only records the target, and the block is loaded by the next `next`
/// unless it is already the one in memory.
pub struct FixedIntBlockReader {
    input: IndexInput,
    format: Arc<dyn FixedBlockFormat>,
    buffer: Vec<u32>,
    upto: usize,
    seek_pending: bool,
    pending_fp: u64,
    last_block_fp: Option<u64>,
}

impl FixedIntBlockReader {
    pub fn next(&mut self) -> Result<u32> {
        if self.seek_pending {
            self.input.seek(self.pending_fp)?;
            self.last_block_fp = Some(self.pending_fp);
            self.format.read_block(&mut self.input, &mut self.buffer)?;
            self.seek_pending = false;
        } else if self.upto == self.buffer.len() {
            self.last_block_fp = Some(self.input.file_pointer());
            self.format.read_block(&mut self.input, &mut self.buffer)?;
            self.upto = 0;
        }
        let value = self.buffer[self.upto];
        self.upto += 1;
        Ok(value)
    }

    pub fn seek(&mut self, pointer: BlockPointer) -> Result<()> {
        if pointer.upto >= self.buffer.len() {
            return Err(Error::corrupt(format!(
                "seek offset {} outside block of {} values in {}",
                pointer.upto,
                self.buffer.len(),
                self.input.name()
            )));
        }
        if self.seek_pending || Some(pointer.fp) != self.last_block_fp {
            self.pending_fp = pointer.fp;
            self.seek_pending = true;
        }
        self.upto = pointer.upto;
        Ok(())
    }
}

impl IntBlockReader for FixedIntBlockReader {
    fn next(&mut self) -> Result<u32> {
        FixedIntBlockReader::next(self)
    }

    fn seek(&mut self, pointer: BlockPointer) -> Result<()> {
        FixedIntBlockReader::seek(self, pointer)
    }
}
