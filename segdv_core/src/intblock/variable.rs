use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{VariableBlockDecoder, VariableBlockEncoder, VariableBlockFormat};
use crate::error::{Error, Result, WriteStatus};
use crate::store::{DataOutput, IndexInput, IndexOutput};

use super::{BlockPointer, IntBlockReader, IntBlockWriter, MAX_STREAM_BLOCK_SIZE};

/// Integer stream whose blocks are sized by the encoder.
///
/// # Layout
/// ```text
/// [int max_block_size] [block 0] [block 1] ...
/// ```
///
/// `upto` counts values handed to the encoder but not yet committed. Because
/// an encoder may hold values back until it has seen what follows them, a
/// mark's `upto` can exceed the size of the block starting at its `fp`;
/// readers resolve that by skipping whole blocks after the seek.
pub struct VariableIntBlockWriter {
    out: Box<dyn IndexOutput>,
    encoder: Box<dyn VariableBlockEncoder>,
    upto: usize,
    status: WriteStatus,
}

impl VariableIntBlockWriter {
    pub fn new(mut out: Box<dyn IndexOutput>, format: &dyn VariableBlockFormat) -> Result<Self> {
        let max_block_size = format.max_block_size();
        if max_block_size == 0 || max_block_size > MAX_STREAM_BLOCK_SIZE {
            return Err(Error::invalid(format!("invalid max block size {max_block_size}")));
        }
        out.write_int(max_block_size as i32)?;
        Ok(Self {
            out,
            encoder: format.encoder(),
            upto: 0,
            status: WriteStatus::Clean,
        })
    }

    pub fn status(&self) -> WriteStatus {
        self.status
    }

    pub fn write(&mut self, value: u32) -> Result<()> {
        self.status.begin();
        let result = self
            .encoder
            .add(value, self.out.as_mut())
            .and_then(|committed| {
                (self.upto + 1).checked_sub(committed).ok_or_else(|| {
                    Error::invalid(format!(
                        "block encoder committed {committed} values with {} pending",
                        self.upto + 1
                    ))
                })
            })
            .map(|upto| self.upto = upto);
        self.status.settle(&result);
        result
    }

    pub fn mark(&self) -> BlockPointer {
        BlockPointer {
            fp: self.out.file_pointer(),
            upto: self.upto,
        }
    }

    /// Pad with zeros until every real value is committed, then close the
    /// output. Padding is skipped after a failed write so that it cannot
    /// raise a second error over the first; the output is closed either way.
    pub fn close(mut self) -> Result<()> {
        let stuffed = if self.status.is_clean() {
            self.stuff()
        } else {
            debug!(file = self.out.name(), status = ?self.status, "skipping zero stuffing");
            Ok(())
        };
        match stuffed {
            Ok(()) => self.out.close(),
            Err(e) => {
                let name = self.out.name().to_string();
                if let Err(close_err) = self.out.close() {
                    warn!(file = %name, error = %close_err, "suppressed close error after failed stuffing");
                }
                Err(e)
            }
        }
    }

    fn stuff(&mut self) -> Result<()> {
        let mut stuffed = 0;
        while self.upto > stuffed {
            self.write(0)?;
            stuffed += 1;
        }
        if stuffed > 0 {
            debug!(file = self.out.name(), stuffed, "stuffed trailing block");
        }
        Ok(())
    }
}

impl IntBlockWriter for VariableIntBlockWriter {
    fn write(&mut self, value: u32) -> Result<()> {
        VariableIntBlockWriter::write(self, value)
    }

    fn mark(&self) -> BlockPointer {
        VariableIntBlockWriter::mark(self)
    }

    fn close(self: Box<Self>) -> Result<()> {
        (*self).close()
    }
}

/// An opened variable-block stream; hands out independent readers.
pub struct VariableIntBlockInput {
    input: IndexInput,
    max_block_size: usize,
    format: Arc<dyn VariableBlockFormat>,
}

impl VariableIntBlockInput {
    pub fn open(mut input: IndexInput, format: Arc<dyn VariableBlockFormat>) -> Result<Self> {
        let max_block_size = input.read_int()?;
        if max_block_size <= 0 || max_block_size as usize > MAX_STREAM_BLOCK_SIZE {
            return Err(Error::corrupt(format!(
                "invalid max block size {max_block_size} in {}",
                input.name()
            )));
        }
        Ok(Self {
            input,
            max_block_size: max_block_size as usize,
            format,
        })
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn reader(&self) -> VariableIntBlockReader {
        VariableIntBlockReader {
            input: self.input.clone(),
            decoder: self.format.decoder(),
            buffer: vec![0; self.max_block_size],
            upto: 0,
            block_size: 0,
            seek_pending: false,
            pending_fp: 0,
            pending_upto: 0,
            last_block_fp: None,
        }
    }
}

pub struct VariableIntBlockReader {
    input: IndexInput,
    decoder: Box<dyn VariableBlockDecoder>,
    buffer: Vec<u32>,
    upto: usize,
    /// Values in the loaded block.
    block_size: usize,
    seek_pending: bool,
    pending_fp: u64,
    pending_upto: usize,
    last_block_fp: Option<u64>,
}

impl VariableIntBlockReader {
    fn load_block(&mut self) -> Result<()> {
        let fp = self.input.file_pointer();
        let n = self.decoder.read_block(&mut self.input, &mut self.buffer)?;
        if n == 0 || n > self.buffer.len() {
            return Err(Error::corrupt(format!(
                "block at {fp} in {} holds {n} values (max {})",
                self.input.name(),
                self.buffer.len()
            )));
        }
        self.last_block_fp = Some(fp);
        self.block_size = n;
        Ok(())
    }

    fn maybe_seek(&mut self) -> Result<()> {
        if !self.seek_pending {
            return Ok(());
        }
        if Some(self.pending_fp) != self.last_block_fp {
            self.input.seek(self.pending_fp)?;
            self.decoder.seek(self.pending_fp)?;
            self.load_block()?;
        }
        self.upto = self.pending_upto;
        // a non-causal encoder may have recorded an offset past the end of
        // the block that was open when the mark was taken
        while self.upto >= self.block_size {
            self.upto -= self.block_size;
            self.load_block()?;
        }
        self.seek_pending = false;
        Ok(())
    }

    pub fn next(&mut self) -> Result<u32> {
        self.maybe_seek()?;
        if self.upto == self.block_size {
            self.load_block()?;
            self.upto = 0;
        }
        let value = self.buffer[self.upto];
        self.upto += 1;
        Ok(value)
    }

    pub fn seek(&mut self, pointer: BlockPointer) -> Result<()> {
        self.pending_fp = pointer.fp;
        self.pending_upto = pointer.upto;
        self.seek_pending = true;
        Ok(())
    }
}

impl IntBlockReader for VariableIntBlockReader {
    fn next(&mut self) -> Result<u32> {
        VariableIntBlockReader::next(self)
    }

    fn seek(&mut self, pointer: BlockPointer) -> Result<()> {
        VariableIntBlockReader::seek(self, pointer)
    }
}
