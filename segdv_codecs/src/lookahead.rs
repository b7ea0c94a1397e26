use segdv_core::codec::{VariableBlockDecoder, VariableBlockEncoder, VariableBlockFormat};
use segdv_core::{DataOutput, IndexOutput, Result};
use tracing::debug;

use crate::CountedVIntDecoder;

/// Non-causal variable format with one value of lookahead.
///
/// A block is `base_block_size` long when its first value is at most 3 and
/// twice that otherwise, and it is only written once the value after it has
/// arrived. Marks taken while a full block is still pending therefore carry
/// an offset equal to that block's length, which the reader resolves by
/// stepping into the following block.
///
/// Padding with zeros on close is safe: the zeros land after every real
/// value, and the block layout records its own length.
#[derive(Debug, Clone, Copy)]
pub struct LookaheadVIntFormat {
    pub base_block_size: usize,
}

impl VariableBlockFormat for LookaheadVIntFormat {
    fn name(&self) -> &'static str {
        "lookahead"
    }

    fn max_block_size(&self) -> usize {
        2 * self.base_block_size
    }

    fn encoder(&self) -> Box<dyn VariableBlockEncoder> {
        Box::new(LookaheadVIntEncoder {
            base_block_size: self.base_block_size,
            pending: Vec::with_capacity(2 * self.base_block_size + 1),
        })
    }

    fn decoder(&self) -> Box<dyn VariableBlockDecoder> {
        Box::new(CountedVIntDecoder)
    }
}

struct LookaheadVIntEncoder {
    base_block_size: usize,
    pending: Vec<u32>,
}

impl VariableBlockEncoder for LookaheadVIntEncoder {
    fn add(&mut self, value: u32, out: &mut dyn IndexOutput) -> Result<usize> {
        self.pending.push(value);
        let flush_at = if self.pending[0] <= 3 {
            self.base_block_size
        } else {
            2 * self.base_block_size
        };
        if self.pending.len() <= flush_at {
            return Ok(0);
        }
        out.write_vint(flush_at as i32)?;
        for &v in &self.pending[..flush_at] {
            out.write_vint(v as i32)?;
        }
        debug!(
            fp = out.file_pointer(),
            block_len = flush_at,
            first = self.pending[0],
            "flushed lookahead block"
        );
        // the lookahead value opens the next block
        self.pending.drain(..flush_at);
        Ok(flush_at)
    }
}
