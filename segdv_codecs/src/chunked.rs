use segdv_core::codec::{VariableBlockDecoder, VariableBlockEncoder, VariableBlockFormat};
use segdv_core::{DataOutput, IndexOutput, Result};

use crate::CountedVIntDecoder;

/// Causal variable format: a block is committed the moment it holds
/// `max_block_size` values, so a writer mark never points past the block
/// that starts at its file pointer.
///
/// # Block layout
/// ```text
/// [vint count] [count vints]
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ChunkedVIntFormat {
    pub max_block_size: usize,
}

impl VariableBlockFormat for ChunkedVIntFormat {
    fn name(&self) -> &'static str {
        "chunked"
    }

    fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    fn encoder(&self) -> Box<dyn VariableBlockEncoder> {
        Box::new(ChunkedVIntEncoder {
            max_block_size: self.max_block_size,
            pending: Vec::with_capacity(self.max_block_size),
        })
    }

    fn decoder(&self) -> Box<dyn VariableBlockDecoder> {
        Box::new(CountedVIntDecoder)
    }
}

struct ChunkedVIntEncoder {
    max_block_size: usize,
    pending: Vec<u32>,
}

impl VariableBlockEncoder for ChunkedVIntEncoder {
    fn add(&mut self, value: u32, out: &mut dyn IndexOutput) -> Result<usize> {
        self.pending.push(value);
        if self.pending.len() < self.max_block_size {
            return Ok(0);
        }
        out.write_vint(self.pending.len() as i32)?;
        for &v in &self.pending {
            out.write_vint(v as i32)?;
        }
        let committed = self.pending.len();
        self.pending.clear();
        Ok(committed)
    }
}
