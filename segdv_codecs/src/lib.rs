mod chunked;
mod lookahead;
mod packed_block;
mod vint_block;

pub use chunked::ChunkedVIntFormat;
pub use lookahead::LookaheadVIntFormat;
pub use packed_block::BitPackedBlockFormat;
pub use vint_block::VIntBlockFormat;

use std::sync::Arc;

use segdv_core::codec::{FixedBlockFormat, VariableBlockDecoder, VariableBlockFormat};
use segdv_core::{Error, IndexInput, Result};

/// Names accepted by [`fixed_format_by_name`].
pub const FIXED_FORMATS: &[&str] = &["vint", "bitpacked"];

/// Names accepted by [`variable_format_by_name`].
pub const VARIABLE_FORMATS: &[&str] = &["chunked", "lookahead"];

/// Resolve a fixed block format by name.
///
/// Fixed streams persist only their block size, so the CLI uses this to pair
/// a file with the format it was written with.
pub fn fixed_format_by_name(name: &str) -> Result<Arc<dyn FixedBlockFormat>> {
    match name {
        "vint" => Ok(Arc::new(VIntBlockFormat)),
        "bitpacked" => Ok(Arc::new(BitPackedBlockFormat)),
        _ => Err(Error::InvalidArgument(format!(
            "unknown fixed block format {name:?}; expected one of {FIXED_FORMATS:?}"
        ))),
    }
}

/// Resolve a variable block format by name. `block_size` is the chunk size
/// of `chunked` and the base size of `lookahead`.
pub fn variable_format_by_name(name: &str, block_size: usize) -> Result<Arc<dyn VariableBlockFormat>> {
    if block_size == 0 {
        return Err(Error::InvalidArgument("block size must be positive".into()));
    }
    match name {
        "chunked" => Ok(Arc::new(ChunkedVIntFormat {
            max_block_size: block_size,
        })),
        "lookahead" => Ok(Arc::new(LookaheadVIntFormat {
            base_block_size: block_size,
        })),
        _ => Err(Error::InvalidArgument(format!(
            "unknown variable block format {name:?}; expected one of {VARIABLE_FORMATS:?}"
        ))),
    }
}

/// Decoder shared by the bundled variable formats: `vint count` followed by
/// `count` vints.
pub(crate) struct CountedVIntDecoder;

impl VariableBlockDecoder for CountedVIntDecoder {
    fn read_block(&mut self, input: &mut IndexInput, buffer: &mut [u32]) -> Result<usize> {
        let count = input.read_vint()?;
        if count <= 0 || count as usize > buffer.len() {
            return Err(Error::Corrupt(format!(
                "block of {count} values in {} (max {})",
                input.name(),
                buffer.len()
            )));
        }
        let count = count as usize;
        for slot in &mut buffer[..count] {
            *slot = input.read_vint()? as u32;
        }
        Ok(count)
    }
}
