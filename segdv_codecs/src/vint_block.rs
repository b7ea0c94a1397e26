use segdv_core::codec::FixedBlockFormat;
use segdv_core::{DataOutput, IndexInput, IndexOutput, Result};

/// Every value as a vint. Small values take one byte; no per-block header.
pub struct VIntBlockFormat;

impl FixedBlockFormat for VIntBlockFormat {
    fn name(&self) -> &'static str {
        "vint"
    }

    fn write_block(&self, block: &[u32], out: &mut dyn IndexOutput) -> Result<()> {
        for &v in block {
            out.write_vint(v as i32)?;
        }
        Ok(())
    }

    fn read_block(&self, input: &mut IndexInput, block: &mut [u32]) -> Result<()> {
        for slot in block {
            *slot = input.read_vint()? as u32;
        }
        Ok(())
    }
}
