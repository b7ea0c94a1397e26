use segdv_core::codec::FixedBlockFormat;
use segdv_core::packed::{bits_required, PackedReader, PackedWriter};
use segdv_core::{DataOutput, Error, IndexInput, IndexOutput, Result};

/// Bit-packs each block at the width of its largest value.
///
/// # Block layout
/// ```text
/// [u8 bits] [block_size values, MSB-first, `bits` each]
/// ```
pub struct BitPackedBlockFormat;

impl FixedBlockFormat for BitPackedBlockFormat {
    fn name(&self) -> &'static str {
        "bitpacked"
    }

    fn write_block(&self, block: &[u32], out: &mut dyn IndexOutput) -> Result<()> {
        let max = block.iter().copied().max().unwrap_or(0);
        let bits = bits_required(max as u64);
        out.write_byte(bits as u8)?;
        let mut writer = PackedWriter::new(bits);
        for &v in block {
            writer.add(v as u64, &mut *out)?;
        }
        writer.finish(out)
    }

    fn read_block(&self, input: &mut IndexInput, block: &mut [u32]) -> Result<()> {
        let bits = input.read_byte()? as u32;
        if !(1..=32).contains(&bits) {
            return Err(Error::Corrupt(format!(
                "bit-packed block width {bits} in {}",
                input.name()
            )));
        }
        let packed = PackedReader::read(input, block.len(), bits)?;
        for (i, slot) in block.iter_mut().enumerate() {
            *slot = packed.get(i) as u32;
        }
        Ok(())
    }
}
