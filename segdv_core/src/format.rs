//! On-disk constants plus the codec header and checksum footer that frame
//! every doc-values stream.

use std::io::Write;

use crate::error::{Error, Result};
use crate::store::{DataOutput, IndexInput, IndexOutput};

/// Magic bytes opening every codec header.
pub const HEADER_MAGIC: &[u8; 4] = b"SGDV";

/// Magic int opening every footer.
pub const FOOTER_MAGIC: i32 = !0x5347_4456;

/// Footer layout: magic:i32 + algorithm:i32 + checksum:i64.
pub const FOOTER_LENGTH: u64 = 16;

/// Checksum algorithm id stored in the footer (xxh3-64).
pub const CHECKSUM_XXH3: i32 = 1;

// ── Doc-values files ───────────────────────────────────────────────────────

pub const DATA_CODEC: &str = "SegmentDocValuesData";
pub const DATA_EXTENSION: &str = "dvd";
pub const META_CODEC: &str = "SegmentDocValuesMetadata";
pub const META_EXTENSION: &str = "dvm";

pub const VERSION_START: i32 = 0;
pub const VERSION_CURRENT: i32 = VERSION_START;

/// Version of the packed-integer layouts, recorded per numeric entry.
pub const PACKED_VERSION_CURRENT: i32 = 0;

/// Values per block for block-packed numeric streams and address tables.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Largest single binary value accepted by the binary field writer.
pub const MAX_BINARY_FIELD_LENGTH: usize = (1 << 15) - 2;

/// Largest distinct-value count that still qualifies for table compression.
pub const MAX_TABLE_SIZE: usize = 256;

/// Written in place of a field number after the last metadata record.
pub const END_OF_FIELDS: i32 = -1;

// ── Header ─────────────────────────────────────────────────────────────────

/// Write `magic + codec name + version`.
pub fn write_header<O: DataOutput + ?Sized>(out: &mut O, codec: &str, version: i32) -> Result<()> {
    out.write_all(HEADER_MAGIC)?;
    out.write_string(codec)?;
    out.write_int(version)?;
    Ok(())
}

/// Validate a header written by [`write_header`] and return its version.
pub fn check_header(input: &mut IndexInput, codec: &str, min_version: i32, max_version: i32) -> Result<i32> {
    let mut magic = [0u8; 4];
    input.read_exact_bytes(&mut magic)?;
    if &magic != HEADER_MAGIC {
        return Err(Error::corrupt(format!(
            "codec header mismatch in {}: bad magic {:02x?}",
            input.name(),
            magic
        )));
    }
    let actual = input.read_string()?;
    if actual != codec {
        return Err(Error::corrupt(format!(
            "codec mismatch in {}: expected {codec}, found {actual}",
            input.name()
        )));
    }
    let version = input.read_int()?;
    if version < min_version || version > max_version {
        return Err(Error::corrupt(format!(
            "unsupported {codec} version {version} in {} (supported {min_version}..={max_version})",
            input.name()
        )));
    }
    Ok(version)
}

// ── Footer ─────────────────────────────────────────────────────────────────

/// Append the footer. The checksum covers every byte before the checksum
/// field itself, including the footer magic and algorithm id.
pub fn write_footer(out: &mut dyn IndexOutput) -> Result<()> {
    out.write_int(FOOTER_MAGIC)?;
    out.write_int(CHECKSUM_XXH3)?;
    let checksum = out.checksum();
    out.write_long(checksum as i64)?;
    Ok(())
}

/// Verify the footer of the whole file behind `input` and return the stored
/// checksum. The cursor of `input` is left untouched.
pub fn checksum_entire_input(input: &IndexInput) -> Result<u64> {
    let len = input.len();
    if len < FOOTER_LENGTH {
        return Err(Error::corrupt(format!(
            "{} too short for a footer: {len} bytes",
            input.name()
        )));
    }
    let mut footer = input.clone();
    footer.seek(len - FOOTER_LENGTH)?;
    let magic = footer.read_int()?;
    if magic != FOOTER_MAGIC {
        return Err(Error::corrupt(format!("footer magic mismatch in {}", input.name())));
    }
    let algorithm = footer.read_int()?;
    if algorithm != CHECKSUM_XXH3 {
        return Err(Error::corrupt(format!(
            "unknown checksum algorithm {algorithm} in {}",
            input.name()
        )));
    }
    let expected = footer.read_long()? as u64;
    let covered = &input.bytes()[..(len - 8) as usize];
    let actual = xxhash_rust::xxh3::xxh3_64(covered);
    if actual != expected {
        return Err(Error::corrupt(format!(
            "checksum mismatch in {}: expected {expected:016x}, got {actual:016x}",
            input.name()
        )));
    }
    Ok(expected)
}

/// Verify that `input` is positioned exactly at the footer, then check it.
pub fn check_footer(input: &IndexInput) -> Result<u64> {
    let remaining = input.len().saturating_sub(input.file_pointer());
    if remaining != FOOTER_LENGTH {
        return Err(Error::corrupt(format!(
            "{} has {remaining} trailing bytes where a {FOOTER_LENGTH}-byte footer belongs",
            input.name()
        )));
    }
    checksum_entire_input(input)
}
