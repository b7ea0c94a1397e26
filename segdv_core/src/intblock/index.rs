use crate::error::{Error, Result};
use crate::store::{DataOutput, IndexInput};

use super::BlockPointer;

/// Largest in-block offset that still fits the shifted vint encoding.
const MAX_UPTO: usize = (i32::MAX >> 1) as usize;

/// Writes a sequence of [`BlockPointer`]s, each relative to the one before.
///
/// Relative entries take one of two shapes:
/// - same block: `vint((upto - last_upto) << 1 | 1)`
/// - new block: `vint(upto << 1)`, `vlong(fp - last_fp)`
///
/// Absolute entries are `vint(upto)`, `vlong(fp)`. Marks must be written in
/// non-decreasing stream order.
#[derive(Debug, Clone, Default)]
pub struct MarkWriter {
    last: BlockPointer,
}

impl MarkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue relative encoding from another writer's last mark.
    pub fn copy_from(&mut self, other: &MarkWriter) {
        self.last = other.last;
    }

    pub fn last(&self) -> BlockPointer {
        self.last
    }

    pub fn write<O: DataOutput + ?Sized>(
        &mut self,
        mark: BlockPointer,
        out: &mut O,
        absolute: bool,
    ) -> Result<()> {
        if mark.upto > MAX_UPTO {
            return Err(Error::invalid(format!("mark offset {} too large", mark.upto)));
        }
        if absolute {
            out.write_vint(mark.upto as i32)?;
            out.write_vlong(mark.fp)?;
        } else if mark.fp == self.last.fp {
            if mark.upto < self.last.upto {
                return Err(Error::invalid(format!(
                    "mark {mark:?} precedes previous mark {:?}",
                    self.last
                )));
            }
            out.write_vint((((mark.upto - self.last.upto) << 1) | 1) as i32)?;
        } else {
            if mark.fp < self.last.fp {
                return Err(Error::invalid(format!(
                    "mark {mark:?} precedes previous mark {:?}",
                    self.last
                )));
            }
            out.write_vint((mark.upto << 1) as i32)?;
            out.write_vlong(mark.fp - self.last.fp)?;
        }
        self.last = mark;
        Ok(())
    }
}

/// Decodes entries written by [`MarkWriter`], tracking the running pointer.
#[derive(Debug, Clone, Default)]
pub struct MarkReader {
    current: BlockPointer,
}

impl MarkReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy_from(&mut self, other: &MarkReader) {
        self.current = other.current;
    }

    pub fn current(&self) -> BlockPointer {
        self.current
    }

    pub fn read(&mut self, input: &mut IndexInput, absolute: bool) -> Result<BlockPointer> {
        if absolute {
            let upto = input.read_vint()?;
            if upto < 0 {
                return Err(Error::corrupt(format!("negative mark offset {upto}")));
            }
            self.current = BlockPointer {
                fp: input.read_vlong()?,
                upto: upto as usize,
            };
        } else {
            let code = input.read_vint()? as u32;
            if code & 1 == 1 {
                self.current.upto += (code >> 1) as usize;
            } else {
                let delta = input.read_vlong()?;
                self.current.upto = (code >> 1) as usize;
                self.current.fp = self
                    .current
                    .fp
                    .checked_add(delta)
                    .ok_or_else(|| Error::corrupt("mark file pointer overflows"))?;
            }
        }
        Ok(self.current)
    }
}
