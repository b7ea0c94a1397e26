use std::io::Write;

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::PACKED_VERSION_CURRENT;
use crate::packed::MonotonicBlockPackedWriter;
use crate::store::DataOutput;

use super::consumer::FieldWriter;
use super::EntryKind;

impl FieldWriter<'_> {
    /// Write one BYTES entry: the values back to back, then (when lengths
    /// differ) the cumulative end offset of every document.
    pub(super) fn binary<I, B>(&mut self, field: u32, values: I) -> Result<()>
    where
        I: Iterator<Item = Option<B>> + Clone,
        B: AsRef<[u8]>,
    {
        self.meta.write_vint(field as i32)?;
        self.meta.write_byte(EntryKind::Bytes as u8)?;

        let start = self.data.file_pointer();
        let mut min_len = usize::MAX;
        let mut max_len = 0;
        let mut count = 0;
        for value in values.clone() {
            let bytes = value.as_ref().map_or(&[][..], |v| v.as_ref());
            if bytes.len() > self.config.max_binary_length {
                return Err(Error::invalid(format!(
                    "field {field}: document {count} has a {}-byte value, the limit is {}",
                    bytes.len(),
                    self.config.max_binary_length
                )));
            }
            min_len = min_len.min(bytes.len());
            max_len = max_len.max(bytes.len());
            self.data.write_all(bytes)?;
            count += 1;
        }
        self.check_count(field, count)?;
        if count == 0 {
            min_len = 0;
        }

        let num_bytes = self.data.file_pointer() - start;
        self.meta.write_long(start as i64)?;
        self.meta.write_long(num_bytes as i64)?;
        self.meta.write_vint(min_len as i32)?;
        self.meta.write_vint(max_len as i32)?;

        if min_len != max_len {
            self.meta.write_vint(PACKED_VERSION_CURRENT)?;
            self.meta.write_vint(self.config.block_size as i32)?;
            let mut writer = MonotonicBlockPackedWriter::new(self.config.block_size)?;
            let mut addr = 0u64;
            for value in values {
                addr += value.as_ref().map_or(0, |v| v.as_ref().len()) as u64;
                writer.add(addr as i64, &mut *self.data)?;
            }
            writer.finish(&mut *self.data)?;
        }

        debug!(
            field,
            docs = count,
            num_bytes,
            min_len,
            max_len,
            addressing = if min_len == max_len { "fixed" } else { "variable" },
            "wrote binary entry"
        );
        Ok(())
    }
}
