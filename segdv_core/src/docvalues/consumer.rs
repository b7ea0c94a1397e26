use std::collections::HashSet;

use tracing::{debug, warn};

use crate::directory::Directory;
use crate::error::{Error, Result, WriteStatus};
use crate::format::{
    write_footer, write_header, DATA_CODEC, DATA_EXTENSION, END_OF_FIELDS, META_CODEC,
    META_EXTENSION, VERSION_CURRENT,
};
use crate::store::{DataOutput, IndexOutput};

use super::{DocValuesConfig, FieldInfo};

/// Borrowed view of both streams handed to the per-kind field writers.
pub(super) struct FieldWriter<'a> {
    pub(super) data: &'a mut dyn IndexOutput,
    pub(super) meta: &'a mut dyn IndexOutput,
    pub(super) config: &'a DocValuesConfig,
    pub(super) max_doc: usize,
}

impl FieldWriter<'_> {
    pub(super) fn check_count(&self, field: u32, count: usize) -> Result<()> {
        if count != self.max_doc {
            return Err(Error::invalid(format!(
                "field {field}: {count} values for {} documents",
                self.max_doc
            )));
        }
        Ok(())
    }
}

/// Writes the doc values of one segment.
///
/// # Lifecycle
/// ```text
/// create ──► add_*_field (each field number once) ──► close
///                          │
///                          └── any failure ──► later adds return Aborted
/// ```
/// Every value sequence must be replayable (`Clone`), because encodings are
/// chosen from whole-field statistics before anything is written, and must
/// yield exactly `max_doc` items.
///
/// Adding a field number twice is a caller bug and panics. Dropping a
/// consumer without calling [`close`](Self::close) or
/// [`abort`](Self::abort) discards both outputs unfinished.
pub struct DocValuesConsumer {
    data: Box<dyn IndexOutput>,
    meta: Box<dyn IndexOutput>,
    config: DocValuesConfig,
    max_doc: usize,
    fields: HashSet<u32>,
    status: WriteStatus,
}

impl DocValuesConsumer {
    /// Create `<segment>.dvd` and `<segment>.dvm` and write both headers.
    /// If anything fails after the data output was created, it is closed
    /// before the error is returned.
    pub fn create(
        dir: &dyn Directory,
        segment: &str,
        max_doc: usize,
        config: DocValuesConfig,
    ) -> Result<Self> {
        config.validate()?;
        let data = dir.create_output(&format!("{segment}.{DATA_EXTENSION}"))?;
        let meta = match dir.create_output(&format!("{segment}.{META_EXTENSION}")) {
            Ok(meta) => meta,
            Err(e) => {
                close_suppressing(data);
                return Err(e);
            }
        };
        let mut consumer = Self {
            data,
            meta,
            config,
            max_doc,
            fields: HashSet::new(),
            status: WriteStatus::Clean,
        };
        let headers = write_header(&mut consumer.data, DATA_CODEC, VERSION_CURRENT)
            .and_then(|()| write_header(&mut consumer.meta, META_CODEC, VERSION_CURRENT));
        if let Err(e) = headers {
            consumer.abort();
            return Err(e);
        }
        debug!(segment, max_doc, block_size = consumer.config.block_size, "opened doc values consumer");
        Ok(consumer)
    }

    pub fn max_doc(&self) -> usize {
        self.max_doc
    }

    pub fn status(&self) -> WriteStatus {
        self.status
    }

    /// One value per document; `None` is stored as 0.
    pub fn add_numeric_field<I>(&mut self, field: &FieldInfo, values: I) -> Result<()>
    where
        I: Iterator<Item = Option<i64>> + Clone,
    {
        self.write_field(field, |w| w.numeric(field.number, values).map(|_| ()))
    }

    /// One byte string per document; `None` is stored as empty.
    pub fn add_binary_field<I, B>(&mut self, field: &FieldInfo, values: I) -> Result<()>
    where
        I: Iterator<Item = Option<B>> + Clone,
        B: AsRef<[u8]>,
    {
        self.write_field(field, |w| w.binary(field.number, values))
    }

    /// `values` are the field's distinct terms in strictly increasing byte
    /// order; `doc_to_ord` gives each document's term ordinal, or `-1` when
    /// the document has none.
    pub fn add_sorted_field<IV, B, IO>(&mut self, field: &FieldInfo, values: IV, doc_to_ord: IO) -> Result<()>
    where
        IV: Iterator<Item = B> + Clone,
        B: AsRef<[u8]>,
        IO: Iterator<Item = i64> + Clone,
    {
        self.write_field(field, |w| w.sorted(field.number, values, doc_to_ord))
    }

    /// `doc_to_ord_count` gives how many ordinals each document has; `ords`
    /// is every document's ordinals concatenated, strictly increasing within
    /// a document.
    pub fn add_sorted_set_field<IV, B, IC, IO>(
        &mut self,
        field: &FieldInfo,
        values: IV,
        doc_to_ord_count: IC,
        ords: IO,
    ) -> Result<()>
    where
        IV: Iterator<Item = B> + Clone,
        B: AsRef<[u8]>,
        IC: Iterator<Item = u64> + Clone,
        IO: Iterator<Item = u64> + Clone,
    {
        self.write_field(field, |w| w.sorted_set(field.number, values, doc_to_ord_count, ords))
    }

    fn write_field<F>(&mut self, field: &FieldInfo, write: F) -> Result<()>
    where
        F: FnOnce(&mut FieldWriter<'_>) -> Result<()>,
    {
        if self.status == WriteStatus::Failed {
            return Err(Error::Aborted(format!(
                "cannot add field {:?}: an earlier field write failed",
                field.name
            )));
        }
        assert!(
            self.fields.insert(field.number),
            "field {:?} (number {}) was already added",
            field.name,
            field.number
        );

        self.status.begin();
        let mut writer = FieldWriter {
            data: self.data.as_mut(),
            meta: self.meta.as_mut(),
            config: &self.config,
            max_doc: self.max_doc,
        };
        let result = write(&mut writer);
        self.status.settle(&result);
        if let Err(e) = &result {
            debug!(field = %field.name, error = %e, "field write failed");
        }
        result
    }

    /// Finish both streams: end-of-fields marker and footers, then close data
    /// and metadata. A finalize failure is returned as is, with any error from
    /// closing either stream afterwards logged and dropped. A consumer whose
    /// field write failed is only cleaned up and reports [`Error::Aborted`].
    pub fn close(self) -> Result<()> {
        let Self {
            mut data,
            mut meta,
            status,
            fields,
            ..
        } = self;
        if status == WriteStatus::Failed {
            close_suppressing(data);
            close_suppressing(meta);
            return Err(Error::Aborted("doc values consumer closed after a failed field write".into()));
        }

        let finalized = meta
            .write_vint(END_OF_FIELDS)
            .and_then(|()| write_footer(meta.as_mut()))
            .and_then(|()| write_footer(data.as_mut()));
        match finalized {
            Ok(()) => {
                let data_closed = data.close();
                let meta_closed = meta.close();
                debug!(fields = fields.len(), "closed doc values consumer");
                data_closed.and(meta_closed)
            }
            Err(e) => {
                close_suppressing(data);
                close_suppressing(meta);
                Err(e)
            }
        }
    }

    /// Release both outputs without finishing them.
    pub fn abort(self) {
        debug!(data = self.data.name(), meta = self.meta.name(), "aborting doc values consumer");
        close_suppressing(self.data);
        close_suppressing(self.meta);
    }
}

fn close_suppressing(out: Box<dyn IndexOutput>) {
    let name = out.name().to_string();
    if let Err(e) = out.close() {
        warn!(file = %name, error = %e, "suppressed error while closing");
    }
}
