use std::io::Write;

use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{push_vlong, DataOutput};

use super::consumer::FieldWriter;
use super::EntryKind;

/// How documents without a value (ordinal `-1`) are folded into the stored
/// ordinal space, which has no missing marker of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdRemap {
    /// No document is missing a value; ordinals are stored as given.
    Identity,
    /// The first term is already the empty string, so missing documents
    /// take ordinal 0 and nothing else moves.
    MissingToFirst,
    /// An empty term is inserted at ordinal 0 and every real ordinal moves
    /// up by one; missing documents land on the new term.
    ShiftForEmpty,
}

impl OrdRemap {
    pub fn detect(has_missing: bool, first_term_empty: bool) -> Self {
        match (has_missing, first_term_empty) {
            (false, _) => Self::Identity,
            (true, true) => Self::MissingToFirst,
            (true, false) => Self::ShiftForEmpty,
        }
    }

    #[inline]
    pub fn apply(self, ord: i64) -> i64 {
        match self {
            Self::Identity => ord,
            Self::MissingToFirst => ord.max(0),
            Self::ShiftForEmpty => ord + 1,
        }
    }

    pub fn inserts_empty_term(self) -> bool {
        self == Self::ShiftForEmpty
    }
}

/// Per-document sorted-set payloads: each document's ordinals as vlong
/// deltas from the previous ordinal (the first from 0).
#[derive(Clone)]
struct OrdPayloads<C, O> {
    counts: C,
    ords: O,
}

impl<C, O> Iterator for OrdPayloads<C, O>
where
    C: Iterator<Item = u64>,
    O: Iterator<Item = u64>,
{
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let count = self.counts.next()?;
        let mut payload = Vec::new();
        let mut last = 0;
        for ord in self.ords.by_ref().take(count as usize) {
            push_vlong(&mut payload, ord - last);
            last = ord;
        }
        Some(payload)
    }
}

impl FieldWriter<'_> {
    /// Write an FST entry mapping each term to its position. Terms must be
    /// strictly increasing in byte order.
    pub(super) fn terms<I, B>(&mut self, field: u32, terms: I, insert_empty: bool) -> Result<u64>
    where
        I: Iterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut builder = fst::MapBuilder::memory();
        let mut ord = 0u64;
        if insert_empty {
            builder.insert(b"", ord)?;
            ord += 1;
        }
        for term in terms {
            builder.insert(term.as_ref(), ord).map_err(|e| {
                Error::invalid(format!("field {field}: term {ord} is not in sorted order: {e}"))
            })?;
            ord += 1;
        }
        let fst = builder.into_inner()?;

        self.meta.write_vint(field as i32)?;
        self.meta.write_byte(EntryKind::Fst as u8)?;
        self.meta.write_long(self.data.file_pointer() as i64)?;
        self.meta.write_vlong(ord)?;
        self.data.write_vlong(fst.len() as u64)?;
        self.data.write_all(&fst)?;

        debug!(field, terms = ord, fst_bytes = fst.len(), "wrote term dictionary");
        Ok(ord)
    }

    /// Ordinals of a sorted field, then its dictionary. `-1` marks a
    /// document without a value.
    pub(super) fn sorted<IV, B, IO>(&mut self, field: u32, values: IV, doc_to_ord: IO) -> Result<()>
    where
        IV: Iterator<Item = B> + Clone,
        B: AsRef<[u8]>,
        IO: Iterator<Item = i64> + Clone,
    {
        let value_count = values.clone().count() as i64;
        let mut has_missing = false;
        for (doc, ord) in doc_to_ord.clone().enumerate() {
            if ord == -1 {
                has_missing = true;
            } else if !(0..value_count).contains(&ord) {
                return Err(Error::invalid(format!(
                    "field {field}: document {doc} has ordinal {ord} with {value_count} terms"
                )));
            }
        }
        let first_term_empty = values.clone().next().is_some_and(|t| t.as_ref().is_empty());
        let remap = OrdRemap::detect(has_missing, first_term_empty);
        debug!(field, ?remap, value_count, "sorted ordinal mapping");

        self.numeric(field, doc_to_ord.map(move |ord| Some(remap.apply(ord))))?;
        self.terms(field, values, remap.inserts_empty_term())?;
        Ok(())
    }

    /// Ordinal payloads as a binary entry, per-document counts as a numeric
    /// entry, then the dictionary.
    pub(super) fn sorted_set<IV, B, IC, IO>(
        &mut self,
        field: u32,
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
        let value_count = values.clone().count() as u64;
        let mut remaining = ords.clone();
        for (doc, count) in doc_to_ord_count.clone().enumerate() {
            let mut last = None;
            for _ in 0..count {
                let ord = remaining.next().ok_or_else(|| {
                    Error::invalid(format!("field {field}: ordinals run out at document {doc}"))
                })?;
                if ord >= value_count {
                    return Err(Error::invalid(format!(
                        "field {field}: document {doc} has ordinal {ord} with {value_count} terms"
                    )));
                }
                if last.is_some_and(|last| ord <= last) {
                    return Err(Error::invalid(format!(
                        "field {field}: ordinals of document {doc} are not strictly increasing"
                    )));
                }
                last = Some(ord);
            }
        }
        if remaining.next().is_some() {
            return Err(Error::invalid(format!(
                "field {field}: more ordinals than the per-document counts cover"
            )));
        }

        let payloads = OrdPayloads {
            counts: doc_to_ord_count.clone(),
            ords,
        };
        self.binary(field, payloads.map(Some))?;
        self.numeric(field, doc_to_ord_count.map(|count| Some(count as i64)))?;
        self.terms(field, values, false)?;
        Ok(())
    }
}
