use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use fst::{IntoStreamer, Streamer};
use tracing::debug;

use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::format::{
    check_footer, check_header, checksum_entire_input, DATA_CODEC, DATA_EXTENSION, END_OF_FIELDS,
    META_CODEC, META_EXTENSION, PACKED_VERSION_CURRENT, VERSION_CURRENT, VERSION_START,
};
use crate::packed::{BlockPackedReader, MonotonicBlockPackedReader, PackedFormat, PackedReader};
use crate::store::IndexInput;

use super::{EntryKind, NumericFormat};

/// One metadata record, as listed by [`DocValuesProducer::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    pub field: u32,
    pub kind: EntryKind,
    /// Start of the entry's payload in the data stream.
    pub offset: u64,
    /// Layout of a NUMBER entry.
    pub numeric_format: Option<NumericFormat>,
    /// Value count: documents for NUMBER and BYTES, terms for FST.
    pub count: u64,
}

#[derive(Debug, Clone, Copy)]
struct NumericEntry {
    offset: u64,
    format: NumericFormat,
}

#[derive(Debug, Clone, Copy)]
struct BinaryEntry {
    offset: u64,
    num_bytes: u64,
    min_len: usize,
    max_len: usize,
    block_size: usize,
}

#[derive(Debug, Clone, Copy)]
struct FstEntry {
    offset: u64,
    ord_count: u64,
}

/// Reads the doc values written by a
/// [`DocValuesConsumer`](super::DocValuesConsumer).
///
/// Opening parses and verifies the whole metadata stream. Payloads are
/// decoded on demand from a shared data image; every accessor returns an
/// independent value that can move to another thread.
pub struct DocValuesProducer {
    data: IndexInput,
    max_doc: usize,
    entries: Vec<FieldEntry>,
    numerics: HashMap<u32, NumericEntry>,
    binaries: HashMap<u32, BinaryEntry>,
    fsts: HashMap<u32, FstEntry>,
}

impl DocValuesProducer {
    pub fn open(dir: &dyn Directory, segment: &str, max_doc: usize) -> Result<Self> {
        let mut meta = dir.open_input(&format!("{segment}.{META_EXTENSION}"))?;
        let version = check_header(&mut meta, META_CODEC, VERSION_START, VERSION_CURRENT)?;

        let mut producer = Self {
            data: IndexInput::new("", Bytes::new()),
            max_doc,
            entries: Vec::new(),
            numerics: HashMap::new(),
            binaries: HashMap::new(),
            fsts: HashMap::new(),
        };
        producer.read_fields(&mut meta)?;
        check_footer(&meta)?;

        let mut data = dir.open_input(&format!("{segment}.{DATA_EXTENSION}"))?;
        let data_version = check_header(&mut data, DATA_CODEC, VERSION_START, VERSION_CURRENT)?;
        if data_version != version {
            return Err(Error::corrupt(format!(
                "format versions differ: meta={version}, data={data_version}"
            )));
        }
        producer.data = data;
        debug!(segment, entries = producer.entries.len(), "opened doc values producer");
        Ok(producer)
    }

    fn read_fields(&mut self, meta: &mut IndexInput) -> Result<()> {
        loop {
            let field = meta.read_vint()?;
            if field == END_OF_FIELDS {
                return Ok(());
            }
            if field < 0 {
                return Err(Error::corrupt(format!("invalid field number {field} in {}", meta.name())));
            }
            let field = field as u32;
            let tag = meta.read_byte()?;
            let kind = EntryKind::from_u8(tag)
                .ok_or_else(|| Error::corrupt(format!("invalid entry kind {tag} for field {field}")))?;
            let offset = read_offset(meta)?;
            let entry = match kind {
                EntryKind::Number => {
                    let tag = meta.read_byte()?;
                    let format = NumericFormat::from_u8(tag).ok_or_else(|| {
                        Error::corrupt(format!("invalid numeric format {tag} for field {field}"))
                    })?;
                    if format != NumericFormat::Uncompressed {
                        check_packed_version(meta.read_vint()?)?;
                    }
                    let dup = self.numerics.insert(field, NumericEntry { offset, format });
                    (dup.is_some(), Some(format), self.max_doc as u64)
                }
                EntryKind::Bytes => {
                    let num_bytes = read_offset(meta)?;
                    let min_len = read_len(meta)?;
                    let max_len = read_len(meta)?;
                    let block_size = if min_len != max_len {
                        check_packed_version(meta.read_vint()?)?;
                        read_len(meta)?
                    } else {
                        0
                    };
                    let entry = BinaryEntry {
                        offset,
                        num_bytes,
                        min_len,
                        max_len,
                        block_size,
                    };
                    (self.binaries.insert(field, entry).is_some(), None, self.max_doc as u64)
                }
                EntryKind::Fst => {
                    let ord_count = meta.read_vlong()?;
                    let dup = self.fsts.insert(field, FstEntry { offset, ord_count });
                    (dup.is_some(), None, ord_count)
                }
            };
            let (duplicate, numeric_format, count) = entry;
            if duplicate {
                return Err(Error::corrupt(format!(
                    "duplicate {} entry for field {field}",
                    kind.name()
                )));
            }
            self.entries.push(FieldEntry {
                field,
                kind,
                offset,
                numeric_format,
                count,
            });
        }
    }

    pub fn max_doc(&self) -> usize {
        self.max_doc
    }

    /// Metadata records in the order they were written.
    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    /// Verify the checksum footer of the data stream.
    pub fn check_integrity(&self) -> Result<u64> {
        checksum_entire_input(&self.data)
    }

    fn seek_to(&self, offset: u64) -> Result<IndexInput> {
        let mut input = self.data.clone();
        input.seek(offset)?;
        Ok(input)
    }

    pub fn numeric(&self, field: u32) -> Result<NumericDocValues> {
        let entry = *self
            .numerics
            .get(&field)
            .ok_or_else(|| Error::invalid(format!("field {field} has no numeric entry")))?;
        let mut input = self.seek_to(entry.offset)?;
        NumericDocValues::read(&mut input, entry.format, self.max_doc)
    }

    pub fn binary(&self, field: u32) -> Result<BinaryDocValues> {
        let entry = *self
            .binaries
            .get(&field)
            .ok_or_else(|| Error::invalid(format!("field {field} has no binary entry")))?;
        BinaryDocValues::read(&self.data, entry, self.max_doc)
    }

    fn terms(&self, field: u32) -> Result<(fst::Map<Bytes>, u64)> {
        let entry = *self
            .fsts
            .get(&field)
            .ok_or_else(|| Error::invalid(format!("field {field} has no term dictionary")))?;
        let mut input = self.seek_to(entry.offset)?;
        let len = input.read_vlong()?;
        let raw = input.read_slice(len as usize)?;
        let map = fst::Map::new(raw)?;
        if map.len() as u64 != entry.ord_count {
            return Err(Error::corrupt(format!(
                "field {field}: dictionary holds {} terms, metadata says {}",
                map.len(),
                entry.ord_count
            )));
        }
        Ok((map, entry.ord_count))
    }

    pub fn sorted(&self, field: u32) -> Result<SortedDocValues> {
        let (terms, value_count) = self.terms(field)?;
        let ords = self.numeric(field)?;
        for doc in 0..self.max_doc {
            let ord = ords.get(doc);
            if ord < 0 || (ord as u64) >= value_count {
                return Err(Error::corrupt(format!(
                    "field {field}: document {doc} has ordinal {ord} with {value_count} terms"
                )));
            }
        }
        Ok(SortedDocValues {
            ords,
            terms: TermDictionary {
                map: Arc::new(terms),
                value_count,
            },
        })
    }

    pub fn sorted_set(&self, field: u32) -> Result<SortedSetDocValues> {
        let (terms, value_count) = self.terms(field)?;
        Ok(SortedSetDocValues {
            payloads: self.binary(field)?,
            counts: self.numeric(field)?,
            terms: TermDictionary {
                map: Arc::new(terms),
                value_count,
            },
        })
    }
}

fn read_offset(meta: &mut IndexInput) -> Result<u64> {
    let v = meta.read_long()?;
    if v < 0 {
        return Err(Error::corrupt(format!("negative offset {v} in {}", meta.name())));
    }
    Ok(v as u64)
}

fn read_len(meta: &mut IndexInput) -> Result<usize> {
    let v = meta.read_vint()?;
    if v < 0 {
        return Err(Error::corrupt(format!("negative length {v} in {}", meta.name())));
    }
    Ok(v as usize)
}

fn check_packed_version(version: i32) -> Result<()> {
    if version != PACKED_VERSION_CURRENT {
        return Err(Error::corrupt(format!("unsupported packed version {version}")));
    }
    Ok(())
}

// ── Numeric ────────────────────────────────────────────────────────────────

/// Decoded NUMBER entry.
#[derive(Debug, Clone)]
pub enum NumericDocValues {
    Uncompressed(Bytes),
    Table { table: Vec<i64>, ords: PackedReader },
    Gcd { min: i64, gcd: i64, quotients: BlockPackedReader },
    Delta(BlockPackedReader),
}

impl NumericDocValues {
    fn read(input: &mut IndexInput, format: NumericFormat, max_doc: usize) -> Result<Self> {
        Ok(match format {
            NumericFormat::Uncompressed => Self::Uncompressed(input.read_slice(max_doc)?),
            NumericFormat::Table => {
                let size = input.read_vint()?;
                if !(0..=crate::format::MAX_TABLE_SIZE as i32).contains(&size) {
                    return Err(Error::corrupt(format!("invalid table size {size}")));
                }
                let table = (0..size).map(|_| input.read_long()).collect::<Result<Vec<_>>>()?;
                let format_id = input.read_vint()?;
                PackedFormat::by_id(format_id)
                    .ok_or_else(|| Error::corrupt(format!("unknown packed format {format_id}")))?;
                let bits = input.read_vint()?;
                let ords = PackedReader::read(input, max_doc, bits as u32)?;
                if let Some(doc) = (0..max_doc).find(|&doc| ords.get(doc) >= table.len() as u64) {
                    return Err(Error::corrupt(format!(
                        "document {doc} points past a table of {} values",
                        table.len()
                    )));
                }
                Self::Table { table, ords }
            }
            NumericFormat::Gcd => {
                let min = input.read_long()?;
                let gcd = input.read_long()?;
                let block_size = read_len(input)?;
                Self::Gcd {
                    min,
                    gcd,
                    quotients: BlockPackedReader::read(input, block_size, max_doc)?,
                }
            }
            NumericFormat::Delta => {
                let block_size = read_len(input)?;
                Self::Delta(BlockPackedReader::read(input, block_size, max_doc)?)
            }
        })
    }

    pub fn format(&self) -> NumericFormat {
        match self {
            Self::Uncompressed(_) => NumericFormat::Uncompressed,
            Self::Table { .. } => NumericFormat::Table,
            Self::Gcd { .. } => NumericFormat::Gcd,
            Self::Delta(_) => NumericFormat::Delta,
        }
    }

    /// Value of `doc`, which must be below the segment's `max_doc`.
    pub fn get(&self, doc: usize) -> i64 {
        match self {
            Self::Uncompressed(bytes) => bytes[doc] as i8 as i64,
            Self::Table { table, ords } => table[ords.get(doc) as usize],
            Self::Gcd { min, gcd, quotients } => {
                min.wrapping_add(quotients.get(doc).wrapping_mul(*gcd))
            }
            Self::Delta(values) => values.get(doc),
        }
    }
}

// ── Binary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Addressing {
    Fixed(usize),
    Variable(MonotonicBlockPackedReader),
}

/// Decoded BYTES entry.
#[derive(Debug, Clone)]
pub struct BinaryDocValues {
    bytes: Bytes,
    addressing: Addressing,
}

impl BinaryDocValues {
    fn read(data: &IndexInput, entry: BinaryEntry, max_doc: usize) -> Result<Self> {
        let mut input = data.clone();
        input.seek(entry.offset)?;
        let bytes = input.read_slice(entry.num_bytes as usize)?;
        let addressing = if entry.min_len == entry.max_len {
            if (entry.min_len as u64).checked_mul(max_doc as u64) != Some(entry.num_bytes) {
                return Err(Error::corrupt(format!(
                    "{} bytes cannot hold {max_doc} values of {} bytes",
                    entry.num_bytes, entry.min_len
                )));
            }
            Addressing::Fixed(entry.min_len)
        } else {
            let addresses = MonotonicBlockPackedReader::read(&mut input, entry.block_size, max_doc)?;
            let mut prev = 0;
            for doc in 0..max_doc {
                let end = addresses.get(doc);
                if end < prev || (end as u64) > entry.num_bytes {
                    return Err(Error::corrupt(format!("address of document {doc} out of order: {end}")));
                }
                prev = end;
            }
            if prev as u64 != entry.num_bytes {
                return Err(Error::corrupt(format!(
                    "addresses end at {prev}, payload holds {} bytes",
                    entry.num_bytes
                )));
            }
            Addressing::Variable(addresses)
        };
        Ok(Self { bytes, addressing })
    }

    /// End offset of `doc` in the concatenated payload.
    pub fn end_address(&self, doc: usize) -> u64 {
        match &self.addressing {
            Addressing::Fixed(len) => ((doc + 1) * len) as u64,
            Addressing::Variable(addresses) => addresses.get(doc) as u64,
        }
    }

    pub fn is_fixed_length(&self) -> bool {
        matches!(self.addressing, Addressing::Fixed(_))
    }

    fn range(&self, doc: usize) -> (usize, usize) {
        match &self.addressing {
            Addressing::Fixed(len) => (doc * len, (doc + 1) * len),
            Addressing::Variable(addresses) => {
                let start = if doc == 0 { 0 } else { addresses.get(doc - 1) };
                (start as usize, addresses.get(doc) as usize)
            }
        }
    }

    pub fn get(&self, doc: usize) -> &[u8] {
        let (start, end) = self.range(doc);
        &self.bytes[start..end]
    }

    /// Zero-copy handle on the value of `doc`.
    pub fn get_bytes(&self, doc: usize) -> Bytes {
        let (start, end) = self.range(doc);
        self.bytes.slice(start..end)
    }
}

// ── Sorted ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct TermDictionary {
    map: Arc<fst::Map<Bytes>>,
    value_count: u64,
}

impl TermDictionary {
    /// Ordinals follow key order, so `ord` names the `ord`-th key.
    fn lookup_ord(&self, ord: u64) -> Option<Vec<u8>> {
        if ord >= self.value_count {
            return None;
        }
        let mut stream = self.map.stream();
        let mut i = 0;
        while let Some((key, _)) = stream.next() {
            if i == ord {
                return Some(key.to_vec());
            }
            i += 1;
        }
        None
    }

    fn lookup_term(&self, key: &[u8]) -> std::result::Result<u64, u64> {
        if let Some(ord) = self.map.get(key) {
            return Ok(ord);
        }
        let mut below = self.map.range().lt(key).into_stream();
        let mut insertion = 0;
        while below.next().is_some() {
            insertion += 1;
        }
        Err(insertion)
    }
}

/// Decoded sorted field: one ordinal per document plus the term dictionary.
#[derive(Clone)]
pub struct SortedDocValues {
    ords: NumericDocValues,
    terms: TermDictionary,
}

impl SortedDocValues {
    pub fn ord(&self, doc: usize) -> u64 {
        self.ords.get(doc) as u64
    }

    /// Term bytes of `ord`.
    pub fn lookup_ord(&self, ord: u64) -> Option<Vec<u8>> {
        self.terms.lookup_ord(ord)
    }

    /// `Ok(ord)` when `key` is a term, otherwise `Err` with the ordinal it
    /// would be inserted at.
    pub fn lookup_term(&self, key: &[u8]) -> std::result::Result<u64, u64> {
        self.terms.lookup_term(key)
    }

    pub fn value_count(&self) -> u64 {
        self.terms.value_count
    }

    pub fn get(&self, doc: usize) -> Option<Vec<u8>> {
        self.lookup_ord(self.ord(doc))
    }
}

/// Decoded sorted-set field.
#[derive(Clone)]
pub struct SortedSetDocValues {
    payloads: BinaryDocValues,
    counts: NumericDocValues,
    terms: TermDictionary,
}

impl SortedSetDocValues {
    /// Ordinals of `doc`, ascending.
    pub fn ords(&self, doc: usize) -> Result<Vec<u64>> {
        let count = self.counts.get(doc);
        if count < 0 {
            return Err(Error::corrupt(format!("document {doc} has {count} ordinals")));
        }
        let mut payload = IndexInput::new("ords", self.payloads.get_bytes(doc));
        let mut ords = Vec::with_capacity(count as usize);
        let mut ord = 0u64;
        for _ in 0..count {
            ord = ord
                .checked_add(payload.read_vlong()?)
                .filter(|&o| o < self.terms.value_count)
                .ok_or_else(|| Error::corrupt(format!("document {doc} has an ordinal past the dictionary")))?;
            ords.push(ord);
        }
        Ok(ords)
    }

    pub fn lookup_ord(&self, ord: u64) -> Option<Vec<u8>> {
        self.terms.lookup_ord(ord)
    }

    pub fn lookup_term(&self, key: &[u8]) -> std::result::Result<u64, u64> {
        self.terms.lookup_term(key)
    }

    pub fn value_count(&self) -> u64 {
        self.terms.value_count
    }
}
