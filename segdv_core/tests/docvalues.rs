/// Integration tests for the doc-values consumer and producer: encoding
/// selection for numeric fields, binary addressing, sorted ordinal remapping,
/// sorted sets, and error containment when streams fail.
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use segdv_core::format::META_EXTENSION;
use segdv_core::{
    Directory, DocValuesConfig, DocValuesConsumer, DocValuesProducer, EntryKind, Error, FieldInfo,
    FsDirectory, IndexInput, IndexOutput, NumericFormat, RamDirectory, Result, WriteStatus,
};

fn lcg(seed: &mut u64) -> u64 {
    *seed = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *seed
}

fn config(block_size: usize) -> DocValuesConfig {
    DocValuesConfig {
        block_size,
        ..Default::default()
    }
}

fn numeric_round_trip(values: &[Option<i64>], block_size: usize) -> NumericFormat {
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", values.len(), config(block_size)).unwrap();
    consumer.add_numeric_field(&FieldInfo::new("n", 0), values.iter().copied()).unwrap();
    consumer.close().unwrap();

    let producer = DocValuesProducer::open(&dir, "seg", values.len()).unwrap();
    producer.check_integrity().unwrap();
    let numeric = producer.numeric(0).unwrap();
    for (doc, v) in values.iter().enumerate() {
        assert_eq!(numeric.get(doc), v.unwrap_or(0), "doc {doc}");
    }
    numeric.format()
}

// ── numeric ───────────────────────────────────────────────────────────────

#[test]
fn test_numeric_few_distinct_values_use_table() {
    let values: Vec<Option<i64>> = (0..500)
        .map(|i| if i % 13 == 0 { None } else { Some(1000 * (i % 10)) })
        .collect();
    assert_eq!(numeric_round_trip(&values, 64), NumericFormat::Table);
}

#[test]
fn test_numeric_signed_bytes_stored_uncompressed() {
    let values: Vec<Option<i64>> = (0..1000)
        .map(|i| if i % 17 == 0 { None } else { Some((i % 200) - 100) })
        .collect();
    assert_eq!(numeric_round_trip(&values, 64), NumericFormat::Uncompressed);
}

#[test]
fn test_numeric_multiples_of_seven_use_gcd() {
    let values: Vec<Option<i64>> = (0..3000)
        .map(|i| if i % 50 == 0 { None } else { Some(i * 7 - 7000) })
        .collect();
    assert_eq!(numeric_round_trip(&values, 128), NumericFormat::Gcd);
}

#[test]
fn test_numeric_unconstrained_values_use_delta() {
    let mut seed = 17;
    let values: Vec<Option<i64>> = (0..2500)
        .map(|i| if i % 31 == 0 { None } else { Some(lcg(&mut seed) as i64 >> (i % 40)) })
        .collect();
    assert_eq!(numeric_round_trip(&values, 256), NumericFormat::Delta);
}

#[test]
fn test_numeric_extremes() {
    let few: Vec<Option<i64>> = (0..300)
        .map(|i| Some([i64::MIN, i64::MAX, 0, -1, 1][i % 5]))
        .collect();
    assert_eq!(numeric_round_trip(&few, 64), NumericFormat::Table);

    let many: Vec<Option<i64>> = (0..1000)
        .map(|i| Some(if i % 2 == 0 { i64::MIN + i } else { i64::MAX - i }))
        .collect();
    assert_eq!(numeric_round_trip(&many, 64), NumericFormat::Delta);
}

#[test]
fn test_numeric_empty_segment() {
    assert_eq!(numeric_round_trip(&[], 64), NumericFormat::Table);
}

#[test]
fn test_value_count_must_match_max_doc() {
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 10, DocValuesConfig::default()).unwrap();
    let err = consumer
        .add_numeric_field(&FieldInfo::new("n", 0), (0..9).map(Some))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
}

// ── binary ────────────────────────────────────────────────────────────────

#[test]
fn test_binary_fixed_length() {
    let values: Vec<Vec<u8>> = (0..300u64).map(|i| (i * 31).to_be_bytes().to_vec()).collect();
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", values.len(), config(64)).unwrap();
    consumer
        .add_binary_field(&FieldInfo::new("b", 4), values.iter().map(|v| Some(v.as_slice())))
        .unwrap();
    consumer.close().unwrap();

    let producer = DocValuesProducer::open(&dir, "seg", values.len()).unwrap();
    let binary = producer.binary(4).unwrap();
    assert!(binary.is_fixed_length());
    for (doc, v) in values.iter().enumerate() {
        assert_eq!(binary.get(doc), v.as_slice());
    }
}

#[test]
fn test_binary_variable_addresses() {
    let mut seed = 5;
    let values: Vec<Option<Vec<u8>>> = (0..1000)
        .map(|i| {
            let len = (lcg(&mut seed) % 50) as usize;
            (i % 9 != 0).then(|| (0..len).map(|j| (i + j) as u8).collect())
        })
        .collect();
    let concat: Vec<u8> = values.iter().flatten().flatten().copied().collect();

    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", values.len(), config(128)).unwrap();
    consumer
        .add_binary_field(&FieldInfo::new("b", 1), values.iter().map(|v| v.as_deref()))
        .unwrap();
    consumer.close().unwrap();

    let producer = DocValuesProducer::open(&dir, "seg", values.len()).unwrap();
    let binary = producer.binary(1).unwrap();
    assert!(!binary.is_fixed_length());
    let mut prev = 0u64;
    for (doc, v) in values.iter().enumerate() {
        let end = binary.end_address(doc);
        assert!(end >= prev, "address of doc {doc} went backwards");
        assert_eq!(binary.get(doc), &concat[prev as usize..end as usize]);
        assert_eq!(binary.get(doc), v.as_deref().unwrap_or_default());
        prev = end;
    }
    assert_eq!(prev, concat.len() as u64);
}

#[test]
fn test_binary_oversized_value_aborts_consumer() {
    let dir = RamDirectory::new();
    let values = [Some(vec![1u8; 10]), Some(vec![2u8; 32_767]), None];
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 3, DocValuesConfig::default()).unwrap();
    let err = consumer
        .add_binary_field(&FieldInfo::new("b", 0), values.iter().map(|v| v.as_deref()))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    assert_eq!(consumer.status(), WriteStatus::Failed);

    let err = consumer
        .add_numeric_field(&FieldInfo::new("n", 1), [Some(1), Some(2), Some(3)].into_iter())
        .unwrap_err();
    assert!(matches!(err, Error::Aborted(_)), "{err}");
    assert!(matches!(consumer.close(), Err(Error::Aborted(_))));
}

#[test]
fn test_binary_limit_follows_config() {
    let dir = RamDirectory::new();
    let cfg = DocValuesConfig {
        max_binary_length: 4,
        ..Default::default()
    };
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 2, cfg).unwrap();
    let values = [Some(&b"abcd"[..]), Some(&b"abcde"[..])];
    assert!(consumer
        .add_binary_field(&FieldInfo::new("b", 0), values.iter().copied())
        .is_err());
}

// ── sorted ────────────────────────────────────────────────────────────────

fn sorted_round_trip(terms: &[&str], ords: &[i64]) -> (Vec<String>, Vec<u64>) {
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", ords.len(), DocValuesConfig::default()).unwrap();
    consumer
        .add_sorted_field(&FieldInfo::new("s", 2), terms.iter(), ords.iter().copied())
        .unwrap();
    consumer.close().unwrap();

    let producer = DocValuesProducer::open(&dir, "seg", ords.len()).unwrap();
    let sorted = producer.sorted(2).unwrap();
    let stored_terms = (0..sorted.value_count())
        .map(|ord| String::from_utf8(sorted.lookup_ord(ord).unwrap()).unwrap())
        .collect();
    let stored_ords = (0..ords.len()).map(|doc| sorted.ord(doc)).collect();
    (stored_terms, stored_ords)
}

#[test]
fn test_sorted_missing_with_empty_first_term() {
    let (terms, ords) = sorted_round_trip(&["", "b"], &[-1, 0, 1]);
    assert_eq!(terms, vec!["", "b"]);
    assert_eq!(ords, vec![0, 0, 1]);
}

#[test]
fn test_sorted_missing_inserts_empty_term() {
    let (terms, ords) = sorted_round_trip(&["a", "b"], &[-1, 0, 1]);
    assert_eq!(terms, vec!["", "a", "b"]);
    assert_eq!(ords, vec![0, 1, 2]);
}

#[test]
fn test_sorted_without_missing_is_unchanged() {
    let (terms, ords) = sorted_round_trip(&["a", "b", "c"], &[2, 0, 1, 1]);
    assert_eq!(terms, vec!["a", "b", "c"]);
    assert_eq!(ords, vec![2, 0, 1, 1]);
}

#[test]
fn test_sorted_term_lookup() {
    let dir = RamDirectory::new();
    let terms = ["apple", "banana", "cherry"];
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 4, DocValuesConfig::default()).unwrap();
    consumer
        .add_sorted_field(&FieldInfo::new("s", 0), terms.iter(), [1i64, -1, 2, 0].into_iter())
        .unwrap();
    consumer.close().unwrap();

    let sorted = DocValuesProducer::open(&dir, "seg", 4).unwrap().sorted(0).unwrap();
    assert_eq!(sorted.value_count(), 4);
    assert_eq!(sorted.lookup_term(b""), Ok(0));
    assert_eq!(sorted.lookup_term(b"banana"), Ok(2));
    assert_eq!(sorted.lookup_term(b"blueberry"), Err(3));
    assert_eq!(sorted.lookup_term(b"zucchini"), Err(4));
    assert_eq!(sorted.get(1), Some(Vec::new()));
    assert_eq!(sorted.get(2), Some(b"cherry".to_vec()));
    assert_eq!(sorted.lookup_ord(4), None);
}

#[test]
fn test_sorted_rejects_unsorted_terms() {
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 2, DocValuesConfig::default()).unwrap();
    let err = consumer
        .add_sorted_field(&FieldInfo::new("s", 0), ["b", "a"].iter(), [0i64, 1].into_iter())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
}

#[test]
fn test_sorted_rejects_ordinal_out_of_range() {
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 2, DocValuesConfig::default()).unwrap();
    let err = consumer
        .add_sorted_field(&FieldInfo::new("s", 0), ["a"].iter(), [0i64, 1].into_iter())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
}

// ── sorted set ────────────────────────────────────────────────────────────

#[test]
fn test_sorted_set_round_trip() {
    let dir = RamDirectory::new();
    let terms = ["apple", "banana", "cherry", "date"];
    let counts = [2u64, 0, 3, 1];
    let ords = [0u64, 2, 1, 2, 3, 3];
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 4, DocValuesConfig::default()).unwrap();
    consumer
        .add_sorted_set_field(
            &FieldInfo::new("ss", 3),
            terms.iter(),
            counts.iter().copied(),
            ords.iter().copied(),
        )
        .unwrap();
    consumer.close().unwrap();

    let producer = DocValuesProducer::open(&dir, "seg", 4).unwrap();
    let kinds: Vec<EntryKind> = producer.entries().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EntryKind::Bytes, EntryKind::Number, EntryKind::Fst]);

    let set = producer.sorted_set(3).unwrap();
    assert_eq!(set.value_count(), 4);
    assert_eq!(set.ords(0).unwrap(), vec![0, 2]);
    assert!(set.ords(1).unwrap().is_empty());
    assert_eq!(set.ords(2).unwrap(), vec![1, 2, 3]);
    assert_eq!(set.ords(3).unwrap(), vec![3]);
    assert_eq!(set.lookup_ord(2), Some(b"cherry".to_vec()));
    assert_eq!(set.lookup_term(b"date"), Ok(3));
}

#[test]
fn test_sorted_set_rejects_unsorted_document() {
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 1, DocValuesConfig::default()).unwrap();
    let err = consumer
        .add_sorted_set_field(
            &FieldInfo::new("ss", 0),
            ["a", "b"].iter(),
            [2u64].into_iter(),
            [1u64, 0].into_iter(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
}

// ── whole segment ─────────────────────────────────────────────────────────

#[test]
fn test_segment_with_every_field_kind() {
    let max_doc = 300;
    let root = std::env::temp_dir().join(format!("segdv_docvalues_{}", std::process::id()));
    let dir = FsDirectory::open(&root).unwrap();

    let mut consumer = DocValuesConsumer::create(&dir, "_0", max_doc, config(64)).unwrap();
    consumer
        .add_numeric_field(&FieldInfo::new("price", 0), (0..max_doc as i64).map(|i| Some(i * 100)))
        .unwrap();
    let names: Vec<String> = (0..max_doc).map(|i| format!("name-{i}")).collect();
    consumer
        .add_binary_field(&FieldInfo::new("name", 1), names.iter().map(|n| Some(n.as_bytes())))
        .unwrap();
    consumer
        .add_sorted_field(
            &FieldInfo::new("color", 2),
            ["blue", "green", "red"].iter(),
            (0..max_doc as i64).map(|i| i % 4 - 1),
        )
        .unwrap();
    let tag_ords: Vec<Vec<u64>> = (0..max_doc)
        .map(|i| match i % 3 {
            0 => vec![],
            1 => vec![1],
            _ => vec![0, 1],
        })
        .collect();
    consumer
        .add_sorted_set_field(
            &FieldInfo::new("tags", 3),
            ["x", "y"].iter(),
            tag_ords.iter().map(|ords| ords.len() as u64),
            tag_ords.iter().flatten().copied(),
        )
        .unwrap();
    consumer.close().unwrap();

    let producer = DocValuesProducer::open(&dir, "_0", max_doc).unwrap();
    producer.check_integrity().unwrap();
    let fields: Vec<(u32, EntryKind)> = producer.entries().iter().map(|e| (e.field, e.kind)).collect();
    assert_eq!(
        fields,
        vec![
            (0, EntryKind::Number),
            (1, EntryKind::Bytes),
            (2, EntryKind::Number),
            (2, EntryKind::Fst),
            (3, EntryKind::Bytes),
            (3, EntryKind::Number),
            (3, EntryKind::Fst),
        ]
    );
    assert_eq!(producer.numeric(0).unwrap().format(), NumericFormat::Gcd);
    assert_eq!(producer.binary(1).unwrap().get(42), b"name-42");
    let color = producer.sorted(2).unwrap();
    assert_eq!(color.get(0), Some(Vec::new()));
    assert_eq!(color.get(3), Some(b"red".to_vec()));
    let tags = producer.sorted_set(3).unwrap();
    assert_eq!(tags.ords(0).unwrap(), Vec::<u64>::new());
    assert_eq!(tags.ords(1).unwrap(), vec![1]);
    assert_eq!(tags.ords(2).unwrap(), vec![0, 1]);
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_tampered_data_fails_integrity_check() {
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 100, DocValuesConfig::default()).unwrap();
    consumer
        .add_numeric_field(&FieldInfo::new("n", 0), (0..100).map(Some))
        .unwrap();
    consumer.close().unwrap();

    let copy = RamDirectory::new();
    for name in dir.file_names() {
        let mut raw = dir.open_input(&name).unwrap().bytes().to_vec();
        if name.ends_with(".dvd") {
            let mid = raw.len() / 2;
            raw[mid] ^= 0x55;
        }
        let mut out = copy.create_output(&name).unwrap();
        out.write_all(&raw).unwrap();
        out.close().unwrap();
    }
    let producer = DocValuesProducer::open(&copy, "seg", 100).unwrap();
    assert!(matches!(producer.check_integrity(), Err(Error::Corrupt(_))));
}

#[test]
#[should_panic(expected = "already added")]
fn test_adding_field_twice_panics() {
    let dir = RamDirectory::new();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 1, DocValuesConfig::default()).unwrap();
    let field = FieldInfo::new("n", 0);
    consumer.add_numeric_field(&field, [Some(1)].into_iter()).unwrap();
    let _ = consumer.add_numeric_field(&field, [Some(2)].into_iter());
}

// ── failure containment ───────────────────────────────────────────────────

#[derive(Default)]
struct Faults {
    fail_meta_create: bool,
    fail_meta_writes: bool,
    fail_meta_close: bool,
    fail_data_close: bool,
    /// Names of outputs whose close was attempted, in order.
    closed: Vec<String>,
}

/// Wraps a [`RamDirectory`] and fails chosen operations on the metadata or
/// data stream.
#[derive(Clone, Default)]
struct FaultyDirectory {
    inner: RamDirectory,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyDirectory {
    fn set(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.faults.lock().unwrap());
    }

    fn closed(&self) -> Vec<String> {
        self.faults.lock().unwrap().closed.clone()
    }
}

impl Directory for FaultyDirectory {
    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        if name.ends_with(META_EXTENSION) && self.faults.lock().unwrap().fail_meta_create {
            return Err(Error::Io(io::Error::other(format!("injected create failure on {name}"))));
        }
        Ok(Box::new(FaultyOutput {
            inner: self.inner.create_output(name)?,
            faults: self.faults.clone(),
        }))
    }

    fn open_input(&self, name: &str) -> Result<IndexInput> {
        self.inner.open_input(name)
    }
}

struct FaultyOutput {
    inner: Box<dyn IndexOutput>,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyOutput {
    fn is_meta(&self) -> bool {
        self.inner.name().ends_with(META_EXTENSION)
    }
}

impl Write for FaultyOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_meta() && self.faults.lock().unwrap().fail_meta_writes {
            return Err(io::Error::other("injected write failure on metadata"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl IndexOutput for FaultyOutput {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn file_pointer(&self) -> u64 {
        self.inner.file_pointer()
    }

    fn checksum(&self) -> u64 {
        self.inner.checksum()
    }

    fn close(self: Box<Self>) -> Result<()> {
        let name = self.inner.name().to_string();
        let fail = {
            let mut faults = self.faults.lock().unwrap();
            faults.closed.push(name.clone());
            if self.is_meta() {
                faults.fail_meta_close
            } else {
                faults.fail_data_close
            }
        };
        self.inner.close()?;
        if fail {
            return Err(Error::Io(io::Error::other(format!("injected close failure on {name}"))));
        }
        Ok(())
    }
}

fn one_field_consumer(dir: &FaultyDirectory) -> DocValuesConsumer {
    let mut consumer = DocValuesConsumer::create(dir, "seg", 50, DocValuesConfig::default()).unwrap();
    consumer
        .add_numeric_field(&FieldInfo::new("n", 0), (0..50).map(Some))
        .unwrap();
    consumer
}

#[test]
fn test_finalize_failure_keeps_original_error() {
    let dir = FaultyDirectory::default();
    let consumer = one_field_consumer(&dir);
    dir.set(|f| {
        f.fail_meta_writes = true;
        f.fail_data_close = true;
        f.fail_meta_close = true;
    });

    let err = consumer.close().unwrap_err();
    assert!(
        err.to_string().contains("injected write failure on metadata"),
        "close errors replaced the original: {err}"
    );
    // both streams were still closed
    assert_eq!(dir.closed(), vec!["seg.dvd".to_string(), "seg.dvm".to_string()]);
}

#[test]
fn test_close_error_reported_after_clean_finalize() {
    let dir = FaultyDirectory::default();
    let consumer = one_field_consumer(&dir);
    dir.set(|f| f.fail_meta_close = true);

    let err = consumer.close().unwrap_err();
    assert!(err.to_string().contains("injected close failure on seg.dvm"), "{err}");
    // the data file was closed and published first
    assert_eq!(dir.closed().len(), 2);
    assert!(dir.inner.file_len("seg.dvd").is_some());
}

#[test]
fn test_first_close_error_wins() {
    let dir = FaultyDirectory::default();
    let consumer = one_field_consumer(&dir);
    dir.set(|f| {
        f.fail_data_close = true;
        f.fail_meta_close = true;
    });
    let err = consumer.close().unwrap_err();
    assert!(err.to_string().contains("seg.dvd"), "{err}");
}

#[test]
fn test_failed_field_write_aborts_consumer() {
    let dir = FaultyDirectory::default();
    let mut consumer = DocValuesConsumer::create(&dir, "seg", 3, DocValuesConfig::default()).unwrap();
    dir.set(|f| f.fail_meta_writes = true);
    let err = consumer
        .add_numeric_field(&FieldInfo::new("n", 0), [Some(1), None, Some(3)].into_iter())
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err}");
    assert_eq!(consumer.status(), WriteStatus::Failed);

    dir.set(|f| f.fail_meta_writes = false);
    let err = consumer
        .add_numeric_field(&FieldInfo::new("m", 1), [Some(1), None, Some(3)].into_iter())
        .unwrap_err();
    assert!(matches!(err, Error::Aborted(_)), "{err}");
    assert!(matches!(consumer.close(), Err(Error::Aborted(_))));
    assert_eq!(dir.closed().len(), 2);
}

#[test]
fn test_create_failure_closes_data_output() {
    let dir = FaultyDirectory::default();
    dir.set(|f| f.fail_meta_create = true);
    let err = DocValuesConsumer::create(&dir, "seg", 1, DocValuesConfig::default()).err().unwrap();
    assert!(err.to_string().contains("injected create failure"), "{err}");
    assert_eq!(dir.closed(), vec!["seg.dvd".to_string()]);
}
