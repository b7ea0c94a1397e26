use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use segdv_codecs::{fixed_format_by_name, variable_format_by_name, FIXED_FORMATS, VARIABLE_FORMATS};
use segdv_core::format::{DATA_EXTENSION, DEFAULT_BLOCK_SIZE, META_EXTENSION};
use segdv_core::intblock::{
    FixedIntBlockInput, FixedIntBlockWriter, VariableIntBlockInput, VariableIntBlockWriter,
};
use segdv_core::{
    Directory, DocValuesConfig, DocValuesConsumer, DocValuesProducer, EntryKind, FieldInfo,
    FsDirectory, IntBlockReader, IntBlockWriter,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "segdv",
    about = "Write, inspect, and dump segment doc values and block-encoded integer streams",
    version
)]
struct Cli {
    /// Log encoding decisions at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write integers through a block format, then seek back to a mark
    Ints {
        /// Directory to write `<name>.blk` into
        dir: PathBuf,
        /// Block format: vint | bitpacked | chunked | lookahead
        #[arg(short, long, default_value = "bitpacked")]
        format: String,
        /// Block size (base block size for lookahead)
        #[arg(short, long, default_value_t = 128)]
        block_size: usize,
        /// Write 0..count when no input file is given
        #[arg(short, long, default_value_t = 10_000)]
        count: u32,
        /// Text file with one unsigned integer per line
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Logical position to mark and seek back to (default: the middle)
        #[arg(short, long)]
        mark: Option<usize>,
        /// Number of values to print after the mark
        #[arg(long, default_value_t = 10)]
        show: usize,
        #[arg(long, default_value = "ints")]
        name: String,
    },
    /// Build a one-field segment of 64-bit integers (empty line = missing)
    WriteNumeric(WriteArgs),
    /// Build a one-field segment of byte strings, one per line
    WriteBinary(WriteArgs),
    /// Build a one-field sorted segment, one term per line (empty line = missing)
    WriteSorted(WriteArgs),
    /// List the metadata entries of a segment
    Inspect(SegmentArgs),
    /// Print per-document values of one field
    Dump {
        #[command(flatten)]
        segment: SegmentArgs,
        /// Field number to print
        #[arg(short, long)]
        field: u32,
        /// Print at most this many documents
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(clap::Args)]
struct WriteArgs {
    /// Text file with one value per line
    input: PathBuf,
    /// Directory holding the segment files
    dir: PathBuf,
    #[arg(short, long, default_value = "_0")]
    segment: String,
    #[arg(long, default_value = "field")]
    field_name: String,
    #[arg(long, default_value_t = 0)]
    field_number: u32,
    /// Packed block size (power of two, 64 to 2^27)
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,
    /// Extra bits per value accepted for faster packed formats
    #[arg(long, default_value_t = 0.25)]
    overhead_ratio: f32,
}

#[derive(clap::Args)]
struct SegmentArgs {
    /// Directory holding the segment files
    dir: PathBuf,
    #[arg(short, long, default_value = "_0")]
    segment: String,
    /// Document count of the segment
    #[arg(short = 'n', long)]
    max_doc: usize,
}

#[derive(Clone, Copy)]
enum FieldKind {
    Numeric,
    Binary,
    Sorted,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading input file {:?}", path))?;
    Ok(text.lines().map(str::to_string).collect())
}

fn open_dir(path: &Path) -> anyhow::Result<FsDirectory> {
    FsDirectory::open(path).with_context(|| format!("opening directory {:?}", path))
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn printable(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => format!("{:?}", s),
        Err(_) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_ints(
    dir: PathBuf,
    format: &str,
    block_size: usize,
    values: Vec<u32>,
    mark: Option<usize>,
    show: usize,
    name: &str,
) -> anyhow::Result<()> {
    let directory = open_dir(&dir)?;
    let file = format!("{}.blk", name);
    let mark_at = mark.unwrap_or(values.len() / 2).min(values.len());
    let fixed = FIXED_FORMATS.contains(&format);
    if !fixed && !VARIABLE_FORMATS.contains(&format) {
        anyhow::bail!(
            "unknown block format '{}'. Valid options: {}, {}",
            format,
            FIXED_FORMATS.join(", "),
            VARIABLE_FORMATS.join(", ")
        );
    }

    let t0 = Instant::now();
    let out = directory.create_output(&file)?;
    let mut writer: Box<dyn IntBlockWriter> = if fixed {
        Box::new(FixedIntBlockWriter::new(out, fixed_format_by_name(format)?, block_size)?)
    } else {
        let variable = variable_format_by_name(format, block_size)?;
        Box::new(VariableIntBlockWriter::new(out, variable.as_ref())?)
    };
    let mut pointer = writer.mark();
    for (i, v) in values.iter().enumerate() {
        if i == mark_at {
            pointer = writer.mark();
        }
        writer.write(*v)?;
    }
    if mark_at == values.len() {
        pointer = writer.mark();
    }
    writer.close().with_context(|| format!("closing {}", file))?;
    let elapsed = t0.elapsed();

    let input = directory.open_input(&file)?;
    let size = input.len();
    let mut reader: Box<dyn IntBlockReader> = if fixed {
        Box::new(FixedIntBlockInput::open(input, fixed_format_by_name(format)?)?.reader())
    } else {
        let variable = variable_format_by_name(format, block_size)?;
        Box::new(VariableIntBlockInput::open(input, variable)?.reader())
    };
    reader
        .seek(pointer)
        .with_context(|| format!("seeking to {:?}", pointer))?;

    eprintln!("  format      : {}", format);
    eprintln!("  values      : {}", values.len());
    eprintln!("  file size   : {}", human_bytes(size));
    eprintln!(
        "  bits/value  : {:.2}",
        if values.is_empty() { 0.0 } else { size as f64 * 8.0 / values.len() as f64 }
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!("mark {} -> block fp {} + {}", mark_at, pointer.fp, pointer.upto);
    for i in mark_at..(mark_at + show).min(values.len()) {
        let got = reader.next()?;
        if got != values[i] {
            anyhow::bail!("value {} read back as {}, expected {}", i, got, values[i]);
        }
        println!("  [{}] {}", i, got);
    }
    Ok(())
}

fn run_write(kind: FieldKind, args: WriteArgs) -> anyhow::Result<()> {
    let lines = read_lines(&args.input)?;
    let directory = open_dir(&args.dir)?;
    let config = DocValuesConfig {
        block_size: args.block_size,
        acceptable_overhead_ratio: args.overhead_ratio,
        ..Default::default()
    };
    let field = FieldInfo::new(args.field_name.as_str(), args.field_number);
    let max_doc = lines.len();

    let t0 = Instant::now();
    let mut consumer = DocValuesConsumer::create(&directory, &args.segment, max_doc, config)
        .with_context(|| format!("creating segment {:?} in {:?}", args.segment, args.dir))?;
    match kind {
        FieldKind::Numeric => {
            let values = lines
                .iter()
                .enumerate()
                .map(|(i, line)| match line.trim() {
                    "" => Ok(None),
                    s => s
                        .parse::<i64>()
                        .map(Some)
                        .with_context(|| format!("line {}: not an integer: {:?}", i + 1, s)),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            consumer.add_numeric_field(&field, values.iter().copied())?;
        }
        FieldKind::Binary => {
            consumer.add_binary_field(&field, lines.iter().map(|l| Some(l.as_bytes())))?;
        }
        FieldKind::Sorted => {
            let terms: Vec<&str> = lines
                .iter()
                .map(String::as_str)
                .filter(|l| !l.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let ords: Vec<i64> = lines
                .iter()
                .map(|l| match terms.binary_search(&l.as_str()) {
                    Ok(ord) => ord as i64,
                    Err(_) => -1,
                })
                .collect();
            consumer.add_sorted_field(&field, terms.iter(), ords.iter().copied())?;
        }
    }
    consumer.close().context("finishing segment")?;
    info!(segment = %args.segment, max_doc, "segment written");

    let data = fs::metadata(args.dir.join(format!("{}.{}", args.segment, DATA_EXTENSION)))?.len();
    let meta = fs::metadata(args.dir.join(format!("{}.{}", args.segment, META_EXTENSION)))?.len();
    eprintln!("  documents   : {}", max_doc);
    eprintln!("  data        : {}", human_bytes(data));
    eprintln!("  metadata    : {}", human_bytes(meta));
    eprintln!("  elapsed     : {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}

fn open_segment(args: &SegmentArgs) -> anyhow::Result<DocValuesProducer> {
    let directory = open_dir(&args.dir)?;
    DocValuesProducer::open(&directory, &args.segment, args.max_doc)
        .with_context(|| format!("opening segment {:?} in {:?}", args.segment, args.dir))
}

fn run_inspect(args: SegmentArgs) -> anyhow::Result<()> {
    let producer = open_segment(&args)?;
    let checksum = producer.check_integrity().context("verifying data checksum")?;

    println!("=== Segment {:?} in {:?} ===", args.segment, args.dir);
    println!();
    println!("  documents      : {}", producer.max_doc());
    println!("  data checksum  : {:016x}", checksum);
    println!();
    println!(
        "  {:>6}  {:>6}  {:>12}  {:>13}  {:>10}",
        "field", "kind", "data offset", "format", "count"
    );
    println!("  {}", "-".repeat(55));
    for e in producer.entries() {
        println!(
            "  {:>6}  {:>6}  {:>12}  {:>13}  {:>10}",
            e.field,
            e.kind.name(),
            e.offset,
            e.numeric_format.map_or("-", |f| f.name()),
            e.count
        );
    }
    Ok(())
}

fn run_dump(args: SegmentArgs, field: u32, limit: Option<usize>) -> anyhow::Result<()> {
    let producer = open_segment(&args)?;
    let kinds: Vec<EntryKind> = producer
        .entries()
        .iter()
        .filter(|e| e.field == field)
        .map(|e| e.kind)
        .collect();
    let docs = limit.unwrap_or(producer.max_doc()).min(producer.max_doc());

    match kinds.as_slice() {
        [EntryKind::Number] => {
            let values = producer.numeric(field)?;
            println!("--- field {} (numeric, {}) ---", field, values.format().name());
            for doc in 0..docs {
                println!("  {:>8}  {}", doc, values.get(doc));
            }
        }
        [EntryKind::Bytes] => {
            let values = producer.binary(field)?;
            println!("--- field {} (binary) ---", field);
            for doc in 0..docs {
                println!("  {:>8}  {}", doc, printable(values.get(doc)));
            }
        }
        [EntryKind::Number, EntryKind::Fst] => {
            let values = producer.sorted(field)?;
            println!("--- field {} (sorted, {} terms) ---", field, values.value_count());
            for doc in 0..docs {
                let ord = values.ord(doc);
                let term = values.lookup_ord(ord).unwrap_or_default();
                println!("  {:>8}  {:>6}  {}", doc, ord, printable(&term));
            }
        }
        [EntryKind::Bytes, EntryKind::Number, EntryKind::Fst] => {
            let values = producer.sorted_set(field)?;
            println!("--- field {} (sorted set, {} terms) ---", field, values.value_count());
            for doc in 0..docs {
                let terms = values
                    .ords(doc)?
                    .into_iter()
                    .map(|ord| printable(&values.lookup_ord(ord).unwrap_or_default()))
                    .collect::<Vec<_>>();
                println!("  {:>8}  [{}]", doc, terms.join(", "));
            }
        }
        [] => anyhow::bail!("segment has no field {}", field),
        other => anyhow::bail!("field {} has an unexpected entry layout {:?}", field, other),
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ints {
            dir,
            format,
            block_size,
            count,
            input,
            mark,
            show,
            name,
        } => {
            let values = match input {
                Some(path) => read_lines(&path)?
                    .iter()
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| {
                        l.trim()
                            .parse::<u32>()
                            .with_context(|| format!("not an unsigned integer: {:?}", l))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?,
                None => (0..count).collect(),
            };
            run_ints(dir, &format, block_size, values, mark, show, &name)
        }
        Commands::WriteNumeric(args) => run_write(FieldKind::Numeric, args),
        Commands::WriteBinary(args) => run_write(FieldKind::Binary, args),
        Commands::WriteSorted(args) => run_write(FieldKind::Sorted, args),
        Commands::Inspect(args) => run_inspect(args),
        Commands::Dump {
            segment,
            field,
            limit,
        } => run_dump(segment, field, limit),
    }
}
