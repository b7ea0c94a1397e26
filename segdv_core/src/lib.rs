pub mod codec;
pub mod directory;
pub mod docvalues;
pub mod error;
pub mod format;
pub mod intblock;
pub mod packed;
pub mod store;

pub use codec::{FixedBlockFormat, VariableBlockDecoder, VariableBlockEncoder, VariableBlockFormat};
pub use directory::{Directory, FsDirectory, RamDirectory};
pub use docvalues::{
    BinaryDocValues, DocValuesConfig, DocValuesConsumer, DocValuesProducer, EntryKind, FieldEntry,
    FieldInfo, NumericDocValues, NumericFormat, SortedDocValues, SortedSetDocValues,
};
pub use error::{Error, Result, WriteStatus};
pub use intblock::{BlockPointer, IntBlockReader, IntBlockWriter};
pub use store::{DataOutput, IndexInput, IndexOutput};
