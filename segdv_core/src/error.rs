use std::io;

/// Errors raised while writing or reading doc-values and integer block streams.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The caller supplied a value or sequence the format cannot represent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored bytes do not decode to a valid structure.
    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("fst error: {0}")]
    Fst(#[from] fst::Error),

    /// A previous field write failed; the consumer can only be discarded.
    #[error("consumer aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

/// Progress of a multi-step write whose failure must not be masked by its
/// cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStatus {
    /// No write in flight and none has failed.
    #[default]
    Clean,
    /// A write started and has not reported success yet.
    InProgress,
    /// A write returned an error; only best-effort cleanup remains.
    Failed,
}

impl WriteStatus {
    pub fn begin(&mut self) {
        *self = WriteStatus::InProgress;
    }

    /// Record the outcome of the step opened by [`begin`](Self::begin).
    pub fn settle<T>(&mut self, result: &Result<T>) {
        *self = if result.is_ok() {
            WriteStatus::Clean
        } else {
            WriteStatus::Failed
        };
    }

    pub fn is_clean(self) -> bool {
        self == WriteStatus::Clean
    }
}
