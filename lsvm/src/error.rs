use std::{error::Error, fmt, io, path::PathBuf};

/// The result type used across the trainer.
pub type Result<T> = std::result::Result<T, LsvmErr>;

/// Everything that can stop a training run.
///
/// Every variant is fatal: the run is an offline batch job over trusted inputs, so
/// the binary reports the error once and exits.
#[derive(Debug)]
pub enum LsvmErr {
    /// An underlying I/O error not tied to a specific input file.
    Io(io::Error),
    /// Failed to open, read or write one of the run's files.
    File {
        role: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// A stream ended before the declared amount of values could be read.
    ShortRead { what: &'static str, expected: usize },
    /// A header field holds a value that cannot describe a dataset.
    InvalidHeader { field: &'static str, value: i64 },
    /// A feature record is malformed.
    InvalidRecord { index: usize, reason: String },
    /// Two buffers that must agree in length don't.
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A dataset referenced by the training set has no examples in the count table.
    ZeroDatasetCount { dataset: usize },
    /// There is nothing to train on.
    EmptyTrainingSet,
    /// A hyperparameter or override is unusable.
    InvalidConfig(String),
    /// The binary was invoked with the wrong number of arguments.
    InvalidArguments { got: usize, expected: usize },
}

impl LsvmErr {
    /// Wraps an `io::Error` with the role and path of the file that caused it.
    pub fn file(role: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            role,
            path: path.into(),
            source,
        }
    }

    /// Creates an `InvalidRecord` error for the record at `index`.
    pub fn record(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            index,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LsvmErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LsvmErr::Io(e) => write!(f, "io error: {e}"),
            LsvmErr::File { role, path, source } => {
                write!(f, "{role} file {}: {source}", path.display())
            }
            LsvmErr::ShortRead { what, expected } => {
                write!(f, "short read while reading {what}: expected {expected} values")
            }
            LsvmErr::InvalidHeader { field, value } => {
                write!(f, "invalid header: {field} = {value}")
            }
            LsvmErr::InvalidRecord { index, reason } => {
                write!(f, "invalid example record {index}: {reason}")
            }
            LsvmErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "size mismatch for {what}: got {got}, expected {expected}"),
            LsvmErr::ZeroDatasetCount { dataset } => {
                write!(f, "dataset {dataset} is referenced by examples but has a count of 0")
            }
            LsvmErr::EmptyTrainingSet => write!(f, "the training set has no examples"),
            LsvmErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            LsvmErr::InvalidArguments { got, expected } => {
                write!(f, "expected {expected} arguments, got {got}")
            }
        }
    }
}

impl Error for LsvmErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LsvmErr::Io(e) => Some(e),
            LsvmErr::File { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for LsvmErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
