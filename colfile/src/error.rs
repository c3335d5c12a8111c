use crate::{
    column::{self, ColumnError},
    config::ConfigError,
    stream,
    types::TypeError,
    value,
};

/// The broad category of an [`Error`], for callers which need to tell "this is not a
/// columnar object" apart from "this is one we can't handle" and "this one is damaged".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The object is not a columnar object at all
    NotColumnar,
    /// A columnar object with a version or parameters this library does not support, or a
    /// value too large for the format to hold. A writer which rejected such a value remains
    /// usable.
    Unsupported,
    /// A columnar object whose bytes are damaged or incomplete
    Corrupt,
    Config,
    /// A record handed to the writer did not match its own type
    ShapeMismatch,
    Io,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not a columnar object")]
    NotColumnar,
    #[error("columnar trailer not found")]
    TrailerNotFound,
    #[error("unsupported columnar version {found} (expected {expected})")]
    UnsupportedVersion { found: i64, expected: i32 },
    #[error("unsupported trailer parameters: {0}")]
    BadTrailerThreshold(ConfigError),
    #[error("corrupt trailer: {0}")]
    CorruptTrailer(String),
    #[error("corrupt column data: {0}")]
    Column(ColumnError),
    #[error("corrupt reassembly section: {0}")]
    Reassembly(String),
    #[error("extra records in reassembly section")]
    ExtraReassemblyRecords,
    #[error("schema id {id} is out of range for {schemas} schemas")]
    BadSchemaId { id: i64, schemas: usize },
    #[error("invalid writer configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("record does not match its type: {0}")]
    ShapeMismatch(#[from] value::Error),
    #[error("a {length} byte column segment exceeds the maximum of {max}")]
    Oversize { length: usize, max: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("reader failed earlier: {message}")]
    Poisoned { kind: ErrorKind, message: String },
    #[error("reader is closed")]
    Closed,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::NotColumnar => ErrorKind::NotColumnar,
            Error::UnsupportedVersion { .. } | Error::BadTrailerThreshold(_) => {
                ErrorKind::Unsupported
            }
            Error::TrailerNotFound
            | Error::CorruptTrailer(_)
            | Error::Column(_)
            | Error::Reassembly(_)
            | Error::ExtraReassemblyRecords
            | Error::BadSchemaId { .. } => ErrorKind::Corrupt,
            Error::Config(_) => ErrorKind::Config,
            Error::ShapeMismatch(value::Error::BadSelector { .. }) => ErrorKind::Corrupt,
            Error::ShapeMismatch(value::Error::CellTooLarge { .. }) | Error::Oversize { .. } => {
                ErrorKind::Unsupported
            }
            Error::ShapeMismatch(_) | Error::Type(_) => {
                ErrorKind::ShapeMismatch
            }
            Error::Poisoned { kind, .. } => *kind,
            Error::Closed => ErrorKind::Closed,
        }
    }
}

impl From<column::Error> for Error {
    fn from(e: column::Error) -> Self {
        match e {
            column::Error::Io(e) => Error::Io(e),
            column::Error::Corrupt(e) => Error::Column(e),
            column::Error::Shape(e) => Error::ShapeMismatch(e),
            column::Error::Type(e) => Error::Type(e),
            column::Error::Oversize { length, max } => Error::Oversize { length, max },
        }
    }
}

impl From<stream::Error> for Error {
    fn from(e: stream::Error) -> Self {
        match e {
            stream::Error::Io(e) => Error::Io(e),
            other => Error::Reassembly(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{column::ColumnErrorKind, config::Threshold};

    #[test]
    fn kinds_separate_foreign_unsupported_and_corrupt() {
        assert_eq!(Error::NotColumnar.kind(), ErrorKind::NotColumnar);
        assert_eq!(
            Error::UnsupportedVersion {
                found: 2,
                expected: 1
            }
            .kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            Error::BadTrailerThreshold(ConfigError::Zero {
                which: Threshold::Skew
            })
            .kind(),
            ErrorKind::Unsupported
        );
        let col: Error = column::Error::from(ColumnErrorKind::IllegalZeroRun).into();
        assert_eq!(col.kind(), ErrorKind::Corrupt);
        assert_eq!(Error::TrailerNotFound.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn values_too_large_for_a_segment_are_unsupported() {
        let too_large = Error::ShapeMismatch(value::Error::CellTooLarge {
            typ: "bytes".to_string(),
            length: 10,
            max: 5,
        });
        assert_eq!(too_large.kind(), ErrorKind::Unsupported);
        let spilled: Error = column::Error::Oversize { length: 10, max: 5 }.into();
        assert_eq!(spilled.kind(), ErrorKind::Unsupported);
        let shape = Error::ShapeMismatch(value::Error::Unset);
        assert_eq!(shape.kind(), ErrorKind::ShapeMismatch);
    }
}
