use std::fmt;

/// A column of a columnar object which could not be decoded, along with the path to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnError {
    path: Path,
    kind: ColumnErrorKind,
}

impl std::error::Error for ColumnError {}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.0.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} in column {}", self.kind, self.path)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ColumnErrorKind {
    #[error("run of length zero after the first presence run")]
    IllegalZeroRun,
    #[error("union selector {selector} is outside the {alternatives} alternatives")]
    BadSelector { selector: i64, alternatives: usize },
    #[error("segment of {length} bytes exceeds the maximum of {max}")]
    SegmentTooLarge { length: u64, max: usize },
    #[error("segment should hold {expected} bytes but only {found} could be read")]
    TruncatedRead { expected: u64, found: u64 },
    #[error("malformed segment map: {0}")]
    BadSegmap(String),
    #[error("malformed reassembly record: {0}")]
    BadReassembly(String),
    #[error("column ended before the record stream did")]
    Exhausted,
    #[error("invalid value: {0}")]
    BadValue(String),
    #[error("negative length {0}")]
    NegativeLength(i64),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Path(Vec<String>);

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, elem) in self.0.iter().rev().enumerate() {
            if index != 0 {
                write!(f, ":")?;
            }
            write!(f, "{}", elem)?;
        }
        Ok(())
    }
}

impl ColumnError {
    pub fn kind(&self) -> &ColumnErrorKind {
        &self.kind
    }

    /// The path from the outermost column to the one that failed, joined with `:`
    pub fn path(&self) -> String {
        self.path.to_string()
    }

    pub(crate) fn in_column<S: AsRef<str>>(mut self, col: S) -> ColumnError {
        self.path.0.push(col.as_ref().to_string());
        self
    }

    pub(crate) fn bad_value<R: fmt::Display>(reason: R) -> ColumnError {
        ColumnErrorKind::BadValue(reason.to_string()).into()
    }

    pub(crate) fn bad_reassembly<R: fmt::Display>(reason: R) -> ColumnError {
        ColumnErrorKind::BadReassembly(reason.to_string()).into()
    }
}

impl From<ColumnErrorKind> for ColumnError {
    fn from(kind: ColumnErrorKind) -> Self {
        ColumnError {
            path: Path::default(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_read_outermost_first() {
        let err = ColumnError::from(ColumnErrorKind::IllegalZeroRun)
            .in_column("presence")
            .in_column("a")
            .in_column("rec");
        assert_eq!(err.path(), "rec:a:presence");
        assert_eq!(
            err.to_string(),
            "run of length zero after the first presence run in column rec:a:presence"
        );
    }
}
