//! Writer configuration and the hard limits the format places on it.
use std::fmt;

/// The largest per-column flush threshold a writer may be configured with
pub const MAX_COL_THRESH: usize = 20 * 1024 * 1024;
/// The largest skew threshold a writer may be configured with
pub const MAX_SKEW_THRESH: usize = 512 * 1024 * 1024;
/// A spilled segment may exceed the column threshold by at most one cell, anything longer than
/// this is corrupt.
pub const MAX_SEGMENT_SIZE: usize = 2 * MAX_COL_THRESH;

pub const DEFAULT_COL_THRESH: usize = 5 * 1024 * 1024;
pub const DEFAULT_SKEW_THRESH: usize = 25 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Threshold {
    Skew,
    Column,
}

impl Threshold {
    pub fn max(self) -> usize {
        match self {
            Threshold::Skew => MAX_SKEW_THRESH,
            Threshold::Column => MAX_COL_THRESH,
        }
    }

    /// Check that `value` is a usable setting for this threshold
    pub fn check(self, value: usize) -> Result<(), ConfigError> {
        if value == 0 {
            Err(ConfigError::Zero { which: self })
        } else if value > self.max() {
            Err(ConfigError::TooLarge {
                which: self,
                value,
                max: self.max(),
            })
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Skew => write!(f, "skew threshold"),
            Threshold::Column => write!(f, "column threshold"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{which} must be greater than zero")]
    Zero { which: Threshold },
    #[error("{which} of {value} bytes exceeds the maximum of {max}")]
    TooLarge {
        which: Threshold,
        value: usize,
        max: usize,
    },
}

/// Thresholds controlling when a writer spills buffered bytes.
///
/// `col_thresh` is the number of bytes a single column buffers before it is written out as a
/// segment. `skew_thresh` is the number of bytes of input records after which every column
/// is flushed, which bounds how far apart the pieces of one record can end up in the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriterOptions {
    pub skew_thresh: usize,
    pub col_thresh: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            skew_thresh: DEFAULT_SKEW_THRESH,
            col_thresh: DEFAULT_COL_THRESH,
        }
    }
}

impl WriterOptions {
    pub fn with_skew_thresh(self, skew_thresh: usize) -> Self {
        WriterOptions {
            skew_thresh,
            ..self
        }
    }

    pub fn with_col_thresh(self, col_thresh: usize) -> Self {
        WriterOptions { col_thresh, ..self }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Threshold::Skew.check(self.skew_thresh)?;
        Threshold::Column.check(self.col_thresh)
    }
}
