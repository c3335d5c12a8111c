use std::io::{BufWriter, Write};

use crate::config::MAX_SEGMENT_SIZE;

use super::{segment::Segment, Error};

/// Owns the write cursor of the object being written. Every leaf column hands its buffered
/// bytes to the spiller, which appends them and returns where they landed.
pub(crate) struct Spiller {
    out: BufWriter<Box<dyn Write + Send>>,
    thresh: usize,
    position: u64,
}

impl Spiller {
    pub(crate) fn new(out: Box<dyn Write + Send>, thresh: usize) -> Self {
        Spiller {
            out: BufWriter::new(out),
            thresh,
            position: 0,
        }
    }

    /// The number of buffered bytes at which a column should spill
    pub(crate) fn thresh(&self) -> usize {
        self.thresh
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn spill(&mut self, bytes: &[u8]) -> Result<Segment, Error> {
        if bytes.len() > MAX_SEGMENT_SIZE {
            return Err(Error::Oversize {
                length: bytes.len(),
                max: MAX_SEGMENT_SIZE,
            });
        }
        let seg = Segment {
            offset: self.position,
            length: bytes.len() as u64,
        };
        self.out.write_all(bytes)?;
        self.position += seg.length;
        tracing::trace!(offset = seg.offset, length = seg.length, "spilled segment");
        Ok(seg)
    }

    /// The underlying writer, positioned at the end of the data section
    pub(crate) fn into_inner(self) -> (BufWriter<Box<dyn Write + Send>>, u64) {
        (self.out, self.position)
    }
}
