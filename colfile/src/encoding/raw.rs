use std::fmt::Debug;

use super::{Decodable, DecodeError};

/// A cursor over a byte buffer which decodes values from the front of the unread portion.
#[derive(Clone, Debug)]
pub(crate) struct RawDecoder<'a> {
    offset: usize,
    data: &'a [u8],
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("buffer size did not change")]
    BufferSizeDidNotChange,
    #[error("trying to read {needed} bytes with only {available} remaining")]
    TryingToReadPastEnd { needed: usize, available: usize },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl<'a> RawDecoder<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        RawDecoder {
            offset: 0,
            data,
        }
    }

    pub(crate) fn read<T: Decodable + Debug>(&mut self) -> Result<T, Error> {
        let mut buf = &self.data[self.offset..];
        let init_len = buf.len();
        let val = T::decode::<&[u8]>(&mut buf)?;
        let delta = init_len - buf.len();
        if delta == 0 {
            Err(Error::BufferSizeDidNotChange)
        } else {
            self.offset += delta;
            Ok(val)
        }
    }

    pub(crate) fn read_bytes(&mut self, index: usize) -> Result<&'a [u8], Error> {
        if self.offset + index > self.data.len() {
            Err(Error::TryingToReadPastEnd {
                needed: index,
                available: self.remaining(),
            })
        } else {
            let data = self.data;
            let head = &data[self.offset..self.offset + index];
            self.offset += index;
            Ok(head)
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub(crate) fn done(&self) -> bool {
        self.offset >= self.data.len()
    }
}

impl<'a> From<&'a [u8]> for RawDecoder<'a> {
    fn from(d: &'a [u8]) -> Self {
        RawDecoder::new(d)
    }
}

impl From<Error> for DecodeError {
    fn from(e: Error) -> Self {
        match e {
            Error::Decode(d) => d,
            Error::BufferSizeDidNotChange => DecodeError::Truncated {
                needed: 1,
                available: 0,
            },
            Error::TryingToReadPastEnd { needed, available } => {
                DecodeError::Truncated { needed, available }
            }
        }
    }
}
