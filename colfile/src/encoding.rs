//! Byte level codecs shared by the cell encoding, the row stream and the column writers.
//!
//! Everything here is built around two traits: [`Encodable`], which appends a value to a
//! [`Sink`] and reports how many bytes it wrote, and [`Decodable`], which pulls a value off the
//! front of a `std::io::Read`.
pub(crate) mod raw;
pub(crate) use raw::RawDecoder;

mod decodable_impls;
mod encodable_impls;

pub(crate) trait Sink {
    fn append(&mut self, bytes: &[u8]);
}

impl<'a> Sink for &'a mut Vec<u8> {
    fn append(&mut self, bytes: &[u8]) {
        self.extend(bytes)
    }
}

impl Sink for Vec<u8> {
    fn append(&mut self, bytes: &[u8]) {
        self.extend(bytes)
    }
}

pub(crate) trait Encodable {
    fn encode<S: Sink>(&self, out: &mut S) -> usize;
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid integer")]
    FromInt(#[from] std::num::TryFromIntError),
    #[error("bad leb128")]
    BadLeb(#[from] ::leb128::read::Error),
    #[error("attempted to allocate {attempted} which is larger than the maximum of {maximum}")]
    OverlargeAllocation { attempted: usize, maximum: usize },
    #[error("invalid string encoding")]
    BadString,
    #[error("value needs {needed} bytes but only {available} remain")]
    Truncated { needed: usize, available: usize },
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("invalid bool byte {0:#04x}")]
    BadBool(u8),
}

pub(crate) trait Decodable: Sized {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: std::io::Read;
}
