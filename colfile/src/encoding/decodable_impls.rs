use std::{convert::TryFrom, io::Read};

use super::{Decodable, DecodeError};

// Length prefixed strings larger than this are assumed to be corrupt rather than merely big
const MAX_ALLOCATION: usize = 64 * 1024 * 1024;

impl Decodable for u8 {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let mut buffer = [0; 1];
        bytes.read_exact(&mut buffer)?;
        Ok(buffer[0])
    }
}

impl Decodable for bool {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        match u8::decode(bytes)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::BadBool(other)),
        }
    }
}

impl Decodable for u32 {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        u64::decode::<R>(bytes).and_then(|val| Self::try_from(val).map_err(DecodeError::from))
    }
}

impl Decodable for usize {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        u64::decode::<R>(bytes).and_then(|val| Self::try_from(val).map_err(DecodeError::from))
    }
}

impl Decodable for i32 {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        i64::decode::<R>(bytes).and_then(|val| Self::try_from(val).map_err(DecodeError::from))
    }
}

impl Decodable for i64 {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        leb128::read::signed(bytes).map_err(DecodeError::from)
    }
}

impl Decodable for u64 {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        leb128::read::unsigned(bytes).map_err(DecodeError::from)
    }
}

impl Decodable for f64 {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let mut buffer = [0; 8];
        bytes.read_exact(&mut buffer)?;
        Ok(Self::from_le_bytes(buffer))
    }
}

impl Decodable for Vec<u8> {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let len = usize::decode::<R>(bytes)?;
        if len == 0 {
            return Ok(vec![]);
        }
        if len > MAX_ALLOCATION {
            return Err(DecodeError::OverlargeAllocation {
                attempted: len,
                maximum: MAX_ALLOCATION,
            });
        }
        let mut buffer = vec![0; len];
        bytes.read_exact(buffer.as_mut_slice())?;
        Ok(buffer)
    }
}

impl Decodable for String {
    fn decode<R>(bytes: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let raw = Vec::<u8>::decode(bytes)?;
        String::from_utf8(raw).map_err(|_| DecodeError::BadString)
    }
}
