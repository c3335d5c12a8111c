use super::{Encodable, Sink};

impl Encodable for f64 {
    fn encode<S: Sink>(&self, buf: &mut S) -> usize {
        let bytes = self.to_le_bytes();
        buf.append(&bytes);
        bytes.len()
    }
}

impl Encodable for bool {
    fn encode<S: Sink>(&self, buf: &mut S) -> usize {
        buf.append(&[u8::from(*self)]);
        1
    }
}

impl Encodable for usize {
    fn encode<S: Sink>(&self, buf: &mut S) -> usize {
        (*self as u64).encode(buf)
    }
}

impl Encodable for u32 {
    fn encode<S: Sink>(&self, buf: &mut S) -> usize {
        u64::from(*self).encode(buf)
    }
}

impl Encodable for i32 {
    fn encode<S: Sink>(&self, buf: &mut S) -> usize {
        i64::from(*self).encode(buf)
    }
}

impl Encodable for [u8] {
    fn encode<S: Sink>(&self, out: &mut S) -> usize {
        out.append(self);
        self.len()
    }
}

impl Encodable for &[u8] {
    fn encode<S: Sink>(&self, out: &mut S) -> usize {
        out.append(self);
        self.len()
    }
}

impl Encodable for Vec<u8> {
    fn encode<S: Sink>(&self, out: &mut S) -> usize {
        Encodable::encode(&self[..], out)
    }
}

impl Encodable for str {
    fn encode<S: Sink>(&self, buf: &mut S) -> usize {
        let bytes = self.as_bytes();
        let len_encoded = bytes.len().encode(buf);
        let data_len = bytes.encode(buf);
        len_encoded + data_len
    }
}

// any 64 bit value fits in ten LEB128 bytes
const MAX_LEB_LEN: usize = 10;

impl Encodable for u64 {
    fn encode<S: Sink>(&self, buf: &mut S) -> usize {
        let mut bytes = [0_u8; MAX_LEB_LEN];
        let mut out = &mut bytes[..];
        let len = leb128::write::unsigned(&mut out, *self).unwrap_or(0);
        buf.append(&bytes[..len]);
        len
    }
}

impl Encodable for i64 {
    fn encode<S: Sink>(&self, buf: &mut S) -> usize {
        let mut bytes = [0_u8; MAX_LEB_LEN];
        let mut out = &mut bytes[..];
        let len = leb128::write::signed(&mut out, *self).unwrap_or(0);
        buf.append(&bytes[..len]);
        len
    }
}
