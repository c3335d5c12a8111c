//! A self-describing row stream. This is how the reassembly metadata and the trailer of a
//! columnar object are serialized.
//!
//! The stream is a sequence of messages, each introduced by a single code byte. Codes below
//! `0x7f` are records whose stream-local type id is the code itself, `0x7f` is a record whose
//! type id follows as a LEB128, and codes from `0x80` define types or mark the end of a
//! stream. Type ids are only valid until the next end-of-stream marker, after which both
//! sides start from scratch.
use crate::{encoding::DecodeError, types::TypeError, value};

mod reader;
mod writer;

pub use reader::StreamReader;
pub use writer::StreamWriter;

pub(crate) const ESCAPE: u8 = 0x7f;
pub(crate) const RECORD_DEF: u8 = 0x80;
pub(crate) const ARRAY_DEF: u8 = 0x81;
pub(crate) const SET_DEF: u8 = 0x82;
pub(crate) const UNION_DEF: u8 = 0x83;
pub(crate) const ALIAS_DEF: u8 = 0x84;
pub const EOS: u8 = 0x8f;

/// Record bodies larger than this are assumed to be corrupt
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unable to decode stream: {0}")]
    Decode(#[from] DecodeError),
    #[error("unknown message code {0:#04x}")]
    UnknownCode(u8),
    #[error("reference to undefined type id {0}")]
    UndefinedType(usize),
    #[error("type {0} is not a record type")]
    NotARecord(String),
    #[error("message of {size} bytes exceeds the maximum of {max}")]
    Overlarge { size: usize, max: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("invalid record: {0}")]
    Value(#[from] value::Error),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        types::{Column, PrimitiveType, RecordType, Type, TypeContext},
        value::{encode_int, Builder, Record},
    };
    use pretty_assertions::assert_eq;

    fn point(ctx: &mut TypeContext) -> Arc<RecordType> {
        ctx.lookup_record(vec![
            Column::new("x", PrimitiveType::Int64.into()),
            Column::new("y", PrimitiveType::Int64.into()),
        ])
        .unwrap()
    }

    fn point_record(typ: &Arc<RecordType>, x: i64, y: Option<i64>) -> Record {
        let mut b = Builder::new();
        b.append_primitive(Some(&encode_int(x)));
        b.append_primitive(y.map(encode_int).as_deref());
        Record::new(typ.clone(), b.into_bytes().unwrap()).unwrap()
    }

    #[test]
    fn records_round_trip_across_stream_boundaries() {
        let mut ctx = TypeContext::new();
        let typ = point(&mut ctx);
        let mut w = StreamWriter::new(Vec::new());
        w.write(&point_record(&typ, 1, Some(2))).unwrap();
        w.write(&point_record(&typ, 3, None)).unwrap();
        w.end_stream().unwrap();
        w.write(&point_record(&typ, 5, Some(6))).unwrap();
        let position = w.position();
        let bytes = w.into_inner().unwrap();
        assert_eq!(position, bytes.len() as u64);

        let mut r = StreamReader::new(&bytes[..]);
        let mut seen = Vec::new();
        while let Some(rec) = r.read().unwrap() {
            assert_eq!(Type::Record(rec.typ().clone()), Type::Record(typ.clone()));
            seen.push((rec.access_int("x").unwrap(), rec.access("y").unwrap().is_null()));
        }
        assert_eq!(seen, vec![(1, false), (3, true), (5, false)]);
    }

    #[test]
    fn typedefs_are_emitted_once_per_stream() {
        let mut ctx = TypeContext::new();
        let typ = point(&mut ctx);
        let mut w = StreamWriter::new(Vec::new());
        w.write(&point_record(&typ, 1, Some(2))).unwrap();
        let first = w.position();
        w.write(&point_record(&typ, 1, Some(2))).unwrap();
        let second = w.position() - first;
        // typedef: code, count, (len, name, id) * 2
        assert_eq!(first - second, 8);
    }

    #[test]
    fn array_of_int64_records_start_with_the_trailer_signature() {
        let mut ctx = TypeContext::new();
        let arr = ctx.lookup_array(&PrimitiveType::Int64.into()).unwrap();
        let typ = ctx
            .lookup_record(vec![
                Column::new("magic", PrimitiveType::String.into()),
                Column::new("sections", Type::Array(arr)),
            ])
            .unwrap();
        let mut b = Builder::new();
        b.append_primitive(Some(b"zst"));
        b.append_container(Some(&[]));
        let rec = Record::new(typ, b.into_bytes().unwrap()).unwrap();
        let mut w = StreamWriter::new(Vec::new());
        w.write(&rec).unwrap();
        let bytes = w.into_inner().unwrap();
        assert_eq!(&bytes[..3], &[ARRAY_DEF, 0x02, RECORD_DEF]);
    }

    #[test]
    fn unknown_codes_and_ids_are_rejected() {
        let mut r = StreamReader::new(&[0x90][..]);
        assert!(matches!(r.read(), Err(Error::UnknownCode(0x90))));
        let mut r = StreamReader::new(&[40, 0][..]);
        assert!(matches!(r.read(), Err(Error::UndefinedType(40))));
        let mut r = StreamReader::new(&[0x02, 0][..]);
        assert!(matches!(r.read(), Err(Error::NotARecord(t)) if t == "int64"));
    }

    #[test]
    fn end_of_stream_forgets_types() {
        let mut ctx = TypeContext::new();
        let typ = point(&mut ctx);
        let mut w = StreamWriter::new(Vec::new());
        w.write(&point_record(&typ, 1, Some(2))).unwrap();
        w.end_stream().unwrap();
        let mut bytes = w.into_inner().unwrap();
        // a bare reference to the record type after the end of stream
        bytes.extend([32, 0]);
        let mut r = StreamReader::new(&bytes[..]);
        assert!(r.read().unwrap().is_some());
        assert!(matches!(r.read(), Err(Error::UndefinedType(32))));
    }

    #[test]
    fn truncated_messages_are_errors() {
        let mut ctx = TypeContext::new();
        let typ = point(&mut ctx);
        let mut w = StreamWriter::new(Vec::new());
        w.write(&point_record(&typ, 1, Some(2))).unwrap();
        let bytes = w.into_inner().unwrap();
        let mut r = StreamReader::new(&bytes[..bytes.len() - 1]);
        assert!(r.read().is_err());
    }

    #[test]
    fn overlarge_bodies_are_rejected_before_allocating() {
        // an empty record type, then a record of it claiming a 1 GiB body
        let mut bytes = vec![RECORD_DEF, 0, 32];
        bytes.extend([0x80, 0x80, 0x80, 0x80, 0x04]);
        let mut r = StreamReader::new(&bytes[..]);
        assert!(matches!(r.read(), Err(Error::Overlarge { .. })));
    }
}
