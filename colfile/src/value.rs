//! The cell encoding used inside columns, record bodies and the row stream.
//!
//! A cell is either unset or a byte string. A container is a cell whose bytes are themselves a
//! sequence of cells. Every cell is introduced by an unsigned LEB128 tag: `0` means unset,
//! anything else is `((len << 1) | is_container) + 1` followed by `len` bytes.
use std::{fmt::Debug, ops::Range, sync::Arc};

use smol_str::SmolStr;

use crate::{
    config::MAX_SEGMENT_SIZE,
    encoding::{Decodable, DecodeError, Encodable, RawDecoder},
    types::{PrimitiveType, RecordType, Type},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("record has no field `{0}`")]
    MissingField(SmolStr),
    #[error("expected a value of type {expected} but found {found}")]
    WrongType { expected: String, found: String },
    #[error("value is unset")]
    Unset,
    #[error("{typ} has {expected} fields but the value has {found} cells")]
    CellCount {
        typ: String,
        expected: usize,
        found: usize,
    },
    #[error("cell {index} is {} but its type says otherwise", if *.container { "a container" } else { "not a container" })]
    CellKind { index: usize, container: bool },
    #[error("union selector {selector} is outside the {alternatives} alternatives")]
    BadSelector { selector: i64, alternatives: usize },
    #[error("{0} values nested in an array, set or union cannot be unset")]
    UnsetNested(String),
    #[error("unbalanced container nesting")]
    Unbalanced,
    #[error("a {length} byte {typ} value exceeds the maximum segment size of {max}")]
    CellTooLarge {
        typ: String,
        length: usize,
        max: usize,
    },
}

/// One cell read off the front of a sequence of cells
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell<'a> {
    pub bytes: Option<&'a [u8]>,
    pub container: bool,
}

/// The encoded size of a cell, tag included
pub(crate) fn cell_len(bytes: Option<&[u8]>, container: bool) -> usize {
    match bytes {
        None => 1,
        Some(b) => {
            let tag = (((b.len() as u64) << 1) | u64::from(container)) + 1;
            (64 - tag.leading_zeros() as usize).div_ceil(7) + b.len()
        }
    }
}

pub(crate) fn append_cell(out: &mut Vec<u8>, bytes: Option<&[u8]>, container: bool) {
    match bytes {
        None => {
            0_u64.encode(out);
        }
        Some(b) => {
            let tag = (((b.len() as u64) << 1) | u64::from(container)) + 1;
            tag.encode(out);
            out.extend_from_slice(b);
        }
    }
}

/// Iterates over a sequence of cells. Stops after the first error.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    data: RawDecoder<'a>,
}

impl<'a> Iter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Iter {
            data: RawDecoder::new(data),
        }
    }

    pub fn done(&self) -> bool {
        self.data.done()
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    fn next_cell(&mut self) -> Result<Cell<'a>, DecodeError> {
        let tag = self.data.read::<u64>()?;
        if tag == 0 {
            return Ok(Cell {
                bytes: None,
                container: false,
            });
        }
        let tag = tag - 1;
        let len = usize::try_from(tag >> 1)?;
        let bytes = self.data.read_bytes(len)?;
        Ok(Cell {
            bytes: Some(bytes),
            container: tag & 1 == 1,
        })
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<Cell<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.done() {
            return None;
        }
        let cell = self.next_cell();
        if cell.is_err() {
            self.data = RawDecoder::new(&[]);
        }
        Some(cell)
    }
}

/// Builds a sequence of cells, possibly nested inside containers.
#[derive(Clone, Debug, Default)]
pub struct Builder {
    bytes: Vec<u8>,
    stack: Vec<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_primitive(&mut self, bytes: Option<&[u8]>) {
        append_cell(&mut self.bytes, bytes, false)
    }

    pub fn append_container(&mut self, body: Option<&[u8]>) {
        append_cell(&mut self.bytes, body, true)
    }

    pub fn begin_container(&mut self) {
        self.stack.push(self.bytes.len());
    }

    pub fn end_container(&mut self) -> Result<(), Error> {
        let start = self.stack.pop().ok_or(Error::Unbalanced)?;
        let body = self.bytes.split_off(start);
        append_cell(&mut self.bytes, Some(&body), true);
        Ok(())
    }

    pub fn bytes(&self) -> Result<&[u8], Error> {
        if self.stack.is_empty() {
            Ok(&self.bytes)
        } else {
            Err(Error::Unbalanced)
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, Error> {
        if self.stack.is_empty() {
            Ok(self.bytes)
        } else {
            Err(Error::Unbalanced)
        }
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
        self.stack.clear();
    }
}

pub(crate) fn decode_exact<T: Decodable + Debug>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut decoder = RawDecoder::from(bytes);
    let val = decoder.read::<T>()?;
    if decoder.done() {
        Ok(val)
    } else {
        Err(DecodeError::TrailingBytes(decoder.remaining()))
    }
}

pub fn encode_int(val: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    val.encode(&mut out);
    out
}

pub fn decode_int(bytes: &[u8]) -> Result<i64, DecodeError> {
    decode_exact(bytes)
}

/// A decoded primitive value
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint64(u64),
    Float64(f64),
    String(SmolStr),
    Bytes(Vec<u8>),
    /// Nanoseconds since the unix epoch
    Time(i64),
    Null,
}

impl Primitive {
    pub fn typ(&self) -> PrimitiveType {
        match self {
            Self::Bool(_) => PrimitiveType::Bool,
            Self::Int32(_) => PrimitiveType::Int32,
            Self::Int64(_) => PrimitiveType::Int64,
            Self::Uint64(_) => PrimitiveType::Uint64,
            Self::Float64(_) => PrimitiveType::Float64,
            Self::String(_) => PrimitiveType::String,
            Self::Bytes(_) => PrimitiveType::Bytes,
            Self::Time(_) => PrimitiveType::Time,
            Self::Null => PrimitiveType::Null,
        }
    }

    /// The cell bytes of this value, `None` for `Null`
    pub fn encode(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Self::Bool(b) => b.encode(&mut out),
            Self::Int32(i) => i.encode(&mut out),
            Self::Int64(i) | Self::Time(i) => i.encode(&mut out),
            Self::Uint64(u) => u.encode(&mut out),
            Self::Float64(f) => f.encode(&mut out),
            Self::String(s) => s.as_bytes().encode(&mut out),
            Self::Bytes(b) => b.encode(&mut out),
            Self::Null => return None,
        };
        Some(out)
    }

    pub fn decode(typ: PrimitiveType, bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(match typ {
            PrimitiveType::Bool => Self::Bool(decode_exact(bytes)?),
            PrimitiveType::Int32 => Self::Int32(decode_exact(bytes)?),
            PrimitiveType::Int64 => Self::Int64(decode_exact(bytes)?),
            PrimitiveType::Uint64 => Self::Uint64(decode_exact(bytes)?),
            PrimitiveType::Float64 => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                    if bytes.len() < 8 {
                        DecodeError::Truncated {
                            needed: 8,
                            available: bytes.len(),
                        }
                    } else {
                        DecodeError::TrailingBytes(bytes.len() - 8)
                    }
                })?;
                Self::Float64(f64::from_le_bytes(arr))
            }
            PrimitiveType::String => Self::String(
                std::str::from_utf8(bytes)
                    .map_err(|_| DecodeError::BadString)?
                    .into(),
            ),
            PrimitiveType::Bytes => Self::Bytes(bytes.to_vec()),
            PrimitiveType::Time => Self::Time(decode_exact(bytes)?),
            PrimitiveType::Null if bytes.is_empty() => Self::Null,
            PrimitiveType::Null => return Err(DecodeError::TrailingBytes(bytes.len())),
        })
    }
}

/// An owned value together with its type
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub typ: Type,
    pub bytes: Option<Vec<u8>>,
}

impl Value {
    pub fn new(typ: Type, bytes: Option<Vec<u8>>) -> Self {
        Value { typ, bytes }
    }

    pub fn as_ref(&self) -> ValueRef<'_> {
        ValueRef {
            typ: &self.typ,
            bytes: self.bytes.as_deref(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueRef<'a> {
    pub typ: &'a Type,
    pub bytes: Option<&'a [u8]>,
}

impl<'a> ValueRef<'a> {
    pub fn new(typ: &'a Type, bytes: Option<&'a [u8]>) -> Self {
        ValueRef { typ, bytes }
    }

    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }

    pub fn to_owned(&self) -> Value {
        Value {
            typ: self.typ.clone(),
            bytes: self.bytes.map(<[u8]>::to_vec),
        }
    }

    fn wrong_type(&self, expected: &str) -> Error {
        Error::WrongType {
            expected: expected.to_string(),
            found: self.typ.to_string(),
        }
    }

    fn set_bytes(&self) -> Result<&'a [u8], Error> {
        self.bytes.ok_or(Error::Unset)
    }

    /// Decode a primitive value. An unset cell decodes as [`Primitive::Null`].
    pub fn primitive(&self) -> Result<Primitive, Error> {
        let Type::Primitive(p) = self.typ.under() else {
            return Err(self.wrong_type("a primitive"));
        };
        match self.bytes {
            None => Ok(Primitive::Null),
            Some(b) => Ok(Primitive::decode(*p, b)?),
        }
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match self.typ.under() {
            Type::Primitive(PrimitiveType::Int32 | PrimitiveType::Int64 | PrimitiveType::Time) => {
                Ok(decode_exact::<i64>(self.set_bytes()?)?)
            }
            Type::Primitive(PrimitiveType::Uint64) => {
                let u = decode_exact::<u64>(self.set_bytes()?)?;
                Ok(i64::try_from(u).map_err(DecodeError::from)?)
            }
            _ => Err(self.wrong_type("an integer")),
        }
    }

    pub fn as_str(&self) -> Result<&'a str, Error> {
        match self.typ.under() {
            Type::Primitive(PrimitiveType::String) => {
                std::str::from_utf8(self.set_bytes()?).map_err(|_| DecodeError::BadString.into())
            }
            _ => Err(self.wrong_type("string")),
        }
    }

    /// The elements of an array or set value
    pub fn elements(&self) -> Result<Vec<ValueRef<'a>>, Error> {
        let inner = match self.typ.under() {
            Type::Array(a) => a.inner(),
            Type::Set(s) => s.inner(),
            _ => return Err(self.wrong_type("array or set")),
        };
        Iter::new(self.set_bytes()?)
            .map(|cell| Ok(ValueRef::new(inner, cell?.bytes)))
            .collect()
    }

    /// The selector and the selected value of a union value
    pub fn union(&self) -> Result<(usize, ValueRef<'a>), Error> {
        let Type::Union(u) = self.typ.under() else {
            return Err(self.wrong_type("union"));
        };
        let mut cells = Iter::new(self.set_bytes()?);
        let (Some(selector), Some(val), None) = (cells.next(), cells.next(), cells.next()) else {
            return Err(Error::CellCount {
                typ: self.typ.to_string(),
                expected: 2,
                found: Iter::new(self.set_bytes()?).count(),
            });
        };
        let selector = decode_int(selector?.bytes.ok_or(Error::Unset)?)?;
        let typ = usize::try_from(selector)
            .ok()
            .and_then(|s| u.types().get(s).map(|t| (s, t)));
        let Some((index, typ)) = typ else {
            return Err(Error::BadSelector {
                selector,
                alternatives: u.types().len(),
            });
        };
        Ok((index, ValueRef::new(typ, val?.bytes)))
    }

    /// The fields of a record value in declared order
    pub fn fields(&self) -> Result<Vec<ValueRef<'a>>, Error> {
        let Some(rec) = self.typ.as_record() else {
            return Err(self.wrong_type("record"));
        };
        let values = Iter::new(self.set_bytes()?)
            .zip(rec.columns())
            .map(|(cell, col)| Ok(ValueRef::new(&col.typ, cell?.bytes)))
            .collect::<Result<Vec<_>, Error>>()?;
        if values.len() != rec.columns().len() {
            return Err(Error::CellCount {
                typ: self.typ.to_string(),
                expected: rec.columns().len(),
                found: values.len(),
            });
        }
        Ok(values)
    }

    pub fn field(&self, name: &str) -> Result<ValueRef<'a>, Error> {
        let index = self
            .typ
            .as_record()
            .and_then(|r| r.column_index(name))
            .ok_or_else(|| Error::MissingField(name.into()))?;
        Ok(self.fields()?[index])
    }
}

/// A record value: a record type and the cells of its fields, without an enclosing container.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    typ: Arc<RecordType>,
    body: Vec<u8>,
    cells: Vec<Option<Range<usize>>>,
}

impl Record {
    /// Create a record, checking that there is exactly one cell of the right kind per column
    pub fn new(typ: Arc<RecordType>, body: Vec<u8>) -> Result<Self, Error> {
        let mut cells = Vec::with_capacity(typ.columns().len());
        let mut iter = Iter::new(&body);
        let mut found = 0;
        while let Some(cell) = iter.next() {
            let cell = cell?;
            if let Some(col) = typ.columns().get(found) {
                match cell.bytes {
                    Some(bytes) => {
                        if cell.container != col.typ.is_container() {
                            return Err(Error::CellKind {
                                index: found,
                                container: cell.container,
                            });
                        }
                        let end = body.len() - iter.remaining();
                        cells.push(Some(end - bytes.len()..end));
                    }
                    None => cells.push(None),
                }
            }
            found += 1;
        }
        if found != typ.columns().len() {
            return Err(Error::CellCount {
                typ: Type::Record(typ.clone()).to_string(),
                expected: typ.columns().len(),
                found,
            });
        }
        Ok(Record { typ, body, cells })
    }

    pub fn typ(&self) -> &Arc<RecordType> {
        &self.typ
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn field_count(&self) -> usize {
        self.cells.len()
    }

    fn value_at(&self, index: usize) -> ValueRef<'_> {
        ValueRef::new(
            &self.typ.columns()[index].typ,
            self.cells[index].clone().map(|r| &self.body[r]),
        )
    }

    pub fn values(&self) -> impl Iterator<Item = ValueRef<'_>> + '_ {
        (0..self.cells.len()).map(move |i| self.value_at(i))
    }

    pub fn access(&self, name: &str) -> Result<ValueRef<'_>, Error> {
        self.typ
            .column_index(name)
            .map(|i| self.value_at(i))
            .ok_or_else(|| Error::MissingField(name.into()))
    }

    pub fn access_int(&self, name: &str) -> Result<i64, Error> {
        self.access(name)?.as_int()
    }

    pub fn access_string(&self, name: &str) -> Result<&str, Error> {
        self.access(name)?.as_str()
    }

    /// Check every nested value against its type, all the way down.
    pub fn validate(&self) -> Result<(), Error> {
        for value in self.values() {
            check(value.typ, value.bytes)?;
        }
        Ok(())
    }
}

// Field values may be unset. Values nested in arrays, sets and unions may only be unset if
// they are primitives, the column layout has nowhere to put a null container.
fn check(typ: &Type, bytes: Option<&[u8]>) -> Result<(), Error> {
    let Some(bytes) = bytes else {
        return Ok(());
    };
    match typ.under() {
        // every primitive lands whole in a single segment of its leaf column
        Type::Primitive(_) => {
            let length = cell_len(Some(bytes), false);
            if length > MAX_SEGMENT_SIZE {
                return Err(Error::CellTooLarge {
                    typ: typ.to_string(),
                    length,
                    max: MAX_SEGMENT_SIZE,
                });
            }
            Ok(())
        }
        Type::Record(rec) => {
            let cells = Iter::new(bytes).collect::<Result<Vec<_>, _>>()?;
            if cells.len() != rec.columns().len() {
                return Err(Error::CellCount {
                    typ: typ.to_string(),
                    expected: rec.columns().len(),
                    found: cells.len(),
                });
            }
            for (index, (cell, col)) in cells.into_iter().zip(rec.columns()).enumerate() {
                check_cell(index, &col.typ, cell, true)?;
            }
            Ok(())
        }
        Type::Array(a) => check_elements(a.inner(), bytes),
        Type::Set(s) => check_elements(s.inner(), bytes),
        Type::Union(u) => {
            let cells = Iter::new(bytes).collect::<Result<Vec<_>, _>>()?;
            let [selector, value] = cells[..] else {
                return Err(Error::CellCount {
                    typ: typ.to_string(),
                    expected: 2,
                    found: cells.len(),
                });
            };
            if selector.container {
                return Err(Error::CellKind {
                    index: 0,
                    container: true,
                });
            }
            let selector = decode_int(selector.bytes.ok_or(Error::Unset)?)?;
            let alt = usize::try_from(selector)
                .ok()
                .and_then(|s| u.types().get(s))
                .ok_or(Error::BadSelector {
                    selector,
                    alternatives: u.types().len(),
                })?;
            check_cell(1, alt, value, false)
        }
        Type::Alias(_) => unreachable!("under() strips aliases"),
    }
}

fn check_elements(inner: &Type, bytes: &[u8]) -> Result<(), Error> {
    for (index, cell) in Iter::new(bytes).enumerate() {
        check_cell(index, inner, cell?, false)?;
    }
    Ok(())
}

fn check_cell(index: usize, typ: &Type, cell: Cell<'_>, nullable: bool) -> Result<(), Error> {
    match cell.bytes {
        None if !nullable && typ.is_container() => Err(Error::UnsetNested(typ.to_string())),
        None => Ok(()),
        Some(bytes) => {
            if cell.container != typ.is_container() {
                return Err(Error::CellKind {
                    index,
                    container: cell.container,
                });
            }
            check(typ, Some(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, TypeContext};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn cells(data: &[u8]) -> Vec<(Option<Vec<u8>>, bool)> {
        Iter::new(data)
            .map(|c| {
                let c = c.unwrap();
                (c.bytes.map(<[u8]>::to_vec), c.container)
            })
            .collect()
    }

    #[test]
    fn tags_encode_length_and_kind() {
        let mut b = Builder::new();
        b.append_primitive(None);
        b.append_primitive(Some(b"ab"));
        b.append_container(Some(&[]));
        assert_eq!(b.bytes().unwrap(), &[0, 5, b'a', b'b', 2]);
    }

    #[test]
    fn nested_containers() {
        let mut b = Builder::new();
        b.begin_container();
        b.append_primitive(Some(&[7]));
        b.begin_container();
        b.append_primitive(None);
        b.end_container().unwrap();
        b.end_container().unwrap();
        let outer = cells(b.bytes().unwrap());
        assert_eq!(outer.len(), 1);
        let (Some(body), true) = &outer[0] else {
            panic!("expected a container, got {:?}", outer)
        };
        assert_eq!(
            cells(body),
            vec![(Some(vec![7]), false), (Some(vec![0]), true)]
        );
    }

    #[test]
    fn unbalanced_builders_are_errors() {
        let mut b = Builder::new();
        assert!(matches!(b.end_container(), Err(Error::Unbalanced)));
        b.begin_container();
        assert!(matches!(b.bytes(), Err(Error::Unbalanced)));
        b.reset();
        assert_eq!(b.bytes().unwrap(), &[] as &[u8]);
    }

    #[test]
    fn truncated_cells_are_reported_once() {
        let mut iter = Iter::new(&[9, 1]);
        assert!(matches!(
            iter.next(),
            Some(Err(DecodeError::Truncated {
                needed: 4,
                available: 1
            }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn primitives_reject_trailing_bytes() {
        let mut bytes = encode_int(300);
        assert_eq!(
            Primitive::decode(PrimitiveType::Int64, &bytes).unwrap(),
            Primitive::Int64(300)
        );
        bytes.push(0);
        assert!(matches!(
            Primitive::decode(PrimitiveType::Int64, &bytes),
            Err(DecodeError::TrailingBytes(1))
        ));
        assert!(matches!(
            Primitive::decode(PrimitiveType::Float64, &[0; 7]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            Primitive::decode(PrimitiveType::String, &[0xff]),
            Err(DecodeError::BadString)
        ));
    }

    fn sample_type(ctx: &mut TypeContext) -> Arc<RecordType> {
        let tags = ctx.lookup_array(&PrimitiveType::String.into()).unwrap();
        ctx.lookup_record(vec![
            Column::new("id", PrimitiveType::Int64.into()),
            Column::new("name", PrimitiveType::String.into()),
            Column::new("tags", Type::Array(tags)),
        ])
        .unwrap()
    }

    #[test]
    fn record_access() {
        let mut ctx = TypeContext::new();
        let typ = sample_type(&mut ctx);
        let mut b = Builder::new();
        b.append_primitive(Some(&encode_int(-4)));
        b.append_primitive(Some(b"bob"));
        b.begin_container();
        b.append_primitive(Some(b"x"));
        b.append_primitive(None);
        b.end_container().unwrap();
        let rec = Record::new(typ, b.into_bytes().unwrap()).unwrap();
        assert_eq!(rec.field_count(), 3);
        assert_eq!(rec.access_int("id").unwrap(), -4);
        assert_eq!(rec.access_string("name").unwrap(), "bob");
        let tags = rec.access("tags").unwrap().elements().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].as_str().unwrap(), "x");
        assert!(tags[1].is_null());
        assert!(matches!(
            rec.access("missing"),
            Err(Error::MissingField(name)) if name == "missing"
        ));
        rec.validate().unwrap();
    }

    #[test]
    fn record_shape_is_checked() {
        let mut ctx = TypeContext::new();
        let typ = sample_type(&mut ctx);
        let mut b = Builder::new();
        b.append_primitive(Some(&encode_int(1)));
        b.append_primitive(None);
        assert!(matches!(
            Record::new(typ.clone(), b.bytes().unwrap().to_vec()),
            Err(Error::CellCount {
                expected: 3,
                found: 2,
                ..
            })
        ));
        b.append_primitive(Some(b"not a container"));
        assert!(matches!(
            Record::new(typ, b.into_bytes().unwrap()),
            Err(Error::CellKind {
                index: 2,
                container: false
            })
        ));
    }

    #[test]
    fn union_selectors_are_range_checked() {
        let mut ctx = TypeContext::new();
        let u = ctx
            .lookup_union(&[PrimitiveType::String.into(), PrimitiveType::Int64.into()])
            .unwrap();
        let typ = ctx
            .lookup_record(vec![Column::new("u", Type::Union(u))])
            .unwrap();
        let mut b = Builder::new();
        b.begin_container();
        b.append_primitive(Some(&encode_int(2)));
        b.append_primitive(Some(&encode_int(9)));
        b.end_container().unwrap();
        let rec = Record::new(typ, b.into_bytes().unwrap()).unwrap();
        assert!(matches!(
            rec.validate(),
            Err(Error::BadSelector {
                selector: 2,
                alternatives: 2
            })
        ));
    }

    #[test]
    fn nested_records_cannot_be_unset() {
        let mut ctx = TypeContext::new();
        let inner = ctx
            .lookup_record(vec![Column::new("a", PrimitiveType::Int64.into())])
            .unwrap();
        let arr = ctx.lookup_array(&Type::Record(inner)).unwrap();
        let typ = ctx
            .lookup_record(vec![Column::new("xs", Type::Array(arr))])
            .unwrap();
        let mut b = Builder::new();
        b.begin_container();
        b.append_container(None);
        b.end_container().unwrap();
        let rec = Record::new(typ, b.into_bytes().unwrap()).unwrap();
        assert!(matches!(rec.validate(), Err(Error::UnsetNested(_))));
    }

    proptest! {
        #[test]
        fn builder_output_iterates_back(input in proptest::collection::vec(
            (proptest::option::of(proptest::collection::vec(any::<u8>(), 0..200)), any::<bool>()),
            0..20,
        )) {
            let mut b = Builder::new();
            for (bytes, container) in &input {
                if *container {
                    b.append_container(bytes.as_deref());
                } else {
                    b.append_primitive(bytes.as_deref());
                }
            }
            let decoded = cells(b.bytes().unwrap());
            let expected = input
                .into_iter()
                .map(|(bytes, container)| {
                    let container = container && bytes.is_some();
                    (bytes, container)
                })
                .collect::<Vec<_>>();
            prop_assert_eq!(decoded, expected);
        }
    }

    #[test]
    fn cell_len_counts_the_tag() {
        for len in [0, 1, 62, 63, 64, 8190, 8191, 8192, 1 << 20] {
            let bytes = vec![7_u8; len];
            for container in [false, true] {
                let mut out = Vec::new();
                append_cell(&mut out, Some(&bytes), container);
                assert_eq!(cell_len(Some(&bytes), container), out.len(), "{} {}", len, container);
            }
        }
        let mut out = Vec::new();
        append_cell(&mut out, None, false);
        assert_eq!(cell_len(None, false), out.len());
    }
}
