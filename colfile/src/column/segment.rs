use crate::{
    config::MAX_SEGMENT_SIZE,
    storage::ReadAt,
    types::{Column, PrimitiveType, Type, TypeContext},
    value::{encode_int, Builder, ValueRef},
};

use super::{ColumnError, ColumnErrorKind, Error};

/// The type of every segment map
pub const SEGMAP_TYPE: &str = "array[record[offset:int64,length:int64]]";

/// A contiguous range of the object holding one flushed chunk of one column
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
}

impl Segment {
    /// Read the bytes of this segment
    pub(crate) fn read(&self, source: &dyn ReadAt) -> Result<Vec<u8>, Error> {
        if self.length > MAX_SEGMENT_SIZE as u64 {
            return Err(ColumnErrorKind::SegmentTooLarge {
                length: self.length,
                max: MAX_SEGMENT_SIZE,
            }
            .into());
        }
        let mut buf = vec![0; self.length as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match source.read_at(&mut buf[filled..], self.offset + filled as u64) {
                Ok(0) => {
                    return Err(ColumnErrorKind::TruncatedRead {
                        expected: self.length,
                        found: filled as u64,
                    }
                    .into())
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(buf)
    }
}

pub(crate) fn segmap_type(ctx: &mut TypeContext) -> Result<Type, Error> {
    let seg = ctx.lookup_record(vec![
        Column::new("offset", PrimitiveType::Int64.into()),
        Column::new("length", PrimitiveType::Int64.into()),
    ])?;
    Ok(Type::Array(ctx.lookup_array(&Type::Record(seg))?))
}

/// Append a segment map cell to `b`
pub(crate) fn encode_segmap(
    segments: &[Segment],
    ctx: &mut TypeContext,
    b: &mut Builder,
) -> Result<Type, Error> {
    b.begin_container();
    for seg in segments {
        b.begin_container();
        b.append_primitive(Some(&encode_int(seg.offset as i64)));
        b.append_primitive(Some(&encode_int(seg.length as i64)));
        b.end_container()?;
    }
    b.end_container()?;
    segmap_type(ctx)
}

pub(crate) fn parse_segmap(val: ValueRef<'_>) -> Result<Vec<Segment>, ColumnError> {
    let bad = |reason: String| ColumnError::from(ColumnErrorKind::BadSegmap(reason));
    if val.typ.to_string() != SEGMAP_TYPE {
        return Err(bad(format!("unexpected type {}", val.typ)));
    }
    let elements = val.elements().map_err(|e| bad(e.to_string()))?;
    let mut segments = Vec::with_capacity(elements.len());
    for elem in elements {
        let offset = elem
            .field("offset")
            .and_then(|o| o.as_int())
            .map_err(|e| bad(format!("offset: {}", e)))?;
        let length = elem
            .field("length")
            .and_then(|l| l.as_int())
            .map_err(|e| bad(format!("length: {}", e)))?;
        if offset < 0 {
            return Err(bad(format!("negative offset {}", offset)));
        }
        if length < 0 {
            return Err(ColumnErrorKind::NegativeLength(length).into());
        }
        segments.push(Segment {
            offset: offset as u64,
            length: length as u64,
        });
    }
    Ok(segments)
}
