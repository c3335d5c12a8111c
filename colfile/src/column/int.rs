use std::sync::Arc;

use crate::{
    storage::ReadAt,
    types::{Type, TypeContext},
    value::{decode_int, encode_int, Builder, ValueRef},
};

use super::{
    primitive::{PrimitiveReader, PrimitiveWriter},
    ColumnError, ColumnErrorKind, Error, Segment, Spiller,
};

/// A column of integers, used for array lengths, union selectors, presence runs and the root
/// index.
pub(crate) struct IntWriter {
    column: PrimitiveWriter,
}

impl IntWriter {
    pub(crate) fn new() -> Self {
        IntWriter {
            column: PrimitiveWriter::new(),
        }
    }

    pub(crate) fn write(&mut self, val: i64, spiller: &mut Spiller) -> Result<(), Error> {
        self.column.write(Some(&encode_int(val)), spiller)
    }

    pub(crate) fn flush(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        self.column.flush(spiller)
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        self.column.segments()
    }

    pub(crate) fn encode(&self, ctx: &mut TypeContext, b: &mut Builder) -> Result<Type, Error> {
        self.column.encode(ctx, b)
    }
}

pub(crate) struct IntReader {
    column: PrimitiveReader,
}

impl IntReader {
    pub(crate) fn new(reassembly: ValueRef<'_>, source: &Arc<dyn ReadAt>) -> Result<Self, Error> {
        Ok(IntReader {
            column: PrimitiveReader::new(reassembly, source)?,
        })
    }

    pub(crate) fn from_segments(segments: Vec<Segment>, source: &Arc<dyn ReadAt>) -> Self {
        IntReader {
            column: PrimitiveReader::from_segments(segments, source),
        }
    }

    /// The next integer, or `None` at the end of the column
    pub(crate) fn read(&mut self) -> Result<Option<i64>, Error> {
        match self.column.next_cell()? {
            None => Ok(None),
            Some(None) => Err(ColumnError::bad_value("unset integer").into()),
            Some(Some(bytes)) => decode_int(bytes)
                .map(Some)
                .map_err(|e| ColumnError::bad_value(e).into()),
        }
    }

    /// The next integer, which must exist
    pub(crate) fn read_required(&mut self) -> Result<i64, Error> {
        self.read()?.ok_or_else(|| ColumnErrorKind::Exhausted.into())
    }

    /// The next integer as a count or index
    pub(crate) fn read_len(&mut self) -> Result<usize, Error> {
        let val = self.read_required()?;
        usize::try_from(val).map_err(|_| ColumnErrorKind::NegativeLength(val).into())
    }
}
