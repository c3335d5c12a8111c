//! The columnar codec engine.
//!
//! Every value type has a writer which splits its cells into one or more leaf columns, and a
//! reader which stitches them back together. Leaf columns buffer encoded cells and hand them
//! to the [`Spiller`] in segments once they grow past the column threshold.
//!
//! After the last record each writer describes its columns with a *reassembly* value: a
//! record mirroring the shape of the type, whose leaves are the segment maps of the leaf
//! columns. Readers are constructed from a type and its reassembly value.
use std::sync::Arc;

use crate::{
    storage::ReadAt,
    types::{Type, TypeContext, TypeError},
    value::{self, Builder, ValueRef},
};

mod array;
mod error;
mod int;
mod presence;
mod primitive;
mod record;
pub(crate) mod segment;
mod spiller;
mod union;

pub use error::{ColumnError, ColumnErrorKind};
pub use segment::{Segment, SEGMAP_TYPE};

pub(crate) use array::{ArrayReader, ArrayWriter};
pub(crate) use int::{IntReader, IntWriter};
pub(crate) use presence::{PresenceReader, PresenceWriter};
pub(crate) use primitive::{PrimitiveReader, PrimitiveWriter};
pub(crate) use record::{RecordReader, RecordWriter};
pub(crate) use spiller::Spiller;
pub(crate) use union::{UnionReader, UnionWriter};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Corrupt(#[from] ColumnError),
    #[error("value does not match its type: {0}")]
    Shape(#[from] value::Error),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("a {length} byte segment exceeds the maximum of {max}")]
    Oversize { length: usize, max: usize },
}

impl Error {
    pub(crate) fn in_column<S: AsRef<str>>(self, col: S) -> Self {
        match self {
            Error::Corrupt(e) => Error::Corrupt(e.in_column(col)),
            other => other,
        }
    }
}

impl From<ColumnErrorKind> for Error {
    fn from(kind: ColumnErrorKind) -> Self {
        Error::Corrupt(kind.into())
    }
}

/// Look up a named field of a reassembly record
pub(crate) fn reassembly_field<'a>(val: ValueRef<'a>, name: &str) -> Result<ValueRef<'a>, Error> {
    val.field(name)
        .map_err(|e| Error::Corrupt(ColumnError::bad_reassembly(e)))
}

pub(crate) enum ColumnWriter {
    Primitive(PrimitiveWriter),
    Record(RecordWriter),
    Array(ArrayWriter),
    Union(UnionWriter),
}

impl ColumnWriter {
    pub(crate) fn new(typ: &Type) -> Self {
        match typ.under() {
            Type::Record(rec) => ColumnWriter::Record(RecordWriter::new(rec)),
            Type::Array(a) => ColumnWriter::Array(ArrayWriter::new(a.inner())),
            Type::Set(s) => ColumnWriter::Array(ArrayWriter::new(s.inner())),
            Type::Union(u) => ColumnWriter::Union(UnionWriter::new(u.types())),
            _ => ColumnWriter::Primitive(PrimitiveWriter::new()),
        }
    }

    pub(crate) fn write(&mut self, cell: Option<&[u8]>, spiller: &mut Spiller) -> Result<(), Error> {
        match self {
            ColumnWriter::Primitive(w) => w.write(cell, spiller),
            ColumnWriter::Record(w) => w.write(cell, spiller),
            ColumnWriter::Array(w) => w.write(cell, spiller),
            ColumnWriter::Union(w) => w.write(cell, spiller),
        }
    }

    /// Spill everything buffered so far
    pub(crate) fn flush(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        match self {
            ColumnWriter::Primitive(w) => w.flush(spiller),
            ColumnWriter::Record(w) => w.flush(spiller),
            ColumnWriter::Array(w) => w.flush(spiller),
            ColumnWriter::Union(w) => w.flush(spiller),
        }
    }

    /// Like [`Self::flush`], but also closes off any pending presence runs. Nothing may be
    /// written afterwards.
    pub(crate) fn finish(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        match self {
            ColumnWriter::Primitive(w) => w.flush(spiller),
            ColumnWriter::Record(w) => w.finish(spiller),
            ColumnWriter::Array(w) => w.finish(spiller),
            ColumnWriter::Union(w) => w.finish(spiller),
        }
    }

    /// Append the reassembly value of this column to `b` and return its type
    pub(crate) fn encode(&self, ctx: &mut TypeContext, b: &mut Builder) -> Result<Type, Error> {
        match self {
            ColumnWriter::Primitive(w) => w.encode(ctx, b),
            ColumnWriter::Record(w) => w.encode(ctx, b),
            ColumnWriter::Array(w) => w.encode(ctx, b),
            ColumnWriter::Union(w) => w.encode(ctx, b),
        }
    }
}

pub(crate) enum ColumnReader {
    Primitive(PrimitiveReader),
    Record(RecordReader),
    Array(ArrayReader),
    Union(UnionReader),
}

impl ColumnReader {
    pub(crate) fn new(
        typ: &Type,
        reassembly: ValueRef<'_>,
        source: &Arc<dyn ReadAt>,
    ) -> Result<Self, Error> {
        Ok(match typ.under() {
            Type::Record(rec) => ColumnReader::Record(RecordReader::new(rec, reassembly, source)?),
            Type::Array(a) => ColumnReader::Array(ArrayReader::new(a.inner(), reassembly, source)?),
            Type::Set(s) => ColumnReader::Array(ArrayReader::new(s.inner(), reassembly, source)?),
            Type::Union(u) => ColumnReader::Union(UnionReader::new(u.types(), reassembly, source)?),
            _ => ColumnReader::Primitive(PrimitiveReader::new(reassembly, source)?),
        })
    }

    /// Read the next cell of this column and append it to `b`
    pub(crate) fn read(&mut self, b: &mut Builder) -> Result<(), Error> {
        match self {
            ColumnReader::Primitive(r) => r.read(b),
            ColumnReader::Record(r) => r.read(b),
            ColumnReader::Array(r) => r.read(b),
            ColumnReader::Union(r) => r.read(b),
        }
    }
}
