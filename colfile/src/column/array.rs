use std::sync::Arc;

use crate::{
    storage::ReadAt,
    types::{Column, Type, TypeContext},
    value::{self, Builder, Iter, ValueRef},
};

use super::{
    reassembly_field, ColumnReader, ColumnWriter, Error, IntReader, IntWriter, Spiller,
};

/// Arrays and sets: the elements of every value go to one inner column, and the number of
/// elements in each value goes to a lengths column.
pub(crate) struct ArrayWriter {
    values: Box<ColumnWriter>,
    lengths: IntWriter,
}

impl ArrayWriter {
    pub(crate) fn new(inner: &Type) -> Self {
        ArrayWriter {
            values: Box::new(ColumnWriter::new(inner)),
            lengths: IntWriter::new(),
        }
    }

    pub(crate) fn write(&mut self, body: Option<&[u8]>, spiller: &mut Spiller) -> Result<(), Error> {
        let body = body.ok_or_else(|| value::Error::UnsetNested("array".to_string()))?;
        let mut len = 0;
        for cell in Iter::new(body) {
            let cell = cell.map_err(value::Error::from)?;
            self.values.write(cell.bytes, spiller)?;
            len += 1;
        }
        self.lengths.write(len, spiller)
    }

    pub(crate) fn flush(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        self.values.flush(spiller)?;
        self.lengths.flush(spiller)
    }

    pub(crate) fn finish(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        self.values.finish(spiller)?;
        self.lengths.flush(spiller)
    }

    pub(crate) fn encode(&self, ctx: &mut TypeContext, b: &mut Builder) -> Result<Type, Error> {
        b.begin_container();
        let values = self.values.encode(ctx, b)?;
        let lengths = self.lengths.encode(ctx, b)?;
        b.end_container()?;
        Ok(Type::Record(ctx.lookup_record(vec![
            Column::new("values", values),
            Column::new("lengths", lengths),
        ])?))
    }
}

pub(crate) struct ArrayReader {
    values: Box<ColumnReader>,
    lengths: IntReader,
}

impl ArrayReader {
    pub(crate) fn new(
        inner: &Type,
        reassembly: ValueRef<'_>,
        source: &Arc<dyn ReadAt>,
    ) -> Result<Self, Error> {
        let values = reassembly_field(reassembly, "values")
            .and_then(|v| ColumnReader::new(inner, v, source))
            .map_err(|e| e.in_column("values"))?;
        let lengths = reassembly_field(reassembly, "lengths")
            .and_then(|v| IntReader::new(v, source))
            .map_err(|e| e.in_column("lengths"))?;
        Ok(ArrayReader {
            values: Box::new(values),
            lengths,
        })
    }

    pub(crate) fn read(&mut self, b: &mut Builder) -> Result<(), Error> {
        let len = self
            .lengths
            .read_len()
            .map_err(|e| e.in_column("lengths"))?;
        b.begin_container();
        for _ in 0..len {
            self.values
                .read(b)
                .map_err(|e| e.in_column("values"))?;
        }
        b.end_container()?;
        Ok(())
    }
}
