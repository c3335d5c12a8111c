use std::sync::Arc;

use smol_str::SmolStr;

use crate::{
    storage::ReadAt,
    types::{Column, RecordType, Type, TypeContext},
    value::{self, Builder, Iter, ValueRef},
};

use super::{
    reassembly_field, ColumnReader, ColumnWriter, Error, PresenceReader, PresenceWriter, Spiller,
};

struct FieldWriter {
    name: SmolStr,
    column: ColumnWriter,
    presence: PresenceWriter,
}

/// Records: one column per field, each with a presence column recording which cells of the
/// field were set. Unset cells are not written to the field's column.
pub(crate) struct RecordWriter {
    fields: Vec<FieldWriter>,
}

impl RecordWriter {
    pub(crate) fn new(typ: &RecordType) -> Self {
        RecordWriter {
            fields: typ
                .columns()
                .iter()
                .map(|col| FieldWriter {
                    name: col.name.clone(),
                    column: ColumnWriter::new(&col.typ),
                    presence: PresenceWriter::new(),
                })
                .collect(),
        }
    }

    pub(crate) fn write(&mut self, body: Option<&[u8]>, spiller: &mut Spiller) -> Result<(), Error> {
        let body = body.ok_or_else(|| value::Error::UnsetNested("record".to_string()))?;
        self.write_fields(body, spiller)
    }

    /// Write the fields of a record body which isn't wrapped in a container
    pub(crate) fn write_fields(&mut self, body: &[u8], spiller: &mut Spiller) -> Result<(), Error> {
        let cells = Iter::new(body)
            .collect::<Result<Vec<_>, _>>()
            .map_err(value::Error::from)?;
        if cells.len() != self.fields.len() {
            return Err(value::Error::CellCount {
                typ: "record".to_string(),
                expected: self.fields.len(),
                found: cells.len(),
            }
            .into());
        }
        for (field, cell) in self.fields.iter_mut().zip(cells) {
            match cell.bytes {
                Some(bytes) => {
                    field.presence.touch_value(spiller)?;
                    field.column.write(Some(bytes), spiller)?;
                }
                None => field.presence.touch_unset(spiller)?,
            }
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        for field in &mut self.fields {
            field.column.flush(spiller)?;
            field.presence.flush(spiller)?;
        }
        Ok(())
    }

    pub(crate) fn finish(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        for field in &mut self.fields {
            field.column.finish(spiller)?;
            field.presence.finish(spiller)?;
        }
        Ok(())
    }

    /// Append the reassembly value of every field to `b`, without an enclosing container
    pub(crate) fn encode_fields(
        &self,
        ctx: &mut TypeContext,
        b: &mut Builder,
    ) -> Result<Arc<RecordType>, Error> {
        let mut columns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            b.begin_container();
            let column = field.column.encode(ctx, b)?;
            let presence = field.presence.encode(ctx, b)?;
            b.end_container()?;
            let typ = ctx.lookup_record(vec![
                Column::new("column", column),
                Column::new("presence", presence),
            ])?;
            columns.push(Column::new(field.name.clone(), Type::Record(typ)));
        }
        Ok(ctx.lookup_record(columns)?)
    }

    pub(crate) fn encode(&self, ctx: &mut TypeContext, b: &mut Builder) -> Result<Type, Error> {
        b.begin_container();
        let typ = self.encode_fields(ctx, b)?;
        b.end_container()?;
        Ok(Type::Record(typ))
    }
}

struct FieldReader {
    name: SmolStr,
    column: ColumnReader,
    presence: PresenceReader,
}

pub(crate) struct RecordReader {
    fields: Vec<FieldReader>,
}

impl RecordReader {
    pub(crate) fn new(
        typ: &RecordType,
        reassembly: ValueRef<'_>,
        source: &Arc<dyn ReadAt>,
    ) -> Result<Self, Error> {
        let fields = typ
            .columns()
            .iter()
            .map(|col| field_reader(col, reassembly, source).map_err(|e| e.in_column(&col.name)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordReader { fields })
    }

    /// Read the next record and append its field cells to `b` without an enclosing container
    pub(crate) fn read_fields(&mut self, b: &mut Builder) -> Result<(), Error> {
        for field in &mut self.fields {
            let present = field
                .presence
                .next()
                .map_err(|e| e.in_column("presence").in_column(&field.name))?;
            if present {
                field
                    .column
                    .read(b)
                    .map_err(|e| e.in_column("column").in_column(&field.name))?;
            } else {
                b.append_primitive(None);
            }
        }
        Ok(())
    }

    pub(crate) fn read(&mut self, b: &mut Builder) -> Result<(), Error> {
        b.begin_container();
        self.read_fields(b)?;
        b.end_container()?;
        Ok(())
    }
}

fn field_reader(
    col: &Column,
    reassembly: ValueRef<'_>,
    source: &Arc<dyn ReadAt>,
) -> Result<FieldReader, Error> {
    let field = reassembly_field(reassembly, &col.name)?;
    let column = reassembly_field(field, "column")
        .and_then(|v| ColumnReader::new(&col.typ, v, source))
        .map_err(|e| e.in_column("column"))?;
    let presence = reassembly_field(field, "presence")
        .and_then(|v| PresenceReader::new(v, source))
        .map_err(|e| e.in_column("presence"))?;
    Ok(FieldReader {
        name: col.name.clone(),
        column,
        presence,
    })
}
