use std::sync::Arc;

use crate::{
    storage::ReadAt,
    types::{Column, Type, TypeContext},
    value::{self, decode_int, encode_int, Builder, Iter, ValueRef},
};

use super::{
    reassembly_field, ColumnErrorKind, ColumnReader, ColumnWriter, Error, IntReader, IntWriter,
    Spiller,
};

/// Unions: one column per alternative, plus a selector column recording which alternative
/// each value took.
pub(crate) struct UnionWriter {
    values: Vec<ColumnWriter>,
    selector: IntWriter,
}

impl UnionWriter {
    pub(crate) fn new(types: &[Type]) -> Self {
        UnionWriter {
            values: types.iter().map(ColumnWriter::new).collect(),
            selector: IntWriter::new(),
        }
    }

    pub(crate) fn write(&mut self, body: Option<&[u8]>, spiller: &mut Spiller) -> Result<(), Error> {
        let body = body.ok_or_else(|| value::Error::UnsetNested("union".to_string()))?;
        let cells = Iter::new(body)
            .collect::<Result<Vec<_>, _>>()
            .map_err(value::Error::from)?;
        let [selector, val] = cells[..] else {
            return Err(value::Error::CellCount {
                typ: "union".to_string(),
                expected: 2,
                found: cells.len(),
            }
            .into());
        };
        let selector = decode_int(selector.bytes.ok_or(value::Error::Unset)?)
            .map_err(value::Error::from)?;
        let alternatives = self.values.len();
        let column = usize::try_from(selector)
            .ok()
            .and_then(|s| self.values.get_mut(s))
            .ok_or(value::Error::BadSelector {
                selector,
                alternatives,
            })?;
        column.write(val.bytes, spiller)?;
        self.selector.write(selector, spiller)
    }

    pub(crate) fn flush(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        for column in &mut self.values {
            column.flush(spiller)?;
        }
        self.selector.flush(spiller)
    }

    pub(crate) fn finish(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        for column in &mut self.values {
            column.finish(spiller)?;
        }
        self.selector.flush(spiller)
    }

    pub(crate) fn encode(&self, ctx: &mut TypeContext, b: &mut Builder) -> Result<Type, Error> {
        b.begin_container();
        let mut columns = Vec::with_capacity(self.values.len() + 1);
        for (k, column) in self.values.iter().enumerate() {
            columns.push(Column::new(format!("c{}", k), column.encode(ctx, b)?));
        }
        columns.push(Column::new("selector", self.selector.encode(ctx, b)?));
        b.end_container()?;
        Ok(Type::Record(ctx.lookup_record(columns)?))
    }
}

pub(crate) struct UnionReader {
    values: Vec<ColumnReader>,
    selector: IntReader,
}

impl UnionReader {
    pub(crate) fn new(
        types: &[Type],
        reassembly: ValueRef<'_>,
        source: &Arc<dyn ReadAt>,
    ) -> Result<Self, Error> {
        let values = types
            .iter()
            .enumerate()
            .map(|(k, typ)| {
                let name = format!("c{}", k);
                reassembly_field(reassembly, &name)
                    .and_then(|v| ColumnReader::new(typ, v, source))
                    .map_err(|e| e.in_column(&name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let selector = reassembly_field(reassembly, "selector")
            .and_then(|v| IntReader::new(v, source))
            .map_err(|e| e.in_column("selector"))?;
        Ok(UnionReader { values, selector })
    }

    pub(crate) fn read(&mut self, b: &mut Builder) -> Result<(), Error> {
        let selector = self
            .selector
            .read_required()
            .map_err(|e| e.in_column("selector"))?;
        let alternatives = self.values.len();
        let Some((k, column)) = usize::try_from(selector)
            .ok()
            .and_then(|k| self.values.get_mut(k).map(|c| (k, c)))
        else {
            return Err(Error::from(ColumnErrorKind::BadSelector {
                selector,
                alternatives,
            })
            .in_column("selector"));
        };
        b.begin_container();
        b.append_primitive(Some(&encode_int(selector)));
        column.read(b).map_err(|e| e.in_column(format!("c{}", k)))?;
        b.end_container()?;
        Ok(())
    }
}
