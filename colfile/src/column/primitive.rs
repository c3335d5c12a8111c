use std::{collections::VecDeque, sync::Arc};

use crate::{
    config::MAX_SEGMENT_SIZE,
    storage::ReadAt,
    types::{Type, TypeContext},
    value::{append_cell, cell_len, Builder, Iter, ValueRef},
};

use super::{
    segment::{encode_segmap, parse_segmap, Segment},
    ColumnError, ColumnErrorKind, Error, Spiller,
};

/// A leaf column. Cells are buffered with their tags, so unset cells take a single byte.
pub(crate) struct PrimitiveWriter {
    bytes: Vec<u8>,
    segments: Vec<Segment>,
}

impl PrimitiveWriter {
    pub(crate) fn new() -> Self {
        PrimitiveWriter {
            bytes: Vec::new(),
            segments: Vec::new(),
        }
    }

    pub(crate) fn write(&mut self, cell: Option<&[u8]>, spiller: &mut Spiller) -> Result<(), Error> {
        let len = cell_len(cell, false);
        if len > MAX_SEGMENT_SIZE {
            return Err(Error::Oversize {
                length: len,
                max: MAX_SEGMENT_SIZE,
            });
        }
        // a segment never grows past the maximum, whatever the threshold
        if self.bytes.len() + len > MAX_SEGMENT_SIZE {
            self.flush(spiller)?;
        }
        append_cell(&mut self.bytes, cell, false);
        if self.bytes.len() >= spiller.thresh() {
            self.flush(spiller)?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self, spiller: &mut Spiller) -> Result<(), Error> {
        if !self.bytes.is_empty() {
            let seg = spiller.spill(&self.bytes)?;
            self.segments.push(seg);
            self.bytes.clear();
        }
        Ok(())
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub(crate) fn encode(&self, ctx: &mut TypeContext, b: &mut Builder) -> Result<Type, Error> {
        encode_segmap(&self.segments, ctx, b)
    }
}

pub(crate) struct PrimitiveReader {
    source: Arc<dyn ReadAt>,
    segments: VecDeque<Segment>,
    buf: Vec<u8>,
    pos: usize,
}

impl PrimitiveReader {
    pub(crate) fn new(reassembly: ValueRef<'_>, source: &Arc<dyn ReadAt>) -> Result<Self, Error> {
        Ok(Self::from_segments(parse_segmap(reassembly)?, source))
    }

    pub(crate) fn from_segments(segments: Vec<Segment>, source: &Arc<dyn ReadAt>) -> Self {
        PrimitiveReader {
            source: source.clone(),
            segments: segments.into(),
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// The next cell, or `None` once every segment has been consumed
    pub(crate) fn next_cell(&mut self) -> Result<Option<Option<&[u8]>>, Error> {
        while self.pos >= self.buf.len() {
            let Some(seg) = self.segments.pop_front() else {
                return Ok(None);
            };
            self.buf = seg.read(self.source.as_ref())?;
            self.pos = 0;
        }
        let unread = self.buf.len() - self.pos;
        let mut cells = Iter::new(&self.buf[self.pos..]);
        let cell = match cells.next() {
            Some(Ok(cell)) => cell,
            Some(Err(e)) => return Err(ColumnError::bad_value(e).into()),
            None => return Ok(None),
        };
        if cell.container {
            return Err(ColumnError::bad_value("container in a primitive column").into());
        }
        let len = cell.bytes.map(<[u8]>::len);
        let consumed = unread - cells.remaining();
        let end = self.pos + consumed;
        self.pos = end;
        Ok(Some(len.map(|len| &self.buf[end - len..end])))
    }

    pub(crate) fn read(&mut self, b: &mut Builder) -> Result<(), Error> {
        match self.next_cell()? {
            Some(cell) => {
                b.append_primitive(cell);
                Ok(())
            }
            None => Err(ColumnErrorKind::Exhausted.into()),
        }
    }
}
