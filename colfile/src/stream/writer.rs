use std::io::Write;

use rustc_hash::FxHashMap;

use super::{Error, ALIAS_DEF, ARRAY_DEF, EOS, ESCAPE, RECORD_DEF, SET_DEF, UNION_DEF};
use crate::{
    encoding::Encodable,
    types::{Type, TypeId, FIRST_COMPLEX_ID},
    value::Record,
};

/// Writes records, along with the definitions of any types they need, to an underlying
/// writer.
#[derive(Debug)]
pub struct StreamWriter<W: Write> {
    out: W,
    position: u64,
    // Display form of every type defined since the last end of stream -> wire id
    wire: FxHashMap<String, TypeId>,
    next_id: TypeId,
    buf: Vec<u8>,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(out: W) -> Self {
        StreamWriter {
            out,
            position: 0,
            wire: FxHashMap::default(),
            next_id: FIRST_COMPLEX_ID,
            buf: Vec::new(),
        }
    }

    pub fn write(&mut self, rec: &Record) -> Result<(), Error> {
        let id = self.define(&Type::Record(rec.typ().clone()));
        if id < ESCAPE as usize {
            self.buf.push(id as u8);
        } else {
            self.buf.push(ESCAPE);
            id.encode(&mut self.buf);
        }
        rec.body().len().encode(&mut self.buf);
        self.buf.extend_from_slice(rec.body());
        self.emit()
    }

    /// Write an end of stream marker. Types written after this are defined afresh.
    pub fn end_stream(&mut self) -> Result<(), Error> {
        self.buf.push(EOS);
        self.wire.clear();
        self.next_id = FIRST_COMPLEX_ID;
        self.emit()
    }

    /// The number of bytes written so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W, Error> {
        self.flush()?;
        Ok(self.out)
    }

    fn emit(&mut self) -> Result<(), Error> {
        self.out.write_all(&self.buf)?;
        self.position += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    // Returns the wire id of `typ`, appending typedefs for it and anything it refers to which
    // hasn't been defined yet in this stream.
    fn define(&mut self, typ: &Type) -> TypeId {
        if let Type::Primitive(p) = typ {
            return p.id();
        }
        let key = typ.to_string();
        if let Some(id) = self.wire.get(&key) {
            return *id;
        }
        match typ {
            Type::Primitive(_) => unreachable!(),
            Type::Record(rec) => {
                let ids = rec
                    .columns()
                    .iter()
                    .map(|c| self.define(&c.typ))
                    .collect::<Vec<_>>();
                self.buf.push(RECORD_DEF);
                ids.len().encode(&mut self.buf);
                for (col, id) in rec.columns().iter().zip(ids) {
                    col.name.as_str().encode(&mut self.buf);
                    id.encode(&mut self.buf);
                }
            }
            Type::Array(a) => {
                let inner = self.define(a.inner());
                self.buf.push(ARRAY_DEF);
                inner.encode(&mut self.buf);
            }
            Type::Set(s) => {
                let inner = self.define(s.inner());
                self.buf.push(SET_DEF);
                inner.encode(&mut self.buf);
            }
            Type::Union(u) => {
                let ids = u
                    .types()
                    .iter()
                    .map(|t| self.define(t))
                    .collect::<Vec<_>>();
                self.buf.push(UNION_DEF);
                ids.len().encode(&mut self.buf);
                for id in ids {
                    id.encode(&mut self.buf);
                }
            }
            Type::Alias(a) => {
                let target = self.define(a.target());
                self.buf.push(ALIAS_DEF);
                a.name().encode(&mut self.buf);
                target.encode(&mut self.buf);
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        self.wire.insert(key, id);
        id
    }
}
