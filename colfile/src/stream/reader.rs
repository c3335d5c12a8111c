use std::io::{ErrorKind, Read};

use super::{
    Error, ALIAS_DEF, ARRAY_DEF, EOS, ESCAPE, MAX_MESSAGE_SIZE, RECORD_DEF, SET_DEF, UNION_DEF,
};
use crate::{
    encoding::Decodable,
    types::{Column, PrimitiveType, Type, TypeContext, TypeId, FIRST_COMPLEX_ID},
    value::Record,
};

/// Reads records from a row stream, interning the types it defines into a [`TypeContext`].
#[derive(Debug)]
pub struct StreamReader<R: Read> {
    input: R,
    ctx: TypeContext,
    wire: Vec<Type>,
}

impl<R: Read> StreamReader<R> {
    pub fn new(input: R) -> Self {
        Self::with_context(input, TypeContext::new())
    }

    pub fn with_context(input: R, ctx: TypeContext) -> Self {
        StreamReader {
            input,
            ctx,
            wire: Vec::new(),
        }
    }

    pub fn context(&self) -> &TypeContext {
        &self.ctx
    }

    pub fn into_inner(self) -> R {
        self.input
    }

    pub fn into_parts(self) -> (R, TypeContext) {
        (self.input, self.ctx)
    }

    /// Read the next record. Returns `Ok(None)` if the input ends cleanly between messages.
    pub fn read(&mut self) -> Result<Option<Record>, Error> {
        loop {
            let Some(code) = self.read_code()? else {
                return Ok(None);
            };
            match code {
                ESCAPE => {
                    let id = usize::decode(&mut self.input)?;
                    return self.read_record(id).map(Some);
                }
                0..=0x7e => return self.read_record(code as usize).map(Some),
                RECORD_DEF => {
                    let count = usize::decode(&mut self.input)?;
                    let mut columns = Vec::new();
                    for _ in 0..count {
                        let name = String::decode(&mut self.input)?;
                        let typ = self.read_type_ref()?;
                        columns.push(Column::new(name, typ));
                    }
                    let typ = self.ctx.lookup_record(columns)?;
                    self.wire.push(Type::Record(typ));
                }
                ARRAY_DEF => {
                    let inner = self.read_type_ref()?;
                    let typ = self.ctx.lookup_array(&inner)?;
                    self.wire.push(Type::Array(typ));
                }
                SET_DEF => {
                    let inner = self.read_type_ref()?;
                    let typ = self.ctx.lookup_set(&inner)?;
                    self.wire.push(Type::Set(typ));
                }
                UNION_DEF => {
                    let count = usize::decode(&mut self.input)?;
                    let mut types = Vec::new();
                    for _ in 0..count {
                        types.push(self.read_type_ref()?);
                    }
                    let typ = self.ctx.lookup_union(&types)?;
                    self.wire.push(Type::Union(typ));
                }
                ALIAS_DEF => {
                    let name = String::decode(&mut self.input)?;
                    let target = self.read_type_ref()?;
                    let typ = self.ctx.lookup_alias(&name, &target)?;
                    self.wire.push(Type::Alias(typ));
                }
                EOS => self.wire.clear(),
                other => return Err(Error::UnknownCode(other)),
            }
        }
    }

    fn read_code(&mut self) -> Result<Option<u8>, Error> {
        let mut buf = [0; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_type_ref(&mut self) -> Result<Type, Error> {
        let id = usize::decode(&mut self.input)?;
        self.wire_type(id)
    }

    fn wire_type(&self, id: TypeId) -> Result<Type, Error> {
        if id < FIRST_COMPLEX_ID {
            return PrimitiveType::from_id(id)
                .map(Type::Primitive)
                .ok_or(Error::UndefinedType(id));
        }
        self.wire
            .get(id - FIRST_COMPLEX_ID)
            .cloned()
            .ok_or(Error::UndefinedType(id))
    }

    fn read_record(&mut self, id: TypeId) -> Result<Record, Error> {
        let typ = self.wire_type(id)?;
        let Type::Record(rec) = typ else {
            return Err(Error::NotARecord(typ.to_string()));
        };
        let size = usize::decode(&mut self.input)?;
        if size > MAX_MESSAGE_SIZE {
            return Err(Error::Overlarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let mut body = vec![0; size];
        self.input.read_exact(&mut body)?;
        Ok(Record::new(rec, body)?)
    }
}
