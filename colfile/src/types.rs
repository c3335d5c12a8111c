//! The type model of the records stored in a columnar object and the [`TypeContext`] which
//! interns them.
//!
//! Complex types (records, arrays, sets, unions and aliases) are always created through a
//! `TypeContext`, which hands out a shared `Arc` and a small integer id. Asking the same
//! context for a structurally identical type returns the same `Arc`, so ids can be used as
//! cheap identity within one context. Ids are meaningless across contexts; use
//! [`TypeContext::translate`] to move a type from one context to another.
use std::{fmt, sync::Arc};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

pub type TypeId = usize;

/// The first id handed out to a complex type. Ids below this are reserved for primitives.
pub const FIRST_COMPLEX_ID: TypeId = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    Int32,
    Int64,
    Uint64,
    Float64,
    String,
    Bytes,
    Time,
    Null,
}

impl PrimitiveType {
    pub fn id(self) -> TypeId {
        match self {
            Self::Bool => 0,
            Self::Int32 => 1,
            Self::Int64 => 2,
            Self::Uint64 => 3,
            Self::Float64 => 4,
            Self::String => 5,
            Self::Bytes => 6,
            Self::Time => 7,
            Self::Null => 8,
        }
    }

    pub fn from_id(id: TypeId) -> Option<Self> {
        match id {
            0 => Some(Self::Bool),
            1 => Some(Self::Int32),
            2 => Some(Self::Int64),
            3 => Some(Self::Uint64),
            4 => Some(Self::Float64),
            5 => Some(Self::String),
            6 => Some(Self::Bytes),
            7 => Some(Self::Time),
            8 => Some(Self::Null),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Time => "time",
            Self::Null => "null",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: SmolStr,
    pub typ: Type,
}

impl Column {
    pub fn new<S: Into<SmolStr>>(name: S, typ: Type) -> Self {
        Column {
            name: name.into(),
            typ,
        }
    }
}

#[derive(Debug)]
pub struct RecordType {
    id: TypeId,
    columns: Vec<Column>,
}

impl RecordType {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn type_of(&self, name: &str) -> Option<&Type> {
        self.column_index(name).map(|i| &self.columns[i].typ)
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

#[derive(Debug)]
pub struct ArrayType {
    id: TypeId,
    inner: Type,
}

impl ArrayType {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn inner(&self) -> &Type {
        &self.inner
    }
}

impl PartialEq for ArrayType {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

/// A set shares the physical layout of an array. Distinctness of the elements is not enforced
/// at this layer.
#[derive(Debug)]
pub struct SetType {
    id: TypeId,
    inner: Type,
}

impl SetType {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn inner(&self) -> &Type {
        &self.inner
    }
}

impl PartialEq for SetType {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

#[derive(Debug)]
pub struct UnionType {
    id: TypeId,
    types: Vec<Type>,
}

impl UnionType {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }
}

impl PartialEq for UnionType {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

#[derive(Debug)]
pub struct AliasType {
    id: TypeId,
    name: SmolStr,
    target: Type,
}

impl AliasType {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Type {
        &self.target
    }
}

impl PartialEq for AliasType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.target == other.target
    }
}

/// A type. Equality is structural, the context ids of complex types are ignored.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Primitive(PrimitiveType),
    Record(Arc<RecordType>),
    Array(Arc<ArrayType>),
    Set(Arc<SetType>),
    Union(Arc<UnionType>),
    Alias(Arc<AliasType>),
}

impl Type {
    pub fn id(&self) -> TypeId {
        match self {
            Self::Primitive(p) => p.id(),
            Self::Record(r) => r.id,
            Self::Array(a) => a.id,
            Self::Set(s) => s.id,
            Self::Union(u) => u.id,
            Self::Alias(a) => a.id,
        }
    }

    /// The type with every alias stripped off the top.
    pub fn under(&self) -> &Type {
        let mut typ = self;
        while let Type::Alias(alias) = typ {
            typ = &alias.target;
        }
        typ
    }

    /// Whether values of this type are encoded as containers
    pub fn is_container(&self) -> bool {
        !matches!(self.under(), Type::Primitive(_))
    }

    pub fn as_record(&self) -> Option<&Arc<RecordType>> {
        match self.under() {
            Type::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl From<PrimitiveType> for Type {
    fn from(p: PrimitiveType) -> Self {
        Type::Primitive(p)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.typ)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p),
            Type::Record(r) => write!(f, "record[{}]", r.columns.iter().join(",")),
            Type::Array(a) => write!(f, "array[{}]", a.inner),
            Type::Set(s) => write!(f, "set[{}]", s.inner),
            Type::Union(u) => write!(f, "union[{}]", u.types.iter().join(",")),
            Type::Alias(a) => write!(f, "{}=({})", a.name, a.target),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("duplicate field name `{0}` in record type")]
    DuplicateField(SmolStr),
    #[error("a union type needs at least one alternative")]
    EmptyUnion,
    #[error("alias `{0}` is already bound to a different type")]
    AliasRedefined(SmolStr),
    #[error("no type with id {0}")]
    UnknownId(TypeId),
}

/// Interns complex types and assigns them dense ids starting at [`FIRST_COMPLEX_ID`].
#[derive(Debug, Default)]
pub struct TypeContext {
    table: Vec<Type>,
    lut: FxHashMap<String, TypeId>,
    aliases: FxHashMap<SmolStr, TypeId>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of complex types interned so far
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn lookup(&self, id: TypeId) -> Result<Type, TypeError> {
        if id < FIRST_COMPLEX_ID {
            return PrimitiveType::from_id(id)
                .map(Type::Primitive)
                .ok_or(TypeError::UnknownId(id));
        }
        self.table
            .get(id - FIRST_COMPLEX_ID)
            .cloned()
            .ok_or(TypeError::UnknownId(id))
    }

    pub fn lookup_record(&mut self, columns: Vec<Column>) -> Result<Arc<RecordType>, TypeError> {
        let mut interned = Vec::with_capacity(columns.len());
        for col in columns {
            if interned.iter().any(|c: &Column| c.name == col.name) {
                return Err(TypeError::DuplicateField(col.name));
            }
            let typ = self.intern(&col.typ)?;
            interned.push(Column { name: col.name, typ });
        }
        let key = format!(
            "r{}",
            interned
                .iter()
                .map(|c| format!("{}:{};", c.name, c.typ.id()))
                .join("")
        );
        if let Some(Type::Record(r)) = self.existing(&key) {
            return Ok(r);
        }
        let id = self.next_id();
        let typ = Arc::new(RecordType {
            id,
            columns: interned,
        });
        self.insert(key, Type::Record(typ.clone()));
        Ok(typ)
    }

    pub fn lookup_array(&mut self, inner: &Type) -> Result<Arc<ArrayType>, TypeError> {
        let inner = self.intern(inner)?;
        let key = format!("a{}", inner.id());
        if let Some(Type::Array(a)) = self.existing(&key) {
            return Ok(a);
        }
        let typ = Arc::new(ArrayType {
            id: self.next_id(),
            inner,
        });
        self.insert(key, Type::Array(typ.clone()));
        Ok(typ)
    }

    pub fn lookup_set(&mut self, inner: &Type) -> Result<Arc<SetType>, TypeError> {
        let inner = self.intern(inner)?;
        let key = format!("s{}", inner.id());
        if let Some(Type::Set(s)) = self.existing(&key) {
            return Ok(s);
        }
        let typ = Arc::new(SetType {
            id: self.next_id(),
            inner,
        });
        self.insert(key, Type::Set(typ.clone()));
        Ok(typ)
    }

    pub fn lookup_union(&mut self, types: &[Type]) -> Result<Arc<UnionType>, TypeError> {
        if types.is_empty() {
            return Err(TypeError::EmptyUnion);
        }
        let types = types
            .iter()
            .map(|t| self.intern(t))
            .collect::<Result<Vec<_>, _>>()?;
        let key = format!("u{}", types.iter().map(|t| t.id()).join(","));
        if let Some(Type::Union(u)) = self.existing(&key) {
            return Ok(u);
        }
        let typ = Arc::new(UnionType {
            id: self.next_id(),
            types,
        });
        self.insert(key, Type::Union(typ.clone()));
        Ok(typ)
    }

    pub fn lookup_alias(&mut self, name: &str, target: &Type) -> Result<Arc<AliasType>, TypeError> {
        let target = self.intern(target)?;
        if let Some(id) = self.aliases.get(name) {
            if let Ok(Type::Alias(existing)) = self.lookup(*id) {
                if existing.target.id() == target.id() {
                    return Ok(existing);
                }
            }
            return Err(TypeError::AliasRedefined(name.into()));
        }
        let id = self.next_id();
        let typ = Arc::new(AliasType {
            id,
            name: name.into(),
            target,
        });
        self.insert(format!("n{}", name), Type::Alias(typ.clone()));
        self.aliases.insert(name.into(), id);
        Ok(typ)
    }

    /// Return the type in this context which is structurally identical to `typ`, creating it
    /// (and any types it is built from) if necessary.
    pub fn translate(&mut self, typ: &Type) -> Result<Type, TypeError> {
        Ok(match typ {
            Type::Primitive(p) => Type::Primitive(*p),
            Type::Record(r) => Type::Record(self.lookup_record(r.columns.clone())?),
            Type::Array(a) => Type::Array(self.lookup_array(&a.inner)?),
            Type::Set(s) => Type::Set(self.lookup_set(&s.inner)?),
            Type::Union(u) => Type::Union(self.lookup_union(&u.types)?),
            Type::Alias(a) => Type::Alias(self.lookup_alias(&a.name, &a.target)?),
        })
    }

    pub fn translate_record(&mut self, typ: &RecordType) -> Result<Arc<RecordType>, TypeError> {
        self.lookup_record(typ.columns.clone())
    }

    // Types which already live in this context are returned as is, anything else is
    // translated.
    fn intern(&mut self, typ: &Type) -> Result<Type, TypeError> {
        if let Type::Primitive(p) = typ {
            return Ok(Type::Primitive(*p));
        }
        if let Some(existing) = typ
            .id()
            .checked_sub(FIRST_COMPLEX_ID)
            .and_then(|i| self.table.get(i))
        {
            if same_arc(existing, typ) {
                return Ok(existing.clone());
            }
        }
        self.translate(typ)
    }

    fn existing(&self, key: &str) -> Option<Type> {
        self.lut
            .get(key)
            .and_then(|id| self.table.get(id - FIRST_COMPLEX_ID))
            .cloned()
    }

    fn next_id(&self) -> TypeId {
        FIRST_COMPLEX_ID + self.table.len()
    }

    fn insert(&mut self, key: String, typ: Type) {
        self.lut.insert(key, typ.id());
        self.table.push(typ);
    }
}

fn same_arc(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Record(x), Type::Record(y)) => Arc::ptr_eq(x, y),
        (Type::Array(x), Type::Array(y)) => Arc::ptr_eq(x, y),
        (Type::Set(x), Type::Set(y)) => Arc::ptr_eq(x, y),
        (Type::Union(x), Type::Union(y)) => Arc::ptr_eq(x, y),
        (Type::Alias(x), Type::Alias(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}
