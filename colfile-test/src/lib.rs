use std::sync::Arc;

use colfile::{
    types::{PrimitiveType, RecordType, Type},
    value::{encode_int, Builder, Primitive, Record, ValueRef},
    MemoryStorage, Reader, Trailer, Writer, WriterOptions,
};
use smol_str::SmolStr;

/// A fully decoded value. Tests build records out of these and compare what comes back from a
/// reader against them.
///
/// Integer types of all widths (and times) realize as [`Datum::Int`], arrays and sets both
/// realize as [`Datum::List`].
#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    Unset,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(SmolStr),
    Bytes(Vec<u8>),
    List(Vec<Datum>),
    Record(Vec<(SmolStr, Datum)>),
    Union(usize, Box<Datum>),
}

impl Datum {
    /// The field called `name` of a record datum. Panics if there isn't one.
    pub fn field(&self, name: &str) -> &Datum {
        match self {
            Datum::Record(fields) => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, d)| d)
                .unwrap_or_else(|| panic!("no field {} in {:?}", name, self)),
            other => panic!("{:?} is not a record", other),
        }
    }

    /// Follow a path of field names through nested records
    pub fn path_mut(&mut self, path: &[&str]) -> &mut Datum {
        let Some((first, rest)) = path.split_first() else {
            return self;
        };
        let fields = match self {
            Datum::Record(fields) => fields,
            other => panic!("{:?} is not a record", other),
        };
        let field = fields
            .iter_mut()
            .find(|(n, _)| n == first)
            .map(|(_, d)| d)
            .unwrap_or_else(|| panic!("no field {}", first));
        field.path_mut(rest)
    }
}

/// Construct a `Datum::Record`
///
/// ```
/// # use colfile_test::{fields, Datum};
/// let d = fields! { "a" => 1, "b" => "two" };
/// assert_eq!(
///     d,
///     Datum::Record(vec![("a".into(), Datum::Int(1)), ("b".into(), Datum::String("two".into()))])
/// );
/// ```
#[macro_export]
macro_rules! fields {
    ($($name: expr => $value: expr),* $(,)?) => {
        $crate::Datum::Record(vec![$(($name.into(), $crate::Datum::from($value))),*])
    };
}

/// Construct a `Datum::List`
#[macro_export]
macro_rules! list {
    ($($value: expr),* $(,)?) => {
        $crate::Datum::List(vec![$($crate::Datum::from($value)),*])
    };
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Self {
        Datum::Int(i)
    }
}

impl From<i32> for Datum {
    fn from(i: i32) -> Self {
        Datum::Int(i.into())
    }
}

impl From<u64> for Datum {
    fn from(u: u64) -> Self {
        Datum::Uint(u)
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Self {
        Datum::Float(f)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.into())
    }
}

impl From<Vec<u8>> for Datum {
    fn from(b: Vec<u8>) -> Self {
        Datum::Bytes(b)
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Datum::Unset)
    }
}

/// Select alternative `selector` of a union
pub fn union<D: Into<Datum>>(selector: usize, value: D) -> Datum {
    Datum::Union(selector, Box::new(value.into()))
}

/// Decode a value
pub fn realize_value(val: ValueRef<'_>) -> Datum {
    if val.is_null() {
        return Datum::Unset;
    }
    match val.typ.under() {
        Type::Primitive(_) => match val.primitive().unwrap() {
            Primitive::Bool(b) => Datum::Bool(b),
            Primitive::Int32(i) => Datum::Int(i.into()),
            Primitive::Int64(i) | Primitive::Time(i) => Datum::Int(i),
            Primitive::Uint64(u) => Datum::Uint(u),
            Primitive::Float64(f) => Datum::Float(f),
            Primitive::String(s) => Datum::String(s),
            Primitive::Bytes(b) => Datum::Bytes(b),
            Primitive::Null => Datum::Unset,
        },
        Type::Record(rec) => Datum::Record(
            rec.columns()
                .iter()
                .zip(val.fields().unwrap())
                .map(|(col, v)| (col.name.clone(), realize_value(v)))
                .collect(),
        ),
        Type::Array(_) | Type::Set(_) => {
            Datum::List(val.elements().unwrap().into_iter().map(realize_value).collect())
        }
        Type::Union(_) => {
            let (selector, inner) = val.union().unwrap();
            Datum::Union(selector, Box::new(realize_value(inner)))
        }
        Type::Alias(_) => unreachable!("under() removes aliases"),
    }
}

/// Decode every field of a record
pub fn realize(rec: &Record) -> Datum {
    Datum::Record(
        rec.typ()
            .columns()
            .iter()
            .zip(rec.values())
            .map(|(col, v)| (col.name.clone(), realize_value(v)))
            .collect(),
    )
}

/// Append the encoding of `datum` as a value of type `typ` to `b`. Panics if the datum doesn't
/// fit the type.
pub fn append(b: &mut Builder, typ: &Type, datum: &Datum) {
    match (typ.under(), datum) {
        (_, Datum::Unset) => b.append_primitive(None),
        (Type::Primitive(p), d) => {
            let prim = match (p, d) {
                (PrimitiveType::Bool, Datum::Bool(v)) => Primitive::Bool(*v),
                (PrimitiveType::Int32, Datum::Int(i)) => Primitive::Int32(*i as i32),
                (PrimitiveType::Int64, Datum::Int(i)) => Primitive::Int64(*i),
                (PrimitiveType::Time, Datum::Int(i)) => Primitive::Time(*i),
                (PrimitiveType::Uint64, Datum::Uint(u)) => Primitive::Uint64(*u),
                (PrimitiveType::Float64, Datum::Float(f)) => Primitive::Float64(*f),
                (PrimitiveType::String, Datum::String(s)) => Primitive::String(s.clone()),
                (PrimitiveType::Bytes, Datum::Bytes(v)) => Primitive::Bytes(v.clone()),
                (p, d) => panic!("{:?} is not a {}", d, p.name()),
            };
            b.append_primitive(prim.encode().as_deref());
        }
        (Type::Record(rec), Datum::Record(fields)) => {
            b.begin_container();
            append_fields(b, rec, fields);
            b.end_container().unwrap();
        }
        (Type::Array(a), Datum::List(elems)) => append_list(b, a.inner(), elems),
        (Type::Set(s), Datum::List(elems)) => append_list(b, s.inner(), elems),
        (Type::Union(u), Datum::Union(selector, inner)) => {
            let alt = &u.types()[*selector];
            b.begin_container();
            b.append_primitive(Some(&encode_int(*selector as i64)));
            append(b, alt, inner);
            b.end_container().unwrap();
        }
        (t, d) => panic!("{:?} is not a {}", d, t),
    }
}

fn append_list(b: &mut Builder, inner: &Type, elems: &[Datum]) {
    b.begin_container();
    for elem in elems {
        append(b, inner, elem);
    }
    b.end_container().unwrap();
}

fn append_fields(b: &mut Builder, typ: &RecordType, fields: &[(SmolStr, Datum)]) {
    for col in typ.columns() {
        let datum = fields
            .iter()
            .find(|(name, _)| *name == col.name)
            .map(|(_, d)| d)
            .unwrap_or(&Datum::Unset);
        append(b, &col.typ, datum);
    }
}

/// Build a record of type `typ` from a `Datum::Record`. Fields missing from `datum` are unset.
pub fn record(typ: &Arc<RecordType>, datum: Datum) -> Record {
    let Datum::Record(fields) = datum else {
        panic!("{:?} is not a record", datum);
    };
    let mut b = Builder::new();
    append_fields(&mut b, typ, &fields);
    Record::new(typ.clone(), b.into_bytes().unwrap()).unwrap()
}

/// Write `records` to a new object in `storage`
pub fn write_all(
    storage: &Arc<MemoryStorage>,
    uri: &str,
    options: WriterOptions,
    records: &[Record],
) -> Trailer {
    let mut writer = Writer::create(storage.clone(), uri, options).unwrap();
    for rec in records {
        writer.write(rec).unwrap();
    }
    writer.close().unwrap()
}

/// Read every record of an object and realize it
pub fn read_all(storage: &MemoryStorage, uri: &str) -> Vec<Datum> {
    let mut reader = Reader::open(storage, uri).unwrap();
    reader
        .records()
        .map(|r| realize(&r.unwrap()))
        .collect()
}

/// Compare realized records, printing a diff on failure
pub fn assert_realized(actual: &[Datum], expected: &[Datum]) {
    pretty_assertions::assert_eq!(actual, expected);
}
