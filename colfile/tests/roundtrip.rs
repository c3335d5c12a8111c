use std::sync::Arc;

use colfile::{
    types::{Column, PrimitiveType, RecordType, Type, TypeContext},
    value::Record,
    MemoryStorage, Reader, WriterOptions,
};
use colfile_test::{assert_realized, fields, list, read_all, realize, record, union, write_all, Datum};
use proptest::prelude::*;

// set up logging for all the tests
use test_log::test;

fn small_options() -> WriterOptions {
    WriterOptions::default()
        .with_col_thresh(64)
        .with_skew_thresh(256)
}

struct Schemas {
    flat: Arc<RecordType>,
    nested: Arc<RecordType>,
    other: Arc<RecordType>,
}

fn schemas(ctx: &mut TypeContext) -> Schemas {
    let strings = ctx.lookup_array(&PrimitiveType::String.into()).unwrap();
    let ints = ctx.lookup_set(&PrimitiveType::Int64.into()).unwrap();
    let addr = ctx
        .lookup_record(vec![
            Column::new("host", PrimitiveType::String.into()),
            Column::new("port", PrimitiveType::Int32.into()),
        ])
        .unwrap();
    let addrs = ctx.lookup_array(&Type::Record(addr.clone())).unwrap();
    let port = ctx
        .lookup_alias("port", &PrimitiveType::Uint64.into())
        .unwrap();
    let value = ctx
        .lookup_union(&[
            PrimitiveType::Int64.into(),
            PrimitiveType::String.into(),
            Type::Array(strings.clone()),
        ])
        .unwrap();
    let flat = ctx
        .lookup_record(vec![
            Column::new("ts", PrimitiveType::Time.into()),
            Column::new("ok", PrimitiveType::Bool.into()),
            Column::new("ratio", PrimitiveType::Float64.into()),
            Column::new("raw", PrimitiveType::Bytes.into()),
        ])
        .unwrap();
    let nested = ctx
        .lookup_record(vec![
            Column::new("src", Type::Record(addr)),
            Column::new("peers", Type::Array(addrs)),
            Column::new("tags", Type::Array(strings)),
            Column::new("ids", Type::Set(ints)),
            Column::new("value", Type::Union(value)),
            Column::new("dport", Type::Alias(port)),
        ])
        .unwrap();
    let other = ctx
        .lookup_record(vec![Column::new("msg", PrimitiveType::String.into())])
        .unwrap();
    Schemas {
        flat,
        nested,
        other,
    }
}

fn mixed_records(s: &Schemas, n: i64) -> Vec<Record> {
    (0..n)
        .map(|i| match i % 3 {
            0 => record(
                &s.flat,
                fields! {
                    "ts" => i,
                    "ok" => i % 2 == 0,
                    "ratio" => i as f64 / 7.0,
                    "raw" => vec![i as u8; (i % 5) as usize],
                },
            ),
            1 => record(
                &s.nested,
                fields! {
                    "src" => fields! { "host" => "10.0.0.1", "port" => i as i32 },
                    "peers" => Datum::List(
                        (0..(i % 4))
                            .map(|p| fields! { "host" => "peer", "port" => p as i32 })
                            .collect(),
                    ),
                    "tags" => if i % 2 == 0 { list!["a", "b"] } else { list![] },
                    "ids" => list![i, i + 1],
                    "value" => match i % 4 {
                        0 => union(0, i),
                        1 => union(1, "one"),
                        2 => union(2, list!["x", "y", "z"]),
                        _ => Datum::Unset,
                    },
                    "dport" => (i as u64) * 10,
                },
            ),
            _ => record(&s.other, fields! { "msg" => format!("message {}", i).as_str() }),
        })
        .collect()
}

#[test]
fn mixed_schemas_round_trip() {
    let mut ctx = TypeContext::new();
    let s = schemas(&mut ctx);
    let records = mixed_records(&s, 300);
    let expected: Vec<Datum> = records.iter().map(realize).collect();

    for options in [WriterOptions::default(), small_options()] {
        let storage = Arc::new(MemoryStorage::new());
        write_all(&storage, "obj", options, &records);
        assert_realized(&read_all(&storage, "obj"), &expected);
    }
}

#[test]
fn record_types_come_back_structurally_equal() {
    let mut ctx = TypeContext::new();
    let s = schemas(&mut ctx);
    let records = mixed_records(&s, 6);
    let storage = Arc::new(MemoryStorage::new());
    write_all(&storage, "obj", WriterOptions::default(), &records);

    let mut reader = Reader::open(storage.as_ref(), "obj").unwrap();
    reader.load_metadata().unwrap();
    // schemas are numbered in order of first appearance
    let schemas = reader.schemas();
    assert_eq!(schemas.len(), 3);
    assert_eq!(*schemas[0], *s.flat);
    assert_eq!(*schemas[1], *s.nested);
    assert_eq!(*schemas[2], *s.other);

    let read: Vec<Record> = reader.records().map(Result::unwrap).collect();
    assert_eq!(read.len(), records.len());
    for (got, want) in read.iter().zip(&records) {
        assert_eq!(got.body(), want.body());
        // and they can be brought back into the caller's context
        let translated = ctx.translate_record(got.typ()).unwrap();
        assert!(Arc::ptr_eq(&translated, want.typ()));
    }
}

#[test]
fn thresholds_do_not_change_what_is_read() {
    let mut ctx = TypeContext::new();
    let s = schemas(&mut ctx);
    let records = mixed_records(&s, 10_000);

    let tiny = Arc::new(MemoryStorage::new());
    write_all(&tiny, "obj", small_options(), &records);
    let default = Arc::new(MemoryStorage::new());
    write_all(&default, "obj", WriterOptions::default(), &records);
    let large = Arc::new(MemoryStorage::new());
    write_all(
        &large,
        "obj",
        WriterOptions::default()
            .with_skew_thresh(10 * 1024 * 1024)
            .with_col_thresh(1024 * 1024),
        &records,
    );

    let expected = read_all(&default, "obj");
    assert_eq!(expected.len(), 10_000);
    assert_realized(&read_all(&tiny, "obj"), &expected);
    assert_realized(&read_all(&large, "obj"), &expected);
    // smaller thresholds mean more, smaller segments
    assert_ne!(tiny.get("obj").unwrap().len(), default.get("obj").unwrap().len());
}

#[test]
fn presence_patterns_round_trip() {
    let mut ctx = TypeContext::new();
    let typ = ctx
        .lookup_record(vec![
            Column::new("alternating", PrimitiveType::Int64.into()),
            Column::new("always", PrimitiveType::String.into()),
            Column::new("never", PrimitiveType::Int64.into()),
            Column::new("late", PrimitiveType::Bool.into()),
        ])
        .unwrap();
    let records: Vec<Record> = (0..50_i64)
        .map(|i| {
            record(
                &typ,
                fields! {
                    "alternating" => (i % 2 == 1).then_some(i),
                    "always" => "here",
                    "never" => Option::<i64>::None,
                    "late" => (i >= 40).then_some(true),
                },
            )
        })
        .collect();
    let expected: Vec<Datum> = records.iter().map(realize).collect();
    let storage = Arc::new(MemoryStorage::new());
    write_all(&storage, "obj", small_options(), &records);
    assert_realized(&read_all(&storage, "obj"), &expected);

    // always present and never present fields have no presence runs
    let reader = Reader::open(storage.as_ref(), "obj").unwrap();
    let reassembly = reader.reassembly_records().unwrap();
    let schema = realize(reassembly.last().unwrap());
    assert_eq!(schema.field("always").field("presence"), &Datum::List(vec![]));
    assert_eq!(schema.field("never").field("presence"), &Datum::Unset);
    assert_ne!(schema.field("alternating").field("presence"), &Datum::List(vec![]));
}

#[test]
fn empty_objects_are_valid() {
    let storage = Arc::new(MemoryStorage::new());
    let trailer = write_all(&storage, "obj", WriterOptions::default(), &[]);
    assert!(trailer.is_empty());

    let mut reader = Reader::open(storage.as_ref(), "obj").unwrap();
    assert!(reader.is_empty());
    assert!(reader.trailer().sections.is_empty());
    assert_eq!(reader.size(), storage.get("obj").unwrap().len() as u64);
    assert!(reader.read().unwrap().is_none());
    assert!(reader.read().unwrap().is_none());
    assert!(reader.reassembly_records().unwrap().is_empty());
}

#[test]
fn schemas_are_isolated() {
    let mut ctx = TypeContext::new();
    let s = schemas(&mut ctx);
    let others: Vec<Record> = (0..200)
        .map(|i| record(&s.other, fields! { "msg" => format!("m{}", i).as_str() }))
        .collect();
    let flats: Vec<Record> = (0..200)
        .map(|i| record(&s.flat, fields! { "ts" => i as i64, "ok" => true }))
        .collect();

    // segment boundaries then depend only on each column's own threshold
    let options = WriterOptions::default().with_col_thresh(64);

    // the same "other" records alone and interleaved with a second schema
    let alone = Arc::new(MemoryStorage::new());
    write_all(&alone, "obj", options, &others);
    let interleaved: Vec<Record> = others
        .iter()
        .zip(&flats)
        .flat_map(|(o, f)| [o.clone(), f.clone()])
        .collect();
    let mixed = Arc::new(MemoryStorage::new());
    write_all(&mixed, "obj", options, &interleaved);

    let segment_bytes = |storage: &MemoryStorage, schema: usize| -> Vec<Vec<u8>> {
        let object = storage.get("obj").unwrap();
        let reader = Reader::open(storage, "obj").unwrap();
        let reassembly = reader.reassembly_records().unwrap();
        let msg = realize(&reassembly[reassembly.len() - reader_schema_count(&reassembly) + schema]);
        let Datum::List(segments) = msg.field("msg").field("column") else {
            panic!("expected a segment map");
        };
        segments
            .iter()
            .map(|seg| {
                let (Datum::Int(offset), Datum::Int(length)) = (seg.field("offset"), seg.field("length"))
                else {
                    panic!("bad segment {:?}", seg);
                };
                object[*offset as usize..(*offset + *length) as usize].to_vec()
            })
            .collect()
    };
    // the "msg" column is cut into identical segments either way
    let alone_segments = segment_bytes(alone.as_ref(), 0);
    assert!(alone_segments.len() > 1);
    assert_eq!(alone_segments, segment_bytes(mixed.as_ref(), 0));
}

// the number of schemas is the number of all-unset records at the start
fn reader_schema_count(reassembly: &[Record]) -> usize {
    reassembly
        .iter()
        .take_while(|r| r.values().all(|v| v.is_null()))
        .count()
}

fn arb_row() -> impl Strategy<Value = (u8, Option<i64>, Option<String>, Vec<i64>)> {
    (
        0..2_u8,
        proptest::option::of(any::<i64>()),
        proptest::option::of("[a-z]{0,12}"),
        proptest::collection::vec(any::<i64>(), 0..4),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn arbitrary_sequences_round_trip(rows in proptest::collection::vec(arb_row(), 0..120)) {
        let mut ctx = TypeContext::new();
        let list = ctx.lookup_array(&PrimitiveType::Int64.into()).unwrap();
        let a = ctx
            .lookup_record(vec![
                Column::new("n", PrimitiveType::Int64.into()),
                Column::new("s", PrimitiveType::String.into()),
            ])
            .unwrap();
        let b = ctx
            .lookup_record(vec![
                Column::new("s", PrimitiveType::String.into()),
                Column::new("l", Type::Array(list)),
            ])
            .unwrap();
        let records: Vec<Record> = rows
            .iter()
            .map(|(which, n, s, l)| {
                let s = Datum::from(s.as_deref());
                if *which == 0 {
                    record(&a, fields! { "n" => *n, "s" => s })
                } else {
                    record(&b, fields! { "s" => s, "l" => Datum::List(l.iter().map(|i| Datum::Int(*i)).collect()) })
                }
            })
            .collect();
        let expected: Vec<Datum> = records.iter().map(realize).collect();
        let storage = Arc::new(MemoryStorage::new());
        write_all(&storage, "obj", small_options(), &records);
        prop_assert_eq!(read_all(&storage, "obj"), expected);
    }
}
