use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use colfile::{
    types::{Column, PrimitiveType, RecordType, Type, TypeContext},
    value::Record,
    Error, MemoryStorage, ReadAt, Reader, ReaderState, ScanOutcome, Storage, WriterOptions,
    SEGMAP_TYPE,
};
use colfile_test::{fields, realize, record, write_all, Datum};
use pretty_assertions::assert_eq;

// set up logging for all the tests
use test_log::test;

fn schemas(ctx: &mut TypeContext) -> (Arc<RecordType>, Arc<RecordType>) {
    let a = ctx
        .lookup_record(vec![
            Column::new("i", PrimitiveType::Int64.into()),
            Column::new("s", PrimitiveType::String.into()),
        ])
        .unwrap();
    let b = ctx
        .lookup_record(vec![Column::new("f", PrimitiveType::Float64.into())])
        .unwrap();
    (a, b)
}

fn populate(n: i64) -> (Arc<MemoryStorage>, Vec<Datum>) {
    let mut ctx = TypeContext::new();
    let (a, b) = schemas(&mut ctx);
    let records: Vec<Record> = (0..n)
        .map(|i| {
            if i % 4 == 3 {
                record(&b, fields! { "f" => i as f64 })
            } else {
                record(&a, fields! { "i" => i, "s" => format!("#{}", i).as_str() })
            }
        })
        .collect();
    let storage = Arc::new(MemoryStorage::new());
    write_all(
        &storage,
        "obj",
        WriterOptions::default()
            .with_col_thresh(128)
            .with_skew_thresh(1024),
        &records,
    );
    (storage, records.iter().map(realize).collect())
}

#[test]
fn readers_move_through_their_states() {
    let (storage, expected) = populate(20);
    let mut reader = Reader::open(storage.as_ref(), "obj").unwrap();
    assert_eq!(reader.state(), ReaderState::Unopened);
    assert!(reader.schemas().is_empty());

    reader.load_metadata().unwrap();
    assert_eq!(reader.state(), ReaderState::MetadataLoaded);
    assert_eq!(reader.schemas().len(), 2);
    // loading again does nothing
    reader.load_metadata().unwrap();

    let first = reader.read().unwrap().unwrap();
    assert_eq!(realize(&first), expected[0]);
    assert_eq!(reader.state(), ReaderState::Streaming);

    let rest: Vec<Datum> = reader.records().map(|r| realize(&r.unwrap())).collect();
    assert_eq!(rest, expected[1..]);
    assert_eq!(reader.state(), ReaderState::Exhausted);
    assert!(reader.read().unwrap().is_none());

    reader.close();
    assert_eq!(reader.state(), ReaderState::Closed);
    assert!(matches!(reader.read(), Err(Error::Closed)));
    assert!(matches!(reader.reassembly_records(), Err(Error::Closed)));
    reader.close();
}

#[test]
fn reading_loads_metadata_on_demand() {
    let (storage, expected) = populate(5);
    let mut reader = Reader::open(storage.as_ref(), "obj").unwrap();
    let read: Vec<Datum> = reader.records().map(|r| realize(&r.unwrap())).collect();
    assert_eq!(read, expected);
}

#[test]
fn scans_stop_when_cancelled() {
    let (storage, expected) = populate(100);
    let mut reader = Reader::open(storage.as_ref(), "obj").unwrap();
    let cancel = AtomicBool::new(false);
    let mut seen = Vec::new();
    let outcome = reader
        .scan(&cancel, |rec| {
            seen.push(realize(&rec));
            if seen.len() == 10 {
                cancel.store(true, Ordering::Release);
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(outcome, ScanOutcome::Cancelled { delivered: 10 });
    assert_eq!(seen, expected[..10]);

    // a cancelled reader is still intact and picks up where it left off
    cancel.store(false, Ordering::Release);
    let outcome = reader
        .scan(&cancel, |rec| {
            seen.push(realize(&rec));
            Ok(())
        })
        .unwrap();
    assert_eq!(outcome, ScanOutcome::Completed { delivered: 90 });
    assert_eq!(outcome.delivered(), 90);
    assert_eq!(seen, expected);
}

#[test]
fn scans_stop_at_the_first_callback_error() {
    let (storage, _) = populate(10);
    let mut reader = Reader::open(storage.as_ref(), "obj").unwrap();
    let cancel = AtomicBool::new(false);
    let mut calls = 0;
    let result = reader.scan(&cancel, |_| {
        calls += 1;
        if calls == 3 {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    });
    assert!(matches!(result, Err(Error::Closed)));
    assert_eq!(calls, 3);
}

#[test]
fn many_readers_can_share_one_object() {
    let (storage, expected) = populate(2_000);
    let size = storage.size("obj").unwrap();
    let source: Arc<dyn ReadAt> = storage.open("obj").unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let source = source.clone();
                scope.spawn(move || {
                    let mut reader = Reader::from_source(source, size).unwrap();
                    reader
                        .records()
                        .map(|r| realize(&r.unwrap()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn reassembly_section_can_be_inspected() {
    let (storage, _) = populate(30);
    let reader = Reader::open(storage.as_ref(), "obj").unwrap();
    let reassembly = reader.reassembly_records().unwrap();
    // two type dictionary records, the root record and two schema records
    assert_eq!(reassembly.len(), 5);
    assert!(reassembly[..2]
        .iter()
        .all(|r| r.values().all(|v| v.is_null())));
    assert_eq!(
        Type::Record(reassembly[2].typ().clone()).to_string(),
        format!("record[root:{}]", SEGMAP_TYPE)
    );
    let schema_a = realize(&reassembly[3]);
    assert!(matches!(schema_a.field("i").field("column"), Datum::List(segs) if !segs.is_empty()));
    // inspecting doesn't open the reader
    assert_eq!(reader.state(), ReaderState::Unopened);
}
