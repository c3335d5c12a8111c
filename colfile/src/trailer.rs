//! The trailer at the end of every columnar object, and how a reader finds it.
//!
//! The trailer is a single record in the row stream format followed by an end of stream
//! marker. Because its first column is a string and its last is an `array[int64]`, its
//! serialized form always starts with the typedef of `array[int64]` immediately followed by a
//! record typedef. The reader scans backwards from the end of the object for that signature,
//! accepting only candidates which follow an end of stream marker (which is how the
//! reassembly section ends) or sit at the very start of the scanned window.
use std::io::Write;

use crate::{
    config::{ConfigError, Threshold, WriterOptions, MAX_COL_THRESH, MAX_SKEW_THRESH},
    error::Error,
    storage::ReadAt,
    stream::{StreamReader, StreamWriter, EOS},
    types::{Column, PrimitiveType, Type, TypeContext},
    value::{encode_int, Builder, Primitive, Record},
};

pub const MAGIC: &str = "zst";
pub const VERSION: i32 = 1;
/// How far back from the end of an object the trailer is searched for
pub const TRAILER_MAX_SIZE: usize = 4096;

// thresholds are stored as int32, validated options always fit
const _: () = assert!(
    MAX_SKEW_THRESH <= i32::MAX as usize && MAX_COL_THRESH <= i32::MAX as usize
);

// array[int64] typedef followed by a record typedef
const SIGNATURE: [u8; 3] = [0x81, 0x02, 0x80];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trailer {
    pub magic: String,
    pub version: i32,
    pub skew_thresh: i32,
    pub col_thresh: i32,
    /// Either empty, for an object with no records, or the lengths of the data and
    /// reassembly sections
    pub sections: Vec<i64>,
}

/// A trailer as found at the end of an object
pub(crate) struct Discovered {
    pub(crate) trailer: Trailer,
    pub(crate) record: Record,
    pub(crate) len: u64,
}

enum Rejection {
    /// Not a trailer of this format, keep looking
    Foreign,
    Fatal(Error),
}

impl From<Error> for Rejection {
    fn from(e: Error) -> Self {
        Rejection::Fatal(e)
    }
}

impl Trailer {
    /// Options which haven't been validated may not fit the int32 threshold fields; those are
    /// stored as `i32::MAX`, which discovery rejects as too large.
    pub fn new(options: &WriterOptions, sections: Vec<i64>) -> Self {
        Trailer {
            magic: MAGIC.to_string(),
            version: VERSION,
            skew_thresh: i32::try_from(options.skew_thresh).unwrap_or(i32::MAX),
            col_thresh: i32::try_from(options.col_thresh).unwrap_or(i32::MAX),
            sections,
        }
    }

    /// Whether the object holds no records
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn data_size(&self) -> Option<u64> {
        self.sections.first().map(|s| *s as u64)
    }

    pub fn reassembly_size(&self) -> Option<u64> {
        self.sections.get(1).map(|s| *s as u64)
    }

    pub fn to_record(&self) -> Result<Record, Error> {
        let mut ctx = TypeContext::new();
        let int32 = Type::Primitive(PrimitiveType::Int32);
        let sections = ctx.lookup_array(&PrimitiveType::Int64.into())?;
        let typ = ctx.lookup_record(vec![
            Column::new("magic", PrimitiveType::String.into()),
            Column::new("version", int32.clone()),
            Column::new("skew_thresh", int32.clone()),
            Column::new("col_thresh", int32),
            Column::new("sections", Type::Array(sections)),
        ])?;
        let mut b = Builder::new();
        b.append_primitive(Some(self.magic.as_bytes()));
        for i in [self.version, self.skew_thresh, self.col_thresh] {
            b.append_primitive(Primitive::Int32(i).encode().as_deref());
        }
        b.begin_container();
        for s in &self.sections {
            b.append_primitive(Some(&encode_int(*s)));
        }
        b.end_container()?;
        Ok(Record::new(typ, b.into_bytes()?)?)
    }

    /// Write the trailer followed by an end of stream marker
    pub fn write<W: Write>(&self, out: &mut StreamWriter<W>) -> Result<(), Error> {
        out.write(&self.to_record()?)?;
        out.end_stream()?;
        Ok(())
    }

    fn from_record(rec: &Record) -> Result<Self, Rejection> {
        match rec.access_string("magic") {
            Ok(magic) if magic == MAGIC => {}
            _ => return Err(Rejection::Foreign),
        }
        let corrupt = |what: &str, e: crate::value::Error| {
            Rejection::Fatal(Error::CorruptTrailer(format!("{}: {}", what, e)))
        };
        let version = rec
            .access_int("version")
            .map_err(|e| corrupt("version", e))?;
        if version != i64::from(VERSION) {
            return Err(Error::UnsupportedVersion {
                found: version,
                expected: VERSION,
            }
            .into());
        }
        let skew_thresh = rec
            .access_int("skew_thresh")
            .map_err(|e| corrupt("skew_thresh", e))?;
        let col_thresh = rec
            .access_int("col_thresh")
            .map_err(|e| corrupt("col_thresh", e))?;
        let sections = rec
            .access("sections")
            .and_then(|s| s.elements())
            .and_then(|elems| elems.iter().map(|e| e.as_int()).collect::<Result<Vec<_>, _>>())
            .map_err(|e| corrupt("sections", e))?;
        if !(sections.is_empty() || sections.len() == 2) || sections.iter().any(|s| *s < 0) {
            return Err(Error::CorruptTrailer(format!("bad section list {:?}", sections)).into());
        }
        Ok(Trailer {
            magic: MAGIC.to_string(),
            version: VERSION,
            skew_thresh: check_threshold(Threshold::Skew, skew_thresh)?,
            col_thresh: check_threshold(Threshold::Column, col_thresh)?,
            sections,
        })
    }
}

fn check_threshold(which: Threshold, value: i64) -> Result<i32, Rejection> {
    if value <= 0 {
        return Err(Error::BadTrailerThreshold(ConfigError::Zero { which }).into());
    }
    let as_usize = usize::try_from(value).unwrap_or(usize::MAX);
    which
        .check(as_usize)
        .map_err(|e| Rejection::Fatal(Error::BadTrailerThreshold(e)))?;
    // checked against a maximum which fits in an i32
    Ok(value as i32)
}

/// Find and validate the trailer of an object of `size` bytes
pub(crate) fn discover(source: &dyn ReadAt, size: u64) -> Result<Discovered, Error> {
    let window_len = size.min(TRAILER_MAX_SIZE as u64) as usize;
    if window_len < SIGNATURE.len() {
        return Err(Error::TrailerNotFound);
    }
    let window_start = size - window_len as u64;
    let mut window = vec![0; window_len];
    source.read_exact_at(&mut window, window_start)?;

    let mut saw_foreign = false;
    for off in (0..=window_len - SIGNATURE.len()).rev() {
        if window[off..off + SIGNATURE.len()] != SIGNATURE {
            continue;
        }
        if off > 0 && window[off - 1] != EOS {
            continue;
        }
        let Some(record) = parse_candidate(&window[off..]) else {
            continue;
        };
        match Trailer::from_record(&record) {
            Ok(trailer) => {
                let len = (window_len - off) as u64;
                if let [data, reassembly] = trailer.sections[..] {
                    if (data as u64).saturating_add(reassembly as u64).saturating_add(len) != size {
                        return Err(Error::CorruptTrailer(format!(
                            "sections of {} and {} bytes and a {} byte trailer don't add up to the object size {}",
                            data, reassembly, len, size
                        )));
                    }
                }
                tracing::debug!(offset = window_start + off as u64, len, "found trailer");
                return Ok(Discovered {
                    trailer,
                    record,
                    len,
                });
            }
            Err(Rejection::Foreign) => saw_foreign = true,
            Err(Rejection::Fatal(e)) => return Err(e),
        }
    }
    if saw_foreign {
        Err(Error::NotColumnar)
    } else {
        Err(Error::TrailerNotFound)
    }
}

// A candidate must be exactly one record followed by an end of stream marker which is the
// last byte of the object
fn parse_candidate(bytes: &[u8]) -> Option<Record> {
    let mut reader = StreamReader::new(bytes);
    let record = reader.read().ok()??;
    let rest: &[u8] = reader.into_inner();
    (rest == [EOS]).then_some(record)
}
