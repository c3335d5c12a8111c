use std::{
    io::BufReader,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    column::{self, reassembly_field, ColumnError, IntReader, RecordReader},
    error::{Error, ErrorKind},
    storage::{ReadAt, SectionReader, Storage},
    stream::StreamReader,
    trailer::{self, Trailer},
    types::{RecordType, Type},
    value::{Builder, Record, ValueRef},
};

/// Where a [`Reader`] is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    /// The trailer has been found but the reassembly section hasn't been read yet
    Unopened,
    MetadataLoaded,
    Streaming,
    Exhausted,
    Closed,
    /// A previous call failed, every further call fails the same way
    Errored,
}

/// How a [`Reader::scan`] ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { delivered: u64 },
    Cancelled { delivered: u64 },
}

impl ScanOutcome {
    pub fn delivered(&self) -> u64 {
        match self {
            ScanOutcome::Completed { delivered } | ScanOutcome::Cancelled { delivered } => {
                *delivered
            }
        }
    }
}

struct SchemaReader {
    typ: Arc<RecordType>,
    reader: RecordReader,
}

struct Assembly {
    root: IntReader,
    schemas: Vec<SchemaReader>,
    started: bool,
}

impl Assembly {
    fn next(&mut self, b: &mut Builder) -> Result<Option<Record>, Error> {
        self.started = true;
        let Some(id) = self.root.read().map_err(|e| e.in_column("root"))? else {
            return Ok(None);
        };
        let count = self.schemas.len();
        let schema = usize::try_from(id)
            .ok()
            .and_then(|i| self.schemas.get_mut(i))
            .ok_or(Error::BadSchemaId { id, schemas: count })?;
        b.reset();
        schema.reader.read_fields(b)?;
        let body = b.bytes()?.to_vec();
        let rec = Record::new(schema.typ.clone(), body)
            .map_err(|e| Error::Column(ColumnError::bad_value(e)))?;
        Ok(Some(rec))
    }
}

enum State {
    Unopened,
    Loaded(Box<Assembly>),
    Exhausted,
    Closed,
    Errored { kind: ErrorKind, message: String },
}

/// Reads back the records of a columnar object, in the order they were written.
///
/// Opening a reader only locates and validates the trailer. The reassembly section is read
/// on the first call to [`Reader::read`] (or explicitly with [`Reader::load_metadata`]) and
/// column segments are fetched lazily as records are read. Once a call fails the reader is
/// poisoned and every later call returns [`Error::Poisoned`] with the original error's kind.
pub struct Reader {
    source: Option<Arc<dyn ReadAt>>,
    size: u64,
    trailer: Trailer,
    trailer_record: Record,
    trailer_len: u64,
    state: State,
    builder: Builder,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("size", &self.size)
            .field("trailer", &self.trailer)
            .field("state", &self.state())
            .finish()
    }
}

impl Reader {
    #[tracing::instrument(skip(storage), err)]
    pub fn open(storage: &dyn Storage, uri: &str) -> Result<Self, Error> {
        let size = storage.size(uri)?;
        let source = storage.open(uri)?;
        Self::from_source(source, size)
    }

    /// Open an object of `size` bytes
    pub fn from_source(source: Arc<dyn ReadAt>, size: u64) -> Result<Self, Error> {
        let found = trailer::discover(source.as_ref(), size)?;
        Ok(Reader {
            source: Some(source),
            size,
            trailer: found.trailer,
            trailer_record: found.record,
            trailer_len: found.len,
            state: State::Unopened,
            builder: Builder::new(),
        })
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    /// The trailer as it was decoded from the object
    pub fn trailer_record(&self) -> &Record {
        &self.trailer_record
    }

    /// The size of the whole object
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the object holds no records
    pub fn is_empty(&self) -> bool {
        self.trailer.is_empty()
    }

    pub fn state(&self) -> ReaderState {
        match &self.state {
            State::Unopened => ReaderState::Unopened,
            State::Loaded(a) if a.started => ReaderState::Streaming,
            State::Loaded(_) => ReaderState::MetadataLoaded,
            State::Exhausted => ReaderState::Exhausted,
            State::Closed => ReaderState::Closed,
            State::Errored { .. } => ReaderState::Errored,
        }
    }

    /// The record types stored in the object, in schema id order. Empty until the metadata
    /// has been loaded.
    pub fn schemas(&self) -> Vec<Arc<RecordType>> {
        match &self.state {
            State::Loaded(a) => a.schemas.iter().map(|s| s.typ.clone()).collect(),
            _ => Vec::new(),
        }
    }

    fn check_usable(&self) -> Result<(), Error> {
        match &self.state {
            State::Closed => Err(Error::Closed),
            State::Errored { kind, message } => Err(Error::Poisoned {
                kind: *kind,
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn poison(&mut self, err: &Error) {
        tracing::debug!(error = %err, "reader failed");
        self.state = State::Errored {
            kind: err.kind(),
            message: err.to_string(),
        };
    }

    // None for an object without records
    fn section_stream(&self) -> Result<Option<StreamReader<BufReader<SectionReader<'_>>>>, Error> {
        let source = self.source.as_deref().ok_or(Error::Closed)?;
        let (Some(data), Some(reassembly)) =
            (self.trailer.data_size(), self.trailer.reassembly_size())
        else {
            return Ok(None);
        };
        Ok(Some(StreamReader::new(BufReader::new(SectionReader::new(
            source,
            data,
            data + reassembly,
        )))))
    }

    /// Every record of the reassembly section, undecoded
    pub fn reassembly_records(&self) -> Result<Vec<Record>, Error> {
        self.check_usable()?;
        let Some(mut stream) = self.section_stream()? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        while let Some(rec) = stream.read()? {
            records.push(rec);
        }
        Ok(records)
    }

    /// Read the reassembly section and set up the column readers. Reading does this
    /// implicitly, calling it again is a no-op.
    #[tracing::instrument(skip(self), fields(size = self.size), err)]
    pub fn load_metadata(&mut self) -> Result<(), Error> {
        self.check_usable()?;
        if !matches!(self.state, State::Unopened) {
            return Ok(());
        }
        match self.parse_metadata() {
            Ok(assembly) => {
                tracing::debug!(
                    schemas = assembly.schemas.len(),
                    trailer_len = self.trailer_len,
                    "loaded reassembly metadata"
                );
                self.state = State::Loaded(Box::new(assembly));
                Ok(())
            }
            Err(e) => {
                self.poison(&e);
                Err(e)
            }
        }
    }

    fn parse_metadata(&self) -> Result<Assembly, Error> {
        let source = self.source.as_ref().ok_or(Error::Closed)?;
        let Some(mut stream) = self.section_stream()? else {
            return Ok(Assembly {
                root: IntReader::from_segments(Vec::new(), source),
                schemas: Vec::new(),
                started: false,
            });
        };

        // the type dictionary is every record before the first one with a set field
        let mut types = Vec::new();
        let root = loop {
            let rec = stream
                .read()?
                .ok_or_else(|| Error::Reassembly("missing root record".to_string()))?;
            if rec.values().all(|v| v.is_null()) {
                types.push(rec.typ().clone());
            } else {
                break rec;
            }
        };
        if types.is_empty() {
            return Err(Error::Reassembly("no schemas before the root record".to_string()));
        }

        let root_type = Type::Record(root.typ().clone());
        let root_val = ValueRef::new(&root_type, Some(root.body()));
        let root_reader = reassembly_field(root_val, "root")
            .and_then(|v| IntReader::new(v, source))
            .map_err(|e| e.in_column("root"))?;

        let mut schemas = Vec::with_capacity(types.len());
        for (id, typ) in types.into_iter().enumerate() {
            let rec = stream.read()?.ok_or_else(|| {
                Error::Reassembly(format!("missing reassembly record for schema {}", id))
            })?;
            let rec_type = Type::Record(rec.typ().clone());
            let reader = RecordReader::new(
                &typ,
                ValueRef::new(&rec_type, Some(rec.body())),
                source,
            )
            .map_err(|e: column::Error| e.in_column(format!("schema {}", id)))?;
            schemas.push(SchemaReader { typ, reader });
        }
        if stream.read()?.is_some() {
            return Err(Error::ExtraReassemblyRecords);
        }
        Ok(Assembly {
            root: root_reader,
            schemas,
            started: false,
        })
    }

    /// The next record, or `None` once every record has been read
    pub fn read(&mut self) -> Result<Option<Record>, Error> {
        self.check_usable()?;
        match self.state {
            State::Unopened => self.load_metadata()?,
            State::Exhausted => return Ok(None),
            _ => {}
        }
        let State::Loaded(assembly) = &mut self.state else {
            return Ok(None);
        };
        match assembly.next(&mut self.builder) {
            Ok(Some(rec)) => Ok(Some(rec)),
            Ok(None) => {
                tracing::trace!("reader exhausted");
                self.state = State::Exhausted;
                Ok(None)
            }
            Err(e) => {
                self.poison(&e);
                Err(e)
            }
        }
    }

    /// Iterate over the remaining records. The iterator ends after the first error.
    pub fn records(&mut self) -> Records<'_> {
        Records {
            reader: self,
            done: false,
        }
    }

    /// Deliver records to `f` until the object is exhausted, `f` fails, or `cancel` is set.
    /// Cancellation is checked before every record.
    pub fn scan<F>(&mut self, cancel: &AtomicBool, mut f: F) -> Result<ScanOutcome, Error>
    where
        F: FnMut(Record) -> Result<(), Error>,
    {
        let mut delivered = 0;
        loop {
            if cancel.load(Ordering::Acquire) {
                tracing::debug!(delivered, "scan cancelled");
                return Ok(ScanOutcome::Cancelled { delivered });
            }
            match self.read()? {
                Some(rec) => {
                    f(rec)?;
                    delivered += 1;
                }
                None => return Ok(ScanOutcome::Completed { delivered }),
            }
        }
    }

    /// Release the object. Closing twice is fine, anything else fails with [`Error::Closed`].
    pub fn close(&mut self) {
        self.source = None;
        self.state = State::Closed;
    }
}

/// The iterator returned by [`Reader::records`]
#[derive(Debug)]
pub struct Records<'a> {
    reader: &'a mut Reader,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
