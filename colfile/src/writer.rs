use std::{io::Write, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    column::{IntWriter, RecordWriter, Spiller},
    config::WriterOptions,
    error::Error,
    storage::Storage,
    stream::StreamWriter,
    trailer::Trailer,
    types::{Column, RecordType, Type, TypeContext, TypeId},
    value::{Builder, Record},
};

struct Schema {
    typ: Arc<RecordType>,
    writer: RecordWriter,
}

/// Writes records of any number of record types into a single columnar object.
///
/// Each distinct record type gets its own set of columns (a *schema*), and the schema of
/// every record is noted in the root index so that a [`crate::Reader`] can replay them in
/// their original order. Nothing is readable until [`Writer::close`] has written the
/// reassembly section and the trailer.
pub struct Writer {
    spiller: Spiller,
    // record types are translated into this context so schemas don't depend on the caller's
    // type ids
    ctx: TypeContext,
    // caller's record type (by address) -> schema. The Arc is held so the address can't be
    // reused by a different type.
    cache: FxHashMap<usize, (Arc<RecordType>, usize)>,
    by_type: FxHashMap<TypeId, usize>,
    schemas: Vec<Schema>,
    root: IntWriter,
    options: WriterOptions,
    footprint: usize,
    records: u64,
    target: Option<(Arc<dyn Storage>, String)>,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("options", &self.options)
            .field("schemas", &self.schemas.len())
            .field("records", &self.records)
            .field("target", &self.target.as_ref().map(|(_, uri)| uri))
            .finish()
    }
}

impl Writer {
    /// Create a new object in `storage`. The options are checked before anything is created.
    #[tracing::instrument(skip(storage), err)]
    pub fn create(
        storage: Arc<dyn Storage>,
        uri: &str,
        options: WriterOptions,
    ) -> Result<Self, Error> {
        options.validate()?;
        let out = storage.create(uri)?;
        let mut writer = Self::from_boxed(out, options);
        writer.target = Some((storage, uri.to_string()));
        Ok(writer)
    }

    /// Write an object to an arbitrary sink
    pub fn new<W: Write + Send + 'static>(out: W, options: WriterOptions) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self::from_boxed(Box::new(out), options))
    }

    fn from_boxed(out: Box<dyn Write + Send>, options: WriterOptions) -> Self {
        Writer {
            spiller: Spiller::new(out, options.col_thresh),
            ctx: TypeContext::new(),
            cache: FxHashMap::default(),
            by_type: FxHashMap::default(),
            schemas: Vec::new(),
            root: IntWriter::new(),
            options,
            footprint: 0,
            records: 0,
            target: None,
        }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// The number of records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// The number of distinct record types seen so far
    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }

    /// Append a record.
    ///
    /// A record which doesn't match its own type is rejected before anything is written, so
    /// the writer remains usable afterwards.
    pub fn write(&mut self, rec: &Record) -> Result<(), Error> {
        rec.validate()?;
        let schema = self.lookup_schema(rec.typ())?;
        self.root.write(schema as i64, &mut self.spiller)?;
        self.schemas[schema]
            .writer
            .write_fields(rec.body(), &mut self.spiller)?;
        self.records += 1;
        self.footprint += rec.body().len();
        if self.footprint >= self.options.skew_thresh {
            let footprint = self.footprint;
            self.flush_all()?;
            tracing::debug!(
                footprint,
                data_size = self.spiller.position(),
                "skew threshold reached, flushed every column"
            );
        }
        Ok(())
    }

    fn lookup_schema(&mut self, typ: &Arc<RecordType>) -> Result<usize, Error> {
        let key = Arc::as_ptr(typ) as usize;
        if let Some((_, id)) = self.cache.get(&key) {
            return Ok(*id);
        }
        let private = self.ctx.translate_record(typ)?;
        let id = match self.by_type.get(&private.id()) {
            Some(id) => *id,
            None => {
                let id = self.schemas.len();
                tracing::debug!(schema = id, typ = %Type::Record(private.clone()), "new schema");
                self.schemas.push(Schema {
                    writer: RecordWriter::new(&private),
                    typ: private.clone(),
                });
                self.by_type.insert(private.id(), id);
                id
            }
        };
        self.cache.insert(key, (typ.clone(), id));
        Ok(id)
    }

    fn flush_all(&mut self) -> Result<(), Error> {
        for schema in &mut self.schemas {
            schema.writer.flush(&mut self.spiller)?;
        }
        self.root.flush(&mut self.spiller)?;
        self.footprint = 0;
        Ok(())
    }

    /// Flush every column and write the reassembly section and the trailer.
    #[tracing::instrument(skip(self), fields(records = self.records), err)]
    pub fn close(self) -> Result<Trailer, Error> {
        let Writer {
            mut spiller,
            mut schemas,
            mut root,
            options,
            records,
            ..
        } = self;

        if records == 0 {
            let (out, _) = spiller.into_inner();
            let mut stream = StreamWriter::new(out);
            let trailer = Trailer::new(&options, Vec::new());
            trailer.write(&mut stream)?;
            stream.into_inner()?.flush()?;
            return Ok(trailer);
        }

        for schema in &mut schemas {
            schema.writer.finish(&mut spiller)?;
        }
        root.flush(&mut spiller)?;
        let root_segments = root.segments().len();
        let (out, data_size) = spiller.into_inner();
        let mut stream = StreamWriter::new(out);

        // the type dictionary: one record per schema with every field unset
        for schema in &schemas {
            let mut b = Builder::new();
            for _ in schema.typ.columns() {
                b.append_primitive(None);
            }
            stream.write(&Record::new(schema.typ.clone(), b.into_bytes()?)?)?;
        }

        let mut ctx = TypeContext::new();
        let mut b = Builder::new();
        let segmap = root.encode(&mut ctx, &mut b)?;
        let root_type = ctx.lookup_record(vec![Column::new("root", segmap)])?;
        stream.write(&Record::new(root_type, b.into_bytes()?)?)?;

        for schema in &schemas {
            let mut b = Builder::new();
            let typ = schema.writer.encode_fields(&mut ctx, &mut b)?;
            stream.write(&Record::new(typ, b.into_bytes()?)?)?;
        }
        stream.end_stream()?;
        let reassembly_size = stream.position();

        let trailer = Trailer::new(&options, vec![data_size as i64, reassembly_size as i64]);
        trailer.write(&mut stream)?;
        tracing::debug!(
            data_size,
            reassembly_size,
            trailer_size = stream.position() - reassembly_size,
            schemas = schemas.len(),
            root_segments,
            "finalized columnar object"
        );
        stream.into_inner()?.flush()?;
        Ok(trailer)
    }

    /// Abandon the object. If it was created in a [`Storage`] it is removed.
    #[tracing::instrument(skip(self), fields(records = self.records), err)]
    pub fn abort(self) -> Result<(), Error> {
        let Writer {
            spiller, target, ..
        } = self;
        drop(spiller);
        if let Some((storage, uri)) = target {
            storage.remove(&uri)?;
        }
        Ok(())
    }
}
