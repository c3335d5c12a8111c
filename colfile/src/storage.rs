//! Named byte objects which columnar files are written to and read from.
//!
//! Writing is append only, through an ordinary [`std::io::Write`]. Reading is positional
//! through [`ReadAt`] so that any number of column readers can share one handle without
//! sharing a cursor.
use std::{
    fs::File,
    io::{self, Read, Write},
    path::PathBuf,
    sync::{Arc, RwLock},
};

use rustc_hash::FxHashMap;

/// Positional reads with no shared cursor
pub trait ReadAt: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`, returning how many were read. Zero
    /// means `offset` is at or past the end of the object.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "object ended before the requested range",
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

/// A [`Read`] over the byte range `start..end` of a [`ReadAt`]
pub struct SectionReader<'a> {
    source: &'a dyn ReadAt,
    pos: u64,
    end: u64,
}

impl<'a> SectionReader<'a> {
    pub fn new(source: &'a dyn ReadAt, start: u64, end: u64) -> Self {
        SectionReader {
            source,
            pos: start,
            end,
        }
    }
}

impl std::fmt::Debug for SectionReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionReader")
            .field("pos", &self.pos)
            .field("end", &self.end)
            .finish()
    }
}

impl Read for SectionReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        let len = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if len == 0 {
            return Ok(0);
        }
        let n = self.source.read_at(&mut buf[..len], self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Where columnar objects live
pub trait Storage: Send + Sync {
    /// Create (or truncate) an object for writing
    fn create(&self, uri: &str) -> io::Result<Box<dyn Write + Send>>;
    fn open(&self, uri: &str) -> io::Result<Arc<dyn ReadAt>>;
    fn size(&self, uri: &str) -> io::Result<u64>;
    fn remove(&self, uri: &str) -> io::Result<()>;
    fn exists(&self, uri: &str) -> io::Result<bool>;
}

/// Objects are files on the local filesystem. URIs are paths, optionally prefixed with
/// `file://`.
#[derive(Clone, Debug, Default)]
pub struct FileStorage;

impl FileStorage {
    pub fn new() -> Self {
        FileStorage
    }

    fn path(uri: &str) -> PathBuf {
        PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
    }
}

impl Storage for FileStorage {
    fn create(&self, uri: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(File::create(Self::path(uri))?))
    }

    fn open(&self, uri: &str) -> io::Result<Arc<dyn ReadAt>> {
        Ok(Arc::new(File::open(Self::path(uri))?))
    }

    fn size(&self, uri: &str) -> io::Result<u64> {
        Ok(std::fs::metadata(Self::path(uri))?.len())
    }

    fn remove(&self, uri: &str) -> io::Result<()> {
        std::fs::remove_file(Self::path(uri))
    }

    fn exists(&self, uri: &str) -> io::Result<bool> {
        Self::path(uri).try_exists()
    }
}

type Objects = Arc<RwLock<FxHashMap<String, Arc<Vec<u8>>>>>;

/// Objects held in memory. Bytes written to an object become visible to readers when the
/// writer is flushed or dropped.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    objects: Objects,
}

fn poisoned<T>(_: T) -> io::Error {
    io::Error::other("memory storage lock poisoned")
}

fn not_found(uri: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no object named {}", uri))
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current contents of an object
    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        let objects = self.objects.read().ok()?;
        objects.get(uri).map(|o| o.as_ref().clone())
    }

    /// Replace the contents of an object
    pub fn put(&self, uri: &str, bytes: Vec<u8>) -> io::Result<()> {
        self.objects
            .write()
            .map_err(poisoned)?
            .insert(uri.to_string(), Arc::new(bytes));
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn create(&self, uri: &str) -> io::Result<Box<dyn Write + Send>> {
        self.put(uri, Vec::new())?;
        Ok(Box::new(MemoryWriter {
            uri: uri.to_string(),
            buf: Vec::new(),
            objects: self.objects.clone(),
        }))
    }

    fn open(&self, uri: &str) -> io::Result<Arc<dyn ReadAt>> {
        let objects = self.objects.read().map_err(poisoned)?;
        let object = objects.get(uri).ok_or_else(|| not_found(uri))?;
        Ok(Arc::new(MemoryObject(object.clone())))
    }

    fn size(&self, uri: &str) -> io::Result<u64> {
        let objects = self.objects.read().map_err(poisoned)?;
        let object = objects.get(uri).ok_or_else(|| not_found(uri))?;
        Ok(object.len() as u64)
    }

    fn remove(&self, uri: &str) -> io::Result<()> {
        self.objects
            .write()
            .map_err(poisoned)?
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| not_found(uri))
    }

    fn exists(&self, uri: &str) -> io::Result<bool> {
        Ok(self.objects.read().map_err(poisoned)?.contains_key(uri))
    }
}

struct MemoryObject(Arc<Vec<u8>>);

impl ReadAt for MemoryObject {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.0.read_at(buf, offset)
    }
}

struct MemoryWriter {
    uri: String,
    buf: Vec<u8>,
    objects: Objects,
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut objects = self.objects.write().map_err(poisoned)?;
        // a removed object stays removed
        if let Some(object) = objects.get_mut(&self.uri) {
            *object = Arc::new(self.buf.clone());
        }
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
