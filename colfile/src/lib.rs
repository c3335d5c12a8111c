//! # colfile
//!
//! A columnar storage format for streams of self-describing records.
//!
//! Records may be of any number of different record types. Every distinct type is stored as
//! its own *schema*: a tree of columns mirroring the shape of the type, where each leaf
//! column is written out in segments whenever it grows past a threshold. A small *root*
//! column remembers which schema each record belongs to, so records come back in exactly the
//! order they were written.
//!
//! An object has three sections:
//!
//! * The data section, holding column segments from all schemas interleaved in the order they
//!   were spilled.
//! * The reassembly section, a row stream (see [`stream`]) holding a dictionary of the record
//!   types, the segment map of the root column and, per schema, a record describing where
//!   every column's segments live.
//! * The trailer ([`Trailer`]), a single row stream record giving the size of the other two
//!   sections, which a reader finds by scanning backwards from the end of the object.
//!
//! ## Writing and reading
//!
//! ```rust
//! use std::sync::Arc;
//! use colfile::{
//!     types::{Column, PrimitiveType, TypeContext},
//!     value::{encode_int, Builder, Record},
//!     MemoryStorage, Reader, Writer, WriterOptions,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(MemoryStorage::new());
//! let mut ctx = TypeContext::new();
//! let typ = ctx.lookup_record(vec![Column::new("n", PrimitiveType::Int64.into())])?;
//!
//! let mut writer = Writer::create(storage.clone(), "numbers", WriterOptions::default())?;
//! for n in 0..3 {
//!     let mut b = Builder::new();
//!     b.append_primitive(Some(&encode_int(n)));
//!     writer.write(&Record::new(typ.clone(), b.into_bytes()?)?)?;
//! }
//! writer.close()?;
//!
//! let mut reader = Reader::open(storage.as_ref(), "numbers")?;
//! let mut total = 0;
//! while let Some(rec) = reader.read()? {
//!     total += rec.access_int("n")?;
//! }
//! assert_eq!(total, 3);
//! # Ok(())
//! # }
//! ```
//!
//! Records which come back from a [`Reader`] have types from the reader's own
//! [`types::TypeContext`]. Use [`types::TypeContext::translate_record`] to bring them into
//! another context.
//!
//! ## Errors
//!
//! Every fallible operation returns [`Error`]. [`Error::kind`] tells apart objects which are
//! not columnar at all, columnar objects this library can't handle, and damaged ones.
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true
)]

mod column;
pub mod config;
mod encoding;
mod error;
mod reader;
pub mod storage;
pub mod stream;
pub mod trailer;
pub mod types;
pub mod value;
mod writer;

pub use column::{ColumnError, ColumnErrorKind, Segment, SEGMAP_TYPE};
pub use config::{ConfigError, Threshold, WriterOptions};
pub use encoding::DecodeError;
pub use error::{Error, ErrorKind};
pub use reader::{Reader, ReaderState, Records, ScanOutcome};
pub use storage::{FileStorage, MemoryStorage, ReadAt, Storage};
pub use trailer::Trailer;
pub use writer::Writer;
