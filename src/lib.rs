#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_long_first_doc_paragraph)]

//! An embedded, single-process, persistent key/value store implementing
//! the Bitcask log-structured storage model: an append-only log of
//! records on disk plus a pluggable in-memory index mapping every live
//! key to the byte range of its latest record.
//!
//! Clients open a directory via [`Engine::open`] and issue point reads,
//! writes, deletes, prefix/range iteration via [`Engine::iterator`], and
//! atomic multi-key batches via [`Engine::new_write_batch`]. Durability is
//! controlled per-write or by a byte-threshold flush policy
//! ([`Options::sync_writes`], [`Options::bytes_per_sync`]); crash recovery
//! replays the log at open time. [`Engine::merge`] compacts old files into
//! a fresh snapshot while writers continue.

pub mod batch;
pub mod data;
pub mod engine;
pub mod error;
pub mod fio;
pub mod index;
pub mod iterator;
pub mod logging;
pub mod merge;
pub mod options;

pub use batch::WriteBatch;
pub use engine::{Engine, Stat};
pub use error::{Error, Result};
pub use index::{IndexIterator, Indexer};
pub use iterator::Iterator;
pub use options::{IndexType, IteratorOptions, Options, WriteBatchOptions};
