//! Error taxonomy for the storage engine.
//!
//! Every kind here corresponds to a specific failure condition defined by
//! the engine: an invalid call, a data-integrity problem found during
//! recovery, or a resource conflict. I/O errors from the OS are wrapped but
//! never swallowed.

use std::fmt;

/// The result type returned by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// A public put/get/delete call was given a zero-length key.
    KeyEmpty,
    /// `get` found no live record for the key, or the record it found was a
    /// tombstone.
    KeyNotFound,
    /// An index mutation violated the index's own contract. Should be
    /// unreachable once recovery has completed.
    IndexUpdateFailed,
    /// A log position refers to a file id the engine has no open handle
    /// for.
    DataFileNotFound(u32),
    /// A `*.data` file name in the directory is not a valid zero-padded id.
    DataDirectoryCorrupted(String),
    /// The CRC stored in a record does not match the CRC computed over its
    /// bytes on read.
    CorruptRecord,
    /// A write batch's staged size exceeds `Options::max_batch_size`.
    BatchTooLarge,
    /// `merge()` was called while a merge was already running.
    MergeInProgress,
    /// `merge()`'s disk pre-check determined there isn't enough free space
    /// to write a compacted copy of the data.
    NotEnoughSpace,
    /// Caller-facing gate: `reclaimable_size / total_size` has not reached
    /// `Options::data_file_merge_ratio`.
    MergeRatioUnreached,
    /// The directory's `flock` lock file is already held by another
    /// process (or another open handle in this process).
    InUse,
    /// An `Options` value failed validation at open time.
    InvalidOptions(String),
    /// An I/O error surfaced unchanged from the OS.
    Io(std::io::Error),
    /// The index backend reported an internal failure (e.g. the embedded
    /// B+Tree library).
    Index(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyEmpty => write!(f, "key is empty"),
            Error::KeyNotFound => write!(f, "key not found"),
            Error::IndexUpdateFailed => write!(f, "index update failed"),
            Error::DataFileNotFound(id) => write!(f, "data file {id} not found"),
            Error::DataDirectoryCorrupted(name) => {
                write!(f, "data directory corrupted: invalid file name {name:?}")
            }
            Error::CorruptRecord => write!(f, "invalid crc value, log record maybe corrupted"),
            Error::BatchTooLarge => write!(f, "exceeds the max batch size"),
            Error::MergeInProgress => write!(f, "merge is in progress, try again later"),
            Error::NotEnoughSpace => write!(f, "not enough disk space for merge"),
            Error::MergeRatioUnreached => write!(f, "reclaimable ratio does not reach the merge threshold"),
            Error::InUse => write!(f, "database directory is already in use"),
            Error::InvalidOptions(msg) => write!(f, "invalid options: {msg}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Index(msg) => write!(f, "index error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<jammdb::Error> for Error {
    fn from(err: jammdb::Error) -> Self {
        Error::Index(err.to_string())
    }
}
