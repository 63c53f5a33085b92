//! User-facing configuration for opening a database, issuing iterators, and
//! committing write batches.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which concrete index backend the engine builds at open.
///
/// The engine selects one variant at open based on `Options::index_type`
/// and never mixes variants within a directory: a directory opened once
/// with `Art` must always be reopened with `Art`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    /// A balanced in-memory ordered map (`std::collections::BTreeMap`).
    /// Rebuilt by replaying the log on every open. Fastest point
    /// operations.
    #[default]
    BTree,
    /// An adaptive-radix-tree-flavored prefix index. Rebuilt by replay,
    /// like `BTree`, but favors prefix iteration.
    Art,
    /// A disk-backed B+Tree (via `jammdb`). Survives restart without a log
    /// replay and externalizes `seq_no` to a dedicated file.
    BPlusTree,
}

/// Options controlling how a database directory is opened and written to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    /// Directory the database lives in. Created if it does not exist.
    pub dir_path: PathBuf,
    /// Rotation threshold in bytes: once the active file would exceed this
    /// size, it is synced, demoted to an older file, and a fresh active
    /// file is opened. Must be strictly positive.
    pub data_file_size: u64,
    /// If true, sync the active file after every single append.
    pub sync_writes: bool,
    /// If greater than zero, sync the active file once this many bytes
    /// have accumulated since the last sync.
    pub bytes_per_sync: u64,
    /// Which index backend to build at open.
    pub index_type: IndexType,
    /// If true, open data files via a read-only memory map during
    /// recovery, then downgrade to the standard backend for subsequent
    /// writes.
    pub mmap_at_startup: bool,
    /// Caller-side merge gating threshold in `[0, 1]`: `Engine::merge`'s
    /// ratio check compares `reclaimable_size / total_size` against this.
    pub data_file_merge_ratio: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dir_path: PathBuf::from("/tmp/bitcask"),
            data_file_size: 256 * 1024 * 1024,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::BTree,
            mmap_at_startup: false,
            data_file_merge_ratio: 0.5,
        }
    }
}

impl Options {
    /// Validates the options the same way `Engine::open` does, without
    /// opening anything. Exposed so embedders can fail fast on
    /// misconfiguration before touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(Error::InvalidOptions("dir_path must not be empty".into()));
        }
        if self.data_file_size == 0 {
            return Err(Error::InvalidOptions("data_file_size must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.data_file_merge_ratio) {
            return Err(Error::InvalidOptions(
                "data_file_merge_ratio must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Builds `Options` by layering a `config::Config` source over the
    /// defaults, for embedders that already assemble their process
    /// configuration with the `config` crate rather than constructing
    /// `Options` literally.
    pub fn from_config(source: config::Config) -> Result<Options> {
        source
            .try_deserialize()
            .map_err(|err| Error::InvalidOptions(err.to_string()))
    }
}

/// Options for a user-facing iteration.
#[derive(Clone, Debug, Default)]
pub struct IteratorOptions {
    /// Only keys starting with this byte string are yielded.
    pub prefix: Vec<u8>,
    /// Iterate in descending key order instead of ascending.
    pub reverse: bool,
}

/// Options for a write batch.
#[derive(Clone, Debug)]
pub struct WriteBatchOptions {
    /// Reject `commit()` once staged writes exceed this count.
    pub max_batch_size: usize,
    /// Sync the active file once after a successful commit.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        WriteBatchOptions { max_batch_size: 10_000, sync_writes: true }
    }
}
