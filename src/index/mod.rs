//! Index: the pluggable ordered-map contract from key bytes to log
//! position, with three concrete backends behind it.

mod bplus;
mod btree;
mod radix;

pub use bplus::BPlusTreeIndex;
pub use btree::BTreeIndex;
pub use radix::RadixIndex;

use crate::data::LogRecordPos;
use crate::error::Result;
use crate::options::IndexType;
use std::path::Path;

/// Ordered map from user key bytes to the position of that key's latest
/// live record. Iteration is strict lexicographic order by key bytes.
pub trait Indexer: Send + Sync {
    /// Installs `pos` for `key`, returning the position it replaces, if
    /// any.
    fn put(&self, key: &[u8], pos: LogRecordPos) -> Result<Option<LogRecordPos>>;
    /// Looks up the latest position for `key`.
    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>>;
    /// Removes `key`, returning the position it held, if any, and whether
    /// it existed.
    fn delete(&self, key: &[u8]) -> Result<(Option<LogRecordPos>, bool)>;
    /// Current number of live entries.
    fn size(&self) -> Result<usize>;
    /// A snapshot-consistent ordered cursor over all entries.
    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator + '_>>;
    /// Releases any backing resources (file handles, mmaps, ...).
    fn close(&self) -> Result<()>;
}

/// An ordered cursor over an index's entries.
pub trait IndexIterator {
    /// Returns to the first entry in iteration order.
    fn rewind(&mut self);
    /// Positions at the first entry `>= key` (forward) or `<= key`
    /// (reverse).
    fn seek(&mut self, key: &[u8]);
    /// Advances to the next entry in iteration order.
    fn next(&mut self);
    /// Whether the cursor currently points at a live entry.
    fn valid(&self) -> bool;
    /// The current entry's key. Panics if `!valid()`.
    fn key(&self) -> &[u8];
    /// The current entry's position. Panics if `!valid()`.
    fn value(&self) -> LogRecordPos;
}

/// Builds the configured index backend for `dir_path`.
pub fn new_indexer(index_type: IndexType, dir_path: &Path) -> Result<Box<dyn Indexer>> {
    Ok(match index_type {
        IndexType::BTree => Box::new(BTreeIndex::new()),
        IndexType::Art => Box::new(RadixIndex::new()),
        IndexType::BPlusTree => Box::new(BPlusTreeIndex::open(dir_path)?),
    })
}
