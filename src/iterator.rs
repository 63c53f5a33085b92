//! Iteration: a user-facing cursor composing an index cursor with a prefix
//! filter.

use crate::engine::Engine;
use crate::error::Result;
use crate::index::IndexIterator;
use crate::options::IteratorOptions;

/// A snapshot-consistent cursor over the live keys of an `Engine`, filtered
/// to a prefix if one is configured.
pub struct Iterator<'a> {
    engine: &'a Engine,
    inner: Box<dyn IndexIterator + 'a>,
    prefix: Vec<u8>,
}

impl Engine {
    /// Opens a cursor over this database's live entries.
    pub fn iterator(&self, options: IteratorOptions) -> Result<Iterator<'_>> {
        let inner = self.index.iterator(options.reverse)?;
        let mut it = Iterator { engine: self, inner, prefix: options.prefix };
        it.rewind();
        Ok(it)
    }
}

impl<'a> Iterator<'a> {
    /// Returns to the first matching entry.
    pub fn rewind(&mut self) {
        self.inner.rewind();
        self.skip_to_match();
    }

    /// Positions at the first matching entry at or past `key` (forward) or
    /// at or before `key` (reverse).
    pub fn seek(&mut self, key: &[u8]) {
        self.inner.seek(key);
        self.skip_to_match();
    }

    /// Advances to the next matching entry.
    pub fn next(&mut self) {
        self.inner.next();
        self.skip_to_match();
    }

    /// Whether the cursor currently points at a matching, live entry.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    /// The current entry's key. Panics if `!valid()`.
    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Reads the current entry's value from disk. Panics if `!valid()`.
    pub fn value(&self) -> Result<Vec<u8>> {
        let record = self.engine.read_record_at(self.inner.value())?;
        Ok(record.value)
    }

    /// Advances the underlying cursor until its key matches the configured
    /// prefix or it runs out of entries.
    fn skip_to_match(&mut self) {
        if self.prefix.is_empty() {
            return;
        }
        while self.inner.valid() && !self.inner.key().starts_with(&self.prefix) {
            self.inner.next();
        }
    }
}
