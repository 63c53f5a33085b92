use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{IndexIterator, Indexer};
use crate::data::LogRecordPos;
use crate::error::Result;

/// A balanced in-memory ordered map. Rebuilt by log replay on every open;
/// offers the fastest point operations of the three index backends.
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        BTreeIndex { tree: RwLock::new(BTreeMap::new()) }
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: &[u8], pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        let mut tree = self.tree.write().expect("btree index lock poisoned");
        Ok(tree.insert(key.to_vec(), pos))
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        let tree = self.tree.read().expect("btree index lock poisoned");
        Ok(tree.get(key).copied())
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<LogRecordPos>, bool)> {
        let mut tree = self.tree.write().expect("btree index lock poisoned");
        let old = tree.remove(key);
        let existed = old.is_some();
        Ok((old, existed))
    }

    fn size(&self) -> Result<usize> {
        let tree = self.tree.read().expect("btree index lock poisoned");
        Ok(tree.len())
    }

    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator + '_>> {
        let tree = self.tree.read().expect("btree index lock poisoned");
        let mut values: Vec<(Vec<u8>, LogRecordPos)> =
            tree.iter().map(|(k, v)| (k.clone(), *v)).collect();
        if reverse {
            values.reverse();
        }
        Ok(Box::new(BTreeCursor { values, index: 0, reverse }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct BTreeCursor {
    values: Vec<(Vec<u8>, LogRecordPos)>,
    index: usize,
    reverse: bool,
}

impl IndexIterator for BTreeCursor {
    fn rewind(&mut self) {
        self.index = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.index = if self.reverse {
            // first entry <= key: partition_point on "> key" from the
            // front of the reverse-sorted vec, then land past it.
            self.values.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.values.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        self.index += 1;
    }

    fn valid(&self) -> bool {
        self.index < self.values.len()
    }

    fn key(&self) -> &[u8] {
        &self.values[self.index].0
    }

    fn value(&self) -> LogRecordPos {
        self.values[self.index].1
    }
}
