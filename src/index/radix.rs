use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{IndexIterator, Indexer};
use crate::data::LogRecordPos;
use crate::error::Result;

/// A byte-at-a-time trie keyed by key bytes: each edge consumes one byte,
/// and a node carries a value when some key terminates there. Children are
/// kept in a `BTreeMap<u8, Node>` so both point lookups and ordered
/// traversal share the same structure — walking down matching key bytes
/// during a lookup is the same "prefix-aware skip" an iteration uses to
/// jump straight past a non-matching subtree, which is the property that
/// makes this backend prefix-friendly relative to the plain `BTreeIndex`.
#[derive(Default)]
struct Node {
    children: BTreeMap<u8, Node>,
    value: Option<LogRecordPos>,
}

impl Node {
    fn insert(&mut self, key: &[u8], pos: LogRecordPos) -> Option<LogRecordPos> {
        match key.split_first() {
            None => self.value.replace(pos),
            Some((&head, rest)) => self.children.entry(head).or_default().insert(rest, pos),
        }
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        match key.split_first() {
            None => self.value,
            Some((&head, rest)) => self.children.get(&head)?.get(rest),
        }
    }

    fn remove(&mut self, key: &[u8]) -> Option<LogRecordPos> {
        match key.split_first() {
            None => self.value.take(),
            Some((&head, rest)) => {
                let child = self.children.get_mut(&head)?;
                let removed = child.remove(rest);
                if removed.is_some() && child.value.is_none() && child.children.is_empty() {
                    self.children.remove(&head);
                }
                removed
            }
        }
    }

    fn collect(&self, prefix: &mut Vec<u8>, out: &mut Vec<(Vec<u8>, LogRecordPos)>) {
        if let Some(pos) = self.value {
            out.push((prefix.clone(), pos));
        }
        for (&byte, child) in self.children.iter() {
            prefix.push(byte);
            child.collect(prefix, out);
            prefix.pop();
        }
    }
}

/// An adaptive-radix-tree-flavored index: the trie above, behind a lock,
/// plus a live-entry counter so `size()` doesn't require a full walk.
pub struct RadixIndex {
    root: RwLock<Node>,
    count: RwLock<usize>,
}

impl RadixIndex {
    pub fn new() -> Self {
        RadixIndex { root: RwLock::new(Node::default()), count: RwLock::new(0) }
    }
}

impl Indexer for RadixIndex {
    fn put(&self, key: &[u8], pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        let mut root = self.root.write().expect("radix index lock poisoned");
        let old = root.insert(key, pos);
        if old.is_none() {
            *self.count.write().expect("radix index lock poisoned") += 1;
        }
        Ok(old)
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        let root = self.root.read().expect("radix index lock poisoned");
        Ok(root.get(key))
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<LogRecordPos>, bool)> {
        let mut root = self.root.write().expect("radix index lock poisoned");
        let old = root.remove(key);
        if old.is_some() {
            *self.count.write().expect("radix index lock poisoned") -= 1;
        }
        let existed = old.is_some();
        Ok((old, existed))
    }

    fn size(&self) -> Result<usize> {
        Ok(*self.count.read().expect("radix index lock poisoned"))
    }

    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator + '_>> {
        let root = self.root.read().expect("radix index lock poisoned");
        let mut values = Vec::new();
        root.collect(&mut Vec::new(), &mut values);
        if reverse {
            values.reverse();
        }
        Ok(Box::new(RadixCursor { values, index: 0, reverse }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct RadixCursor {
    values: Vec<(Vec<u8>, LogRecordPos)>,
    index: usize,
    reverse: bool,
}

impl IndexIterator for RadixCursor {
    fn rewind(&mut self) {
        self.index = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.index = if self.reverse {
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
