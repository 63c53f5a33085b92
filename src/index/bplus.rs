use std::path::Path;
use std::sync::Mutex;

use jammdb::DB;

use super::{IndexIterator, Indexer};
use crate::data::{LogRecordPos, BPTREE_INDEX_FILE_NAME};
use crate::error::{Error, Result};

const BUCKET_NAME: &[u8] = b"bitcask-index";

/// A disk-backed B+Tree index, via the embedded `jammdb` library (playing
/// the role `go.etcd.io/bbolt` plays in the source project). Survives
/// restart without a log replay: the engine skips recovery scanning
/// entirely for this variant and instead reads `seq_no` back from a
/// dedicated file (`Engine`'s concern, not this module's).
///
/// The handle is held behind `Mutex<Option<DB>>` rather than a bare `DB` so
/// `close()` can `.take()` it and drop the file immediately, instead of
/// waiting on the whole `Engine` to drop.
pub struct BPlusTreeIndex {
    db: Mutex<Option<DB>>,
}

impl BPlusTreeIndex {
    pub fn open(dir_path: &Path) -> Result<Self> {
        let db = DB::open(dir_path.join(BPTREE_INDEX_FILE_NAME))?;
        {
            let tx = db.tx(true)?;
            tx.get_or_create_bucket(BUCKET_NAME)?;
            tx.commit()?;
        }
        Ok(BPlusTreeIndex { db: Mutex::new(Some(db)) })
    }

    fn with_db<T>(&self, f: impl FnOnce(&DB) -> Result<T>) -> Result<T> {
        let guard = self.db.lock().expect("bplus index lock poisoned");
        let db = guard.as_ref().ok_or_else(|| Error::Index("index is closed".to_string()))?;
        f(db)
    }
}

impl Indexer for BPlusTreeIndex {
    fn put(&self, key: &[u8], pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        self.with_db(|db| {
            let tx = db.tx(true)?;
            let bucket = tx.get_or_create_bucket(BUCKET_NAME)?;
            let old =
                bucket.get(key).map(|data| LogRecordPos::decode(data.kv().value())).transpose()?;
            bucket.put(key, pos.encode())?;
            tx.commit()?;
            Ok(old)
        })
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        self.with_db(|db| {
            let tx = db.tx(false)?;
            let bucket = tx.get_bucket(BUCKET_NAME)?;
            bucket.get(key).map(|data| LogRecordPos::decode(data.kv().value())).transpose()
        })
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<LogRecordPos>, bool)> {
        self.with_db(|db| {
            let tx = db.tx(true)?;
            let bucket = tx.get_or_create_bucket(BUCKET_NAME)?;
            let old = match bucket.delete(key) {
                Ok(data) => Some(LogRecordPos::decode(data.kv().value())?),
                Err(jammdb::Error::KeyValueMissing) => None,
                Err(err) => return Err(err.into()),
            };
            tx.commit()?;
            let existed = old.is_some();
            Ok((old, existed))
        })
    }

    fn size(&self) -> Result<usize> {
        self.with_db(|db| {
            let tx = db.tx(false)?;
            let bucket = tx.get_bucket(BUCKET_NAME)?;
            Ok(bucket.cursor().count())
        })
    }

    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator + '_>> {
        let mut values: Vec<(Vec<u8>, LogRecordPos)> = self.with_db(|db| {
            let tx = db.tx(false)?;
            let bucket = tx.get_bucket(BUCKET_NAME)?;
            let mut values: Vec<(Vec<u8>, LogRecordPos)> = bucket
                .cursor()
                .map(|data| {
                    let kv = data.kv();
                    Ok::<_, crate::error::Error>((
                        kv.key().to_vec(),
                        LogRecordPos::decode(kv.value())?,
                    ))
                })
                .collect::<Result<_>>()?;
            values.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(values)
        })?;
        if reverse {
            values.reverse();
        }
        Ok(Box::new(BPlusCursor { values, index: 0, reverse }))
    }

    fn close(&self) -> Result<()> {
        // Dropping the taken `DB` here flushes and releases the file handle
        // immediately, rather than whenever the whole `Engine` drops.
        self.db.lock().expect("bplus index lock poisoned").take();
        Ok(())
    }
}

struct BPlusCursor {
    values: Vec<(Vec<u8>, LogRecordPos)>,
    index: usize,
    reverse: bool,
}

impl IndexIterator for BPlusCursor {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(offset: u64) -> LogRecordPos {
        LogRecordPos { file_id: 0, offset, size: 1 }
    }

    #[test]
    fn put_get_delete_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let idx = BPlusTreeIndex::open(dir.path()).unwrap();
            idx.put(b"a", pos(1)).unwrap();
            idx.put(b"b", pos(2)).unwrap();
        }
        let idx = BPlusTreeIndex::open(dir.path()).unwrap();
        assert_eq!(idx.get(b"a").unwrap(), Some(pos(1)));
        assert_eq!(idx.size().unwrap(), 2);
        let (old, existed) = idx.delete(b"a").unwrap();
        assert_eq!(old, Some(pos(1)));
        assert!(existed);
        assert_eq!(idx.get(b"a").unwrap(), None);
    }
}
