//! Batch: stages writes for atomic commit under one sequence number.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use crate::data::{self, LogRecord};
use crate::engine::{Engine, TXN_FIN_KEY};
use crate::error::{Error, Result};
use crate::options::WriteBatchOptions;

enum Staged {
    Put(Vec<u8>),
    Delete,
}

/// A staging area that buffers writes for one atomic commit. Operations on
/// a batch are safe to call from multiple threads; the staging map is
/// guarded by its own mutex, independent of the engine lock, which is only
/// acquired at `commit`.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    staged: Mutex<HashMap<Vec<u8>, Staged>>,
}

impl Engine {
    /// Opens a new write batch bound to this engine.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        Ok(WriteBatch { engine: self, options, staged: Mutex::new(HashMap::new()) })
    }
}

impl<'a> WriteBatch<'a> {
    /// Stages a write, replacing any prior staging for `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.staged
            .lock()
            .expect("batch lock poisoned")
            .insert(key.to_vec(), Staged::Put(value.to_vec()));
        Ok(())
    }

    /// Stages a delete. A no-op if the key is absent from both staging and
    /// the engine; drops a pending `put` if the key was only staged.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let mut staged = self.staged.lock().expect("batch lock poisoned");
        if self.engine.index.get(key)?.is_none() && !staged.contains_key(key) {
            return Ok(());
        }
        staged.insert(key.to_vec(), Staged::Delete);
        Ok(())
    }

    /// Commits every staged write atomically: all payload records land
    /// under one sequence number, followed by a `TxnFinished` marker, and
    /// only then are effects applied to the index. The engine's write lock
    /// is held for the entire commit, from the first append through the
    /// index-apply loop, so a concurrent `put`/`delete`/commit can never
    /// interleave with this one.
    pub fn commit(&self) -> Result<()> {
        let mut staged = self.staged.lock().expect("batch lock poisoned");
        if staged.is_empty() {
            return Ok(());
        }
        if staged.len() > self.options.max_batch_size {
            return Err(Error::BatchTooLarge);
        }

        let seq_no = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut state = self.engine.state.write().expect("engine lock poisoned");

        let mut positions = Vec::with_capacity(staged.len());
        for (key, entry) in staged.drain() {
            let encoded_key = data::encode_key_with_seq_no(&key, seq_no);
            let record = match &entry {
                Staged::Put(value) => LogRecord::normal(encoded_key, value.clone()),
                Staged::Delete => LogRecord::deleted(encoded_key),
            };
            let pos = self.engine.append_log_record_locked(&mut state, &record)?;
            positions.push((key, entry, pos));
        }

        let finisher = LogRecord::txn_finished(data::encode_key_with_seq_no(TXN_FIN_KEY, seq_no));
        self.engine.append_log_record_locked(&mut state, &finisher)?;

        if self.options.sync_writes {
            if let Some(active) = &state.active_file {
                active.sync()?;
            }
        }

        for (key, entry, pos) in positions {
            match entry {
                Staged::Put(_) => {
                    if let Some(old) = self.engine.index.put(&key, pos)? {
                        state.reclaimable_size += old.size as u64;
                    }
                }
                Staged::Delete => {
                    state.reclaimable_size += pos.size as u64;
                    let (old, _) = self.engine.index.delete(&key)?;
                    if let Some(old) = old {
                        state.reclaimable_size += old.size as u64;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn opts(dir: &std::path::Path) -> Options {
        Options { dir_path: dir.to_path_buf(), ..Options::default() }
    }

    #[test]
    fn commit_applies_all_staged_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(opts(dir.path())).unwrap();

        let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.commit().unwrap();

        assert_eq!(engine.get(b"a").unwrap(), b"1");
        assert_eq!(engine.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn uncommitted_batch_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(opts(dir.path())).unwrap();

        let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
        batch.put(b"a", b"1").unwrap();
        assert!(engine.get(b"a").is_err());
    }

    #[test]
    fn batch_too_large_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(opts(dir.path())).unwrap();

        let batch = engine
            .new_write_batch(WriteBatchOptions { max_batch_size: 1, sync_writes: false })
            .unwrap();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        assert!(matches!(batch.commit(), Err(Error::BatchTooLarge)));
    }

    #[test]
    fn partial_batch_is_discarded_on_recovery() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = Engine::open(opts(dir.path())).unwrap();
            engine.put(b"standalone", b"v").unwrap();
            // Append a payload record under a sequence number with no
            // matching finalizer, simulating a crash mid-commit.
            let record = LogRecord::normal(data::encode_key_with_seq_no(b"ghost", 999), b"x".to_vec());
            engine.append_log_record(&record).unwrap();
        }
        let engine = Engine::open(opts(dir.path())).unwrap();
        assert_eq!(engine.get(b"standalone").unwrap(), b"v");
        assert!(engine.get(b"ghost").is_err());
    }
}
