//! Engine Core: directory lifecycle, file rotation, the single-writer
//! append path, point get/delete, recovery, and iteration support.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use fs4::FileExt as _;

use crate::data::{
    self, DataFile, LogRecord, LogRecordPos, LogRecordType, DATA_FILE_SUFFIX, LOCK_FILE_NAME,
    SEQ_NO_FILE_NAME,
};
use crate::error::{Error, Result};
use crate::fio::FileIoType;
use crate::index::{self, IndexIterator, Indexer};
use crate::options::{IndexType, Options};

/// The non-transactional sequence number: a log record whose encoded key
/// carries this value was written outside a batch.
pub(crate) const NON_TXN_SEQ_NO: u64 = 0;
pub(crate) const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// The parts of the engine that the write lock protects: active/older file
/// handles, the bytes-since-sync counter, and the reclaimable-size
/// accounting.
pub(crate) struct EngineState {
    pub(crate) active_file: Option<DataFile>,
    pub(crate) older_files: HashMap<u32, DataFile>,
    pub(crate) bytes_written_since_sync: u64,
    pub(crate) reclaimable_size: u64,
}

/// A handle to an open Bitcask database directory.
pub struct Engine {
    pub(crate) options: Options,
    dir_lock: fs::File,
    pub(crate) state: RwLock<EngineState>,
    pub(crate) index: Box<dyn Indexer>,
    pub(crate) seq_no: AtomicU64,
    pub(crate) is_merging: AtomicBool,
    #[allow(dead_code)]
    is_initial: bool,
    #[allow(dead_code)]
    pub(crate) seq_no_file_exists: bool,
}

/// A point-in-time summary of the database's size and shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
    pub key_count: usize,
    pub data_file_count: usize,
    pub reclaimable_size: u64,
    pub disk_size: u64,
    pub is_merging: bool,
}

impl Engine {
    /// Opens or creates a database in `options.dir_path`, replaying the log
    /// (or the hint file, for replay-based indexes) to rebuild the index.
    pub fn open(options: Options) -> Result<Engine> {
        options.validate()?;

        if !options.dir_path.exists() {
            fs::create_dir_all(&options.dir_path)?;
        }

        let lock_path = options.dir_path.join(LOCK_FILE_NAME);
        let dir_lock = fs::OpenOptions::new().create(true).read(true).write(true).open(&lock_path)?;
        dir_lock.try_lock_exclusive().map_err(|_| Error::InUse)?;

        // Merge recovery runs before data files are enumerated: it may
        // delete merged-away files and move the compacted replacement in.
        crate::merge::load_merge_files(&options.dir_path)?;

        let mut file_ids = enumerate_data_file_ids(&options.dir_path)?;
        file_ids.sort_unstable();
        let is_initial = file_ids.is_empty();

        let io_kind =
            if options.mmap_at_startup { FileIoType::MemoryMap } else { FileIoType::Standard };

        let mut older_files = HashMap::new();
        let mut active_file = None;
        for (i, &id) in file_ids.iter().enumerate() {
            let df = DataFile::open(&options.dir_path, id, io_kind)?;
            if i + 1 == file_ids.len() {
                active_file = Some(df);
            } else {
                older_files.insert(id, df);
            }
        }

        let index = index::new_indexer(options.index_type, &options.dir_path)?;

        let mut seq_no_file_exists = false;
        let loaded_seq_no = match options.index_type {
            IndexType::BPlusTree => {
                let (exists, seq_no) = load_seq_no_file(&options.dir_path)?;
                seq_no_file_exists = exists;
                seq_no
            }
            _ => {
                load_hint_file(&options.dir_path, index.as_ref())?;
                load_data_files_into_index(&older_files, &active_file, index.as_ref())?
            }
        };

        if options.mmap_at_startup {
            if let Some(af) = active_file.as_mut() {
                af.downgrade_to_standard(&options.dir_path)?;
            }
            for df in older_files.values_mut() {
                df.downgrade_to_standard(&options.dir_path)?;
            }
        }

        log::info!(
            "opened {} with {} live keys across {} data files",
            options.dir_path.display(),
            index.size()?,
            older_files.len() + active_file.is_some() as usize,
        );

        Ok(Engine {
            options,
            dir_lock,
            state: RwLock::new(EngineState {
                active_file,
                older_files,
                bytes_written_since_sync: 0,
                reclaimable_size: 0,
            }),
            index,
            seq_no: AtomicU64::new(loaded_seq_no),
            is_merging: AtomicBool::new(false),
            is_initial,
            seq_no_file_exists,
        })
    }

    /// Writes `value` under `key`, replacing any prior value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let record =
            LogRecord::normal(data::encode_key_with_seq_no(key, NON_TXN_SEQ_NO), value.to_vec());
        let mut state = self.state.write().expect("engine lock poisoned");
        let pos = self.append_log_record_locked(&mut state, &record)?;
        let old = self.index.put(key, pos)?;
        if let Some(old) = old {
            state.reclaimable_size += old.size as u64;
        }
        Ok(())
    }

    /// Reads the latest live value for `key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let pos = self.index.get(key)?.ok_or(Error::KeyNotFound)?;
        let record = self.read_record_at(pos)?;
        if record.record_type == LogRecordType::Deleted {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    /// Removes `key`. Succeeds silently if the key is already absent.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let mut state = self.state.write().expect("engine lock poisoned");
        if self.index.get(key)?.is_none() {
            return Ok(());
        }

        let record = LogRecord::deleted(data::encode_key_with_seq_no(key, NON_TXN_SEQ_NO));
        let pos = self.append_log_record_locked(&mut state, &record)?;
        state.reclaimable_size += pos.size as u64;

        let (old, _existed) = self.index.delete(key)?;
        if let Some(old) = old {
            state.reclaimable_size += old.size as u64;
        }
        Ok(())
    }

    /// All live keys, in ascending lexicographic order.
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>> {
        let mut cursor = self.index.iterator(false)?;
        cursor.rewind();
        let mut keys = Vec::with_capacity(self.index.size()?);
        while cursor.valid() {
            keys.push(cursor.key().to_vec());
            cursor.next();
        }
        Ok(keys)
    }

    /// Invokes `f(key, value)` for every live entry in ascending order
    /// until it returns `false` or entries are exhausted.
    pub fn fold(&self, mut f: impl FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        let mut cursor = self.index.iterator(false)?;
        cursor.rewind();
        while cursor.valid() {
            let key = cursor.key().to_vec();
            let pos = cursor.value();
            let record = self.read_record_at(pos)?;
            if record.record_type != LogRecordType::Deleted && !f(&key, &record.value) {
                break;
            }
            cursor.next();
        }
        Ok(())
    }

    /// Forces the active file to durable storage.
    pub fn sync(&self) -> Result<()> {
        let state = self.state.read().expect("engine lock poisoned");
        if let Some(active) = &state.active_file {
            active.sync()?;
        }
        Ok(())
    }

    /// A point-in-time summary of the database.
    pub fn stat(&self) -> Result<Stat> {
        let state = self.state.read().expect("engine lock poisoned");
        let mut disk_size = 0u64;
        if let Some(active) = &state.active_file {
            disk_size += active.size()?;
        }
        for df in state.older_files.values() {
            disk_size += df.size()?;
        }
        let data_file_count = state.older_files.len() + state.active_file.is_some() as usize;
        Ok(Stat {
            key_count: self.index.size()?,
            data_file_count,
            reclaimable_size: state.reclaimable_size,
            disk_size,
            is_merging: self.is_merging.load(Ordering::Acquire),
        })
    }

    /// Copies every data file into `destination`, which is created if
    /// necessary. Does not copy the directory lock file.
    pub fn backup(&self, destination: &Path) -> Result<()> {
        fs::create_dir_all(destination)?;
        let state = self.state.read().expect("engine lock poisoned");
        let ids = state.older_files.keys().copied().chain(state.active_file.as_ref().map(|f| f.file_id));
        for id in ids {
            let name = format!("{id:09}{}", data::DATA_FILE_SUFFIX);
            fs::copy(self.options.dir_path.join(&name), destination.join(&name))?;
        }
        Ok(())
    }

    /// Closes the database: syncs the active file, persists `seq_no` for
    /// the B+Tree index variant, closes the index, and releases the
    /// directory lock.
    pub fn close(&self) -> Result<()> {
        {
            let state = self.state.read().expect("engine lock poisoned");
            if let Some(active) = &state.active_file {
                active.sync()?;
            }
        }
        if self.options.index_type == IndexType::BPlusTree {
            let mut seq_file = DataFile::open_seq_no_file(&self.options.dir_path)?;
            let record = LogRecord::normal(Vec::new(), self.seq_no.load(Ordering::Acquire).to_string().into_bytes());
            let (encoded, _) = record.encode();
            seq_file.append(&encoded)?;
            seq_file.sync()?;
        }
        self.index.close()?;
        self.dir_lock.unlock()?;
        Ok(())
    }

    /// Reads the record a position refers to, from whichever file (active
    /// or older) owns it.
    pub(crate) fn read_record_at(&self, pos: LogRecordPos) -> Result<LogRecord> {
        let state = self.state.read().expect("engine lock poisoned");
        let record = if let Some(active) = &state.active_file {
            if active.file_id == pos.file_id {
                active.read_log_record(pos.offset)?
            } else {
                let df = state.older_files.get(&pos.file_id).ok_or(Error::DataFileNotFound(pos.file_id))?;
                df.read_log_record(pos.offset)?
            }
        } else {
            let df = state.older_files.get(&pos.file_id).ok_or(Error::DataFileNotFound(pos.file_id))?;
            df.read_log_record(pos.offset)?
        };
        record.map(|(r, _)| r).ok_or(Error::CorruptRecord)
    }

    /// The single-writer append path, acquiring the engine lock for just
    /// this one record. Callers that must append one or more records and
    /// then mutate the index under the same critical section (`put`,
    /// `delete`, batch commit) should take the lock themselves and call
    /// `append_log_record_locked` instead.
    pub(crate) fn append_log_record(&self, record: &LogRecord) -> Result<LogRecordPos> {
        let mut state = self.state.write().expect("engine lock poisoned");
        self.append_log_record_locked(&mut state, record)
    }

    /// Rotates the active file when it would overflow `data_file_size`,
    /// appends the encoded record, and syncs according to the configured
    /// durability policy. The caller already holds `self.state`'s write
    /// lock; this never acquires it itself, so the caller can extend the
    /// same critical section across multiple appends and the following
    /// index mutation.
    pub(crate) fn append_log_record_locked(
        &self,
        state: &mut EngineState,
        record: &LogRecord,
    ) -> Result<LogRecordPos> {
        let (encoded, size) = record.encode();
        let size = size as u64;

        if state.active_file.is_none() {
            state.active_file = Some(DataFile::open(&self.options.dir_path, 0, FileIoType::Standard)?);
        }

        let would_overflow = {
            let active = state.active_file.as_ref().expect("checked above");
            active.write_offset + size > self.options.data_file_size
        };
        if would_overflow {
            let active = state.active_file.as_ref().expect("checked above");
            active.sync()?;
            let old_id = active.file_id;
            let retired = state.active_file.take().expect("checked above");
            state.older_files.insert(old_id, retired);
            state.active_file =
                Some(DataFile::open(&self.options.dir_path, old_id + 1, FileIoType::Standard)?);
            log::info!("rotated to data file {}", old_id + 1);
        }

        let active = state.active_file.as_mut().expect("checked above");
        let write_offset = active.write_offset;
        let file_id = active.file_id;
        active.append(&encoded)?;

        state.bytes_written_since_sync += size;
        let should_sync = self.options.sync_writes
            || (self.options.bytes_per_sync > 0
                && state.bytes_written_since_sync >= self.options.bytes_per_sync);
        if should_sync {
            state.active_file.as_ref().expect("checked above").sync()?;
            state.bytes_written_since_sync = 0;
        }

        Ok(LogRecordPos { file_id, offset: write_offset, size: size as u32 })
    }
}

/// Lists the `*.data` file ids present in `dir_path`, in no particular
/// order (callers sort).
fn enumerate_data_file_ids(dir_path: &Path) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
            ids.push(data::parse_file_id(stem)?);
        }
    }
    Ok(ids)
}

fn load_seq_no_file(dir_path: &Path) -> Result<(bool, u64)> {
    let path = dir_path.join(SEQ_NO_FILE_NAME);
    if !path.exists() {
        return Ok((false, 0));
    }
    let seq_file = DataFile::open_seq_no_file(dir_path)?;
    let seq_no = match seq_file.read_log_record(0)? {
        Some((record, _)) => String::from_utf8_lossy(&record.value).parse().unwrap_or(0),
        None => 0,
    };
    fs::remove_file(&path)?;
    Ok((true, seq_no))
}

/// Replays the hint file, if present, installing each `(key, position)`
/// pair directly into the index. Returns nothing: callers still scan the
/// data files afterwards, which naturally overwrite stale hint entries
/// with whatever was written after the merge snapshot was taken.
fn load_hint_file(dir_path: &Path, index: &dyn Indexer) -> Result<()> {
    let hint_path = dir_path.join(data::HINT_FILE_NAME);
    if !hint_path.exists() {
        return Ok(());
    }
    let hint_file = DataFile::open_hint_file(dir_path)?;
    let mut offset = 0u64;
    while let Some((record, size)) = hint_file.read_log_record(offset)? {
        let pos = LogRecordPos::decode(&record.value)?;
        index.put(&record.key, pos)?;
        offset += size;
    }
    Ok(())
}

/// Scans every data file in ascending id order, replaying non-transactional
/// writes directly and buffering transactional ones until their
/// `TxnFinished` marker is observed. Returns the highest sequence number
/// observed, so the engine can resume numbering batches from there.
fn load_data_files_into_index(
    older_files: &HashMap<u32, DataFile>,
    active_file: &Option<DataFile>,
    index: &dyn Indexer,
) -> Result<u64> {
    let mut ids: Vec<u32> = older_files.keys().copied().collect();
    ids.sort_unstable();
    if let Some(active) = active_file {
        ids.push(active.file_id);
    }

    let mut pending: HashMap<u64, Vec<(Vec<u8>, LogRecordPos, LogRecordType)>> = HashMap::new();
    let mut max_seq_no = NON_TXN_SEQ_NO;

    for id in ids {
        let file: &DataFile = if active_file.as_ref().is_some_and(|a| a.file_id == id) {
            active_file.as_ref().unwrap()
        } else {
            &older_files[&id]
        };

        let mut offset = 0u64;
        while let Some((record, size)) = file.read_log_record(offset)? {
            let pos = LogRecordPos { file_id: id, offset, size: size as u32 };
            let (real_key, seq_no) = data::decode_key_with_seq_no(&record.key);

            if record.record_type == LogRecordType::TxnFinished {
                if let Some(batch) = pending.remove(&seq_no) {
                    for (key, pos, record_type) in batch {
                        apply_replayed(index, &key, pos, record_type)?;
                    }
                }
            } else if seq_no == NON_TXN_SEQ_NO {
                apply_replayed(index, &real_key, pos, record.record_type)?;
            } else {
                pending.entry(seq_no).or_default().push((real_key, pos, record.record_type));
            }

            max_seq_no = max_seq_no.max(seq_no);
            offset += size;
        }
    }

    // Any batches left in `pending` at end-of-scan were never finalized
    // and are discarded without error.
    Ok(max_seq_no)
}

fn apply_replayed(
    index: &dyn Indexer,
    key: &[u8],
    pos: LogRecordPos,
    record_type: LogRecordType,
) -> Result<()> {
    match record_type {
        LogRecordType::Normal => {
            index.put(key, pos)?;
        }
        LogRecordType::Deleted => {
            index.delete(key)?;
        }
        LogRecordType::TxnFinished => unreachable!("finalizers are handled by the caller"),
    }
    Ok(())
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.sync() {
            log::error!("failed to sync database on drop: {err}");
        }
    }
}
