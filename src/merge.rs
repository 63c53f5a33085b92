//! Merge: compaction that rewrites live records into a fresh directory,
//! emits a hint file alongside them, and leaves the atomic swap to the
//! next open.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use crate::data::{self, DataFile, LogRecord, LOCK_FILE_NAME, SEQ_NO_FILE_NAME};
use crate::engine::{Engine, NON_TXN_SEQ_NO};
use crate::error::{Error, Result};
use crate::fio::FileIoType;
use crate::options::Options;

const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

fn merge_dir_path(dir_path: &Path) -> PathBuf {
    let name = dir_path.file_name().unwrap_or(std::ffi::OsStr::new("")).to_string_lossy();
    dir_path.with_file_name(format!("{name}-merge"))
}

impl Engine {
    /// Compacts every data file below the current active file into a fresh
    /// snapshot, writing a hint file so the next open can skip replaying
    /// them. Concurrent writers continue appending to the new active file
    /// created at the start of the critical section; they are never
    /// considered merge candidates.
    ///
    /// Rejects with [`Error::MergeRatioUnreached`] if the reclaimable ratio
    /// hasn't reached `Options::data_file_merge_ratio`, and with
    /// [`Error::NotEnoughSpace`] if the directory's filesystem doesn't have
    /// room for a second copy of the current data. Neither check mutates
    /// anything.
    pub fn merge(&self) -> Result<()> {
        if self.is_merging.swap(true, Ordering::AcqRel) {
            return Err(Error::MergeInProgress);
        }
        let result = self.do_merge();
        self.is_merging.store(false, Ordering::Release);
        result
    }

    fn do_merge(&self) -> Result<()> {
        let stat = self.stat()?;
        if stat.disk_size > 0 {
            let ratio = stat.reclaimable_size as f64 / stat.disk_size as f64;
            if ratio < self.options.data_file_merge_ratio {
                return Err(Error::MergeRatioUnreached);
            }
        }
        let available = fs4::available_space(&self.options.dir_path)?;
        if available < stat.disk_size {
            return Err(Error::NotEnoughSpace);
        }

        let (boundary, candidate_ids) = {
            let mut state = self.state.write().expect("engine lock poisoned");
            if let Some(active) = &state.active_file {
                active.sync()?;
                let old_id = active.file_id;
                let retired = state.active_file.take().expect("checked above");
                state.older_files.insert(old_id, retired);
            }
            let boundary = state.older_files.keys().copied().max().map_or(0, |id| id + 1);
            state.active_file =
                Some(DataFile::open(&self.options.dir_path, boundary, FileIoType::Standard)?);

            let mut ids: Vec<u32> =
                state.older_files.keys().copied().filter(|&id| id < boundary).collect();
            ids.sort_unstable();
            (boundary, ids)
        };

        log::info!("merge starting: {} candidate files below boundary {boundary}", candidate_ids.len());

        let merge_dir = merge_dir_path(&self.options.dir_path);
        if merge_dir.exists() {
            fs::remove_dir_all(&merge_dir)?;
        }
        fs::create_dir_all(&merge_dir)?;

        let sub_options = Options {
            dir_path: merge_dir.clone(),
            sync_writes: false,
            index_type: self.options.index_type,
            data_file_size: self.options.data_file_size,
            bytes_per_sync: 0,
            mmap_at_startup: false,
            data_file_merge_ratio: self.options.data_file_merge_ratio,
        };
        let sub_engine = Engine::open(sub_options)?;
        let mut hint_file = DataFile::open_hint_file(&merge_dir)?;

        for id in candidate_ids {
            let source = DataFile::open(&self.options.dir_path, id, FileIoType::Standard)?;
            let mut offset = 0u64;
            while let Some((record, size)) = source.read_log_record(offset)? {
                let (real_key, _seq_no) = data::decode_key_with_seq_no(&record.key);
                let pos = self.index.get(&real_key)?;
                let is_live = pos.is_some_and(|p| p.file_id == id && p.offset == offset);
                if is_live {
                    let rewritten = LogRecord::normal(
                        data::encode_key_with_seq_no(&real_key, NON_TXN_SEQ_NO),
                        record.value,
                    );
                    let new_pos = sub_engine.append_log_record(&rewritten)?;
                    sub_engine.index.put(&real_key, new_pos)?;
                    hint_file.write_hint_record(&real_key, &new_pos)?;
                }
                offset += size;
            }
        }

        hint_file.sync()?;
        sub_engine.sync()?;
        sub_engine.close()?;

        let mut finished_file = DataFile::open_merge_finished_file(&merge_dir)?;
        let record = LogRecord::normal(MERGE_FINISHED_KEY.to_vec(), boundary.to_string().into_bytes());
        let (encoded, _) = record.encode();
        finished_file.append(&encoded)?;
        finished_file.sync()?;

        log::info!("merge finished: boundary {boundary}");
        Ok(())
    }
}

/// Recovers from a merge that was interrupted before or after the swap.
/// Invoked on open, before data files are enumerated.
pub fn load_merge_files(dir_path: &Path) -> Result<()> {
    let merge_dir = merge_dir_path(dir_path);
    if !merge_dir.exists() {
        return Ok(());
    }

    let finished_path = merge_dir.join(data::MERGE_FINISHED_FILE_NAME);
    if !finished_path.exists() {
        log::info!("merge directory present without a finished marker, discarding it");
        fs::remove_dir_all(&merge_dir)?;
        return Ok(());
    }

    let finished_file = DataFile::open_merge_finished_file(&merge_dir)?;
    let boundary: u32 = match finished_file.read_log_record(0)? {
        Some((record, _)) => String::from_utf8_lossy(&record.value)
            .parse()
            .map_err(|_| Error::DataDirectoryCorrupted("merge-finished".to_string()))?,
        None => return Err(Error::DataDirectoryCorrupted("merge-finished".to_string())),
    };

    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_suffix(data::DATA_FILE_SUFFIX) {
            if let Ok(id) = data::parse_file_id(stem) {
                if id < boundary {
                    fs::remove_file(entry.path())?;
                }
            }
        }
    }

    for entry in fs::read_dir(&merge_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == SEQ_NO_FILE_NAME || name == LOCK_FILE_NAME {
            continue;
        }
        fs::rename(entry.path(), dir_path.join(&name))?;
    }

    fs::remove_dir_all(&merge_dir)?;
    log::info!("merge recovery applied, boundary {boundary}");
    Ok(())
}
