use std::path::Path;

use super::log_record::{self, decode_header, LogRecord, MAX_LOG_RECORD_HEADER_SIZE};
use super::LogRecordPos;
use crate::error::{Error, Result};
use crate::fio::{self, FileIoType, IoManager};

pub const DATA_FILE_SUFFIX: &str = ".data";
pub const HINT_FILE_NAME: &str = "hint-index";
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
pub const SEQ_NO_FILE_NAME: &str = "seq-no";
pub const LOCK_FILE_NAME: &str = "flock";
pub const BPTREE_INDEX_FILE_NAME: &str = "bptree-index";

/// One data file: an `IoManager` plus the bookkeeping the engine needs to
/// treat it as an append target or a read-only older file.
pub struct DataFile {
    pub file_id: u32,
    pub write_offset: u64,
    io: Box<dyn IoManager>,
}

/// Renders a file id as the zero-padded 9-digit stem used for `.data`
/// files (e.g. `000000042`).
pub fn file_name(file_id: u32) -> String {
    format!("{file_id:09}{DATA_FILE_SUFFIX}")
}

/// Parses a `.data` file's numeric stem back into a file id.
pub fn parse_file_id(stem: &str) -> Result<u32> {
    stem.parse::<u32>().map_err(|_| Error::DataDirectoryCorrupted(stem.to_string()))
}

impl DataFile {
    pub fn open(dir_path: &Path, file_id: u32, kind: FileIoType) -> Result<Self> {
        let path = dir_path.join(file_name(file_id));
        let io = fio::open(&path, kind)?;
        let write_offset = io.size()?;
        Ok(DataFile { file_id, write_offset, io })
    }

    pub fn open_hint_file(dir_path: &Path) -> Result<Self> {
        Self::open_named(dir_path, HINT_FILE_NAME)
    }

    pub fn open_merge_finished_file(dir_path: &Path) -> Result<Self> {
        Self::open_named(dir_path, MERGE_FINISHED_FILE_NAME)
    }

    pub fn open_seq_no_file(dir_path: &Path) -> Result<Self> {
        Self::open_named(dir_path, SEQ_NO_FILE_NAME)
    }

    fn open_named(dir_path: &Path, name: &str) -> Result<Self> {
        let path = dir_path.join(name);
        let io = fio::open(&path, FileIoType::Standard)?;
        let write_offset = io.size()?;
        Ok(DataFile { file_id: 0, write_offset, io })
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    pub fn size(&self) -> Result<u64> {
        self.io.size()
    }

    /// Appends `buf` to the file, advancing `write_offset`.
    pub fn append(&mut self, buf: &[u8]) -> Result<()> {
        self.io.append(buf)?;
        self.write_offset += buf.len() as u64;
        Ok(())
    }

    /// Writes one hint record mapping `key` to `pos`: a log record whose
    /// key is the user key and whose value is the encoded position.
    pub fn write_hint_record(&mut self, key: &[u8], pos: &LogRecordPos) -> Result<()> {
        let record = LogRecord::normal(key.to_vec(), pos.encode());
        let (encoded, _) = record.encode();
        self.append(&encoded)
    }

    /// Reads the record at `offset`, verifying its CRC. Returns `None` at
    /// end-of-file (the codec's sentinel).
    pub fn read_log_record(&self, offset: u64) -> Result<Option<(LogRecord, u64)>> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        let header_buf_size = (MAX_LOG_RECORD_HEADER_SIZE as u64).min(file_size - offset) as usize;
        let mut header_buf = vec![0u8; header_buf_size];
        self.io.read_at(&mut header_buf, offset)?;

        let Some(header) = decode_header(&header_buf)? else { return Ok(None) };

        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let record_size = header.header_size as u64 + key_size as u64 + value_size as u64;

        let mut key = vec![0u8; key_size];
        let mut value = vec![0u8; value_size];
        if key_size + value_size > 0 {
            let mut kv_buf = vec![0u8; key_size + value_size];
            self.io.read_at(&mut kv_buf, offset + header.header_size as u64)?;
            key.copy_from_slice(&kv_buf[..key_size]);
            value.copy_from_slice(&kv_buf[key_size..]);
        }

        let header_tail = &header_buf[4..header.header_size];
        let actual_crc = log_record::crc_of(header_tail, &key, &value);
        if actual_crc != header.crc {
            return Err(Error::CorruptRecord);
        }

        let record = LogRecord { key, value, record_type: header.record_type };
        Ok(Some((record, record_size)))
    }

    /// Reopens this file's IO backend as the standard variant, used after
    /// recovery to downgrade from an mmap warm-start reader.
    pub fn downgrade_to_standard(&mut self, dir_path: &Path) -> Result<()> {
        let path = dir_path.join(file_name(self.file_id));
        self.io = fio::open(&path, FileIoType::Standard)?;
        Ok(())
    }
}
