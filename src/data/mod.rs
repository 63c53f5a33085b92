//! Log record codec and on-disk data file wrapper.

mod data_file;
mod log_record;

pub use data_file::{
    DataFile, BPTREE_INDEX_FILE_NAME, DATA_FILE_SUFFIX, HINT_FILE_NAME, LOCK_FILE_NAME,
    MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
pub use log_record::{
    decode_key_with_seq_no, encode_key_with_seq_no, LogRecord, LogRecordType,
    MAX_LOG_RECORD_HEADER_SIZE,
};

/// A log record's location on disk: which file, at which byte offset, and
/// how many bytes the encoded record occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogRecordPos {
    pub file_id: u32,
    pub offset: u64,
    pub size: u32,
}

impl LogRecordPos {
    /// Encodes this position as `varint(file_id) || varint(offset) ||
    /// varint(size)`, the format used by hint file values.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(15);
        log_record::encode_uvarint(self.file_id as u64, &mut out);
        log_record::encode_uvarint(self.offset, &mut out);
        log_record::encode_uvarint(self.size as u64, &mut out);
        out
    }

    /// Decodes a position previously produced by `encode`.
    pub fn decode(buf: &[u8]) -> crate::error::Result<LogRecordPos> {
        let (file_id, n1) = log_record::decode_uvarint(buf).ok_or(crate::error::Error::CorruptRecord)?;
        let (offset, n2) =
            log_record::decode_uvarint(&buf[n1..]).ok_or(crate::error::Error::CorruptRecord)?;
        let (size, _) =
            log_record::decode_uvarint(&buf[n1 + n2..]).ok_or(crate::error::Error::CorruptRecord)?;
        Ok(LogRecordPos { file_id: file_id as u32, offset, size: size as u32 })
    }
}
