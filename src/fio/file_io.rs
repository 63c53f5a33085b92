use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt as _;
use std::path::Path;
use std::sync::Mutex;

use super::IoManager;
use crate::error::Result;

const DATA_FILE_PERM: u32 = 0o644;

/// Standard file IO backend: opened create+read+write+append, permission
/// 0644. Reads are positioned (`pread`); writes rely on `O_APPEND` so
/// concurrent opens of the same file always land at the end, and are
/// serialized behind a mutex because `Write::write_all` needs exclusive
/// access to the file's cursor.
pub struct FileIo {
    file: Mutex<File>,
}

impl FileIo {
    pub fn open(path: &Path) -> Result<Self> {
        use std::os::unix::fs::OpenOptionsExt as _;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .append(true)
            .mode(DATA_FILE_PERM)
            .open(path)?;
        Ok(FileIo { file: Mutex::new(file) })
    }
}

impl IoManager for FileIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let file = self.file.lock().expect("file io lock poisoned");
        Ok(file.read_at(buf, offset)?)
    }

    fn append(&self, buf: &[u8]) -> Result<usize> {
        use std::io::Write as _;
        let mut file = self.file.lock().expect("file io lock poisoned");
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        let file = self.file.lock().expect("file io lock poisoned");
        file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        let file = self.file.lock().expect("file io lock poisoned");
        Ok(file.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_at() {
        let dir = tempfile::tempdir().unwrap();
        let io = FileIo::open(&dir.path().join("000000001.data")).unwrap();
        io.append(b"hello ").unwrap();
        io.append(b"world").unwrap();
        assert_eq!(io.size().unwrap(), 11);

        let mut buf = [0u8; 5];
        io.read_at(&mut buf, 6).unwrap();
        assert_eq!(&buf, b"world");
    }
}
