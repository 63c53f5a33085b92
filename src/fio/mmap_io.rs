use std::fs::OpenOptions;
use std::path::Path;

use memmap2::Mmap;

use super::IoManager;
use crate::error::{Error, Result};

/// Read-only memory map of an entire file. Used as an optimization at open
/// time to speed up log replay; `append` and `sync` are undefined and
/// always return an error rather than ever being invoked, since the engine
/// downgrades every open file to `FileIo` before accepting writes.
pub struct MmapIo {
    mmap: Option<Mmap>,
    len: u64,
}

impl MmapIo {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        // mmap of a zero-length file is invalid on most platforms; treat it
        // as an empty backend rather than mapping anything.
        let mmap = if len == 0 { None } else { Some(unsafe { Mmap::map(&file)? }) };
        Ok(MmapIo { mmap, len })
    }
}

impl IoManager for MmapIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let Some(mmap) = &self.mmap else { return Ok(0) };
        let offset = offset as usize;
        if offset >= mmap.len() {
            return Ok(0);
        }
        let n = buf.len().min(mmap.len() - offset);
        buf[..n].copy_from_slice(&mmap[offset..offset + n]);
        Ok(n)
    }

    fn append(&self, _buf: &[u8]) -> Result<usize> {
        Err(Error::Index("append is undefined on the read-only mmap backend".into()))
    }

    fn sync(&self) -> Result<()> {
        Err(Error::Index("sync is undefined on the read-only mmap backend".into()))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fio::FileIo;

    #[test]
    fn reads_what_was_written_before_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000000001.data");
        {
            let io = FileIo::open(&path).unwrap();
            io.append(b"persisted").unwrap();
            io.sync().unwrap();
        }

        let mmap = MmapIo::open(&path).unwrap();
        assert_eq!(mmap.size().unwrap(), 9);
        let mut buf = [0u8; 9];
        mmap.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"persisted");
    }

    #[test]
    fn append_and_sync_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mmap = MmapIo::open(&dir.path().join("x.data")).unwrap();
        assert!(mmap.append(b"x").is_err());
        assert!(mmap.sync().is_err());
    }
}
