use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{DbError, Result};
use crate::page::PageReference;
use crate::storage::Storage;

/// File-backed frame storage over a single append-only page file.
///
/// All I/O goes through one seekable handle guarded by a mutex; the append
/// offset is tracked explicitly so a torn previous run cannot interleave
/// new frames with garbage.
pub struct FileStorage {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileStorage {
    /// Opens (or creates) the page file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn append(&self, frame: &[u8]) -> Result<PageReference> {
        let mut file = self.file.lock();
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(frame)?;
        Ok(PageReference {
            offset,
            length: frame.len() as u32,
            checksum: crc32fast::hash(frame),
        })
    }

    fn read(&self, reference: &PageReference) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; reference.length as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(reference.offset))?;
            file.read_exact(&mut buf)?;
        }
        let checksum = crc32fast::hash(&buf);
        if checksum != reference.checksum {
            return Err(DbError::Storage(format!(
                "checksum mismatch at offset {} in {}: stored {:#010x}, computed {:#010x}",
                reference.offset,
                self.path.display(),
                reference.checksum,
                checksum
            )));
        }
        Ok(buf)
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}
