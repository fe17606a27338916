use std::fs::File;
use std::path::Path;

use parking_lot::RwLock;

use crate::error::{RadError, Result};
use crate::shared::Release;
use crate::window::RandomAccessData;

use super::{ReadAt, eof_if_empty};

/// Local file backend with true positional reads.
///
/// Reads never move a shared cursor. The lock only guards the handle
/// against release and is never held exclusively by a read.
pub struct FileAccess {
    file: RwLock<Option<File>>,
    size: u64,
}

impl FileAccess {
    pub fn new(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            file: RwLock::new(Some(file)),
            size,
        })
    }
}

impl Release for FileAccess {
    fn release(&self) -> Result<()> {
        drop(self.file.write().take());
        Ok(())
    }
}

impl ReadAt for FileAccess {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(RadError::Released)?;
        let n = read_file_at(file, position, buf)?;
        Ok(eof_if_empty(n, buf.len()))
    }
}

/// Positional read that does not depend on the file cursor.
pub(crate) fn read_file_at(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }

    #[cfg(windows)]
    {
        // seek_read moves the cursor, but nothing here relies on it
        use std::os::windows::fs::FileExt;
        file.seek_read(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

/// Create a [`RandomAccessData`] over an open file using positional reads.
pub fn from_file(file: File, offset: u64, length: Option<u64>) -> Result<RandomAccessData> {
    RandomAccessData::new(FileAccess::new(file)?, offset, length)
}

/// Open `path` and create a positional-read [`RandomAccessData`] over it.
pub fn open_file(path: impl AsRef<Path>, offset: u64, length: Option<u64>) -> Result<RandomAccessData> {
    from_file(File::open(path)?, offset, length)
}
