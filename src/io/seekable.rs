use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{RadError, Result};
use crate::shared::Release;
use crate::window::RandomAccessData;

use super::{ReadAt, eof_if_empty};

/// Attempts to land the cursor on the requested position before giving up.
const MAX_SEEK_ATTEMPTS: usize = 3;

/// Single-cursor backend over any `Read + Seek` source.
///
/// Seek and read happen under one lock, and the cursor is verified after
/// both, so concurrent callers never observe each other's cursor moves.
pub struct SeekableAccess<S> {
    stream: Mutex<Option<S>>,
    size: u64,
}

impl<S: Read + Seek> SeekableAccess<S> {
    pub fn new(mut stream: S) -> Result<Self> {
        let size = stream.seek(SeekFrom::End(0))?;
        Ok(Self {
            stream: Mutex::new(Some(stream)),
            size,
        })
    }
}

fn seek_exact<S: Seek>(stream: &mut S, position: u64) -> io::Result<()> {
    for _ in 0..MAX_SEEK_ATTEMPTS {
        if stream.seek(SeekFrom::Start(position))? == position
            && stream.stream_position()? == position
        {
            return Ok(());
        }
    }
    Err(io::Error::other(format!(
        "cursor did not settle at {position} after {MAX_SEEK_ATTEMPTS} seeks"
    )))
}

impl<S: Read + Seek + Send> SeekableAccess<S> {
    fn with_stream<T>(&self, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let mut guard = self.stream.lock();
        let stream = guard.as_mut().ok_or(RadError::Released)?;
        f(stream)
    }
}

impl<S: Send> Release for SeekableAccess<S> {
    fn release(&self) -> Result<()> {
        drop(self.stream.lock().take());
        Ok(())
    }
}

impl<S: Read + Seek + Send> ReadAt for SeekableAccess<S> {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        self.with_stream(|stream| {
            for _ in 0..MAX_SEEK_ATTEMPTS {
                seek_exact(stream, position)?;
                let n = stream.read(buf)?;
                if stream.stream_position()? == position + n as u64 {
                    return Ok(eof_if_empty(n, buf.len()));
                }
            }
            Err(io::Error::other(format!("unstable cursor while reading at {position}")).into())
        })
    }

    fn read_byte_at(&self, position: u64) -> Result<Option<u8>> {
        self.with_stream(|stream| {
            seek_exact(stream, position)?;
            let mut byte = [0u8; 1];
            match stream.read(&mut byte)? {
                0 => Ok(None),
                _ => Ok(Some(byte[0])),
            }
        })
    }
}

/// Create a [`RandomAccessData`] over a single-cursor `Read + Seek` source.
pub fn from_seekable<S>(stream: S, offset: u64, length: Option<u64>) -> Result<RandomAccessData>
where
    S: Read + Seek + Send + 'static,
{
    RandomAccessData::new(SeekableAccess::new(stream)?, offset, length)
}

/// Open `path` and read it through a single seek-then-read cursor.
pub fn open_seekable(path: impl AsRef<Path>, offset: u64, length: Option<u64>) -> Result<RandomAccessData> {
    from_seekable(File::open(path)?, offset, length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Cursor that ignores every other seek.
    struct Sloppy {
        inner: Cursor<Vec<u8>>,
        skip_next: bool,
    }

    impl Read for Sloppy {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for Sloppy {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.skip_next = !self.skip_next;
            if self.skip_next {
                return Ok(self.inner.position());
            }
            self.inner.seek(pos)
        }
    }

    #[test]
    fn retries_until_cursor_lands() {
        let data: Vec<u8> = (0..=255).collect();
        let sloppy = Sloppy {
            inner: Cursor::new(data),
            skip_next: true,
        };
        let access = SeekableAccess::new(sloppy).unwrap();
        assert_eq!(access.size(), 256);

        let mut buf = [0u8; 4];
        assert_eq!(access.read_at(10, &mut buf).unwrap(), Some(4));
        assert_eq!(buf, [10, 11, 12, 13]);
        assert_eq!(access.read_byte_at(200).unwrap(), Some(200));
        assert_eq!(access.read_at(256, &mut buf).unwrap(), None);
    }

    #[test]
    fn reads_fail_after_release() {
        let access = SeekableAccess::new(Cursor::new(vec![1u8, 2, 3])).unwrap();
        access.release().unwrap();
        let mut buf = [0u8; 1];
        assert!(matches!(access.read_at(0, &mut buf), Err(RadError::Released)));
    }
}
