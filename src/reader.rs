use std::io::{self, Read, Seek, SeekFrom};

use crate::error::RadError;
use crate::window::RandomAccessData;

/// Sequential [`Read`] + [`Seek`] adapter over a [`RandomAccessData`].
///
/// Not meant to be shared between threads; create one reader per consumer.
/// Works with an owned view or a borrowed one.
pub struct RadReader<D> {
    data: D,
    position: u64,
    mark: u64,
}

impl<D: AsRef<RandomAccessData>> RadReader<D> {
    pub fn new(data: D) -> Self {
        Self {
            data,
            position: 0,
            mark: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left before the end, saturated to `usize`.
    pub fn available(&self) -> usize {
        let left = self.data.as_ref().size().saturating_sub(self.position);
        usize::try_from(left).unwrap_or(usize::MAX)
    }

    /// Remember the current position for [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.mark = self.position;
    }

    /// Return to the last [`mark`](Self::mark), or the start.
    pub fn reset(&mut self) {
        self.position = self.mark;
    }

    /// Advance by up to `n` bytes, never past the end.
    pub fn skip(&mut self, n: u64) -> u64 {
        let step = n.min(self.data.as_ref().size().saturating_sub(self.position));
        self.position += step;
        step
    }

    /// Read the next byte, or `None` at the end.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.data.as_ref().read_byte_at(self.position)?;
        if byte.is_some() {
            self.position += 1;
        }
        Ok(byte)
    }

    pub fn into_inner(self) -> D {
        self.data
    }
}

impl<D: AsRef<RandomAccessData>> Read for RadReader<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(self.available());
        if len == 0 {
            return Ok(0);
        }
        match self.data.as_ref().read(buf, self.position, 0, len)? {
            Some(n) => {
                self.position += n as u64;
                Ok(n)
            }
            // backend ended before the end of the window
            None => Err(RadError::UnexpectedEof {
                position: self.position,
                expected: self.data.as_ref().size(),
            }
            .into()),
        }
    }
}

impl<D: AsRef<RandomAccessData>> Seek for RadReader<D> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(n) => {
                self.position = n;
                return Ok(n);
            }
            SeekFrom::End(delta) => (self.data.as_ref().size(), delta),
            SeekFrom::Current(delta) => (self.position, delta),
        };
        match base.checked_add_signed(delta) {
            Some(n) => {
                self.position = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::io::{ReadAt, from_bytes};
    use crate::shared::Release;

    fn data() -> RandomAccessData {
        from_bytes((0..=255u8).collect::<Vec<_>>(), 0, None).unwrap()
    }

    #[test]
    fn reads_bytes_until_end() {
        let data = data();
        let mut reader = data.reader();
        assert_eq!(reader.available(), 256);
        for i in 0..=255u8 {
            assert_eq!(reader.read_byte().unwrap(), Some(i));
        }
        assert_eq!(reader.read_byte().unwrap(), None);
        assert_eq!(reader.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn skip_mark_reset() {
        let mut reader = data().into_reader();
        assert_eq!(reader.skip(4), 4);
        assert_eq!(reader.read_byte().unwrap(), Some(4));

        reader.mark();
        let mut buf = [0u8; 7];
        assert_eq!(reader.read(&mut buf[2..5]).unwrap(), 3);
        assert_eq!(buf, [0, 0, 5, 6, 7, 0, 0]);
        reader.reset();
        assert_eq!(reader.read_byte().unwrap(), Some(5));

        assert_eq!(reader.skip(1000), 250);
        assert_eq!(reader.skip(1), 0);
        assert_eq!(reader.read_byte().unwrap(), None);
    }

    #[test]
    fn seek_and_read_to_end() {
        let data = data();
        let mut reader = data.reader();
        assert_eq!(reader.seek(SeekFrom::End(-6)).unwrap(), 250);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![250, 251, 252, 253, 254, 255]);

        assert!(reader.seek(SeekFrom::Current(-300)).is_err());
        assert_eq!(reader.seek(SeekFrom::Start(300)).unwrap(), 300);
        assert_eq!(reader.read(&mut [0u8; 1]).unwrap(), 0);
    }

    /// Declares 8 bytes but only ever yields the first 3.
    struct Short;

    impl Release for Short {}

    impl ReadAt for Short {
        fn size(&self) -> u64 {
            8
        }

        fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
            if position >= 3 {
                return Ok(None);
            }
            let n = buf.len().min(3 - position as usize);
            buf[..n].fill(position as u8 + 1);
            Ok(Some(n))
        }
    }

    #[test]
    fn short_backend_is_not_a_clean_end() {
        let data = RandomAccessData::new(Short, 0, None).unwrap();
        let mut reader = data.reader();
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out.len(), 3);
        assert_eq!(reader.position(), 3);
    }
}
