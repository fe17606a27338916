use crate::error::Result;
use crate::shared::Release;
use crate::window::RandomAccessData;

use super::ReadAt;

/// In-memory byte array backend. Holds no external resource.
pub struct ArrayAccess {
    data: Box<[u8]>,
}

impl ArrayAccess {
    pub fn new(data: impl Into<Box<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl Release for ArrayAccess {}

impl ReadAt for ArrayAccess {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        let src = match usize::try_from(position) {
            Ok(start) if start < self.data.len() => &self.data[start..],
            _ => return Ok(None),
        };
        let len = src.len().min(buf.len());
        buf[..len].copy_from_slice(&src[..len]);
        Ok(Some(len))
    }

    fn read_byte_at(&self, position: u64) -> Result<Option<u8>> {
        Ok(usize::try_from(position)
            .ok()
            .and_then(|i| self.data.get(i).copied()))
    }
}

/// Create a [`RandomAccessData`] over an in-memory byte array.
///
/// `length` defaults to the rest of the array after `offset`.
pub fn from_bytes(
    data: impl Into<Box<[u8]>>,
    offset: u64,
    length: Option<u64>,
) -> Result<RandomAccessData> {
    RandomAccessData::new(ArrayAccess::new(data), offset, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_clamped_to_array() {
        let access = ArrayAccess::new(vec![1u8, 2, 3, 4]);
        let mut buf = [0u8; 8];
        assert_eq!(access.read_at(2, &mut buf).unwrap(), Some(2));
        assert_eq!(&buf[..2], &[3, 4]);
        assert_eq!(access.read_at(4, &mut buf).unwrap(), None);
        assert_eq!(access.read_at(u64::MAX, &mut buf).unwrap(), None);
        assert_eq!(access.read_byte_at(3).unwrap(), Some(4));
        assert_eq!(access.read_byte_at(4).unwrap(), None);
    }

    #[test]
    fn window_over_array() {
        let data = from_bytes(&b"hello world"[..], 6, None).unwrap();
        assert_eq!(data.size(), 5);
        assert_eq!(data.read_all_bytes().unwrap(), b"world");

        assert!(from_bytes(vec![0u8; 4], 5, None).unwrap_err().is_out_of_bounds());
        assert!(from_bytes(vec![0u8; 4], 2, Some(3)).unwrap_err().is_out_of_bounds());
    }
}
