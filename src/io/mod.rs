//! Backends that provide positional reads over some physical data source.
//!
//! Every backend implements [`ReadAt`] and is wrapped into a
//! [`RandomAccessData`](crate::RandomAccessData) by one of the constructor
//! functions re-exported here.

mod array;
mod async_file;
mod buffer;
mod file;
mod seekable;
mod stream;

pub use array::{ArrayAccess, from_bytes};
pub use async_file::{AsyncFileAccess, from_async_file, open_async_file};
pub use buffer::{BufferAccess, BufferReclaimer, from_buffer, from_mmap, release_native_buffer};
pub use file::{FileAccess, from_file, open_file};
pub use seekable::{SeekableAccess, from_seekable, open_seekable};
pub use stream::{
    DEFAULT_MAX_POOL_SIZE, PooledStream, ReadStream, SeekStream, StreamFactory,
    StreamFactoryAccess, from_pooled_stream_factory, from_seekable_stream_factory,
    from_stream_factory, open_stream_factory,
};

use async_trait::async_trait;

use crate::error::Result;
use crate::shared::Release;

/// Trait for random access reading from a data source.
///
/// Positions are absolute within the source. Implementations must be safe
/// to call concurrently; any cursor state is guarded internally.
#[async_trait]
pub trait ReadAt: Release + Send + Sync {
    /// Get the total size of the data source.
    fn size(&self) -> u64;

    /// Read up to `buf.len()` bytes at `position`.
    ///
    /// Returns `Ok(None)` when the source has no more data at `position`.
    /// Callers never pass an empty buffer.
    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Read a single byte at `position`.
    fn read_byte_at(&self, position: u64) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok(self
            .read_at(position, &mut byte)?
            .filter(|&n| n == 1)
            .map(|_| byte[0]))
    }

    /// Asynchronous counterpart of [`read_at`](ReadAt::read_at).
    ///
    /// The default runs the blocking read on the calling task, so the
    /// caller's worker thread stays occupied for the whole call.
    async fn read_at_async(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        self.read_at(position, buf)
    }
}

/// Map a raw byte count to the `ReadAt` convention.
pub(crate) fn eof_if_empty(read: usize, requested: usize) -> Option<usize> {
    if read == 0 && requested > 0 {
        None
    } else {
        Some(read)
    }
}
