//! Bounded windows over a shared backend.
//!
//! [`RandomAccessData`] is the one type callers read through. It pairs a
//! reference-counted backend with an `(offset, size)` window, checks every
//! request against the window before the backend sees it, and translates
//! window-relative positions to backend positions.
//!
//! ## Edge cases
//!
//! - [`read`](RandomAccessData::read) returns `Ok(None)` at or past the end,
//!   but `Ok(Some(0))` for a zero-length request that is still in range.
//! - [`read_from`](RandomAccessData::read_from) returns an empty vector at the
//!   end and fails past it.
//! - A backend that yields fewer bytes than the window promises surfaces as
//!   [`RadError::UnexpectedEof`], never as a silently short result.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Bounds, RadError, Result, check_region, to_usize};
use crate::io::ReadAt;
use crate::reader::RadReader;
use crate::shared::{CloseListener, SharedResource};

/// Smallest buffer used by the transfer helpers.
pub const MIN_TRANSFER_BUFFER_SIZE: usize = 1024;

/// Zero-byte backend reads tolerated in a row before giving up.
const MAX_IDLE_READS: usize = 3;

/// Read-only, thread-safe random access to a window of some backend.
///
/// Views created by [`subsection`](Self::subsection) share the backend and
/// keep it alive; the backend is released when the last view is closed or
/// dropped.
pub struct RandomAccessData {
    shared: Arc<SharedResource<dyn ReadAt>>,
    offset: u64,
    size: u64,
    closed: AtomicBool,
}

impl RandomAccessData {
    /// Wrap `backend` and expose `offset..offset + length` of it.
    ///
    /// `length` defaults to the rest of the backend after `offset`.
    pub fn new<R: ReadAt + 'static>(backend: R, offset: u64, length: Option<u64>) -> Result<Self> {
        let full = backend.size();
        let length = match length {
            Some(length) => length,
            None => full.checked_sub(offset).ok_or(RadError::OutOfBounds(Bounds::Region {
                data_len: full,
                offset,
                length: 0,
            }))?,
        };
        check_region(full, offset, length)?;
        let shared: Arc<SharedResource<dyn ReadAt>> = Arc::new(SharedResource::new(backend));
        Ok(Self {
            shared,
            offset,
            size: length,
            closed: AtomicBool::new(false),
        })
    }

    /// Size of this view in bytes. Constant for the life of the view.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `true` until this view is closed and while the backend is alive.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.shared.is_open()
    }

    fn backend(&self) -> Result<&dyn ReadAt> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RadError::Released);
        }
        Ok(self.shared.get())
    }

    /// New view over `position..position + length` of this one.
    ///
    /// The new view co-owns the backend and must be closed (or dropped)
    /// independently.
    pub fn subsection(&self, position: u64, length: u64) -> Result<RandomAccessData> {
        self.backend()?;
        check_region(self.size, position, length)?;
        self.shared.retain()?;
        Ok(Self {
            shared: self.shared.clone(),
            offset: self.offset + position,
            size: length,
            closed: AtomicBool::new(false),
        })
    }

    /// New view from `position` to the end of this one.
    pub fn subsection_from(&self, position: u64) -> Result<RandomAccessData> {
        let length = self.size.checked_sub(position).ok_or(RadError::OutOfBounds(Bounds::Region {
            data_len: self.size,
            offset: position,
            length: 0,
        }))?;
        self.subsection(position, length)
    }

    /// Number of bytes to request for `read`, or `None` at the end.
    fn request_len(&self, buf_len: usize, position: u64, offset: usize, max_len: usize) -> Result<Option<usize>> {
        if offset > buf_len {
            return Err(RadError::OutOfBounds(Bounds::Read {
                src_pos: position,
                src_len: self.size,
                dest_pos: offset,
                dest_len: buf_len,
            }));
        }
        let wanted = max_len.min(buf_len - offset);
        if wanted == 0 && position <= self.size {
            return Ok(Some(0));
        }
        if position >= self.size {
            return Ok(None);
        }
        let available = self.size - position;
        Ok(Some(usize::try_from(available).map_or(wanted, |a| a.min(wanted))))
    }

    fn check_read_from(&self, position: u64, max_len: usize) -> Result<usize> {
        if position > self.size {
            return Err(RadError::OutOfBounds(Bounds::Read {
                src_pos: position,
                src_len: self.size,
                dest_pos: 0,
                dest_len: max_len,
            }));
        }
        let available = self.size - position;
        Ok(usize::try_from(available).map_or(max_len, |a| a.min(max_len)))
    }

    fn unexpected_eof(&self, position: u64) -> RadError {
        RadError::UnexpectedEof {
            position,
            expected: self.size,
        }
    }

    /// Read up to `max_len` bytes at `position` into `buf[offset..]`.
    ///
    /// Returns `Ok(None)` when `position` is at or past the end of the view.
    pub fn read(&self, buf: &mut [u8], position: u64, offset: usize, max_len: usize) -> Result<Option<usize>> {
        let backend = self.backend()?;
        match self.request_len(buf.len(), position, offset, max_len)? {
            Some(len) if len > 0 => backend.read_at(self.offset + position, &mut buf[offset..offset + len]),
            other => Ok(other),
        }
    }

    /// Read up to `buf.len()` bytes at `position`.
    pub fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        self.read(buf, position, 0, buf.len())
    }

    /// Like [`read`](Self::read), but keeps reading until the requested
    /// length is satisfied.
    pub fn read_fully(&self, buf: &mut [u8], position: u64, offset: usize, max_len: usize) -> Result<Option<usize>> {
        let backend = self.backend()?;
        match self.request_len(buf.len(), position, offset, max_len)? {
            Some(len) if len > 0 => {
                self.fill(backend, position, &mut buf[offset..offset + len])?;
                Ok(Some(len))
            }
            other => Ok(other),
        }
    }

    /// Fill `dest` from window position `position`, retrying short reads.
    fn fill(&self, backend: &dyn ReadAt, position: u64, dest: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        let mut idle = 0;
        while filled < dest.len() {
            let at = position + filled as u64;
            match backend.read_at(self.offset + at, &mut dest[filled..])? {
                None => return Err(self.unexpected_eof(at)),
                Some(0) => {
                    idle += 1;
                    if idle >= MAX_IDLE_READS {
                        return Err(self.unexpected_eof(at));
                    }
                }
                Some(n) => {
                    filled += n;
                    idle = 0;
                }
            }
        }
        Ok(())
    }

    /// Read up to `max_len` bytes at `position` into a new vector.
    ///
    /// At the end of the view the vector is empty.
    pub fn read_from(&self, position: u64, max_len: usize) -> Result<Vec<u8>> {
        let backend = self.backend()?;
        let len = self.check_read_from(position, max_len)?;
        let mut bytes = vec![0u8; len];
        if len > 0 {
            self.fill(backend, position, &mut bytes)?;
        }
        Ok(bytes)
    }

    /// Read the whole view.
    pub fn read_all_bytes(&self) -> Result<Vec<u8>> {
        let len = to_usize(self.size)?;
        self.read_from(0, len)
    }

    /// Read the byte at `position`, or `None` at or past the end.
    pub fn read_byte_at(&self, position: u64) -> Result<Option<u8>> {
        let backend = self.backend()?;
        if position >= self.size {
            return Ok(None);
        }
        backend
            .read_byte_at(self.offset + position)?
            .map(Some)
            .ok_or_else(|| self.unexpected_eof(position))
    }

    /// Asynchronous [`read`](Self::read).
    ///
    /// Backends without native async I/O perform the blocking read on the
    /// calling task.
    pub async fn read_async(
        &self,
        buf: &mut [u8],
        position: u64,
        offset: usize,
        max_len: usize,
    ) -> Result<Option<usize>> {
        let backend = self.backend()?;
        match self.request_len(buf.len(), position, offset, max_len)? {
            Some(len) if len > 0 => {
                backend
                    .read_at_async(self.offset + position, &mut buf[offset..offset + len])
                    .await
            }
            other => Ok(other),
        }
    }

    /// Asynchronous [`read_fully`](Self::read_fully).
    pub async fn read_fully_async(
        &self,
        buf: &mut [u8],
        position: u64,
        offset: usize,
        max_len: usize,
    ) -> Result<Option<usize>> {
        let backend = self.backend()?;
        match self.request_len(buf.len(), position, offset, max_len)? {
            Some(len) if len > 0 => {
                self.fill_async(backend, position, &mut buf[offset..offset + len])
                    .await?;
                Ok(Some(len))
            }
            other => Ok(other),
        }
    }

    async fn fill_async(&self, backend: &dyn ReadAt, position: u64, dest: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        let mut idle = 0;
        while filled < dest.len() {
            let at = position + filled as u64;
            match backend.read_at_async(self.offset + at, &mut dest[filled..]).await? {
                None => return Err(self.unexpected_eof(at)),
                Some(0) => {
                    idle += 1;
                    if idle >= MAX_IDLE_READS {
                        return Err(self.unexpected_eof(at));
                    }
                }
                Some(n) => {
                    filled += n;
                    idle = 0;
                }
            }
        }
        Ok(())
    }

    /// Asynchronous [`read_from`](Self::read_from).
    pub async fn read_from_async(&self, position: u64, max_len: usize) -> Result<Vec<u8>> {
        let backend = self.backend()?;
        let len = self.check_read_from(position, max_len)?;
        let mut bytes = vec![0u8; len];
        if len > 0 {
            self.fill_async(backend, position, &mut bytes).await?;
        }
        Ok(bytes)
    }

    /// Asynchronous [`read_all_bytes`](Self::read_all_bytes).
    pub async fn read_all_bytes_async(&self) -> Result<Vec<u8>> {
        let len = to_usize(self.size)?;
        self.read_from_async(0, len).await
    }

    fn transfer_buffer(&self, buffer_size: usize) -> Vec<u8> {
        let len = buffer_size.max(MIN_TRANSFER_BUFFER_SIZE);
        let len = usize::try_from(self.size).map_or(len, |size| size.min(len));
        vec![0u8; len]
    }

    /// Write the whole view to `sink` through one reusable buffer.
    ///
    /// Returns the number of bytes written, always `size()`.
    pub fn transfer_to<W: Write>(&self, mut sink: W, buffer_size: usize) -> Result<u64> {
        if self.size == 0 {
            self.backend()?;
            return Ok(0);
        }
        let mut buffer = self.transfer_buffer(buffer_size);
        let mut position = 0u64;
        let mut idle = 0;
        while position < self.size {
            match self.read_at(position, &mut buffer)? {
                None => return Err(self.unexpected_eof(position)),
                Some(0) => {
                    idle += 1;
                    if idle >= MAX_IDLE_READS {
                        return Err(self.unexpected_eof(position));
                    }
                }
                Some(n) => {
                    sink.write_all(&buffer[..n])?;
                    position += n as u64;
                    idle = 0;
                }
            }
        }
        sink.flush()?;
        Ok(position)
    }

    /// Asynchronous [`transfer_to`](Self::transfer_to) into a tokio writer.
    pub async fn transfer_to_async<W>(&self, mut sink: W, buffer_size: usize) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        if self.size == 0 {
            self.backend()?;
            return Ok(0);
        }
        let mut buffer = self.transfer_buffer(buffer_size);
        let mut position = 0u64;
        let mut idle = 0;
        while position < self.size {
            let len = buffer.len();
            match self.read_async(&mut buffer, position, 0, len).await? {
                None => return Err(self.unexpected_eof(position)),
                Some(0) => {
                    idle += 1;
                    if idle >= MAX_IDLE_READS {
                        return Err(self.unexpected_eof(position));
                    }
                }
                Some(n) => {
                    sink.write_all(&buffer[..n]).await?;
                    position += n as u64;
                    idle = 0;
                }
            }
        }
        sink.flush().await?;
        Ok(position)
    }

    /// Sequential reader over this view, borrowing it.
    pub fn reader(&self) -> RadReader<&RandomAccessData> {
        RadReader::new(self)
    }

    /// Sequential reader that owns this view.
    pub fn into_reader(self) -> RadReader<RandomAccessData> {
        RadReader::new(self)
    }

    /// Run `listener` once the shared backend is released.
    pub fn on_shared_close(&self, listener: CloseListener) -> Result<()> {
        self.shared.on_shared_close(listener)
    }

    /// Close this view.
    ///
    /// The backend is released only when no other view is left open. A
    /// second close of the same view fails with [`RadError::Released`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(RadError::Released);
        }
        self.shared.close()
    }
}

impl AsRef<RandomAccessData> for RandomAccessData {
    fn as_ref(&self) -> &RandomAccessData {
        self
    }
}

impl Drop for RandomAccessData {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel)
            && let Err(e) = self.shared.close()
        {
            log::warn!("failed to release data source on drop: {e}");
        }
    }
}

impl fmt::Debug for RandomAccessData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomAccessData")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("shared", &self.shared)
            .finish()
    }
}
