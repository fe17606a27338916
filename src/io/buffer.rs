use std::any::Any;
use std::error::Error;
use std::fs::File;
use std::io::{Cursor, Read};

use memmap2::Mmap;
use parking_lot::Mutex;

use crate::error::{RadError, Result, to_usize};
use crate::shared::Release;
use crate::window::RandomAccessData;

use super::{ReadAt, eof_if_empty};

/// Platform hook that reclaims the memory behind a native buffer.
///
/// Failures are logged and swallowed by [`release_native_buffer`].
pub trait BufferReclaimer: Send + Sync {
    fn reclaim(&self, len: usize) -> std::result::Result<(), Box<dyn Error + Send + Sync>>;
}

/// Best-effort reclaim of a released buffer. Never fails.
///
/// Without a reclaimer this is a no-op and the buffer is freed when dropped.
pub fn release_native_buffer(reclaimer: Option<&dyn BufferReclaimer>, len: usize) {
    let Some(reclaimer) = reclaimer else {
        return;
    };
    if let Err(e) = reclaimer.reclaim(len) {
        log::warn!("failed to reclaim native buffer of {len} bytes: {e}");
    }
}

/// Buffer backend with a single movable cursor.
///
/// Works over raw bytes or a memory map. Every read repositions the shared
/// cursor under a lock.
pub struct BufferAccess<B> {
    cursor: Mutex<Option<Cursor<B>>>,
    size: u64,
    reclaimer: Option<Box<dyn BufferReclaimer>>,
    resources: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl<B: AsRef<[u8]>> BufferAccess<B> {
    pub fn new(buf: B) -> Self {
        let size = buf.as_ref().len() as u64;
        Self {
            cursor: Mutex::new(Some(Cursor::new(buf))),
            size,
            reclaimer: None,
            resources: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reclaimer(mut self, reclaimer: Box<dyn BufferReclaimer>) -> Self {
        self.reclaimer = Some(reclaimer);
        self
    }

    /// Keep `resource` alive until release, then drop it.
    pub fn with_resource(self, resource: Box<dyn Any + Send>) -> Self {
        self.resources.lock().push(resource);
        self
    }
}

impl<B: Send> Release for BufferAccess<B> {
    fn release(&self) -> Result<()> {
        let buffer = self.cursor.lock().take();
        drop(buffer);
        release_native_buffer(self.reclaimer.as_deref(), self.size as usize);
        self.resources.lock().clear();
        Ok(())
    }
}

impl<B: AsRef<[u8]> + Send> ReadAt for BufferAccess<B> {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut guard = self.cursor.lock();
        let cursor = guard.as_mut().ok_or(RadError::Released)?;
        cursor.set_position(position);
        let n = cursor.read(buf)?;
        Ok(eof_if_empty(n, buf.len()))
    }

    fn read_byte_at(&self, position: u64) -> Result<Option<u8>> {
        let index = to_usize(position)?;
        let guard = self.cursor.lock();
        let cursor = guard.as_ref().ok_or(RadError::Released)?;
        Ok(cursor.get_ref().as_ref().get(index).copied())
    }
}

/// Create a [`RandomAccessData`] over a byte buffer read through a cursor.
pub fn from_buffer<B>(buf: B, offset: u64, length: Option<u64>) -> Result<RandomAccessData>
where
    B: AsRef<[u8]> + Send + 'static,
{
    RandomAccessData::new(BufferAccess::new(buf), offset, length)
}

/// Memory-map `file` and create a [`RandomAccessData`] over the mapping.
///
/// The file stays open until the mapping is released.
pub fn from_mmap(file: File, offset: u64, length: Option<u64>) -> Result<RandomAccessData> {
    let len = to_usize(file.metadata()?.len())?;
    if len == 0 {
        let access = BufferAccess::new(Vec::new()).with_resource(Box::new(file));
        return RandomAccessData::new(access, offset, length);
    }
    // SAFETY: the mapping is read-only; callers must not truncate the file while it is mapped.
    let map = unsafe { Mmap::map(&file)? };
    let access = BufferAccess::new(map).with_resource(Box::new(file));
    RandomAccessData::new(access, offset, length)
}
