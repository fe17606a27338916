//! Random access emulated over sources that only offer sequential streams.
//!
//! ## Pooling strategy
//!
//! Opened streams are parked in a map keyed by the position they have
//! reached. A read at `position` checks out the stream with the largest key
//! not past `position`, skips it forward, reads, and parks it again under its
//! new position. Front-to-back access therefore reuses one stream and costs
//! no more than a single sequential pass, while scattered access opens at
//! most `max_pool_size` extra streams.
//!
//! When the pool overflows, the stream that is furthest along is closed.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{RadError, Result, aggregate};
use crate::shared::Release;
use crate::window::RandomAccessData;

use super::ReadAt;

/// Default limit of parked streams per backend.
pub const DEFAULT_MAX_POOL_SIZE: usize = 15;

/// Zero-progress skips tolerated before the stream is declared exhausted.
const MAX_IDLE_SKIPS: usize = 3;

/// A sequential stream that can be parked in the pool.
pub trait PooledStream: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` on a non-empty buffer means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Skip up to `n` bytes, returning how many were skipped, possibly 0.
    fn skip(&mut self, n: u64) -> io::Result<u64>;

    /// Close the stream. Dropping without calling this closes it silently.
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

/// Plain [`Read`] stream; skipping reads and discards.
pub struct ReadStream<R>(pub R);

impl<R: Read + Send> PooledStream for ReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }

    fn skip(&mut self, n: u64) -> io::Result<u64> {
        io::copy(&mut (&mut self.0).take(n), &mut io::sink())
    }
}

/// [`Read`] + [`Seek`] stream; skipping is a relative seek.
pub struct SeekStream<R>(pub R);

impl<R: Read + Seek + Send> PooledStream for SeekStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }

    fn skip(&mut self, n: u64) -> io::Result<u64> {
        let step = i64::try_from(n).unwrap_or(i64::MAX);
        let before = self.0.stream_position()?;
        let after = self.0.seek(SeekFrom::Current(step))?;
        Ok(after.saturating_sub(before))
    }
}

/// Skip exactly `n` bytes, failing after repeated zero-progress skips.
fn skip_fully(stream: &mut dyn PooledStream, start: u64, n: u64) -> Result<()> {
    let mut remaining = n;
    let mut idle = 0;
    while remaining > 0 {
        let skipped = stream.skip(remaining)?;
        if skipped > 0 {
            remaining -= skipped.min(remaining);
            idle = 0;
        } else {
            idle += 1;
            if idle >= MAX_IDLE_SKIPS {
                return Err(RadError::UnexpectedEof {
                    position: start + (n - remaining),
                    expected: start + n,
                });
            }
        }
    }
    Ok(())
}

/// Opens a fresh stream positioned at the start of the source.
pub trait StreamFactory: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn PooledStream>>;
}

impl<F> StreamFactory for F
where
    F: Fn() -> io::Result<Box<dyn PooledStream>> + Send + Sync,
{
    fn open(&self) -> io::Result<Box<dyn PooledStream>> {
        self()
    }
}

/// Stream-factory backend keeping a bounded pool of partially consumed streams.
pub struct StreamFactoryAccess {
    factory: Box<dyn StreamFactory>,
    size: u64,
    max_pool_size: usize,
    /// Parked streams keyed by the position they have reached.
    pool: Mutex<BTreeMap<u64, Box<dyn PooledStream>>>,
}

impl StreamFactoryAccess {
    pub fn new(size: u64, max_pool_size: usize, factory: Box<dyn StreamFactory>) -> Self {
        Self {
            factory,
            size,
            max_pool_size,
            pool: Mutex::new(BTreeMap::new()),
        }
    }

    /// Positions of the currently parked streams.
    pub fn pooled_positions(&self) -> Vec<u64> {
        self.pool.lock().keys().copied().collect()
    }

    /// Take the parked stream closest below `position`, or open a new one.
    fn checkout(&self, position: u64) -> Result<(u64, Box<dyn PooledStream>)> {
        let parked = {
            let mut pool = self.pool.lock();
            let key = pool.range(..=position).next_back().map(|(key, _)| *key);
            key.and_then(|key| pool.remove(&key).map(|stream| (key, stream)))
        };
        match parked {
            Some(found) => {
                log::trace!("reusing stream at {} for read at {position}", found.0);
                Ok(found)
            }
            None => {
                log::trace!("opening stream for read at {position}");
                Ok((0, self.factory.open()?))
            }
        }
    }

    /// Park `stream` at `position`, closing whatever no longer fits.
    fn park(&self, position: u64, stream: Box<dyn PooledStream>) {
        let mut evicted = Vec::new();
        {
            let mut pool = self.pool.lock();
            if let Some(previous) = pool.insert(position, stream) {
                evicted.push(previous);
            }
            while pool.len() > self.max_pool_size {
                match pool.pop_last() {
                    Some((key, stream)) => {
                        log::trace!("pool full, evicting stream at {key}");
                        evicted.push(stream);
                    }
                    None => break,
                }
            }
        }
        for stream in evicted {
            close_quietly(stream);
        }
    }

    fn read_checked_out(
        &self,
        stream: &mut dyn PooledStream,
        start: u64,
        position: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        skip_fully(stream, start, position - start)?;
        Ok(stream.read(buf)?)
    }
}

fn close_quietly(stream: Box<dyn PooledStream>) {
    if let Err(e) = stream.close() {
        log::warn!("failed to close pooled stream: {e}");
    }
}

impl Release for StreamFactoryAccess {
    fn release(&self) -> Result<()> {
        let mut pool = self.pool.lock();
        let errors = std::mem::take(&mut *pool)
            .into_values()
            .filter_map(|stream| stream.close().err().map(RadError::from))
            .collect();
        aggregate(errors)
    }
}

impl ReadAt for StreamFactoryAccess {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        let (start, mut stream) = self.checkout(position)?;

        let read = match self.read_checked_out(stream.as_mut(), start, position, buf) {
            Ok(read) => read,
            Err(e) => {
                return Err(match stream.close() {
                    Ok(()) => e,
                    Err(close) => e.suppress(close.into()),
                });
            }
        };

        if read == 0 && !buf.is_empty() {
            close_quietly(stream);
            return Ok(None);
        }
        let next = position + read as u64;
        if next >= self.size {
            close_quietly(stream);
        } else {
            self.park(next, stream);
        }
        Ok(Some(read))
    }
}

/// Create a [`RandomAccessData`] over streams produced by `factory`.
///
/// `full_size` is the number of bytes every fresh stream yields; `offset`
/// and `length` select the window. At most `max_pool_size` partially read
/// streams are kept open.
pub fn from_stream_factory<F, R>(
    full_size: u64,
    offset: u64,
    length: Option<u64>,
    max_pool_size: usize,
    factory: F,
) -> Result<RandomAccessData>
where
    F: Fn() -> io::Result<R> + Send + Sync + 'static,
    R: Read + Send + 'static,
{
    from_pooled_stream_factory(full_size, offset, length, max_pool_size, move || {
        factory().map(|r| Box::new(ReadStream(r)) as Box<dyn PooledStream>)
    })
}

/// Like [`from_stream_factory`], but skips by seeking.
pub fn from_seekable_stream_factory<F, R>(
    full_size: u64,
    offset: u64,
    length: Option<u64>,
    max_pool_size: usize,
    factory: F,
) -> Result<RandomAccessData>
where
    F: Fn() -> io::Result<R> + Send + Sync + 'static,
    R: Read + Seek + Send + 'static,
{
    from_pooled_stream_factory(full_size, offset, length, max_pool_size, move || {
        factory().map(|r| Box::new(SeekStream(r)) as Box<dyn PooledStream>)
    })
}

/// Create a [`RandomAccessData`] over custom [`PooledStream`]s.
pub fn from_pooled_stream_factory<F>(
    full_size: u64,
    offset: u64,
    length: Option<u64>,
    max_pool_size: usize,
    factory: F,
) -> Result<RandomAccessData>
where
    F: Fn() -> io::Result<Box<dyn PooledStream>> + Send + Sync + 'static,
{
    let access = StreamFactoryAccess::new(full_size, max_pool_size, Box::new(factory));
    RandomAccessData::new(access, offset, length)
}

/// Read `path` through a pool of sequential buffered streams.
pub fn open_stream_factory(
    path: impl AsRef<Path>,
    offset: u64,
    length: Option<u64>,
    max_pool_size: usize,
) -> Result<RandomAccessData> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let full_size = std::fs::metadata(&path)?.len();
    from_stream_factory(full_size, offset, length, max_pool_size, move || {
        File::open(&path).map(BufReader::new)
    })
}
