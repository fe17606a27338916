use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{RadError, Result};
use crate::shared::Release;
use crate::window::RandomAccessData;

use super::file::read_file_at;
use super::{ReadAt, eof_if_empty};

/// File backend whose asynchronous reads run on tokio's blocking pool.
///
/// Dropping a pending [`read_at_async`](ReadAt::read_at_async) future closes
/// the channel: every later read on this backend, from any view, fails with
/// [`RadError::Cancelled`]. Reads already in flight on the blocking pool run
/// to completion, their results are discarded.
///
/// Async reads require a tokio runtime.
pub struct AsyncFileAccess {
    channel: RwLock<Channel>,
    size: u64,
}

enum Channel {
    Open(Arc<File>),
    Cancelled,
    Released,
}

impl AsyncFileAccess {
    pub fn new(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            channel: RwLock::new(Channel::Open(Arc::new(file))),
            size,
        })
    }

    fn file(&self) -> Result<Arc<File>> {
        match &*self.channel.read() {
            Channel::Open(file) => Ok(file.clone()),
            Channel::Cancelled => Err(RadError::Cancelled),
            Channel::Released => Err(RadError::Released),
        }
    }

    fn cancel(&self) {
        let mut channel = self.channel.write();
        if let Channel::Open(_) = &*channel {
            log::debug!("async read cancelled, closing channel");
            *channel = Channel::Cancelled;
        }
    }
}

/// Closes the channel unless disarmed before drop.
struct CancelOnDrop<'a> {
    access: &'a AsyncFileAccess,
    armed: bool,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.access.cancel();
        }
    }
}

impl Release for AsyncFileAccess {
    fn release(&self) -> Result<()> {
        *self.channel.write() = Channel::Released;
        Ok(())
    }
}

#[async_trait]
impl ReadAt for AsyncFileAccess {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        let file = self.file()?;
        let n = read_file_at(&file, position, buf)?;
        Ok(eof_if_empty(n, buf.len()))
    }

    async fn read_at_async(&self, position: u64, buf: &mut [u8]) -> Result<Option<usize>> {
        let file = self.file()?;
        let len = buf.len();
        let mut guard = CancelOnDrop {
            access: self,
            armed: true,
        };
        let joined = tokio::task::spawn_blocking(move || {
            let mut chunk = vec![0u8; len];
            let n = read_file_at(&file, position, &mut chunk)?;
            chunk.truncate(n);
            Ok::<_, std::io::Error>(chunk)
        })
        .await;
        guard.armed = false;

        let chunk = joined.map_err(std::io::Error::other)??;
        // the channel may have been cancelled by a sibling read meanwhile
        self.file()?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(eof_if_empty(chunk.len(), len))
    }
}

/// Create a [`RandomAccessData`] over `file` with asynchronous reads.
pub fn from_async_file(file: File, offset: u64, length: Option<u64>) -> Result<RandomAccessData> {
    RandomAccessData::new(AsyncFileAccess::new(file)?, offset, length)
}

/// Open `path` for asynchronous positional reads.
pub fn open_async_file(
    path: impl AsRef<Path>,
    offset: u64,
    length: Option<u64>,
) -> Result<RandomAccessData> {
    from_async_file(File::open(path)?, offset, length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn async_reads_match_blocking_reads() {
        let tmp = temp_file(b"0123456789");
        let access = AsyncFileAccess::new(File::open(tmp.path()).unwrap()).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(access.read_at_async(3, &mut buf).await.unwrap(), Some(4));
        assert_eq!(&buf, b"3456");
        assert_eq!(access.read_at_async(10, &mut buf).await.unwrap(), None);
    }

    #[test]
    fn dropped_read_closes_channel() {
        let tmp = temp_file(&[1u8; 64]);
        let access = AsyncFileAccess::new(File::open(tmp.path()).unwrap()).unwrap();

        // one blocking thread, kept busy so the read below stays pending
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .max_blocking_threads(1)
            .build()
            .unwrap();
        rt.block_on(async {
            let (tx, rx) = std::sync::mpsc::channel::<()>();
            let blocker = tokio::task::spawn_blocking(move || {
                let _ = rx.recv();
            });

            let mut buf = [0u8; 8];
            let pending = tokio::time::timeout(Duration::ZERO, access.read_at_async(0, &mut buf)).await;
            assert!(pending.is_err());

            tx.send(()).unwrap();
            blocker.await.unwrap();

            let mut buf = [0u8; 8];
            assert!(matches!(access.read_at(0, &mut buf), Err(RadError::Cancelled)));
            assert!(matches!(
                access.read_at_async(0, &mut buf).await,
                Err(RadError::Cancelled)
            ));
        });
    }
}
