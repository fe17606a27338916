//! Reference-counted lifecycle shared by every view over one backend.
//!
//! A [`SharedResource`] starts with a retain count of one. Each
//! [`retain`](SharedResource::retain) adds a co-owner and each
//! [`close`](SharedResource::close) removes one. The backend is released
//! exactly once, by the `close` that brings the count to zero. After that
//! both `retain` and `close` fail fast with [`RadError::Released`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{RadError, Result};

/// Backend-specific release routine, invoked at most once.
pub trait Release {
    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Callback notified once the shared resource is released.
///
/// Receives the release failure, if any. A listener error is suppressed
/// onto the error returned by the releasing `close`.
pub type CloseListener = Box<dyn FnOnce(Option<&RadError>) -> Result<()> + Send>;

pub struct SharedResource<R: ?Sized> {
    count: AtomicUsize,
    /// `None` once drained.
    listeners: Mutex<Option<Vec<CloseListener>>>,
    inner: R,
}

impl<R> SharedResource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            count: AtomicUsize::new(1),
            listeners: Mutex::new(Some(Vec::new())),
            inner,
        }
    }
}

impl<R: Release + ?Sized> SharedResource<R> {
    pub fn get(&self) -> &R {
        &self.inner
    }

    pub fn is_open(&self) -> bool {
        self.count.load(Ordering::Acquire) > 0
    }

    pub fn retain_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Add a co-owner. Fails if the resource is already released.
    pub fn retain(&self) -> Result<()> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then_some(count + 1)
            })
            .map(|_| ())
            .map_err(|_| RadError::Released)
    }

    /// Drop one co-owner, releasing the backend when it was the last one.
    ///
    /// A release failure still leaves the resource closed and is returned
    /// to this caller only.
    pub fn close(&self) -> Result<()> {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map_err(|_| RadError::Released)?;
        if previous != 1 {
            return Ok(());
        }

        log::debug!("releasing shared resource");
        let result = self.inner.release();
        let listener_errors = self.notify_listeners(result.as_ref().err());
        match result {
            Ok(()) => crate::error::aggregate(listener_errors),
            Err(e) => Err(listener_errors.into_iter().fold(e, RadError::suppress)),
        }
    }

    /// Register a listener for the release of this resource.
    ///
    /// A listener added after release runs immediately with no error.
    pub fn on_shared_close(&self, listener: CloseListener) -> Result<()> {
        {
            let mut guard = self.listeners.lock();
            if let Some(listeners) = guard.as_mut() {
                listeners.push(listener);
                return Ok(());
            }
        }
        listener(None)
    }

    fn notify_listeners(&self, cause: Option<&RadError>) -> Vec<RadError> {
        let drained = self.listeners.lock().take().unwrap_or_default();
        drained
            .into_iter()
            .filter_map(|listener| listener(cause).err())
            .collect()
    }
}

impl<R: ?Sized> fmt::Debug for SharedResource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResource")
            .field("count", &self.count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct Counting {
        releases: AtomicUsize,
        fail: AtomicBool,
    }

    impl Release for Counting {
        fn release(&self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RadError::Io(std::io::Error::other("release failed")));
            }
            Ok(())
        }
    }

    #[test]
    fn releases_once_on_last_close() {
        let shared = SharedResource::new(Counting::default());
        shared.retain().unwrap();
        shared.retain().unwrap();
        assert_eq!(shared.retain_count(), 3);

        shared.close().unwrap();
        shared.close().unwrap();
        assert!(shared.is_open());
        assert_eq!(shared.get().releases.load(Ordering::SeqCst), 0);

        shared.close().unwrap();
        assert!(!shared.is_open());
        assert_eq!(shared.get().releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retain_and_close_fail_after_release() {
        let shared = SharedResource::new(Counting::default());
        shared.close().unwrap();

        assert!(matches!(shared.retain(), Err(RadError::Released)));
        assert_eq!(shared.retain_count(), 0);
        assert!(matches!(shared.close(), Err(RadError::Released)));
        assert_eq!(shared.get().releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_error_is_reported_and_resource_stays_closed() {
        let shared = SharedResource::new(Counting::default());
        shared.get().fail.store(true, Ordering::SeqCst);

        assert!(matches!(shared.close(), Err(RadError::Io(_))));
        assert!(!shared.is_open());
        assert!(matches!(shared.close(), Err(RadError::Released)));
    }

    #[test]
    fn listeners_notified_once_and_errors_suppressed() {
        let shared = SharedResource::new(Counting::default());
        shared.get().fail.store(true, Ordering::SeqCst);

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            shared
                .on_shared_close(Box::new(move |cause| {
                    assert!(cause.is_some());
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(RadError::Cancelled)
                }))
                .unwrap();
        }

        let err = shared.close().unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.suppressed().len(), 2);
        match err {
            RadError::Multiple { primary, .. } => assert!(matches!(*primary, RadError::Io(_))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn late_listener_runs_immediately() {
        let shared = SharedResource::new(Counting::default());
        shared.close().unwrap();

        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        shared
            .on_shared_close(Box::new(move |cause| {
                assert!(cause.is_none());
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn concurrent_retain_close_balance() {
        let shared = Arc::new(SharedResource::new(Counting::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        shared.retain().unwrap();
                        shared.close().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.retain_count(), 1);
        shared.close().unwrap();
        assert_eq!(shared.get().releases.load(Ordering::SeqCst), 1);
    }
}
