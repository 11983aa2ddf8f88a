//! Shared ownership of the one physical link to the arm.
//!
//! Several resources (the arm itself, the gripper riding on its command
//! channel) can be alive at once, but the serial port must be opened exactly
//! once and closed exactly once. [`ConnectionManager`] owns a single link
//! slot plus an owner count; [`ConnectionHandle`] is one logical owner of
//! that link. The first acquire opens the port and runs the startup
//! sequence, the last release stops motion and closes it.
//!
//! Release is scoped: [`ConnectionHandle::release`] consumes the handle, so
//! releasing twice is unrepresentable. A handle dropped without release is
//! still counted down through a best-effort `Drop` backstop, which skips the
//! polite motion stop.

use crate::device_link::{DeviceLink, DriverError, LinkFactory};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to open connection to arm")]
    Open(#[source] DriverError),
    #[error("failed to close connection to arm")]
    Close(#[source] DriverError),
}

/// The live link, shared between all current owners. Steady-state commands
/// serialize on this mutex, so concurrent callers cannot interleave writes.
pub type SharedLink = Arc<Mutex<Box<dyn DeviceLink>>>;

struct Slot {
    owners: usize,
    link: Option<SharedLink>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    factory: Arc<dyn LinkFactory>,
    slot: Arc<Mutex<Slot>>,
}

impl ConnectionManager {
    pub fn new(factory: impl LinkFactory + 'static) -> ConnectionManager {
        ConnectionManager {
            factory: Arc::new(factory),
            slot: Arc::new(Mutex::new(Slot {
                owners: 0,
                link: None,
            })),
        }
    }

    /// Register a new logical owner of the physical link.
    ///
    /// Opens the port and runs the startup sequence (indicator blue) on the
    /// 0 → 1 owner transition; later acquires reuse the existing link. The
    /// slot lock is held across the open, so concurrent acquires produce
    /// exactly one physical open. A failed open or startup leaves the owner
    /// count and the slot untouched.
    pub async fn acquire(&self) -> Result<ConnectionHandle, ConnectionError> {
        let mut slot = self.slot.lock().await;
        let link = match &slot.link {
            Some(link) => link.clone(),
            None => {
                let mut link = self.factory.open().await.map_err(ConnectionError::Open)?;
                link.set_color(0, 0, 255)
                    .await
                    .map_err(ConnectionError::Open)?;
                tracing::info!("opened connection to arm");
                let link: SharedLink = Arc::new(Mutex::new(link));
                slot.link = Some(link.clone());
                link
            }
        };
        slot.owners += 1;
        Ok(ConnectionHandle {
            slot: self.slot.clone(),
            link,
            released: false,
        })
    }

    pub async fn owner_count(&self) -> usize {
        self.slot.lock().await.owners
    }

    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.link.is_some()
    }
}

/// One logical owner of the shared physical link.
pub struct ConnectionHandle {
    slot: Arc<Mutex<Slot>>,
    link: SharedLink,
    released: bool,
}

impl ConnectionHandle {
    pub fn link(&self) -> &SharedLink {
        &self.link
    }

    /// Give up this ownership of the link.
    ///
    /// The last owner stops any in-flight motion, closes the port and clears
    /// the cached link so a later acquire opens it fresh. A close failure is
    /// surfaced, but the link is discarded regardless.
    ///
    /// The handle counts as released only once the slot lock is held; a
    /// release cancelled while still waiting on the lock is picked up by the
    /// `Drop` backstop instead.
    pub async fn release(mut self) -> Result<(), ConnectionError> {
        let mut slot = self.slot.lock().await;
        self.released = true;
        slot.owners = slot.owners.saturating_sub(1);
        if slot.owners == 0 {
            if let Some(link) = slot.link.take() {
                let mut link = link.lock().await;
                link.stop().await.map_err(ConnectionError::Close)?;
                link.close().await.map_err(ConnectionError::Close)?;
                tracing::info!("closed connection to arm");
            }
        }
        Ok(())
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!("connection handle dropped without release");
        if let Ok(mut slot) = self.slot.try_lock() {
            slot.owners = slot.owners.saturating_sub(1);
            if slot.owners == 0 {
                // dropping the link closes the port, without the motion stop
                slot.link = None;
            }
        } else if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let slot = self.slot.clone();
            runtime.spawn(async move {
                let mut slot = slot.lock().await;
                slot.owners = slot.owners.saturating_sub(1);
                if slot.owners == 0 {
                    slot.link = None;
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_link::mock::MockLinkFactory;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_acquires_open_once() {
        let (factory, state) = MockLinkFactory::new();
        let manager = ConnectionManager::new(factory);

        let (first, second) = tokio::join!(manager.acquire(), manager.acquire());
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(state.opens.load(Ordering::SeqCst), 1);
        assert_eq!(manager.owner_count().await, 2);
        assert!(manager.is_open().await);

        first.release().await.unwrap();
        assert_eq!(state.closes.load(Ordering::SeqCst), 0);
        assert!(manager.is_open().await);

        second.release().await.unwrap();
        assert_eq!(state.closes.load(Ordering::SeqCst), 1);
        assert_eq!(state.stops.load(Ordering::SeqCst), 1);
        assert_eq!(manager.owner_count().await, 0);
        assert!(!manager.is_open().await);
    }

    #[tokio::test]
    async fn startup_sequence_runs_on_first_open_only() {
        let (factory, state) = MockLinkFactory::new();
        let manager = ConnectionManager::new(factory);

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();
        assert_eq!(*state.color_calls.lock().unwrap(), vec![(0, 0, 255)]);

        second.release().await.unwrap();
        first.release().await.unwrap();
    }

    #[tokio::test]
    async fn failed_open_leaves_count_unchanged() {
        let (factory, state) = MockLinkFactory::new();
        state.fail_next_open.store(true, Ordering::SeqCst);
        let manager = ConnectionManager::new(factory);

        assert!(manager.acquire().await.is_err());
        assert_eq!(manager.owner_count().await, 0);
        assert!(!manager.is_open().await);

        // a later acquire retries and succeeds
        let handle = manager.acquire().await.unwrap();
        assert_eq!(state.opens.load(Ordering::SeqCst), 1);
        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn reacquire_after_close_opens_fresh_link() {
        let (factory, state) = MockLinkFactory::new();
        let manager = ConnectionManager::new(factory);

        let handle = manager.acquire().await.unwrap();
        handle.release().await.unwrap();
        let handle = manager.acquire().await.unwrap();
        assert_eq!(state.opens.load(Ordering::SeqCst), 2);
        handle.release().await.unwrap();
        assert_eq!(state.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_handle_is_counted_down() {
        let (factory, state) = MockLinkFactory::new();
        let manager = ConnectionManager::new(factory);

        let keeper = manager.acquire().await.unwrap();
        let dropped = manager.acquire().await.unwrap();
        drop(dropped);
        assert_eq!(manager.owner_count().await, 1);
        assert!(manager.is_open().await);

        keeper.release().await.unwrap();
        assert_eq!(manager.owner_count().await, 0);
        assert!(!manager.is_open().await);
        assert_eq!(state.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_cancelled_on_lock_still_counts_down() {
        let (factory, state) = MockLinkFactory::new();
        let manager = ConnectionManager::new(factory);
        let handle = manager.acquire().await.unwrap();

        // hold the slot lock so release can never get past the lock await
        let guard = manager.slot.lock().await;
        let release = tokio::time::timeout(Duration::from_millis(10), handle.release());
        assert!(release.await.is_err());
        drop(guard);

        // the backstop decrements through a spawned task
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.owner_count().await, 0);
        assert!(!manager.is_open().await);
        assert_eq!(state.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_last_handle_discards_link() {
        let (factory, _state) = MockLinkFactory::new();
        let manager = ConnectionManager::new(factory);

        let handle = manager.acquire().await.unwrap();
        drop(handle);
        assert_eq!(manager.owner_count().await, 0);
        assert!(!manager.is_open().await);
    }
}
