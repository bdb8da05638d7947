//! One-shot value handoff between pipeline stages, scoped to a single
//! build cycle.
//!
//! The client stage writes the asset manifest exactly once per cycle; the
//! server stage (and any number of other readers) awaits it. The channel is
//! an explicit tagged state (`Pending`/`Resolved`/`Rejected`), never a pair
//! of captured closures, and it is never reused across cycles.
//!
//! Settlement rules:
//! - Exactly one `write()` or `reject()` is honored.
//! - A second settling call returns `ChannelError::AlreadySettled`; a settled
//!   channel being settled again is a producer bug worth surfacing.
//! - Every `read()`, whether it started before or after settlement, observes
//!   the same final outcome.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Channel failure modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// A settling call arrived after the channel was already settled.
    #[error("channel already settled")]
    AlreadySettled,
    /// The cycle was cancelled or its producer failed before writing.
    #[error("manifest channel rejected: {0}")]
    Rejected(String),
}

enum State<T> {
    Pending,
    Resolved(T),
    Rejected(String),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

/// A one-shot, clone-to-share channel for a single build cycle.
pub struct OnceChannel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for OnceChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> OnceChannel<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending),
                notify: Notify::new(),
            }),
        }
    }

    /// Resolve the channel. Errors if it was already settled.
    pub fn write(&self, value: T) -> Result<(), ChannelError> {
        self.settle(State::Resolved(value))
    }

    /// Reject the channel, unblocking every reader with the same failure.
    pub fn reject(&self, reason: impl Into<String>) -> Result<(), ChannelError> {
        self.settle(State::Rejected(reason.into()))
    }

    fn settle(&self, next: State<T>) -> Result<(), ChannelError> {
        {
            let mut state = self.inner.state.lock();
            if !matches!(*state, State::Pending) {
                return Err(ChannelError::AlreadySettled);
            }
            *state = next;
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Await settlement. Safe to call any number of times; every call
    /// observes the same outcome.
    pub async fn read(&self) -> Result<T, ChannelError> {
        loop {
            // Register interest before checking state, so a settle between
            // the check and the await still wakes us.
            let notified = self.inner.notify.notified();
            {
                let state = self.inner.state.lock();
                match &*state {
                    State::Pending => {}
                    State::Resolved(value) => return Ok(value.clone()),
                    State::Rejected(reason) => return Err(ChannelError::Rejected(reason.clone())),
                }
            }
            notified.await;
        }
    }

    /// True while unsettled. The coordinator uses this to guarantee a cycle
    /// never ends with a Pending channel.
    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Pending)
    }
}

impl<T: Clone> Default for OnceChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_after_write() {
        let ch = OnceChannel::new();
        ch.write(7u32).unwrap();
        assert_eq!(ch.read().await.unwrap(), 7);
        // Repeated reads observe the same value
        assert_eq!(ch.read().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_read_before_write() {
        let ch = OnceChannel::new();
        let reader = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.read().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ch.write("manifest".to_string()).unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), "manifest");
    }

    #[tokio::test]
    async fn test_multiple_readers_same_outcome() {
        let ch = OnceChannel::new();
        let mut readers = Vec::new();
        for _ in 0..4 {
            let ch = ch.clone();
            readers.push(tokio::spawn(async move { ch.read().await }));
        }
        ch.write(42u64).unwrap();
        for reader in readers {
            assert_eq!(reader.await.unwrap().unwrap(), 42);
        }
    }

    #[tokio::test]
    async fn test_second_settle_is_error() {
        let ch = OnceChannel::new();
        ch.write(1u8).unwrap();
        assert_eq!(ch.write(2), Err(ChannelError::AlreadySettled));
        assert_eq!(ch.reject("late"), Err(ChannelError::AlreadySettled));
        // The first settlement stands
        assert_eq!(ch.read().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reject_unblocks_readers() {
        let ch: OnceChannel<u8> = OnceChannel::new();
        let reader = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.read().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ch.reject("cycle cancelled").unwrap();

        let err = reader.await.unwrap().unwrap_err();
        assert_eq!(err, ChannelError::Rejected("cycle cancelled".into()));
        // Late readers see the same rejection
        assert!(matches!(ch.read().await, Err(ChannelError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_is_pending() {
        let ch = OnceChannel::new();
        assert!(ch.is_pending());
        ch.write(0u8).unwrap();
        assert!(!ch.is_pending());
    }
}
