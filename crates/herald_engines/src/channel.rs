#![forbid(unsafe_code)]

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use herald_kernel_contracts::payload::{ExtraValue, NotificationPayload};
use thiserror::Error;

/// Transport-level failure of a cross-process payload call.
///
/// Surfaced to the caller as-is; nothing in this crate retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommunicationError {
    #[error("payload owner process is gone")]
    PeerGone,

    #[error("payload channel broken: {reason}")]
    ChannelBroken { reason: String },
}

/// Narrow call surface of a payload owned somewhere else.
///
/// Every call blocks the calling thread until the owner answers. Timeouts, if
/// any, belong to the implementation.
pub trait PayloadChannel: fmt::Debug + Send + Sync {
    fn flags(&self) -> Result<i32, CommunicationError>;

    fn set_flags(&self, flags: i32) -> Result<(), CommunicationError>;

    fn extra(&self, key: &str) -> Result<Option<ExtraValue>, CommunicationError>;

    /// Whole-payload transfer. Expensive across processes.
    fn fetch(&self) -> Result<NotificationPayload, CommunicationError>;
}

/// Payload owned by this process, served to peers through [`PayloadChannel`].
///
/// Peers writing through the channel mutate the same value the owner reads.
#[derive(Debug, Default)]
pub struct LocalPayload {
    payload: RwLock<NotificationPayload>,
}

impl LocalPayload {
    pub fn new(payload: NotificationPayload) -> Arc<Self> {
        Arc::new(Self {
            payload: RwLock::new(payload),
        })
    }

    pub fn read(&self) -> RwLockReadGuard<'_, NotificationPayload> {
        self.payload.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, NotificationPayload> {
        self.payload.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> NotificationPayload {
        self.read().clone()
    }
}

impl PayloadChannel for LocalPayload {
    fn flags(&self) -> Result<i32, CommunicationError> {
        Ok(self.read().flags)
    }

    fn set_flags(&self, flags: i32) -> Result<(), CommunicationError> {
        self.write().flags = flags;
        Ok(())
    }

    fn extra(&self, key: &str) -> Result<Option<ExtraValue>, CommunicationError> {
        Ok(self.read().extras.get(key).cloned())
    }

    fn fetch(&self) -> Result<NotificationPayload, CommunicationError> {
        Ok(self.snapshot())
    }
}
