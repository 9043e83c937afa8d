#![forbid(unsafe_code)]

use std::sync::Arc;

use herald_kernel_contracts::payload::{
    flags_clearable, flags_ongoing, ExtraValue, NotificationPayload,
};

use crate::channel::{CommunicationError, LocalPayload, PayloadChannel};

/// Reference to a notification payload, owned here or by another process.
///
/// Callers that only need flags or single extras should stay on the narrow
/// accessors; [`PayloadHandle::fetch_payload`] on a remote handle moves the
/// whole payload across the process boundary.
#[derive(Debug, Clone)]
pub enum PayloadHandle {
    Local(Arc<LocalPayload>),
    Remote(Arc<dyn PayloadChannel>),
}

impl PayloadHandle {
    pub fn local(payload: NotificationPayload) -> Self {
        PayloadHandle::Local(LocalPayload::new(payload))
    }

    pub fn remote(channel: Arc<dyn PayloadChannel>) -> Self {
        PayloadHandle::Remote(channel)
    }

    pub fn flags(&self) -> Result<i32, CommunicationError> {
        match self {
            PayloadHandle::Local(local) => Ok(local.read().flags),
            PayloadHandle::Remote(channel) => channel.flags(),
        }
    }

    pub fn set_flags(&self, flags: i32) -> Result<(), CommunicationError> {
        match self {
            PayloadHandle::Local(local) => {
                local.write().flags = flags;
                Ok(())
            }
            PayloadHandle::Remote(channel) => channel.set_flags(flags),
        }
    }

    pub fn extra(&self, key: &str) -> Result<Option<ExtraValue>, CommunicationError> {
        match self {
            PayloadHandle::Local(local) => Ok(local.read().extras.get(key).cloned()),
            PayloadHandle::Remote(channel) => channel.extra(key),
        }
    }

    /// Whole payload. A snapshot copy for local handles, a blocking transfer
    /// for remote ones.
    pub fn fetch_payload(&self) -> Result<NotificationPayload, CommunicationError> {
        match self {
            PayloadHandle::Local(local) => Ok(local.snapshot()),
            PayloadHandle::Remote(channel) => channel.fetch(),
        }
    }

    pub fn is_ongoing(&self) -> Result<bool, CommunicationError> {
        Ok(flags_ongoing(self.flags()?))
    }

    pub fn is_clearable(&self) -> Result<bool, CommunicationError> {
        Ok(flags_clearable(self.flags()?))
    }

    /// The handle as it goes on the wire.
    pub(crate) fn as_channel(&self) -> Arc<dyn PayloadChannel> {
        match self {
            PayloadHandle::Local(local) => Arc::clone(local) as Arc<dyn PayloadChannel>,
            PayloadHandle::Remote(channel) => Arc::clone(channel),
        }
    }
}
