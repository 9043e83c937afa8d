#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use herald_kernel_contracts::payload::{ExtraValue, NotificationPayload};
use tracing::trace;

use crate::channel::{CommunicationError, PayloadChannel};
use crate::legacy;
use crate::parcel::{Parcel, WireConfig};

#[derive(Debug, Default)]
pub struct CallStats {
    flags: AtomicU64,
    set_flags: AtomicU64,
    extra: AtomicU64,
    fetch: AtomicU64,
}

impl CallStats {
    pub fn flags_calls(&self) -> u64 {
        self.flags.load(Ordering::Relaxed)
    }

    pub fn set_flags_calls(&self) -> u64 {
        self.set_flags.load(Ordering::Relaxed)
    }

    pub fn extra_calls(&self) -> u64 {
        self.extra.load(Ordering::Relaxed)
    }

    pub fn fetch_calls(&self) -> u64 {
        self.fetch.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct LinkState {
    alive: AtomicBool,
    stats: CallStats,
}

/// In-process stand-in for the connection between two processes.
///
/// All handles delivered over one link share its liveness and call counters.
/// Severing the link makes every call through it fail with
/// [`CommunicationError::PeerGone`].
#[derive(Debug, Clone)]
pub struct LoopbackLink {
    state: Arc<LinkState>,
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(LinkState {
                alive: AtomicBool::new(true),
                stats: CallStats::default(),
            }),
        }
    }

    pub fn sever(&self) {
        self.state.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &CallStats {
        &self.state.stats
    }
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote end of a payload handle delivered over a [`LoopbackLink`].
///
/// Whole transfers go through the payload wire encoding, so the caller gets
/// an independent copy with unbound extras, the same as a real peer would.
#[derive(Debug)]
pub struct LoopbackChannel {
    link: LoopbackLink,
    target: Arc<dyn PayloadChannel>,
    config: WireConfig,
}

impl LoopbackChannel {
    pub fn connect(
        link: &LoopbackLink,
        target: Arc<dyn PayloadChannel>,
        config: WireConfig,
    ) -> Self {
        Self {
            link: link.clone(),
            target,
            config,
        }
    }

    fn check_alive(&self) -> Result<(), CommunicationError> {
        if self.link.is_alive() {
            Ok(())
        } else {
            Err(CommunicationError::PeerGone)
        }
    }
}

impl PayloadChannel for LoopbackChannel {
    fn flags(&self) -> Result<i32, CommunicationError> {
        self.link.state.stats.flags.fetch_add(1, Ordering::Relaxed);
        self.check_alive()?;
        trace!("loopback flags call");
        self.target.flags()
    }

    fn set_flags(&self, flags: i32) -> Result<(), CommunicationError> {
        self.link.state.stats.set_flags.fetch_add(1, Ordering::Relaxed);
        self.check_alive()?;
        trace!(flags, "loopback set_flags call");
        self.target.set_flags(flags)
    }

    fn extra(&self, key: &str) -> Result<Option<ExtraValue>, CommunicationError> {
        self.link.state.stats.extra.fetch_add(1, Ordering::Relaxed);
        self.check_alive()?;
        trace!(key, "loopback extra call");
        self.target.extra(key)
    }

    fn fetch(&self) -> Result<NotificationPayload, CommunicationError> {
        self.link.state.stats.fetch.fetch_add(1, Ordering::Relaxed);
        self.check_alive()?;
        let payload = self.target.fetch()?;

        let mut parcel = Parcel::new(self.config);
        legacy::write_payload(&mut parcel, &payload).map_err(|err| {
            CommunicationError::ChannelBroken {
                reason: err.to_string(),
            }
        })?;
        trace!(bytes = parcel.len(), "loopback whole-payload transfer");
        legacy::read_payload(&mut parcel).map_err(|err| CommunicationError::ChannelBroken {
            reason: err.to_string(),
        })
    }
}
