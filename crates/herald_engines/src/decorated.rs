#![forbid(unsafe_code)]

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLockWriteGuard};

use herald_kernel_contracts::payload::NotificationPayload;
use herald_kernel_contracts::record::{BaseRecord, PostTimeMs, UserHandle};
use herald_kernel_contracts::ContractViolation;
use tracing::debug;

use crate::channel::{CommunicationError, LocalPayload};
use crate::overlay::IdentityOverlay;
use crate::owner_id::OwnerIdResolver;
use crate::payload_handle::PayloadHandle;
use crate::source::SourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFreshness {
    Local,
    RemoteUnfetched,
    /// A fetched copy is authoritative for this instance from now on.
    RemoteCachedDirty,
}

/// Mutable access to the whole payload of a [`DecoratedRecord`].
///
/// Both variants lock a holder that peers may also reach through a handle, so
/// keep the view short-lived.
pub enum PayloadView<'a> {
    Owned(RwLockWriteGuard<'a, NotificationPayload>),
    Cached(RwLockWriteGuard<'a, NotificationPayload>),
}

impl Deref for PayloadView<'_> {
    type Target = NotificationPayload;

    fn deref(&self) -> &NotificationPayload {
        match self {
            PayloadView::Owned(guard) | PayloadView::Cached(guard) => &**guard,
        }
    }
}

impl DerefMut for PayloadView<'_> {
    fn deref_mut(&mut self) -> &mut NotificationPayload {
        match self {
            PayloadView::Owned(guard) | PayloadView::Cached(guard) => &mut **guard,
        }
    }
}

/// A notification record with a tag/id overlay and a lazy payload.
///
/// Not meant to be shared across threads while mutated: all mutation,
/// including the first whole-payload fetch, takes `&mut self`.
#[derive(Debug)]
pub struct DecoratedRecord {
    base: BaseRecord,
    overlay: IdentityOverlay,
    handle: PayloadHandle,
    cached: Option<Arc<LocalPayload>>,
}

impl DecoratedRecord {
    pub fn new(base: BaseRecord, handle: PayloadHandle) -> Self {
        Self {
            base,
            overlay: IdentityOverlay::new(),
            handle,
            cached: None,
        }
    }

    /// Full construction from explicit fields with a locally owned payload.
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        package: String,
        op_package: Option<String>,
        id: i32,
        tag: Option<String>,
        owner_id: i32,
        initial_pid: i32,
        score: i32,
        payload: NotificationPayload,
        user: UserHandle,
        post_time: PostTimeMs,
    ) -> Result<Self, ContractViolation> {
        let base = BaseRecord::v1(
            package,
            op_package,
            id,
            tag,
            owner_id,
            initial_pid,
            score,
            user,
            post_time,
        )?;
        Ok(Self::new(base, PayloadHandle::local(payload)))
    }

    /// Wraps a platform record without decoration; the payload is copied in.
    pub fn wrap(
        source: &dyn SourceRecord,
        resolver: &OwnerIdResolver,
    ) -> Result<Self, ContractViolation> {
        let base = BaseRecord::v1(
            source.package().to_string(),
            None,
            source.id(),
            source.tag().map(str::to_string),
            resolver.resolve(source),
            0,
            0,
            source.user(),
            source.post_time(),
        )?;
        Ok(Self::new(base, PayloadHandle::local(source.payload())))
    }

    pub fn with_tag(mut self, tag: Option<&str>) -> Self {
        self.set_tag(tag);
        self
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.set_id(id);
        self
    }

    pub fn set_tag(&mut self, tag: Option<&str>) -> &mut Self {
        self.overlay.set_tag(self.base.tag.as_deref(), tag);
        self
    }

    pub fn set_id(&mut self, id: i32) -> &mut Self {
        self.overlay.set_id(self.base.id, id);
        self
    }

    pub fn base(&self) -> &BaseRecord {
        &self.base
    }

    pub fn overlay(&self) -> &IdentityOverlay {
        &self.overlay
    }

    pub fn package(&self) -> &str {
        &self.base.package
    }

    pub fn owner_id(&self) -> i32 {
        self.base.owner_id
    }

    pub fn user(&self) -> UserHandle {
        self.base.user
    }

    pub fn post_time(&self) -> PostTimeMs {
        self.base.post_time
    }

    pub fn effective_tag(&self) -> Option<&str> {
        self.overlay.effective_tag(self.base.tag.as_deref())
    }

    pub fn effective_id(&self) -> i32 {
        self.overlay.effective_id(self.base.id)
    }

    pub fn effective_key(&self) -> String {
        BaseRecord::key_for(
            self.base.user,
            &self.base.package,
            self.effective_id(),
            self.effective_tag(),
            self.base.owner_id,
        )
    }

    pub fn is_decorated(&self) -> bool {
        self.overlay.is_decorated()
    }

    /// Narrow payload access. Prefer this over [`Self::whole_payload`].
    pub fn payload_handle(&self) -> &PayloadHandle {
        &self.handle
    }

    pub fn freshness(&self) -> PayloadFreshness {
        match (&self.handle, &self.cached) {
            (PayloadHandle::Local(_), _) => PayloadFreshness::Local,
            (PayloadHandle::Remote(_), None) => PayloadFreshness::RemoteUnfetched,
            (PayloadHandle::Remote(_), Some(_)) => PayloadFreshness::RemoteCachedDirty,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.cached.is_some()
    }

    /// The fetched copy; once present it is what this record forwards.
    pub(crate) fn cached_payload(&self) -> Option<&Arc<LocalPayload>> {
        self.cached.as_ref()
    }

    /// The whole payload, for reading or modification.
    ///
    /// On a remote record the first call transfers the payload and caches it.
    /// The cache then stands in for the remote copy in every later call and in
    /// every later encode of this instance, even if the remote side changes.
    pub fn whole_payload(&mut self) -> Result<PayloadView<'_>, CommunicationError> {
        if let PayloadHandle::Local(local) = &self.handle {
            return Ok(PayloadView::Owned(local.write()));
        }
        let cached = match self.cached.take() {
            Some(cached) => cached,
            None => {
                let mut fetched = self.handle.fetch_payload()?;
                fetched.extras.rebind();
                debug!(
                    package = %self.base.package,
                    id = self.effective_id(),
                    "remote payload fetched; record is now dirty"
                );
                LocalPayload::new(fetched)
            }
        };
        Ok(PayloadView::Cached(self.cached.insert(cached).write()))
    }

    pub fn is_ongoing(&self) -> Result<bool, CommunicationError> {
        self.handle.is_ongoing()
    }

    pub fn is_clearable(&self) -> Result<bool, CommunicationError> {
        self.handle.is_clearable()
    }
}
