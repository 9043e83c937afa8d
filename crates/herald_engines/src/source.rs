#![forbid(unsafe_code)]

use herald_kernel_contracts::payload::NotificationPayload;
use herald_kernel_contracts::record::{PostTimeMs, UserHandle};

/// A notification record as the host platform hands it over.
///
/// The owner id is not part of the stable surface; platforms expose it
/// through one of the optional probes, or not at all.
pub trait SourceRecord {
    fn package(&self) -> &str;

    fn id(&self) -> i32;

    fn tag(&self) -> Option<&str>;

    fn user(&self) -> UserHandle;

    fn post_time(&self) -> PostTimeMs;

    fn payload(&self) -> NotificationPayload;

    /// Owner id through the platform's own accessor, where one exists.
    fn owner_id_accessor(&self) -> Option<i32> {
        None
    }

    /// Raw value of a named internal field, where the platform keeps one.
    fn platform_field(&self, _name: &str) -> Option<i64> {
        None
    }
}
