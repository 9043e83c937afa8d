#![forbid(unsafe_code)]

pub mod channel;
pub mod decorated;
pub mod legacy;
pub mod overlay;
pub mod owner_id;
pub mod parcel;
pub mod payload_handle;
pub mod source;
pub mod transport;
pub mod wire;

pub use channel::{CommunicationError, LocalPayload, PayloadChannel};
pub use decorated::{DecoratedRecord, PayloadFreshness, PayloadView};
pub use parcel::{Parcel, WireConfig, WireError};
pub use payload_handle::PayloadHandle;
pub use wire::{decode_record, encode_record, WriteFlags};
