#![forbid(unsafe_code)]

//! Record codec at process boundaries.
//!
//! Native layout: magic · package · effective id · tag-present [+ tag] ·
//! owner id · user · post time · payload handle.
//!
//! Decoding sniffs the leading `i32`. Anything other than [`NATIVE_MAGIC`] is
//! read as a plain record. A plain record whose leading package length happens
//! to equal the magic is misread as native; that collision is accepted, since
//! widening the marker would break readers of the plain format.

use std::ops::BitOr;
use std::sync::Arc;

use herald_kernel_contracts::payload::NotificationPayload;
use herald_kernel_contracts::record::{BaseRecord, PostTimeMs, UserHandle};
use herald_kernel_contracts::Validate;
use tracing::debug;

use crate::channel::PayloadChannel;
use crate::decorated::DecoratedRecord;
use crate::legacy;
use crate::parcel::{Parcel, WireError};
use crate::payload_handle::PayloadHandle;

/// Reads as ASCII "HRLD" big-endian; on the little-endian wire the bytes are
/// "DLRH".
pub const NATIVE_MAGIC: i32 = 0x4852_4C44;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteFlags(u32);

impl WriteFlags {
    pub const NONE: WriteFlags = WriteFlags(0);
    /// Write as a plain record for readers unaware of decoration.
    pub const AS_ORIGINAL: WriteFlags = WriteFlags(0x1000);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: WriteFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WriteFlags {
    type Output = WriteFlags;

    fn bitor(self, rhs: WriteFlags) -> WriteFlags {
        WriteFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Native,
    Legacy,
}

pub fn detect_format(parcel: &Parcel) -> WireFormat {
    match parcel.peek_i32() {
        Some(NATIVE_MAGIC) => WireFormat::Native,
        _ => WireFormat::Legacy,
    }
}

/// Takes `&mut` because the plain format embeds the whole payload, which may
/// have to be fetched (and cached) first.
///
/// The effective identity must satisfy the record contract; a record whose
/// overrides would not decode is rejected before anything is written.
pub fn encode_record(
    record: &mut DecoratedRecord,
    parcel: &mut Parcel,
    flags: WriteFlags,
) -> Result<(), WireError> {
    let effective = effective_base(record)?;
    if flags.contains(WriteFlags::AS_ORIGINAL) {
        encode_plain(record, &effective, parcel)
    } else {
        encode_native(record, &effective, parcel)
    }
}

/// The base record as a plain reader sees it, with overrides baked in.
fn effective_base(record: &DecoratedRecord) -> Result<BaseRecord, WireError> {
    let mut base = record.base().clone();
    base.id = record.effective_id();
    base.tag = record.effective_tag().map(str::to_string);
    base.validate()?;
    Ok(base)
}

fn encode_native(
    record: &DecoratedRecord,
    effective: &BaseRecord,
    parcel: &mut Parcel,
) -> Result<(), WireError> {
    parcel.write_i32(NATIVE_MAGIC);
    parcel.write_string(Some(&effective.package))?;
    parcel.write_i32(effective.id);
    legacy::write_optional_tag(parcel, effective.tag.as_deref())?;
    parcel.write_i32(effective.owner_id);
    parcel.write_i32(effective.user.identifier());
    parcel.write_i64(effective.post_time.0);

    // A dirty record's cache is authoritative and its remote handle is stale.
    // Peers get the cache holder itself, so their writes land in it.
    let handle = match record.cached_payload() {
        Some(cached) => Arc::clone(cached) as Arc<dyn PayloadChannel>,
        None => record.payload_handle().as_channel(),
    };
    parcel.write_strong_handle(handle)
}

fn encode_plain(
    record: &mut DecoratedRecord,
    effective: &BaseRecord,
    parcel: &mut Parcel,
) -> Result<(), WireError> {
    let payload = {
        let view = record.whole_payload()?;
        NotificationPayload::clone(&view)
    };
    legacy::write_record(parcel, effective, &payload)
}

pub fn decode_record(parcel: &mut Parcel) -> Result<DecoratedRecord, WireError> {
    let start = parcel.position();
    if let Ok(NATIVE_MAGIC) = parcel.read_i32() {
        return decode_native(parcel);
    }
    parcel.set_position(start);
    debug!(position = start, "no native marker, decoding plain record");
    decode_plain(parcel)
}

fn decode_native(parcel: &mut Parcel) -> Result<DecoratedRecord, WireError> {
    let package = parcel.read_required_string("native.package")?;
    let id = parcel.read_i32()?;
    let tag = legacy::read_optional_tag(parcel)?;
    let owner_id = parcel.read_i32()?;
    let user = UserHandle(parcel.read_i32()?);
    let post_time = PostTimeMs(parcel.read_i64()?);
    let channel = parcel.read_strong_handle()?;

    let base = BaseRecord::v1(package, None, id, tag, owner_id, 0, 0, user, post_time)?;
    Ok(DecoratedRecord::new(base, PayloadHandle::remote(channel)))
}

fn decode_plain(parcel: &mut Parcel) -> Result<DecoratedRecord, WireError> {
    let (base, mut payload) = legacy::read_record(parcel)?;
    payload.extras.rebind();
    Ok(DecoratedRecord::new(base, PayloadHandle::local(payload)))
}

pub fn write_record_array(
    records: &mut [DecoratedRecord],
    parcel: &mut Parcel,
    flags: WriteFlags,
) -> Result<(), WireError> {
    let count = i32::try_from(records.len()).map_err(|_| WireError::LimitExceeded {
        field: "record_array",
        limit: i32::MAX as usize,
        got: records.len(),
    })?;
    parcel.write_i32(count);
    for record in records.iter_mut() {
        encode_record(record, parcel, flags)?;
    }
    Ok(())
}

/// Each element sniffs its own format, so mixed arrays decode.
pub fn read_record_array(parcel: &mut Parcel) -> Result<Vec<DecoratedRecord>, WireError> {
    let raw = parcel.read_i32()?;
    let count = parcel.read_len("record_array", raw, parcel.config().max_parcel_objects)?;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(decode_record(parcel)?);
    }
    Ok(records)
}
