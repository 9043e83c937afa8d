#![forbid(unsafe_code)]

//! Plain record format, as written by owners that know nothing about
//! decoration. The payload is embedded whole.
//!
//! Layout: package · op package (nullable) · id · tag-present [+ tag] ·
//! owner id · initial pid · score · payload · user · post time.

use std::collections::BTreeMap;

use herald_kernel_contracts::payload::{ExtraValue, Extras, NotificationPayload};
use herald_kernel_contracts::record::{BaseRecord, PostTimeMs, UserHandle};
use herald_kernel_contracts::Validate;

use crate::parcel::{Parcel, WireError};

const EXTRA_KIND_BOOL: i32 = 0;
const EXTRA_KIND_INT: i32 = 1;
const EXTRA_KIND_TEXT: i32 = 2;
const EXTRA_KIND_STRUCTURED: i32 = 3;

pub fn write_record(
    parcel: &mut Parcel,
    base: &BaseRecord,
    payload: &NotificationPayload,
) -> Result<(), WireError> {
    parcel.write_string(Some(&base.package))?;
    parcel.write_string(base.op_package.as_deref())?;
    parcel.write_i32(base.id);
    write_optional_tag(parcel, base.tag.as_deref())?;
    parcel.write_i32(base.owner_id);
    parcel.write_i32(base.initial_pid);
    parcel.write_i32(base.score);
    write_payload(parcel, payload)?;
    parcel.write_i32(base.user.identifier());
    parcel.write_i64(base.post_time.0);
    Ok(())
}

/// The payload comes back with unbound extras; binding is the caller's call.
pub fn read_record(parcel: &mut Parcel) -> Result<(BaseRecord, NotificationPayload), WireError> {
    let package = parcel.read_required_string("legacy.package")?;
    let op_package = parcel.read_string()?;
    let id = parcel.read_i32()?;
    let tag = read_optional_tag(parcel)?;
    let owner_id = parcel.read_i32()?;
    let initial_pid = parcel.read_i32()?;
    let score = parcel.read_i32()?;
    let payload = read_payload(parcel)?;
    let user = UserHandle(parcel.read_i32()?);
    let post_time = PostTimeMs(parcel.read_i64()?);
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
    Ok((base, payload))
}

/// Tag presence is its own flag so an empty tag survives as `Some("")`.
pub fn write_optional_tag(parcel: &mut Parcel, tag: Option<&str>) -> Result<(), WireError> {
    match tag {
        Some(tag) => {
            parcel.write_bool(true);
            parcel.write_string(Some(tag))
        }
        None => {
            parcel.write_bool(false);
            Ok(())
        }
    }
}

pub fn read_optional_tag(parcel: &mut Parcel) -> Result<Option<String>, WireError> {
    if parcel.read_bool()? {
        Ok(Some(parcel.read_required_string("tag")?))
    } else {
        Ok(None)
    }
}

pub fn write_payload(parcel: &mut Parcel, payload: &NotificationPayload) -> Result<(), WireError> {
    parcel.write_i32(payload.flags);
    parcel.write_i64(payload.when_ms);
    parcel.write_string(payload.channel_id.as_deref())?;
    parcel.write_string(payload.group.as_deref())?;
    parcel.write_string(payload.title.as_deref())?;
    parcel.write_string(payload.text.as_deref())?;

    let count = i32::try_from(payload.extras.len()).map_err(|_| WireError::LimitExceeded {
        field: "payload.extras",
        limit: i32::MAX as usize,
        got: payload.extras.len(),
    })?;
    parcel.write_i32(count);
    for (key, value) in payload.extras.iter() {
        parcel.write_string(Some(key))?;
        match value {
            ExtraValue::Bool(v) => {
                parcel.write_i32(EXTRA_KIND_BOOL);
                parcel.write_bool(*v);
            }
            ExtraValue::Int(v) => {
                parcel.write_i32(EXTRA_KIND_INT);
                parcel.write_i64(*v);
            }
            ExtraValue::Text(v) => {
                parcel.write_i32(EXTRA_KIND_TEXT);
                parcel.write_string(Some(v))?;
            }
            ExtraValue::Structured(json) => {
                parcel.write_i32(EXTRA_KIND_STRUCTURED);
                parcel.write_string(Some(json))?;
            }
        }
    }
    Ok(())
}

pub fn read_payload(parcel: &mut Parcel) -> Result<NotificationPayload, WireError> {
    let flags = parcel.read_i32()?;
    let when_ms = parcel.read_i64()?;
    let channel_id = parcel.read_string()?;
    let group = parcel.read_string()?;
    let title = parcel.read_string()?;
    let text = parcel.read_string()?;

    let raw_count = parcel.read_i32()?;
    let count = parcel.read_len("payload.extras", raw_count, parcel.config().max_extras)?;
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let key = parcel.read_required_string("extras.key")?;
        let value = match parcel.read_i32()? {
            EXTRA_KIND_BOOL => ExtraValue::Bool(parcel.read_bool()?),
            EXTRA_KIND_INT => ExtraValue::Int(parcel.read_i64()?),
            EXTRA_KIND_TEXT => ExtraValue::Text(parcel.read_required_string("extras.text")?),
            EXTRA_KIND_STRUCTURED => {
                ExtraValue::Structured(parcel.read_required_string("extras.structured")?)
            }
            kind => return Err(WireError::UnknownExtraKind { kind }),
        };
        entries.insert(key, value);
    }

    let payload = NotificationPayload {
        flags,
        when_ms,
        channel_id,
        group,
        title,
        text,
        extras: Extras::from_transfer(entries),
    };
    payload.validate()?;
    Ok(payload)
}
