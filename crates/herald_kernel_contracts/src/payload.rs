#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::validate_bounded_text;
use crate::{ContractViolation, Validate};

pub const FLAG_SHOW_LIGHTS: i32 = 0x0000_0001;
pub const FLAG_ONGOING_EVENT: i32 = 0x0000_0002;
pub const FLAG_INSISTENT: i32 = 0x0000_0004;
pub const FLAG_ONLY_ALERT_ONCE: i32 = 0x0000_0008;
pub const FLAG_AUTO_CANCEL: i32 = 0x0000_0010;
pub const FLAG_NO_CLEAR: i32 = 0x0000_0020;
pub const FLAG_FOREGROUND_SERVICE: i32 = 0x0000_0040;
pub const FLAG_GROUP_SUMMARY: i32 = 0x0000_0200;

pub const MAX_TEXT_LEN: usize = 64 * 1024;
pub const MAX_EXTRA_KEY_LEN: usize = 256;

pub fn flags_ongoing(flags: i32) -> bool {
    flags & FLAG_ONGOING_EVENT != 0
}

pub fn flags_clearable(flags: i32) -> bool {
    flags & (FLAG_ONGOING_EVENT | FLAG_NO_CLEAR) == 0
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    Bool(bool),
    Int(i64),
    Text(String),
    /// JSON text of a typed value; readable only while the extras are bound.
    Structured(String),
}

/// Keyed side data attached to a payload.
///
/// Structured entries travel as opaque JSON text. Extras that arrive through a
/// whole-payload transfer are unbound and must be rebound by the receiver
/// before structured entries can be read back as typed values.
#[derive(Debug, Clone, Default)]
pub struct Extras {
    entries: BTreeMap<String, ExtraValue>,
    unbound: bool,
}

impl Extras {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extras as received from a peer; structured reads fail until `rebind`.
    pub fn from_transfer(entries: BTreeMap<String, ExtraValue>) -> Self {
        Self {
            entries,
            unbound: true,
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.unbound
    }

    /// Returns true when this call performed the binding.
    pub fn rebind(&mut self) -> bool {
        let was_unbound = self.unbound;
        self.unbound = false;
        was_unbound
    }

    pub fn put(&mut self, key: impl Into<String>, value: ExtraValue) -> Option<ExtraValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn put_structured<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), ContractViolation> {
        let json = serde_json::to_string(value).map_err(|_| ContractViolation::InvalidValue {
            field: "extras.structured",
            reason: "value must serialize to json",
        })?;
        self.entries.insert(key.into(), ExtraValue::Structured(json));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ExtraValue> {
        self.entries.get(key)
    }

    pub fn structured<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ContractViolation> {
        let Some(value) = self.entries.get(key) else {
            return Ok(None);
        };
        let ExtraValue::Structured(json) = value else {
            return Err(ContractViolation::InvalidValue {
                field: "extras.structured",
                reason: "entry is not structured",
            });
        };
        if self.unbound {
            return Err(ContractViolation::InvalidValue {
                field: "extras.structured",
                reason: "extras must be rebound after transfer",
            });
        }
        serde_json::from_str(json)
            .map(Some)
            .map_err(|_| ContractViolation::InvalidValue {
                field: "extras.structured",
                reason: "json does not match requested type",
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtraValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// Binding state is a property of the receiving side, not of the content.
impl PartialEq for Extras {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Validate for Extras {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (key, value) in &self.entries {
            if key.is_empty() || key.len() > MAX_EXTRA_KEY_LEN {
                return Err(ContractViolation::InvalidValue {
                    field: "extras.key",
                    reason: "must be 1..=256 bytes",
                });
            }
            if let ExtraValue::Text(text) | ExtraValue::Structured(text) = value {
                validate_bounded_text("extras.value", text, MAX_TEXT_LEN)?;
            }
        }
        Ok(())
    }
}

/// Notification content. Potentially large; peers prefer narrow accessors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationPayload {
    pub flags: i32,
    pub when_ms: i64,
    pub channel_id: Option<String>,
    pub group: Option<String>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub extras: Extras,
}

impl NotificationPayload {
    pub fn v1(
        flags: i32,
        when_ms: i64,
        channel_id: Option<String>,
        group: Option<String>,
        title: Option<String>,
        text: Option<String>,
        extras: Extras,
    ) -> Result<Self, ContractViolation> {
        let payload = Self {
            flags,
            when_ms,
            channel_id,
            group,
            title,
            text,
            extras,
        };
        payload.validate()?;
        Ok(payload)
    }

    pub fn is_ongoing(&self) -> bool {
        flags_ongoing(self.flags)
    }

    pub fn is_clearable(&self) -> bool {
        flags_clearable(self.flags)
    }
}

impl Validate for NotificationPayload {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (field, value) in [
            ("notification_payload.channel_id", &self.channel_id),
            ("notification_payload.group", &self.group),
            ("notification_payload.title", &self.title),
            ("notification_payload.text", &self.text),
        ] {
            if let Some(value) = value {
                validate_bounded_text(field, value, MAX_TEXT_LEN)?;
            }
        }
        self.extras.validate()
    }
}
