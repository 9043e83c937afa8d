#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;

use herald_kernel_contracts::ContractViolation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{CommunicationError, PayloadChannel};
use crate::transport::{LoopbackChannel, LoopbackLink};

const NULL_STRING_LEN: i32 = -1;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    #[error("parcel truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("negative length {got} for {field}")]
    NegativeLength { field: &'static str, got: i32 },

    #[error("{field} exceeds limit: {got} > {limit}")]
    LimitExceeded {
        field: &'static str,
        limit: usize,
        got: usize,
    },

    #[error("string is not valid utf-8")]
    InvalidUtf8,

    #[error("missing required {field}")]
    MissingField { field: &'static str },

    #[error("parcel carries no handle at slot {index}")]
    UnknownHandle { index: i32 },

    #[error("unknown extra kind {kind}")]
    UnknownExtraKind { kind: i32 },

    #[error("decoded value violates contract: {0:?}")]
    Contract(ContractViolation),

    #[error(transparent)]
    Communication(#[from] CommunicationError),
}

impl From<ContractViolation> for WireError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

/// Decode limits. Missing fields in a serialized config take `mvp_v1` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    pub max_string_bytes: usize,
    pub max_extras: usize,
    pub max_parcel_objects: usize,
}

impl WireConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_string_bytes: 256 * 1024,
            max_extras: 512,
            max_parcel_objects: 1024,
        }
    }

    /// `mvp_v1` with `HERALD_WIRE_MAX_STRING_BYTES` / `HERALD_WIRE_MAX_EXTRAS`
    /// applied when set to a positive integer.
    pub fn from_env() -> Self {
        let mut config = Self::mvp_v1();
        if let Some(v) = env_usize("HERALD_WIRE_MAX_STRING_BYTES") {
            config.max_string_bytes = v;
        }
        if let Some(v) = env_usize("HERALD_WIRE_MAX_EXTRAS") {
            config.max_extras = v;
        }
        config
    }
}

impl Default for WireConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}

/// Flat byte buffer plus an out-of-band table of payload handles.
///
/// Integers are little-endian; strings are an `i32` byte length (`-1` for
/// null) followed by UTF-8 padded to a 4-byte boundary. Handles are written as
/// an index into the object table, which the transport carries beside the
/// bytes.
#[derive(Debug, Clone, Default)]
pub struct Parcel {
    data: Vec<u8>,
    pos: usize,
    objects: Vec<Arc<dyn PayloadChannel>>,
    config: WireConfig,
}

impl Parcel {
    pub fn new(config: WireConfig) -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
            objects: Vec::new(),
            config,
        }
    }

    pub fn from_parts(
        data: Vec<u8>,
        objects: Vec<Arc<dyn PayloadChannel>>,
        config: WireConfig,
    ) -> Self {
        Self {
            data,
            pos: 0,
            objects,
            config,
        }
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Hands the parcel to another process over `link`: bytes are kept, every
    /// carried handle is replaced by a remote handle reaching back through the
    /// link. The read position is reset.
    pub fn transfer(self, link: &LoopbackLink) -> Parcel {
        let objects = self
            .objects
            .into_iter()
            .map(|object| {
                Arc::new(LoopbackChannel::connect(link, object, self.config))
                    as Arc<dyn PayloadChannel>
            })
            .collect();
        Parcel::from_parts(self.data, objects, self.config)
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_i32(i32::from(value));
    }

    pub fn write_string(&mut self, value: Option<&str>) -> Result<(), WireError> {
        let Some(value) = value else {
            self.write_i32(NULL_STRING_LEN);
            return Ok(());
        };
        let len = i32::try_from(value.len()).map_err(|_| WireError::LimitExceeded {
            field: "string",
            limit: i32::MAX as usize,
            got: value.len(),
        })?;
        self.write_i32(len);
        self.data.extend_from_slice(value.as_bytes());
        self.data.resize(self.data.len() + padding(value.len()), 0);
        Ok(())
    }

    pub fn write_strong_handle(
        &mut self,
        handle: Arc<dyn PayloadChannel>,
    ) -> Result<(), WireError> {
        if self.objects.len() >= self.config.max_parcel_objects {
            return Err(WireError::LimitExceeded {
                field: "parcel.objects",
                limit: self.config.max_parcel_objects,
                got: self.objects.len() + 1,
            });
        }
        let index = i32::try_from(self.objects.len()).map_err(|_| WireError::LimitExceeded {
            field: "parcel.objects",
            limit: i32::MAX as usize,
            got: self.objects.len(),
        })?;
        self.objects.push(handle);
        self.write_i32(index);
        Ok(())
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let bytes = self.take::<4>()?;
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        let bytes = self.take::<8>()?;
        Ok(i64::from_le_bytes(bytes))
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_i32()? != 0)
    }

    /// Reads the next `i32` without moving the read position.
    pub fn peek_i32(&self) -> Option<i32> {
        let end = self.pos.checked_add(4)?;
        let bytes: [u8; 4] = self.data.get(self.pos..end)?.try_into().ok()?;
        Some(i32::from_le_bytes(bytes))
    }

    pub fn read_string(&mut self) -> Result<Option<String>, WireError> {
        let len = self.read_i32()?;
        if len == NULL_STRING_LEN {
            return Ok(None);
        }
        let len = self.read_len("string", len, self.config.max_string_bytes)?;
        let padded = len + padding(len);
        self.ensure(padded)?;
        let bytes = self.data[self.pos..self.pos + len].to_vec();
        self.pos += padded;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| WireError::InvalidUtf8)
    }

    pub fn read_required_string(&mut self, field: &'static str) -> Result<String, WireError> {
        self.read_string()?
            .ok_or(WireError::MissingField { field })
    }

    pub fn read_strong_handle(&mut self) -> Result<Arc<dyn PayloadChannel>, WireError> {
        let index = self.read_i32()?;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.objects.get(i))
            .cloned()
            .ok_or(WireError::UnknownHandle { index })
    }

    /// Validates a wire length against `limit` and converts it to `usize`.
    pub fn read_len(
        &self,
        field: &'static str,
        len: i32,
        limit: usize,
    ) -> Result<usize, WireError> {
        let len = usize::try_from(len).map_err(|_| WireError::NegativeLength { field, got: len })?;
        if len > limit {
            return Err(WireError::LimitExceeded {
                field,
                limit,
                got: len,
            });
        }
        Ok(len)
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        if self.remaining() < needed {
            return Err(WireError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }
}

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalPayload;
    use herald_kernel_contracts::payload::NotificationPayload;

    #[test]
    fn at_parcel_01_strings_keep_null_distinct_from_empty() {
        let mut parcel = Parcel::new(WireConfig::mvp_v1());
        parcel.write_string(None).unwrap();
        parcel.write_string(Some("")).unwrap();
        parcel.write_string(Some("abcde")).unwrap();
        parcel.write_i32(7);

        assert_eq!(parcel.len(), 4 + 4 + (4 + 8) + 4);
        assert_eq!(parcel.read_string().unwrap(), None);
        assert_eq!(parcel.read_string().unwrap().as_deref(), Some(""));
        assert_eq!(parcel.read_string().unwrap().as_deref(), Some("abcde"));
        assert_eq!(parcel.read_i32().unwrap(), 7);
        assert_eq!(parcel.remaining(), 0);
    }

    #[test]
    fn at_parcel_02_peek_does_not_consume() {
        let mut parcel = Parcel::new(WireConfig::mvp_v1());
        parcel.write_i32(0x1234);
        assert_eq!(parcel.peek_i32(), Some(0x1234));
        assert_eq!(parcel.position(), 0);
        assert_eq!(parcel.read_i32().unwrap(), 0x1234);
        assert_eq!(parcel.peek_i32(), None);
    }

    #[test]
    fn at_parcel_03_truncated_read_fails() {
        let mut parcel = Parcel::from_parts(vec![1, 2], Vec::new(), WireConfig::mvp_v1());
        assert_eq!(
            parcel.read_i32(),
            Err(WireError::Truncated {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn at_parcel_04_oversized_string_is_rejected_before_copy() {
        let config = WireConfig {
            max_string_bytes: 4,
            ..WireConfig::mvp_v1()
        };
        let mut parcel = Parcel::new(config);
        parcel.write_string(Some("too long")).unwrap();
        assert!(matches!(
            parcel.read_string(),
            Err(WireError::LimitExceeded { field: "string", .. })
        ));
    }

    #[test]
    fn at_parcel_05_handles_resolve_by_slot() {
        let mut parcel = Parcel::new(WireConfig::mvp_v1());
        parcel
            .write_strong_handle(LocalPayload::new(NotificationPayload::default()))
            .unwrap();
        parcel.write_i32(3);
        assert_eq!(parcel.object_count(), 1);

        assert!(parcel.read_strong_handle().is_ok());
        assert_eq!(
            parcel.read_strong_handle().err(),
            Some(WireError::UnknownHandle { index: 3 })
        );
    }

    #[test]
    fn at_parcel_06_partial_config_keeps_defaults() {
        let config: WireConfig = serde_json::from_str(r#"{"max_extras": 8}"#).unwrap();
        assert_eq!(config.max_extras, 8);
        assert_eq!(config.max_string_bytes, WireConfig::mvp_v1().max_string_bytes);
    }
}
