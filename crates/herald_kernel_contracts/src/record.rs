#![forbid(unsafe_code)]

use crate::common::{validate_bounded_text, validate_token};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const HERALD_RECORD_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MAX_PACKAGE_LEN: usize = 255;
pub const MAX_TAG_LEN: usize = 1024;

/// Platform user/profile the record was posted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserHandle(pub i32);

impl UserHandle {
    pub const SYSTEM: UserHandle = UserHandle(0);

    pub fn identifier(self) -> i32 {
        self.0
    }
}

/// Wall-clock post time in milliseconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostTimeMs(pub i64);

/// Identity and metadata snapshot of a notification as its owner posted it.
///
/// Captured once, either from a foreign record or from a decoded stream, and
/// never mutated afterwards. Decoration lives beside it, not inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRecord {
    pub schema_version: SchemaVersion,
    pub package: String,
    pub op_package: Option<String>,
    pub id: i32,
    pub tag: Option<String>,
    pub owner_id: i32,
    pub initial_pid: i32,
    pub score: i32,
    pub user: UserHandle,
    pub post_time: PostTimeMs,
}

impl BaseRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        package: String,
        op_package: Option<String>,
        id: i32,
        tag: Option<String>,
        owner_id: i32,
        initial_pid: i32,
        score: i32,
        user: UserHandle,
        post_time: PostTimeMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            schema_version: HERALD_RECORD_CONTRACT_VERSION,
            package,
            op_package,
            id,
            tag,
            owner_id,
            initial_pid,
            score,
            user,
            post_time,
        };
        record.validate()?;
        Ok(record)
    }

    /// Key the host platform derives for a record with these identity values.
    pub fn key_for(
        user: UserHandle,
        package: &str,
        id: i32,
        tag: Option<&str>,
        owner_id: i32,
    ) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            user.identifier(),
            package,
            id,
            tag.unwrap_or("null"),
            owner_id
        )
    }

    pub fn key(&self) -> String {
        Self::key_for(
            self.user,
            &self.package,
            self.id,
            self.tag.as_deref(),
            self.owner_id,
        )
    }
}

impl Validate for BaseRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != HERALD_RECORD_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "base_record.schema_version",
                reason: "must match HERALD_RECORD_CONTRACT_VERSION",
            });
        }
        validate_token("base_record.package", &self.package, MAX_PACKAGE_LEN)?;
        if let Some(op_package) = &self.op_package {
            validate_token("base_record.op_package", op_package, MAX_PACKAGE_LEN)?;
        }
        if let Some(tag) = &self.tag {
            validate_bounded_text("base_record.tag", tag, MAX_TAG_LEN)?;
        }
        if self.post_time.0 < 0 {
            return Err(ContractViolation::InvalidValue {
                field: "base_record.post_time",
                reason: "must be >= 0",
            });
        }
        Ok(())
    }
}
