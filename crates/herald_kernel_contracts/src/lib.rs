#![forbid(unsafe_code)]

pub mod common;
pub mod payload;
pub mod record;

pub use common::{ContractViolation, SchemaVersion, Validate};
