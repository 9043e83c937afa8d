#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fmt;

use herald_kernel_contracts::ContractViolation;
use tracing::{debug, warn};

use crate::source::SourceRecord;

pub const OWNER_ID_UNRESOLVED: i32 = 0;
pub const LEGACY_OWNER_FIELD: &str = "uid";

pub trait OwnerIdStrategy: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, record: &dyn SourceRecord) -> Option<i32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformAccessor;

impl OwnerIdStrategy for PlatformAccessor {
    fn name(&self) -> &'static str {
        "accessor"
    }

    fn resolve(&self, record: &dyn SourceRecord) -> Option<i32> {
        record.owner_id_accessor()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LegacyFieldProbe {
    field: &'static str,
}

impl LegacyFieldProbe {
    pub fn new(field: &'static str) -> Self {
        Self { field }
    }
}

impl Default for LegacyFieldProbe {
    fn default() -> Self {
        Self::new(LEGACY_OWNER_FIELD)
    }
}

impl OwnerIdStrategy for LegacyFieldProbe {
    fn name(&self) -> &'static str {
        "field"
    }

    fn resolve(&self, record: &dyn SourceRecord) -> Option<i32> {
        let raw = record.platform_field(self.field)?;
        i32::try_from(raw).ok()
    }
}

/// Package name to owner id, as installed-package metadata reports it.
#[derive(Debug, Clone, Default)]
pub struct PackageUidTable {
    uids: BTreeMap<String, i32>,
}

impl PackageUidTable {
    pub fn new(uids: BTreeMap<String, i32>) -> Self {
        Self { uids }
    }
}

impl OwnerIdStrategy for PackageUidTable {
    fn name(&self) -> &'static str {
        "package_table"
    }

    fn resolve(&self, record: &dyn SourceRecord) -> Option<i32> {
        self.uids.get(record.package()).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerIdStrategyKind {
    PlatformAccessor,
    LegacyField,
    PackageTable,
}

impl OwnerIdStrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerIdStrategyKind::PlatformAccessor => "accessor",
            OwnerIdStrategyKind::LegacyField => "field",
            OwnerIdStrategyKind::PackageTable => "package_table",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ContractViolation> {
        match raw.trim() {
            "accessor" => Ok(OwnerIdStrategyKind::PlatformAccessor),
            "field" => Ok(OwnerIdStrategyKind::LegacyField),
            "package_table" => Ok(OwnerIdStrategyKind::PackageTable),
            _ => Err(ContractViolation::InvalidValue {
                field: "owner_id_resolver_config.strategies",
                reason: "must be one of accessor, field, package_table",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdResolverConfig {
    pub strategies: Vec<OwnerIdStrategyKind>,
}

impl OwnerIdResolverConfig {
    pub fn mvp_v1() -> Self {
        Self {
            strategies: vec![
                OwnerIdStrategyKind::PlatformAccessor,
                OwnerIdStrategyKind::LegacyField,
                OwnerIdStrategyKind::PackageTable,
            ],
        }
    }

    /// `HERALD_OWNER_ID_STRATEGIES`, a comma-separated ordered list, or
    /// `mvp_v1` when unset or blank.
    pub fn from_env() -> Result<Self, ContractViolation> {
        match env::var("HERALD_OWNER_ID_STRATEGIES") {
            Ok(raw) if !raw.trim().is_empty() => Self::parse_list(&raw),
            _ => Ok(Self::mvp_v1()),
        }
    }

    pub fn parse_list(raw: &str) -> Result<Self, ContractViolation> {
        let strategies = raw
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(OwnerIdStrategyKind::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if strategies.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "owner_id_resolver_config.strategies",
                reason: "must name at least one strategy",
            });
        }
        Ok(Self { strategies })
    }
}

/// Ordered owner-id strategies, picked once at startup. First hit wins.
#[derive(Debug)]
pub struct OwnerIdResolver {
    strategies: Vec<Box<dyn OwnerIdStrategy>>,
}

impl OwnerIdResolver {
    pub fn new(strategies: Vec<Box<dyn OwnerIdStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn from_config(config: &OwnerIdResolverConfig, package_uids: PackageUidTable) -> Self {
        let strategies = config
            .strategies
            .iter()
            .map(|kind| -> Box<dyn OwnerIdStrategy> {
                match kind {
                    OwnerIdStrategyKind::PlatformAccessor => Box::new(PlatformAccessor),
                    OwnerIdStrategyKind::LegacyField => Box::new(LegacyFieldProbe::default()),
                    OwnerIdStrategyKind::PackageTable => Box::new(package_uids.clone()),
                }
            })
            .collect();
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Never fails: an unresolvable record degrades to [`OWNER_ID_UNRESOLVED`].
    pub fn resolve(&self, record: &dyn SourceRecord) -> i32 {
        for strategy in &self.strategies {
            if let Some(owner_id) = strategy.resolve(record) {
                debug!(strategy = strategy.name(), owner_id, "owner id resolved");
                return owner_id;
            }
        }
        warn!(
            package = record.package(),
            "incompatible platform record: owner id unresolved, using 0"
        );
        OWNER_ID_UNRESOLVED
    }
}

impl Default for OwnerIdResolver {
    fn default() -> Self {
        Self::from_config(&OwnerIdResolverConfig::mvp_v1(), PackageUidTable::default())
    }
}
