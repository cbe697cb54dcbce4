//! # cohort-types: Core types for the cohort gateway
//!
//! Shared vocabulary used by every other crate in the workspace:
//! - Access tiers ([`Tier`]) and per-request access maps ([`AccessMap`])
//! - Compound entity identifiers ([`CompoundId`])
//! - Closed table-kind enums ([`ClinicalKind`], [`GenomicKind`], [`ResultTable`])

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod id;
mod kinds;

pub use id::{CompoundId, IdError};
pub use kinds::{ClinicalKind, GenomicKind, ResultTable};

/// Fields every clinical record exposes regardless of the caller's tier.
pub const COMMON_FIELDS: &[&str] = &["id", "datasetId", "created", "updated", "name", "description"];

/// The join column shared across clinical tables.
pub const PATIENT_KEY: &str = "patientId";

// ============================================================================
// Tier
// ============================================================================

/// Errors raised when constructing a [`Tier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tier {0} is outside the range 0..=4")]
pub struct TierOutOfRange(pub i64);

/// Field sensitivity level, and the level a caller holds for a dataset.
///
/// Tier 0 sees the least data, tier 4 the most. A field declared at tier `f`
/// is visible to a caller holding tier `t` iff `f <= t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Tier(u8);

impl Tier {
    pub const MIN: Tier = Tier(0);
    pub const MAX: Tier = Tier(4);

    /// Creates a tier, rejecting values above [`Tier::MAX`].
    pub fn new(value: u8) -> Result<Self, TierOutOfRange> {
        Self::try_from(i64::from(value))
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns true if a field declared at `field_tier` may be shown at this tier.
    pub fn permits(self, field_tier: Tier) -> bool {
        field_tier <= self
    }
}

impl TryFrom<i64> for Tier {
    type Error = TierOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(v) if v <= Self::MAX.0 => Ok(Self(v)),
            _ => Err(TierOutOfRange(value)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.0
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Access map
// ============================================================================

/// Dataset name to tier, scoped to a single request.
///
/// Supplied by the authentication layer. A dataset that is not a key of the
/// map is not accessible at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessMap(BTreeMap<String, Tier>);

impl AccessMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `tier` on every dataset named in `datasets`.
    pub fn uniform<I, S>(datasets: I, tier: Tier) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(datasets.into_iter().map(|d| (d.into(), tier)).collect())
    }

    pub fn grant(&mut self, dataset: impl Into<String>, tier: Tier) {
        self.0.insert(dataset.into(), tier);
    }

    pub fn with(mut self, dataset: impl Into<String>, tier: Tier) -> Self {
        self.grant(dataset, tier);
        self
    }

    pub fn tier(&self, dataset: &str) -> Option<Tier> {
        self.0.get(dataset).copied()
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.0.contains_key(dataset)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Tier)> for AccessMap {
    fn from_iter<T: IntoIterator<Item = (String, Tier)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, true; "lowest")]
    #[test_case(4, true; "highest")]
    #[test_case(5, false; "above range")]
    #[test_case(-1, false; "negative")]
    fn test_tier_range(value: i64, ok: bool) {
        assert_eq!(Tier::try_from(value).is_ok(), ok);
    }

    #[test]
    fn test_tier_permits() {
        let caller = Tier::new(2).unwrap();
        assert!(caller.permits(Tier::MIN));
        assert!(caller.permits(Tier::new(2).unwrap()));
        assert!(!caller.permits(Tier::MAX));
    }

    #[test]
    fn test_tier_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<Tier>("3").is_ok());
        assert!(serde_json::from_str::<Tier>("7").is_err());
        assert_eq!(serde_json::to_string(&Tier::MAX).unwrap(), "4");
    }

    #[test]
    fn test_access_map_lookup() {
        let map = AccessMap::new().with("D1", Tier::MAX).with("D2", Tier::MIN);
        assert_eq!(map.tier("D1"), Some(Tier::MAX));
        assert_eq!(map.tier("D2"), Some(Tier::MIN));
        assert_eq!(map.tier("D3"), None);
        assert_eq!(map.datasets().collect::<Vec<_>>(), vec!["D1", "D2"]);
    }

    #[test]
    fn test_uniform_access_map() {
        let map = AccessMap::uniform(["a", "b"], Tier::MAX);
        assert_eq!(map.len(), 2);
        assert!(map.contains("a"));
        assert!(!map.contains("c"));
    }
}
