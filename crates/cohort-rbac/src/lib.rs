//! # cohort-rbac: dataset access tiers and field redaction
//!
//! Three pieces sit between the repository and the wire:
//! - [`resolve_tier`] turns a dataset and the caller's [`AccessMap`] into a
//!   [`Tier`], or refuses the dataset outright.
//! - [`FieldRedactor`] drops every field whose declared tier exceeds the
//!   caller's tier while serializing a clinical record.
//! - [`AccessList`] / [`WatchedAccessList`] read the tab-separated file that
//!   maps `(issuer, username)` to per-dataset tiers.
//!
//! [`AccessMap`]: cohort_types::AccessMap
//! [`Tier`]: cohort_types::Tier

pub mod access_list;
pub mod redact;
pub mod tier;

pub use access_list::{AccessList, WatchedAccessList};
pub use redact::{FieldRedactor, redact};
pub use tier::{AccessError, Result, resolve_tier};
