//! # cohort-store: the read-only repository
//!
//! Holds every dataset and the entities it owns, indexed for lookup by id,
//! by position and by name. Loaded once from a JSON [`Snapshot`] at startup
//! and never mutated afterwards; table order is stable for the life of the
//! process, which is what makes integer page tokens valid.

mod entities;
mod error;
mod repository;
mod snapshot;
mod table;

pub use entities::{
    Call, ClinicalRecord, Dataset, Feature, FeatureSet, ReadGroup, ReadGroupSet, Reference,
    ReferenceSet, TieredField, Variant, VariantSet, strip_chr,
};
pub use error::{Result, StoreError};
pub use repository::{Repository, RepositoryBuilder};
pub use snapshot::{
    ClinicalDraft, DatasetDraft, FeatureDraft, FeatureSetDraft, ReadGroupDraft, ReadGroupSetDraft,
    ReferenceDraft, ReferenceSetDraft, Snapshot, VariantDraft, VariantSetDraft,
};
pub use table::{Entity, Table};
