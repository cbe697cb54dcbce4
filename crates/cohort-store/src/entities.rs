//! Entity types held by the repository.
//!
//! Clinical records are presented as `(field, value, tier)` triples so that
//! redaction is a single pass over [`ClinicalRecord::fields`]. Genomic
//! entities serialize directly with serde; they carry no tiers.

use chrono::{DateTime, Utc};
use cohort_types::{ClinicalKind, CompoundId, PATIENT_KEY, Tier};
use serde::Serialize;
use serde_json::Value;

use crate::table::Entity;

/// One domain field of a clinical record with its declared tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TieredField {
    pub name: String,
    pub value: Value,
    pub tier: Tier,
}

/// A clinical or lab-provenance record.
#[derive(Debug, Clone)]
pub struct ClinicalRecord {
    pub id: CompoundId,
    pub kind: ClinicalKind,
    pub dataset: String,
    pub dataset_id: CompoundId,
    pub name: String,
    pub description: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub fields: Vec<TieredField>,
}

impl ClinicalRecord {
    pub fn field(&self, name: &str) -> Option<&TieredField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.field(name).map(|f| &f.value)
    }

    /// The join key, if the record carries one as a string.
    pub fn patient_id(&self) -> Option<&str> {
        self.value(PATIENT_KEY).and_then(Value::as_str)
    }
}

impl Entity for ClinicalRecord {
    const KIND: &'static str = "record";

    fn id(&self) -> &CompoundId {
        &self.id
    }

    fn dataset_name(&self) -> &str {
        &self.dataset
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Top-level ownership and authorization boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: CompoundId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Entity for Dataset {
    const KIND: &'static str = "dataset";

    fn id(&self) -> &CompoundId {
        &self.id
    }

    fn dataset_name(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A genotype call on a variant.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub call_set_name: String,
    #[serde(default)]
    pub genotype: Vec<i32>,
}

/// A genomic position with calls, owned by a variant set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: CompoundId,
    pub variant_set_id: CompoundId,
    pub names: Vec<String>,
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
    pub reference_bases: String,
    pub alternate_bases: Vec<String>,
    pub calls: Vec<Call>,
}

impl Variant {
    /// Half-open overlap with `[start, end)` on `reference_name`.
    ///
    /// A leading `chr` is ignored on both sides.
    pub fn overlaps(&self, reference_name: &str, start: u64, end: u64) -> bool {
        strip_chr(&self.reference_name) == strip_chr(reference_name)
            && self.start < end
            && self.end > start
    }
}

/// Normalizes `chr17` and `17` to the same reference name.
pub fn strip_chr(name: &str) -> &str {
    name.strip_prefix("chr").unwrap_or(name)
}

/// A set of variants called for one sample.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSet {
    pub id: CompoundId,
    pub dataset_id: CompoundId,
    #[serde(skip)]
    pub dataset: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_set_id: Option<CompoundId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<String>,
    #[serde(skip)]
    pub variants: Vec<Variant>,
}

impl Entity for VariantSet {
    const KIND: &'static str = "variant set";

    fn id(&self) -> &CompoundId {
        &self.id
    }

    fn dataset_name(&self) -> &str {
        &self.dataset
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An annotated genomic region, typically a gene.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: CompoundId,
    pub feature_set_id: CompoundId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gene_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<String>,
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub id: CompoundId,
    pub dataset_id: CompoundId,
    #[serde(skip)]
    pub dataset: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_set_id: Option<CompoundId>,
    #[serde(skip)]
    pub features: Vec<Feature>,
}

impl Entity for FeatureSet {
    const KIND: &'static str = "feature set";

    fn id(&self) -> &CompoundId {
        &self.id
    }

    fn dataset_name(&self) -> &str {
        &self.dataset
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadGroup {
    pub id: CompoundId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Aligned reads for one sample.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadGroupSet {
    pub id: CompoundId,
    pub dataset_id: CompoundId,
    #[serde(skip)]
    pub dataset: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_set_id: Option<CompoundId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<String>,
    pub read_groups: Vec<ReadGroup>,
}

impl Entity for ReadGroupSet {
    const KIND: &'static str = "read group set";

    fn id(&self) -> &CompoundId {
        &self.id
    }

    fn dataset_name(&self) -> &str {
        &self.dataset
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: CompoundId,
    pub name: String,
    pub length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5checksum: Option<String>,
}

/// A reference assembly. Reference sets are shared by all datasets; the
/// first id segment is the set's own name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSet {
    pub id: CompoundId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<Value>,
    pub references: Vec<Reference>,
}

impl Entity for ReferenceSet {
    const KIND: &'static str = "reference set";

    fn id(&self) -> &CompoundId {
        &self.id
    }

    fn dataset_name(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }
}
