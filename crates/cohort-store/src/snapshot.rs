//! Persisted snapshot format and the drafts it deserializes into.
//!
//! A snapshot is the JSON document written by the ingestion tool. Clinical
//! records are flat objects; a domain field `X` may carry its tier as `XTier`
//! or `X_tier`. Record order in the document becomes repository order.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use cohort_types::{ClinicalKind, CompoundId, Tier};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::entities::{Call, ClinicalRecord, TieredField};
use crate::error::{Result, StoreError};

/// Root of a snapshot document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub reference_sets: Vec<ReferenceSetDraft>,
    #[serde(default)]
    pub datasets: Vec<DatasetDraft>,
}

impl Snapshot {
    /// Reads and parses a snapshot file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variant_sets: Vec<VariantSetDraft>,
    #[serde(default)]
    pub feature_sets: Vec<FeatureSetDraft>,
    #[serde(default)]
    pub read_group_sets: Vec<ReadGroupSetDraft>,
    /// Clinical tables keyed by table name.
    #[serde(flatten)]
    pub tables: BTreeMap<String, Vec<ClinicalDraft>>,
}

impl DatasetDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A flat clinical record as stored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClinicalDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ClinicalDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets a field at tier 0.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(field.to_string(), value.into());
        self
    }

    /// Sets a field together with its tier companion.
    pub fn with_tier(mut self, field: &str, value: impl Into<Value>, tier: u8) -> Self {
        self.attributes.insert(field.to_string(), value.into());
        self.attributes
            .insert(format!("{field}Tier"), Value::from(tier));
        self
    }

    /// Converts the flat form into tiered triples for `kind`.
    ///
    /// Null values are treated as absent. Keys that are neither a field of
    /// `kind` nor a tier companion are dropped with a warning.
    pub(crate) fn into_record(self, kind: ClinicalKind, dataset: &str) -> Result<ClinicalRecord> {
        let mut fields = Vec::new();
        for &field in kind.fields() {
            let Some(value) = self.attributes.get(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            fields.push(TieredField {
                name: field.to_string(),
                value: value.clone(),
                tier: tier_of(&self.attributes, field)?,
            });
        }

        for key in self.attributes.keys() {
            if !kind.has_field(key) && tier_owner(key).is_none_or(|f| !kind.has_field(f)) {
                warn!(table = %kind, record = %self.name, field = %key, "ignoring unknown field");
            }
        }

        Ok(ClinicalRecord {
            id: CompoundId::new(dataset, [kind.table(), self.name.as_str()]),
            kind,
            dataset: dataset.to_string(),
            dataset_id: CompoundId::dataset(dataset),
            name: self.name,
            description: self.description,
            created: self.created,
            updated: self.updated,
            fields,
        })
    }
}

fn tier_owner(key: &str) -> Option<&str> {
    key.strip_suffix("_tier").or_else(|| key.strip_suffix("Tier"))
}

fn tier_of(attributes: &Map<String, Value>, field: &str) -> Result<Tier> {
    let raw = attributes
        .get(&format!("{field}Tier"))
        .or_else(|| attributes.get(&format!("{field}_tier")));
    match raw {
        None | Some(Value::Null) => Ok(Tier::MIN),
        Some(value) => value
            .as_i64()
            .and_then(|v| Tier::try_from(v).ok())
            .ok_or_else(|| StoreError::InvalidTier {
                field: field.to_string(),
                value: value.to_string(),
            }),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSetDraft {
    pub name: String,
    #[serde(default)]
    pub reference_set_name: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub sample_id: Option<String>,
    #[serde(default)]
    pub variants: Vec<VariantDraft>,
}

impl VariantSetDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn owned_by(mut self, patient_id: &str, sample_id: &str) -> Self {
        self.patient_id = Some(patient_id.to_string());
        self.sample_id = Some(sample_id.to_string());
        self
    }

    pub fn variant(mut self, variant: VariantDraft) -> Self {
        self.variants.push(variant);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDraft {
    #[serde(default)]
    pub names: Vec<String>,
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
    #[serde(default)]
    pub reference_bases: String,
    #[serde(default)]
    pub alternate_bases: Vec<String>,
    #[serde(default)]
    pub calls: Vec<Call>,
}

impl VariantDraft {
    pub fn new(reference_name: &str, start: u64, end: u64) -> Self {
        Self {
            reference_name: reference_name.to_string(),
            start,
            end,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSetDraft {
    pub name: String,
    #[serde(default)]
    pub reference_set_name: Option<String>,
    #[serde(default)]
    pub features: Vec<FeatureDraft>,
}

impl FeatureSetDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn feature(mut self, feature: FeatureDraft) -> Self {
        self.features.push(feature);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDraft {
    pub name: String,
    #[serde(default)]
    pub gene_symbol: Option<String>,
    #[serde(default)]
    pub feature_type: Option<String>,
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
}

impl FeatureDraft {
    pub fn gene(symbol: &str, reference_name: &str, start: u64, end: u64) -> Self {
        Self {
            name: symbol.to_string(),
            gene_symbol: Some(symbol.to_string()),
            feature_type: Some("gene".to_string()),
            reference_name: reference_name.to_string(),
            start,
            end,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadGroupSetDraft {
    pub name: String,
    #[serde(default)]
    pub reference_set_name: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub sample_id: Option<String>,
    #[serde(default)]
    pub read_groups: Vec<ReadGroupDraft>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadGroupDraft {
    pub name: String,
    #[serde(default)]
    pub sample_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSetDraft {
    pub name: String,
    #[serde(default)]
    pub assembly_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub species: Option<Value>,
    #[serde(default)]
    pub references: Vec<ReferenceDraft>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDraft {
    pub name: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub md5checksum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tier_companions_both_spellings() {
        let draft: ClinicalDraft = serde_json::from_value(json!({
            "name": "p1",
            "patientId": "p1",
            "gender": "f",
            "genderTier": 0,
            "dateOfBirth": "1970-01-01",
            "dateOfBirth_tier": 4
        }))
        .unwrap();
        let record = draft.into_record(ClinicalKind::Patients, "D1").unwrap();
        assert_eq!(record.field("gender").unwrap().tier, Tier::MIN);
        assert_eq!(record.field("dateOfBirth").unwrap().tier, Tier::MAX);
        assert_eq!(record.field("patientId").unwrap().tier, Tier::MIN);
        assert_eq!(record.patient_id(), Some("p1"));
    }

    #[test]
    fn test_invalid_tier_rejected() {
        let draft = ClinicalDraft::new("p1").with("gender", "f").with("genderTier", 9);
        let err = draft.into_record(ClinicalKind::Patients, "D1").unwrap_err();
        assert!(matches!(err, StoreError::InvalidTier { .. }));
    }

    #[test]
    fn test_null_and_unknown_fields_dropped() {
        let draft = ClinicalDraft::new("d1")
            .with("cancerType", Value::Null)
            .with("favouriteColour", "blue")
            .with("tumorGrade", "II");
        let record = draft.into_record(ClinicalKind::Diagnoses, "D1").unwrap();
        assert!(record.field("cancerType").is_none());
        assert!(record.field("favouriteColour").is_none());
        assert_eq!(record.value("tumorGrade"), Some(&json!("II")));
    }

    #[test]
    fn test_fields_follow_declaration_order() {
        let draft = ClinicalDraft::new("p1")
            .with("gender", "m")
            .with("patientId", "p1");
        let record = draft.into_record(ClinicalKind::Patients, "D1").unwrap();
        let names: Vec<_> = record.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["patientId", "gender"]);
    }

    #[test]
    fn test_dataset_draft_collects_tables() {
        let draft: DatasetDraft = serde_json::from_value(json!({
            "name": "D1",
            "patients": [{"name": "p1"}],
            "diagnoses": [{"name": "d1"}, {"name": "d2"}]
        }))
        .unwrap();
        assert_eq!(draft.tables["patients"].len(), 1);
        assert_eq!(draft.tables["diagnoses"].len(), 2);
    }
}
