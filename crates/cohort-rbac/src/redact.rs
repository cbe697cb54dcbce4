//! Tier-based field redaction.
//!
//! A record leaves the gateway with its common metadata (`id`, `datasetId`,
//! `created`, `updated`, `name`, `description`) plus every domain field whose
//! declared tier is at most the caller's tier. Nothing else is serialized.

use cohort_store::{ClinicalRecord, TieredField};
use cohort_types::Tier;
use serde_json::{Map, Value};
use tracing::trace;

/// Serializes clinical records at a fixed caller tier.
#[derive(Debug, Clone, Copy)]
pub struct FieldRedactor {
    tier: Tier,
}

impl FieldRedactor {
    pub fn new(tier: Tier) -> Self {
        Self { tier }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Fields of `record` visible at this tier, in declaration order.
    pub fn visible<'a>(&self, record: &'a ClinicalRecord) -> impl Iterator<Item = &'a TieredField> + use<'a> {
        let tier = self.tier;
        record.fields.iter().filter(move |f| tier.permits(f.tier))
    }

    /// Emits the reduced JSON object for `record`.
    pub fn redact(&self, record: &ClinicalRecord) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("id".into(), Value::String(record.id.to_string()));
        out.insert("datasetId".into(), Value::String(record.dataset_id.to_string()));
        if let Some(created) = record.created {
            out.insert("created".into(), Value::String(created.to_rfc3339()));
        }
        if let Some(updated) = record.updated {
            out.insert("updated".into(), Value::String(updated.to_rfc3339()));
        }
        out.insert("name".into(), Value::String(record.name.clone()));
        if let Some(description) = &record.description {
            out.insert("description".into(), Value::String(description.clone()));
        }

        let mut hidden = 0usize;
        for field in &record.fields {
            if self.tier.permits(field.tier) {
                out.insert(field.name.clone(), field.value.clone());
            } else {
                hidden += 1;
            }
        }
        if hidden > 0 {
            trace!(record = %record.id, tier = %self.tier, hidden, "Fields redacted");
        }
        out
    }
}

/// Shorthand for `FieldRedactor::new(tier).redact(record)`.
pub fn redact(record: &ClinicalRecord, tier: Tier) -> Map<String, Value> {
    FieldRedactor::new(tier).redact(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_store::{ClinicalDraft, RepositoryBuilder};
    use cohort_types::{ClinicalKind, COMMON_FIELDS};
    use proptest::prelude::*;
    use serde_json::json;

    fn patient(dob_tier: u8) -> ClinicalRecord {
        let repo = RepositoryBuilder::new()
            .clinical(
                "D1",
                ClinicalKind::Patients,
                ClinicalDraft::new("p1")
                    .with("patientId", "p1")
                    .with_tier("gender", "f", 0)
                    .with_tier("dateOfBirth", "1970-01-01", dob_tier),
            )
            .build()
            .unwrap();
        repo.clinical(ClinicalKind::Patients).get_by_index(0).unwrap().clone()
    }

    #[test]
    fn test_low_tier_hides_sensitive_field() {
        let out = redact(&patient(4), Tier::MIN);
        assert_eq!(out.get("gender"), Some(&json!("f")));
        assert!(out.get("dateOfBirth").is_none());
        assert_eq!(out.get("patientId"), Some(&json!("p1")));
    }

    #[test]
    fn test_equal_tier_is_visible() {
        let out = redact(&patient(2), Tier::new(2).unwrap());
        assert_eq!(out.get("dateOfBirth"), Some(&json!("1970-01-01")));
    }

    #[test]
    fn test_common_fields_always_present() {
        let out = redact(&patient(4), Tier::MIN);
        for field in ["id", "datasetId", "name"] {
            assert!(out.contains_key(field), "missing {field}");
        }
    }

    #[test]
    fn test_visible_iterator_matches_redact() {
        let record = patient(3);
        let redactor = FieldRedactor::new(Tier::new(1).unwrap());
        let names: Vec<_> = redactor.visible(&record).map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["patientId", "gender"]);
    }

    proptest! {
        #[test]
        fn prop_no_field_exceeds_caller_tier(
            tiers in proptest::collection::vec(0u8..=4, 1..12),
            caller in 0u8..=4,
        ) {
            let fields = ClinicalKind::Diagnoses.fields();
            let mut draft = ClinicalDraft::new("d1");
            for (field, tier) in fields.iter().zip(&tiers) {
                draft = draft.with_tier(field, "x", *tier);
            }
            let repo = RepositoryBuilder::new()
                .clinical("D1", ClinicalKind::Diagnoses, draft)
                .build()
                .unwrap();
            let record = repo.clinical(ClinicalKind::Diagnoses).get_by_index(0).unwrap();
            let caller = Tier::new(caller).unwrap();
            let out = redact(record, caller);

            for key in out.keys() {
                if COMMON_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                let declared = record.field(key).unwrap().tier;
                prop_assert!(declared <= caller);
            }
            let expected = tiers.iter().take(fields.len()).filter(|t| **t <= caller.as_u8()).count();
            let shown = out.keys().filter(|k| !COMMON_FIELDS.contains(&k.as_str())).count();
            prop_assert_eq!(shown, expected);
        }
    }
}
