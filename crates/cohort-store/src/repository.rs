//! The repository: every entity, indexed, loaded once at startup.

use std::collections::HashMap;
use std::path::Path;

use cohort_types::{ClinicalKind, CompoundId};
use tracing::{info, warn};

use crate::entities::{
    ClinicalRecord, Dataset, Feature, FeatureSet, ReadGroup, ReadGroupSet, Reference,
    ReferenceSet, Variant, VariantSet,
};
use crate::error::{Result, StoreError};
use crate::snapshot::{
    ClinicalDraft, DatasetDraft, FeatureSetDraft, ReadGroupSetDraft, ReferenceSetDraft, Snapshot,
    VariantSetDraft,
};
use crate::table::Table;

/// Read-only index over all persisted entities.
///
/// Shared by every request handler without locking.
#[derive(Debug, Default)]
pub struct Repository {
    datasets: Table<Dataset>,
    clinical: HashMap<ClinicalKind, Table<ClinicalRecord>>,
    variant_sets: Table<VariantSet>,
    feature_sets: Table<FeatureSet>,
    read_group_sets: Table<ReadGroupSet>,
    reference_sets: Table<ReferenceSet>,
    features: HashMap<CompoundId, (usize, usize)>,
    empty: Table<ClinicalRecord>,
}

impl Repository {
    /// Loads a snapshot file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repository = Self::from_snapshot(Snapshot::read(path)?)?;
        info!(
            path = %path.display(),
            datasets = repository.datasets.count(),
            clinical_records = repository.clinical_record_count(),
            variant_sets = repository.variant_sets.count(),
            "Repository loaded"
        );
        Ok(repository)
    }

    /// Builds the indices from an in-memory snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut repo = Self::default();
        for draft in snapshot.reference_sets {
            repo.insert_reference_set(draft)?;
        }
        for draft in snapshot.datasets {
            repo.insert_dataset(draft)?;
        }
        Ok(repo)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Resolves a dataset by local name or by compound id.
    pub fn dataset(&self, key: &str) -> Result<&Dataset> {
        if let Ok(dataset) = self.datasets.get_by_name(key, key) {
            return Ok(dataset);
        }
        CompoundId::parse(key)
            .ok()
            .and_then(|id| self.datasets.get(&id).ok())
            .ok_or_else(|| StoreError::DatasetNotFound(key.to_string()))
    }

    pub fn datasets(&self) -> &Table<Dataset> {
        &self.datasets
    }

    pub fn clinical(&self, kind: ClinicalKind) -> &Table<ClinicalRecord> {
        self.clinical.get(&kind).unwrap_or(&self.empty)
    }

    pub fn variant_sets(&self) -> &Table<VariantSet> {
        &self.variant_sets
    }

    pub fn feature_sets(&self) -> &Table<FeatureSet> {
        &self.feature_sets
    }

    pub fn read_group_sets(&self) -> &Table<ReadGroupSet> {
        &self.read_group_sets
    }

    pub fn reference_sets(&self) -> &Table<ReferenceSet> {
        &self.reference_sets
    }

    /// Looks up a variant by id. Variant ids extend their set's id with the
    /// variant's position in the set.
    pub fn variant(&self, id: &CompoundId) -> Result<&Variant> {
        let not_found = || StoreError::not_found("variant", id.as_str());
        let (index, set_segments) = id.segments().split_last().ok_or_else(not_found)?;
        let (dataset, rest) = set_segments.split_first().ok_or_else(not_found)?;
        let set_id = CompoundId::new(dataset, rest.iter().cloned());
        let set = self.variant_sets.get(&set_id).map_err(|_| not_found())?;
        index
            .parse::<usize>()
            .ok()
            .and_then(|i| set.variants.get(i))
            .ok_or_else(not_found)
    }

    pub fn feature(&self, id: &CompoundId) -> Result<&Feature> {
        self.features
            .get(id)
            .and_then(|&(set, feature)| {
                self.feature_sets
                    .get_by_index(set)
                    .and_then(|s| s.features.get(feature))
            })
            .ok_or_else(|| StoreError::not_found("feature", id.as_str()))
    }

    pub fn clinical_record_count(&self) -> usize {
        self.clinical.values().map(Table::count).sum()
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    fn reference_set_id(&self, name: Option<&str>) -> Result<Option<CompoundId>> {
        name.map(|n| {
            self.reference_sets
                .get_by_name(n, n)
                .map(|r| r.id.clone())
                .map_err(|_| StoreError::UnknownReferenceSet(n.to_string()))
        })
        .transpose()
    }

    fn insert_reference_set(&mut self, draft: ReferenceSetDraft) -> Result<()> {
        let id = CompoundId::dataset(&draft.name);
        let references = draft
            .references
            .into_iter()
            .map(|r| Reference {
                id: id.child([r.name.as_str()]),
                name: r.name,
                length: r.length,
                md5checksum: r.md5checksum,
            })
            .collect();
        self.reference_sets.insert(ReferenceSet {
            id,
            name: draft.name,
            assembly_id: draft.assembly_id,
            description: draft.description,
            species: draft.species,
            references,
        })
    }

    fn insert_dataset(&mut self, draft: DatasetDraft) -> Result<()> {
        let name = draft.name;
        self.datasets.insert(Dataset {
            id: CompoundId::dataset(&name),
            name: name.clone(),
            description: draft.description,
        })?;

        for (table, records) in draft.tables {
            let Some(kind) = ClinicalKind::from_table(&table) else {
                warn!(dataset = %name, table = %table, "ignoring unknown table");
                continue;
            };
            for record in records {
                self.insert_clinical(kind, &name, record)?;
            }
        }
        for set in draft.variant_sets {
            self.insert_variant_set(&name, set)?;
        }
        for set in draft.feature_sets {
            self.insert_feature_set(&name, set)?;
        }
        for set in draft.read_group_sets {
            self.insert_read_group_set(&name, set)?;
        }
        Ok(())
    }

    fn insert_clinical(&mut self, kind: ClinicalKind, dataset: &str, draft: ClinicalDraft) -> Result<()> {
        let record = draft.into_record(kind, dataset)?;
        self.clinical.entry(kind).or_default().insert(record)
    }

    fn insert_variant_set(&mut self, dataset: &str, draft: VariantSetDraft) -> Result<()> {
        let id = CompoundId::new(dataset, ["variantsets", draft.name.as_str()]);
        let variants = draft
            .variants
            .into_iter()
            .enumerate()
            .map(|(i, v)| Variant {
                id: id.child([i.to_string()]),
                variant_set_id: id.clone(),
                names: v.names,
                reference_name: v.reference_name,
                start: v.start,
                end: v.end,
                reference_bases: v.reference_bases,
                alternate_bases: v.alternate_bases,
                calls: v.calls,
            })
            .collect();
        let reference_set_id = self.reference_set_id(draft.reference_set_name.as_deref())?;
        self.variant_sets.insert(VariantSet {
            id,
            dataset_id: CompoundId::dataset(dataset),
            dataset: dataset.to_string(),
            name: draft.name,
            reference_set_id,
            patient_id: draft.patient_id,
            sample_id: draft.sample_id,
            variants,
        })
    }

    fn insert_feature_set(&mut self, dataset: &str, draft: FeatureSetDraft) -> Result<()> {
        let id = CompoundId::new(dataset, ["featuresets", draft.name.as_str()]);
        let set_index = self.feature_sets.count();
        let mut features = Vec::with_capacity(draft.features.len());
        for (i, f) in draft.features.into_iter().enumerate() {
            let feature_id = id.child([f.name.as_str()]);
            if self.features.insert(feature_id.clone(), (set_index, i)).is_some() {
                return Err(StoreError::Duplicate {
                    kind: "feature",
                    dataset: dataset.to_string(),
                    name: f.name,
                });
            }
            features.push(Feature {
                id: feature_id,
                feature_set_id: id.clone(),
                name: f.name,
                gene_symbol: f.gene_symbol,
                feature_type: f.feature_type,
                reference_name: f.reference_name,
                start: f.start,
                end: f.end,
            });
        }
        let reference_set_id = self.reference_set_id(draft.reference_set_name.as_deref())?;
        self.feature_sets.insert(FeatureSet {
            id,
            dataset_id: CompoundId::dataset(dataset),
            dataset: dataset.to_string(),
            name: draft.name,
            reference_set_id,
            features,
        })
    }

    fn insert_read_group_set(&mut self, dataset: &str, draft: ReadGroupSetDraft) -> Result<()> {
        let id = CompoundId::new(dataset, ["readgroupsets", draft.name.as_str()]);
        let read_groups = draft
            .read_groups
            .into_iter()
            .map(|g| ReadGroup {
                id: id.child([g.name.as_str()]),
                name: g.name,
                sample_name: g.sample_name,
                description: g.description,
            })
            .collect();
        let reference_set_id = self.reference_set_id(draft.reference_set_name.as_deref())?;
        self.read_group_sets.insert(ReadGroupSet {
            id,
            dataset_id: CompoundId::dataset(dataset),
            dataset: dataset.to_string(),
            name: draft.name,
            reference_set_id,
            patient_id: draft.patient_id,
            sample_id: draft.sample_id,
            read_groups,
        })
    }
}

/// Assembles a [`Repository`] programmatically.
///
/// ```
/// use cohort_store::{ClinicalDraft, RepositoryBuilder};
/// use cohort_types::ClinicalKind;
///
/// let repo = RepositoryBuilder::new()
///     .dataset("D1")
///     .clinical("D1", ClinicalKind::Patients, ClinicalDraft::new("p1").with("patientId", "p1"))
///     .build()
///     .unwrap();
/// assert_eq!(repo.clinical(ClinicalKind::Patients).count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RepositoryBuilder {
    snapshot: Snapshot,
}

impl RepositoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference_set(mut self, draft: ReferenceSetDraft) -> Self {
        self.snapshot.reference_sets.push(draft);
        self
    }

    pub fn dataset(mut self, name: &str) -> Self {
        self.snapshot.datasets.push(DatasetDraft::new(name));
        self
    }

    pub fn clinical(mut self, dataset: &str, kind: ClinicalKind, draft: ClinicalDraft) -> Self {
        self.draft_mut(dataset)
            .tables
            .entry(kind.table().to_string())
            .or_default()
            .push(draft);
        self
    }

    pub fn variant_set(mut self, dataset: &str, draft: VariantSetDraft) -> Self {
        self.draft_mut(dataset).variant_sets.push(draft);
        self
    }

    pub fn feature_set(mut self, dataset: &str, draft: FeatureSetDraft) -> Self {
        self.draft_mut(dataset).feature_sets.push(draft);
        self
    }

    pub fn read_group_set(mut self, dataset: &str, draft: ReadGroupSetDraft) -> Self {
        self.draft_mut(dataset).read_group_sets.push(draft);
        self
    }

    pub fn build(self) -> Result<Repository> {
        Repository::from_snapshot(self.snapshot)
    }

    fn draft_mut(&mut self, dataset: &str) -> &mut DatasetDraft {
        let position = self.snapshot.datasets.iter().position(|d| d.name == dataset);
        let index = position.unwrap_or_else(|| {
            self.snapshot.datasets.push(DatasetDraft::new(dataset));
            self.snapshot.datasets.len() - 1
        });
        &mut self.snapshot.datasets[index]
    }
}
