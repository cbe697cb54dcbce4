//! Per-table searches and point lookups.
//!
//! Every search follows the same pipeline: resolve the dataset, resolve the
//! caller's tier, validate filters, collect matching rows in repository
//! order, then page, render and accumulate them in a [`ResponseBuilder`].

use std::collections::HashSet;

use cohort_rbac::{FieldRedactor, resolve_tier};
use cohort_store::{ClinicalRecord, Dataset, Repository, Variant, VariantSet};
use cohort_types::{AccessMap, ClinicalKind, CompoundId, GenomicKind, PATIENT_KEY, Tier};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{QueryError, Result};
use crate::filter::{Filter, TieredView, matches_all};
use crate::paging::Paged;
use crate::request::{
    DatasetScopedRequest, FeatureSearchRequest, GeneSearchRequest, ListRequest, SearchRequest,
    VariantSearchRequest, require,
};
use crate::response::{Limits, ResponseBuilder, SearchResponse};

/// Executes searches against a repository.
#[derive(Debug, Clone, Copy)]
pub struct SearchEngine<'r> {
    repo: &'r Repository,
    limits: Limits,
}

impl<'r> SearchEngine<'r> {
    pub fn new(repo: &'r Repository, limits: Limits) -> Self {
        Self { repo, limits }
    }

    pub fn repository(&self) -> &'r Repository {
        self.repo
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Resolves a dataset and the caller's tier on it.
    pub fn authorize(&self, dataset_id: &str, access: &AccessMap) -> Result<(&'r Dataset, Tier)> {
        let dataset = self.repo.dataset(dataset_id)?;
        let tier = resolve_tier(dataset, access)?;
        Ok((dataset, tier))
    }

    fn page<'a, T>(
        &self,
        table: &str,
        rows: &'a [T],
        page_size: Option<i64>,
        page_token: Option<&str>,
        mut render: impl FnMut(&'a T) -> Result<Value>,
    ) -> Result<SearchResponse> {
        let page_size = self.limits.page_size(page_size)?;
        let paged = Paged::new(rows, page_token)?;
        ResponseBuilder::new(table, page_size, self.limits.max_response_length)
            .fill(paged.map(|(row, token)| render(row).map(|value| (value, token))))
    }

    // ------------------------------------------------------------------
    // Clinical tables
    // ------------------------------------------------------------------

    /// Filtered search over one clinical table, redacted at the caller's tier.
    pub fn search_clinical(
        &self,
        kind: ClinicalKind,
        request: &SearchRequest,
        access: &AccessMap,
    ) -> Result<SearchResponse> {
        let dataset_id = require(request.dataset_id.as_deref(), "datasetId")?;
        let (dataset, tier) = self.authorize(dataset_id, access)?;
        let filters = Filter::validate_all(&request.filters)?;
        for filter in &filters {
            filter.check_field(kind)?;
        }

        let mut matched: Vec<&ClinicalRecord> = Vec::new();
        for record in self.repo.clinical(kind).list(&dataset.name) {
            if matches_all(&filters, &TieredView { record, tier })? {
                matched.push(record);
            }
        }
        debug!(
            table = kind.table(),
            dataset = %dataset.name,
            tier = %tier,
            filters = filters.len(),
            matched = matched.len(),
            "Clinical search"
        );

        let redactor = FieldRedactor::new(tier);
        self.page(
            kind.table(),
            &matched,
            request.page_size,
            request.page_token.as_deref(),
            |record| Ok(Value::Object(redactor.redact(record))),
        )
    }

    /// Point lookup of a clinical record, redacted at the caller's tier.
    pub fn get_clinical(&self, kind: ClinicalKind, id: &str, access: &AccessMap) -> Result<Value> {
        let not_found = || QueryError::NotFound(format!("{} '{id}'", kind.table()));
        let id = CompoundId::parse(id).map_err(|_| not_found())?;
        let record = self.repo.clinical(kind).get(&id).map_err(|_| not_found())?;
        let (_, tier) = self.authorize(&record.dataset, access)?;
        Ok(Value::Object(FieldRedactor::new(tier).redact(record)))
    }

    /// Every patient key visible to the caller in a dataset, in table order.
    pub fn patient_keys(&self, dataset_id: &str, access: &AccessMap) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut request = SearchRequest::new(dataset_id);
        loop {
            let page = self.search_clinical(ClinicalKind::Patients, &request, access)?;
            keys.extend(
                page.records
                    .iter()
                    .filter_map(|r| r.get(PATIENT_KEY))
                    .filter_map(patient_key_of),
            );
            match page.next_page_token {
                Some(token) => request.page_token = Some(token),
                None => return Ok(keys),
            }
        }
    }

    // ------------------------------------------------------------------
    // Variants
    // ------------------------------------------------------------------

    fn variant_sets_for(
        &self,
        dataset_id: Option<&str>,
        variant_set_ids: Option<&[String]>,
        access: &AccessMap,
    ) -> Result<Vec<&'r VariantSet>> {
        match variant_set_ids {
            Some(ids) if !ids.is_empty() => ids
                .iter()
                .map(|raw| {
                    let id = CompoundId::parse(raw)
                        .map_err(|_| QueryError::NotFound(format!("variant set '{raw}'")))?;
                    let set = self.repo.variant_sets().get(&id)?;
                    self.authorize(&set.dataset, access)?;
                    Ok(set)
                })
                .collect(),
            _ => {
                let dataset_id = dataset_id.ok_or_else(|| {
                    QueryError::bad_request("one of 'datasetId' or 'variantSetIds' is required")
                })?;
                let (dataset, _) = self.authorize(dataset_id, access)?;
                Ok(self.repo.variant_sets().list(&dataset.name).collect())
            }
        }
    }

    fn render_variant(variant: &Variant, owner: Option<&VariantSet>) -> Result<Value> {
        let mut value = to_json(variant)?;
        if let (Some(set), Value::Object(map)) = (owner, &mut value) {
            if let Some(patient) = &set.patient_id {
                map.insert(PATIENT_KEY.to_string(), Value::String(patient.clone()));
            }
        }
        Ok(value)
    }

    /// Variants overlapping `[start, end)` on a reference.
    pub fn search_variants(&self, request: &VariantSearchRequest, access: &AccessMap) -> Result<SearchResponse> {
        let reference_name = require(request.reference_name.as_deref(), "referenceName")?;
        let (start, end) = match (request.start, request.end) {
            (Some(s), Some(e)) if s <= e => (s, e),
            (Some(_), Some(_)) => return Err(QueryError::bad_request("'start' must not exceed 'end'")),
            _ => return Err(QueryError::bad_request("'start' and 'end' are required")),
        };

        let patients: Option<HashSet<&str>> = request
            .patient_list
            .as_ref()
            .map(|l| l.iter().map(String::as_str).collect());
        let sets = self.variant_sets_for(
            request.dataset_id.as_deref(),
            request.variant_set_ids.as_deref(),
            access,
        )?;

        let matched: Vec<(&VariantSet, &Variant)> = sets
            .into_iter()
            .filter(|set| owned_by_any(set, patients.as_ref()))
            .flat_map(|set| {
                set.variants
                    .iter()
                    .filter(move |v| v.overlaps(reference_name, start, end))
                    .map(move |v| (set, v))
            })
            .collect();

        let decorate = patients.is_some();
        self.page(
            GenomicKind::Variants.table(),
            &matched,
            request.page_size,
            request.page_token.as_deref(),
            |(set, variant)| Self::render_variant(variant, decorate.then_some(*set)),
        )
    }

    /// Variants falling in any feature whose gene symbol matches.
    pub fn search_variants_by_gene(&self, request: &GeneSearchRequest, access: &AccessMap) -> Result<SearchResponse> {
        let gene = require(request.gene.as_deref(), "gene")?;
        let dataset_id = require(request.dataset_id.as_deref(), "datasetId")?;
        let (dataset, _) = self.authorize(dataset_id, access)?;

        let patients: Option<HashSet<&str>> = request
            .patient_list
            .as_ref()
            .map(|l| l.iter().map(String::as_str).collect());
        let sets: Vec<&VariantSet> = self
            .repo
            .variant_sets()
            .list(&dataset.name)
            .filter(|set| owned_by_any(set, patients.as_ref()))
            .collect();

        let mut seen = HashSet::new();
        let mut matched: Vec<(&VariantSet, &Variant)> = Vec::new();
        let features = self
            .repo
            .feature_sets()
            .list(&dataset.name)
            .flat_map(|fs| fs.features.iter())
            .filter(|f| f.gene_symbol.as_deref() == Some(gene));
        for feature in features {
            for set in &sets {
                for variant in &set.variants {
                    if variant.overlaps(&feature.reference_name, feature.start, feature.end)
                        && seen.insert(&variant.id)
                    {
                        matched.push((set, variant));
                    }
                }
            }
        }
        debug!(dataset = %dataset.name, gene = %gene, matched = matched.len(), "Gene search");

        self.page(
            GenomicKind::Variants.table(),
            &matched,
            request.page_size,
            request.page_token.as_deref(),
            |(set, variant)| Self::render_variant(variant, Some(*set)),
        )
    }

    pub fn get_variant(&self, id: &str, access: &AccessMap) -> Result<Value> {
        let id = parse_or_not_found(id, GenomicKind::Variants)?;
        let variant = self.repo.variant(&id)?;
        self.authorize(id.dataset_name(), access)?;
        to_json(variant)
    }

    // ------------------------------------------------------------------
    // Catalogue listings
    // ------------------------------------------------------------------

    pub fn search_variant_sets(&self, request: &DatasetScopedRequest, access: &AccessMap) -> Result<SearchResponse> {
        let dataset_id = require(request.dataset_id.as_deref(), "datasetId")?;
        let (dataset, _) = self.authorize(dataset_id, access)?;
        let rows: Vec<_> = self.repo.variant_sets().list(&dataset.name).collect();
        self.page(
            GenomicKind::VariantSets.table(),
            &rows,
            request.page_size,
            request.page_token.as_deref(),
            |set| to_json(set),
        )
    }

    pub fn search_read_group_sets(&self, request: &DatasetScopedRequest, access: &AccessMap) -> Result<SearchResponse> {
        let dataset_id = require(request.dataset_id.as_deref(), "datasetId")?;
        let (dataset, _) = self.authorize(dataset_id, access)?;
        let rows: Vec<_> = self.repo.read_group_sets().list(&dataset.name).collect();
        self.page(
            GenomicKind::ReadGroupSets.table(),
            &rows,
            request.page_size,
            request.page_token.as_deref(),
            |set| to_json(set),
        )
    }

    pub fn search_feature_sets(&self, request: &DatasetScopedRequest, access: &AccessMap) -> Result<SearchResponse> {
        let dataset_id = require(request.dataset_id.as_deref(), "datasetId")?;
        let (dataset, _) = self.authorize(dataset_id, access)?;
        let rows: Vec<_> = self.repo.feature_sets().list(&dataset.name).collect();
        self.page(
            GenomicKind::FeatureSets.table(),
            &rows,
            request.page_size,
            request.page_token.as_deref(),
            |set| to_json(set),
        )
    }

    pub fn search_features(&self, request: &FeatureSearchRequest, access: &AccessMap) -> Result<SearchResponse> {
        let raw = require(request.feature_set_id.as_deref(), "featureSetId")?;
        let id = parse_or_not_found(raw, GenomicKind::FeatureSets)?;
        let set = self.repo.feature_sets().get(&id)?;
        self.authorize(&set.dataset, access)?;

        let start = request.start.unwrap_or(0);
        let end = request.end.unwrap_or(u64::MAX);
        let rows: Vec<_> = set
            .features
            .iter()
            .filter(|f| {
                request
                    .gene_symbol
                    .as_deref()
                    .is_none_or(|g| f.gene_symbol.as_deref() == Some(g))
            })
            .filter(|f| {
                request.reference_name.as_deref().is_none_or(|r| {
                    cohort_store::strip_chr(&f.reference_name) == cohort_store::strip_chr(r)
                })
            })
            .filter(|f| f.start < end && f.end > start)
            .collect();
        self.page(
            GenomicKind::Features.table(),
            &rows,
            request.page_size,
            request.page_token.as_deref(),
            |feature| to_json(feature),
        )
    }

    /// Reference sets are shared catalogue data and need no dataset access.
    pub fn search_reference_sets(&self, request: &ListRequest) -> Result<SearchResponse> {
        let rows: Vec<_> = self.repo.reference_sets().iter().collect();
        self.page(
            GenomicKind::ReferenceSets.table(),
            &rows,
            request.page_size,
            request.page_token.as_deref(),
            |set| to_json(set),
        )
    }

    /// Datasets named in the caller's access map.
    pub fn search_datasets(&self, request: &ListRequest, access: &AccessMap) -> Result<SearchResponse> {
        let rows: Vec<_> = self
            .repo
            .datasets()
            .iter()
            .filter(|d| access.contains(&d.name))
            .collect();
        self.page(
            GenomicKind::Datasets.table(),
            &rows,
            request.page_size,
            request.page_token.as_deref(),
            |dataset| to_json(dataset),
        )
    }

    /// Point lookup of a non-clinical entity.
    pub fn get_genomic(&self, kind: GenomicKind, id: &str, access: &AccessMap) -> Result<Value> {
        if kind == GenomicKind::Variants {
            return self.get_variant(id, access);
        }
        let id = parse_or_not_found(id, kind)?;
        if kind == GenomicKind::ReferenceSets {
            return to_json(self.repo.reference_sets().get(&id)?);
        }
        if kind == GenomicKind::Features {
            let feature = self.repo.feature(&id)?;
            self.authorize(id.dataset_name(), access)?;
            return to_json(feature);
        }

        self.authorize(id.dataset_name(), access)?;
        match kind {
            GenomicKind::Datasets => to_json(self.repo.dataset(id.as_str())?),
            GenomicKind::VariantSets => to_json(self.repo.variant_sets().get(&id)?),
            GenomicKind::ReadGroupSets => to_json(self.repo.read_group_sets().get(&id)?),
            GenomicKind::FeatureSets => to_json(self.repo.feature_sets().get(&id)?),
            GenomicKind::Variants | GenomicKind::Features | GenomicKind::ReferenceSets => {
                Err(QueryError::NotFound(id.to_string()))
            }
        }
    }
}

fn owned_by_any(set: &VariantSet, patients: Option<&HashSet<&str>>) -> bool {
    patients.is_none_or(|p| set.patient_id.as_deref().is_some_and(|id| p.contains(id)))
}

fn parse_or_not_found(raw: &str, kind: GenomicKind) -> Result<CompoundId> {
    CompoundId::parse(raw).map_err(|_| QueryError::NotFound(format!("{kind} '{raw}'")))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| QueryError::Internal(e.to_string()))
}

/// Reads a patient key out of a JSON value.
pub(crate) fn patient_key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
