//! Compound queries.
//!
//! A compound query names a set of per-table component searches, a boolean
//! logic tree over the component ids, and a result table. Evaluation runs in
//! three phases:
//!
//! 1. **Components.** Each component runs through a [`SearchExecutor`] and its
//!    page-token chain is followed to completion. Every record yields a
//!    patient key.
//! 2. **Logic.** The tree is reduced over sets of patient keys. Negated
//!    leaves subtract from the local dataset's full patient list, computed at
//!    most once per query.
//! 3. **Projection.** The result table is searched locally, restricted to the
//!    selected patients, then optionally projected to a field list or
//!    aggregated into counts.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use cohort_types::{AccessMap, ClinicalKind, CompoundId, PATIENT_KEY, ResultTable};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::aggregate::{count_fields, counts_to_json, project_fields};
use crate::dp;
use crate::error::{QueryError, Result};
use crate::filter::RawFilter;
use crate::request::{GeneSearchRequest, SearchRequest, VariantSearchRequest, parse_body};
use crate::response::SearchResponse;
use crate::search::{SearchEngine, patient_key_of};

/// Whether a compound query returns records or counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Search,
    Count,
}

/// Genomic region of a variant search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
}

/// What one component searches for.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentSpec {
    Clinical {
        kind: ClinicalKind,
        filters: Vec<RawFilter>,
    },
    Variants {
        region: Region,
        variant_set_ids: Option<Vec<String>>,
    },
    VariantsByGene {
        gene: String,
    },
}

impl ComponentSpec {
    pub fn table(&self) -> ResultTable {
        match self {
            Self::Clinical { kind, .. } => ResultTable::Clinical(*kind),
            Self::Variants { .. } => ResultTable::Variants,
            Self::VariantsByGene { .. } => ResultTable::VariantsByGene,
        }
    }

    /// The per-table search body for this component.
    pub fn request_body(&self, dataset_id: &str) -> Value {
        match self {
            Self::Clinical { filters, .. } => json!({
                "datasetId": dataset_id,
                "filters": filters,
            }),
            Self::Variants {
                region,
                variant_set_ids: Some(ids),
            } => json!({
                "variantSetIds": ids,
                "referenceName": region.reference_name,
                "start": region.start,
                "end": region.end,
            }),
            Self::Variants { region, .. } => json!({
                "datasetId": dataset_id,
                "referenceName": region.reference_name,
                "start": region.start,
                "end": region.end,
            }),
            Self::VariantsByGene { gene } => json!({
                "datasetId": dataset_id,
                "gene": gene,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: String,
    pub spec: ComponentSpec,
}

/// Boolean tree over component ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Logic {
    And(Vec<Logic>),
    Or(Vec<Logic>),
    Leaf { id: String, negate: bool },
}

impl Logic {
    pub fn leaf(id: &str) -> Self {
        Self::Leaf {
            id: id.to_string(),
            negate: false,
        }
    }

    pub fn not(id: &str) -> Self {
        Self::Leaf {
            id: id.to_string(),
            negate: true,
        }
    }

    pub fn has_negation(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.iter().any(Self::has_negation),
            Self::Leaf { negate, .. } => *negate,
        }
    }

    fn parse(value: &Value, ids: &HashSet<&str>) -> Result<Self> {
        let invalid = |msg: &str| QueryError::InvalidLogic(msg.to_string());
        let map = value.as_object().ok_or_else(|| invalid("logic node must be an object"))?;

        match map.len() {
            1 => {
                let (key, operand) = map.iter().next().ok_or_else(|| invalid("empty logic node"))?;
                match key.as_str() {
                    "and" | "or" => {
                        let children = operand
                            .as_array()
                            .filter(|c| !c.is_empty())
                            .ok_or_else(|| invalid("'and'/'or' require a non-empty list"))?
                            .iter()
                            .map(|c| Self::parse(c, ids))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(if key == "and" {
                            Self::And(children)
                        } else {
                            Self::Or(children)
                        })
                    }
                    "id" => Self::parse_leaf(operand, false, ids),
                    other => Err(QueryError::InvalidLogic(format!("invalid key '{other}'"))),
                }
            }
            2 => {
                let (Some(id), Some(negate)) = (map.get("id"), map.get("negate")) else {
                    return Err(invalid("invalid key combination"));
                };
                let negate = negate.as_bool().ok_or_else(|| invalid("'negate' must be a boolean"))?;
                Self::parse_leaf(id, negate, ids)
            }
            _ => Err(invalid("invalid number of keys")),
        }
    }

    fn parse_leaf(id: &Value, negate: bool, ids: &HashSet<&str>) -> Result<Self> {
        let id = id
            .as_str()
            .ok_or_else(|| QueryError::InvalidLogic("'id' must be a string".to_string()))?;
        if !ids.contains(id) {
            return Err(QueryError::InvalidLogic(format!(
                "id '{id}' does not match a component"
            )));
        }
        Ok(Self::Leaf {
            id: id.to_string(),
            negate,
        })
    }
}

/// The `results[0]` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSpec {
    pub table: ResultTable,
    pub fields: Option<Vec<String>>,
    pub region: Option<Region>,
    pub gene: Option<String>,
}

impl ResultSpec {
    pub fn new(table: ResultTable) -> Self {
        Self {
            table,
            fields: None,
            region: None,
            gene: None,
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// A validated compound query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundQuery {
    pub dataset_id: String,
    pub components: Vec<Component>,
    pub logic: Logic,
    pub results: ResultSpec,
    pub mode: Mode,
    pub page_token: Option<String>,
}

impl CompoundQuery {
    /// Parses and validates a request body.
    pub fn parse(body: &[u8], mode: Mode) -> Result<Self> {
        let value: Value = parse_body(body)?;
        Self::from_value(&value, mode)
    }

    pub fn from_value(value: &Value, mode: Mode) -> Result<Self> {
        let body = value
            .as_object()
            .ok_or_else(|| QueryError::bad_request("compound query must be an object"))?;
        let dataset_id = body
            .get("datasetId")
            .or_else(|| body.get("dataset_id"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| QueryError::missing("datasetId"))?
            .to_string();
        let raw_logic = body.get("logic").ok_or_else(|| QueryError::missing("logic"))?;
        let raw_components = body
            .get("components")
            .ok_or_else(|| QueryError::missing("components"))?
            .as_array()
            .ok_or_else(|| QueryError::bad_request("'components' must be a list"))?;
        let raw_results = body.get("results").ok_or_else(|| QueryError::missing("results"))?;

        let components = raw_components
            .iter()
            .map(parse_component)
            .collect::<Result<Vec<_>>>()?;
        let mut ids = HashSet::new();
        for component in &components {
            if !ids.insert(component.id.as_str()) {
                return Err(QueryError::bad_request(format!(
                    "duplicate component id '{}'",
                    component.id
                )));
            }
        }

        let logic = Logic::parse(raw_logic, &ids)?;
        let results = parse_results(raw_results, mode)?;
        let page_token = body
            .get("pageToken")
            .or_else(|| body.get("page_token"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(Self {
            dataset_id,
            components,
            logic,
            results,
            mode,
            page_token,
        })
    }
}

fn parse_component(value: &Value) -> Result<Component> {
    let map = value
        .as_object()
        .filter(|m| m.len() == 2)
        .ok_or_else(|| QueryError::missing("component requires 'id' and one table key"))?;
    let id = map
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| QueryError::missing("component requires 'id' and one table key"))?
        .to_string();
    let (table_name, spec) = map
        .iter()
        .find(|(k, _)| k.as_str() != "id")
        .ok_or_else(|| QueryError::missing("component requires a table key"))?;
    let table = ResultTable::parse(table_name)
        .ok_or_else(|| QueryError::missing(format!("unsupported component table '{table_name}'")))?;
    let spec = spec
        .as_object()
        .ok_or_else(|| QueryError::bad_request(format!("component '{id}' must hold an object")))?;

    let spec = match table {
        ResultTable::Clinical(kind) => ComponentSpec::Clinical {
            kind,
            filters: match spec.get("filters") {
                Some(filters) => serde_json::from_value(filters.clone())?,
                None => Vec::new(),
            },
        },
        ResultTable::Variants => ComponentSpec::Variants {
            region: parse_region(spec)?.ok_or_else(|| {
                QueryError::missing("variants component requires 'start', 'end' and 'referenceName'")
            })?,
            variant_set_ids: match spec.get("variantSetIds") {
                Some(ids) => Some(serde_json::from_value(ids.clone())?),
                None => None,
            },
        },
        ResultTable::VariantsByGene => ComponentSpec::VariantsByGene {
            gene: parse_gene(spec)?.ok_or_else(|| QueryError::missing("gene"))?,
        },
    };
    Ok(Component { id, spec })
}

fn parse_region(map: &Map<String, Value>) -> Result<Option<Region>> {
    let (Some(start), Some(end), Some(reference_name)) =
        (map.get("start"), map.get("end"), map.get("referenceName"))
    else {
        return Ok(None);
    };
    Ok(Some(Region {
        reference_name: serde_json::from_value(reference_name.clone())?,
        start: parse_position(start)?,
        end: parse_position(end)?,
    }))
}

/// Positions arrive as numbers or as decimal strings.
fn parse_position(value: &Value) -> Result<u64> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| QueryError::bad_request(format!("invalid position '{s}'"))),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

fn parse_gene(map: &Map<String, Value>) -> Result<Option<String>> {
    match map.get("gene") {
        None => Ok(None),
        Some(gene) => Ok(Some(serde_json::from_value(gene.clone())?)),
    }
}

fn parse_results(value: &Value, mode: Mode) -> Result<ResultSpec> {
    let first = value
        .as_array()
        .and_then(|r| r.first())
        .and_then(Value::as_object)
        .ok_or_else(|| QueryError::missing("results"))?;

    let fields: Option<Vec<String>> = match first.get("fields") {
        Some(fields) => Some(serde_json::from_value(fields.clone())?),
        None => None,
    };
    let fields = fields.filter(|f| !f.is_empty());
    if mode == Mode::Count && fields.is_none() {
        return Err(QueryError::missing("fields list required for count query"));
    }

    let name = first
        .get("table")
        .and_then(Value::as_str)
        .ok_or_else(|| QueryError::missing("table"))?;
    let table = ResultTable::parse(name)
        .ok_or_else(|| QueryError::missing(format!("invalid results table '{name}'")))?;

    let region = parse_region(first)?;
    let gene = parse_gene(first)?;
    match table {
        ResultTable::Variants if region.is_none() => {
            return Err(QueryError::missing(
                "variants results require 'start', 'end' and 'referenceName'",
            ));
        }
        ResultTable::VariantsByGene if gene.is_none() => {
            return Err(QueryError::missing("gene"));
        }
        _ => {}
    }

    Ok(ResultSpec {
        table,
        fields,
        region,
        gene,
    })
}

// ============================================================================
// Execution
// ============================================================================

/// Runs one per-table search for a component.
///
/// The server routes these through the federation dispatcher when configured
/// to; [`LocalExecutor`] runs them against the local repository.
pub trait SearchExecutor {
    fn search(&self, table: ResultTable, body: Value) -> impl Future<Output = Result<SearchResponse>> + Send;
}

/// Executes component searches against the local repository.
#[derive(Debug, Clone, Copy)]
pub struct LocalExecutor<'a> {
    engine: SearchEngine<'a>,
    access: &'a AccessMap,
}

impl<'a> LocalExecutor<'a> {
    pub fn new(engine: SearchEngine<'a>, access: &'a AccessMap) -> Self {
        Self { engine, access }
    }

    /// Runs a per-table search for `table` with a JSON body.
    pub fn run(&self, table: ResultTable, body: &Value) -> Result<SearchResponse> {
        let bytes = serde_json::to_vec(body).map_err(|e| QueryError::Internal(e.to_string()))?;
        match table {
            ResultTable::Clinical(kind) => {
                let request: SearchRequest = parse_body(&bytes)?;
                self.engine.search_clinical(kind, &request, self.access)
            }
            ResultTable::Variants => {
                let request: VariantSearchRequest = parse_body(&bytes)?;
                self.engine.search_variants(&request, self.access)
            }
            ResultTable::VariantsByGene => {
                let request: GeneSearchRequest = parse_body(&bytes)?;
                self.engine.search_variants_by_gene(&request, self.access)
            }
        }
    }
}

impl SearchExecutor for LocalExecutor<'_> {
    fn search(&self, table: ResultTable, body: Value) -> impl Future<Output = Result<SearchResponse>> + Send {
        std::future::ready(self.run(table, &body))
    }
}

/// Evaluates compound queries for one caller.
pub struct CompoundEvaluator<'a, E> {
    engine: SearchEngine<'a>,
    access: &'a AccessMap,
    executor: &'a E,
    dp_epsilon: Option<f64>,
}

impl<'a, E: SearchExecutor> CompoundEvaluator<'a, E> {
    pub fn new(engine: SearchEngine<'a>, access: &'a AccessMap, executor: &'a E) -> Self {
        Self {
            engine,
            access,
            executor,
            dp_epsilon: None,
        }
    }

    /// Enables noise on count responses.
    pub fn with_dp_epsilon(mut self, epsilon: Option<f64>) -> Self {
        self.dp_epsilon = epsilon;
        self
    }

    /// Runs all three phases.
    pub async fn evaluate(&self, query: &CompoundQuery) -> Result<SearchResponse> {
        // fail before any component runs
        self.engine.authorize(&query.dataset_id, self.access)?;

        let patients = self.select_patients(query).await?;
        info!(
            dataset = %query.dataset_id,
            components = query.components.len(),
            patients = patients.len(),
            table = %query.results.table,
            mode = ?query.mode,
            "Compound query"
        );
        self.project(query, patients)
    }

    /// Phases 1 and 2: the patient keys selected by the logic tree.
    pub async fn select_patients(&self, query: &CompoundQuery) -> Result<HashSet<String>> {
        let mut keys: HashMap<&str, HashSet<String>> = HashMap::new();
        for component in &query.components {
            let records = self.collect_component(&query.dataset_id, component).await?;
            let set = records
                .iter()
                .map(|r| self.patient_key(r))
                .collect::<Result<HashSet<_>>>()?;
            debug!(component = %component.id, records = records.len(), patients = set.len(), "Component done");
            keys.insert(component.id.as_str(), set);
        }

        let universe = if query.logic.has_negation() {
            Some(
                self.engine
                    .patient_keys(&query.dataset_id, self.access)?
                    .into_iter()
                    .collect::<HashSet<_>>(),
            )
        } else {
            None
        };
        reduce(&query.logic, &keys, universe.as_ref())
    }

    async fn collect_component(&self, dataset_id: &str, component: &Component) -> Result<Vec<Value>> {
        let table = component.spec.table();
        let base = component.spec.request_body(dataset_id);
        let mut records = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut body = base.clone();
            if let (Some(t), Value::Object(map)) = (&token, &mut body) {
                map.insert("pageToken".to_string(), Value::String(t.clone()));
            }
            let page = self.executor.search(table, body).await?;
            records.extend(page.records);
            match page.next_page_token {
                Some(next) if token.as_ref() == Some(&next) => {
                    return Err(QueryError::Internal(format!(
                        "page token '{next}' did not advance for component '{}'",
                        component.id
                    )));
                }
                Some(next) => token = Some(next),
                None => return Ok(records),
            }
        }
    }

    /// `patientId` of a record, or of the variant set owning a variant.
    fn patient_key(&self, record: &Value) -> Result<String> {
        if let Some(key) = record.get(PATIENT_KEY).and_then(patient_key_of) {
            return Ok(key);
        }
        let set_id = record
            .get("variantSetId")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::bad_request("record carries no patientId"))?;
        let id = CompoundId::parse(set_id)
            .map_err(|_| QueryError::bad_request(format!("invalid variant set id '{set_id}'")))?;
        self.engine
            .repository()
            .variant_sets()
            .get(&id)
            .ok()
            .and_then(|set| set.patient_id.clone())
            .ok_or_else(|| QueryError::bad_request(format!("variant set '{set_id}' has no patientId")))
    }

    /// Phase 3.
    fn project(&self, query: &CompoundQuery, patients: HashSet<String>) -> Result<SearchResponse> {
        let spec = &query.results;
        let key = spec.table.response_key();
        if patients.is_empty() {
            return Ok(SearchResponse::empty(key));
        }

        let mut patient_list: Vec<String> = patients.into_iter().collect();
        patient_list.sort();
        let dataset_id = Some(query.dataset_id.clone());
        let page_token = query.page_token.clone();

        let mut response = match spec.table {
            ResultTable::Clinical(kind) => {
                let request = SearchRequest {
                    dataset_id,
                    filters: vec![RawFilter::one_of(PATIENT_KEY, patient_list)],
                    page_size: None,
                    page_token,
                };
                self.engine.search_clinical(kind, &request, self.access)?
            }
            ResultTable::Variants => {
                let region = spec
                    .region
                    .as_ref()
                    .ok_or_else(|| QueryError::missing("referenceName"))?;
                let request = VariantSearchRequest {
                    dataset_id,
                    reference_name: Some(region.reference_name.clone()),
                    start: Some(region.start),
                    end: Some(region.end),
                    patient_list: Some(patient_list),
                    page_token,
                    ..VariantSearchRequest::default()
                };
                self.engine.search_variants(&request, self.access)?
            }
            ResultTable::VariantsByGene => {
                let request = GeneSearchRequest {
                    dataset_id,
                    gene: spec.gene.clone(),
                    patient_list: Some(patient_list),
                    page_size: None,
                    page_token,
                };
                self.engine.search_variants_by_gene(&request, self.access)?
            }
        };
        response.table = key.to_string();

        match (query.mode, &spec.fields) {
            (Mode::Count, Some(fields)) => {
                let mut counts = count_fields(&response.records, fields);
                if let Some(epsilon) = self.dp_epsilon {
                    counts = dp::privatize(counts, epsilon);
                }
                response.records = match counts_to_json(&counts) {
                    Value::Array(items) => items,
                    _ => Vec::new(),
                };
            }
            (Mode::Search, Some(fields)) => {
                response.records = project_fields(std::mem::take(&mut response.records), fields);
            }
            (Mode::Count, None) => {
                return Err(QueryError::missing("fields list required for count query"));
            }
            (Mode::Search, None) => {}
        }
        Ok(response)
    }
}

/// Reduces a logic tree over per-component key sets.
fn reduce(
    logic: &Logic,
    keys: &HashMap<&str, HashSet<String>>,
    universe: Option<&HashSet<String>>,
) -> Result<HashSet<String>> {
    match logic {
        Logic::Leaf { id, negate } => {
            let set = keys
                .get(id.as_str())
                .ok_or_else(|| QueryError::InvalidLogic(format!("id '{id}' does not match a component")))?;
            if !negate {
                return Ok(set.clone());
            }
            let universe =
                universe.ok_or_else(|| QueryError::Internal("negation without patient list".to_string()))?;
            Ok(universe.difference(set).cloned().collect())
        }
        Logic::Or(children) => {
            let mut union = HashSet::new();
            for child in children {
                union.extend(reduce(child, keys, universe)?);
            }
            Ok(union)
        }
        Logic::And(children) => {
            let mut sets = children
                .iter()
                .map(|c| reduce(c, keys, universe))
                .collect::<Result<Vec<_>>>()?;
            sets.sort_by_key(HashSet::len);
            let Some((smallest, rest)) = sets.split_first_mut() else {
                return Ok(HashSet::new());
            };
            Ok(std::mem::take(smallest)
                .into_iter()
                .filter(|k| rest.iter().all(|s| s.contains(k)))
                .collect())
        }
    }
}
