//! Compound query evaluation end to end against the local executor.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;

use cohort_query::{
    CompoundEvaluator, CompoundQuery, Limits, LocalExecutor, Mode, Result, SearchEngine,
    SearchExecutor, SearchResponse,
};
use cohort_store::{ClinicalDraft, Repository, RepositoryBuilder, VariantDraft, VariantSetDraft};
use cohort_types::{AccessMap, ClinicalKind, ResultTable, Tier};
use serde_json::{Value, json};

/// Six patients. Breast diagnoses: p1 p2 p3 p5. Radiation: p2 p3 p4.
fn repo() -> Repository {
    let mut builder = RepositoryBuilder::new().dataset("D1");
    for p in ["p1", "p2", "p3", "p4", "p5", "p6"] {
        builder = builder.clinical("D1", ClinicalKind::Patients, ClinicalDraft::new(p).with("patientId", p));
    }
    let diagnoses = [
        ("d1", "p1", "breast", "I"),
        ("d2", "p2", "breast", "II"),
        ("d3", "p3", "breast", "II"),
        ("d4", "p3", "lung", "III"),
        ("d5", "p5", "breast", "I"),
        ("d6", "p6", "lung", "I"),
    ];
    for (name, patient, cancer, grade) in diagnoses {
        builder = builder.clinical(
            "D1",
            ClinicalKind::Diagnoses,
            ClinicalDraft::new(name)
                .with("patientId", patient)
                .with("cancerType", cancer)
                .with("tumorGrade", grade),
        );
    }
    for (name, patient, modality) in [("t1", "p2", "radiation"), ("t2", "p3", "radiation"), ("t3", "p4", "radiation"), ("t4", "p1", "surgery")] {
        builder = builder.clinical(
            "D1",
            ClinicalKind::Treatments,
            ClinicalDraft::new(name)
                .with("patientId", patient)
                .with("therapeuticModality", modality),
        );
    }
    builder
        .variant_set(
            "D1",
            VariantSetDraft::new("vs-p3")
                .owned_by("p3", "s3")
                .variant(VariantDraft::new("1", 100, 101)),
        )
        .variant_set(
            "D1",
            VariantSetDraft::new("vs-p4")
                .owned_by("p4", "s4")
                .variant(VariantDraft::new("1", 120, 121))
                .variant(VariantDraft::new("2", 120, 121)),
        )
        .build()
        .unwrap()
}

fn access() -> AccessMap {
    AccessMap::new().with("D1", Tier::MAX)
}

fn components() -> Value {
    json!([
        {"id": "c1", "diagnoses": {"filters": [{"field": "cancerType", "operator": "=", "value": "breast"}]}},
        {"id": "c2", "treatments": {"filters": [{"field": "therapeuticModality", "operator": "=", "value": "radiation"}]}}
    ])
}

fn query(logic: Value, results: Value, mode: Mode) -> CompoundQuery {
    let body = json!({
        "datasetId": "D1",
        "components": components(),
        "logic": logic,
        "results": results,
    });
    CompoundQuery::from_value(&body, mode).unwrap()
}

async fn run(repo: &Repository, query: &CompoundQuery) -> Result<SearchResponse> {
    let engine = SearchEngine::new(repo, Limits::default());
    let access = access();
    let executor = LocalExecutor::new(engine, &access);
    CompoundEvaluator::new(engine, &access, &executor).evaluate(query).await
}

async fn patients(repo: &Repository, logic: Value) -> HashSet<String> {
    let engine = SearchEngine::new(repo, Limits::default());
    let access = access();
    let executor = LocalExecutor::new(engine, &access);
    let query = query(logic, json!([{"table": "patients"}]), Mode::Search);
    CompoundEvaluator::new(engine, &access, &executor)
        .select_patients(&query)
        .await
        .unwrap()
}

fn set(keys: &[&str]) -> HashSet<String> {
    keys.iter().map(|k| (*k).to_string()).collect()
}

#[tokio::test]
async fn test_and_projects_patients_in_repository_order() {
    let repo = repo();
    let q = query(
        json!({"and": [{"id": "c1"}, {"id": "c2"}]}),
        json!([{"table": "patients"}]),
        Mode::Search,
    );
    let response = run(&repo, &q).await.unwrap();
    assert_eq!(response.table, "patients");
    let ids: Vec<_> = response.records.iter().map(|r| r["patientId"].clone()).collect();
    assert_eq!(ids, vec![json!("p2"), json!("p3")]);
}

#[tokio::test]
async fn test_count_aggregates_projected_table() {
    let repo = repo();
    let q = query(
        json!({"and": [{"id": "c1"}, {"id": "c2"}]}),
        json!([{"table": "diagnoses", "fields": ["tumorGrade"]}]),
        Mode::Count,
    );
    let response = run(&repo, &q).await.unwrap();
    assert_eq!(
        response.to_json(),
        json!({"diagnoses": [{"tumorGrade": {"II": 2, "III": 1}}]})
    );
}

#[tokio::test]
async fn test_field_projection() {
    let repo = repo();
    let q = query(
        json!({"id": "c2"}),
        json!([{"table": "treatments", "fields": ["patientId"]}]),
        Mode::Search,
    );
    let response = run(&repo, &q).await.unwrap();
    assert_eq!(
        response.records,
        vec![json!({"patientId": "p2"}), json!({"patientId": "p3"}), json!({"patientId": "p4"})]
    );
}

#[tokio::test]
async fn test_set_algebra() {
    let repo = repo();
    let c1 = patients(&repo, json!({"id": "c1"})).await;
    let c2 = patients(&repo, json!({"id": "c2"})).await;
    assert_eq!(c1, set(&["p1", "p2", "p3", "p5"]));
    assert_eq!(c2, set(&["p2", "p3", "p4"]));

    assert_eq!(patients(&repo, json!({"and": [{"id": "c1"}]})).await, c1);
    assert_eq!(
        patients(&repo, json!({"and": [{"id": "c1"}, {"id": "c2"}]})).await,
        c1.intersection(&c2).cloned().collect()
    );
    assert_eq!(
        patients(&repo, json!({"or": [{"id": "c1"}, {"id": "c2"}]})).await,
        c1.union(&c2).cloned().collect()
    );
    assert_eq!(
        patients(&repo, json!({"id": "c1", "negate": true})).await,
        set(&["p4", "p6"])
    );
    assert_eq!(
        patients(&repo, json!({"and": [{"id": "c2"}, {"id": "c1", "negate": true}]})).await,
        set(&["p4"])
    );
}

#[tokio::test]
async fn test_empty_selection_short_circuits() {
    let repo = repo();
    let q = query(
        json!({"and": [{"id": "c2"}, {"id": "c2", "negate": true}]}),
        json!([{"table": "diagnoses", "fields": ["tumorGrade"]}]),
        Mode::Count,
    );
    let response = run(&repo, &q).await.unwrap();
    assert_eq!(response.to_json(), json!({"diagnoses": []}));
}

#[tokio::test]
async fn test_variant_components_join_through_variant_sets() {
    let repo = repo();
    let body = json!({
        "datasetId": "D1",
        "components": [
            {"id": "v", "variants": {"referenceName": "1", "start": 0, "end": 1000}},
            {"id": "c1", "diagnoses": {"filters": [{"field": "cancerType", "operator": "=", "value": "breast"}]}}
        ],
        "logic": {"and": [{"id": "v"}, {"id": "c1"}]},
        "results": [{"table": "variants", "referenceName": "1", "start": 0, "end": 1000}]
    });
    let q = CompoundQuery::from_value(&body, Mode::Search).unwrap();
    let response = run(&repo, &q).await.unwrap();
    assert_eq!(response.table, "variants");
    assert_eq!(response.records.len(), 1);
    assert_eq!(response.records[0]["patientId"], json!("p3"));
}

#[tokio::test]
async fn test_unauthorized_dataset() {
    let repo = repo();
    let q = query(json!({"id": "c1"}), json!([{"table": "patients"}]), Mode::Search);
    let engine = SearchEngine::new(&repo, Limits::default());
    let none = AccessMap::new();
    let executor = LocalExecutor::new(engine, &none);
    let err = CompoundEvaluator::new(engine, &none, &executor)
        .evaluate(&q)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NotAuthorized");
}

/// Serves every component in pages of one record and logs each call.
struct OneAtATime<'a> {
    inner: LocalExecutor<'a>,
    calls: Mutex<Vec<(ResultTable, Option<String>)>>,
}

impl SearchExecutor for OneAtATime<'_> {
    fn search(&self, table: ResultTable, mut body: Value) -> impl Future<Output = Result<SearchResponse>> + Send {
        let token = body.get("pageToken").and_then(Value::as_str).map(str::to_string);
        self.calls.lock().unwrap().push((table, token));
        body["pageSize"] = json!(1);
        std::future::ready(self.inner.run(table, &body))
    }
}

#[tokio::test]
async fn test_component_pages_are_followed_to_completion() {
    let repo = repo();
    let engine = SearchEngine::new(&repo, Limits::default());
    let access = access();
    let executor = OneAtATime {
        inner: LocalExecutor::new(engine, &access),
        calls: Mutex::new(Vec::new()),
    };
    let q = query(json!({"id": "c2"}), json!([{"table": "patients"}]), Mode::Search);

    let selected = CompoundEvaluator::new(engine, &access, &executor)
        .select_patients(&q)
        .await
        .unwrap();
    assert_eq!(selected, set(&["p2", "p3", "p4"]));

    let calls = executor.calls.lock().unwrap();
    let treatment_tokens: Vec<_> = calls
        .iter()
        .filter(|(t, _)| *t == ResultTable::Clinical(ClinicalKind::Treatments))
        .map(|(_, token)| token.clone())
        .collect();
    assert_eq!(
        treatment_tokens,
        vec![None, Some("1".to_string()), Some("2".to_string())]
    );
}

#[tokio::test]
async fn test_dp_keeps_cells_positive() {
    let repo = repo();
    let q = query(
        json!({"or": [{"id": "c1"}, {"id": "c2"}]}),
        json!([{"table": "diagnoses", "fields": ["tumorGrade", "cancerType"]}]),
        Mode::Count,
    );
    let engine = SearchEngine::new(&repo, Limits::default());
    let access = access();
    let executor = LocalExecutor::new(engine, &access);
    let response = CompoundEvaluator::new(engine, &access, &executor)
        .with_dp_epsilon(Some(0.5))
        .evaluate(&q)
        .await
        .unwrap();
    let counts = &response.records[0];
    for field in ["tumorGrade", "cancerType"] {
        for n in counts[field].as_object().unwrap().values() {
            assert!(n.as_u64().unwrap() >= 1);
        }
    }
}
