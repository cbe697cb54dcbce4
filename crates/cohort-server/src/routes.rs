//! HTTP handlers.
//!
//! Search and lookup handlers compute the local answer first, then hand it to
//! the [`Dispatcher`](cohort_federation::Dispatcher), which replays the
//! request to peers unless the caller sent `Federation: False`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, post};
use axum::{Json, Router};
use cohort_federation::{FEDERATION_HEADER, FederatedResponse, MergeMode, Outbound};
use cohort_query::{
    CompoundEvaluator, CompoundQuery, DatasetScopedRequest, FeatureSearchRequest, GeneSearchRequest,
    ListRequest, LocalExecutor, Mode, QueryError, SearchEngine, SearchRequest, SearchResponse,
    VariantSearchRequest, parse_body,
};
use cohort_types::{AccessMap, ClinicalKind, GenomicKind};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::executor::GatewayExecutor;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Builds the node's router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/info", get(info))
        .route("/search", post(compound_search))
        .route("/count", post(compound_count))
        .route("/variantsbygenesearch", post(search_by_gene))
        .route("/peers/list", post(list_peers))
        .route("/{kind}/search", post(search_table))
        .route("/{kind}/{id}", get(get_entity))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A table reachable under `/{kind}/...`.
#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Clinical(ClinicalKind),
    Genomic(GenomicKind),
}

impl Endpoint {
    fn parse(kind: &str) -> Result<Self, QueryError> {
        ClinicalKind::from_table(kind)
            .map(Self::Clinical)
            .or_else(|| GenomicKind::from_path(kind).map(Self::Genomic))
            .ok_or_else(|| QueryError::NotFound(format!("no endpoint for '{kind}'")))
    }

    fn search(self, engine: SearchEngine<'_>, body: &[u8], access: &AccessMap) -> cohort_query::Result<SearchResponse> {
        match self {
            Self::Clinical(kind) => engine.search_clinical(kind, &parse_body::<SearchRequest>(body)?, access),
            Self::Genomic(GenomicKind::Variants) => {
                engine.search_variants(&parse_body::<VariantSearchRequest>(body)?, access)
            }
            Self::Genomic(GenomicKind::VariantSets) => {
                engine.search_variant_sets(&parse_body::<DatasetScopedRequest>(body)?, access)
            }
            Self::Genomic(GenomicKind::ReadGroupSets) => {
                engine.search_read_group_sets(&parse_body::<DatasetScopedRequest>(body)?, access)
            }
            Self::Genomic(GenomicKind::FeatureSets) => {
                engine.search_feature_sets(&parse_body::<DatasetScopedRequest>(body)?, access)
            }
            Self::Genomic(GenomicKind::Features) => {
                engine.search_features(&parse_body::<FeatureSearchRequest>(body)?, access)
            }
            Self::Genomic(GenomicKind::ReferenceSets) => {
                engine.search_reference_sets(&parse_body::<ListRequest>(body)?)
            }
            Self::Genomic(GenomicKind::Datasets) => engine.search_datasets(&parse_body::<ListRequest>(body)?, access),
        }
    }

    fn get(self, engine: SearchEngine<'_>, id: &str, access: &AccessMap) -> cohort_query::Result<Value> {
        match self {
            Self::Clinical(kind) => engine.get_clinical(kind, id, access),
            Self::Genomic(kind) => engine.get_genomic(kind, id, access),
        }
    }
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// False only when the caller sent `Federation: False`.
pub fn federation_requested(headers: &HeaderMap) -> bool {
    headers
        .get(FEDERATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_none_or(|v| !v.trim().eq_ignore_ascii_case("false"))
}

async fn dispatch(
    state: &AppState,
    headers: &HeaderMap,
    local: cohort_query::Result<Value>,
    request: &Outbound,
    mode: MergeMode,
) -> ApiResult<Json<FederatedResponse>> {
    let federate = federation_requested(headers);
    let response = state.dispatcher().dispatch(local, request, federate, mode).await?;
    Ok(Json(response))
}

async fn search_table(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<FederatedResponse>> {
    let endpoint = Endpoint::parse(&kind)?;
    let caller = state.authenticate(authorization(&headers))?;
    let forwarded: Value = parse_body(&body)?;

    let local = endpoint
        .search(state.engine(), &body, &caller.access)
        .map(|page| page.to_json());
    let request = Outbound::post(format!("/{kind}/search"), forwarded).with_authorization(caller.authorization);
    dispatch(&state, &headers, local, &request, MergeMode::Records).await
}

async fn get_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<FederatedResponse>> {
    let endpoint = Endpoint::parse(&kind)?;
    let caller = state.authenticate(authorization(&headers))?;

    let local = endpoint.get(state.engine(), &id, &caller.access);
    let request = Outbound::get(format!("/{kind}/{id}")).with_authorization(caller.authorization);
    dispatch(&state, &headers, local, &request, MergeMode::Lookup).await
}

async fn search_by_gene(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<FederatedResponse>> {
    let caller = state.authenticate(authorization(&headers))?;
    let forwarded: Value = parse_body(&body)?;

    let local = parse_body::<GeneSearchRequest>(&body)
        .and_then(|request| state.engine().search_variants_by_gene(&request, &caller.access))
        .map(|page| page.to_json());
    let request = Outbound::post("/variantsbygenesearch", forwarded).with_authorization(caller.authorization);
    dispatch(&state, &headers, local, &request, MergeMode::Records).await
}

async fn compound_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<FederatedResponse>> {
    compound(state, headers, body, Mode::Search).await
}

async fn compound_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<FederatedResponse>> {
    compound(state, headers, body, Mode::Count).await
}

async fn compound(state: AppState, headers: HeaderMap, body: Bytes, mode: Mode) -> ApiResult<Json<FederatedResponse>> {
    let caller = state.authenticate(authorization(&headers))?;
    let forwarded: Value = parse_body(&body)?;
    let federate = federation_requested(&headers);

    let local = evaluate_compound(&state, &caller, &forwarded, mode, federate)
        .await
        .map(|page| page.to_json());
    let (path, merge) = match mode {
        Mode::Search => ("/search", MergeMode::Records),
        Mode::Count => ("/count", MergeMode::Counts),
    };
    let request = Outbound::post(path, forwarded)
        .with_authorization(caller.authorization)
        .keeping_empty();
    dispatch(&state, &headers, local, &request, merge).await
}

async fn evaluate_compound(
    state: &AppState,
    caller: &Caller,
    body: &Value,
    mode: Mode,
    federate: bool,
) -> cohort_query::Result<SearchResponse> {
    let query = CompoundQuery::from_value(body, mode)?;
    let engine = state.engine();
    let mut executor = GatewayExecutor::new(LocalExecutor::new(engine, &caller.access), state.dispatcher());
    if federate && state.federate_components() {
        executor = executor.federated(caller.authorization.clone());
    }
    CompoundEvaluator::new(engine, &caller.access, &executor)
        .with_dp_epsilon(state.dp_epsilon())
        .evaluate(&query)
        .await
}

async fn list_peers(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let request: ListRequest = parse_body(&body)?;
    let page = state.dispatcher().registry().list(&request, state.limits())?;
    Ok(Json(page.to_json()))
}

async fn info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "peers": state.dispatcher().registry().len(),
        "datasets": state.repository().datasets().count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_federation_header() {
        let mut headers = HeaderMap::new();
        assert!(federation_requested(&headers));
        headers.insert(FEDERATION_HEADER, HeaderValue::from_static("True"));
        assert!(federation_requested(&headers));
        headers.insert(FEDERATION_HEADER, HeaderValue::from_static("False"));
        assert!(!federation_requested(&headers));
        headers.insert(FEDERATION_HEADER, HeaderValue::from_static("false"));
        assert!(!federation_requested(&headers));
    }

    #[test]
    fn test_endpoint_resolution() {
        assert!(matches!(Endpoint::parse("diagnoses"), Ok(Endpoint::Clinical(ClinicalKind::Diagnoses))));
        assert!(matches!(Endpoint::parse("variantsets"), Ok(Endpoint::Genomic(GenomicKind::VariantSets))));
        assert_eq!(Endpoint::parse("widgets").unwrap_err().code(), "NotFound");
    }
}
