//! One-hop federation of a request across the peer registry.
//!
//! The local result is computed by the caller and handed in. Unless the
//! inbound request was itself forwarded, the same request is replayed to
//! every peer with `Federation: False`, at most `max_concurrent` at a time,
//! and the successful bodies are merged into the local one.

use std::sync::Arc;
use std::time::Duration;

use cohort_query::{CountTable, QueryError, SearchResponse, counts_from_json, counts_to_json, merge_counts};
use futures::StreamExt;
use futures::stream;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::peers::{Peer, PeerRegistry};

pub const FEDERATION_HEADER: &str = "Federation";
pub const DEFAULT_MAX_CONCURRENT: usize = 10;
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(10);

const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// How peer bodies combine with the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Search pages: records concatenate, `total` counts them.
    Records,
    /// Count tables: cells are summed.
    Counts,
    /// Point lookups: the local body, else the first peer that has one.
    Lookup,
}

/// The request as it is replayed to peers.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub method: Method,
    pub path_and_query: String,
    pub body: Option<Value>,
    pub authorization: Option<String>,
    /// Answer with an empty page instead of `NotFound` when no call found
    /// any record.
    pub keep_empty: bool,
}

impl Outbound {
    pub fn get(path_and_query: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path_and_query: path_and_query.into(),
            body: None,
            authorization: None,
            keep_empty: false,
        }
    }

    pub fn post(path_and_query: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path_and_query: path_and_query.into(),
            body: Some(body),
            authorization: None,
            keep_empty: false,
        }
    }

    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn keeping_empty(mut self) -> Self {
        self.keep_empty = true;
        self
    }
}

/// Status of one call, local or remote.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    /// `None` for the local call.
    pub peer: Option<String>,
    pub status: u16,
    pub results: Option<Value>,
}

impl CallOutcome {
    fn is_success(&self) -> bool {
        self.status == 200
    }

    fn is_queried(&self) -> bool {
        matches!(self.status, 200 | 404)
    }
}

/// The `status` block of a federated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FederationStatus {
    #[serde(rename = "Known peers")]
    pub known_peers: usize,
    #[serde(rename = "Queried peers")]
    pub queried_peers: usize,
    #[serde(rename = "Successful communications")]
    pub successful_communications: usize,
    #[serde(rename = "Valid response")]
    pub valid_response: bool,
}

impl FederationStatus {
    /// GET is valid once any call succeeded; POST only if every call did.
    pub fn assemble(known_peers: usize, method: Method, outcomes: &[CallOutcome]) -> Self {
        let queried_peers = outcomes.iter().filter(|o| o.is_queried()).count();
        let successful_communications = outcomes.iter().filter(|o| o.is_success()).count();
        let valid_response = match method {
            Method::Get => successful_communications >= 1,
            Method::Post => successful_communications == outcomes.len(),
        };
        Self {
            known_peers,
            queried_peers,
            successful_communications,
            valid_response,
        }
    }
}

/// `{status, results}` as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FederatedResponse {
    pub status: FederationStatus,
    pub results: Value,
}

/// Replays requests to peers and merges their answers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    registry: Arc<PeerRegistry>,
    max_concurrent: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<PeerRegistry>, timeout: Duration, max_concurrent: usize) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            registry,
            max_concurrent: max_concurrent.max(1),
        })
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Merges `local` with the peers' answers to `request`.
    ///
    /// Local errors other than not-found and not-authorized abort at once.
    /// With `federate` false no peer is contacted. When neither the local
    /// call nor any peer produced a record, the local error is returned, or
    /// `NotFound` unless the request keeps empty pages.
    pub async fn dispatch(
        &self,
        local: std::result::Result<Value, QueryError>,
        request: &Outbound,
        federate: bool,
        mode: MergeMode,
    ) -> std::result::Result<FederatedResponse, QueryError> {
        let (local_outcome, local_error) = match local {
            Ok(results) => (
                CallOutcome {
                    peer: None,
                    status: 200,
                    results: Some(results),
                },
                None,
            ),
            Err(e @ QueryError::NotFound(_)) => (local_failure(404), Some(e)),
            Err(e @ (QueryError::NotAuthorized(_) | QueryError::NotAuthenticated(_))) => {
                (local_failure(401), Some(e))
            }
            Err(e) => return Err(e),
        };

        let mut outcomes = vec![local_outcome];
        if federate && !self.registry.is_empty() {
            info!(
                path = %request.path_and_query,
                peers = self.registry.len(),
                "Federating request"
            );
            outcomes.extend(self.fan_out(request).await);
        } else {
            debug!(path = %request.path_and_query, federate, "Not federating");
        }

        let status = FederationStatus::assemble(self.registry.len() + 1, request.method, &outcomes);
        let merged = merge(mode, &outcomes).filter(|results| {
            mode == MergeMode::Lookup || request.keep_empty || has_records(results)
        });
        match merged {
            Some(results) => Ok(FederatedResponse { status, results }),
            None => Err(local_error.unwrap_or_else(|| {
                QueryError::NotFound(request.path_and_query.clone())
            })),
        }
    }

    async fn fan_out(&self, request: &Outbound) -> Vec<CallOutcome> {
        stream::iter(self.registry.peers().to_vec())
            .map(|peer| async move { self.call(&peer, request).await })
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    async fn call(&self, peer: &Peer, request: &Outbound) -> CallOutcome {
        let url = peer.endpoint(&request.path_and_query);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url).json(request.body.as_ref().unwrap_or(&Value::Null)),
        }
        .header(FEDERATION_HEADER, "False")
        .header(CONTENT_TYPE, JSON)
        .header(ACCEPT, JSON);
        if let Some(auth) = &request.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }

        let outcome = |status: u16, results: Option<Value>| CallOutcome {
            peer: Some(peer.base().to_string()),
            status,
            results,
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(peer = %peer.base(), error = %e, timeout = e.is_timeout(), "Peer unreachable");
                return outcome(StatusCode::SERVICE_UNAVAILABLE.as_u16(), None);
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!(peer = %peer.base(), status = status.as_u16(), "Peer call failed");
            return outcome(status.as_u16(), None);
        }
        match response.json::<Value>().await {
            Ok(mut body) => {
                debug!(peer = %peer.base(), "Peer call succeeded");
                outcome(200, body.get_mut("results").map(Value::take))
            }
            Err(e) => {
                warn!(peer = %peer.base(), error = %e, "Peer returned an unreadable body");
                outcome(200, None)
            }
        }
    }
}

fn local_failure(status: u16) -> CallOutcome {
    CallOutcome {
        peer: None,
        status,
        results: None,
    }
}

/// Combines the `results` of successful calls; `None` when there are none.
pub fn merge(mode: MergeMode, outcomes: &[CallOutcome]) -> Option<Value> {
    let mut bodies = outcomes
        .iter()
        .filter(|o| o.is_success())
        .filter_map(|o| o.results.as_ref());

    if mode == MergeMode::Lookup {
        return bodies.find(|b| !is_empty_body(b)).cloned();
    }

    let mut merged: Option<SearchResponse> = None;
    let mut counts = CountTable::new();
    for body in bodies {
        let Some(mut page) = SearchResponse::from_json(body) else {
            warn!("Skipping a result body with no record list");
            continue;
        };
        if mode == MergeMode::Counts {
            let Some(table) = counts_from_json(&Value::Array(std::mem::take(&mut page.records))) else {
                warn!(table = %page.table, "Skipping an unreadable count table");
                continue;
            };
            merge_counts(&mut counts, &table);
        }
        match merged.as_mut() {
            None => merged = Some(page),
            Some(acc) => {
                acc.records.extend(page.records);
                if acc.next_page_token.is_none() {
                    acc.next_page_token = page.next_page_token;
                }
                if acc.total.is_none() {
                    acc.total = page.total;
                }
            }
        }
    }

    let mut merged = merged?;
    match mode {
        MergeMode::Counts => {
            if let Value::Array(items) = counts_to_json(&counts) {
                merged.records = items;
            }
        }
        MergeMode::Records => merged.total = Some(merged.records.len()),
        MergeMode::Lookup => {}
    }
    Some(merged.to_json())
}

fn has_records(results: &Value) -> bool {
    SearchResponse::from_json(results).is_some_and(|page| !page.records.is_empty())
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
