//! Compound-query component execution for a serving node.

use std::future::Future;

use cohort_federation::{Dispatcher, MergeMode, Outbound};
use cohort_query::{LocalExecutor, QueryError, Result, SearchExecutor, SearchResponse};
use cohort_types::ResultTable;
use serde_json::Value;

/// Runs components locally, or across the peer set when enabled.
pub struct GatewayExecutor<'a> {
    local: LocalExecutor<'a>,
    dispatcher: &'a Dispatcher,
    authorization: Option<String>,
    federate: bool,
}

impl<'a> GatewayExecutor<'a> {
    pub fn new(local: LocalExecutor<'a>, dispatcher: &'a Dispatcher) -> Self {
        Self {
            local,
            dispatcher,
            authorization: None,
            federate: false,
        }
    }

    /// Fans each component out to peers, forwarding `authorization`.
    pub fn federated(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self.federate = true;
        self
    }
}

/// The per-table search endpoint serving `table`.
pub fn component_path(table: ResultTable) -> String {
    match table {
        ResultTable::Clinical(kind) => format!("/{}/search", kind.table()),
        ResultTable::Variants => "/variants/search".to_string(),
        ResultTable::VariantsByGene => "/variantsbygenesearch".to_string(),
    }
}

impl SearchExecutor for GatewayExecutor<'_> {
    fn search(&self, table: ResultTable, body: Value) -> impl Future<Output = Result<SearchResponse>> + Send {
        let local = self.local.run(table, &body);
        async move {
            if !self.federate {
                return local;
            }
            let request = Outbound::post(component_path(table), body)
                .with_authorization(self.authorization.clone())
                .keeping_empty();
            let merged = self
                .dispatcher
                .dispatch(local.map(|r| r.to_json()), &request, true, MergeMode::Records)
                .await?;
            SearchResponse::from_json(&merged.results)
                .ok_or_else(|| QueryError::Internal(format!("unreadable merged response for {table}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_types::ClinicalKind;

    #[test]
    fn test_component_paths() {
        assert_eq!(component_path(ResultTable::Clinical(ClinicalKind::Diagnoses)), "/diagnoses/search");
        assert_eq!(component_path(ResultTable::Variants), "/variants/search");
        assert_eq!(component_path(ResultTable::VariantsByGene), "/variantsbygenesearch");
    }
}
