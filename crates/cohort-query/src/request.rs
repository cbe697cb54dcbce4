//! Request bodies for every search endpoint.
//!
//! Paging keys are accepted in both `pageSize`/`pageToken` and
//! `page_size`/`page_token` spellings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::filter::RawFilter;

/// Parses a JSON body. An empty body is read as `{}`.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_slice(b"{}")?);
    }
    Ok(serde_json::from_slice(body)?)
}

pub(crate) fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| QueryError::bad_request(format!("'{field}' is required")))
}

/// Per-table clinical search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default, alias = "dataset_id")]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub filters: Vec<RawFilter>,
    #[serde(default, alias = "page_size", skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    #[serde(default, alias = "page_token", skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl SearchRequest {
    pub fn new(dataset_id: &str) -> Self {
        Self {
            dataset_id: Some(dataset_id.to_string()),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: RawFilter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Variants overlapping a region, by dataset or by explicit variant sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSearchRequest {
    #[serde(default, alias = "dataset_id", skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_set_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
    /// Restricts to variant sets owned by these patients and decorates each
    /// variant with its owner's `patientId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_list: Option<Vec<String>>,
    #[serde(default, alias = "page_size", skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    #[serde(default, alias = "page_token", skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

/// Variants in the regions of features carrying a gene symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneSearchRequest {
    #[serde(default, alias = "dataset_id")]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub gene: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_list: Option<Vec<String>>,
    #[serde(default, alias = "page_size", skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    #[serde(default, alias = "page_token", skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

/// Listing of a dataset's variant sets, feature sets or read group sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetScopedRequest {
    #[serde(default, alias = "dataset_id")]
    pub dataset_id: Option<String>,
    #[serde(default, alias = "page_size")]
    pub page_size: Option<i64>,
    #[serde(default, alias = "page_token")]
    pub page_token: Option<String>,
}

/// Features of one feature set, optionally narrowed by region or gene.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSearchRequest {
    #[serde(default, alias = "feature_set_id")]
    pub feature_set_id: Option<String>,
    #[serde(default)]
    pub gene_symbol: Option<String>,
    #[serde(default)]
    pub reference_name: Option<String>,
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub end: Option<u64>,
    #[serde(default, alias = "page_size")]
    pub page_size: Option<i64>,
    #[serde(default, alias = "page_token")]
    pub page_token: Option<String>,
}

/// Paging-only listing (reference sets, datasets, peers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default, alias = "page_size")]
    pub page_size: Option<i64>,
    #[serde(default, alias = "page_token")]
    pub page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_paging_spellings() {
        let a: SearchRequest = parse_body(br#"{"datasetId":"D1","pageSize":5,"pageToken":"10"}"#).unwrap();
        let b: SearchRequest = parse_body(br#"{"dataset_id":"D1","page_size":5,"page_token":"10"}"#).unwrap();
        assert_eq!(a.page_size, Some(5));
        assert_eq!(b.page_size, Some(5));
        assert_eq!(a.page_token, b.page_token);
        assert_eq!(b.dataset_id.as_deref(), Some("D1"));
    }

    #[test]
    fn test_empty_body_is_empty_object() {
        let req: ListRequest = parse_body(b"  ").unwrap();
        assert!(req.page_size.is_none());
    }

    #[test]
    fn test_malformed_body_is_invalid_json() {
        let err = parse_body::<SearchRequest>(b"{\"datasetId\": ").unwrap_err();
        assert_eq!(err.code(), "InvalidJson");
    }

    #[test]
    fn test_wrong_types_are_bad_request() {
        let err = parse_body::<SearchRequest>(br#"{"filters": "all"}"#).unwrap_err();
        assert_eq!(err.code(), "BadRequest");
    }

    #[test]
    fn test_require_rejects_empty() {
        assert!(require(Some("D1"), "datasetId").is_ok());
        assert_eq!(require(Some(""), "datasetId").unwrap_err().code(), "BadRequest");
        assert_eq!(require(None, "datasetId").unwrap_err().code(), "BadRequest");
    }
}
