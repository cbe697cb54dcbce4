//! Response building.
//!
//! [`ResponseBuilder`] accumulates serialized records until the caller's page
//! size or the server's byte ceiling is reached. [`SearchResponse`] is the
//! finished page, serialized as `{<table>: [...], nextPageToken?, total?}`.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::{QueryError, Result};

pub const DEFAULT_PAGE_SIZE: usize = 1800;
pub const MAX_RESPONSE_LENGTH: usize = 1 << 20;

pub const NEXT_PAGE_TOKEN: &str = "nextPageToken";
pub const TOTAL: &str = "total";

/// Server-side paging limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub default_page_size: usize,
    pub max_response_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_response_length: MAX_RESPONSE_LENGTH,
        }
    }
}

impl Limits {
    /// Effective page size: absent or 0 means the default, negative is an error.
    pub fn page_size(&self, requested: Option<i64>) -> Result<usize> {
        match requested {
            None | Some(0) => Ok(self.default_page_size),
            Some(n) if n < 0 => Err(QueryError::BadPageSize(n)),
            Some(n) => Ok(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

/// Accumulates one page of records.
#[derive(Debug)]
pub struct ResponseBuilder {
    table: String,
    page_size: usize,
    max_bytes: usize,
    records: Vec<Value>,
    bytes: usize,
    next_page_token: Option<String>,
}

impl ResponseBuilder {
    pub fn new(table: impl Into<String>, page_size: usize, max_bytes: usize) -> Self {
        Self {
            table: table.into(),
            page_size,
            max_bytes,
            records: Vec::new(),
            bytes: 0,
            next_page_token: None,
        }
    }

    pub fn add(&mut self, record: Value) {
        self.bytes += serde_json::to_vec(&record).map_or(0, |b| b.len());
        self.records.push(record);
    }

    /// True once the byte ceiling or the page size has been reached.
    pub fn is_full(&self) -> bool {
        self.bytes >= self.max_bytes || (self.page_size > 0 && self.records.len() >= self.page_size)
    }

    pub fn set_next_page_token(&mut self, token: Option<String>) {
        self.next_page_token = token;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drives `(record, token)` pairs until the page fills or the source ends.
    pub fn fill<I>(mut self, pairs: I) -> Result<SearchResponse>
    where
        I: IntoIterator<Item = Result<(Value, Option<String>)>>,
    {
        for pair in pairs {
            let (record, token) = pair?;
            self.add(record);
            if self.is_full() {
                self.set_next_page_token(token);
                break;
            }
        }
        Ok(self.finish())
    }

    pub fn finish(self) -> SearchResponse {
        SearchResponse {
            table: self.table,
            records: self.records,
            next_page_token: self.next_page_token,
            total: None,
        }
    }
}

/// A page of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub table: String,
    pub records: Vec<Value>,
    pub next_page_token: Option<String>,
    pub total: Option<usize>,
}

impl SearchResponse {
    pub fn empty(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            records: Vec::new(),
            next_page_token: None,
            total: None,
        }
    }

    pub fn with_records(table: impl Into<String>, records: Vec<Value>) -> Self {
        Self {
            records,
            ..Self::empty(table)
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.table.clone(), Value::Array(self.records.clone()));
        if let Some(token) = &self.next_page_token {
            map.insert(NEXT_PAGE_TOKEN.to_string(), Value::String(token.clone()));
        }
        if let Some(total) = self.total {
            map.insert(TOTAL.to_string(), Value::from(total));
        }
        Value::Object(map)
    }

    /// Reads a response body back. The table is the one key holding a list.
    ///
    /// An empty `nextPageToken` string counts as absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let (table, records) = map
            .iter()
            .find(|(k, v)| k.as_str() != NEXT_PAGE_TOKEN && k.as_str() != TOTAL && v.is_array())?;
        Some(Self {
            table: table.clone(),
            records: records.as_array().cloned().unwrap_or_default(),
            next_page_token: map
                .get(NEXT_PAGE_TOKEN)
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            total: map
                .get(TOTAL)
                .and_then(Value::as_u64)
                .map(|t| t as usize),
        })
    }
}

impl Serialize for SearchResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = 1 + usize::from(self.next_page_token.is_some()) + usize::from(self.total.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(&self.table, &self.records)?;
        if let Some(token) = &self.next_page_token {
            map.serialize_entry(NEXT_PAGE_TOKEN, token)?;
        }
        if let Some(total) = self.total {
            map.serialize_entry(TOTAL, &total)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(n: usize) -> Vec<Result<(Value, Option<String>)>> {
        (0..n)
            .map(|i| Ok((json!({"i": i}), (i + 1 < n).then(|| (i + 1).to_string()))))
            .collect()
    }

    #[test]
    fn test_page_size_defaults() {
        let limits = Limits::default();
        assert_eq!(limits.page_size(None).unwrap(), 1800);
        assert_eq!(limits.page_size(Some(0)).unwrap(), 1800);
        assert_eq!(limits.page_size(Some(25)).unwrap(), 25);
        assert_eq!(limits.page_size(Some(-3)).unwrap_err(), QueryError::BadPageSize(-3));
    }

    #[test]
    fn test_fill_stops_at_page_size() {
        let response = ResponseBuilder::new("patients", 3, MAX_RESPONSE_LENGTH)
            .fill(pairs(10))
            .unwrap();
        assert_eq!(response.records.len(), 3);
        assert_eq!(response.next_page_token.as_deref(), Some("3"));
    }

    #[test]
    fn test_fill_exhausted_source_has_no_token() {
        let response = ResponseBuilder::new("patients", 5, MAX_RESPONSE_LENGTH)
            .fill(pairs(5))
            .unwrap();
        assert_eq!(response.records.len(), 5);
        assert_eq!(response.next_page_token, None);
    }

    #[test]
    fn test_byte_ceiling_may_overshoot_by_one_record() {
        // each record serializes to 7 bytes: {"i":N}
        let response = ResponseBuilder::new("patients", 100, 10).fill(pairs(10)).unwrap();
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.next_page_token.as_deref(), Some("2"));
    }

    #[test]
    fn test_fill_propagates_errors() {
        let mut items = pairs(2);
        items.insert(1, Err(QueryError::BadInputType("x".into())));
        let err = ResponseBuilder::new("t", 10, MAX_RESPONSE_LENGTH).fill(items).unwrap_err();
        assert_eq!(err.code(), "BadInputType");
    }

    #[test]
    fn test_serialized_shape() {
        let mut response = SearchResponse::with_records("diagnoses", vec![json!({"id": "a"})]);
        response.next_page_token = Some("1".into());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, json!({"diagnoses": [{"id": "a"}], "nextPageToken": "1"}));
        assert_eq!(json, response.to_json());
    }

    #[test]
    fn test_from_json_reads_table_and_token() {
        let body = json!({"nextPageToken": "", "samples": [{"id": 1}, {"id": 2}], "total": 2});
        let response = SearchResponse::from_json(&body).unwrap();
        assert_eq!(response.table, "samples");
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.next_page_token, None);
        assert_eq!(response.total, Some(2));
        assert!(SearchResponse::from_json(&json!({"nextPageToken": "3"})).is_none());
    }
}
