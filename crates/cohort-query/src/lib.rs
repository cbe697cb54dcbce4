//! # cohort-query: filtered, paged and compound searches
//!
//! The query engine of a gateway node. Everything here is synchronous and
//! local except [`CompoundEvaluator`], whose component phase runs through a
//! [`SearchExecutor`] so that the server can route it via federation.
//!
//! ## Pipeline
//!
//! A per-table search resolves the dataset and the caller's tier, validates
//! its [`Filter`]s, collects matching rows in repository order, and drives a
//! [`Paged`] generator through the [`FieldRedactor`](cohort_rbac::FieldRedactor)
//! into a [`ResponseBuilder`] that stops at the page size or byte ceiling.
//!
//! ```
//! use cohort_query::{Limits, SearchEngine, SearchRequest, RawFilter};
//! use cohort_store::{ClinicalDraft, RepositoryBuilder};
//! use cohort_types::{AccessMap, ClinicalKind, Tier};
//!
//! let repo = RepositoryBuilder::new()
//!     .clinical("D1", ClinicalKind::Patients, ClinicalDraft::new("p1").with("patientId", "p1"))
//!     .build()
//!     .unwrap();
//! let access = AccessMap::new().with("D1", Tier::MAX);
//! let engine = SearchEngine::new(&repo, Limits::default());
//!
//! let request = SearchRequest::new("D1").filter(RawFilter::compare("patientId", "=", "p1"));
//! let page = engine.search_clinical(ClinicalKind::Patients, &request, &access).unwrap();
//! assert_eq!(page.records.len(), 1);
//! ```

pub mod aggregate;
pub mod compound;
pub mod dp;
pub mod error;
pub mod filter;
pub mod paging;
pub mod request;
pub mod response;
pub mod search;

pub use aggregate::{CountTable, count_fields, counts_from_json, counts_to_json, merge_counts};
pub use compound::{
    Component, ComponentSpec, CompoundEvaluator, CompoundQuery, LocalExecutor, Logic, Mode, Region,
    ResultSpec, SearchExecutor,
};
pub use error::{QueryError, Result};
pub use filter::{Attribute, Filter, Filterable, Operand, Operator, RawFilter, TieredView};
pub use paging::{Paged, next_token, parse_token};
pub use request::{
    DatasetScopedRequest, FeatureSearchRequest, GeneSearchRequest, ListRequest, SearchRequest,
    VariantSearchRequest, parse_body,
};
pub use response::{
    DEFAULT_PAGE_SIZE, Limits, MAX_RESPONSE_LENGTH, NEXT_PAGE_TOKEN, ResponseBuilder, SearchResponse,
    TOTAL,
};
pub use search::SearchEngine;
