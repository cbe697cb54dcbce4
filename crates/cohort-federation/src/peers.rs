//! The set of peers a node federates to.

use std::path::Path;

use cohort_query::{Limits, ListRequest, Paged, ResponseBuilder, SearchResponse};
use reqwest::Url;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{FederationError, Result};

/// A peer node, identified by its base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    url: Url,
}

impl Peer {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim()).map_err(|e| FederationError::InvalidPeerUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FederationError::InvalidPeerUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    /// The peer's address for a local `path_and_query`.
    pub fn endpoint(&self, path_and_query: &str) -> String {
        format!("{}/{}", self.base(), path_and_query.trim_start_matches('/'))
    }
}

/// Read-only during request handling.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
}

impl PeerRegistry {
    /// Builds a registry from configured URLs. Duplicates are dropped.
    pub fn new<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::default();
        for url in urls {
            registry.add(Peer::parse(url.as_ref())?);
        }
        Ok(registry)
    }

    /// Adds the peers listed in a file, one URL per line.
    ///
    /// Blank lines and `#` comments are skipped. Invalid URLs are logged and
    /// skipped.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| FederationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let before = self.peers.len();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Peer::parse(line) {
                Ok(peer) => self.add(peer),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping peer"),
            }
        }
        let added = self.peers.len() - before;
        info!(path = %path.display(), added, "Loaded peers file");
        Ok(added)
    }

    fn add(&mut self, peer: Peer) {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// A page of the registry as `{"peers": [{"url": ...}]}`.
    pub fn list(&self, request: &ListRequest, limits: Limits) -> cohort_query::Result<SearchResponse> {
        let page_size = limits.page_size(request.page_size)?;
        let paged = Paged::new(&self.peers, request.page_token.as_deref())?;
        ResponseBuilder::new("peers", page_size, limits.max_response_length)
            .fill(paged.map(|(peer, token)| Ok((json!({"url": peer.base()}), token))))
    }
}
