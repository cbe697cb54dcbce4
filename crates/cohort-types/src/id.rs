//! Compound entity identifiers.
//!
//! An id is the URL-safe base64 encoding (no padding) of a JSON array of
//! path segments. The first segment is always the owning dataset's name, so
//! an id can be routed to its dataset without a repository lookup.

use std::fmt::{self, Display};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised while parsing a compound id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("id '{0}' is not valid base64")]
    Encoding(String),

    #[error("id '{0}' does not decode to a segment list")]
    Shape(String),
}

/// Globally unique entity id embedding its dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompoundId {
    segments: Vec<String>,
    encoded: String,
}

impl CompoundId {
    /// Builds an id from the dataset name followed by the remaining segments.
    pub fn new<I, S>(dataset: &str, rest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments = vec![dataset.to_string()];
        segments.extend(rest.into_iter().map(Into::into));
        let encoded = encode(&segments);
        Self { segments, encoded }
    }

    /// Id of a dataset itself.
    pub fn dataset(name: &str) -> Self {
        Self::new(name, std::iter::empty::<String>())
    }

    /// Parses the wire form.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim_end_matches('='))
            .map_err(|_| IdError::Encoding(raw.to_string()))?;
        let segments: Vec<String> =
            serde_json::from_slice(&bytes).map_err(|_| IdError::Shape(raw.to_string()))?;
        if segments.is_empty() {
            return Err(IdError::Shape(raw.to_string()));
        }
        Ok(Self {
            encoded: encode(&segments),
            segments,
        })
    }

    /// Name of the owning dataset.
    pub fn dataset_name(&self) -> &str {
        &self.segments[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment, i.e. the entity's local name.
    pub fn local_name(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// Derives a child id by appending segments.
    pub fn child<I, S>(&self, rest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments = self.segments.clone();
        segments.extend(rest.into_iter().map(Into::into));
        let encoded = encode(&segments);
        Self { segments, encoded }
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

fn encode(segments: &[String]) -> String {
    // Serializing a list of strings cannot fail.
    let json = serde_json::to_vec(segments).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

impl Display for CompoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for CompoundId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CompoundId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for CompoundId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
