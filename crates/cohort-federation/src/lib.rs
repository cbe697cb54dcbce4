//! # cohort-federation: one-hop request federation
//!
//! Every search or lookup a node serves can be replayed to its peers. The
//! [`Dispatcher`] records one [`CallOutcome`] per call (self included),
//! merges the successful bodies according to a [`MergeMode`], and reports a
//! [`FederationStatus`] alongside the merged results.
//!
//! Forwarded requests carry `Federation: False` and are answered locally
//! only, so a request travels at most one hop regardless of how the peer
//! graph is wired.

mod dispatch;
mod error;
mod peers;

pub use dispatch::{
    CallOutcome, DEFAULT_MAX_CONCURRENT, DEFAULT_PEER_TIMEOUT, Dispatcher, FEDERATION_HEADER,
    FederatedResponse, FederationStatus, MergeMode, Method, Outbound, merge,
};
pub use error::{FederationError, Result};
pub use peers::{Peer, PeerRegistry};
