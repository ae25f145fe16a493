use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};
use url::Url;

/// Network-reachable name for a cluster member: the URL peers dial it on.
/// Identity only; the transport layer decides how to talk to it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct NodeName(String);

/// Stable numeric identifier derived from a `NodeName`. Ordering on
/// `NodeId` is what makes owner elections deterministic across nodes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct NodeId(u32);

impl NodeName {
    pub fn new(name: String) -> Self {
        Self(name.trim_end_matches('/').to_string())
    }

    /// Url renders with a trailing slash for an empty path; strip it so the
    /// advertise URL and topology entries compare equal.
    pub fn from_url(url: &Url) -> Self {
        Self::new(url.as_str().to_string())
    }

    pub fn node_id(&self) -> NodeId {
        let mut s = DefaultHasher::new();
        self.hash(&mut s);
        NodeId(s.finish() as u32)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl NodeId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        NodeName::new(name.to_string())
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        NodeName::new(name)
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
