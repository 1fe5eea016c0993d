//! Core memory type definitions.
//!
//! Defines [`Memory`] (a stored record), [`Edge`] (a directed weighted
//! relationship), [`SearchResult`] and [`TraversalNode`] (transient result
//! pairings), plus the filter-predicate and traversal-direction vocabulary
//! used by the search orchestrator and graph engine.

use serde::{Deserialize, Serialize};

/// A stored unit of knowledge.
///
/// Immutable once created: there is no single-record update or delete in the
/// operation surface — only the bulk clear removes memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// The full text content. Never empty.
    pub content: String,
    /// Embedding vector (384 dims). Not hydrated on read paths — vectors stay
    /// in the store and are only carried here when a caller needs them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Arbitrary JSON object metadata. Replaced wholesale, never merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// ISO 8601 creation timestamp (UTC).
    pub created_at: String,
    /// Identifier of the agent/session that stored this memory.
    pub client_id: String,
}

/// A directed, weighted, labeled relationship between two memories.
///
/// Both endpoints existed at edge-creation time. Parallel edges between the
/// same pair (same or different predicate) are permitted, and the graph may
/// contain cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// UUID v7 primary key.
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Free-text relationship label (e.g. `"related_to"`, `"derived_from"`).
    pub predicate: String,
    /// Intended range (0,1] so weighted traversal decays multiplicatively.
    /// Not enforced — caller responsibility.
    pub weight: f64,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// A transient pairing of a memory with a search score.
///
/// Score semantics depend on the search mode: similarity-like for vector
/// search, alpha-blended for hybrid search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub memory: Memory,
    pub score: f64,
}

/// One node reached by a graph traversal.
#[derive(Debug, Clone, Serialize)]
pub struct TraversalNode {
    pub memory: Memory,
    /// Product of traversed edge weights (when weighted) times decay^hops.
    /// The start node always scores 1.0.
    pub score: f64,
    /// Shortest-hop distance from the start node.
    pub hops: u32,
}

/// Aggregate view of the store, computed fresh on every call.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_memories: u64,
    pub unique_clients: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<String>,
}

/// Edge-following direction for graph traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow `source → target`.
    Outgoing,
    /// Follow `target → source`.
    Incoming,
    /// Follow edges in both orientations.
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
            Self::Both => "both",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outgoing" => Ok(Self::Outgoing),
            "incoming" => Ok(Self::Incoming),
            "both" => Ok(Self::Both),
            _ => Err(format!("unknown direction: {s}")),
        }
    }
}

/// Comparison operator for metadata predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
}

/// A single metadata predicate. Filtered search applies a conjunction of
/// these; a predicate on a missing field evaluates false rather than raising.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FilterPredicate {
    pub field: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}
