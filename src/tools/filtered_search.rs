use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::memory::types::FilterPredicate;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FilteredSearchParams {
    #[schemars(description = "Natural language query to search for")]
    pub query: String,

    #[schemars(
        description = "Predicates applied as a conjunction. Each has a field (client_id, content, created_at, or a metadata key), an op (eq, neq, gt, lt, gte, lte, contains) and a value."
    )]
    pub filters: Vec<FilterPredicate>,

    #[schemars(description = "Maximum number of results to return. Defaults to 5.")]
    pub top_k: Option<usize>,
}
