use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SimilarSearchParams {
    #[schemars(description = "ID of the memory to find neighbours of")]
    pub memory_id: String,

    #[schemars(description = "Maximum number of results to return. Defaults to 5.")]
    pub top_k: Option<usize>,
}
