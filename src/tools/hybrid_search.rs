use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HybridSearchParams {
    #[schemars(description = "Natural language query to search for")]
    pub query: String,

    #[schemars(description = "Maximum number of results to return. Defaults to 5.")]
    pub top_k: Option<usize>,

    #[schemars(
        description = "Blend between semantic and keyword relevance, 0.0-1.0. 1.0 is purely semantic, 0.0 purely keyword. Defaults to 0.5."
    )]
    pub alpha: Option<f64>,
}
