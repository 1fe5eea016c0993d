use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchMemoriesParams {
    #[schemars(description = "Natural language query to search for")]
    pub query: String,

    #[schemars(description = "Maximum number of results to return. Defaults to 5.")]
    pub top_k: Option<usize>,
}
