use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListMemoriesParams {
    #[schemars(description = "Maximum number of memories to return. Defaults to 50.")]
    pub limit: Option<usize>,

    #[schemars(description = "Number of memories to skip, for pagination. Defaults to 0.")]
    pub offset: Option<usize>,
}
