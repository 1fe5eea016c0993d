use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddMemoryParams {
    #[schemars(description = "The natural language content of the memory")]
    pub content: String,

    #[schemars(description = "Optional JSON object with arbitrary metadata (tags, source, etc.)")]
    pub metadata: Option<serde_json::Value>,

    #[schemars(
        description = "Identifier of the client storing this memory. Defaults to the server's configured client id."
    )]
    pub client_id: Option<String>,
}
