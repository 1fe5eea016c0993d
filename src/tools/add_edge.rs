use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddEdgeParams {
    #[schemars(description = "ID of the memory the edge starts at")]
    pub source_id: String,

    #[schemars(description = "ID of the memory the edge points to")]
    pub target_id: String,

    #[schemars(
        description = "Relationship label (e.g. 'related_to', 'derived_from'). Defaults to 'related_to'."
    )]
    pub predicate: Option<String>,

    #[schemars(
        description = "Edge weight used by weighted traversal scoring. Defaults to 1.0."
    )]
    pub weight: Option<f64>,
}
