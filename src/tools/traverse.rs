use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TraverseParams {
    #[schemars(description = "ID of the memory to start traversal from")]
    pub start_id: String,

    #[schemars(description = "Maximum number of hops from the start. Defaults to 2.")]
    pub max_hops: Option<i64>,

    #[schemars(
        description = "Edge direction to follow: 'outgoing', 'incoming' or 'both'. Defaults to 'outgoing'."
    )]
    pub direction: Option<String>,

    #[schemars(
        description = "Per-hop score decay in (0, 1]. Defaults to 1.0 (no decay)."
    )]
    pub decay: Option<f64>,

    #[schemars(
        description = "Multiply scores by the product of edge weights along the discovery path. Defaults to true."
    )]
    pub weighted: Option<bool>,
}
