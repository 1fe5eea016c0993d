//! MCP resource payloads: `memory://stats` and `memory://recent`.

mod helpers;

use engram::tools::EngramTools;
use helpers::test_dispatcher;
use serde_json::{json, Value};

#[tokio::test]
async fn stats_resource_reflects_store_contents() {
    let dispatcher = test_dispatcher();
    dispatcher
        .execute("add_memory", json!({"content": "the moon orbits the earth"}))
        .await
        .unwrap();

    let tools = EngramTools::new(dispatcher);
    let text = tools.read_resource_text("memory://stats").await.unwrap();
    let stats: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(stats["total_memories"], 1);
    assert_eq!(stats["unique_clients"], 1);
}

#[tokio::test]
async fn recent_resource_lists_newest_first_capped_at_ten() {
    let dispatcher = test_dispatcher();
    for i in 0..12 {
        dispatcher
            .execute("add_memory", json!({"content": format!("note {i}")}))
            .await
            .unwrap();
    }

    let tools = EngramTools::new(dispatcher);
    let text = tools.read_resource_text("memory://recent").await.unwrap();
    let listing: Value = serde_json::from_str(&text).unwrap();
    let memories = listing["memories"].as_array().unwrap();
    assert_eq!(memories.len(), 10);
    assert_eq!(memories[0]["content"], "note 11");
    assert_eq!(listing["total"], 12);
}

#[tokio::test]
async fn unknown_resource_uri_is_not_found() {
    let tools = EngramTools::new(test_dispatcher());
    let err = tools
        .read_resource_text("memory://bogus")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
