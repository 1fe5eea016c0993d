mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{test_dispatcher, test_dispatcher_with_db};
use serde_json::json;

#[tokio::test]
async fn unknown_operation_is_rejected() {
    let d = test_dispatcher();
    let err = d.execute("compress_memories", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), "unsupported_operation");
}

#[tokio::test]
async fn add_then_list_round_trips() {
    let d = test_dispatcher();

    let added = d
        .execute(
            "add_memory",
            json!({ "content": "The deploy runs every Friday", "metadata": { "topic": "ops" } }),
        )
        .await
        .unwrap();
    let id = added["memory"]["id"].as_str().unwrap().to_string();
    assert_eq!(added["memory"]["content"], "The deploy runs every Friday");
    // default client id applies when the caller omits one
    assert_eq!(added["memory"]["client_id"], "mcp-client");

    let listed = d.execute("list_memories", json!({})).await.unwrap();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["memories"][0]["id"], id);
    assert_eq!(listed["memories"][0]["metadata"]["topic"], "ops");
}

#[tokio::test]
async fn semantic_search_ranks_by_meaning() {
    let d = test_dispatcher();
    for content in [
        "cats are independent animals",
        "dogs are loyal companions",
        "rockets reach orbit on tuesday",
    ] {
        d.execute("add_memory", json!({ "content": content }))
            .await
            .unwrap();
    }

    let found = d
        .execute(
            "search_memories",
            json!({ "query": "independent cats", "top_k": 2 }),
        )
        .await
        .unwrap();
    let results = found["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0]["memory"]["content"],
        "cats are independent animals"
    );
    let top = results[0]["score"].as_f64().unwrap();
    let second = results[1]["score"].as_f64().unwrap();
    assert!(top > second);
    assert!(top > 0.0 && top <= 1.0);
}

#[tokio::test]
async fn hybrid_search_validates_alpha_and_blends() {
    let d = test_dispatcher();
    d.execute("add_memory", json!({ "content": "cats chase laser pointers" }))
        .await
        .unwrap();
    d.execute("add_memory", json!({ "content": "the build is green again" }))
        .await
        .unwrap();

    let err = d
        .execute(
            "hybrid_search_memories",
            json!({ "query": "cats", "alpha": 1.5 }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let found = d
        .execute(
            "hybrid_search_memories",
            json!({ "query": "cats laser", "top_k": 1 }),
        )
        .await
        .unwrap();
    assert_eq!(found["alpha"], 0.5);
    assert_eq!(
        found["results"][0]["memory"]["content"],
        "cats chase laser pointers"
    );
}

#[tokio::test]
async fn similar_search_excludes_the_anchor() {
    let d = test_dispatcher();
    let a = d
        .execute("add_memory", json!({ "content": "cats purr when they are content" }))
        .await
        .unwrap();
    let anchor = a["memory"]["id"].as_str().unwrap().to_string();
    d.execute("add_memory", json!({ "content": "cats purr while sleeping" }))
        .await
        .unwrap();
    d.execute("add_memory", json!({ "content": "rockets burn kerosene" }))
        .await
        .unwrap();

    let found = d
        .execute(
            "search_similar_memory",
            json!({ "memory_id": anchor, "top_k": 2 }),
        )
        .await
        .unwrap();
    let results = found["results"].as_array().unwrap();
    assert!(results.iter().all(|r| r["memory"]["id"] != anchor.as_str()));
    assert_eq!(
        results[0]["memory"]["content"],
        "cats purr while sleeping"
    );

    let err = d
        .execute("search_similar_memory", json!({ "memory_id": "ghost" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn filtered_search_applies_conjunction() {
    let d = test_dispatcher();
    d.execute(
        "add_memory",
        json!({ "content": "cats nap in sunbeams", "metadata": { "topic": "pets", "priority": 2 } }),
    )
    .await
    .unwrap();
    d.execute(
        "add_memory",
        json!({ "content": "cats knock things off tables", "metadata": { "topic": "pets", "priority": 5 } }),
    )
    .await
    .unwrap();
    d.execute(
        "add_memory",
        json!({ "content": "cats of the server room", "metadata": { "topic": "infra" } }),
    )
    .await
    .unwrap();

    let found = d
        .execute(
            "filtered_search_memories",
            json!({
                "query": "cats",
                "filters": [
                    { "field": "topic", "op": "eq", "value": "pets" },
                    { "field": "priority", "op": "gt", "value": 3 }
                ]
            }),
        )
        .await
        .unwrap();
    let results = found["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0]["memory"]["content"],
        "cats knock things off tables"
    );
}

#[tokio::test]
async fn edge_and_traverse_flow() {
    let d = test_dispatcher();
    let a = d
        .execute("add_memory", json!({ "content": "root fact" }))
        .await
        .unwrap()["memory"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let b = d
        .execute("add_memory", json!({ "content": "derived fact" }))
        .await
        .unwrap()["memory"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let edge = d
        .execute(
            "add_memory_edge",
            json!({ "source_id": a, "target_id": b, "weight": 0.8 }),
        )
        .await
        .unwrap();
    assert_eq!(edge["edge"]["predicate"], "related_to");
    assert_eq!(edge["edge"]["weight"], 0.8);

    let walked = d
        .execute("traverse_memory_graph", json!({ "start_id": a }))
        .await
        .unwrap();
    assert_eq!(walked["direction"], "outgoing");
    assert_eq!(walked["max_hops"], 2);
    let nodes = walked["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["memory"]["id"], a.as_str());
    assert_eq!(nodes[0]["score"], 1.0);
    assert_eq!(nodes[0]["hops"], 0);
    assert_eq!(nodes[1]["memory"]["id"], b.as_str());
    assert_eq!(nodes[1]["score"], 0.8);
    assert_eq!(nodes[1]["hops"], 1);

    let err = d
        .execute(
            "add_memory_edge",
            json!({ "source_id": a, "target_id": "ghost" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn mutations_broadcast_to_every_subscriber() {
    let d = test_dispatcher();
    let mut rx1 = d.bridge().subscribe();
    let mut rx2 = d.bridge().subscribe();

    let added = d
        .execute("add_memory", json!({ "content": "announce me" }))
        .await
        .unwrap();
    let id = added["memory"]["id"].as_str().unwrap();

    for rx in [&mut rx1, &mut rx2] {
        let event = rx.recv().await.unwrap();
        let frame: serde_json::Value =
            serde_json::from_str(&event.envelope().to_json()).unwrap();
        assert_eq!(frame["type"], "memory_added");
        assert_eq!(frame["data"]["memory"]["id"], id);
        assert_eq!(frame["data"]["memory"]["content"], "announce me");
    }

    d.execute("delete_all_memories", json!({})).await.unwrap();
    for rx in [&mut rx1, &mut rx2] {
        let event = rx.recv().await.unwrap();
        let frame: serde_json::Value =
            serde_json::from_str(&event.envelope().to_json()).unwrap();
        assert_eq!(frame["type"], "memories_deleted");
        assert_eq!(frame["data"]["count"], 1);
    }
}

#[tokio::test]
async fn committed_mutation_broadcasts_even_when_caller_is_dropped() {
    let (d, db) = test_dispatcher_with_db();
    let mut rx = d.bridge().subscribe();

    // Stall the store so the mutation is still queued on the blocking pool
    // when the requesting task goes away.
    let guard = db.lock().unwrap();

    let worker = Arc::clone(&d);
    let request = tokio::spawn(async move {
        worker
            .execute("add_memory", json!({ "content": "written despite disconnect" }))
            .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    request.abort();
    drop(guard);

    // The blocking task runs to completion: the row commits and its event
    // reaches subscribers even though no one is waiting for the response.
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("broadcast should arrive after the store unblocks")
        .unwrap();
    let frame: serde_json::Value = serde_json::from_str(&event.envelope().to_json()).unwrap();
    assert_eq!(frame["type"], "memory_added");
    assert_eq!(frame["data"]["memory"]["content"], "written despite disconnect");

    let listed = d.execute("list_memories", json!({})).await.unwrap();
    assert_eq!(listed["total"], 1);
}

#[tokio::test]
async fn broadcast_order_matches_commit_order() {
    let d = test_dispatcher();
    let mut rx = d.bridge().subscribe();

    let first = tokio::spawn({
        let d = Arc::clone(&d);
        async move { d.execute("add_memory", json!({ "content": "first" })).await }
    });
    let second = tokio::spawn({
        let d = Arc::clone(&d);
        async move { d.execute("add_memory", json!({ "content": "second" })).await }
    });
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // Whichever interleaving won the lock, the events replay in the exact
    // order the rows were committed.
    let listed = d.execute("list_memories", json!({ "limit": 2 })).await.unwrap();
    let newest = listed["memories"][0]["content"].as_str().unwrap().to_string();
    let oldest = listed["memories"][1]["content"].as_str().unwrap().to_string();

    let e1 = rx.recv().await.unwrap();
    let e2 = rx.recv().await.unwrap();
    let v1: serde_json::Value = serde_json::from_str(&e1.envelope().to_json()).unwrap();
    let v2: serde_json::Value = serde_json::from_str(&e2.envelope().to_json()).unwrap();
    assert_eq!(v1["data"]["memory"]["content"], oldest.as_str());
    assert_eq!(v2["data"]["memory"]["content"], newest.as_str());
}

#[tokio::test]
async fn delete_all_empties_store_and_stats() {
    let d = test_dispatcher();
    for i in 0..3 {
        d.execute("add_memory", json!({ "content": format!("note {i}") }))
            .await
            .unwrap();
    }

    let deleted = d.execute("delete_all_memories", json!({})).await.unwrap();
    assert_eq!(deleted["deleted_count"], 3);

    let listed = d.execute("list_memories", json!({})).await.unwrap();
    assert_eq!(listed["total"], 0);
    assert_eq!(listed["memories"].as_array().unwrap().len(), 0);

    let stats = d.execute("get_stats", json!({})).await.unwrap();
    assert_eq!(stats["total_memories"], 0);
    assert_eq!(stats["unique_clients"], 0);
}

#[tokio::test]
async fn validation_errors_surface_with_stable_kinds() {
    let d = test_dispatcher();

    let err = d
        .execute("add_memory", json!({ "content": "" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let err = d
        .execute("search_memories", json!({ "query": "x", "top_k": 0 }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let err = d
        .execute("traverse_memory_graph", json!({ "start_id": "ghost" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let err = d
        .execute(
            "traverse_memory_graph",
            json!({ "start_id": "x", "max_hops": -1 }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
}
