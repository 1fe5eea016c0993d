//! REST facade and WebSocket live-update endpoint.
//!
//! Pure framing over the [`Dispatcher`]: handlers translate HTTP/WS frames
//! into dispatcher operations and render results, with no business logic of
//! their own. Each WebSocket connection runs one task that merges three
//! sources with `tokio::select!`: inbound client frames, the store's
//! broadcast event stream, and a liveness ping interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use crate::bridge::Envelope;
use crate::dispatch::Dispatcher;
use crate::error::EngramError;

/// client_id recorded for memories stored through the REST/WS facade when
/// the caller does not provide one.
const WEB_CLIENT_ID: &str = "web-ui";

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/stats", get(get_stats))
        .route(
            "/memories",
            get(list_memories).post(add_memory).delete(delete_all),
        )
        .route("/search", axum::routing::post(search))
        .route("/ws", get(ws_upgrade))
        .with_state(ApiState { dispatcher })
}

/// EngramError rendered as an HTTP response with a stable JSON body.
struct ApiError(EngramError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngramError::Validation(_) => StatusCode::BAD_REQUEST,
            EngramError::NotFound(_) => StatusCode::NOT_FOUND,
            EngramError::UnsupportedOperation(_) => StatusCode::NOT_FOUND,
            EngramError::Dependency(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(self.0.to_json())).into_response()
    }
}

impl From<EngramError> for ApiError {
    fn from(e: EngramError) -> Self {
        Self(e)
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "engram",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": { "rest": "/memories", "websocket": "/ws" },
    }))
}

async fn health(State(state): State<ApiState>) -> Response {
    match state.dispatcher.execute("get_stats", json!({})).await {
        Ok(stats) => Json(json!({
            "status": "healthy",
            "total_memories": stats["total_memories"],
            "viewers": state.dispatcher.bridge().session_count(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn get_stats(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.dispatcher.execute("get_stats", json!({})).await?))
}

#[derive(Debug, Deserialize)]
struct AddMemoryBody {
    content: String,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    client_id: Option<String>,
}

async fn add_memory(
    State(state): State<ApiState>,
    Json(body): Json<AddMemoryBody>,
) -> Result<Json<Value>, ApiError> {
    let args = json!({
        "content": body.content,
        "metadata": body.metadata,
        "client_id": body.client_id.unwrap_or_else(|| WEB_CLIENT_ID.to_string()),
    });
    let result = state.dispatcher.execute("add_memory", args).await?;
    Ok(Json(json!({
        "success": true,
        "memory_id": result["memory"]["id"],
        "memory": result["memory"],
    })))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_memories(
    State(state): State<ApiState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let args = json!({ "limit": q.limit, "offset": q.offset });
    Ok(Json(state.dispatcher.execute("list_memories", args).await?))
}

async fn delete_all(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let result = state
        .dispatcher
        .execute("delete_all_memories", json!({}))
        .await?;
    Ok(Json(json!({
        "success": true,
        "deleted_count": result["deleted_count"],
    })))
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
    top_k: Option<usize>,
}

async fn search(
    State(state): State<ApiState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<Value>, ApiError> {
    let args = json!({ "query": body.query, "top_k": body.top_k });
    Ok(Json(state.dispatcher.execute("search_memories", args).await?))
}

// ── WebSocket live-update channel ─────────────────────────────────────────────

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Per-session loop. Joins the bridge registry, subscribes to the mutation
/// stream before reading anything, and tears both down on exit so sessions
/// are never left dangling.
async fn handle_socket(socket: WebSocket, state: ApiState) {
    let session_id = uuid::Uuid::now_v7().to_string();
    let bridge = Arc::clone(state.dispatcher.bridge());
    let config = Arc::clone(state.dispatcher.config());

    // Subscribe before the first await on the socket so no mutation
    // committed after join is missed.
    let mut events = bridge.subscribe();
    bridge.join(&session_id);

    let (mut sink, mut stream) = socket.split();

    // Initial frame: current stats, so viewers render without polling.
    if let Ok(stats) = state.dispatcher.execute("get_stats", json!({})).await {
        let frame = Envelope::new("connected", stats).to_json();
        if sink.send(Message::Text(frame.into())).await.is_err() {
            bridge.leave(&session_id);
            return;
        }
    }

    let ping_interval = Duration::from_secs(config.bridge.ping_interval_secs);
    let grace = Duration::from_secs(config.bridge.pong_grace_secs);
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // first tick completes immediately
    let mut last_heard = Instant::now();

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_heard = Instant::now();
                        if let Some(reply) = handle_request(&state, &text).await {
                            if sink.send(Message::Text(reply.to_json().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_heard = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        last_heard = Instant::now();
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session = %session_id, "websocket read error: {e}");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let frame = event.envelope().to_json();
                        if sink.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(session = %session_id, skipped, "viewer lagged — events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = ticker.tick() => {
                if last_heard.elapsed() > ping_interval + grace {
                    tracing::info!(session = %session_id, "viewer unresponsive — purging");
                    break;
                }
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    bridge.leave(&session_id);
}

/// Translate one WebSocket request frame into a dispatcher call.
///
/// Read actions get their result back on this session only. Mutating actions
/// are answered by the resulting broadcast (which this session receives too),
/// so they produce no direct reply on success.
async fn handle_request(state: &ApiState, text: &str) -> Option<Envelope> {
    let mut request: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            return Some(error_envelope(&EngramError::Validation(
                "invalid JSON".into(),
            )))
        }
    };

    let action = request
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let (operation, reply_type): (&str, Option<&str>) = match action.as_str() {
        "ping" => return Some(Envelope::new("pong", json!({}))),
        "get_stats" => ("get_stats", Some("stats")),
        "list_memories" => ("list_memories", Some("memories_list")),
        "search" => ("search_memories", Some("search_results")),
        "traverse" => ("traverse_memory_graph", Some("traverse_results")),
        "add_memory" => ("add_memory", None),
        "add_edge" => ("add_memory_edge", None),
        "delete_all" => ("delete_all_memories", None),
        other => {
            return Some(error_envelope(&EngramError::UnsupportedOperation(
                other.to_string(),
            )))
        }
    };

    if let Some(obj) = request.as_object_mut() {
        obj.remove("action");
        if operation == "add_memory" && !obj.contains_key("client_id") {
            obj.insert("client_id".into(), json!(WEB_CLIENT_ID));
        }
    }

    match state.dispatcher.execute(operation, request).await {
        Ok(result) => reply_type.map(|t| Envelope::new(t, result)),
        Err(e) => Some(error_envelope(&e)),
    }
}

fn error_envelope(e: &EngramError) -> Envelope {
    Envelope::new(
        "error",
        json!({ "kind": e.kind(), "message": e.to_string() }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::config::EngramConfig;
    use crate::db;
    use crate::embedding::{EmbeddingProvider, EMBEDDING_DIM};
    use std::sync::Mutex;

    /// Deterministic embeddings: one dimension per token hash, normalized.
    struct HashEmbedding;

    impl EmbeddingProvider for HashEmbedding {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let mut v = vec![0.0f32; EMBEDDING_DIM];
            for token in text.split(|c: char| !c.is_alphanumeric()) {
                if token.is_empty() {
                    continue;
                }
                let mut h: u64 = 0xcbf29ce484222325;
                for b in token.bytes() {
                    h ^= u64::from(b);
                    h = h.wrapping_mul(0x100000001b3);
                }
                v[(h % EMBEDDING_DIM as u64) as usize] += 1.0;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            } else {
                v[0] = 1.0;
            }
            Ok(v)
        }
    }

    fn test_state() -> ApiState {
        let conn = db::open_memory_database().unwrap();
        let db = Arc::new(Mutex::new(conn));
        let embedding: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedding);
        let config = Arc::new(EngramConfig::default());
        let bridge = Arc::new(Bridge::new(config.bridge.event_buffer));
        ApiState {
            dispatcher: Arc::new(Dispatcher::new(db, embedding, bridge, config)),
        }
    }

    #[test]
    fn error_envelope_carries_kind_and_message() {
        let env = error_envelope(&EngramError::UnsupportedOperation("bogus".into()));
        let v: Value = serde_json::from_str(&env.to_json()).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["data"]["kind"], "unsupported_operation");
        assert_eq!(v["data"]["message"], "unsupported operation: bogus");
    }

    #[tokio::test]
    async fn ping_answers_pong_without_dispatching() {
        let state = test_state();
        let reply = handle_request(&state, r#"{"action":"ping"}"#).await.unwrap();
        let v: Value = serde_json::from_str(&reply.to_json()).unwrap();
        assert_eq!(v["type"], "pong");
    }

    #[tokio::test]
    async fn malformed_json_yields_validation_error() {
        let state = test_state();
        let reply = handle_request(&state, "{not json").await.unwrap();
        let v: Value = serde_json::from_str(&reply.to_json()).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["data"]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn unknown_action_yields_error_envelope() {
        let state = test_state();
        let reply = handle_request(&state, r#"{"action":"frobnicate"}"#)
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&reply.to_json()).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["data"]["kind"], "unsupported_operation");
    }

    #[tokio::test]
    async fn read_actions_reply_with_typed_envelopes() {
        let state = test_state();
        state
            .dispatcher
            .execute("add_memory", json!({"content": "rust has ownership"}))
            .await
            .unwrap();

        let stats = handle_request(&state, r#"{"action":"get_stats"}"#)
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&stats.to_json()).unwrap();
        assert_eq!(v["type"], "stats");
        assert_eq!(v["data"]["total_memories"], 1);

        let list = handle_request(&state, r#"{"action":"list_memories"}"#)
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&list.to_json()).unwrap();
        assert_eq!(v["type"], "memories_list");
        assert_eq!(v["data"]["total"], 1);

        let search = handle_request(&state, r#"{"action":"search","query":"ownership"}"#)
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&search.to_json()).unwrap();
        assert_eq!(v["type"], "search_results");
        assert_eq!(v["data"]["results"][0]["memory"]["content"], "rust has ownership");
    }

    #[tokio::test]
    async fn mutations_stay_silent_and_answer_via_broadcast() {
        let state = test_state();
        let mut events = state.dispatcher.bridge().subscribe();

        let reply = handle_request(&state, r#"{"action":"add_memory","content":"observed"}"#).await;
        assert!(reply.is_none());

        let frame: Value = serde_json::from_str(&events.recv().await.unwrap().envelope().to_json())
            .unwrap();
        assert_eq!(frame["type"], "memory_added");
        assert_eq!(frame["data"]["memory"]["client_id"], "web-ui");
    }

    #[tokio::test]
    async fn traverse_action_walks_the_graph() {
        let state = test_state();
        state
            .dispatcher
            .execute("add_memory", json!({"content": "alpha"}))
            .await
            .unwrap();
        state
            .dispatcher
            .execute("add_memory", json!({"content": "beta"}))
            .await
            .unwrap();
        let list = state
            .dispatcher
            .execute("list_memories", json!({}))
            .await
            .unwrap();
        let a = list["memories"][1]["id"].as_str().unwrap();
        let b = list["memories"][0]["id"].as_str().unwrap();
        state
            .dispatcher
            .execute(
                "add_memory_edge",
                json!({"source_id": a, "target_id": b, "weight": 0.9}),
            )
            .await
            .unwrap();

        let request = json!({"action": "traverse", "start_id": a}).to_string();
        let reply = handle_request(&state, &request).await.unwrap();
        let v: Value = serde_json::from_str(&reply.to_json()).unwrap();
        assert_eq!(v["type"], "traverse_results");
        assert_eq!(v["data"]["nodes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dispatcher_errors_come_back_as_error_envelopes() {
        let state = test_state();
        let reply = handle_request(&state, r#"{"action":"add_memory","content":""}"#)
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&reply.to_json()).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["data"]["kind"], "validation_error");
    }
}
