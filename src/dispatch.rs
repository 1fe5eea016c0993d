//! Command dispatcher — the single business-logic entry for every transport.
//!
//! Normalizes an operation name plus a JSON argument mapping into calls
//! against the repository, search orchestrator, and graph engine. The stdio
//! MCP handler, the streamable HTTP MCP handler, the REST facade, and the
//! WebSocket bridge are all pure framing layers over [`Dispatcher::execute`],
//! so identical inputs surface identical results and identical errors on
//! every transport.
//!
//! The dispatcher is stateless between calls; all state lives in the store
//! behind the connection mutex. Mutations publish a [`StoreEvent`] right
//! after their commit, inside the blocking task and with the connection lock
//! still held, so a committed mutation always broadcasts even when the
//! requesting future is dropped mid-flight.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::bridge::{Bridge, StoreEvent};
use crate::config::EngramConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngramError, Result};
use crate::memory::search::SearchTuning;
use crate::memory::types::{Direction, FilterPredicate};
use crate::memory::{graph, repository, search};

pub struct Dispatcher {
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
    bridge: Arc<Bridge>,
    config: Arc<EngramConfig>,
}

#[derive(Debug, Deserialize)]
struct AddMemoryArgs {
    content: String,
    metadata: Option<Value>,
    client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct HybridSearchArgs {
    query: String,
    top_k: Option<usize>,
    alpha: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SimilarSearchArgs {
    memory_id: String,
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct FilteredSearchArgs {
    query: String,
    top_k: Option<usize>,
    filters: Vec<FilterPredicate>,
}

#[derive(Debug, Deserialize)]
struct AddEdgeArgs {
    source_id: String,
    target_id: String,
    predicate: Option<String>,
    weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TraverseArgs {
    start_id: String,
    max_hops: Option<i64>,
    direction: Option<String>,
    decay: Option<f64>,
    weighted: Option<bool>,
}

impl Dispatcher {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedding: Arc<dyn EmbeddingProvider>,
        bridge: Arc<Bridge>,
        config: Arc<EngramConfig>,
    ) -> Self {
        Self {
            db,
            embedding,
            bridge,
            config,
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn config(&self) -> &Arc<EngramConfig> {
        &self.config
    }

    /// Execute one operation. Unknown names fail with
    /// [`EngramError::UnsupportedOperation`]; component errors pass through
    /// unwrapped.
    pub async fn execute(&self, operation: &str, args: Value) -> Result<Value> {
        tracing::debug!(operation, "dispatching");
        match operation {
            "add_memory" => self.add_memory(parse_args(args)?).await,
            "search_memories" => self.search_memories(parse_args(args)?).await,
            "list_memories" => self.list_memories(parse_args(args)?).await,
            "delete_all_memories" => self.delete_all_memories().await,
            "hybrid_search_memories" => self.hybrid_search(parse_args(args)?).await,
            "search_similar_memory" => self.similar_search(parse_args(args)?).await,
            "filtered_search_memories" => self.filtered_search(parse_args(args)?).await,
            "add_memory_edge" => self.add_memory_edge(parse_args(args)?).await,
            "traverse_memory_graph" => self.traverse(parse_args(args)?).await,
            "get_stats" => self.stats().await,
            other => Err(EngramError::UnsupportedOperation(other.to_string())),
        }
    }

    async fn add_memory(&self, args: AddMemoryArgs) -> Result<Value> {
        if args.content.is_empty() {
            return Err(EngramError::Validation("content must not be empty".into()));
        }
        if let Some(ref m) = args.metadata {
            if !m.is_object() {
                return Err(EngramError::Validation(
                    "metadata must be a JSON object".into(),
                ));
            }
        }
        let client_id = args
            .client_id
            .unwrap_or_else(|| self.config.server.default_client_id.clone());

        // Embed before touching the store so the mutation critical section
        // stays minimal.
        let embedding = self.embed(args.content.clone()).await?;

        let metadata = args.metadata;
        let content = args.content;
        let bridge = Arc::clone(&self.bridge);
        let memory = self
            .with_db(move |conn| {
                let memory = repository::add_memory(
                    conn,
                    &content,
                    metadata.as_ref(),
                    &client_id,
                    &embedding,
                )?;
                // Publish while the lock is still held: broadcast order always
                // matches commit order, and the event survives caller
                // cancellation because the blocking task runs to completion.
                bridge.publish(StoreEvent::MemoryAdded(memory.clone()));
                Ok(memory)
            })
            .await?;

        tracing::info!(id = %memory.id, client = %memory.client_id, "memory stored");
        Ok(json!({ "memory": memory }))
    }

    async fn search_memories(&self, args: SearchArgs) -> Result<Value> {
        let top_k = self.top_k(args.top_k);
        let embedding = self.embed(args.query.clone()).await?;
        let results = self
            .with_db(move |conn| search::vector_search(conn, &embedding, top_k))
            .await?;
        Ok(json!({ "query": args.query, "results": results }))
    }

    async fn list_memories(&self, args: ListArgs) -> Result<Value> {
        let limit = args.limit.unwrap_or(50);
        let offset = args.offset.unwrap_or(0);
        let (memories, total) = self
            .with_db(move |conn| repository::list_memories(conn, limit, offset))
            .await?;
        Ok(json!({
            "memories": memories,
            "total": total,
            "limit": limit,
            "offset": offset,
        }))
    }

    async fn delete_all_memories(&self) -> Result<Value> {
        let bridge = Arc::clone(&self.bridge);
        let count = self
            .with_db(move |conn| {
                let count = repository::clear_all(conn)?;
                bridge.publish(StoreEvent::MemoriesCleared { count });
                Ok(count)
            })
            .await?;
        tracing::info!(count, "all memories deleted");
        Ok(json!({ "deleted_count": count }))
    }

    async fn hybrid_search(&self, args: HybridSearchArgs) -> Result<Value> {
        let top_k = self.top_k(args.top_k);
        let alpha = args.alpha.unwrap_or(self.config.search.default_alpha);
        let tuning = SearchTuning::from(&self.config.search);

        let embedding = self.embed(args.query.clone()).await?;
        let query = args.query.clone();
        let results = self
            .with_db(move |conn| {
                search::hybrid_search(conn, &embedding, &query, top_k, alpha, tuning)
            })
            .await?;
        Ok(json!({ "query": args.query, "alpha": alpha, "results": results }))
    }

    async fn similar_search(&self, args: SimilarSearchArgs) -> Result<Value> {
        let top_k = self.top_k(args.top_k);
        let memory_id = args.memory_id.clone();
        let results = self
            .with_db(move |conn| search::similar_search(conn, &memory_id, top_k))
            .await?;
        Ok(json!({ "memory_id": args.memory_id, "results": results }))
    }

    async fn filtered_search(&self, args: FilteredSearchArgs) -> Result<Value> {
        let top_k = self.top_k(args.top_k);
        let tuning = SearchTuning::from(&self.config.search);

        let embedding = self.embed(args.query.clone()).await?;
        let filters = args.filters;
        let results = self
            .with_db(move |conn| {
                search::filtered_search(conn, &embedding, top_k, &filters, tuning)
            })
            .await?;
        Ok(json!({ "query": args.query, "results": results }))
    }

    async fn add_memory_edge(&self, args: AddEdgeArgs) -> Result<Value> {
        let predicate = args.predicate.unwrap_or_else(|| "related_to".to_string());
        let weight = args.weight.unwrap_or(1.0);

        let (source_id, target_id) = (args.source_id, args.target_id);
        let bridge = Arc::clone(&self.bridge);
        let edge = self
            .with_db(move |conn| {
                let edge = graph::add_edge(conn, &source_id, &target_id, &predicate, weight)?;
                bridge.publish(StoreEvent::EdgeAdded(edge.clone()));
                Ok(edge)
            })
            .await?;

        tracing::info!(
            source = %edge.source_id,
            predicate = %edge.predicate,
            target = %edge.target_id,
            "edge stored"
        );
        Ok(json!({ "edge": edge }))
    }

    async fn traverse(&self, args: TraverseArgs) -> Result<Value> {
        let max_hops = args.max_hops.unwrap_or(2);
        let direction = match args.direction.as_deref() {
            None => Direction::Outgoing,
            Some(s) => s
                .parse::<Direction>()
                .map_err(EngramError::Validation)?,
        };
        let decay = args.decay.unwrap_or(1.0);
        let weighted = args.weighted.unwrap_or(true);

        let start_id = args.start_id.clone();
        let nodes = self
            .with_db(move |conn| {
                graph::traverse(conn, &start_id, max_hops, direction, decay, weighted)
            })
            .await?;

        Ok(json!({
            "start_id": args.start_id,
            "max_hops": max_hops,
            "direction": direction,
            "nodes": nodes,
        }))
    }

    async fn stats(&self) -> Result<Value> {
        let stats = self.with_db(|conn| repository::stats(conn)).await?;
        Ok(serde_json::to_value(stats)
            .map_err(|e| EngramError::Dependency(format!("serialization failed: {e}")))?)
    }

    fn top_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.config.search.default_top_k)
    }

    /// Embed on a blocking thread. CPU-heavy and independent of the store, so
    /// it runs before the connection lock is acquired.
    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let provider = Arc::clone(&self.embedding);
        tokio::task::spawn_blocking(move || provider.embed(&text))
            .await
            .map_err(|e| EngramError::Dependency(format!("embedding task failed: {e}")))?
            .map_err(|e| EngramError::Dependency(format!("embedding failed: {e}")))
    }

    /// Run a store operation on a blocking thread with the connection lock
    /// held. The mutex serializes mutations, giving a single global mutation
    /// order; reads see every previously completed mutation.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| EngramError::Dependency(format!("db lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| EngramError::Dependency(format!("db task failed: {e}")))?
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| EngramError::Validation(format!("invalid arguments: {e}")))
}
