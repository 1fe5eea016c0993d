pub mod add_edge;
pub mod add_memory;
pub mod delete_all_memories;
pub mod filtered_search;
pub mod hybrid_search;
pub mod list_memories;
pub mod search_memories;
pub mod similar_search;
pub mod traverse;

use std::sync::Arc;

use add_edge::AddEdgeParams;
use add_memory::AddMemoryParams;
use delete_all_memories::DeleteAllMemoriesParams;
use filtered_search::FilteredSearchParams;
use hybrid_search::HybridSearchParams;
use list_memories::ListMemoriesParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    AnnotateAble, ListResourcesResult, PaginatedRequestParam, RawResource,
    ReadResourceRequestParam, ReadResourceResult, ResourceContents,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler};
use search_memories::SearchMemoriesParams;
use similar_search::SimilarSearchParams;
use traverse::TraverseParams;

use crate::dispatch::Dispatcher;
use crate::error::EngramError;

/// The Engram MCP tool handler. A thin adapter: every tool serializes its
/// params and hands them to the shared [`Dispatcher`], so MCP and the web
/// facade run the exact same code path.
#[derive(Clone)]
pub struct EngramTools {
    tool_router: ToolRouter<Self>,
    dispatcher: Arc<Dispatcher>,
}

impl EngramTools {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            dispatcher,
        }
    }

    /// Serialize params, execute through the dispatcher, render the result.
    async fn run<P: serde::Serialize>(&self, operation: &str, params: P) -> Result<String, String> {
        let args = serde_json::to_value(params)
            .map_err(|e| render_error(&EngramError::from(e)))?;
        let result = self
            .dispatcher
            .execute(operation, args)
            .await
            .map_err(|e| render_error(&e))?;
        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// JSON payload behind an MCP resource URI.
    pub async fn read_resource_text(&self, uri: &str) -> Result<String, EngramError> {
        let value = match uri {
            "memory://stats" => {
                self.dispatcher
                    .execute("get_stats", serde_json::json!({}))
                    .await?
            }
            "memory://recent" => {
                self.dispatcher
                    .execute("list_memories", serde_json::json!({ "limit": 10 }))
                    .await?
            }
            _ => return Err(EngramError::NotFound(format!("unknown resource: {uri}"))),
        };
        serde_json::to_string_pretty(&value).map_err(EngramError::from)
    }
}

#[tool_router]
impl EngramTools {
    /// Store a new memory in the shared store.
    #[tool(description = "Store a memory in the shared semantic store. It becomes immediately searchable by every connected agent.")]
    async fn add_memory(
        &self,
        Parameters(params): Parameters<AddMemoryParams>,
    ) -> Result<String, String> {
        tracing::info!(content_len = params.content.len(), "add_memory called");
        self.run("add_memory", params).await
    }

    /// Semantic search over all stored memories.
    #[tool(description = "Search memories by meaning. Returns the top_k most semantically similar memories with scores in (0, 1].")]
    async fn search_memories(
        &self,
        Parameters(params): Parameters<SearchMemoriesParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, "search_memories called");
        self.run("search_memories", params).await
    }

    /// Page through stored memories, newest first.
    #[tool(description = "List stored memories newest-first with limit/offset pagination. Also returns the total count.")]
    async fn list_memories(
        &self,
        Parameters(params): Parameters<ListMemoriesParams>,
    ) -> Result<String, String> {
        self.run("list_memories", params).await
    }

    /// Remove every memory, edge and embedding.
    #[tool(description = "Delete ALL memories, edges and embeddings from the shared store. Irreversible.")]
    async fn delete_all_memories(
        &self,
        Parameters(params): Parameters<DeleteAllMemoriesParams>,
    ) -> Result<String, String> {
        tracing::warn!("delete_all_memories called");
        self.run("delete_all_memories", params).await
    }

    /// Blend semantic and keyword relevance.
    #[tool(description = "Hybrid search blending semantic similarity with keyword overlap. alpha=1.0 is purely semantic, alpha=0.0 purely keyword.")]
    async fn hybrid_search_memories(
        &self,
        Parameters(params): Parameters<HybridSearchParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, alpha = params.alpha, "hybrid_search called");
        self.run("hybrid_search_memories", params).await
    }

    /// Find neighbours of an existing memory.
    #[tool(description = "Find memories semantically similar to an existing memory, excluding the memory itself.")]
    async fn search_similar_memory(
        &self,
        Parameters(params): Parameters<SimilarSearchParams>,
    ) -> Result<String, String> {
        self.run("search_similar_memory", params).await
    }

    /// Semantic search constrained by metadata predicates.
    #[tool(description = "Semantic search with metadata filters. Every filter must match (conjunction); a filter on a missing field simply excludes the memory.")]
    async fn filtered_search_memories(
        &self,
        Parameters(params): Parameters<FilteredSearchParams>,
    ) -> Result<String, String> {
        self.run("filtered_search_memories", params).await
    }

    /// Link two memories in the knowledge graph.
    #[tool(description = "Create a directed, weighted edge between two memories (e.g. 'related_to', 'derived_from'). Both endpoints must exist.")]
    async fn add_memory_edge(
        &self,
        Parameters(params): Parameters<AddEdgeParams>,
    ) -> Result<String, String> {
        self.run("add_memory_edge", params).await
    }

    /// Walk the memory graph outward from a starting memory.
    #[tool(description = "Breadth-first traversal of the memory graph from a start memory, up to max_hops. Scores decay per hop and optionally multiply edge weights.")]
    async fn traverse_memory_graph(
        &self,
        Parameters(params): Parameters<TraverseParams>,
    ) -> Result<String, String> {
        self.run("traverse_memory_graph", params).await
    }
}

fn render_error(e: &EngramError) -> String {
    format!("{}: {}", e.kind(), e)
}

#[tool_handler]
impl ServerHandler for EngramTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Engram is a shared semantic memory server for AI agents. Use add_memory to \
                 store knowledge, search_memories / hybrid_search_memories to retrieve it, \
                 add_memory_edge and traverse_memory_graph to link and explore related \
                 memories. Memories are shared across every connected agent."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let mut stats = RawResource::new("memory://stats", "Memory Statistics");
        stats.description = Some("Statistics about stored memories".into());
        stats.mime_type = Some("application/json".into());

        let mut recent = RawResource::new("memory://recent", "Recent Memories");
        recent.description = Some("Recently added memories".into());
        recent.mime_type = Some("application/json".into());

        Ok(ListResourcesResult {
            resources: vec![stats.no_annotation(), recent.no_annotation()],
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let text = self
            .read_resource_text(&request.uri)
            .await
            .map_err(|e| match e {
                EngramError::NotFound(_) => ErrorData::resource_not_found(e.to_string(), None),
                other => ErrorData::internal_error(other.to_string(), None),
            })?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }
}
