//! Server bootstrap for the three transports.
//!
//! [`serve_stdio`] and [`serve_http`] expose the MCP tool surface over stdio
//! and Streamable HTTP; [`serve_api`] runs the REST + WebSocket facade. Each
//! command builds its own [`Dispatcher`] over the configured database, so
//! separate processes share stored memories through SQLite, while live
//! broadcasts reach the WebSocket viewers of the process that served the
//! mutation.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use rmcp::ServiceExt;

use crate::api;
use crate::bridge::Bridge;
use crate::config::EngramConfig;
use crate::db;
use crate::dispatch::Dispatcher;
use crate::embedding;
use crate::tools::EngramTools;

/// Shared setup: open the database, create the embedding provider and the
/// broadcast bridge, and wire them into a dispatcher.
fn setup_shared_state(config: EngramConfig) -> Result<Arc<Dispatcher>> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let db = Arc::new(Mutex::new(conn));

    let provider = embedding::create_provider(&config.embedding)?;
    let embedding: Arc<dyn embedding::EmbeddingProvider> = Arc::from(provider);
    tracing::info!("embedding provider ready");

    let bridge = Arc::new(Bridge::new(config.bridge.event_buffer));
    let config = Arc::new(config);

    Ok(Arc::new(Dispatcher::new(db, embedding, bridge, config)))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: EngramConfig) -> Result<()> {
    tracing::info!("starting Engram MCP server on stdio");

    let dispatcher = setup_shared_state(config)?;

    let tools = EngramTools::new(dispatcher);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport at `/mcp`.
pub async fn serve_http(config: EngramConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting Engram MCP server on HTTP");

    let dispatcher = setup_shared_state(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(EngramTools::new(dispatcher.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Start the REST + WebSocket facade.
pub async fn serve_api(config: EngramConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting Engram web facade");

    let dispatcher = setup_shared_state(config)?;
    let router = api::router(dispatcher);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "web facade listening — viewers connect at ws://{bind_addr}/ws");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        return;
    }
    tracing::info!("shutting down");
}
