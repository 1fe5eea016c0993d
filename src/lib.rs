//! Engram — a shared semantic memory server for AI agents.
//!
//! Agents store free-text memories over MCP (stdio or Streamable HTTP) or a
//! small REST/WebSocket facade. Every memory is embedded locally with an ONNX
//! sentence-transformer and indexed in SQLite via sqlite-vec, so retrieval is
//! by meaning rather than keyword. Memories can be linked into a weighted
//! directed graph and explored by breadth-first traversal, and every mutation
//! is broadcast live to connected WebSocket viewers.
//!
//! All transports funnel into one [`dispatch::Dispatcher`], which owns the
//! concurrency discipline: embeddings run on the blocking pool before the
//! database lock is taken, and mutation events are published only after the
//! transaction commits.

pub mod api;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod server;
pub mod tools;
