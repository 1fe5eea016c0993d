#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use engram::bridge::Bridge;
use engram::config::EngramConfig;
use engram::dispatch::Dispatcher;
use engram::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use rusqlite::Connection;

/// Open a fresh in-memory database with the schema applied.
pub fn test_db() -> Connection {
    engram::db::open_memory_database().unwrap()
}

/// Generate a deterministic 384-dim embedding with a spike at position `seed`.
/// Each seed produces a distinct, orthogonal-ish vector.
pub fn test_embedding(seed: u8) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed as usize % EMBEDDING_DIM] = 1.0;
    v
}

/// Deterministic embedding provider for tests: each whitespace token hashes
/// to one dimension, so texts sharing words get high cosine similarity and
/// unrelated texts stay near-orthogonal. No model files required.
pub struct StubEmbeddingProvider;

impl StubEmbeddingProvider {
    fn token_dim(token: &str) -> usize {
        // FNV-1a, folded into the embedding space.
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in token.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % EMBEDDING_DIM as u64) as usize
    }
}

impl EmbeddingProvider for StubEmbeddingProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            v[Self::token_dim(token)] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
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

/// Build a dispatcher over a fresh in-memory store, the stub embedding
/// provider, and a default config.
pub fn test_dispatcher() -> Arc<Dispatcher> {
    test_dispatcher_with_db().0
}

/// Like [`test_dispatcher`], but also hands back the connection mutex so a
/// test can stall the store and control when a mutation lands.
pub fn test_dispatcher_with_db() -> (Arc<Dispatcher>, Arc<Mutex<Connection>>) {
    let db = Arc::new(Mutex::new(test_db()));
    let embedding: Arc<dyn EmbeddingProvider> = Arc::new(StubEmbeddingProvider);
    let config = Arc::new(EngramConfig::default());
    let bridge = Arc::new(Bridge::new(config.bridge.event_buffer));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&db),
        embedding,
        bridge,
        config,
    ));
    (dispatcher, db)
}
