pub mod graph;
pub mod repository;
pub mod search;
pub mod types;

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Map a sqlite-vec L2 distance to a similarity-like score in (0, 1].
/// Identical vectors score 1.0; the score decreases monotonically with
/// distance.
pub fn distance_to_score(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}
