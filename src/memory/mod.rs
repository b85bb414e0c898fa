pub mod ask;
pub mod forget;
pub mod fusion;
pub mod scoring;
pub mod search;
pub mod sources;
pub mod stats;
pub mod store;
pub mod timeline;
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

/// Decode a float32 vector read back from a vec0 table.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(std::mem::size_of::<f32>())
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity of two unit vectors from their sqlite-vec L2 distance.
pub fn l2_distance_to_cosine(distance: f64) -> f64 {
    1.0 - (distance * distance) / 2.0
}

/// Current time in the fixed-width RFC 3339 form stored in `timestamp` columns.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
