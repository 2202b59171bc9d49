//! Brute-force cosine similarity over `f32` embeddings, and the raw
//! little-endian float32 blob encoding the persisted schema specifies.
//!
//! No native vector index is assumed; §4.5 explicitly permits a
//! brute-force scan as long as the self-exclusion, filter, and
//! tie-breaking contracts hold.

/// `score = (a·b) / (‖a‖·‖b‖)`, or `0.0` if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum();
    let norm_a: f64 = a.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Encode a vector as raw little-endian `f32` bytes for the BLOB column.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode raw little-endian `f32` bytes back into a vector. Any trailing
/// bytes that don't form a complete `f32` are dropped.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
