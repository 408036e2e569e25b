//! C3: the dense embedder capability. The core consumes this
//! trait; ONNX Runtime/tokenizer/model-download specifics are explicitly
//! out of scope and live behind a concrete implementation that is
//! not wired by default (see `hashing.rs` for the in-tree stand-in used by
//! tests and the default CLI path).

use scry_core::error::EmbedderError;

/// Batched, L2-normalized dense embeddings over fixed-dimension vectors.
pub trait Embedder: Send + Sync {
    /// Idempotent; fails if the backing model is missing.
    fn init(&mut self) -> Result<(), EmbedderError>;

    /// One unit-norm vector per input text, same order as `texts`.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    fn dim(&self) -> usize;

    fn dispose(&mut self) {}
}

/// Dot product of two (assumed-normalized) dense vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_unit_vectors_is_one() {
        let v = vec![0.6_f32, 0.8_f32];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
