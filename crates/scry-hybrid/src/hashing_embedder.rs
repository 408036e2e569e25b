//! A deterministic hashing `Embedder`, used as the default in-tree
//! implementation so the crate builds and is testable without a model
//! download. Grounded on the same hashed-bag-of-tokens +
//! L2-normalize shape as `other_examples/f0be8d03_..._semantic_search.rs.rs`'s
//! `embed`/`stable_hash`, generalized from 64-bit-token-hash to produce a
//! dense vector of a configurable dimension instead of a sparse one.

use crate::embedder::Embedder;
use scry_core::error::EmbedderError;

pub struct HashingEmbedder {
    dim: usize,
    initialized: bool,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            initialized: false,
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(scry_core::constants::DEFAULT_EMBEDDING_DIM)
    }
}

impl Embedder for HashingEmbedder {
    fn init(&mut self) -> Result<(), EmbedderError> {
        self.initialized = true;
        Ok(())
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if !self.initialized {
            return Err(EmbedderError::Initialization(
                "embedder not initialized; call init() first".to_string(),
            ));
        }
        Ok(texts.iter().map(|t| embed_one(t, self.dim)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn embed_one(text: &str, dim: usize) -> Vec<f32> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut vector = vec![0.0_f32; dim];
    if tokens.is_empty() {
        return vector;
    }
    for (position, token) in tokens.iter().enumerate() {
        let bucket = (stable_hash_64(token, position) as usize) % dim;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// FNV-1a 64-bit, salted with the token's position so that word order
/// contributes to the embedding (a pure bag-of-words hash would collapse
/// "fetch url" and "url fetch" to the same vector).
fn stable_hash_64(text: &str, position: usize) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes().iter().chain(position.to_le_bytes().iter()) {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_unit_norm() {
        let mut embedder = HashingEmbedder::new(64);
        embedder.init().unwrap();
        let vectors = embedder
            .embed(&["fn foo bar baz".to_string(), "class HttpClient".to_string()])
            .unwrap();
        for v in vectors {
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() <= 1e-4, "norm={norm}");
        }
    }

    #[test]
    fn deterministic_across_calls() {
        let mut embedder = HashingEmbedder::new(64);
        embedder.init().unwrap();
        let a = embedder.embed(&["hello world".to_string()]).unwrap();
        let b = embedder.embed(&["hello world".to_string()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn uninitialized_embedder_fails() {
        let embedder = HashingEmbedder::new(64);
        let err = embedder.embed(&["x".to_string()]).unwrap_err();
        assert!(matches!(err, EmbedderError::Initialization(_)));
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let mut embedder = HashingEmbedder::new(16);
        embedder.init().unwrap();
        let v = embedder.embed(&["".to_string()]).unwrap();
        assert!(v[0].iter().all(|x| *x == 0.0));
    }
}
