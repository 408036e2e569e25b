//! FNV-1a 32-bit n-gram hashing into a fixed-size bucket space, L2-normalized
//!. The hashing style mirrors the `stable_hash`
//! pattern used for a hashed bag-of-tokens embedding elsewhere in this
//! retrieval stack's lineage, adapted to FNV-1a 32-bit over n-grams rather
//! than 64-bit over whole tokens.

use std::collections::BTreeMap;

/// `num_features` must be a power of two.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseConfig {
    pub min_gram: usize,
    pub max_gram: usize,
    pub num_features: usize,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            min_gram: scry_core::constants::DEFAULT_MIN_GRAM,
            max_gram: scry_core::constants::DEFAULT_MAX_GRAM,
            num_features: scry_core::constants::DEFAULT_NUM_FEATURES,
        }
    }
}

impl SparseConfig {
    pub fn is_valid(&self) -> bool {
        self.min_gram >= 1
            && self.max_gram >= self.min_gram
            && self.num_features > 0
            && self.num_features.is_power_of_two()
    }
}

/// A sparse vector as an ordered `(bucket, value)` feature map. `BTreeMap`
/// keeps buckets in ascending order for free, which CSR encoding and the
/// determinism property both depend on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub features: BTreeMap<u32, f32>,
}

impl SparseVector {
    pub fn l2_norm(&self) -> f32 {
        self.features.values().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Normalize whitespace to single spaces and trim.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true; // treat leading whitespace as already-seen
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Build an L2-normalized sparse vector from `text` via hashed character
/// n-grams.
pub fn ngram_sparse(text: &str, cfg: &SparseConfig) -> SparseVector {
    debug_assert!(cfg.is_valid(), "SparseConfig must have a power-of-two num_features");

    let normalized = normalize_whitespace(text);
    let chars: Vec<char> = normalized.chars().collect();
    let len = chars.len();

    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for n in cfg.min_gram..=cfg.max_gram {
        if n == 0 || n > len {
            continue;
        }
        for start in 0..=(len - n) {
            let gram: String = chars[start..start + n].iter().collect();
            let hash = fnv1a_32(gram.as_bytes());
            let bucket = hash % (cfg.num_features as u32);
            *counts.entry(bucket).or_insert(0) += 1;
        }
    }

    if counts.is_empty() {
        return SparseVector::default();
    }

    let sum_sq: f64 = counts.values().map(|&v| f64::from(v) * f64::from(v)).sum();
    let norm = sum_sq.sqrt();
    if norm == 0.0 {
        return SparseVector::default();
    }

    let features = counts
        .into_iter()
        .map(|(bucket, count)| (bucket, (f64::from(count) / norm) as f32))
        .collect();

    SparseVector { features }
}

/// Cosine similarity between two (assumed-normalized) sparse vectors,
/// iterating over the smaller feature map.
pub fn sparse_cosine(a: &SparseVector, b: &SparseVector) -> f32 {
    let (small, large) = if a.features.len() <= b.features.len() {
        (a, b)
    } else {
        (b, a)
    };
    let mut dot = 0.0_f32;
    for (bucket, value) in &small.features {
        if let Some(other) = large.features.get(bucket) {
            dot += value * other;
        }
    }
    dot.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_byte_identical_output() {
        let cfg = SparseConfig::default();
        let a = ngram_sparse("The Quick Brown   Fox\tjumps", &cfg);
        let b = ngram_sparse("The Quick Brown   Fox\tjumps", &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn l2_norm_is_zero_or_one() {
        let cfg = SparseConfig::default();
        let empty = ngram_sparse("", &cfg);
        assert_eq!(empty.l2_norm(), 0.0);

        let v = ngram_sparse("function hello world", &cfg);
        assert!((v.l2_norm() - 1.0).abs() <= 1e-6);
    }

    #[test]
    fn self_cosine_is_approximately_one() {
        let cfg = SparseConfig::default();
        let v = ngram_sparse("async function fetchData(url: string)", &cfg);
        let sim = sparse_cosine(&v, &v);
        assert!((sim - 1.0).abs() < 1e-4, "sim={sim}");
    }

    #[test]
    fn disjoint_texts_have_low_similarity() {
        let cfg = SparseConfig::default();
        let a = ngram_sparse("zzzzzzzzzzzzzzzzzzzz", &cfg);
        let b = ngram_sparse("qqqqqqqqqqqqqqqqqqqq", &cfg);
        assert!(sparse_cosine(&a, &b) < 0.5);
    }

    #[test]
    fn whitespace_variants_normalize_identically() {
        let cfg = SparseConfig::default();
        let a = ngram_sparse("  hello   world  ", &cfg);
        let b = ngram_sparse("hello world", &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn num_features_must_be_power_of_two() {
        let cfg = SparseConfig {
            min_gram: 3,
            max_gram: 5,
            num_features: 100,
        };
        assert!(!cfg.is_valid());
    }
}
