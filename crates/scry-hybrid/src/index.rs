//! C4: the hybrid index. Holds parallel `ids`, sparse rows,
//! and dense rows in memory; `flush()` only updates that in-memory image,
//! `rebuild()` additionally writes the triple plus `meta.json` to `<dir>`
//! via [`on_disk`], atomically per file.

use crate::embedder::{Embedder, cosine_similarity};
use crate::on_disk::{self, HybridMeta};
use scry_core::error::EmbedderError;
use scry_core::types::ParseResult;
use scry_sparse::csr::to_csr;
use scry_sparse::ngram::{SparseConfig, SparseVector, ngram_sparse, sparse_cosine};
use scry_sparse::text::ast_to_text;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HybridIndexError {
    #[error("embedder error: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("io error persisting hybrid index: {0}")]
    Io(#[from] std::io::Error),
}

struct PendingItem {
    id: String,
    text: String,
    sparse: SparseVector,
}

/// Relative contribution of each signal to the combined score.
#[derive(Debug, Clone, Copy)]
pub struct SearchWeights {
    pub w_sparse: f32,
    pub w_dense: f32,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            w_sparse: 0.5,
            w_dense: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub combined_score: f32,
    pub sparse_score: f32,
    pub dense_score: f32,
}

/// In-memory hybrid index image plus its on-disk location. `dense_rows[i]`
/// corresponds to `ids[i]` and `sparse_rows[i]`; row order is insertion
/// order.
pub struct HybridIndex {
    dir: PathBuf,
    sparse_cfg: SparseConfig,
    dim: usize,
    ids: Vec<String>,
    sparse_rows: Vec<SparseVector>,
    dense_rows: Vec<Vec<f32>>,
    pending: Vec<PendingItem>,
    /// Set once the embedder has failed in a way that is fatal for the
    /// vector path.
    /// Once set, `flush()` stops calling the embedder and `search()`
    /// degrades to lexical-only.
    embedder_failed: bool,
}

impl HybridIndex {
    pub fn new(dir: impl Into<PathBuf>, dim: usize, sparse_cfg: SparseConfig) -> Self {
        Self {
            dir: dir.into(),
            sparse_cfg,
            dim,
            ids: Vec::new(),
            sparse_rows: Vec::new(),
            dense_rows: Vec::new(),
            pending: Vec::new(),
            embedder_failed: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dense_available(&self) -> bool {
        !self.embedder_failed
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The dense row for `id`, if present and the vector path is live. Lets
    /// a caller that just `flush()`ed persist the same computed vector into
    /// the relational `embeddings` table without re-embedding.
    pub fn dense_row(&self, id: &str) -> Option<&[f32]> {
        if self.embedder_failed {
            return None;
        }
        let pos = self.ids.iter().position(|existing| existing == id)?;
        Some(&self.dense_rows[pos])
    }

    /// The n-gram config this index was built with; callers must hash their
    /// query text the same way before calling [`HybridIndex::search`].
    pub fn sparse_config(&self) -> SparseConfig {
        self.sparse_cfg
    }

    /// Serializes `parsed` to text, computes
    /// its sparse vector immediately, and queues the pair for the next
    /// `flush()` (which computes the dense vector in a batch).
    pub fn add(&mut self, id: impl Into<String>, file_path: &str, parsed: &ParseResult) {
        let text = ast_to_text(file_path, parsed);
        let sparse = ngram_sparse(&text, &self.sparse_cfg);
        self.pending.push(PendingItem {
            id: id.into(),
            text,
            sparse,
        });
    }

    /// Embeds every queued item in one batch and appends the resulting rows
    /// to the in-memory image. Returns the number of items flushed. Does
    /// *not* touch disk — callers that need the on-disk image to reflect
    /// this call follow it with [`HybridIndex::rebuild`].
    ///
    /// If the embedder fails in a way that is fatal for the vector path,
    /// the flush still succeeds: queued items get a zero dense vector and
    /// the index permanently degrades to lexical-only (`dense_available()`
    /// becomes `false`). A non-fatal (retryable) embedder error leaves
    /// `pending` untouched and returns an error so the caller can retry.
    pub fn flush(&mut self, embedder: &dyn Embedder) -> Result<usize, HybridIndexError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = self.pending.iter().map(|p| p.text.clone()).collect();
        let dense_vectors = if self.embedder_failed {
            vec![vec![0.0_f32; self.dim]; texts.len()]
        } else {
            match embedder.embed(&texts) {
                Ok(vectors) => vectors,
                Err(err) if err.is_fatal_for_vector_path() => {
                    tracing::warn!(error = %err, "embedder failed fatally; degrading to lexical-only");
                    self.embedder_failed = true;
                    vec![vec![0.0_f32; self.dim]; texts.len()]
                }
                Err(err) => return Err(err.into()),
            }
        };

        let flushed = self.pending.len();
        for (item, dense) in self.pending.drain(..).zip(dense_vectors) {
            self.ids.push(item.id);
            self.sparse_rows.push(item.sparse);
            self.dense_rows.push(dense);
        }

        Ok(flushed)
    }

    /// Flushes any still-queued items, then materializes CSR from all
    /// sparse rows, packs the dense rows into a row-major matrix, and writes
    /// all four files atomically. This is the only operation that touches
    /// disk; callers (the incremental indexer, a full reindex) decide how
    /// often to call it relative to `add`/`flush`.
    pub fn rebuild(&mut self, embedder: &dyn Embedder, now: i64) -> Result<(), HybridIndexError> {
        self.flush(embedder)?;
        self.persist(now)?;
        Ok(())
    }

    /// Loads the on-disk image into memory, replacing whatever is held now.
    /// Returns `false` (and leaves `self` untouched) if the image is
    /// missing, corrupt, or disagrees with `self.dim` — the caller should
    /// treat that as "force a rebuild."
    pub fn load(&mut self) -> bool {
        let Some(image) = on_disk::load_all(&self.dir, self.dim) else {
            return false;
        };
        let sparse_rows = scry_sparse::csr::from_csr(&image.csr);
        let dense_rows = image
            .dense
            .chunks(self.dim)
            .map(|chunk| chunk.to_vec())
            .collect();

        self.ids = image.ids;
        self.sparse_rows = sparse_rows;
        self.dense_rows = dense_rows;
        self.embedder_failed = !image.meta.dense_available;
        true
    }

    /// O(N) linear remove-and-swap (per the decided simplification over a
    /// tombstone scheme — acceptable at this index's expected scale).
    /// Returns `true` if `id` was present.
    pub fn remove(&mut self, id: &str) -> bool {
        if let Some(pos) = self.ids.iter().position(|existing| existing == id) {
            self.ids.swap_remove(pos);
            self.sparse_rows.swap_remove(pos);
            self.dense_rows.swap_remove(pos);
            true
        } else {
            false
        }
    }

    /// Combines sparse and dense cosine similarity per `weights`, falling
    /// back to sparse-only scoring when the dense path is unavailable
    /// (embedder never initialized, or failed fatally, or the caller has no
    /// query embedding). Returns at most `limit` hits sorted by descending
    /// combined score.
    pub fn search(
        &self,
        query_sparse: &SparseVector,
        query_dense: Option<&[f32]>,
        limit: usize,
        weights: &SearchWeights,
    ) -> Vec<SearchHit> {
        if self.is_empty() {
            return Vec::new();
        }

        let dense_usable = query_dense.is_some() && self.dense_available();
        let mut hits: Vec<SearchHit> = (0..self.ids.len())
            .map(|i| {
                let sparse_score = sparse_cosine(query_sparse, &self.sparse_rows[i]);
                let dense_score = if dense_usable {
                    cosine_similarity(query_dense.unwrap(), &self.dense_rows[i])
                } else {
                    0.0
                };
                let combined_score = if dense_usable {
                    weights.w_sparse * sparse_score + weights.w_dense * dense_score
                } else {
                    sparse_score
                };
                SearchHit {
                    id: self.ids[i].clone(),
                    combined_score,
                    sparse_score,
                    dense_score,
                }
            })
            .collect();

        hits.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
        hits.truncate(limit);
        hits
    }

    fn persist(&self, now: i64) -> Result<(), HybridIndexError> {
        let csr = to_csr(&self.sparse_rows);
        let dense_flat: Vec<f32> = self.dense_rows.iter().flatten().copied().collect();
        let meta = HybridMeta::new(
            self.dim,
            self.sparse_cfg.num_features,
            self.ids.len(),
            now,
            !self.embedder_failed,
        );
        on_disk::write_all(&self.dir, &self.ids, &csr, &dense_flat, &meta)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::types::{ASTDoc, ParseResult, ParsedSymbol, Span, SymbolKind};
    use tempfile::tempdir;

    struct StubEmbedder {
        dim: usize,
    }

    impl Embedder for StubEmbedder {
        fn init(&mut self) -> Result<(), EmbedderError> {
            Ok(())
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0_f32; self.dim];
                    v[t.len() % self.dim] = 1.0;
                    v
                })
                .collect())
        }

        fn dim(&self) -> usize {
            self.dim
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn init(&mut self) -> Result<(), EmbedderError> {
            Ok(())
        }

        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Err(EmbedderError::Initialization("no model available".to_string()))
        }

        fn dim(&self) -> usize {
            8
        }
    }

    fn sample_parse_result(name: &str) -> ParseResult {
        ParseResult {
            language: "rust".to_string(),
            doc: ASTDoc {
                symbols: vec![ParsedSymbol {
                    name: name.to_string(),
                    kind: SymbolKind::Function,
                    span: Span {
                        start_line: 1,
                        start_column: 0,
                        end_line: 1,
                        end_column: 10,
                        start_byte: 0,
                        end_byte: 10,
                    },
                    parents: Vec::new(),
                    signature: None,
                    documentation: None,
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn add_flush_and_search_roundtrip() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder { dim: 8 };
        let mut index = HybridIndex::new(dir.path(), 8, SparseConfig::default());

        index.add("a", "a.rs", &sample_parse_result("alpha"));
        index.add("b", "b.rs", &sample_parse_result("beta"));
        let flushed = index.flush(&embedder).unwrap();

        assert_eq!(flushed, 2);
        assert_eq!(index.len(), 2);

        let query = ngram_sparse("alpha", &SparseConfig::default());
        let hits = index.search(&query, None, 10, &SearchWeights::default());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn flush_is_a_no_op_when_nothing_is_pending() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder { dim: 8 };
        let mut index = HybridIndex::new(dir.path(), 8, SparseConfig::default());
        assert_eq!(index.flush(&embedder).unwrap(), 0);
    }

    #[test]
    fn fatal_embedder_failure_degrades_to_lexical_only() {
        let dir = tempdir().unwrap();
        let embedder = FailingEmbedder;
        let mut index = HybridIndex::new(dir.path(), 8, SparseConfig::default());
        index.add("a", "a.rs", &sample_parse_result("alpha"));

        let flushed = index.flush(&embedder).unwrap();
        assert_eq!(flushed, 1);
        assert!(!index.dense_available());

        let query = ngram_sparse("alpha", &SparseConfig::default());
        let hits = index.search(&query, Some(&[1.0; 8]), 10, &SearchWeights::default());
        assert_eq!(hits[0].dense_score, 0.0);
    }

    #[test]
    fn remove_drops_the_matching_row() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder { dim: 8 };
        let mut index = HybridIndex::new(dir.path(), 8, SparseConfig::default());
        index.add("a", "a.rs", &sample_parse_result("alpha"));
        index.add("b", "b.rs", &sample_parse_result("beta"));
        index.flush(&embedder).unwrap();

        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.ids[0], "b");
    }

    #[test]
    fn rebuild_writes_an_on_disk_image_that_load_can_restore() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder { dim: 8 };
        {
            let mut index = HybridIndex::new(dir.path(), 8, SparseConfig::default());
            index.add("a", "a.rs", &sample_parse_result("alpha"));
            index.rebuild(&embedder, 42).unwrap();
        }

        let mut reloaded = HybridIndex::new(dir.path(), 8, SparseConfig::default());
        assert!(reloaded.load());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.ids[0], "a");
    }

    #[test]
    fn flush_alone_does_not_touch_disk() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder { dim: 8 };
        let mut index = HybridIndex::new(dir.path(), 8, SparseConfig::default());
        index.add("a", "a.rs", &sample_parse_result("alpha"));
        index.flush(&embedder).unwrap();

        let mut reloaded = HybridIndex::new(dir.path(), 8, SparseConfig::default());
        assert!(!reloaded.load(), "flush() must not write hybrid/meta.json or the other on-disk files");
    }

    #[test]
    fn load_fails_cleanly_when_no_image_exists() {
        let dir = tempdir().unwrap();
        let mut index = HybridIndex::new(dir.path(), 8, SparseConfig::default());
        assert!(!index.load());
        assert!(index.is_empty());
    }

    #[test]
    fn search_on_empty_index_returns_no_hits() {
        let dir = tempdir().unwrap();
        let index = HybridIndex::new(dir.path(), 8, SparseConfig::default());
        let query = ngram_sparse("anything", &SparseConfig::default());
        assert!(index.search(&query, None, 10, &SearchWeights::default()).is_empty());
    }
}
