//! The on-disk hybrid-index image: `ids.bin`, `sparse.csr`,
//! `dense.bin`, `meta.json` under `<meta>/hybrid/`. Each file is written to
//! a temp file in the same directory and renamed into place; `rebuild()`
//! writes all four before any caller can observe a partial set.

use scry_core::constants::HYBRID_SCHEMA_VERSION;
use scry_sparse::csr::Csr;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub const IDS_FILE: &str = "ids.bin";
pub const SPARSE_FILE: &str = "sparse.csr";
pub const DENSE_FILE: &str = "dense.bin";
pub const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HybridMeta {
    pub dim: usize,
    pub num_features: usize,
    pub num_items: usize,
    pub updated_at: i64,
    /// `ast_to_text`/CSR schema version. A
    /// mismatch is treated the same as a missing file by `load()`.
    pub schema_version: u32,
    /// Whether dense rows are real embeddings (`true`) or the zero vectors
    /// written after a fatal embedder failure (`false`), so `load()` can
    /// restore lexical-only mode exactly rather than guessing from content.
    pub dense_available: bool,
}

impl HybridMeta {
    pub fn new(
        dim: usize,
        num_features: usize,
        num_items: usize,
        updated_at: i64,
        dense_available: bool,
    ) -> Self {
        Self {
            dim,
            num_features,
            num_items,
            updated_at,
            schema_version: HYBRID_SCHEMA_VERSION,
            dense_available,
        }
    }
}

fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(dir.join(file_name))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    Ok(())
}

fn read_whole(path: &Path) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut buf)?;
    Ok(buf)
}

fn encode_ids(ids: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(ids.len() as u32).to_le_bytes());
    for id in ids {
        let bytes = id.as_bytes();
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

fn decode_ids(bytes: &[u8]) -> Option<Vec<String>> {
    let mut cursor = 0usize;
    let count = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?) as usize;
    cursor += 4;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let len = u32::from_le_bytes(bytes.get(cursor..cursor + 4)?.try_into().ok()?) as usize;
        cursor += 4;
        let slice = bytes.get(cursor..cursor + len)?;
        ids.push(String::from_utf8(slice.to_vec()).ok()?);
        cursor += len;
    }
    Some(ids)
}

fn encode_csr(csr: &Csr, num_features: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(csr.num_items() as u32).to_le_bytes());
    out.extend_from_slice(&(num_features as u32).to_le_bytes());
    out.extend_from_slice(&(csr.values.len() as u32).to_le_bytes());
    for v in &csr.values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for c in &csr.col_indices {
        out.extend_from_slice(&c.to_le_bytes());
    }
    for r in &csr.row_pointers {
        out.extend_from_slice(&r.to_le_bytes());
    }
    out
}

fn decode_csr(bytes: &[u8]) -> Option<(Csr, usize)> {
    let num_items = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?) as usize;
    let num_features = u32::from_le_bytes(bytes.get(4..8)?.try_into().ok()?) as usize;
    let nnz = u32::from_le_bytes(bytes.get(8..12)?.try_into().ok()?) as usize;
    let mut cursor = 12usize;

    let mut values = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        values.push(f32::from_le_bytes(bytes.get(cursor..cursor + 4)?.try_into().ok()?));
        cursor += 4;
    }
    let mut col_indices = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        col_indices.push(u32::from_le_bytes(bytes.get(cursor..cursor + 4)?.try_into().ok()?));
        cursor += 4;
    }
    let mut row_pointers = Vec::with_capacity(num_items + 1);
    for _ in 0..=num_items {
        row_pointers.push(u32::from_le_bytes(bytes.get(cursor..cursor + 4)?.try_into().ok()?));
        cursor += 4;
    }

    Some((
        Csr {
            values,
            col_indices,
            row_pointers,
        },
        num_features,
    ))
}

fn encode_dense(dense: &[f32], dim: usize, num_items: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(num_items as u32).to_le_bytes());
    out.extend_from_slice(&(dim as u32).to_le_bytes());
    for v in dense {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_dense(bytes: &[u8]) -> Option<(Vec<f32>, usize, usize)> {
    let num_items = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?) as usize;
    let dim = u32::from_le_bytes(bytes.get(4..8)?.try_into().ok()?) as usize;
    let mut cursor = 8usize;
    let mut values = Vec::with_capacity(num_items * dim);
    for _ in 0..(num_items * dim) {
        values.push(f32::from_le_bytes(bytes.get(cursor..cursor + 4)?.try_into().ok()?));
        cursor += 4;
    }
    Some((values, num_items, dim))
}

pub struct LoadedImage {
    pub ids: Vec<String>,
    pub csr: Csr,
    pub dense: Vec<f32>,
    pub meta: HybridMeta,
}

/// Writes all four files atomically: each is written to a temp file in
/// `dir` and renamed in; `meta.json` is written last so a reader that
/// observes it also observes complete sibling files (renames within the
/// same filesystem are atomic individually; writing meta last closes the
/// remaining window to "effectively all-or-nothing" for this single-writer
/// system).
pub fn write_all(
    dir: &Path,
    ids: &[String],
    csr: &Csr,
    dense: &[f32],
    meta: &HybridMeta,
) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    write_atomic(dir, IDS_FILE, &encode_ids(ids))?;
    write_atomic(dir, SPARSE_FILE, &encode_csr(csr, meta.num_features))?;
    write_atomic(dir, DENSE_FILE, &encode_dense(dense, meta.dim, meta.num_items))?;
    let meta_json = serde_json::to_vec_pretty(meta)?;
    write_atomic(dir, META_FILE, &meta_json)?;
    Ok(())
}

/// `load()` per : returns `None` if any file is missing, corrupt,
/// or internally disagrees in length with the others (dimension mismatch,
/// schema version mismatch) — the caller treats `None` as "force rebuild".
pub fn load_all(dir: &Path, expected_dim: usize) -> Option<LoadedImage> {
    let paths: [PathBuf; 4] = [
        dir.join(META_FILE),
        dir.join(IDS_FILE),
        dir.join(SPARSE_FILE),
        dir.join(DENSE_FILE),
    ];
    if paths.iter().any(|p| !p.exists()) {
        return None;
    }

    let meta: HybridMeta = serde_json::from_slice(&read_whole(&paths[0]).ok()?).ok()?;
    if meta.schema_version != HYBRID_SCHEMA_VERSION || meta.dim != expected_dim {
        return None;
    }

    let ids = decode_ids(&read_whole(&paths[1]).ok()?)?;
    let (csr, num_features) = decode_csr(&read_whole(&paths[2]).ok()?)?;
    let (dense, dense_items, dense_dim) = decode_dense(&read_whole(&paths[3]).ok()?)?;

    if ids.len() != meta.num_items
        || csr.num_items() != meta.num_items
        || num_features != meta.num_features
        || dense_items != meta.num_items
        || dense_dim != meta.dim
    {
        return None;
    }

    Some(LoadedImage { ids, csr, dense, meta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_sparse::csr::to_csr;
    use scry_sparse::ngram::{SparseConfig, ngram_sparse};
    use tempfile::tempdir;

    #[test]
    fn round_trips_ids_csr_dense_and_meta() {
        let dir = tempdir().unwrap();
        let cfg = SparseConfig::default();
        let rows = vec![
            ngram_sparse("function foo", &cfg),
            ngram_sparse("class Bar", &cfg),
        ];
        let csr = to_csr(&rows);
        let ids = vec!["a".to_string(), "b".to_string()];
        let dense = vec![1.0, 0.0, 0.0, 1.0];
        let meta = HybridMeta::new(2, cfg.num_features, 2, 12345, true);

        write_all(dir.path(), &ids, &csr, &dense, &meta).unwrap();
        let loaded = load_all(dir.path(), 2).unwrap();

        assert_eq!(loaded.ids, ids);
        assert_eq!(loaded.csr, csr);
        assert_eq!(loaded.dense, dense);
        assert_eq!(loaded.meta, meta);
    }

    #[test]
    fn load_returns_none_when_a_file_is_missing() {
        let dir = tempdir().unwrap();
        assert!(load_all(dir.path(), 2).is_none());
    }

    #[test]
    fn load_returns_none_on_dim_mismatch() {
        let dir = tempdir().unwrap();
        let csr = to_csr(&[scry_sparse::ngram::SparseVector::default()]);
        let meta = HybridMeta::new(2, 8, 1, 0, true);
        write_all(dir.path(), &["x".to_string()], &csr, &[0.0, 0.0], &meta).unwrap();
        assert!(load_all(dir.path(), 384).is_none());
    }
}
