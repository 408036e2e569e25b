//! `embeddings` repository.
//!
//! The BLOB is exactly `dim * 4` bytes, little-endian f32, L2-normalized
//!.

use rusqlite::{Connection, OptionalExtension, params};
use scry_core::error::StoreError;
use scry_core::types::Embedding;

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn insert(conn: &Connection, embedding: &Embedding) -> Result<(), StoreError> {
    let bytes = encode_vector(&embedding.vector);
    conn.execute(
        "INSERT INTO embeddings (chunk_id, embedding, model, dim, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(chunk_id, model) DO UPDATE SET
             embedding = excluded.embedding, dim = excluded.dim, created_at = excluded.created_at",
        params![
            embedding.chunk_id,
            bytes,
            embedding.model,
            embedding.vector.len() as i64,
            embedding.created_at,
        ],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

pub fn get(conn: &Connection, chunk_id: &str, model: &str) -> Result<Option<Embedding>, StoreError> {
    conn.query_row(
        "SELECT chunk_id, embedding, model, created_at FROM embeddings WHERE chunk_id = ?1 AND model = ?2",
        params![chunk_id, model],
        |row| {
            let bytes: Vec<u8> = row.get(1)?;
            Ok(Embedding {
                chunk_id: row.get(0)?,
                vector: decode_vector(&bytes),
                model: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(StoreError::database)
}

pub fn delete_for_chunk(conn: &Connection, chunk_id: &str) -> Result<u64, StoreError> {
    let n = conn
        .execute("DELETE FROM embeddings WHERE chunk_id = ?1", params![chunk_id])
        .map_err(StoreError::database)?;
    Ok(n as u64)
}

/// Brute-force cosine similarity over every live embedding for `model`
///: loads all rows, computes O(N) similarity,
/// filters by `min_similarity`, returns the top-k sorted descending.
pub fn find_similar(
    conn: &Connection,
    model: &str,
    query_vector: &[f32],
    top_k: usize,
    min_similarity: f32,
) -> Result<Vec<(String, f32)>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT e.chunk_id, e.embedding FROM embeddings e
             JOIN chunks c ON c.id = e.chunk_id
             WHERE e.model = ?1 AND c.deleted_at IS NULL",
        )
        .map_err(StoreError::database)?;
    let rows = stmt
        .query_map(params![model], |row| {
            let chunk_id: String = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((chunk_id, decode_vector(&bytes)))
        })
        .map_err(StoreError::database)?;

    let mut scored: Vec<(String, f32)> = Vec::new();
    for row in rows {
        let (chunk_id, vector) = row.map_err(StoreError::database)?;
        let sim = cosine(query_vector, &vector);
        if sim >= min_similarity {
            scored.push((chunk_id, sim));
        }
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>().clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{chunks, files};
    use crate::{db, schema};
    use scry_core::config::StorageConfig;
    use scry_core::types::{Chunk, File};
    use tempfile::tempdir;

    fn conn() -> Connection {
        let dir = tempdir().unwrap();
        let c = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        std::mem::forget(dir);
        schema::create_tables(&c).unwrap();
        files::insert(
            &c,
            &File {
                id: "f1".into(),
                path: "a.rs".into(),
                content_hash: "h".into(),
                language: None,
                size_bytes: 1,
                modified_at: 0,
                indexed_at: 0,
                deleted_at: None,
            },
        )
        .unwrap();
        c
    }

    fn insert_chunk(c: &Connection, id: &str) {
        chunks::insert(
            c,
            &Chunk {
                id: id.into(),
                file_id: "f1".into(),
                symbol_id: None,
                text: "x".into(),
                documentation: None,
                anchor: "a.rs:1:0".into(),
                deleted_at: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn blob_round_trips_exactly() {
        let c = conn();
        insert_chunk(&c, "c1");
        let vector = vec![0.6, 0.8, 0.0];
        insert(
            &c,
            &Embedding {
                chunk_id: "c1".into(),
                vector: vector.clone(),
                model: "m1".into(),
                created_at: 0,
            },
        )
        .unwrap();
        let found = get(&c, "c1", "m1").unwrap().unwrap();
        assert_eq!(found.vector, vector);
    }

    #[test]
    fn find_similar_sorts_descending_and_filters() {
        let c = conn();
        insert_chunk(&c, "c1");
        insert_chunk(&c, "c2");
        insert_chunk(&c, "c3");
        insert(&c, &Embedding { chunk_id: "c1".into(), vector: vec![1.0, 0.0], model: "m".into(), created_at: 0 }).unwrap();
        insert(&c, &Embedding { chunk_id: "c2".into(), vector: vec![0.0, 1.0], model: "m".into(), created_at: 0 }).unwrap();
        insert(&c, &Embedding { chunk_id: "c3".into(), vector: vec![0.99, 0.14], model: "m".into(), created_at: 0 }).unwrap();

        let results = find_similar(&c, "m", &[1.0, 0.0], 2, 0.5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "c1");
        assert_eq!(results[1].0, "c3");
    }
}
