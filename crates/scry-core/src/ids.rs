//! Stable identifier generation: hash a namespaced string into a hex id
//! with `blake3` rather than mint a random UUID, so ids are reproducible
//! across re-indexing the same content.

/// Deterministic content hash, used for `File::content_hash` and
/// `Symbol::content_hash`.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Stable file id derived from its project-relative path. Deterministic so
/// re-indexing an unchanged path never mints a new id.
pub fn file_id(relative_path: &str) -> String {
    namespaced_id("file", relative_path)
}

/// Stable symbol id derived from file id + qualified name + span start, so
/// that edits elsewhere in the file don't change unrelated symbol ids.
pub fn symbol_id(file_id: &str, qualified_name: &str, start_byte: u64) -> String {
    namespaced_id("sym", &format!("{file_id}:{qualified_name}:{start_byte}"))
}

/// Stable chunk id derived from the owning file/symbol and anchor.
pub fn chunk_id(file_id: &str, anchor: &str) -> String {
    namespaced_id("chunk", &format!("{file_id}:{anchor}"))
}

fn namespaced_id(namespace: &str, value: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"\0");
    hasher.update(value.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_deterministic() {
        assert_eq!(file_id("src/main.rs"), file_id("src/main.rs"));
        assert_ne!(file_id("src/main.rs"), file_id("src/lib.rs"));
    }

    #[test]
    fn namespaces_do_not_collide() {
        assert_ne!(file_id("x"), symbol_id("x", "", 0));
    }

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
    }
}
