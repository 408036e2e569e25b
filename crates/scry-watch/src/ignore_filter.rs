//! Layered ignore-pattern matching with an LRU decision cache:
//! "ignore-pattern matcher with layered pattern sets (defaults +
//! `.gitignore` + user patterns); a per-path LRU cache ... records
//! decisions."

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use lru::LruCache;
use scry_core::error::PatternError;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

/// Patterns every project ignores regardless of its own `.gitignore`,
/// including this system's own metadata directory — without this the
/// watcher would re-trigger itself indexing its own index files.
const BUILTIN_PATTERNS: &[&str] = &[
    ".git/",
    "node_modules/",
    "target/",
    "dist/",
    "build/",
    ".venv/",
    "__pycache__/",
    "*.pyc",
    ".DS_Store",
];

pub struct IgnoreFilter {
    matcher: Gitignore,
    cache: Mutex<LruCache<String, bool>>,
}

impl IgnoreFilter {
    /// Builds the layered matcher: builtins, then the meta directory name,
    /// then `<root>/.gitignore` if present, then `extra_patterns` (config
    /// `watch.extra_ignore_patterns`), in that order so later layers
    /// (closer to user intent) can override earlier ones via `!` negation
    /// per gitignore semantics.
    pub fn build(
        root: &Path,
        meta_dir_name: &str,
        extra_patterns: &[String],
        cache_capacity: usize,
    ) -> Result<Self, PatternError> {
        let mut builder = GitignoreBuilder::new(root);

        for pattern in BUILTIN_PATTERNS {
            builder
                .add_line(None, pattern)
                .map_err(|e| PatternError::CompileFailed {
                    pattern: (*pattern).to_string(),
                    cause: e.to_string(),
                })?;
        }

        let meta_pattern = format!("{}/", meta_dir_name.trim_matches('/'));
        builder
            .add_line(None, &meta_pattern)
            .map_err(|e| PatternError::CompileFailed {
                pattern: meta_pattern.clone(),
                cause: e.to_string(),
            })?;

        let gitignore_path = root.join(".gitignore");
        if gitignore_path.is_file() {
            if let Some(err) = builder.add(&gitignore_path) {
                return Err(PatternError::CompileFailed {
                    pattern: gitignore_path.display().to_string(),
                    cause: err.to_string(),
                });
            }
        }

        for pattern in extra_patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| PatternError::CompileFailed {
                    pattern: pattern.clone(),
                    cause: e.to_string(),
                })?;
        }

        let matcher = builder.build().map_err(|e| PatternError::CompileFailed {
            pattern: "<combined ruleset>".to_string(),
            cause: e.to_string(),
        })?;

        let capacity = NonZeroUsize::new(cache_capacity.max(1)).expect("capacity clamped to >= 1");
        Ok(Self {
            matcher,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// `true` if `path` (relative to the watched root) should be ignored.
    /// Decisions are cached per path; call [`IgnoreFilter::invalidate`]
    /// after the pattern set itself changes.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        let mut cache = self.cache.lock().expect("ignore cache mutex poisoned");
        if let Some(decision) = cache.get(path) {
            return *decision;
        }
        let decision = matches!(
            self.matcher.matched_path_or_any_parents(path, is_dir),
            ignore::Match::Ignore(_)
        );
        cache.put(path.to_string(), decision);
        decision
    }

    pub fn invalidate(&self) {
        self.cache.lock().expect("ignore cache mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_patterns_ignore_node_modules_and_meta_dir() {
        let dir = tempdir().unwrap();
        let filter = IgnoreFilter::build(dir.path(), ".scry", &[], 100).unwrap();
        assert!(filter.is_ignored("node_modules/pkg/index.js", false));
        assert!(filter.is_ignored(".scry/index.db", false));
        assert!(!filter.is_ignored("src/main.rs", false));
    }

    #[test]
    fn gitignore_file_is_layered_in() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        let filter = IgnoreFilter::build(dir.path(), ".scry", &[], 100).unwrap();
        assert!(filter.is_ignored("debug.log", false));
        assert!(!filter.is_ignored("main.rs", false));
    }

    #[test]
    fn extra_patterns_are_applied() {
        let dir = tempdir().unwrap();
        let filter =
            IgnoreFilter::build(dir.path(), ".scry", &["vendor/".to_string()], 100).unwrap();
        assert!(filter.is_ignored("vendor/lib.rs", false));
    }

    #[test]
    fn decisions_are_cached_and_invalidation_clears_them() {
        let dir = tempdir().unwrap();
        let filter = IgnoreFilter::build(dir.path(), ".scry", &[], 100).unwrap();
        assert!(!filter.is_ignored("src/main.rs", false));
        // second call hits the cache path; same answer either way
        assert!(!filter.is_ignored("src/main.rs", false));
        filter.invalidate();
        assert!(!filter.is_ignored("src/main.rs", false));
    }
}
