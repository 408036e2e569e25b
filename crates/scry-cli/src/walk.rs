//! Full-tree scan used by `index`/`refresh` with no explicit file list:
//! walks the project with `ignore::WalkBuilder` (respecting `.gitignore`)
//! plus this engine's own `IgnoreFilter` layering, and turns every
//! discovered regular file into a synthetic `Create` event so the same
//! `IncrementalIndexer` batch path used by `watch` applies here too.

use ignore::WalkBuilder;
use scry_watch::{Batch, ChangeEvent, ChangeKind, IgnoreFilter};
use std::path::Path;

pub fn scan_paths(root: &Path, ignore: &IgnoreFilter, follow_symlinks: bool) -> Vec<String> {
    let mut walker = WalkBuilder::new(root);
    walker
        .hidden(false)
        .follow_links(follow_symlinks)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false);

    let mut paths = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "walk error");
                continue;
            }
        };
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if ignore.is_ignored(&relative_str, is_dir) {
            continue;
        }
        if !is_dir {
            paths.push(relative_str);
        }
    }
    paths
}

/// Chunks `paths` into `Create`-event batches of at most `batch_size`.
pub fn batches_for(paths: Vec<String>, batch_size: usize) -> Vec<Batch> {
    paths
        .chunks(batch_size.max(1))
        .map(|chunk| Batch {
            events: chunk
                .iter()
                .map(|path| ChangeEvent {
                    path: path.clone(),
                    kind: ChangeKind::Create,
                    high_priority: false,
                })
                .collect(),
        })
        .collect()
}
