//! `scry diagnose [--fix] [--report] [--json]`: re-runs the
//! integrity/foreign-key checks C1 already ran at `open` time, plus a
//! couple of environment checks, and reports pass/fail per check. Exits
//! non-zero when any check fails.

use crate::project;
use anyhow::Result;
use scry_core::constants::DEFAULT_EMBEDDING_DIM;
use scry_hybrid::HybridIndex;
use std::path::Path;

struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

pub fn run(path: Option<String>, config_file: Option<&Path>, fix: bool, report: bool, json: bool) -> Result<()> {
    let root = project::resolve_root(path)?;
    let config = project::load_config(&root, config_file)?;

    let mut checks = Vec::new();
    let meta_dir = config.meta_dir(&root);
    let initialized = meta_dir.join("config.toml").exists();
    checks.push(Check {
        name: "project initialized",
        ok: initialized,
        detail: meta_dir.display().to_string(),
    });

    let mut healthy = initialized;
    let mut store_ok = false;
    let mut hybrid_needs_rebuild = false;

    if initialized {
        match project::open_store(&root, &config) {
            Ok(store) => {
                match store.diagnose() {
                    Ok((ok, violations)) => {
                        checks.push(Check {
                            name: "store integrity_check",
                            ok,
                            detail: if ok { "ok".to_string() } else { "integrity_check did not return ok".to_string() },
                        });
                        let fk_ok = violations.is_empty();
                        checks.push(Check {
                            name: "store foreign_key_check",
                            ok: fk_ok,
                            detail: if fk_ok { "ok".to_string() } else { violations.join("; ") },
                        });
                        healthy = healthy && ok && fk_ok;
                        store_ok = ok && fk_ok;
                    }
                    Err(e) => {
                        checks.push(Check {
                            name: "store integrity_check",
                            ok: false,
                            detail: e.to_string(),
                        });
                        healthy = false;
                    }
                }

                if fix && store_ok {
                    match project::run_maintenance(&root, &config, &store) {
                        Ok(report) => println!(
                            "maintenance: hard-deleted {} file(s)/{} symbol(s)/{} chunk(s), vacuumed={}, backups_pruned={}",
                            report.files_hard_deleted,
                            report.symbols_hard_deleted,
                            report.chunks_hard_deleted,
                            report.vacuumed,
                            report.backups_pruned,
                        ),
                        Err(e) => println!("maintenance: failed to run ({e})"),
                    }
                }
            }
            Err(e) => {
                checks.push(Check {
                    name: "store open",
                    ok: false,
                    detail: e.to_string(),
                });
                healthy = false;
            }
        }

        let mut hybrid = HybridIndex::new(config.hybrid_dir(&root), DEFAULT_EMBEDDING_DIM, scry_sparse::SparseConfig::default());
        let loaded = hybrid.load();
        hybrid_needs_rebuild = !loaded;
        checks.push(Check {
            name: "hybrid index",
            ok: true,
            detail: if !loaded {
                "on-disk image missing or disagrees with the store (run `scry index --force` or `diagnose --fix`)".to_string()
            } else if hybrid.is_empty() {
                "empty (run `scry index`)".to_string()
            } else {
                format!("{} items, dim={}, dense_available={}", hybrid.len(), hybrid.dim(), hybrid.dense_available())
            },
        });
    } else {
        checks.push(Check {
            name: "hint",
            ok: false,
            detail: "run `scry init` first".to_string(),
        });
    }

    if fix && hybrid_needs_rebuild && store_ok {
        println!("hybrid index: on-disk image missing or stale, running a full reindex to rebuild it...");
        match crate::commands::index::run(
            Some(root.to_string_lossy().into_owned()),
            config_file,
            true,
            None,
            false,
        ) {
            Ok(()) => println!("hybrid index: rebuilt via full reindex."),
            Err(e) => println!("hybrid index: rebuild failed ({e})"),
        }
    } else if fix && !store_ok {
        println!("--fix: skipping hybrid index rebuild because the store failed its integrity checks; restore from a backup under {} first.", config.backups_dir(&root).display());
    }

    if json {
        let payload = serde_json::json!({
            "healthy": healthy,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "ok": c.ok,
                "detail": c.detail,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Diagnosis for {}", root.display());
        for check in &checks {
            println!("  [{}] {}: {}", if check.ok { "ok" } else { "FAIL" }, check.name, check.detail);
        }
        if report {
            println!(
                "\nenvironment: os={} arch={} scry={}",
                std::env::consts::OS,
                std::env::consts::ARCH,
                env!("CARGO_PKG_VERSION")
            );
        }
    }

    if !healthy {
        anyhow::bail!("project is unhealthy; see checks above");
    }
    Ok(())
}
