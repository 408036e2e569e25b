//! `ast_to_text`: deterministic serialization of a `ParseResult` into the
//! text that feeds `ngram_sparse`. The exact field order below
//! is part of the on-disk hybrid-index contract.2): a
//! `schema_version` in `hybrid/meta.json` guards against silent drift if
//! this ordering ever changes.

use scry_core::types::ParseResult;

/// Concatenate, in order: file path; for each symbol its name, kind,
/// signature, documentation, dotted parent chain; import sources and
/// specifiers; export specifiers; call targets and receivers; free-standing
/// documentation text. Lowercased, whitespace-normalized.
pub fn ast_to_text(file_path: &str, parsed: &ParseResult) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(file_path.to_string());

    for symbol in &parsed.doc.symbols {
        parts.push(symbol.name.clone());
        parts.push(symbol.kind.as_str().to_string());
        if let Some(sig) = &symbol.signature {
            parts.push(sig.clone());
        }
        if let Some(doc) = &symbol.documentation {
            parts.push(doc.clone());
        }
        if !symbol.parents.is_empty() {
            parts.push(symbol.parents.join("."));
        }
    }

    for import in &parsed.doc.imports {
        parts.push(import.source.clone());
        for specifier in &import.specifiers {
            parts.push(specifier.clone());
        }
    }

    for export in &parsed.doc.exports {
        for specifier in &export.specifiers {
            parts.push(specifier.clone());
        }
    }

    for call in &parsed.doc.calls {
        parts.push(call.target.clone());
        if let Some(receiver) = &call.receiver {
            parts.push(receiver.clone());
        }
    }

    for doc in &parsed.doc.doc_comments {
        parts.push(doc.clone());
    }

    let joined = parts.join(" ");
    normalize(&joined)
}

fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = true;
    for ch in lowered.chars() {
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
