//! The extraction seam: this core is explicitly a consumer of
//! an external, language-aware extractor, never an implementor of one. The
//! [`Parser`] trait mirrors [`scry_hybrid::Embedder`]'s shape -- a small
//! capability interface the indexer depends on by trait object, so a real
//! tree-sitter-backed extractor can be swapped in without touching
//! [`crate::indexer`].
//!
//! [`PlainTextParser`] is the default implementation: it produces exactly
//! one catch-all symbol spanning the whole file, with no structural
//! extraction. It exists so the indexer has something to run against
//! before a real grammar is wired in, and as the tests' fixture parser.

use scry_core::error::ParseError;
use scry_core::types::{ASTDoc, ParseResult, ParsedSymbol, Span, SymbolKind};

pub trait Parser: Send + Sync {
    /// Parses file `path` (relative to the project root) given its raw
    /// bytes. Implementations detect the language themselves; `path`'s
    /// extension is the only hint this trait guarantees is available.
    fn parse(&self, path: &str, content: &[u8]) -> Result<ParseResult, ParseError>;
}

/// Extension -> language-name table for the handful of extensions this
/// workspace's own source uses, so the default parser's `language` field
/// is not always `"unknown"`. Not a substitute for real grammar detection.
const KNOWN_EXTENSIONS: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("py", "python"),
    ("go", "go"),
    ("java", "java"),
    ("rb", "ruby"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("hpp", "cpp"),
    ("md", "markdown"),
    ("toml", "toml"),
    ("json", "json"),
];

fn detect_language(path: &str) -> String {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    KNOWN_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| lang.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Wraps the whole file in a single catch-all [`ParsedSymbol`] of kind
/// [`SymbolKind::Module`]. The indexer still derives one chunk
/// per symbol plus a file-level chunk; with this parser those collapse to
/// the same chunk, which is the expected degraded behavior without a real
/// grammar.
#[derive(Debug, Default)]
pub struct PlainTextParser {
    max_bytes: usize,
}

impl PlainTextParser {
    /// `max_bytes` caps how much of a large file is decoded as text before
    /// giving up.
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Parser for PlainTextParser {
    fn parse(&self, path: &str, content: &[u8]) -> Result<ParseResult, ParseError> {
        let bound = content.len().min(self.max_bytes.max(1));
        let text = String::from_utf8_lossy(&content[..bound]);
        let line_count = text.lines().count().max(1) as u32;
        let end_column = text.lines().last().map(|l| l.chars().count()).unwrap_or(0) as u32;

        let symbol = ParsedSymbol {
            name: path
                .rsplit('/')
                .next()
                .unwrap_or(path)
                .to_string(),
            kind: SymbolKind::Module,
            span: Span {
                start_line: 1,
                start_column: 0,
                end_line: line_count,
                end_column,
                start_byte: 0,
                end_byte: bound as u64,
            },
            parents: Vec::new(),
            signature: None,
            documentation: None,
        };

        Ok(ParseResult {
            language: detect_language(path),
            doc: ASTDoc {
                symbols: vec![symbol],
                imports: Vec::new(),
                exports: Vec::new(),
                calls: Vec::new(),
                doc_comments: Vec::new(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_whole_file_in_one_module_symbol() {
        let parser = PlainTextParser::new(1_000_000);
        let result = parser.parse("src/lib.rs", b"fn main() {}\nfn other() {}\n").unwrap();
        assert_eq!(result.language, "rust");
        assert_eq!(result.doc.symbols.len(), 1);
        assert_eq!(result.doc.symbols[0].kind, SymbolKind::Module);
        assert_eq!(result.doc.symbols[0].name, "lib.rs");
    }

    #[test]
    fn unknown_extension_yields_unknown_language() {
        let parser = PlainTextParser::new(1_000_000);
        let result = parser.parse("README", b"hello").unwrap();
        assert_eq!(result.language, "unknown");
    }

    #[test]
    fn truncates_at_max_bytes() {
        let parser = PlainTextParser::new(4);
        let result = parser.parse("a.txt", b"abcdefgh").unwrap();
        assert_eq!(result.doc.symbols[0].span.end_byte, 4);
    }
}
