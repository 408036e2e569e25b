//! C5 (lexical search) and C6 (hybrid retrieval + ranker).

pub mod lexical;
pub mod ranking;

pub use lexical::{LexicalHit, SnippetOptions};
pub use ranking::{hybrid_search, HybridSearchError, SearchOptions};
