//! Shared data-model types. Semantic shapes only — no storage concerns here;
//! `scry-store` maps these to/from rows, `scry-hybrid`/`scry-search` operate
//! on them directly.

use serde::{Deserialize, Serialize};

/// Kind of a symbol extracted by the (external) parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
    Constant,
    Method,
    Property,
    Module,
    Namespace,
    Parameter,
    Import,
    Export,
    Decorator,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Method => "method",
            Self::Property => "property",
            Self::Module => "module",
            Self::Namespace => "namespace",
            Self::Parameter => "parameter",
            Self::Import => "import",
            Self::Export => "export",
            Self::Decorator => "decorator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "function" => Self::Function,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "type" => Self::Type,
            "variable" => Self::Variable,
            "constant" => Self::Constant,
            "method" => Self::Method,
            "property" => Self::Property,
            "module" => Self::Module,
            "namespace" => Self::Namespace,
            "parameter" => Self::Parameter,
            "import" => Self::Import,
            "export" => Self::Export,
            "decorator" => Self::Decorator,
            _ => return None,
        })
    }

    /// Fixed priority table from  Stage D, normalized to [0,1].
    /// Kinds absent from that table (module, namespace, parameter, import,
    /// export, decorator) fall back to the table's `unknown` entry (10).
    pub fn tie_break_priority(self) -> f64 {
        let raw: f64 = match self {
            Self::Function => 100.0,
            Self::Class => 95.0,
            Self::Interface => 90.0,
            Self::Type => 85.0,
            Self::Method => 80.0,
            Self::Constant => 75.0,
            Self::Variable => 70.0,
            Self::Property => 65.0,
            Self::Module
            | Self::Namespace
            | Self::Parameter
            | Self::Import
            | Self::Export
            | Self::Decorator => 10.0,
        };
        raw / 100.0
    }
}

/// Byte/line/column span of a symbol within its file. Monotonic: byte
/// offsets are within the file size; see `Symbol` invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub start_byte: u64,
    pub end_byte: u64,
}

/// A file under the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub path: String,
    pub content_hash: String,
    pub language: Option<String>,
    pub size_bytes: u64,
    pub modified_at: i64,
    pub indexed_at: i64,
    pub deleted_at: Option<i64>,
}

/// A symbol extracted from a file by the external parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub file_id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub span: Span,
    /// Ordered scope chain, outermost first (e.g. `["Outer", "Inner"]`).
    pub parents: Vec<String>,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub content_hash: String,
    pub deleted_at: Option<i64>,
}

impl Symbol {
    pub fn qualified_name(&self) -> String {
        if self.parents.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.parents.join("::"), self.name)
        }
    }
}

/// A searchable unit, typically one per symbol or line range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub file_id: String,
    pub symbol_id: Option<String>,
    pub text: String,
    pub documentation: Option<String>,
    /// `path:line:col`
    pub anchor: String,
    pub deleted_at: Option<i64>,
}

/// A dense embedding for one live chunk, at most one per (chunk, model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub created_at: i64,
}

impl Embedding {
    pub fn l2_norm(&self) -> f32 {
        self.vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Invariant check from : `‖vector‖₂ = 1 ± 1e-4`.
    pub fn is_unit_norm(&self) -> bool {
        (self.l2_norm() - 1.0).abs() <= 1e-4
    }
}

/// Source a `RankingCandidate` was retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Lexical,
    Vector,
}

/// An ephemeral candidate produced by one retrieval source, before fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingCandidate {
    pub source: CandidateSource,
    /// 1-based rank within its source's result list.
    pub source_rank: u32,
    pub source_score: f64,
    pub file_id: String,
    pub file_path: String,
    pub line_number: u32,
    pub column: Option<u32>,
    pub snippet: String,
    pub symbol_name: Option<String>,
    pub symbol_type: Option<String>,
    pub language: Option<String>,
    pub file_size: u64,
    pub last_modified: i64,
}

/// Per-result score decomposition. Every field is non-negative except
/// `diversity_penalty`, which is subtracted from the sum of the others to
/// produce `final_score`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub lexical_rank: Option<u32>,
    pub lexical_contribution: f64,
    pub vector_rank: Option<u32>,
    pub vector_contribution: f64,
    pub tie_breaker_scores: Option<TieBreakerScores>,
    pub tie_breaker_contribution: f64,
    pub diversity_penalty: Option<f64>,
}

/// The four sub-scores computed for tie-break clusters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TieBreakerScores {
    pub symbol_type_priority: f64,
    pub path_priority: f64,
    pub language_match: f64,
    pub identifier_match: f64,
    pub combined: f64,
}

/// Final, ranked hybrid search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridResult {
    pub file_id: String,
    pub file_path: String,
    pub line_number: u32,
    pub column: Option<u32>,
    pub snippet: String,
    pub symbol_name: Option<String>,
    pub symbol_type: Option<String>,
    pub language: Option<String>,
    pub file_size: u64,
    pub last_modified: i64,
    pub final_score: f64,
    pub final_rank: u32,
    pub score_breakdown: ScoreBreakdown,
}

impl HybridResult {
    pub fn from_candidate(candidate: RankingCandidate, final_rank: u32) -> Self {
        Self {
            file_id: candidate.file_id,
            file_path: candidate.file_path,
            line_number: candidate.line_number,
            column: candidate.column,
            snippet: candidate.snippet,
            symbol_name: candidate.symbol_name,
            symbol_type: candidate.symbol_type,
            language: candidate.language,
            file_size: candidate.file_size,
            last_modified: candidate.last_modified,
            final_score: 0.0,
            final_rank,
            score_breakdown: ScoreBreakdown::default(),
        }
    }

    /// Deduplication key from  Stage C.
    pub fn dedup_key(&self) -> (String, u32) {
        (self.file_id.clone(), self.line_number)
    }
}

/// Fusion weights and RRF constant. `alpha + beta + gamma <= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FusionConfig {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub rrf_k: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.4,
            gamma: 0.1,
            rrf_k: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiversificationConfig {
    pub enabled: bool,
    pub lambda: f64,
    pub max_per_file: u32,
}

impl Default for DiversificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lambda: 0.7,
            max_per_file: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TieBreakerWeights {
    pub symbol_type_weight: f64,
    pub path_priority_weight: f64,
    pub language_match_weight: f64,
    pub identifier_match_weight: f64,
}

impl Default for TieBreakerWeights {
    fn default() -> Self {
        Self {
            symbol_type_weight: 0.25,
            path_priority_weight: 0.25,
            language_match_weight: 0.25,
            identifier_match_weight: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceConfig {
    pub candidate_limit: usize,
    pub timeout_ms: u64,
    pub early_termination_top_k: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 200,
            timeout_ms: 300,
            early_termination_top_k: 10,
        }
    }
}

/// Immutable per-query ranking configuration. May be hot-reloaded
/// from `ranking-config.json` between queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RankingConfig {
    pub fusion: FusionConfig,
    pub diversification: DiversificationConfig,
    pub tie_breakers: TieBreakerWeights,
    pub performance: PerformanceConfig,
}

impl RankingConfig {
    /// Stage A validation. Returns the offending field name on
    /// failure.
    pub fn validate(&self) -> Result<(), String> {
        let f = &self.fusion;
        for (name, value) in [("alpha", f.alpha), ("beta", f.beta), ("gamma", f.gamma)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("fusion.{name} must be in [0,1], got {value}"));
            }
        }
        if f.alpha + f.beta + f.gamma > 1.0 + 1e-9 {
            return Err(format!(
                "fusion.alpha + beta + gamma must be <= 1, got {}",
                f.alpha + f.beta + f.gamma
            ));
        }
        if f.rrf_k <= 0.0 {
            return Err(format!("fusion.rrf_k must be > 0, got {}", f.rrf_k));
        }
        if !(0.0..=1.0).contains(&self.diversification.lambda) {
            return Err(format!(
                "diversification.lambda must be in [0,1], got {}",
                self.diversification.lambda
            ));
        }
        if self.diversification.max_per_file < 1 {
            return Err("diversification.max_per_file must be >= 1".to_string());
        }
        for (name, value) in [
            ("symbol_type_weight", self.tie_breakers.symbol_type_weight),
            (
                "path_priority_weight",
                self.tie_breakers.path_priority_weight,
            ),
            (
                "language_match_weight",
                self.tie_breakers.language_match_weight,
            ),
            (
                "identifier_match_weight",
                self.tie_breakers.identifier_match_weight,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("tie_breakers.{name} must be in [0,1], got {value}"));
            }
        }
        let p = &self.performance;
        if !(10..=1000).contains(&p.candidate_limit) {
            return Err(format!(
                "performance.candidate_limit must be in [10,1000], got {}",
                p.candidate_limit
            ));
        }
        if !(100..=5000).contains(&p.timeout_ms) {
            return Err(format!(
                "performance.timeout_ms must be in [100,5000], got {}",
                p.timeout_ms
            ));
        }
        if !(1..=100).contains(&p.early_termination_top_k) {
            return Err(format!(
                "performance.early_termination_top_k must be in [1,100], got {}",
                p.early_termination_top_k
            ));
        }
        Ok(())
    }
}

/// Per-query metrics recorded by the hybrid retrieval stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub lexical_search_time_ms: u64,
    pub vector_search_time_ms: u64,
    pub ranking_time_ms: u64,
    pub total_time_ms: u64,
    pub lexical_candidates: usize,
    pub vector_candidates: usize,
    pub unique_candidates: usize,
    pub sla_violation: bool,
    pub fallback_mode: Option<String>,
}

/// One parsed symbol as produced by the external parser/extractor, before
/// it is assigned a stable id and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub span: Span,
    pub parents: Vec<String>,
    pub signature: Option<String>,
    pub documentation: Option<String>,
}

/// A single `import` statement as seen by the external parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedImport {
    pub source: String,
    pub specifiers: Vec<String>,
}

/// A single `export` statement as seen by the external parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedExport {
    pub specifiers: Vec<String>,
}

/// A call site: the name called and, if statically known, the receiver
/// expression it was called on (e.g. `self` in `self.foo()`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCall {
    pub target: String,
    pub receiver: Option<String>,
}

/// The abstract, language-agnostic parse tree this core consumes. Produced
/// by an external tree-sitter-based (or other) extractor; this core never
/// constructs one itself outside of tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ASTDoc {
    pub symbols: Vec<ParsedSymbol>,
    pub imports: Vec<ParsedImport>,
    pub exports: Vec<ParsedExport>,
    pub calls: Vec<ParsedCall>,
    /// Free-standing block/docstring comments not already attached to a
    /// symbol's `documentation` field.
    pub doc_comments: Vec<String>,
}

/// The full result of parsing one file: its detected language plus the
/// abstract syntax document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub language: String,
    pub doc: ASTDoc,
}

/// Persisted watcher-state singleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatcherState {
    pub is_watching: bool,
    pub started_at: Option<i64>,
    pub stopped_at: Option<i64>,
    pub events_processed: u64,
    pub events_failed: u64,
    pub events_skipped: u64,
    pub last_event_at: Option<i64>,
    pub memory_gauge_mb: f64,
    pub config_snapshot: Option<serde_json::Value>,
}
