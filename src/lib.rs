//! # Financial Report Extractor
//!
//! Reads Chinese-language financial filings and answers questions about them
//! for a tool-calling agent.
//!
//! ## Core Concepts
//!
//! - **Sections**: Filing text split at its heading markers (`一、`, `第二节`, `（三）`...), the unit of retrieval
//! - **Semantic Index**: Sections embedded once per load and ranked by L2 distance to a query
//! - **Metrics**: Named figures (revenue, total assets...) resolved by searching curated aliases and pattern-matching the passages
//! - **Degraded Mode**: When no embedder is available, keyword windows and label matching over the raw text stand in for the index
//! - **Ratio Analysis**: Pure profitability, liquidity and leverage calculations over explicit inputs
//!
//! ## Example
//!
//! ```rust
//! use financial_report_extractor::*;
//!
//! let mut session = Session::new(ExtractorConfig::default()).unwrap();
//! session.load_pages(
//!     "annual_report.pdf",
//!     ["一、利润表\n营业收入 5,000,000.00\n净利润 800,000.00"],
//! );
//!
//! let revenue = session.extract_metric("revenue").unwrap();
//! assert_eq!(revenue.extraction.metric_map()["revenue"], 5_000_000.0);
//!
//! let report = session
//!     .analyze_profitability(ProfitabilityInputs::default(), true)
//!     .unwrap();
//! assert!(report.to_string().contains("Profit margin: 16.00%"));
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod expander;
pub mod extractor;
pub mod index;
pub mod literal;
pub mod metrics;
pub mod numbers;
pub mod ratios;
pub mod segmenter;
pub mod session;
pub mod tools;
pub mod utils;

#[cfg(feature = "gemini")]
pub mod llm;

pub use config::ExtractorConfig;
pub use document::{AutoLoader, Document, DocumentLoader, Page, PlainTextLoader};
#[cfg(feature = "pdf")]
pub use document::PdfLoader;
pub use error::{ReportError, Result};
pub use expander::QueryExpander;
pub use extractor::{
    ExtractedMetric, Extraction, MetricExtractor, MetricMap, MetricOutcome, MetricResolution,
    OverviewReport, RetrievalFailure,
};
pub use index::{Embedder, NgramEmbedder, Retriever, ScoredSection, SemanticIndex};
pub use literal::{
    extract_table_rows, LiteralFigure, LiteralScan, LiteralScanner, RawTextRetriever, TableRow,
};
pub use metrics::{metric_catalog, metric_keys, metric_spec, MetricSpec, ALL_METRICS, METRIC_SPECS};
pub use numbers::{parse_number, NumberParser, NumberToken, Unit};
pub use ratios::*;
pub use segmenter::{Section, SectionSegmenter};
pub use session::{
    LoadReport, LoadedDocument, MetricReport, SearchHit, SearchReport, Session, TableReport, Topic,
};
pub use tools::{failure_report, tool_definitions, ToolCall, ToolDefinition};
pub use utils::*;
