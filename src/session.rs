use crate::config::ExtractorConfig;
use crate::document::{AutoLoader, Document, DocumentLoader, Page};
use crate::error::{ReportError, Result};
use crate::expander::QueryExpander;
use crate::extractor::{Extraction, MetricExtractor, MetricMap, RetrievalFailure};
use crate::index::{Embedder, NgramEmbedder, Retriever, ScoredSection, SemanticIndex};
use crate::literal::{extract_table_rows, LiteralScan, LiteralScanner, RawTextRetriever, TableRow};
use crate::ratios::{
    analyze_leverage, analyze_liquidity, analyze_profitability, LeverageInputs, LeverageReport,
    LiquidityInputs, LiquidityReport, ProfitabilityInputs, ProfitabilityReport,
};
use crate::segmenter::{Section, SectionSegmenter};
use crate::utils::truncate_chars;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    #[schemars(description = "Review of operations during the reporting period")]
    BusinessReview,
    #[schemars(description = "Outlook, strategy and business plan")]
    FutureOutlook,
    #[schemars(description = "Risks the company may face")]
    RiskFactors,
    #[schemars(description = "Management discussion and analysis")]
    ManagementDiscussion,
}

impl Topic {
    pub fn queries(&self) -> &'static [&'static str] {
        match self {
            Topic::BusinessReview => &[
                "经营情况讨论与分析",
                "报告期内公司从事的主要业务",
                "主营业务分析",
            ],
            Topic::FutureOutlook => &["公司未来发展的展望", "发展战略", "经营计划"],
            Topic::RiskFactors => &["可能面对的风险", "重大风险提示", "风险因素"],
            Topic::ManagementDiscussion => &[
                "管理层讨论与分析",
                "核心竞争力分析",
                "主要经营情况",
            ],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Topic::BusinessReview => "business review",
            Topic::FutureOutlook => "future outlook",
            Topic::RiskFactors => "risk factors",
            Topic::ManagementDiscussion => "management discussion",
        }
    }
}

#[derive(Debug)]
pub struct LoadedDocument {
    pub path: String,
    pub pages: Vec<Page>,
    pub raw_text: String,
    pub sections: Vec<Section>,
    /// `None` when the embedding backend failed; retrieval then falls back to
    /// keyword windows over `raw_text`.
    pub index: Option<SemanticIndex>,
    pub index_error: Option<String>,
    pub loaded_at: DateTime<Utc>,
    raw: RawTextRetriever,
}

impl LoadedDocument {
    pub fn is_degraded(&self) -> bool {
        self.index.is_none()
    }

    pub fn retriever(&self) -> &dyn Retriever {
        match &self.index {
            Some(index) => index,
            None => &self.raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub path: String,
    pub pages: usize,
    pub sections: usize,
    pub embedding_backend: String,
    /// Why the semantic index could not be built, with the suggested next step.
    pub index_error: Option<(String, String)>,
    pub loaded_at: DateTime<Utc>,
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.index_error {
            None => writeln!(f, "✅ Loaded '{}'", self.path)?,
            Some(_) => writeln!(f, "⚠️ Loaded '{}' without a semantic index", self.path)?,
        }
        writeln!(f, "📊 Document:")?;
        writeln!(f, "  - Pages: {}", self.pages)?;
        writeln!(f, "  - Sections: {} (split at headings)", self.sections)?;
        writeln!(f, "  - Embedding backend: {}", self.embedding_backend)?;
        writeln!(f)?;
        match &self.index_error {
            None => writeln!(f, "✨ Semantic index ready; metrics and passages can be queried."),
            Some((error, remediation)) => {
                writeln!(f, "❌ {}", error)?;
                writeln!(f, "💡 {}", remediation)?;
                writeln!(
                    f,
                    "Queries fall back to keyword windows and literal label matching over the raw text."
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub extraction: Extraction,
    /// Labeled figures read straight from the raw text, attached in degraded mode.
    pub literal: Option<LiteralScan>,
}

impl fmt::Display for MetricReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scan) = &self.literal {
            writeln!(
                f,
                "⚠️ No semantic index; passages come from keyword matches in the raw text."
            )?;
            writeln!(f)?;
            write!(f, "{}", self.extraction)?;
            writeln!(f)?;
            write!(f, "{}", scan)
        } else {
            write!(f, "{}", self.extraction)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Which expanded query retrieved this passage.
    pub matched_query: String,
    pub section: Section,
    pub score: f32,
}

impl SearchHit {
    pub fn relevance(&self) -> f32 {
        1.0 / (1.0 + self.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub failures: Vec<RetrievalFailure>,
}

impl fmt::Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits.is_empty() {
            writeln!(f, "No passages found for '{}'.", self.query)?;
        } else {
            writeln!(f, "📄 Passages for '{}':", self.query)?;
            writeln!(f)?;
        }
        for (i, hit) in self.hits.iter().enumerate() {
            writeln!(
                f,
                "Passage {} [{}] (matched: {}, relevance: {:.2}%):",
                i + 1,
                hit.section.header,
                hit.matched_query,
                hit.relevance() * 100.0
            )?;
            writeln!(f, "{}", hit.section.content)?;
            writeln!(f)?;
            writeln!(f, "{}", "=".repeat(50))?;
            writeln!(f)?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "⚠️ Retrieval for '{}' failed: {}",
                failure.query, failure.error
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub page: usize,
    pub rows: Vec<TableRow>,
}

impl fmt::Display for TableReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "No table rows detected on page {}.", self.page);
        }
        writeln!(f, "📋 Table rows on page {}:", self.page)?;
        for row in &self.rows {
            writeln!(f, "- {}: {}", row.item, row.values.join(" | "))?;
        }
        Ok(())
    }
}

pub struct Session {
    config: ExtractorConfig,
    loader: Box<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    segmenter: SectionSegmenter,
    expander: QueryExpander,
    extractor: MetricExtractor,
    literal: LiteralScanner,
    current: Option<LoadedDocument>,
    last_metrics: MetricMap,
}

impl Session {
    /// A session with the extension-based loader and the offline n-gram embedder.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            segmenter: SectionSegmenter::new(
                config.min_front_matter_chars,
                config.header_max_chars,
            ),
            expander: QueryExpander::new(config.max_expansion),
            extractor: MetricExtractor::new(config.clone())?,
            literal: LiteralScanner::new()?,
            loader: Box::new(AutoLoader),
            embedder: Arc::new(NgramEmbedder::default()),
            current: None,
            last_metrics: MetricMap::new(),
            config,
        })
    }

    pub fn with_loader(mut self, loader: impl DocumentLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&LoadedDocument> {
        self.current.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Metric values from every extraction since the last load.
    pub fn last_metrics(&self) -> &MetricMap {
        &self.last_metrics
    }

    fn loaded(&self) -> Result<&LoadedDocument> {
        self.current.as_ref().ok_or(ReportError::NotLoaded)
    }

    /// Reads a file through the session's loader and indexes it.
    ///
    /// A file that cannot be read leaves the previous document in place.
    pub fn load_document(&mut self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let path = path.as_ref();
        info!("Loading document {}", path.display());
        let document = self.loader.load(path).map_err(|e| {
            warn!("Failed to load {}: {}", path.display(), e);
            e
        })?;
        Ok(self.ingest(document))
    }

    /// Indexes text that was already converted to pages by the caller.
    pub fn load_pages<S: Into<String>>(
        &mut self,
        source: &str,
        pages: impl IntoIterator<Item = S>,
    ) -> LoadReport {
        self.ingest(Document::from_pages(source, pages))
    }

    fn ingest(&mut self, document: Document) -> LoadReport {
        let raw_text = document.full_text();
        let sections = self.segmenter.segment(&raw_text, &document.source);
        info!(
            "Split {} pages into {} sections",
            document.page_count(),
            sections.len()
        );

        let (index, index_error) = match SemanticIndex::build(sections.clone(), self.embedder.clone())
        {
            Ok(index) => (Some(index), None),
            Err(e) => {
                warn!("Semantic index unavailable, continuing on raw text: {}", e);
                (None, Some((e.to_string(), e.remediation().to_string())))
            }
        };

        let loaded = LoadedDocument {
            raw: RawTextRetriever::new(raw_text.clone(), document.source.clone()),
            path: document.source,
            pages: document.pages,
            raw_text,
            sections,
            index,
            index_error: index_error.as_ref().map(|(e, _)| e.clone()),
            loaded_at: Utc::now(),
        };

        let report = LoadReport {
            path: loaded.path.clone(),
            pages: loaded.pages.len(),
            sections: loaded.sections.len(),
            embedding_backend: self.embedder.name().to_string(),
            index_error,
            loaded_at: loaded.loaded_at,
        };

        self.current = Some(loaded);
        self.last_metrics.clear();
        report
    }

    /// Resolves one metric key or `"all"`, remembering every value found.
    pub fn extract_metric(&mut self, key: &str) -> Result<MetricReport> {
        let loaded = self.loaded()?;
        let extraction = self.extractor.resolve(loaded.retriever(), key)?;

        let literal = loaded
            .is_degraded()
            .then(|| self.literal.scan(&loaded.raw_text));

        let mut found = extraction.metric_map();
        if let Some(scan) = &literal {
            for figure in &scan.figures {
                if let Some(metric_key) = &figure.metric_key {
                    found.entry(metric_key.clone()).or_insert(figure.value);
                }
            }
        }
        debug!("Extraction for '{}' produced {} values", key, found.len());
        self.last_metrics.extend(found);

        Ok(MetricReport {
            extraction,
            literal,
        })
    }

    /// Resolves each key not yet known, recording what it finds.
    pub fn resolve_missing(&mut self, keys: &[&str]) -> Result<Vec<RetrievalFailure>> {
        let loaded = self.loaded()?;
        let literal = loaded
            .is_degraded()
            .then(|| self.literal.scan(&loaded.raw_text));

        let mut failures = Vec::new();
        let mut found = MetricMap::new();
        for key in keys {
            if self.last_metrics.contains_key(*key) {
                continue;
            }
            let resolution = self.extractor.resolve_metric(loaded.retriever(), key)?;
            let value = resolution
                .value()
                .or_else(|| literal.as_ref().and_then(|scan| scan.for_metric(key)));
            match value {
                Some(value) => {
                    found.insert(key.to_string(), value);
                }
                None => debug!("'{}' could not be resolved for ratio inputs", key),
            }
            failures.extend(resolution.failures);
        }
        self.last_metrics.extend(found);
        Ok(failures)
    }

    pub fn analyze_profitability(
        &mut self,
        explicit: ProfitabilityInputs,
        auto_extract: bool,
    ) -> Result<ProfitabilityReport> {
        let inputs = if auto_extract {
            let missing = explicit.missing();
            self.resolve_missing(&missing)?;
            ProfitabilityInputs::from_metrics(&self.last_metrics).overlay(explicit)
        } else {
            explicit
        };
        analyze_profitability(&inputs)
    }

    pub fn analyze_liquidity(
        &mut self,
        explicit: LiquidityInputs,
        auto_extract: bool,
    ) -> Result<LiquidityReport> {
        let inputs = if auto_extract {
            let missing = explicit.missing();
            self.resolve_missing(&missing)?;
            LiquidityInputs::from_metrics(&self.last_metrics).overlay(explicit)
        } else {
            explicit
        };
        analyze_liquidity(&inputs)
    }

    pub fn analyze_leverage(
        &mut self,
        explicit: LeverageInputs,
        auto_extract: bool,
    ) -> Result<LeverageReport> {
        let inputs = if auto_extract {
            let missing = explicit.missing();
            self.resolve_missing(&missing)?;
            LeverageInputs::from_metrics(&self.last_metrics).overlay(explicit)
        } else {
            explicit
        };
        analyze_leverage(&inputs)
    }

    /// Free-text search, broadened with financial synonyms.
    pub fn search_financial_info(&self, query: &str) -> Result<SearchReport> {
        let loaded = self.loaded()?;
        let queries = self.expander.expand(query);
        debug!("Expanded '{}' into {:?}", query, queries);
        Ok(self.merged_search(loaded.retriever(), query, &queries))
    }

    pub fn search_topic(&self, topic: Topic) -> Result<SearchReport> {
        let loaded = self.loaded()?;
        let queries: Vec<String> = topic.queries().iter().map(|q| q.to_string()).collect();
        Ok(self.merged_search(loaded.retriever(), topic.label(), &queries))
    }

    /// Table-like lines from one page, 1-based.
    pub fn extract_table(&self, page: usize) -> Result<TableReport> {
        let loaded = self.loaded()?;
        let text = page
            .checked_sub(1)
            .and_then(|i| loaded.pages.get(i))
            .map(|p| p.text.as_str())
            .ok_or_else(|| {
                ReportError::InputError(format!(
                    "page {} is out of range; the document has {} pages",
                    page,
                    loaded.pages.len()
                ))
            })?;
        Ok(TableReport {
            page,
            rows: extract_table_rows(text),
        })
    }

    fn merged_search(
        &self,
        retriever: &dyn Retriever,
        label: &str,
        queries: &[String],
    ) -> SearchReport {
        let mut seen: HashSet<String> = HashSet::new();
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut failures = Vec::new();

        for query in queries {
            match retriever.retrieve_scored(query, self.config.search_top_k) {
                Ok(scored) => {
                    for ScoredSection { section, score } in scored {
                        let prefix =
                            truncate_chars(&section.content, self.config.dedup_prefix_chars)
                                .to_string();
                        if seen.insert(prefix) {
                            hits.push(SearchHit {
                                matched_query: query.clone(),
                                section,
                                score,
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("Retrieval for '{}' failed: {}", query, e);
                    failures.push(RetrievalFailure {
                        query: query.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Stable sort keeps query order among equal distances.
        hits.sort_by(|a, b| a.score.total_cmp(&b.score));
        hits.truncate(self.config.search_result_limit);

        SearchReport {
            query: label.to_string(),
            hits,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::MetricOutcome;

    struct OfflineEmbedder;

    impl Embedder for OfflineEmbedder {
        fn name(&self) -> &str {
            "offline"
        }

        fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(ReportError::EmbeddingUnavailable {
                backend: "offline".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct FixtureLoader;

    impl DocumentLoader for FixtureLoader {
        fn load(&self, path: &Path) -> Result<Document> {
            Ok(Document::from_pages(
                &path.display().to_string(),
                ["一、利润表\n营业收入 3,000.00\n净利润 450.00"],
            ))
        }
    }

    fn session() -> Session {
        Session::new(ExtractorConfig::default()).unwrap()
    }

    const PAGES: [&str; 3] = [
        "2023年年度报告\n第一节 重要提示\n本公司董事会保证年度报告内容真实。",
        "第二节 主要会计数据\n一、利润表\n营业收入 5,000,000.00\n净利润 800,000.00\n二、资产负债表\n流动资产合计 2,000,000.00 1,800,000.00\n流动负债合计 1,000,000.00 900,000.00",
        "第三节 经营情况讨论与分析\n一、可能面对的风险\n市场竞争加剧，原材料价格波动。",
    ];

    #[test]
    fn test_everything_requires_a_document() {
        let mut session = session();
        assert!(matches!(
            session.extract_metric("revenue"),
            Err(ReportError::NotLoaded)
        ));
        assert!(matches!(
            session.search_topic(Topic::RiskFactors),
            Err(ReportError::NotLoaded)
        ));
        assert!(matches!(
            session.search_financial_info("利润"),
            Err(ReportError::NotLoaded)
        ));
        assert!(matches!(session.extract_table(1), Err(ReportError::NotLoaded)));
        assert!(matches!(
            session.analyze_liquidity(LiquidityInputs::default(), true),
            Err(ReportError::NotLoaded)
        ));
    }

    #[test]
    fn test_explicit_analysis_needs_no_document() {
        let mut session = session();
        let inputs = LiquidityInputs {
            current_assets: Some(2000.0),
            current_liabilities: Some(1000.0),
            cash: Some(500.0),
            inventory: Some(300.0),
        };
        let report = session.analyze_liquidity(inputs, false).unwrap();
        assert_eq!(report.current_ratio, 2.0);
    }

    #[test]
    fn test_load_pages_builds_index() {
        let mut session = session();
        let report = session.load_pages("report.pdf", PAGES);
        assert_eq!(report.pages, 3);
        assert!(report.sections >= 4);
        assert!(report.index_error.is_none());
        assert!(report.to_string().contains("✅ Loaded 'report.pdf'"));
        assert!(!session.current().unwrap().is_degraded());
    }

    #[test]
    fn test_custom_loader_feeds_the_session() {
        let mut session = session().with_loader(FixtureLoader);
        let report = session.load_document("reports/fixture.bin").unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(report.path, "reports/fixture.bin");

        let metric = session.extract_metric("net_income").unwrap();
        assert_eq!(metric.extraction.metric_map().get("net_income"), Some(&450.0));
    }

    #[test]
    fn test_extract_metric_records_values() {
        let mut session = session();
        session.load_pages("report.pdf", PAGES);
        let report = session.extract_metric("revenue").unwrap();
        assert!(report.literal.is_none());
        assert_eq!(session.last_metrics().get("revenue"), Some(&5_000_000.0));
    }

    #[test]
    fn test_auto_extract_liquidity() {
        let mut session = session();
        session.load_pages("report.pdf", PAGES);
        let report = session
            .analyze_liquidity(LiquidityInputs::default(), true)
            .unwrap();
        assert_eq!(report.current_ratio, 2.0);
        assert!(report.quick_ratio_is_fallback);
        assert_eq!(report.cash_ratio, None);
    }

    #[test]
    fn test_explicit_inputs_override_extracted_ones() {
        let mut session = session();
        session.load_pages("report.pdf", PAGES);
        let report = session
            .analyze_profitability(
                ProfitabilityInputs {
                    net_income: Some(1_000_000.0),
                    ..Default::default()
                },
                true,
            )
            .unwrap();
        assert!((report.profit_margin - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_mode_still_extracts() {
        let mut session = session().with_embedder(Arc::new(OfflineEmbedder));
        let report = session.load_pages("report.pdf", PAGES);
        let (error, remediation) = report.index_error.clone().unwrap();
        assert!(error.contains("offline"));
        assert!(remediation.contains("network"));
        assert!(report.to_string().contains("without a semantic index"));

        let metric = session.extract_metric("revenue").unwrap();
        assert!(metric.literal.is_some());
        assert_eq!(metric.extraction.metric_map().get("revenue"), Some(&5_000_000.0));
        assert!(metric.to_string().contains("keyword matches"));

        let search = session.search_topic(Topic::RiskFactors).unwrap();
        assert!(!search.hits.is_empty());
        assert!(search.hits[0].section.content.contains("可能面对的风险"));
    }

    #[test]
    fn test_degraded_not_found_still_returns_context() {
        let mut session = session().with_embedder(Arc::new(OfflineEmbedder));
        session.load_pages("report.pdf", ["一、公司简介\n本公司主要从事软件开发业务。"]);

        let report = session.extract_metric("total_assets").unwrap();
        let Extraction::Single(resolution) = &report.extraction else {
            panic!("expected a single resolution");
        };
        match &resolution.outcome {
            MetricOutcome::NotFound { excerpts } => {
                assert!(!excerpts.is_empty());
                assert!(excerpts[0].contains("软件开发"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert!(!report.to_string().contains("no passages retrieved"));
    }

    #[test]
    fn test_search_financial_info_dedups_and_limits() {
        let mut session = session();
        session.load_pages("report.pdf", PAGES);
        let report = session.search_financial_info("收入").unwrap();
        assert!(!report.hits.is_empty());
        assert!(report.hits.len() <= 5);

        let prefixes: HashSet<&str> = report
            .hits
            .iter()
            .map(|h| truncate_chars(&h.section.content, 100))
            .collect();
        assert_eq!(prefixes.len(), report.hits.len());

        for pair in report.hits.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
        assert!(report.to_string().contains("relevance"));
    }

    #[test]
    fn test_extract_table() {
        let mut session = session();
        session.load_pages("report.pdf", PAGES);
        let table = session.extract_table(2).unwrap();
        let items: Vec<&str> = table.rows.iter().map(|r| r.item.as_str()).collect();
        assert_eq!(items, vec!["流动资产合计", "流动负债合计"]);

        assert!(matches!(
            session.extract_table(9),
            Err(ReportError::InputError(_))
        ));
    }

    #[test]
    fn test_reload_clears_metrics() {
        let mut session = session();
        session.load_pages("a.pdf", PAGES);
        session.extract_metric("revenue").unwrap();
        assert!(!session.last_metrics().is_empty());

        session.load_pages("b.pdf", ["一、简介\n无"]);
        assert!(session.last_metrics().is_empty());
        assert_eq!(session.current().unwrap().path, "b.pdf");
    }
}
