use crate::config::ExtractorConfig;
use crate::error::{ReportError, Result};
use crate::index::Retriever;
use crate::metrics::{MetricSpec, ALL_METRICS, METRIC_SPECS};
use crate::numbers::{parse_number, NumberParser, NumberToken};
use crate::segmenter::Section;
use crate::utils::{excerpt, format_amount, truncate_chars};
use log::{debug, info, warn};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resolved metric values keyed by metric key (e.g. `"revenue"`).
pub type MetricMap = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetric {
    /// Primary value: the largest candidate.
    pub value: f64,
    /// Distinct candidates, descending.
    pub candidates: Vec<f64>,
    /// Excerpt of the passage the primary value was read from.
    pub context_snippet: String,
    pub source_header: String,
}

/// A retrieval attempt that failed; kept so reports can show what was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalFailure {
    pub query: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricOutcome {
    Found(ExtractedMetric),
    /// No pattern produced a figure; raw passages are returned instead.
    NotFound { excerpts: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResolution {
    pub key: String,
    pub name: String,
    pub outcome: MetricOutcome,
    #[serde(default)]
    pub failures: Vec<RetrievalFailure>,
}

impl MetricResolution {
    pub fn value(&self) -> Option<f64> {
        match &self.outcome {
            MetricOutcome::Found(metric) => Some(metric.value),
            MetricOutcome::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.value().is_some()
    }
}

impl fmt::Display for MetricResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            MetricOutcome::Found(metric) => {
                writeln!(
                    f,
                    "📊 {} ({}): {}",
                    self.name,
                    self.key,
                    format_amount(metric.value)
                )?;
                if metric.candidates.len() > 1 {
                    let others: Vec<String> = metric
                        .candidates
                        .iter()
                        .skip(1)
                        .take(2)
                        .map(|v| format_amount(*v))
                        .collect();
                    writeln!(f, "   (other candidates: {})", others.join(", "))?;
                }
                writeln!(f)?;
                writeln!(f, "Context [{}]:", metric.source_header)?;
                writeln!(f, "{}", metric.context_snippet)?;
            }
            MetricOutcome::NotFound { excerpts } => {
                writeln!(
                    f,
                    "❓ Could not extract {} ({}) automatically. Related passages:",
                    self.name, self.key
                )?;
                writeln!(f)?;
                if excerpts.is_empty() {
                    writeln!(f, "(no passages retrieved)")?;
                }
                for text in excerpts {
                    writeln!(f, "---")?;
                    writeln!(f, "{}", text)?;
                }
            }
        }
        write_failures(f, &self.failures)
    }
}

/// Result of resolving every configured metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewReport {
    pub resolutions: Vec<MetricResolution>,
    /// Statement passages attached when too few metrics resolved.
    pub supplementary_excerpts: Vec<String>,
    #[serde(default)]
    pub failures: Vec<RetrievalFailure>,
}

impl OverviewReport {
    pub fn resolved_count(&self) -> usize {
        self.resolutions.iter().filter(|r| r.is_found()).count()
    }
}

impl fmt::Display for OverviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 Extracted financial data:")?;
        writeln!(f)?;
        for resolution in &self.resolutions {
            match resolution.value() {
                Some(value) => writeln!(f, "- {}: {}", resolution.name, format_amount(value))?,
                None => writeln!(f, "- {}: not found", resolution.name)?,
            }
        }

        if !self.supplementary_excerpts.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "⚠️ Some figures could not be extracted automatically; related source passages follow:"
            )?;
            writeln!(f)?;
            for text in &self.supplementary_excerpts {
                writeln!(f, "---")?;
                writeln!(f, "{}", text)?;
            }
        }

        let mut failures: Vec<RetrievalFailure> = self
            .resolutions
            .iter()
            .flat_map(|r| r.failures.iter().cloned())
            .collect();
        failures.extend(self.failures.iter().cloned());
        write_failures(f, &failures)
    }
}

fn write_failures(f: &mut fmt::Formatter<'_>, failures: &[RetrievalFailure]) -> fmt::Result {
    if failures.is_empty() {
        return Ok(());
    }
    writeln!(f)?;
    for failure in failures {
        writeln!(
            f,
            "⚠️ Retrieval for '{}' failed: {}",
            failure.query, failure.error
        )?;
    }
    Ok(())
}

/// What an `extract_metric` call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Extraction {
    Single(MetricResolution),
    All(OverviewReport),
}

impl Extraction {
    /// Values of every metric that resolved.
    pub fn metric_map(&self) -> MetricMap {
        let resolutions: Vec<&MetricResolution> = match self {
            Extraction::Single(resolution) => vec![resolution],
            Extraction::All(report) => report.resolutions.iter().collect(),
        };
        resolutions
            .into_iter()
            .filter_map(|r| r.value().map(|v| (r.key.clone(), v)))
            .collect()
    }
}

impl fmt::Display for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extraction::Single(resolution) => fmt::Display::fmt(resolution, f),
            Extraction::All(report) => fmt::Display::fmt(report, f),
        }
    }
}

struct CompiledMetric {
    spec: &'static MetricSpec,
    patterns: Vec<Regex>,
}

struct Candidate<'a> {
    value: f64,
    section: &'a Section,
}

/// Resolves named metrics against a passage retriever, normally the semantic index.
///
/// Every keyword of a metric is searched directly, every pattern runs over
/// every retrieved passage, and all figures go into one pool. The largest
/// figure wins: statement totals are normally the biggest number next to
/// their label. Filings that print the prior year's larger figure alongside
/// will pick that one; all candidates are reported so the caller can judge.
pub struct MetricExtractor {
    metrics: Vec<CompiledMetric>,
    numbers: NumberParser,
    config: ExtractorConfig,
}

impl MetricExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let metrics = METRIC_SPECS
            .iter()
            .map(|spec| {
                let patterns = spec
                    .patterns
                    .iter()
                    .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(CompiledMetric { spec, patterns })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            metrics,
            numbers: NumberParser::new(),
            config,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Resolves one metric key, or every metric for `"all"`.
    pub fn resolve(&self, source: &dyn Retriever, key: &str) -> Result<Extraction> {
        if key == ALL_METRICS {
            Ok(Extraction::All(self.resolve_all(source)))
        } else {
            self.resolve_metric(source, key).map(Extraction::Single)
        }
    }

    /// Resolves one metric, attaching raw passages when nothing matched.
    pub fn resolve_metric(&self, source: &dyn Retriever, key: &str) -> Result<MetricResolution> {
        let metric = self
            .compiled(key)
            .ok_or_else(|| ReportError::UnknownMetric(key.to_string()))?;

        let mut resolution = self.resolve_compiled(source, metric);
        if let MetricOutcome::NotFound { excerpts } = &mut resolution.outcome {
            let keywords = metric
                .spec
                .keywords
                .iter()
                .take(self.config.fallback_keywords);
            for keyword in keywords {
                match source.retrieve(keyword, self.config.fallback_top_k) {
                    Ok(sections) => {
                        for section in sections {
                            let text = excerpt(&section.content, self.config.fallback_excerpt_chars);
                            if !excerpts.contains(&text) {
                                excerpts.push(text);
                            }
                        }
                    }
                    Err(e) => resolution.failures.push(RetrievalFailure {
                        query: keyword.to_string(),
                        error: e.to_string(),
                    }),
                }
            }
            if excerpts.is_empty() {
                debug!(
                    "No passage mentions '{}'; attaching the opening passages",
                    metric.spec.key
                );
                excerpts.extend(
                    source
                        .leading(self.config.fallback_top_k)
                        .iter()
                        .map(|section| excerpt(&section.content, self.config.fallback_excerpt_chars)),
                );
            }
        }
        Ok(resolution)
    }

    /// Resolves every configured metric independently.
    pub fn resolve_all(&self, source: &dyn Retriever) -> OverviewReport {
        let resolutions: Vec<MetricResolution> = self
            .metrics
            .iter()
            .map(|metric| self.resolve_compiled(source, metric))
            .collect();

        let mut report = OverviewReport {
            resolutions,
            supplementary_excerpts: Vec::new(),
            failures: Vec::new(),
        };

        let resolved = report.resolved_count();
        info!(
            "Resolved {}/{} metrics",
            resolved,
            report.resolutions.len()
        );

        if resolved < self.config.overview_min_resolved {
            debug!("Attaching statement excerpts for manual completion");
            for query in &self.config.overview_queries {
                match source.retrieve(query, self.config.overview_top_k) {
                    Ok(sections) => {
                        for section in sections {
                            let text = truncate_chars(
                                &section.content,
                                self.config.overview_excerpt_chars,
                            )
                            .to_string();
                            if !report.supplementary_excerpts.contains(&text) {
                                report.supplementary_excerpts.push(text);
                            }
                        }
                    }
                    Err(e) => report.failures.push(RetrievalFailure {
                        query: query.clone(),
                        error: e.to_string(),
                    }),
                }
            }
            if report.supplementary_excerpts.is_empty() {
                report.supplementary_excerpts.extend(
                    source.leading(self.config.overview_top_k).iter().map(|section| {
                        truncate_chars(&section.content, self.config.overview_excerpt_chars)
                            .to_string()
                    }),
                );
            }
        }

        report
    }

    fn compiled(&self, key: &str) -> Option<&CompiledMetric> {
        self.metrics.iter().find(|m| m.spec.key == key)
    }

    fn resolve_compiled(&self, source: &dyn Retriever, metric: &CompiledMetric) -> MetricResolution {
        let mut failures = Vec::new();
        let mut retrieved: Vec<Section> = Vec::new();

        for keyword in metric.spec.keywords {
            match source.retrieve(keyword, self.config.metric_top_k) {
                Ok(sections) => retrieved.extend(sections),
                Err(e) => {
                    warn!("Retrieval for '{}' failed: {}", keyword, e);
                    failures.push(RetrievalFailure {
                        query: keyword.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut pool: Vec<Candidate<'_>> = Vec::new();
        for section in &retrieved {
            for value in self.match_patterns(metric, &section.content) {
                if !pool.iter().any(|c| c.value == value) {
                    pool.push(Candidate { value, section });
                }
            }
        }
        pool.sort_by(|a, b| b.value.total_cmp(&a.value));

        debug!(
            "Metric '{}': {} passages, {} distinct candidates",
            metric.spec.key,
            retrieved.len(),
            pool.len()
        );

        let outcome = match pool.first() {
            Some(primary) => MetricOutcome::Found(ExtractedMetric {
                value: primary.value,
                candidates: pool.iter().map(|c| c.value).collect(),
                context_snippet: excerpt(
                    &primary.section.content,
                    self.config.context_snippet_chars,
                ),
                source_header: primary.section.header.clone(),
            }),
            None => MetricOutcome::NotFound {
                excerpts: Vec::new(),
            },
        };

        MetricResolution {
            key: metric.spec.key.to_string(),
            name: metric.spec.name.to_string(),
            outcome,
            failures,
        }
    }

    fn match_patterns(&self, metric: &CompiledMetric, text: &str) -> Vec<f64> {
        let mut values = Vec::new();
        for pattern in &metric.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(group) = caps.get(1) else {
                    continue;
                };
                let Some(value) = parse_number(group.as_str()) else {
                    continue;
                };
                if self.config.apply_unit_multiplier {
                    let scaled = self
                        .numbers
                        .parse(&text[group.start()..])
                        .first()
                        .map_or(value, NumberToken::scaled_value);
                    values.push(scaled);
                } else {
                    values.push(value);
                }
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{NgramEmbedder, SemanticIndex};
    use crate::literal::RawTextRetriever;
    use crate::segmenter::SectionSegmenter;
    use std::sync::Arc;

    fn index_for(text: &str) -> SemanticIndex {
        let sections = SectionSegmenter::default().segment(text, "report.pdf");
        SemanticIndex::build(sections, Arc::new(NgramEmbedder::default())).unwrap()
    }

    fn extractor() -> MetricExtractor {
        MetricExtractor::new(ExtractorConfig::default()).unwrap()
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(extractor().metrics.len(), METRIC_SPECS.len());
    }

    #[test]
    fn test_total_assets_resolves() {
        let index = index_for("一、资产负债表\n资产总计 1,234,500.00\n二、其他\n无");
        let resolution = extractor().resolve_metric(&index, "total_assets").unwrap();
        assert_eq!(resolution.value(), Some(1_234_500.0));
        assert!(resolution.failures.is_empty());
    }

    #[test]
    fn test_primary_value_is_the_maximum() {
        let index = index_for(
            "一、合并利润表\n营业收入 3,000.00\n营业总收入 12,000.00\n营业收入 3,000.00",
        );
        let resolution = extractor().resolve_metric(&index, "revenue").unwrap();
        match resolution.outcome {
            MetricOutcome::Found(metric) => {
                assert_eq!(metric.value, 12_000.0);
                assert_eq!(metric.candidates, vec![12_000.0, 3_000.0]);
                assert_eq!(metric.source_header, "一、合并利润表");
            }
            other => panic!("expected a resolved metric, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found_returns_raw_excerpts() {
        let index = index_for("一、公司简介\n本公司主要从事软件开发业务。");
        let resolution = extractor().resolve_metric(&index, "total_assets").unwrap();
        match &resolution.outcome {
            MetricOutcome::NotFound { excerpts } => {
                assert!(!excerpts.is_empty());
                assert!(excerpts[0].contains("软件开发"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
        let text = resolution.to_string();
        assert!(text.contains("Could not extract 总资产"));
    }

    #[test]
    fn test_not_found_without_keyword_hits_keeps_context() {
        let raw = RawTextRetriever::new("一、公司简介\n本公司主要从事软件开发业务。", "report.pdf");
        let resolution = extractor().resolve_metric(&raw, "total_assets").unwrap();
        match &resolution.outcome {
            MetricOutcome::NotFound { excerpts } => {
                assert_eq!(excerpts.len(), 1);
                assert!(excerpts[0].contains("软件开发"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert!(!resolution.to_string().contains("no passages retrieved"));
    }

    #[test]
    fn test_sparse_overview_without_statement_hits_keeps_context() {
        let raw = RawTextRetriever::new("一、公司简介\n本公司主要从事软件开发业务。", "report.pdf");
        let report = extractor().resolve_all(&raw);
        assert_eq!(report.resolved_count(), 0);
        assert_eq!(report.supplementary_excerpts.len(), 1);
        assert!(report.supplementary_excerpts[0].contains("软件开发"));
    }

    #[test]
    fn test_unknown_metric() {
        let index = index_for("一、简介\n无");
        let result = extractor().resolve(&index, "goodwill");
        assert!(matches!(result, Err(ReportError::UnknownMetric(_))));
    }

    #[test]
    fn test_all_mode_attaches_statement_excerpts_when_sparse() {
        let index = index_for("一、利润表\n营业收入 5,000.00\n二、资产负债表\n货币资金 300.00");
        let extraction = extractor().resolve(&index, ALL_METRICS).unwrap();
        let Extraction::All(report) = &extraction else {
            panic!("expected overview report");
        };
        assert!(report.resolved_count() < 5);
        assert!(!report.supplementary_excerpts.is_empty());

        let map = extraction.metric_map();
        assert_eq!(map.get("revenue"), Some(&5_000.0));
        assert_eq!(map.get("cash"), Some(&300.0));
        assert!(extraction.to_string().contains("- 存货: not found"));
    }

    #[test]
    fn test_unit_multiplier_is_opt_in() {
        let text = "一、主要会计数据\n营业收入 12.5 亿元";
        let index = index_for(text);
        let plain = extractor().resolve_metric(&index, "revenue").unwrap();
        assert_eq!(plain.value(), Some(12.5));

        let config = ExtractorConfig {
            apply_unit_multiplier: true,
            ..ExtractorConfig::default()
        };
        let scaled = MetricExtractor::new(config.clone())
            .unwrap()
            .resolve_metric(&index_for(text), "revenue")
            .unwrap();
        assert_eq!(scaled.value(), Some(1_250_000_000.0));

        let scaled = MetricExtractor::new(config)
            .unwrap()
            .resolve_metric(&index_for("一、利润表\n净利润 3,200 万元"), "net_income")
            .unwrap();
        assert_eq!(scaled.value(), Some(32_000_000.0));
    }

    #[test]
    fn test_negative_net_income() {
        let index = index_for("一、利润表\n净利润 -2,300.50");
        let resolution = extractor().resolve_metric(&index, "net_income").unwrap();
        assert_eq!(resolution.value(), Some(-2_300.5));
    }
}
