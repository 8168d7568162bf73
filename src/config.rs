use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for segmentation, retrieval and report rendering.
///
/// Every field has a default, so a partial JSON document only needs the
/// values it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Passages retrieved per metric keyword.
    pub metric_top_k: usize,
    /// How many keywords of an unresolved metric are searched for raw excerpts.
    pub fallback_keywords: usize,
    /// Passages retrieved per fallback keyword.
    pub fallback_top_k: usize,
    pub fallback_excerpt_chars: usize,
    pub context_snippet_chars: usize,

    /// Below this many resolved metrics, an "all" extraction attaches statement excerpts.
    pub overview_min_resolved: usize,
    pub overview_top_k: usize,
    pub overview_excerpt_chars: usize,
    pub overview_queries: Vec<String>,

    /// Passages retrieved per expanded query in free-text and topic search.
    pub search_top_k: usize,
    /// Passages kept after merging all expanded queries.
    pub search_result_limit: usize,
    /// Leading characters compared when deduplicating merged passages.
    pub dedup_prefix_chars: usize,
    pub max_expansion: usize,

    /// Front matter shorter than this is dropped by the segmenter.
    pub min_front_matter_chars: usize,
    pub header_max_chars: usize,

    /// Scale parsed figures by their unit suffix (万元, 亿元).
    pub apply_unit_multiplier: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            metric_top_k: 3,
            fallback_keywords: 2,
            fallback_top_k: 2,
            fallback_excerpt_chars: 400,
            context_snippet_chars: 300,
            overview_min_resolved: 5,
            overview_top_k: 2,
            overview_excerpt_chars: 500,
            overview_queries: vec![
                "利润表".to_string(),
                "资产负债表".to_string(),
                "主要会计数据".to_string(),
            ],
            search_top_k: 5,
            search_result_limit: 5,
            dedup_prefix_chars: 100,
            max_expansion: 3,
            min_front_matter_chars: 50,
            header_max_chars: 50,
            apply_unit_multiplier: false,
        }
    }
}

impl ExtractorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("metric_top_k", self.metric_top_k),
            ("search_top_k", self.search_top_k),
            ("search_result_limit", self.search_result_limit),
            ("header_max_chars", self.header_max_chars),
            ("dedup_prefix_chars", self.dedup_prefix_chars),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ReportError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    field
                )));
            }
        }
        Ok(())
    }
}
