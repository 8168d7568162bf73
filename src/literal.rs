use crate::error::Result;
use crate::index::{Retriever, ScoredSection};
use crate::segmenter::Section;
use crate::utils::{format_amount, strip_separators, truncate_chars};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FigureKind {
    Amount,
    SignedAmount,
    PerShare,
    Percent,
}

impl FigureKind {
    fn suffix(&self) -> &'static str {
        match self {
            FigureKind::Amount => r"[（(]?元?[)）]?[\s|｜]*(?:—\s*)*([\d,，]+\.?\d*)",
            FigureKind::SignedAmount => r"[（(]?元?[)）]?[\s|｜]*(?:—\s*)*(-?[\d,，]+\.?\d*)",
            FigureKind::PerShare => r"[（(]?元/股[)）]?[\s|｜]*(?:—\s*)*(-?[\d.]+)",
            FigureKind::Percent => r"[（(]?%?[)）]?[\s|｜]*(?:—\s*)*(-?[\d.]+)%?",
        }
    }
}

struct LiteralField {
    name: &'static str,
    /// Label with `?` marking an optional character.
    label: &'static str,
    metric_key: Option<&'static str>,
    kind: FigureKind,
}

const LITERAL_FIELDS: &[LiteralField] = &[
    LiteralField {
        name: "营业收入",
        label: "营业总?收入",
        metric_key: Some("revenue"),
        kind: FigureKind::Amount,
    },
    LiteralField {
        name: "利润总额",
        label: "利润总额",
        metric_key: Some("ebit"),
        kind: FigureKind::Amount,
    },
    LiteralField {
        name: "归属于上市公司股东的净利润",
        label: "归属于上市公司股东的?净利润",
        metric_key: Some("net_income"),
        kind: FigureKind::SignedAmount,
    },
    LiteralField {
        name: "扣非净利润",
        label: "扣除非?经常性损益的?净利润",
        metric_key: Some("operating_income"),
        kind: FigureKind::SignedAmount,
    },
    LiteralField {
        name: "基本每股收益",
        label: "基本每股收益",
        metric_key: None,
        kind: FigureKind::PerShare,
    },
    LiteralField {
        name: "稀释每股收益",
        label: "稀释每股收益",
        metric_key: None,
        kind: FigureKind::PerShare,
    },
    LiteralField {
        name: "总资产",
        label: "总资产",
        metric_key: Some("total_assets"),
        kind: FigureKind::Amount,
    },
    LiteralField {
        name: "归属于上市公司股东的所有者权益",
        label: "归属于上市公司股东的?所有者权益",
        metric_key: Some("equity"),
        kind: FigureKind::Amount,
    },
    LiteralField {
        name: "经营活动产生的现金流量净额",
        label: "经营活动产生的现金流量净额",
        metric_key: None,
        kind: FigureKind::SignedAmount,
    },
    LiteralField {
        name: "加权平均净资产收益率",
        label: "加权平均净资产收益率",
        metric_key: None,
        kind: FigureKind::Percent,
    },
];

/// Expands a label into a pattern that allows whitespace between characters.
fn spaced_label(label: &str) -> String {
    let mut pieces: Vec<String> = Vec::new();
    for ch in label.chars() {
        if ch == '?' {
            if let Some(last) = pieces.last_mut() {
                last.push('?');
            }
            continue;
        }
        pieces.push(regex::escape(&ch.to_string()));
    }
    pieces.join(r"\s*")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralFigure {
    pub name: String,
    /// Metric key this figure answers, when it corresponds to one.
    pub metric_key: Option<String>,
    pub value: f64,
    /// The figure as printed, separators included.
    pub original: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteralScan {
    pub figures: Vec<LiteralFigure>,
}

impl LiteralScan {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.figures.iter().find(|f| f.name == name).map(|f| f.value)
    }

    pub fn for_metric(&self, key: &str) -> Option<f64> {
        self.figures
            .iter()
            .find(|f| f.metric_key.as_deref() == Some(key))
            .map(|f| f.value)
    }

    pub fn is_empty(&self) -> bool {
        self.figures.is_empty()
    }
}

impl fmt::Display for LiteralScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.figures.is_empty() {
            return writeln!(f, "No labeled figures found in the raw text.");
        }
        writeln!(f, "Labeled figures found in the raw text:")?;
        for figure in &self.figures {
            match figure.name.as_str() {
                "基本每股收益" | "稀释每股收益" => {
                    writeln!(f, "- {}: {} 元/股", figure.name, figure.value)?
                }
                "加权平均净资产收益率" => writeln!(f, "- {}: {}%", figure.name, figure.value)?,
                _ => writeln!(f, "- {}: {}", figure.name, format_amount(figure.value))?,
            }
        }
        Ok(())
    }
}

struct CompiledField {
    field: &'static LiteralField,
    pattern: Regex,
}

/// Matches statement labels in raw page text, tolerating whitespace between
/// label characters, so it works without an embedding backend.
pub struct LiteralScanner {
    fields: Vec<CompiledField>,
}

impl LiteralScanner {
    pub fn new() -> Result<Self> {
        let fields = LITERAL_FIELDS
            .iter()
            .map(|field| {
                let pattern = Regex::new(&format!(
                    "{}{}",
                    spaced_label(field.label),
                    field.kind.suffix()
                ))?;
                Ok(CompiledField { field, pattern })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    /// Scans the whole text once per field; the first parseable match wins.
    pub fn scan(&self, text: &str) -> LiteralScan {
        let mut figures = Vec::new();
        for compiled in &self.fields {
            let found = compiled.pattern.captures_iter(text).find_map(|caps| {
                let original = caps.get(1)?.as_str();
                let value = strip_separators(original).parse::<f64>().ok()?;
                value.is_finite().then(|| (value, original.to_string()))
            });
            if let Some((value, original)) = found {
                figures.push(LiteralFigure {
                    name: compiled.field.name.to_string(),
                    metric_key: compiled.field.metric_key.map(str::to_string),
                    value,
                    original,
                });
            }
        }
        debug!("Literal scan found {} labeled figures", figures.len());
        LiteralScan { figures }
    }
}

static NUMERIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?[\d,，]+\.?\d*").expect("numeric token pattern is valid"));
static NON_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\d,，.%\-\s]+").expect("label strip pattern is valid"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub item: String,
    /// Cell figures with separators removed, as printed.
    pub values: Vec<String>,
}

impl TableRow {
    pub fn numbers(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter_map(|v| v.parse::<f64>().ok())
            .collect()
    }
}

/// Treats every line carrying at least two figures as a table row.
pub fn extract_table_rows(page_text: &str) -> Vec<TableRow> {
    page_text
        .lines()
        .filter_map(|line| {
            let values: Vec<String> = NUMERIC_TOKEN
                .find_iter(line)
                .map(|m| m.as_str())
                .filter(|token| token.chars().any(|c| c.is_ascii_digit()))
                .map(strip_separators)
                .collect();
            if values.len() < 2 {
                return None;
            }
            let item = NON_LABEL.replace_all(line, "").trim().to_string();
            (!item.is_empty()).then_some(TableRow { item, values })
        })
        .collect()
}

/// Keyword windows over raw text, for use when no semantic index exists.
///
/// Each occurrence of the query yields one passage spanning a few characters
/// before it and a longer stretch after it. Overlapping occurrences collapse
/// into the first window.
#[derive(Debug, Clone)]
pub struct RawTextRetriever {
    text: String,
    source: String,
    before_chars: usize,
    after_chars: usize,
}

impl RawTextRetriever {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            before_chars: 50,
            after_chars: 450,
        }
    }

    pub fn with_window(mut self, before_chars: usize, after_chars: usize) -> Self {
        self.before_chars = before_chars;
        self.after_chars = after_chars;
        self
    }

    fn passage(&self, text: &str) -> Section {
        let content = text.trim().to_string();
        let header = truncate_chars(content.lines().next().unwrap_or(""), 50).to_string();
        Section {
            content,
            source: self.source.clone(),
            header,
            header_marker: String::new(),
            expanded: true,
        }
    }

    fn window(&self, at: usize, query_len: usize) -> (usize, usize) {
        let start = self.text[..at]
            .char_indices()
            .rev()
            .take(self.before_chars)
            .last()
            .map_or(at, |(i, _)| i);
        let from = at + query_len;
        let end = self.text[from..]
            .char_indices()
            .nth(self.after_chars)
            .map_or(self.text.len(), |(i, _)| from + i);
        (start, end)
    }
}

impl Retriever for RawTextRetriever {
    fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<ScoredSection>> {
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        let mut covered_until = 0;
        for (at, matched) in self.text.match_indices(query) {
            if hits.len() == k {
                break;
            }
            if at < covered_until {
                continue;
            }
            let (start, end) = self.window(at, matched.len());
            covered_until = end;

            hits.push(ScoredSection {
                section: self.passage(&self.text[start..end]),
                score: 0.0,
            });
        }
        Ok(hits)
    }

    fn leading(&self, k: usize) -> Vec<Section> {
        let chunk_chars = (self.before_chars + self.after_chars).max(1);
        let mut passages = Vec::new();
        let mut rest = self.text.as_str();
        while passages.len() < k && !rest.trim().is_empty() {
            let end = rest
                .char_indices()
                .nth(chunk_chars)
                .map_or(rest.len(), |(i, _)| i);
            let passage = self.passage(&rest[..end]);
            if !passage.is_empty() {
                passages.push(passage);
            }
            rest = &rest[end..];
        }
        passages
    }
}
