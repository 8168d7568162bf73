use crate::utils::truncate_chars;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const FULL_TEXT_HEADER: &str = "full text";
pub const DOCUMENT_START_HEADER: &str = "document start";

// Alternation order decides which style wins when several match on one line.
static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?m)^(",
        r"[一二三四五六七八九十]+、",
        r"|第[一二三四五六七八九十\d]+[节章条款]",
        r"|[（(][一二三四五六七八九十\d]+[)）]",
        r"|\d+[、.．]\s*[^\d]",
        r"|[①②③④⑤⑥⑦⑧⑨⑩]",
        r")"
    ))
    .expect("heading pattern is valid")
});

/// A heading-delimited span of document text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub content: String,
    pub source: String,
    /// First line of the content, shortened for citation display.
    pub header: String,
    /// The heading token that opened this section, empty for synthetic sections.
    pub header_marker: String,
    pub expanded: bool,
}

impl Section {
    fn synthetic(content: &str, source: &str, header: &str) -> Self {
        Self {
            content: content.to_string(),
            source: source.to_string(),
            header: header.to_string(),
            header_marker: String::new(),
            expanded: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SectionSegmenter {
    min_front_matter_chars: usize,
    header_max_chars: usize,
}

impl Default for SectionSegmenter {
    fn default() -> Self {
        Self::new(50, 50)
    }
}

impl SectionSegmenter {
    pub fn new(min_front_matter_chars: usize, header_max_chars: usize) -> Self {
        Self {
            min_front_matter_chars,
            header_max_chars,
        }
    }

    /// Splits `text` at every heading marker found at the start of a line.
    ///
    /// Text before the first heading becomes a "document start" section when it
    /// is longer than the front-matter threshold and is dropped otherwise.
    pub fn segment(&self, text: &str, source: &str) -> Vec<Section> {
        let starts: Vec<(usize, &str)> = HEADING
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| (m.start(), m.as_str()))
            .collect();

        if starts.is_empty() {
            return vec![Section::synthetic(text.trim(), source, FULL_TEXT_HEADER)];
        }

        let mut sections = Vec::with_capacity(starts.len() + 1);

        let front_matter = text[..starts[0].0].trim();
        if front_matter.chars().count() > self.min_front_matter_chars {
            sections.push(Section::synthetic(
                front_matter,
                source,
                DOCUMENT_START_HEADER,
            ));
        }

        for (i, (start, marker)) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map_or(text.len(), |(next, _)| *next);
            let content = text[*start..end].trim();
            let first_line = content.lines().next().unwrap_or("");

            sections.push(Section {
                content: content.to_string(),
                source: source.to_string(),
                header: truncate_chars(first_line, self.header_max_chars).to_string(),
                header_marker: marker.trim().to_string(),
                expanded: false,
            });
        }

        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_heading_yields_single_section() {
        let segmenter = SectionSegmenter::default();
        let sections = segmenter.segment("plain text without any heading\nsecond line", "a.pdf");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].header, FULL_TEXT_HEADER);
        assert_eq!(sections[0].source, "a.pdf");
    }

    #[test]
    fn test_two_cjk_numeral_headings() {
        let segmenter = SectionSegmenter::default();
        let sections = segmenter.segment("一、收入\n100\n二、成本\n50", "a.pdf");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].header, "一、收入");
        assert_eq!(sections[0].header_marker, "一、");
        assert_eq!(sections[0].content, "一、收入\n100");
        assert_eq!(sections[1].header, "二、成本");
        assert_eq!(sections[1].content, "二、成本\n50");
    }

    #[test]
    fn test_short_front_matter_is_dropped() {
        let segmenter = SectionSegmenter::default();
        let sections = segmenter.segment("年度报告\n一、公司信息\n内容", "a.pdf");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].header, "一、公司信息");
    }

    #[test]
    fn test_long_front_matter_is_kept() {
        let segmenter = SectionSegmenter::default();
        let preface = "本公司董事会及全体董事保证本报告内容不存在任何虚假记载、误导性陈述或者重大遗漏，并对其内容的真实性、准确性和完整性承担法律责任。";
        let text = format!("{}\n第一节 重要提示\n正文", preface);
        let sections = segmenter.segment(&text, "a.pdf");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].header, DOCUMENT_START_HEADER);
        assert_eq!(sections[0].content, preface);
        assert_eq!(sections[1].header_marker, "第一节");
    }

    #[test]
    fn test_heading_styles() {
        let segmenter = SectionSegmenter::default();
        let text = "（一）资产\na\n(2) 负债\nb\n3、权益\nc\n4. 现金\nd\n①其他\ne";
        let markers: Vec<String> = segmenter
            .segment(text, "")
            .into_iter()
            .map(|s| s.header_marker)
            .collect();
        assert_eq!(markers, vec!["（一）", "(2)", "3、权", "4. 现", "①"]);
    }

    #[test]
    fn test_decimal_numbers_are_not_headings() {
        let segmenter = SectionSegmenter::default();
        let sections = segmenter.segment("一、指标\n2.5\n12.34%\n", "");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "一、指标\n2.5\n12.34%");
    }

    #[test]
    fn test_adjacent_headings_keep_bodyless_section() {
        let segmenter = SectionSegmenter::default();
        let sections = segmenter.segment("一、空章节\n二、正文\n内容", "");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].content, "一、空章节");
    }

    #[test]
    fn test_header_is_truncated() {
        let segmenter = SectionSegmenter::new(50, 5);
        let sections = segmenter.segment("一、非常长的标题内容超过限制\n正文", "");
        assert_eq!(sections[0].header, "一、非常长");
    }
}
