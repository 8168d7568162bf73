use crate::utils::strip_separators;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(-?[\d,，]+(?:\.\d*)?)\s*(万元|亿元|元)?").expect("number token pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// 元
    Yuan,
    /// 万元, ten thousand yuan
    TenThousandYuan,
    /// 亿元, one hundred million yuan
    HundredMillionYuan,
}

impl Unit {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "元" => Some(Unit::Yuan),
            "万元" => Some(Unit::TenThousandYuan),
            "亿元" => Some(Unit::HundredMillionYuan),
            _ => None,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            Unit::Yuan => 1.0,
            Unit::TenThousandYuan => 1e4,
            Unit::HundredMillionYuan => 1e8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberToken {
    /// Parsed value. The unit suffix is recognized but not applied.
    pub value: f64,
    /// The token as written in the source text, separators included.
    pub original: String,
    pub unit: Option<Unit>,
}

impl NumberToken {
    /// The value scaled by its unit suffix, if any.
    pub fn scaled_value(&self) -> f64 {
        self.unit.map_or(self.value, |unit| self.value * unit.multiplier())
    }
}

/// Parses a single token such as `1,234,567.89` into a non-zero value.
pub fn parse_number(token: &str) -> Option<f64> {
    let clean = strip_separators(token);
    if clean.is_empty() || clean == "-" || clean == "." {
        return None;
    }
    match clean.parse::<f64>() {
        Ok(value) if value.is_finite() && value != 0.0 => Some(value),
        _ => None,
    }
}

/// Reads ASCII and full-width thousands separators (`1,234.5`, `1，234.5`).
/// Zero tokens are skipped; they almost always come from bullet numbering.
#[derive(Debug, Clone, Default)]
pub struct NumberParser;

impl NumberParser {
    pub fn new() -> Self {
        Self
    }

    /// Distinct non-zero numbers in `text`, in encounter order.
    ///
    /// Equal values collapse onto the first token that produced them.
    pub fn parse(&self, text: &str) -> Vec<NumberToken> {
        let mut tokens: Vec<NumberToken> = Vec::new();

        for caps in NUMBER_TOKEN.captures_iter(text) {
            let Some(raw) = caps.get(1) else {
                continue;
            };
            let Some(value) = parse_number(raw.as_str()) else {
                continue;
            };
            if tokens.iter().any(|t| t.value == value) {
                continue;
            }
            tokens.push(NumberToken {
                value,
                original: raw.as_str().to_string(),
                unit: caps.get(2).and_then(|m| Unit::from_suffix(m.as_str())),
            });
        }

        tokens
    }

    pub fn values(&self, text: &str) -> Vec<f64> {
        self.parse(text).into_iter().map(|t| t.value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_separators() {
        let parser = NumberParser::new();
        assert_eq!(parser.values("1,234,567.89"), vec![1234567.89]);
    }

    #[test]
    fn test_full_width_separators() {
        let parser = NumberParser::new();
        let tokens = parser.parse("1，234，567.89");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, 1234567.89);
        assert_eq!(tokens[0].original, "1，234，567.89");
    }

    #[test]
    fn test_zero_is_excluded() {
        let parser = NumberParser::new();
        assert!(parser.parse("0").is_empty());
        assert!(parser.parse("0.00 元").is_empty());
    }

    #[test]
    fn test_negative_value() {
        let parser = NumberParser::new();
        assert_eq!(parser.values("-500.00"), vec![-500.0]);
    }

    #[test]
    fn test_duplicates_collapse_to_first_token() {
        let parser = NumberParser::new();
        let tokens = parser.parse("本期 1,000.00 上期 1000 合计 2,500");
        let values: Vec<f64> = tokens.iter().map(|t| t.value).collect();
        assert_eq!(values, vec![1000.0, 2500.0]);
        assert_eq!(tokens[0].original, "1,000.00");
    }

    #[test]
    fn test_separator_only_tokens_are_skipped() {
        let parser = NumberParser::new();
        assert!(parser.parse("，,， - .").is_empty());
    }

    #[test]
    fn test_unit_is_recognized_but_not_applied() {
        let parser = NumberParser::new();
        let tokens = parser.parse("营业收入 12.5 亿元，净利润 3,200 万元");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].value, 12.5);
        assert_eq!(tokens[0].unit, Some(Unit::HundredMillionYuan));
        assert_eq!(tokens[1].value, 3200.0);
        assert_eq!(tokens[1].unit, Some(Unit::TenThousandYuan));
    }

    #[test]
    fn test_scaled_value_applies_unit() {
        let parser = NumberParser::new();
        let tokens = parser.parse("3,200 万元");
        assert_eq!(tokens[0].scaled_value(), 32_000_000.0);

        let plain = parser.parse("42");
        assert_eq!(plain[0].scaled_value(), 42.0);
    }
}
