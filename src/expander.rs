/// Canonical financial terms and their synonyms, scanned in this order.
const FINANCIAL_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "利润",
        &[
            "利润总额",
            "归属于上市公司股东的净利润",
            "归属于上市公司股东的扣除非经常性损益的净利润",
        ],
    ),
    ("收入", &["营业收入", "营业总收入"]),
    ("资产", &["总资产", "资产总计"]),
    ("负债", &["总负债", "负债合计"]),
    ("现金流", &["经营活动产生的现金流量净额"]),
    ("毛利", &["毛利率"]),
    ("净利率", &["销售净利率"]),
    ("ROE", &["净资产收益率"]),
    ("ROA", &["总资产收益率"]),
    ("EPS", &["基本每股收益（元/股）", "稀释每股收益（元/股）"]),
    ("营收", &["营业收入"]),
    ("成本", &["营业成本"]),
    ("费用", &["销售费用", "管理费用", "财务费用"]),
];

/// Broadens a retrieval query with domain synonyms.
///
/// Only the first synonym cluster that matches contributes, which bounds the
/// number of searches a single query can fan out into.
#[derive(Debug, Clone)]
pub struct QueryExpander {
    max_expansion: usize,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new(3)
    }
}

impl QueryExpander {
    pub fn new(max_expansion: usize) -> Self {
        Self { max_expansion }
    }

    /// Returns the query followed by at most `max_expansion` variants.
    ///
    /// The original query is always first; no entry appears twice.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let mut queries = vec![query.to_string()];

        for (key, synonyms) in FINANCIAL_SYNONYMS {
            if query.contains(key) {
                queries.extend(
                    synonyms
                        .iter()
                        .take(self.max_expansion)
                        .map(|s| s.to_string()),
                );
                break;
            }
            if synonyms.iter().any(|syn| query.contains(syn)) {
                queries.push(key.to_string());
                break;
            }
        }

        let mut unique: Vec<String> = Vec::with_capacity(queries.len());
        for q in queries {
            if !unique.contains(&q) {
                unique.push(q);
            }
        }
        unique.truncate(self.max_expansion + 1);
        unique
    }
}
