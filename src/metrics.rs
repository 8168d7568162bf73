use serde::Serialize;

/// Retrieval aliases and extraction patterns for one named metric.
///
/// Each pattern captures the figure in group 1.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricSpec {
    pub key: &'static str,
    /// Label as it appears in the statements, used for display.
    pub name: &'static str,
    pub description: &'static str,
    pub keywords: &'static [&'static str],
    pub patterns: &'static [&'static str],
}

pub const ALL_METRICS: &str = "all";

pub const METRIC_SPECS: &[MetricSpec] = &[
    MetricSpec {
        key: "revenue",
        name: "营业收入",
        description: "Operating revenue",
        keywords: &["营业收入", "营业总收入", "主营业务收入", "一、营业收入"],
        patterns: &[
            r"(?:一、)?营业(?:总)?收入[^\d]*?([\d,，]+(?:\.\d+)?)",
            r"营业收入\s+([\d,，]+(?:\.\d+)?)",
        ],
    },
    MetricSpec {
        key: "net_income",
        name: "净利润",
        description: "Net profit",
        keywords: &[
            "净利润",
            "归属于母公司所有者的净利润",
            "归属于上市公司股东的净利润",
        ],
        patterns: &[
            r"(?:四、)?净利润[^\d]*?([\d,，-]+(?:\.\d+)?)",
            r"归属于.*?净利润[^\d]*?([\d,，-]+(?:\.\d+)?)",
        ],
    },
    MetricSpec {
        key: "total_assets",
        name: "总资产",
        description: "Total assets",
        keywords: &["资产总计", "资产总额", "总资产"],
        patterns: &[
            r"资产总计[^\d]*?([\d,，]+(?:\.\d+)?)",
            r"总资产[^\d]*?([\d,，]+(?:\.\d+)?)",
        ],
    },
    MetricSpec {
        key: "total_liabilities",
        name: "总负债",
        description: "Total liabilities",
        keywords: &["负债合计", "负债总计", "负债总额"],
        patterns: &[r"负债(?:合计|总计)[^\d]*?([\d,，]+(?:\.\d+)?)"],
    },
    MetricSpec {
        key: "equity",
        name: "股东权益",
        description: "Shareholders' equity",
        keywords: &[
            "所有者权益合计",
            "股东权益合计",
            "归属于母公司所有者权益",
        ],
        patterns: &[
            r"(?:所有者|股东)权益.*?合计[^\d]*?([\d,，]+(?:\.\d+)?)",
            r"归属于母公司.*?权益[^\d]*?([\d,，]+(?:\.\d+)?)",
        ],
    },
    MetricSpec {
        key: "current_assets",
        name: "流动资产",
        description: "Current assets",
        keywords: &["流动资产合计", "流动资产小计"],
        patterns: &[r"流动资产(?:合计|小计)[^\d]*?([\d,，]+(?:\.\d+)?)"],
    },
    MetricSpec {
        key: "current_liabilities",
        name: "流动负债",
        description: "Current liabilities",
        keywords: &["流动负债合计", "流动负债小计"],
        patterns: &[r"流动负债(?:合计|小计)[^\d]*?([\d,，]+(?:\.\d+)?)"],
    },
    MetricSpec {
        key: "cash",
        name: "货币资金",
        description: "Cash and cash equivalents",
        keywords: &["货币资金", "现金及现金等价物", "库存现金"],
        patterns: &[
            r"货币资金[^\d]*?([\d,，]+(?:\.\d+)?)",
            r"现金及现金等价物[^\d]*?([\d,，]+(?:\.\d+)?)",
        ],
    },
    MetricSpec {
        key: "operating_income",
        name: "归属于上市公司股东的扣除非经常性损益的净利润",
        description: "Net profit excluding non-recurring items",
        keywords: &[
            "扣除非经常性损益",
            "扣非净利润",
            "扣除非经常性损益的净利润",
        ],
        patterns: &[
            r"扣除非经常性损益.*?净利润[^\d]*?([\d,，-]+(?:\.\d+)?)",
            r"归属于上市公司股东的扣除非经常性损益的净利润[^\d]*?([\d,，-]+(?:\.\d+)?)",
        ],
    },
    MetricSpec {
        key: "inventory",
        name: "存货",
        description: "Inventory",
        keywords: &["存货"],
        patterns: &[r"存货[^\d]*?([\d,，]+(?:\.\d+)?)"],
    },
    MetricSpec {
        key: "interest_expense",
        name: "利息费用",
        description: "Interest expense",
        keywords: &["利息费用", "财务费用"],
        patterns: &[r"其中[:：]?\s*利息费用[^\d]*?([\d,，]+(?:\.\d+)?)", r"利息费用[^\d]*?([\d,，]+(?:\.\d+)?)"],
    },
    MetricSpec {
        key: "ebit",
        name: "利润总额",
        description: "Total profit before tax, used as the EBIT proxy",
        keywords: &["利润总额", "三、利润总额"],
        patterns: &[r"(?:三、)?利润总额[^\d]*?([\d,，-]+(?:\.\d+)?)"],
    },
];

pub fn metric_spec(key: &str) -> Option<&'static MetricSpec> {
    METRIC_SPECS.iter().find(|spec| spec.key == key)
}

pub fn metric_keys() -> Vec<&'static str> {
    METRIC_SPECS.iter().map(|spec| spec.key).collect()
}

/// One `key (description)` entry per supported metric, comma separated.
pub fn metric_catalog() -> String {
    METRIC_SPECS
        .iter()
        .map(|spec| format!("{} ({})", spec.key, spec.description))
        .collect::<Vec<_>>()
        .join(", ")
}
