use crate::error::{ReportError, Result};
use crate::extractor::MetricMap;
use crate::utils::format_percent;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

const INSUFFICIENT: &str = "insufficient data";

fn require(value: Option<f64>, key: &str) -> Result<f64> {
    value.ok_or_else(|| ReportError::InsufficientData(format!("{} is unknown", key)))
}

fn require_nonzero(value: Option<f64>, key: &str) -> Result<f64> {
    let value = require(value, key)?;
    if value == 0.0 {
        return Err(ReportError::InputError(format!("{} must not be zero", key)));
    }
    Ok(value)
}

fn write_ratio(f: &mut fmt::Formatter<'_>, label: &str, value: Option<f64>) -> fmt::Result {
    match value {
        Some(v) => writeln!(f, "- {}: {:.2}", label, v),
        None => writeln!(f, "- {}: {}", label, INSUFFICIENT),
    }
}

fn write_percent(f: &mut fmt::Formatter<'_>, label: &str, value: Option<f64>) -> fmt::Result {
    match value {
        Some(v) => writeln!(f, "- {}: {}", label, format_percent(v)),
        None => writeln!(f, "- {}: {}", label, INSUFFICIENT),
    }
}

fn write_verdicts(f: &mut fmt::Formatter<'_>, verdicts: &[String]) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "💡 Assessment:")?;
    for verdict in verdicts {
        writeln!(f, "- {}", verdict)?;
    }
    Ok(())
}

/// `None` means the figure is unknown, which is different from a disclosed zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProfitabilityInputs {
    #[schemars(description = "Operating revenue (营业收入)")]
    pub revenue: Option<f64>,
    #[schemars(description = "Net profit (净利润)")]
    pub net_income: Option<f64>,
    #[schemars(description = "Total assets (总资产)")]
    pub total_assets: Option<f64>,
    #[schemars(description = "Net profit excluding non-recurring items (扣非净利润)")]
    pub operating_income: Option<f64>,
}

impl ProfitabilityInputs {
    pub fn from_metrics(metrics: &MetricMap) -> Self {
        Self {
            revenue: metrics.get("revenue").copied(),
            net_income: metrics.get("net_income").copied(),
            total_assets: metrics.get("total_assets").copied(),
            operating_income: metrics.get("operating_income").copied(),
        }
    }

    /// Fills gaps from `self`, keeping every value present in `explicit`.
    pub fn overlay(self, explicit: Self) -> Self {
        Self {
            revenue: explicit.revenue.or(self.revenue),
            net_income: explicit.net_income.or(self.net_income),
            total_assets: explicit.total_assets.or(self.total_assets),
            operating_income: explicit.operating_income.or(self.operating_income),
        }
    }

    /// Metric keys with no value yet.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("revenue", self.revenue),
            ("net_income", self.net_income),
            ("total_assets", self.total_assets),
            ("operating_income", self.operating_income),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.is_none().then_some(key))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LiquidityInputs {
    #[schemars(description = "Current assets (流动资产)")]
    pub current_assets: Option<f64>,
    #[schemars(description = "Current liabilities (流动负债)")]
    pub current_liabilities: Option<f64>,
    #[schemars(description = "Cash and cash equivalents (货币资金)")]
    pub cash: Option<f64>,
    #[schemars(description = "Inventory (存货)")]
    pub inventory: Option<f64>,
}

impl LiquidityInputs {
    pub fn from_metrics(metrics: &MetricMap) -> Self {
        Self {
            current_assets: metrics.get("current_assets").copied(),
            current_liabilities: metrics.get("current_liabilities").copied(),
            cash: metrics.get("cash").copied(),
            inventory: metrics.get("inventory").copied(),
        }
    }

    pub fn overlay(self, explicit: Self) -> Self {
        Self {
            current_assets: explicit.current_assets.or(self.current_assets),
            current_liabilities: explicit.current_liabilities.or(self.current_liabilities),
            cash: explicit.cash.or(self.cash),
            inventory: explicit.inventory.or(self.inventory),
        }
    }

    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("current_assets", self.current_assets),
            ("current_liabilities", self.current_liabilities),
            ("cash", self.cash),
            ("inventory", self.inventory),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.is_none().then_some(key))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LeverageInputs {
    #[schemars(description = "Total assets (总资产)")]
    pub total_assets: Option<f64>,
    #[schemars(
        description = "Total liabilities (总负债). Derived as total assets minus equity when omitted."
    )]
    pub total_liabilities: Option<f64>,
    #[schemars(description = "Shareholders' equity (股东权益)")]
    pub equity: Option<f64>,
    #[schemars(description = "Interest expense (利息费用)")]
    pub interest_expense: Option<f64>,
    #[schemars(description = "Earnings before interest and tax (利润总额 is used as the proxy)")]
    pub ebit: Option<f64>,
}

impl LeverageInputs {
    pub fn from_metrics(metrics: &MetricMap) -> Self {
        Self {
            total_assets: metrics.get("total_assets").copied(),
            total_liabilities: metrics.get("total_liabilities").copied(),
            equity: metrics.get("equity").copied(),
            interest_expense: metrics.get("interest_expense").copied(),
            ebit: metrics.get("ebit").copied(),
        }
    }

    pub fn overlay(self, explicit: Self) -> Self {
        Self {
            total_assets: explicit.total_assets.or(self.total_assets),
            total_liabilities: explicit.total_liabilities.or(self.total_liabilities),
            equity: explicit.equity.or(self.equity),
            interest_expense: explicit.interest_expense.or(self.interest_expense),
            ebit: explicit.ebit.or(self.ebit),
        }
    }

    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("total_assets", self.total_assets),
            ("total_liabilities", self.total_liabilities),
            ("equity", self.equity),
            ("interest_expense", self.interest_expense),
            ("ebit", self.ebit),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.is_none().then_some(key))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitabilityReport {
    /// Net profit over revenue, in percent.
    pub profit_margin: f64,
    /// Net profit over total assets, in percent.
    pub roa: Option<f64>,
    /// Net profit excluding non-recurring items over revenue, in percent.
    pub adjusted_margin: Option<f64>,
    pub verdicts: Vec<String>,
}

impl fmt::Display for ProfitabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 Profitability analysis:")?;
        write_percent(f, "Profit margin", Some(self.profit_margin))?;
        write_percent(f, "Return on assets (ROA)", self.roa)?;
        write_percent(f, "Adjusted margin (excl. non-recurring items)", self.adjusted_margin)?;
        write_verdicts(f, &self.verdicts)
    }
}

pub fn analyze_profitability(inputs: &ProfitabilityInputs) -> Result<ProfitabilityReport> {
    let revenue = require_nonzero(inputs.revenue, "revenue")?;
    let net_income = require(inputs.net_income, "net_income")?;
    if inputs.total_assets == Some(0.0) {
        return Err(ReportError::InputError(
            "total_assets must not be zero".to_string(),
        ));
    }

    let profit_margin = net_income / revenue * 100.0;
    let roa = inputs.total_assets.map(|assets| net_income / assets * 100.0);
    let adjusted_margin = inputs
        .operating_income
        .map(|income| income / revenue * 100.0);

    let mut verdicts = vec![if profit_margin > 15.0 {
        "Profit margin is excellent; profitability is strong".to_string()
    } else if profit_margin > 5.0 {
        "Profit margin is at a reasonable level".to_string()
    } else {
        "Profit margin needs attention; review cost control".to_string()
    }];
    match roa {
        Some(roa) if roa > 10.0 => {
            verdicts.push("High asset efficiency; returns on assets are good".to_string())
        }
        Some(roa) if roa > 5.0 => verdicts.push("Moderate asset efficiency".to_string()),
        Some(_) => verdicts
            .push("Low asset efficiency; asset allocation could be improved".to_string()),
        None => verdicts.push(format!("ROA: {} (total assets unknown)", INSUFFICIENT)),
    }

    Ok(ProfitabilityReport {
        profit_margin,
        roa,
        adjusted_margin,
        verdicts,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityReport {
    pub current_ratio: f64,
    pub quick_ratio: f64,
    /// Set when inventory was unknown or zero and the current ratio stands in.
    pub quick_ratio_is_fallback: bool,
    pub cash_ratio: Option<f64>,
    pub verdicts: Vec<String>,
}

impl fmt::Display for LiquidityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "💰 Liquidity analysis:")?;
        write_ratio(f, "Current ratio", Some(self.current_ratio))?;
        if self.quick_ratio_is_fallback {
            writeln!(
                f,
                "- Quick ratio: {:.2} (inventory unknown, equals current ratio)",
                self.quick_ratio
            )?;
        } else {
            write_ratio(f, "Quick ratio", Some(self.quick_ratio))?;
        }
        write_ratio(f, "Cash ratio", self.cash_ratio)?;
        write_verdicts(f, &self.verdicts)
    }
}

pub fn analyze_liquidity(inputs: &LiquidityInputs) -> Result<LiquidityReport> {
    let current_liabilities = require_nonzero(inputs.current_liabilities, "current_liabilities")?;
    let current_assets = require(inputs.current_assets, "current_assets")?;

    let current_ratio = current_assets / current_liabilities;
    let (quick_ratio, quick_ratio_is_fallback) = match inputs.inventory {
        Some(inventory) if inventory != 0.0 => {
            ((current_assets - inventory) / current_liabilities, false)
        }
        _ => (current_ratio, true),
    };
    let cash_ratio = inputs
        .cash
        .filter(|cash| *cash != 0.0)
        .map(|cash| cash / current_liabilities);

    let mut verdicts = vec![if current_ratio >= 2.0 {
        "Current ratio is healthy; short-term solvency is strong".to_string()
    } else if current_ratio >= 1.0 {
        "Current ratio is adequate".to_string()
    } else {
        "Current ratio is low; short-term risk".to_string()
    }];
    verdicts.push(if quick_ratio >= 1.0 {
        "Quick ratio indicates strong liquidity".to_string()
    } else {
        "Quick ratio is low; watch inventory turnover".to_string()
    });

    Ok(LiquidityReport {
        current_ratio,
        quick_ratio,
        quick_ratio_is_fallback,
        cash_ratio,
        verdicts,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageReport {
    /// Total liabilities over total assets, in percent.
    pub debt_ratio: f64,
    /// Equity over total assets, in percent.
    pub equity_ratio: f64,
    pub debt_to_equity: f64,
    pub interest_coverage: Option<f64>,
    /// Set when total liabilities were derived as assets minus equity.
    pub liabilities_derived: bool,
    pub verdicts: Vec<String>,
}

impl fmt::Display for LeverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🏦 Leverage and capital structure:")?;
        write_percent(f, "Debt ratio", Some(self.debt_ratio))?;
        write_percent(f, "Equity ratio", Some(self.equity_ratio))?;
        write_ratio(f, "Debt to equity", Some(self.debt_to_equity))?;
        write_ratio(f, "Interest coverage", self.interest_coverage)?;
        if self.liabilities_derived {
            writeln!(f, "  (total liabilities derived as total assets minus equity)")?;
        }
        write_verdicts(f, &self.verdicts)
    }
}

pub fn analyze_leverage(inputs: &LeverageInputs) -> Result<LeverageReport> {
    let total_assets = require_nonzero(inputs.total_assets, "total_assets")?;
    let equity = require_nonzero(inputs.equity, "equity")?;

    let (total_liabilities, liabilities_derived) = match inputs.total_liabilities {
        Some(liabilities) => (liabilities, false),
        None => (total_assets - equity, true),
    };

    let debt_ratio = total_liabilities / total_assets * 100.0;
    let equity_ratio = equity / total_assets * 100.0;
    let debt_to_equity = total_liabilities / equity;
    let interest_coverage = match (inputs.ebit, inputs.interest_expense) {
        (Some(ebit), Some(interest)) if ebit > 0.0 && interest > 0.0 => Some(ebit / interest),
        _ => None,
    };

    let mut verdicts = vec![if debt_ratio < 40.0 {
        "Debt level is low; low financial risk".to_string()
    } else if debt_ratio < 60.0 {
        "Debt level is moderate; capital structure is reasonable".to_string()
    } else {
        "Debt level is high; elevated financial risk".to_string()
    }];
    if let Some(coverage) = interest_coverage {
        verdicts.push(if coverage > 5.0 {
            "Interest coverage is strong".to_string()
        } else if coverage > 2.0 {
            "Interest coverage is adequate".to_string()
        } else {
            "Interest coverage is strained".to_string()
        });
    }

    Ok(LeverageReport {
        debt_ratio,
        equity_ratio,
        debt_to_equity,
        interest_coverage,
        liabilities_derived,
        verdicts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn liquidity(ca: f64, cl: f64, cash: f64, inventory: f64) -> Result<LiquidityReport> {
        analyze_liquidity(&LiquidityInputs {
            current_assets: Some(ca),
            current_liabilities: Some(cl),
            cash: Some(cash),
            inventory: Some(inventory),
        })
    }

    #[test]
    fn test_liquidity_is_pure() {
        let first = liquidity(2000.0, 1000.0, 500.0, 300.0).unwrap();
        let second = liquidity(2000.0, 1000.0, 500.0, 300.0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());

        assert_eq!(first.current_ratio, 2.0);
        assert!((first.quick_ratio - 1.7).abs() < 1e-9);
        assert_eq!(first.cash_ratio, Some(0.5));
        assert!(first.verdicts[0].contains("healthy"));
        assert!(first.verdicts[1].contains("strong liquidity"));
    }

    #[test]
    fn test_liquidity_fallbacks() {
        let report = liquidity(900.0, 1000.0, 0.0, 0.0).unwrap();
        assert!(report.quick_ratio_is_fallback);
        assert_eq!(report.quick_ratio, report.current_ratio);
        assert_eq!(report.cash_ratio, None);
        assert!(report.to_string().contains("Cash ratio: insufficient data"));
        assert!(report.verdicts[0].contains("short-term risk"));

        assert!(matches!(
            liquidity(900.0, 0.0, 1.0, 1.0),
            Err(ReportError::InputError(_))
        ));
    }

    #[test]
    fn test_leverage_zero_assets_is_input_error() {
        for _ in 0..3 {
            let result = analyze_leverage(&LeverageInputs {
                total_assets: Some(0.0),
                total_liabilities: Some(100.0),
                equity: Some(50.0),
                interest_expense: Some(1.0),
                ebit: Some(10.0),
            });
            assert!(matches!(result, Err(ReportError::InputError(_))));
        }
    }

    #[test]
    fn test_leverage_derives_liabilities() {
        let report = analyze_leverage(&LeverageInputs {
            total_assets: Some(1000.0),
            equity: Some(700.0),
            ebit: Some(120.0),
            interest_expense: Some(20.0),
            ..Default::default()
        })
        .unwrap();
        assert!(report.liabilities_derived);
        assert!((report.debt_ratio - 30.0).abs() < 1e-9);
        assert!((report.equity_ratio - 70.0).abs() < 1e-9);
        assert_eq!(report.interest_coverage, Some(6.0));
        assert!(report.verdicts[0].contains("low financial risk"));
        assert!(report.verdicts[1].contains("strong"));
    }

    #[test]
    fn test_interest_coverage_needs_positive_inputs() {
        let report = analyze_leverage(&LeverageInputs {
            total_assets: Some(1000.0),
            total_liabilities: Some(650.0),
            equity: Some(350.0),
            ebit: Some(-5.0),
            interest_expense: Some(20.0),
        })
        .unwrap();
        assert_eq!(report.interest_coverage, None);
        assert_eq!(report.verdicts.len(), 1);
        assert!(report.verdicts[0].contains("elevated"));
    }

    #[test]
    fn test_profitability() {
        let report = analyze_profitability(&ProfitabilityInputs {
            revenue: Some(5_000_000.0),
            net_income: Some(800_000.0),
            total_assets: None,
            operating_income: Some(400_000.0),
        })
        .unwrap();
        assert!((report.profit_margin - 16.0).abs() < 1e-9);
        assert_eq!(report.roa, None);
        assert!((report.adjusted_margin.unwrap() - 8.0).abs() < 1e-9);

        let text = report.to_string();
        assert!(text.contains("Profit margin: 16.00%"));
        assert!(text.contains("ROA): insufficient data"));
        assert!(report.verdicts[0].contains("excellent"));
    }

    #[test]
    fn test_profitability_guards() {
        let zero_revenue = ProfitabilityInputs {
            revenue: Some(0.0),
            net_income: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            analyze_profitability(&zero_revenue),
            Err(ReportError::InputError(_))
        ));

        let zero_assets = ProfitabilityInputs {
            revenue: Some(10.0),
            net_income: Some(1.0),
            total_assets: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            analyze_profitability(&zero_assets),
            Err(ReportError::InputError(_))
        ));

        assert!(matches!(
            analyze_profitability(&ProfitabilityInputs::default()),
            Err(ReportError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_profit_margin_bands() {
        let cases = [
            (16.0, "excellent"),
            (15.0, "reasonable"),
            (6.0, "reasonable"),
            (5.0, "needs attention"),
            (-3.0, "needs attention"),
        ];
        for (net_income, expected) in cases {
            let report = analyze_profitability(&ProfitabilityInputs {
                revenue: Some(100.0),
                net_income: Some(net_income),
                ..Default::default()
            })
            .unwrap();
            assert!(
                report.verdicts[0].contains(expected),
                "margin {} gave {:?}",
                report.profit_margin,
                report.verdicts
            );
        }
    }

    #[test]
    fn test_roa_bands() {
        let cases = [
            (11.0, "High asset efficiency"),
            (10.0, "Moderate asset efficiency"),
            (6.0, "Moderate asset efficiency"),
            (5.0, "Low asset efficiency"),
        ];
        for (net_income, expected) in cases {
            let report = analyze_profitability(&ProfitabilityInputs {
                revenue: Some(1000.0),
                net_income: Some(net_income),
                total_assets: Some(100.0),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(report.roa, Some(net_income));
            assert!(
                report.verdicts[1].contains(expected),
                "roa {:?} gave {:?}",
                report.roa,
                report.verdicts
            );
        }
    }

    #[test]
    fn test_current_and_quick_ratio_bands() {
        let cases = [
            (2000.0, 1000.0, "healthy", "strong liquidity"),
            (1999.0, 1.0, "adequate", "strong liquidity"),
            (1000.0, 1.0, "adequate", "watch inventory turnover"),
            (999.0, 0.0, "short-term risk", "watch inventory turnover"),
        ];
        for (current_assets, inventory, current, quick) in cases {
            let report = liquidity(current_assets, 1000.0, 100.0, inventory).unwrap();
            assert!(
                report.verdicts[0].contains(current),
                "current ratio {} gave {:?}",
                report.current_ratio,
                report.verdicts
            );
            assert!(
                report.verdicts[1].contains(quick),
                "quick ratio {} gave {:?}",
                report.quick_ratio,
                report.verdicts
            );
        }
        assert_eq!(liquidity(2000.0, 1000.0, 100.0, 1000.0).unwrap().quick_ratio, 1.0);
    }

    #[test]
    fn test_debt_ratio_bands() {
        let cases = [
            (39.0, "low financial risk"),
            (40.0, "moderate"),
            (59.0, "moderate"),
            (60.0, "elevated"),
        ];
        for (total_liabilities, expected) in cases {
            let report = analyze_leverage(&LeverageInputs {
                total_assets: Some(100.0),
                total_liabilities: Some(total_liabilities),
                equity: Some(100.0 - total_liabilities),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(report.debt_ratio, total_liabilities);
            assert!(
                report.verdicts[0].contains(expected),
                "debt ratio {} gave {:?}",
                report.debt_ratio,
                report.verdicts
            );
        }
    }

    #[test]
    fn test_interest_coverage_bands() {
        let cases = [
            (6.0, "strong"),
            (5.0, "adequate"),
            (3.0, "adequate"),
            (2.0, "strained"),
            (0.5, "strained"),
        ];
        for (ebit, expected) in cases {
            let report = analyze_leverage(&LeverageInputs {
                total_assets: Some(100.0),
                total_liabilities: Some(50.0),
                equity: Some(50.0),
                ebit: Some(ebit),
                interest_expense: Some(1.0),
            })
            .unwrap();
            assert_eq!(report.interest_coverage, Some(ebit));
            assert!(
                report.verdicts[1].contains(expected),
                "coverage {} gave {:?}",
                ebit,
                report.verdicts
            );
        }
    }

    #[test]
    fn test_overlay_prefers_explicit_values() {
        let mut metrics = MetricMap::new();
        metrics.insert("revenue".to_string(), 100.0);
        metrics.insert("net_income".to_string(), 10.0);

        let inputs = ProfitabilityInputs::from_metrics(&metrics).overlay(ProfitabilityInputs {
            net_income: Some(20.0),
            ..Default::default()
        });
        assert_eq!(inputs.revenue, Some(100.0));
        assert_eq!(inputs.net_income, Some(20.0));
        assert_eq!(inputs.missing(), vec!["total_assets", "operating_income"]);
    }
}
