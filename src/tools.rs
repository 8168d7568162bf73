use crate::error::{ReportError, Result};
use crate::metrics::{metric_catalog, metric_keys, ALL_METRICS};
use crate::ratios::{LeverageInputs, LiquidityInputs, ProfitabilityInputs};
use crate::session::{Session, Topic};
use log::{debug, warn};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoadDocumentArgs {
    #[schemars(description = "Filesystem path of the filing (PDF or plain text).")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractMetricArgs {
    #[schemars(
        description = "Metric key such as revenue, net_income, total_assets, total_liabilities, equity, current_assets, current_liabilities, cash, operating_income, inventory, interest_expense or ebit; or 'all'."
    )]
    pub metric: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeArgs<T: Default + Serialize> {
    #[schemars(description = "Figures supplied by the caller. Omitted figures are unknown.")]
    #[serde(default)]
    pub inputs: T,
    #[schemars(
        description = "Resolve unknown figures from the loaded document before computing. Explicit inputs always take precedence."
    )]
    #[serde(default)]
    pub auto_extract: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchTopicArgs {
    pub topic: Topic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchArgs {
    #[schemars(description = "What to look for, e.g. 营业收入, 资产负债表, 现金流.")]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractTableArgs {
    #[schemars(description = "1-based page number.")]
    pub page: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    LoadDocument(LoadDocumentArgs),
    ExtractMetric(ExtractMetricArgs),
    AnalyzeProfitability(AnalyzeArgs<ProfitabilityInputs>),
    AnalyzeLiquidity(AnalyzeArgs<LiquidityInputs>),
    AnalyzeLeverage(AnalyzeArgs<LeverageInputs>),
    SearchTopic(SearchTopicArgs),
    SearchFinancialInfo(SearchArgs),
    ExtractTable(ExtractTableArgs),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::LoadDocument(_) => "load_document",
            ToolCall::ExtractMetric(_) => "extract_metric",
            ToolCall::AnalyzeProfitability(_) => "analyze_profitability",
            ToolCall::AnalyzeLiquidity(_) => "analyze_liquidity",
            ToolCall::AnalyzeLeverage(_) => "analyze_leverage",
            ToolCall::SearchTopic(_) => "search_topic",
            ToolCall::SearchFinancialInfo(_) => "search_financial_info",
            ToolCall::ExtractTable(_) => "extract_table",
        }
    }
}

/// Name, description and JSON Schema of one tool, for registration with an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Parameter schema with every subschema inlined and no `$schema` marker,
/// which is the shape function-calling APIs accept.
fn parameters_schema<T: JsonSchema>() -> serde_json::Value {
    let generator = SchemaSettings::draft07()
        .with(|settings| {
            settings.inline_subschemas = true;
            settings.meta_schema = None;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    serde_json::to_value(root).unwrap_or(serde_json::Value::Null)
}

fn definition<T: JsonSchema>(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: parameters_schema::<T>(),
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        definition::<LoadDocumentArgs>(
            "load_document",
            "Load a financial report, split it into sections and build the semantic index. Replaces any previously loaded document.",
        ),
        definition::<ExtractMetricArgs>(
            "extract_metric",
            &format!(
                "Extract a named financial figure from the loaded report, or every supported figure with 'all'. Returns source passages when no figure can be parsed. Supported metrics: {}.",
                metric_catalog()
            ),
        ),
        definition::<AnalyzeArgs<ProfitabilityInputs>>(
            "analyze_profitability",
            "Compute profit margin, return on assets and the margin excluding non-recurring items, with an assessment.",
        ),
        definition::<AnalyzeArgs<LiquidityInputs>>(
            "analyze_liquidity",
            "Compute current, quick and cash ratios, with an assessment.",
        ),
        definition::<AnalyzeArgs<LeverageInputs>>(
            "analyze_leverage",
            "Compute debt ratio, equity ratio, debt to equity and interest coverage, with an assessment.",
        ),
        definition::<SearchTopicArgs>(
            "search_topic",
            "Retrieve narrative passages about a topic of the report.",
        ),
        definition::<SearchArgs>(
            "search_financial_info",
            "Search the loaded report for passages about a financial term, broadened with synonyms.",
        ),
        definition::<ExtractTableArgs>(
            "extract_table",
            "List the table-like rows (label followed by figures) on one page.",
        ),
    ]
}

/// Renders an error the way every tool reports failure.
pub fn failure_report(error: &ReportError) -> String {
    format!("❌ {}\n💡 {}", error, error.remediation())
}

/// Tool calls arrive as `{"tool": "...", "arguments": {...}}` and always
/// produce a text report, failures included.
impl Session {
    /// Runs one tool call; never fails, errors are rendered into the report.
    pub fn dispatch(&mut self, call: ToolCall) -> String {
        let name = call.name();
        debug!("Dispatching tool '{}'", name);
        match self.run_tool(call) {
            Ok(report) => report,
            Err(e) => {
                warn!("Tool '{}' failed: {}", name, e);
                failure_report(&e)
            }
        }
    }

    /// Parses a JSON tool call and runs it.
    pub fn dispatch_json(&mut self, json: &str) -> String {
        match serde_json::from_str::<ToolCall>(json) {
            Ok(call) => self.dispatch(call),
            Err(e) => {
                warn!("Malformed tool call: {}", e);
                failure_report(&ReportError::from(e))
            }
        }
    }

    fn run_tool(&mut self, call: ToolCall) -> Result<String> {
        let report = match call {
            ToolCall::LoadDocument(args) => self.load_document(&args.path)?.to_string(),
            ToolCall::ExtractMetric(args) => {
                let key = args.metric.trim();
                if key != ALL_METRICS && !metric_keys().contains(&key) {
                    return Err(ReportError::UnknownMetric(key.to_string()));
                }
                self.extract_metric(key)?.to_string()
            }
            ToolCall::AnalyzeProfitability(args) => self
                .analyze_profitability(args.inputs, args.auto_extract)?
                .to_string(),
            ToolCall::AnalyzeLiquidity(args) => self
                .analyze_liquidity(args.inputs, args.auto_extract)?
                .to_string(),
            ToolCall::AnalyzeLeverage(args) => self
                .analyze_leverage(args.inputs, args.auto_extract)?
                .to_string(),
            ToolCall::SearchTopic(args) => self.search_topic(args.topic)?.to_string(),
            ToolCall::SearchFinancialInfo(args) => {
                self.search_financial_info(&args.query)?.to_string()
            }
            ToolCall::ExtractTable(args) => self.extract_table(args.page)?.to_string(),
        };
        Ok(report)
    }
}
