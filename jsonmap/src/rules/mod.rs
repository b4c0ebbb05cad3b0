//! Mapping rules
//!
//! A rule set is the ordered list of field mappings a routine is compiled from.
//! Rules usually come from a spreadsheet (see [`crate::sheet`]) but can also be
//! written as JSON.

use serde::{Deserialize, Serialize};

/// One row of a mapping sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Target path, e.g. `customer.name` or `lines.^item.sku`
    pub target: String,

    /// Source expression: a literal, a `.path`, or a `$CALL(...)`
    pub source: String,

    /// JSON array literal indexed by `$ENUM(...)` in `source`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<String>,

    /// Literal used when the source resolves to null or nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Rule {
    pub fn new(target: &str, source: &str) -> Self {
        Self {
            target: target.to_string(),
            source: source.to_string(),
            enumeration: None,
            default: None,
        }
    }

    pub fn with_enumeration(mut self, enumeration: &str) -> Self {
        self.enumeration = Some(enumeration.to_string());
        self
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

/// An ordered rule list with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Version of the rule set format
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Rules in evaluation order
    pub rules: Vec<Rule>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            version: default_version(),
            description: String::new(),
            rules,
        }
    }

    /// Parse a rule set from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Example rule set for documentation and `example-rules`
pub fn example_rules() -> RuleSet {
    RuleSet {
        version: default_version(),
        description: "Example mapping from an order export to an invoice".to_string(),
        rules: vec![
            Rule::new("invoice.number", ".orderId"),
            Rule::new("invoice.customer.name", "$JOIN(.customer.first, \" \", .customer.last)"),
            Rule::new("invoice.customer.tier", "$ENUM(.customer.level)")
                .with_enumeration(r#"["bronze","silver","gold"]"#),
            Rule::new("invoice.currency", ".currency").with_default("\"EUR\""),
            Rule::new("invoice.listTotal", "$ADD(.lines.^item.price)"),
            Rule::new("invoice.lines.^item.sku", ".lines.^item.sku"),
            Rule::new("invoice.lines.^item.amount", "$MULTIPLY(.lines.^item.price, .lines.^item.qty)"),
            Rule::new("invoice.tags.^item", ".labels.^item"),
        ],
    }
}
