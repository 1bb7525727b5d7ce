use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What the user wants done with the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Find matching property records.
    Search,
    /// Compute a statistic, trend or chart.
    Analysis,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Search => "search",
            Self::Analysis => "analysis",
        })
    }
}

/// One extracted parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// JSON `null`
    Null,
    /// JSON boolean
    Bool(bool),
    /// Integral JSON number
    Integer(i64),
    /// Fractional JSON number
    Float(f64),
    /// JSON string
    Text(String),
    /// JSON array
    List(Vec<ParamValue>),
    /// JSON object
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Integer view, accepting integral floats and numeric strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
            Self::List(_) | Self::Map(_) => {
                let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&rendered)
            }
        }
    }
}

/// Named parameters extracted from a query, ordered by name.
pub type Parameters = BTreeMap<String, ParamValue>;

/// Structured reading of a natural-language query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryInterpretation {
    /// Routing decision
    pub intent: Intent,
    /// Extracted filters and options
    pub parameters: Parameters,
}

impl QueryInterpretation {
    /// Creates an interpretation.
    pub fn new(intent: Intent, parameters: Parameters) -> Self {
        Self { intent, parameters }
    }

    /// `key:value` pairs joined with spaces, in key order.
    pub fn parameter_terms(&self) -> String {
        self.parameters
            .iter()
            .map(|(key, value)| format!("{key}:{value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
