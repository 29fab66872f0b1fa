use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

/// A document attribute value as seen by the rule evaluator. Free-form
/// metadata and the typed fields of a document both surface as this union.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Numeric coercion for ordered comparisons. Returns `None` when the
    /// value has no sensible numeric reading, which the evaluator treats
    /// as a non-match rather than an error.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<f64>().ok(),
            Self::Bool(_) | Self::List(_) => None,
        }
    }

    /// String coercion used by the `contains` operator.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(value) => Some(value.clone()),
            Self::Number(value) => Some(value.to_string()),
            Self::Bool(value) => Some(value.to_string()),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(flag) => Self::Bool(flag),
            serde_json::Value::Number(number) => {
                Self::Number(number.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(text) => Self::Text(text),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Null => Self::Text(String::new()),
            serde_json::Value::Object(map) => Self::Text(
                serde_json::to_string(&map).unwrap_or_default(),
            ),
        }
    }
}

/// The declared document fields routing conditions may name directly.
/// Anything else falls back to the free-form metadata map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnownField {
    DocType,
    Title,
    Value,
    Department,
    Confidentiality,
}

impl KnownField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "type" => Some(Self::DocType),
            "title" => Some(Self::Title),
            "value" => Some(Self::Value),
            "department" => Some(Self::Department),
            "confidentiality" => Some(Self::Confidentiality),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub title: String,
    pub value: f64,
    pub department: String,
    pub confidentiality: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Resolve a condition field name: known fields read from the typed
    /// record, anything else from metadata. `None` means "undefined".
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match KnownField::from_name(name) {
            Some(KnownField::DocType) => Some(FieldValue::Text(self.doc_type.clone())),
            Some(KnownField::Title) => Some(FieldValue::Text(self.title.clone())),
            Some(KnownField::Value) => Some(FieldValue::Number(self.value)),
            Some(KnownField::Department) => Some(FieldValue::Text(self.department.clone())),
            Some(KnownField::Confidentiality) => {
                Some(FieldValue::Text(self.confidentiality.clone()))
            }
            None => self.metadata.get(name.trim()).cloned(),
        }
    }
}
