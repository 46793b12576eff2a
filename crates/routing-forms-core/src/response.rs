//! Submitted values and their normalization against a field catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::{resolve_option_id, FieldCatalog, FieldType};

// ── Values ────────────────────────────────────────────────────

/// A submitted value, a host attribute value, or a rule comparand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    #[serde(deserialize_with = "deserialize_list")]
    List(Vec<String>),
    /// An explicit `null` answer or attribute.
    Null,
}

/// List items may be authored as numbers, e.g. `between` bounds.
fn deserialize_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Item {
        Number(f64),
        Text(String),
    }

    let items = Vec::<Item>::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .map(|item| match item {
            Item::Number(n) => format_number(n),
            Item::Text(s) => s,
        })
        .collect())
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Null, empty string and empty list are empty. Numbers never are.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Number(_) => false,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Null => true,
        }
    }

    /// Numeric view, coercing numeric strings. Lists never coerce.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n).filter(|n| n.is_finite()),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::List(_) | Self::Null => None,
        }
    }

    /// Every value as a string; a scalar yields one item, null none.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Self::Number(n) => vec![format_number(*n)],
            Self::Text(s) => vec![s.clone()],
            Self::List(items) => items.clone(),
            Self::Null => Vec::new(),
        }
    }
}

/// Render a number the way a respondent typed it: no trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ── Response entries ──────────────────────────────────────────

/// One submitted answer, keyed by field id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEntry {
    pub field_id: String,
    pub value: FieldValue,
}

impl ResponseEntry {
    pub fn new(field_id: impl Into<String>, value: FieldValue) -> Self {
        Self {
            field_id: field_id.into(),
            value,
        }
    }
}

/// Response values typed consistently with the field catalog.
///
/// Select values hold option ids, multiselect values are lists of option
/// ids, number fields hold numbers when the input was numeric. Entries for
/// fields missing from the catalog are kept untouched so that routers
/// contributed by other forms can still read them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedResponse {
    values: BTreeMap<String, FieldValue>,
}

impl NormalizedResponse {
    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.values.get(field_id)
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Normalize raw entries against `fields`. Later entries for the same field win.
pub fn normalize_response<'a, I>(entries: I, fields: &FieldCatalog) -> NormalizedResponse
where
    I: IntoIterator<Item = &'a ResponseEntry>,
{
    let mut values = BTreeMap::new();
    for entry in entries {
        let value = match fields.get(&entry.field_id) {
            Some(field) => normalize_value(field.field_type, &field.options, &entry.value),
            None => {
                tracing::debug!(field_id = %entry.field_id, "Response entry for field outside catalog");
                entry.value.clone()
            }
        };
        values.insert(entry.field_id.clone(), value);
    }
    NormalizedResponse { values }
}

fn normalize_value(
    field_type: FieldType,
    options: &[crate::catalog::ChoiceOption],
    value: &FieldValue,
) -> FieldValue {
    match field_type {
        FieldType::Number => match value {
            FieldValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(FieldValue::Number)
                .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        FieldType::Select => match value.to_strings().first() {
            Some(raw) => FieldValue::Text(resolve_option_id(options, raw).to_string()),
            None => FieldValue::Text(String::new()),
        },
        FieldType::Multiselect => FieldValue::List(
            value
                .to_strings()
                .iter()
                .map(|raw| resolve_option_id(options, raw).to_string())
                .collect(),
        ),
        FieldType::Text | FieldType::Textarea | FieldType::Email | FieldType::Phone => {
            match value {
                FieldValue::Number(n) => FieldValue::Text(format_number(*n)),
                _ => value.clone(),
            }
        }
    }
}
