//! Parameters forwarded to the booking step.
//!
//! The forwarded set starts from the incoming URL parameters, is overridden
//! key by key by the respondent's answers, and finally carries the matched
//! host ids under a reserved key when attribute routing ran.

use std::collections::BTreeSet;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::catalog::{option_label, Field, FieldCatalog, FieldType};
use crate::config::EngineConfig;
use crate::hosts::HostId;
use crate::response::{FieldValue, NormalizedResponse};

// ── Ordered multi-map ─────────────────────────────────────────

/// Ordered multi-map of parameter name to values. Keys keep their first
/// insertion position; repeated keys accumulate values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardParams {
    entries: Vec<(String, Vec<String>)>,
}

impl ForwardParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query. A leading `?` is ignored.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.append(key.into_owned(), value.into_owned());
        }
        params
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.position(key).map(|i| self.entries[i].1.as_slice())
    }

    /// First value of `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Add a value, keeping any values `key` already has.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1.push(value.into()),
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    /// Replace every value of `key`. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((key, values)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Flattened `(key, value)` pairs in order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ForwardParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.append(k, v);
        }
        params
    }
}

impl Serialize for ForwardParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ── Forwarding ────────────────────────────────────────────────

/// Display values of a normalized answer: option labels for choice
/// fields, stringified numbers, raw text otherwise.
pub fn display_values(field: &Field, value: &FieldValue) -> Vec<String> {
    let raw = value.to_strings();
    match field.field_type {
        FieldType::Select | FieldType::Multiselect => {
            let labels = raw
                .iter()
                .map(|id| option_label(&field.options, id).unwrap_or(id).to_string());
            if field.field_type == FieldType::Select {
                labels.take(1).collect()
            } else {
                labels.collect()
            }
        }
        _ => raw,
    }
}

/// Build the parameter set handed to the booking step.
///
/// `matched_host_ids` is `None` when attribute routing did not run; an
/// empty set still produces the reserved key, with an empty value.
pub fn build_forward_parameters(
    response: &NormalizedResponse,
    fields: &FieldCatalog,
    incoming: &ForwardParams,
    matched_host_ids: Option<&BTreeSet<HostId>>,
    config: &EngineConfig,
) -> ForwardParams {
    let mut params: ForwardParams = incoming
        .pairs()
        .filter(|(k, _)| !config.is_control_param(k))
        .collect();

    for field in fields.iter() {
        let Some(value) = response.get(&field.id) else {
            continue;
        };
        let key = field.external_name();
        if key == config.routed_hosts_param {
            tracing::warn!(field_id = %field.id, "Field name collides with the routed hosts parameter, not forwarded");
            continue;
        }
        params.set(key, display_values(field, value));
    }

    if let Some(ids) = matched_host_ids {
        let joined = ids
            .iter()
            .map(HostId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        params.set(config.routed_hosts_param.as_str(), vec![joined]);
    }

    params
}

// ── Event slug variables ──────────────────────────────────────

/// Replace `{identifier}` placeholders in an event destination.
///
/// Identifiers match field external names case-insensitively. The value is
/// the answer's display value, lowercased, with whitespace runs collapsed to
/// `-`; multiselect values are joined with `,`. A known field without an
/// answer becomes empty; unknown placeholders are left untouched.
pub fn substitute_variables(
    destination: &str,
    response: &NormalizedResponse,
    fields: &FieldCatalog,
) -> String {
    let mut out = String::with_capacity(destination.len());
    let mut rest = destination;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| open + c) else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = rest[open + 1..close].to_lowercase();
        match fields
            .iter()
            .find(|f| f.external_name().to_lowercase() == name)
        {
            Some(field) => {
                let value = response
                    .get(&field.id)
                    .map(|v| display_values(field, v).join(","))
                    .unwrap_or_default();
                out.push_str(&slugify(&value));
            }
            None => out.push_str(&rest[open..=close]),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn slugify(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}
