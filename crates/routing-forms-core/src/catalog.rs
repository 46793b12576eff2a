//! Field and attribute catalogs.
//!
//! Both catalogs answer the same question for the evaluator: given the id a
//! rule references, what kind of value lives there and which options does it
//! have. That shared view is the [`Catalog`] trait.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Options ───────────────────────────────────────────────────

/// One choice of a select-like field or attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub label: String,
}

/// Resolve a raw value to an option id.
///
/// An exact id match wins, then a case-insensitive label match. Anything else
/// is returned unchanged so stale or free-form values still compare.
pub fn resolve_option_id<'a>(options: &'a [ChoiceOption], raw: &'a str) -> &'a str {
    if let Some(opt) = options.iter().find(|o| o.id == raw) {
        return &opt.id;
    }
    let wanted = raw.to_lowercase();
    options
        .iter()
        .find(|o| o.label.to_lowercase() == wanted)
        .map(|o| o.id.as_str())
        .unwrap_or(raw)
}

/// Display label for an option id, if the id is known.
pub fn option_label<'a>(options: &'a [ChoiceOption], id: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|o| o.id == id)
        .map(|o| o.label.as_str())
}

// ── Shared view ───────────────────────────────────────────────

/// How the evaluator interprets values of a field or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Number,
    Select,
    MultiSelect,
}

impl ValueKind {
    pub fn is_choice(self) -> bool {
        matches!(self, Self::Select | Self::MultiSelect)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Descriptor<'a> {
    pub kind: ValueKind,
    pub options: &'a [ChoiceOption],
}

/// Lookup used by the condition evaluator.
pub trait Catalog {
    fn describe(&self, id: &str) -> Option<Descriptor<'_>>;
}

// ── Form fields ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Email,
    Phone,
    Select,
    Multiselect,
}

impl FieldType {
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Number => ValueKind::Number,
            Self::Select => ValueKind::Select,
            Self::Multiselect => ValueKind::MultiSelect,
            Self::Text | Self::Textarea | Self::Email | Self::Phone => ValueKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    /// Stable external name. Falls back to `label` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
}

impl Field {
    pub fn new(id: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            identifier: None,
            label: label.into(),
            field_type,
            options: Vec::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(id, label)| ChoiceOption {
                id: (*id).to_string(),
                label: (*label).to_string(),
            })
            .collect();
        self
    }

    /// Name used for forwarded parameters and slug variables.
    pub fn external_name(&self) -> &str {
        self.identifier
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.label)
    }
}

/// Ordered field list of one form version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Field>", into = "Vec<Field>")]
pub struct FieldCatalog {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl From<Vec<Field>> for FieldCatalog {
    fn from(fields: Vec<Field>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();
        Self { fields, index }
    }
}

impl From<FieldCatalog> for Vec<Field> {
    fn from(catalog: FieldCatalog) -> Self {
        catalog.fields
    }
}

impl FieldCatalog {
    pub fn new(fields: Vec<Field>) -> Self {
        fields.into()
    }

    pub fn get(&self, id: &str) -> Option<&Field> {
        self.index.get(id).map(|&i| &self.fields[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Catalog with the fields of `other` appended, skipping ids already present.
    pub fn merged_with(&self, other: &FieldCatalog) -> FieldCatalog {
        let mut fields = self.fields.clone();
        fields.extend(
            other
                .iter()
                .filter(|f| !self.index.contains_key(&f.id))
                .cloned(),
        );
        fields.into()
    }
}

impl Catalog for FieldCatalog {
    fn describe(&self, id: &str) -> Option<Descriptor<'_>> {
        self.get(id).map(|f| Descriptor {
            kind: f.field_type.value_kind(),
            options: &f.options,
        })
    }
}

// ── Host attributes ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Text,
    Number,
    SingleSelect,
    MultiSelect,
}

impl AttributeType {
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Text => ValueKind::Text,
            Self::Number => ValueKind::Number,
            Self::SingleSelect => ValueKind::Select,
            Self::MultiSelect => ValueKind::MultiSelect,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
}

/// Team-scoped host attribute list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Attribute>", into = "Vec<Attribute>")]
pub struct AttributeCatalog {
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
}

impl From<Vec<Attribute>> for AttributeCatalog {
    fn from(attributes: Vec<Attribute>) -> Self {
        let index = attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
        Self { attributes, index }
    }
}

impl From<AttributeCatalog> for Vec<Attribute> {
    fn from(catalog: AttributeCatalog) -> Self {
        catalog.attributes
    }
}

impl AttributeCatalog {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        attributes.into()
    }

    pub fn get(&self, id: &str) -> Option<&Attribute> {
        self.index.get(id).map(|&i| &self.attributes[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }
}

impl Catalog for AttributeCatalog {
    fn describe(&self, id: &str) -> Option<Descriptor<'_>> {
        self.get(id).map(|a| Descriptor {
            kind: a.attribute_type.value_kind(),
            options: &a.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_field() -> Field {
        Field::new("f-region", "Region", FieldType::Select)
            .with_options(&[("opt-emea", "EMEA"), ("opt-apac", "APAC")])
    }

    #[test]
    fn test_resolve_option_prefers_id() {
        let field = region_field();
        assert_eq!(resolve_option_id(&field.options, "opt-emea"), "opt-emea");
    }

    #[test]
    fn test_resolve_option_by_label_is_case_insensitive() {
        let field = region_field();
        assert_eq!(resolve_option_id(&field.options, "apac"), "opt-apac");
    }

    #[test]
    fn test_resolve_option_by_label_folds_non_ascii_case() {
        let field = Field::new("f-team", "Team", FieldType::Select)
            .with_options(&[("opt-doctors", "Ärzte"), ("opt-nurses", "Pflege")]);
        assert_eq!(resolve_option_id(&field.options, "ärzte"), "opt-doctors");
        assert_eq!(resolve_option_id(&field.options, "ÄRZTE"), "opt-doctors");
    }

    #[test]
    fn test_resolve_option_unknown_is_kept() {
        let field = region_field();
        assert_eq!(resolve_option_id(&field.options, "LATAM"), "LATAM");
    }

    #[test]
    fn test_external_name_falls_back_to_label() {
        let plain = Field::new("f1", "Company size", FieldType::Number);
        assert_eq!(plain.external_name(), "Company size");

        let named = plain.clone().with_identifier("size");
        assert_eq!(named.external_name(), "size");

        let blank = plain.with_identifier("");
        assert_eq!(blank.external_name(), "Company size");
    }

    #[test]
    fn test_field_catalog_describe() {
        let catalog = FieldCatalog::new(vec![
            region_field(),
            Field::new("f-budget", "Budget", FieldType::Number),
        ]);
        let d = catalog.describe("f-region").unwrap();
        assert_eq!(d.kind, ValueKind::Select);
        assert_eq!(d.options.len(), 2);
        assert_eq!(catalog.describe("f-budget").unwrap().kind, ValueKind::Number);
        assert!(catalog.describe("f-gone").is_none());
    }

    #[test]
    fn test_field_catalog_deserializes_from_list() {
        let json = serde_json::json!([
            {"id": "f1", "label": "Email", "type": "email"},
            {"id": "f2", "label": "Topics", "type": "multiselect",
             "options": [{"id": "o1", "label": "Billing"}]}
        ]);
        let catalog: FieldCatalog = serde_json::from_value(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.get("f2").unwrap().field_type,
            FieldType::Multiselect
        );
    }

    #[test]
    fn test_merged_with_skips_existing_ids() {
        let a = FieldCatalog::new(vec![region_field()]);
        let b = FieldCatalog::new(vec![
            Field::new("f-region", "Other", FieldType::Text),
            Field::new("f-extra", "Extra", FieldType::Text),
        ]);
        let merged = a.merged_with(&b);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("f-region").unwrap().label, "Region");
    }

    #[test]
    fn test_attribute_catalog_kinds() {
        let catalog: AttributeCatalog = serde_json::from_value(serde_json::json!([
            {"id": "seniority", "name": "Seniority", "type": "single_select",
             "options": [{"id": "s1", "label": "senior"}]},
            {"id": "languages", "name": "Languages", "type": "multi_select"}
        ]))
        .unwrap();
        assert_eq!(catalog.describe("seniority").unwrap().kind, ValueKind::Select);
        assert_eq!(
            catalog.describe("languages").unwrap().kind,
            ValueKind::MultiSelect
        );
    }
}
