//! Condition trees.
//!
//! A tree of `AND`/`OR`/`NOT` groups over leaf comparisons. The same
//! structure carries both form-field rules and host-attribute rules; only
//! the catalog used to interpret leaf ids differs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::response::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    And,
    Or,
    /// Negates the conjunction of its children. Authored with a single child.
    Not,
}

/// Comparison operators for rule leaves
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Between,
    NotBetween,
    SelectAnyIn,
    SelectNotAnyIn,
    MultiselectSomeIn,
    MultiselectNotSomeIn,
    MultiselectEquals,
    MultiselectNotEquals,
}

impl Operator {
    /// Operators that coerce both sides to numbers.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Greater
                | Self::GreaterOrEqual
                | Self::Less
                | Self::LessOrEqual
                | Self::Between
                | Self::NotBetween
        )
    }

    pub fn takes_comparand(self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }

    /// For a negated operator, the operator it negates.
    pub fn negation_of(self) -> Option<Operator> {
        match self {
            Self::NotEquals => Some(Self::Equals),
            Self::NotContains => Some(Self::Contains),
            Self::IsNotEmpty => Some(Self::IsEmpty),
            Self::NotBetween => Some(Self::Between),
            Self::SelectNotAnyIn => Some(Self::SelectAnyIn),
            Self::MultiselectNotSomeIn => Some(Self::MultiselectSomeIn),
            Self::MultiselectNotEquals => Some(Self::MultiselectEquals),
            _ => None,
        }
    }
}

/// Structured condition tree. The root of a stored tree is always a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Group {
        combinator: Combinator,
        #[serde(default)]
        children: Vec<Condition>,
    },
    Rule {
        /// Field id or attribute id, depending on the tree.
        field: String,
        operator: Operator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<FieldValue>,
    },
}

impl Default for Condition {
    fn default() -> Self {
        Self::match_all()
    }
}

impl Condition {
    /// Empty `AND` group: matches everything.
    pub fn match_all() -> Self {
        Self::all(Vec::new())
    }

    pub fn all(children: Vec<Condition>) -> Self {
        Self::Group {
            combinator: Combinator::And,
            children,
        }
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Self::Group {
            combinator: Combinator::Or,
            children,
        }
    }

    pub fn not(child: Condition) -> Self {
        Self::Group {
            combinator: Combinator::Not,
            children: vec![child],
        }
    }

    pub fn rule(field: impl Into<String>, operator: Operator, value: FieldValue) -> Self {
        Self::Rule {
            field: field.into(),
            operator,
            value: Some(value),
        }
    }

    pub fn unary(field: impl Into<String>, operator: Operator) -> Self {
        Self::Rule {
            field: field.into(),
            operator,
            value: None,
        }
    }

    /// Wrap a bare rule into an `AND` group so the root is always a group.
    pub fn into_root(self) -> Self {
        match self {
            group @ Self::Group { .. } => group,
            rule @ Self::Rule { .. } => Self::all(vec![rule]),
        }
    }

    /// True if any rule leaf exists anywhere in the tree.
    pub fn has_rules(&self) -> bool {
        match self {
            Self::Group { children, .. } => children.iter().any(Condition::has_rules),
            Self::Rule { .. } => true,
        }
    }

    /// Ids referenced by rule leaves.
    pub fn referenced_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        collect_ids(self, &mut ids);
        ids
    }
}

fn collect_ids(condition: &Condition, ids: &mut BTreeSet<String>) {
    match condition {
        Condition::Group { children, .. } => {
            for c in children {
                collect_ids(c, ids);
            }
        }
        Condition::Rule { field, .. } => {
            ids.insert(field.clone());
        }
    }
}
