//! Condition evaluation: pure Rust, no I/O.
//!
//! Evaluates condition trees against an evaluation context. Same evaluator
//! used for:
//! 1. Route query trees over a normalized form response
//! 2. Attribute query trees over a host's attribute values
//! 3. Authoring-time validation (referenced ids exist, operators fit types)
//!
//! A rule whose field is missing from the catalog is skipped: its group
//! combines only the children that were not skipped, so a stale rule never
//! decides a group on its own, `NOT` included. Rules missing a required
//! comparand are incomplete authoring state and are skipped the same way.
//! A non-empty group whose children were all skipped is skipped too, and a
//! skipped root matches.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::catalog::{resolve_option_id, Catalog, Descriptor, ValueKind};
use crate::condition::{Combinator, Condition, Operator};
use crate::response::FieldValue;

// ============================================================================
// Evaluation Context
// ============================================================================

/// Values to evaluate against, and the catalog that types them.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    catalog: &'a dyn Catalog,
    values: &'a BTreeMap<String, FieldValue>,
    case_sensitive: bool,
}

impl<'a> EvalContext<'a> {
    pub fn new(catalog: &'a dyn Catalog, values: &'a BTreeMap<String, FieldValue>) -> Self {
        Self {
            catalog,
            values,
            case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}

// ============================================================================
// Condition Evaluation: recursive tree walk
// ============================================================================

/// Evaluate a condition tree against an evaluation context.
/// Returns true if the condition matches.
pub fn evaluate_condition(condition: &Condition, ctx: &EvalContext<'_>) -> bool {
    evaluate_node(condition, ctx).unwrap_or(true)
}

/// `None` when the node is skipped.
fn evaluate_node(condition: &Condition, ctx: &EvalContext<'_>) -> Option<bool> {
    match condition {
        Condition::Group {
            combinator,
            children,
        } if children.is_empty() => Some(empty_group(*combinator)),
        Condition::Group {
            combinator,
            children,
        } => combine(
            *combinator,
            children.iter().filter_map(|c| evaluate_node(c, ctx)),
        ),
        Condition::Rule {
            field,
            operator,
            value,
        } => evaluate_rule(field, *operator, value.as_ref(), ctx),
    }
}

/// Value of a group without children: `AND` matches, `OR` and `NOT` do not.
fn empty_group(combinator: Combinator) -> bool {
    match combinator {
        Combinator::And => true,
        Combinator::Or | Combinator::Not => false,
    }
}

/// Combine the results of the children that were not skipped. `None` when
/// every child was skipped.
fn combine(combinator: Combinator, mut results: impl Iterator<Item = bool>) -> Option<bool> {
    let first = results.next()?;
    Some(match combinator {
        Combinator::And => first && results.all(|r| r),
        Combinator::Or => first || results.any(|r| r),
        Combinator::Not => !(first && results.all(|r| r)),
    })
}

/// `None` when the rule is skipped.
fn evaluate_rule(
    field: &str,
    op: Operator,
    comparand: Option<&FieldValue>,
    ctx: &EvalContext<'_>,
) -> Option<bool> {
    let Some(descriptor) = ctx.catalog.describe(field) else {
        tracing::debug!(field = %field, operator = %op, "Skipping rule on id missing from catalog");
        return None;
    };
    if op.takes_comparand() && comparand.is_none() {
        tracing::debug!(field = %field, operator = %op, "Skipping rule without comparand");
        return None;
    }
    let actual = ctx.values.get(field);
    Some(apply_operator(
        op,
        &descriptor,
        actual,
        comparand,
        ctx.case_sensitive,
    ))
}

fn apply_operator(
    op: Operator,
    descriptor: &Descriptor<'_>,
    actual: Option<&FieldValue>,
    comparand: Option<&FieldValue>,
    case_sensitive: bool,
) -> bool {
    if op.is_numeric() {
        return compare_numbers(op, actual, comparand);
    }
    if let Some(positive) = op.negation_of() {
        return !apply_operator(positive, descriptor, actual, comparand, case_sensitive);
    }

    if op == Operator::IsEmpty {
        return actual.map_or(true, FieldValue::is_empty);
    }
    let (Some(actual), Some(expected)) = (actual, comparand) else {
        return false;
    };

    let lhs = comparable_items(actual, descriptor, case_sensitive);
    let rhs = comparable_items(expected, descriptor, case_sensitive);

    match op {
        Operator::Equals => {
            if descriptor.kind == ValueKind::Number {
                if let (Some(a), Some(b)) = (actual.as_number(), expected.as_number()) {
                    return a == b;
                }
            }
            same_members(&lhs, &rhs)
        }
        Operator::MultiselectEquals => same_members(&lhs, &rhs),
        Operator::Contains => {
            if descriptor.kind.is_choice() {
                // every expected option is selected
                !rhs.is_empty() && rhs.iter().all(|r| lhs.contains(r))
            } else {
                lhs.iter().any(|l| rhs.iter().all(|r| l.contains(r.as_str())))
            }
        }
        Operator::StartsWith => lhs
            .iter()
            .any(|l| rhs.iter().any(|r| l.starts_with(r.as_str()))),
        Operator::EndsWith => lhs
            .iter()
            .any(|l| rhs.iter().any(|r| l.ends_with(r.as_str()))),
        Operator::SelectAnyIn | Operator::MultiselectSomeIn => {
            lhs.iter().any(|l| rhs.contains(l))
        }
        // negated, numeric and empty checks are handled above
        _ => false,
    }
}

/// Numeric family: non-coercible input on either side is `false`, negated or not.
fn compare_numbers(op: Operator, actual: Option<&FieldValue>, expected: Option<&FieldValue>) -> bool {
    let Some(a) = actual.and_then(FieldValue::as_number) else {
        return false;
    };
    match op {
        Operator::Between | Operator::NotBetween => {
            let Some((lo, hi)) = expected.and_then(range_bounds) else {
                return false;
            };
            let inside = lo <= a && a <= hi;
            if op == Operator::Between {
                inside
            } else {
                !inside
            }
        }
        _ => {
            let Some(b) = expected.and_then(FieldValue::as_number) else {
                return false;
            };
            match op {
                Operator::Greater => a > b,
                Operator::GreaterOrEqual => a >= b,
                Operator::Less => a < b,
                Operator::LessOrEqual => a <= b,
                _ => false,
            }
        }
    }
}

fn range_bounds(value: &FieldValue) -> Option<(f64, f64)> {
    let FieldValue::List(items) = value else {
        return None;
    };
    let [lo, hi] = items.as_slice() else {
        return None;
    };
    let lo = lo.trim().parse::<f64>().ok()?;
    let hi = hi.trim().parse::<f64>().ok()?;
    Some((lo.min(hi), lo.max(hi)))
}

/// Strings ready for comparison: option ids for choice kinds, case-folded
/// text otherwise.
fn comparable_items(value: &FieldValue, descriptor: &Descriptor<'_>, case_sensitive: bool) -> Vec<String> {
    value
        .to_strings()
        .iter()
        .map(|raw| {
            if descriptor.kind.is_choice() {
                resolve_option_id(descriptor.options, raw).to_string()
            } else if case_sensitive {
                raw.clone()
            } else {
                raw.to_lowercase()
            }
        })
        .collect()
}

fn same_members(lhs: &[String], rhs: &[String]) -> bool {
    let l: BTreeSet<&String> = lhs.iter().collect();
    let r: BTreeSet<&String> = rhs.iter().collect();
    l == r
}

// ============================================================================
// Explain: full traversal with the facts that were read
// ============================================================================

/// Result of evaluating a tree without short-circuiting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub matched: bool,
    /// Every referenced id known to the catalog, with its current value.
    pub facts: BTreeMap<String, Option<FieldValue>>,
    /// Ids of rules that were skipped (stale or incomplete).
    pub skipped: Vec<String>,
}

/// Evaluate every node of the tree and report what was read.
///
/// The `matched` flag always equals [`evaluate_condition`] on the same input.
pub fn explain_condition(condition: &Condition, ctx: &EvalContext<'_>) -> Evaluation {
    let mut facts = BTreeMap::new();
    let mut skipped = Vec::new();
    let matched = explain_recursive(condition, ctx, &mut facts, &mut skipped).unwrap_or(true);
    Evaluation {
        matched,
        facts,
        skipped,
    }
}

fn explain_recursive(
    condition: &Condition,
    ctx: &EvalContext<'_>,
    facts: &mut BTreeMap<String, Option<FieldValue>>,
    skipped: &mut Vec<String>,
) -> Option<bool> {
    match condition {
        Condition::Group {
            combinator,
            children,
        } => {
            let results: Vec<Option<bool>> = children
                .iter()
                .map(|c| explain_recursive(c, ctx, facts, skipped))
                .collect();
            if children.is_empty() {
                Some(empty_group(*combinator))
            } else {
                combine(*combinator, results.into_iter().flatten())
            }
        }
        Condition::Rule {
            field,
            operator,
            value,
        } => {
            if ctx.catalog.describe(field).is_some() {
                facts.insert(field.clone(), ctx.values.get(field).cloned());
            }
            let result = evaluate_rule(field, *operator, value.as_ref(), ctx);
            if result.is_none() {
                skipped.push(field.clone());
            }
            result
        }
    }
}

// ============================================================================
// Catalog Validation (authoring time)
// ============================================================================

/// Ids referenced by the tree that the catalog does not know.
pub fn validate_references(condition: &Condition, catalog: &dyn Catalog) -> Vec<String> {
    condition
        .referenced_ids()
        .into_iter()
        .filter(|id| catalog.describe(id).is_none())
        .collect()
}

/// Warnings for operator + value kind combinations that can never match
/// the way the author intended.
pub fn validate_operator_compatibility(condition: &Condition, catalog: &dyn Catalog) -> Vec<String> {
    let mut warnings = Vec::new();
    validate_ops_recursive(condition, catalog, &mut warnings);
    warnings
}

fn validate_ops_recursive(condition: &Condition, catalog: &dyn Catalog, warnings: &mut Vec<String>) {
    match condition {
        Condition::Group { children, .. } => {
            for c in children {
                validate_ops_recursive(c, catalog, warnings);
            }
        }
        Condition::Rule {
            field,
            operator,
            value,
        } => {
            let Some(descriptor) = catalog.describe(field) else {
                return;
            };
            let kind = descriptor.kind;
            let invalid = match operator {
                op if op.is_numeric() => kind != ValueKind::Number,
                Operator::SelectAnyIn | Operator::SelectNotAnyIn => kind != ValueKind::Select,
                Operator::MultiselectSomeIn
                | Operator::MultiselectNotSomeIn
                | Operator::MultiselectEquals
                | Operator::MultiselectNotEquals => kind != ValueKind::MultiSelect,
                Operator::StartsWith | Operator::EndsWith => kind.is_choice(),
                _ => false,
            };
            if invalid {
                warnings.push(format!(
                    "Operator {} not valid for '{}' ({:?})",
                    operator, field, kind
                ));
            }
            if operator.takes_comparand() && value.is_none() {
                warnings.push(format!(
                    "Rule on '{}' with operator {} has no value and is ignored",
                    field, operator
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Field, FieldCatalog, FieldType};

    fn catalog() -> FieldCatalog {
        FieldCatalog::new(vec![
            Field::new("budget", "Budget", FieldType::Number),
            Field::new("company", "Company", FieldType::Text),
            Field::new("region", "Region", FieldType::Select)
                .with_options(&[("r-emea", "EMEA"), ("r-apac", "APAC")]),
            Field::new("topics", "Topics", FieldType::Multiselect).with_options(&[
                ("t-bill", "Billing"),
                ("t-sso", "SSO"),
                ("t-api", "API"),
            ]),
            Field::new("notes", "Notes", FieldType::Textarea),
        ])
    }

    fn sample_values() -> BTreeMap<String, FieldValue> {
        let mut v = BTreeMap::new();
        v.insert("budget".into(), FieldValue::Number(1500.0));
        v.insert("company".into(), FieldValue::text("Acme Corp"));
        v.insert("region".into(), FieldValue::text("r-emea"));
        v.insert("topics".into(), FieldValue::list(["t-bill", "t-sso"]));
        v.insert("notes".into(), FieldValue::text(""));
        v
    }

    fn eval(cond: &Condition) -> bool {
        let cat = catalog();
        let values = sample_values();
        evaluate_condition(cond, &EvalContext::new(&cat, &values))
    }

    // ── Groups ────────────────────────────────────────────────────

    #[test]
    fn test_empty_and_matches() {
        assert!(eval(&Condition::match_all()));
    }

    #[test]
    fn test_empty_or_does_not_match() {
        assert!(!eval(&Condition::any(vec![])));
    }

    #[test]
    fn test_not_negates_single_child() {
        let cond = Condition::not(Condition::rule(
            "region",
            Operator::Equals,
            FieldValue::text("r-apac"),
        ));
        assert!(eval(&cond));
    }

    #[test]
    fn test_unknown_field_does_not_block_group() {
        let cond = Condition::all(vec![
            Condition::rule("deleted-field", Operator::Equals, FieldValue::text("x")),
            Condition::rule("budget", Operator::Greater, FieldValue::Number(1000.0)),
        ]);
        assert!(eval(&cond));

        let only_stale = Condition::any(vec![Condition::rule(
            "deleted-field",
            Operator::Equals,
            FieldValue::text("x"),
        )]);
        assert!(eval(&only_stale));
    }

    #[test]
    fn test_stale_rule_under_not_does_not_block_route() {
        let stale = Condition::rule("deleted-field", Operator::Equals, FieldValue::text("x"));
        assert!(eval(&Condition::all(vec![Condition::not(stale.clone())])));
        assert!(eval(&Condition::not(Condition::not(stale.clone()))));

        // NOT over the remaining children only
        let apac = Condition::rule("region", Operator::Equals, FieldValue::text("r-apac"));
        assert!(eval(&Condition::Group {
            combinator: Combinator::Not,
            children: vec![stale.clone(), apac],
        }));

        // a stale rule does not rescue a failing OR either
        let small = Condition::rule("budget", Operator::Less, FieldValue::Number(10.0));
        assert!(!eval(&Condition::any(vec![small, stale])));
    }

    #[test]
    fn test_empty_not_does_not_match() {
        assert!(!eval(&Condition::Group {
            combinator: Combinator::Not,
            children: vec![],
        }));
    }

    #[test]
    fn test_rule_without_comparand_is_skipped() {
        let cond = Condition::all(vec![Condition::unary("company", Operator::Equals)]);
        assert!(eval(&cond));
    }

    // ── Equality ──────────────────────────────────────────────────

    #[test]
    fn test_text_equals_is_case_insensitive_by_default() {
        let cond = Condition::rule("company", Operator::Equals, FieldValue::text("acme corp"));
        assert!(eval(&cond));

        let cat = catalog();
        let values = sample_values();
        let strict = EvalContext::new(&cat, &values).case_sensitive(true);
        assert!(!evaluate_condition(&cond, &strict));
    }

    #[test]
    fn test_select_equals_by_option_id_and_label() {
        assert!(eval(&Condition::rule(
            "region",
            Operator::Equals,
            FieldValue::text("r-emea")
        )));
        assert!(eval(&Condition::rule(
            "region",
            Operator::Equals,
            FieldValue::text("EMEA")
        )));
        assert!(!eval(&Condition::rule(
            "region",
            Operator::Equals,
            FieldValue::text("APAC")
        )));
    }

    #[test]
    fn test_number_equals_coerces_strings() {
        assert!(eval(&Condition::rule(
            "budget",
            Operator::Equals,
            FieldValue::text("1500")
        )));
    }

    #[test]
    fn test_not_equals_on_missing_value_matches() {
        let cat = catalog();
        let values = BTreeMap::new();
        let cond = Condition::rule("company", Operator::NotEquals, FieldValue::text("acme"));
        assert!(evaluate_condition(&cond, &EvalContext::new(&cat, &values)));
    }

    // ── Containment ───────────────────────────────────────────────

    #[test]
    fn test_text_contains() {
        assert!(eval(&Condition::rule(
            "company",
            Operator::Contains,
            FieldValue::text("ACME")
        )));
        assert!(eval(&Condition::rule(
            "company",
            Operator::NotContains,
            FieldValue::text("globex")
        )));
    }

    #[test]
    fn test_multiselect_contains_all_expected() {
        assert!(eval(&Condition::rule(
            "topics",
            Operator::Contains,
            FieldValue::list(["Billing", "t-sso"])
        )));
        assert!(!eval(&Condition::rule(
            "topics",
            Operator::Contains,
            FieldValue::list(["t-bill", "t-api"])
        )));
    }

    #[test]
    fn test_select_any_in() {
        assert!(eval(&Condition::rule(
            "region",
            Operator::SelectAnyIn,
            FieldValue::list(["r-apac", "r-emea"])
        )));
        assert!(eval(&Condition::rule(
            "region",
            Operator::SelectNotAnyIn,
            FieldValue::list(["r-apac"])
        )));
    }

    #[test]
    fn test_multiselect_some_in_and_equals() {
        assert!(eval(&Condition::rule(
            "topics",
            Operator::MultiselectSomeIn,
            FieldValue::list(["t-api", "t-sso"])
        )));
        assert!(eval(&Condition::rule(
            "topics",
            Operator::MultiselectEquals,
            FieldValue::list(["t-sso", "t-bill"])
        )));
        assert!(eval(&Condition::rule(
            "topics",
            Operator::MultiselectNotEquals,
            FieldValue::list(["t-sso"])
        )));
    }

    #[test]
    fn test_starts_and_ends_with() {
        assert!(eval(&Condition::rule(
            "company",
            Operator::StartsWith,
            FieldValue::text("acme")
        )));
        assert!(eval(&Condition::rule(
            "company",
            Operator::EndsWith,
            FieldValue::text("corp")
        )));
    }

    // ── Emptiness ─────────────────────────────────────────────────

    #[test]
    fn test_is_empty_uniform() {
        assert!(eval(&Condition::unary("notes", Operator::IsEmpty)));
        assert!(!eval(&Condition::unary("company", Operator::IsEmpty)));

        let cat = catalog();
        let mut values = BTreeMap::new();
        values.insert("topics".to_string(), FieldValue::List(vec![]));
        let ctx = EvalContext::new(&cat, &values);
        assert!(evaluate_condition(&Condition::unary("topics", Operator::IsEmpty), &ctx));
        // absent value
        assert!(evaluate_condition(&Condition::unary("company", Operator::IsEmpty), &ctx));
        assert!(!evaluate_condition(
            &Condition::unary("company", Operator::IsNotEmpty),
            &ctx
        ));
    }

    // ── Numbers ───────────────────────────────────────────────────

    #[test]
    fn test_numeric_comparisons() {
        assert!(eval(&Condition::rule("budget", Operator::Greater, FieldValue::Number(1000.0))));
        assert!(!eval(&Condition::rule("budget", Operator::Less, FieldValue::Number(1000.0))));
        assert!(eval(&Condition::rule(
            "budget",
            Operator::GreaterOrEqual,
            FieldValue::text("1500")
        )));
        assert!(eval(&Condition::rule("budget", Operator::LessOrEqual, FieldValue::Number(1500.0))));
    }

    #[test]
    fn test_numeric_non_coercible_is_false() {
        let cat = catalog();
        let mut values = BTreeMap::new();
        values.insert("budget".to_string(), FieldValue::text("a lot"));
        let ctx = EvalContext::new(&cat, &values);
        assert!(!evaluate_condition(
            &Condition::rule("budget", Operator::Greater, FieldValue::Number(1.0)),
            &ctx
        ));
        assert!(!evaluate_condition(
            &Condition::rule("budget", Operator::Less, FieldValue::Number(1.0)),
            &ctx
        ));
        assert!(!evaluate_condition(
            &Condition::rule("budget", Operator::NotBetween, FieldValue::list(["1", "2"])),
            &ctx
        ));
    }

    #[test]
    fn test_between_inclusive() {
        assert!(eval(&Condition::rule(
            "budget",
            Operator::Between,
            FieldValue::list(["1000", "1500"])
        )));
        assert!(eval(&Condition::rule(
            "budget",
            Operator::NotBetween,
            FieldValue::list(["0", "100"])
        )));
        // malformed range
        assert!(!eval(&Condition::rule(
            "budget",
            Operator::Between,
            FieldValue::list(["1000"])
        )));
    }

    // ── Explain ───────────────────────────────────────────────────

    #[test]
    fn test_explain_reads_every_field() {
        let cond = Condition::any(vec![
            Condition::rule("budget", Operator::Greater, FieldValue::Number(1000.0)),
            Condition::rule("company", Operator::Equals, FieldValue::text("globex")),
            Condition::rule("gone", Operator::Equals, FieldValue::text("x")),
        ]);
        let cat = catalog();
        let values = sample_values();
        let ctx = EvalContext::new(&cat, &values);
        let result = explain_condition(&cond, &ctx);
        assert!(result.matched);
        assert_eq!(result.matched, evaluate_condition(&cond, &ctx));
        assert_eq!(
            result.facts.keys().collect::<Vec<_>>(),
            vec!["budget", "company"]
        );
        assert_eq!(result.skipped, vec!["gone"]);
    }

    #[test]
    fn test_explain_skips_stale_rule_under_not() {
        let cond = Condition::all(vec![Condition::not(Condition::rule(
            "gone",
            Operator::Equals,
            FieldValue::text("x"),
        ))]);
        let cat = catalog();
        let values = sample_values();
        let ctx = EvalContext::new(&cat, &values);
        let result = explain_condition(&cond, &ctx);
        assert!(result.matched);
        assert_eq!(result.matched, evaluate_condition(&cond, &ctx));
        assert_eq!(result.skipped, vec!["gone"]);
    }

    // ── Validation ────────────────────────────────────────────────

    #[test]
    fn test_validate_references() {
        let cond = Condition::all(vec![
            Condition::rule("budget", Operator::Greater, FieldValue::Number(1.0)),
            Condition::rule("unknown.field", Operator::Equals, FieldValue::text("x")),
        ]);
        assert_eq!(validate_references(&cond, &catalog()), vec!["unknown.field"]);
    }

    #[test]
    fn test_validate_operator_compatibility() {
        let cond = Condition::all(vec![
            Condition::rule("company", Operator::Greater, FieldValue::Number(1.0)),
            Condition::rule("region", Operator::MultiselectSomeIn, FieldValue::list(["r-emea"])),
            Condition::rule("topics", Operator::MultiselectSomeIn, FieldValue::list(["t-api"])),
        ]);
        let warnings = validate_operator_compatibility(&cond, &catalog());
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("not valid"));
    }
}
