use serde::{Deserialize, Serialize};

use crate::domain::document::{Document, FieldValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    In,
    NotIn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

/// One routing condition. `logical` attaches to *this* condition and says
/// how the running result combines with the NEXT condition's outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: FieldValue,
    #[serde(default)]
    pub logical: Option<LogicalOperator>,
}

/// Evaluates an ordered condition list against a document. Never errors:
/// malformed or undefined comparisons degrade to `false` (or `true` for
/// `not_in`, where an undefined field trivially is not a member).
///
/// Combination is a strict left-to-right fold with no operator precedence.
/// `a OR b AND c` evaluates as `(a OR b) AND c`. This mirrors the behavior
/// routing rules were authored against; do not "fix" it to standard
/// precedence.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn evaluate(&self, conditions: &[RoutingCondition], document: &Document) -> bool {
        let Some((first, rest)) = conditions.split_first() else {
            // An empty condition list matches everything; used by
            // catch-all default rules.
            return true;
        };

        let mut result = condition_matches(first, document);
        let mut pending = first.logical;
        for condition in rest {
            let outcome = condition_matches(condition, document);
            result = match pending.unwrap_or(LogicalOperator::And) {
                LogicalOperator::And => result && outcome,
                LogicalOperator::Or => result || outcome,
            };
            pending = condition.logical;
        }

        result
    }
}

fn condition_matches(condition: &RoutingCondition, document: &Document) -> bool {
    let field = document.field(&condition.field);

    let Some(field) = field else {
        // Undefined fields fail every operator except not_in: a value
        // that does not exist is trivially not in any list.
        return condition.operator == ConditionOperator::NotIn;
    };

    match condition.operator {
        ConditionOperator::Equals => field == condition.value,
        ConditionOperator::Contains => match (field.as_text(), condition.value.as_text()) {
            (Some(haystack), Some(needle)) => {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => false,
        },
        ConditionOperator::GreaterThan => match (field.as_number(), condition.value.as_number()) {
            (Some(left), Some(right)) => left > right,
            _ => false,
        },
        ConditionOperator::LessThan => match (field.as_number(), condition.value.as_number()) {
            (Some(left), Some(right)) => left < right,
            _ => false,
        },
        ConditionOperator::In => match condition.value.as_list() {
            Some(candidates) => candidates.contains(&field),
            // A non-list value can never contain the field.
            None => false,
        },
        ConditionOperator::NotIn => match condition.value.as_list() {
            Some(candidates) => !candidates.contains(&field),
            None => true,
        },
    }
}
