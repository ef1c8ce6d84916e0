//! Gating conditions.
//!
//! Conditions are stored as opaque strings on topics and parsed into a
//! `Condition` when a pass needs them. Current grammar:
//!
//! ```text
//! <topicId>==<categoryName>
//! ```
//!
//! Both sides are trimmed. An empty string always holds.

use crate::topic::{CategoryId, TopicId};
use crate::topic_store::TopicStore;
use std::collections::HashMap;
use std::fmt;

/// Chosen category per topic for the current pass.
///
/// A `None` value means the topic was scored but its answer did not resolve
/// to one of its categories.
pub type PreviousResults = HashMap<TopicId, Option<CategoryId>>;

const EQUALS: &str = "==";

/// Why a condition string could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("Invalid condition format: {0} (expected <topicId>==<categoryName>)")]
    MissingOperator(String),

    #[error("Invalid condition format: {0} (empty topic id or category name)")]
    EmptyOperand(String),
}

/// Parsed gating expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Always,
    Equals {
        topic_id: TopicId,
        category_name: String,
    },
}

impl Condition {
    pub fn parse(raw: &str) -> Result<Self, ConditionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Condition::Always);
        }

        let (topic_id, category_name) = raw
            .split_once(EQUALS)
            .ok_or_else(|| ConditionError::MissingOperator(raw.to_string()))?;
        let (topic_id, category_name) = (topic_id.trim(), category_name.trim());
        if topic_id.is_empty() || category_name.is_empty() {
            return Err(ConditionError::EmptyOperand(raw.to_string()));
        }

        Ok(Condition::Equals {
            topic_id: topic_id.to_string(),
            category_name: category_name.to_string(),
        })
    }

    /// Evaluate against the results recorded so far in this pass
    pub fn evaluate(&self, previous: &PreviousResults, store: &TopicStore) -> ConditionOutcome {
        match self {
            Condition::Always => ConditionOutcome::Satisfied,
            Condition::Equals {
                topic_id,
                category_name,
            } => {
                let Some(chosen) = previous.get(topic_id) else {
                    return ConditionOutcome::Unresolved(topic_id.clone());
                };

                let chosen_name = chosen.as_ref().and_then(|category_id| {
                    store
                        .topic(topic_id)
                        .and_then(|topic| topic.category(category_id))
                        .map(|category| category.name.as_str())
                });

                if chosen_name == Some(category_name.as_str()) {
                    ConditionOutcome::Satisfied
                } else {
                    ConditionOutcome::NotSatisfied
                }
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => Ok(()),
            Condition::Equals {
                topic_id,
                category_name,
            } => write!(f, "{}{}{}", topic_id, EQUALS, category_name),
        }
    }
}

/// Result of evaluating a raw condition string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOutcome {
    Satisfied,
    NotSatisfied,
    /// The condition string could not be parsed
    Invalid(ConditionError),
    /// The referenced topic has no result in this pass (skipped, later or unknown)
    Unresolved(TopicId),
}

impl ConditionOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ConditionOutcome::Satisfied)
    }
}

/// Parse and evaluate in one step; parse failures become `Invalid`.
pub fn evaluate_condition(raw: &str, previous: &PreviousResults, store: &TopicStore) -> ConditionOutcome {
    match Condition::parse(raw) {
        Ok(condition) => condition.evaluate(previous, store),
        Err(e) => ConditionOutcome::Invalid(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brand_store() -> (TopicStore, PreviousResults) {
        let mut store = TopicStore::new();
        store
            .add_topic_with_defaults("Car Brand", &["BMW", "Audi"])
            .unwrap();
        (store, PreviousResults::new())
    }

    fn choose(store: &TopicStore, previous: &mut PreviousResults, name: &str) {
        let topic = store.topic("T1").unwrap();
        let id = topic.category_by_name(name).map(|c| c.id.clone());
        previous.insert("T1".to_string(), id);
    }

    #[test]
    fn test_parse_empty_is_always() {
        assert_eq!(Condition::parse("").unwrap(), Condition::Always);
        assert_eq!(Condition::parse("   ").unwrap(), Condition::Always);
    }

    #[test]
    fn test_parse_trims_operands() {
        let condition = Condition::parse("  T1 ==  BMW ").unwrap();
        assert_eq!(
            condition,
            Condition::Equals {
                topic_id: "T1".to_string(),
                category_name: "BMW".to_string()
            }
        );
        assert_eq!(condition.to_string(), "T1==BMW");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            Condition::parse("T1=BMW"),
            Err(ConditionError::MissingOperator(_))
        ));
        assert!(matches!(
            Condition::parse("==BMW"),
            Err(ConditionError::EmptyOperand(_))
        ));
    }

    #[test]
    fn test_matching_category_satisfies() {
        let (store, mut previous) = brand_store();
        choose(&store, &mut previous, "BMW");
        assert!(evaluate_condition("T1==BMW", &previous, &store).is_satisfied());
        assert_eq!(
            evaluate_condition("T1==Audi", &previous, &store),
            ConditionOutcome::NotSatisfied
        );
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let (store, mut previous) = brand_store();
        choose(&store, &mut previous, "BMW");
        assert_eq!(
            evaluate_condition("T1==bmw", &previous, &store),
            ConditionOutcome::NotSatisfied
        );
    }

    #[test]
    fn test_missing_result_is_unresolved() {
        let (store, previous) = brand_store();
        assert_eq!(
            evaluate_condition("T1==BMW", &previous, &store),
            ConditionOutcome::Unresolved("T1".to_string())
        );
    }

    #[test]
    fn test_unresolved_answer_never_matches() {
        let (store, mut previous) = brand_store();
        choose(&store, &mut previous, "undefined");
        assert_eq!(previous.get("T1"), Some(&None));
        assert_eq!(
            evaluate_condition("T1==BMW", &previous, &store),
            ConditionOutcome::NotSatisfied
        );
    }

    #[test]
    fn test_invalid_condition_not_satisfied() {
        let (store, previous) = brand_store();
        let outcome = evaluate_condition("T1 BMW", &previous, &store);
        assert!(matches!(outcome, ConditionOutcome::Invalid(_)));
        assert!(!outcome.is_satisfied());
    }
}
