//! Topic and category records.
//!
//! A topic is one classification axis: a closed category vocabulary, an
//! optional gating condition and the prompt template used to ask the model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prompt used when a topic is added without an explicit template.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "INSTRUCTION: You are a helpful classifier. \
You select the correct of the possible categories for classifying a piece of text. \
The topic of the classification is '[TOPIC]'. The allowed categories are '[CATEGORIES]'. \
QUESTION: The text to be classified is '[TEXT]'. \
ANSWER: The correct category for this text is '";

pub const TOPIC_PLACEHOLDER: &str = "[TOPIC]";
pub const CATEGORIES_PLACEHOLDER: &str = "[CATEGORIES]";
pub const TEXT_PLACEHOLDER: &str = "[TEXT]";

/// Topic identifier of the form `T<n>`.
pub type TopicId = String;

/// Category identifier, unique within its topic and never reused.
pub type CategoryId = String;

/// One labeled outcome within a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: CategoryId,

    #[serde(default)]
    pub name: String,

    /// Stored and persisted, not consulted by the classification pass
    #[serde(default)]
    pub condition: String,
}

impl Category {
    /// Create a category with a fresh random id
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            condition: condition.into(),
        }
    }
}

/// A classification axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub id: TopicId,

    /// Display name (`topic_input` in the snapshot format)
    #[serde(rename = "topic_input", default)]
    pub name: String,

    /// Gating condition, empty means always evaluated
    #[serde(default)]
    pub condition: String,

    #[serde(default)]
    pub prompt: String,

    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Topic {
    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    pub fn category_mut(&mut self, category_id: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == category_id)
    }

    /// First category whose name matches exactly
    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Category names in order, the literal option set used for prompting and scoring
    pub fn candidate_labels(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// Bracketed option list substituted for `[CATEGORIES]`, e.g. `['BMW','Audi']`
    pub fn candidate_list(&self) -> String {
        let quoted: Vec<String> = self
            .categories
            .iter()
            .map(|c| format!("'{}'", c.name))
            .collect();
        format!("[{}]", quoted.join(","))
    }

    /// Substitute topic name, candidate list and input text into the template
    pub fn render_prompt(&self, candidate_list: &str, text: &str) -> String {
        self.prompt
            .replace(TOPIC_PLACEHOLDER, &self.name)
            .replace(CATEGORIES_PLACEHOLDER, candidate_list)
            .replace(TEXT_PLACEHOLDER, text)
    }

    /// Numeric part of a `T<digits>` id
    pub fn id_number(&self) -> Option<u64> {
        parse_topic_number(&self.id)
    }
}

/// Parse the numeric suffix of a `T<digits>` topic id.
pub fn parse_topic_number(id: &str) -> Option<u64> {
    let digits = id.strip_prefix('T')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (ID={})", self.name, self.id)?;
        if !self.condition.is_empty() {
            writeln!(f, "  Condition: {}", self.condition)?;
        }
        if !self.prompt.is_empty() {
            writeln!(f, "  Prompt: {}", self.prompt)?;
        }
        if self.categories.is_empty() {
            writeln!(f, "    [No categories in this topic]")?;
        }
        for (i, category) in self.categories.iter().enumerate() {
            write!(f, "    {}. {} (ID={})", i + 1, category.name, category.id)?;
            if !category.condition.is_empty() {
                write!(f, " (Condition: {})", category.condition)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car_brand() -> Topic {
        Topic {
            id: "T1".to_string(),
            name: "Car Brand".to_string(),
            condition: String::new(),
            prompt: DEFAULT_PROMPT_TEMPLATE.to_string(),
            categories: vec![Category::new("BMW", ""), Category::new("Audi", "")],
        }
    }

    #[test]
    fn test_candidate_list_format() {
        assert_eq!(car_brand().candidate_list(), "['BMW','Audi']");
    }

    #[test]
    fn test_candidate_list_empty() {
        let mut topic = car_brand();
        topic.categories.clear();
        assert_eq!(topic.candidate_list(), "[]");
        assert!(topic.candidate_labels().is_empty());
    }

    #[test]
    fn test_render_prompt_substitutes_placeholders() {
        let topic = car_brand();
        let prompt = topic.render_prompt(&topic.candidate_list(), "A new X5");
        assert!(prompt.contains("'Car Brand'"));
        assert!(prompt.contains("['BMW','Audi']"));
        assert!(prompt.contains("'A new X5'"));
        assert!(!prompt.contains(TEXT_PLACEHOLDER));
        assert!(prompt.ends_with("is '"));
    }

    #[test]
    fn test_category_ids_are_unique() {
        let a = Category::new("Same", "");
        let b = Category::new("Same", "");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_parse_topic_number() {
        assert_eq!(parse_topic_number("T12"), Some(12));
        assert_eq!(parse_topic_number("T"), None);
        assert_eq!(parse_topic_number("X3"), None);
        assert_eq!(parse_topic_number("T3a"), None);
        assert_eq!(parse_topic_number("T+3"), None);
    }

    #[test]
    fn test_category_by_name_first_match_wins() {
        let mut topic = car_brand();
        topic.categories.push(Category::new("BMW", ""));
        let first = topic.categories[0].id.clone();
        assert_eq!(topic.category_by_name("BMW").unwrap().id, first);
        assert!(topic.category_by_name("bmw").is_none());
    }
}
