//! Topic store: owns the ordered topic graph and id assignment.
//!
//! CRUD only. Missing ids are reported as `StoreError` and leave the store
//! untouched; callers decide whether that is fatal.

use crate::topic::{parse_topic_number, Category, CategoryId, Topic, TopicId, DEFAULT_PROMPT_TEMPLATE};
use std::fmt;
use tracing::{debug, warn};

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Topic with ID {0} not found")]
    TopicNotFound(TopicId),

    #[error("Category with ID {category_id} not found in topic ID {topic_id}")]
    CategoryNotFound {
        topic_id: TopicId,
        category_id: CategoryId,
    },

    #[error("Category '{name}' already exists in topic {topic}")]
    DuplicateCategoryName { topic: String, name: String },
}

/// Ordered topic graph with a monotonically increasing topic counter
#[derive(Debug, Clone, Default)]
pub struct TopicStore {
    topics: Vec<Topic>,
    /// Number of the last issued topic id
    counter: u64,
}

impl TopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from loaded topics.
    ///
    /// The counter resumes from the largest `T<digits>` id; other ids are kept
    /// but do not influence numbering.
    pub fn from_topics(topics: Vec<Topic>) -> Self {
        let counter = topics
            .iter()
            .filter_map(Topic::id_number)
            .max()
            .unwrap_or(0);
        Self { topics, counter }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn topic(&self, topic_id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == topic_id)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Column headers for datasets: `Text` followed by topic names in order
    pub fn header_list(&self) -> Vec<String> {
        std::iter::once("Text".to_string())
            .chain(self.topics.iter().map(|t| t.name.clone()))
            .collect()
    }

    /// Add a topic with an empty condition and the default prompt
    pub fn add_topic_with_defaults<S: AsRef<str>>(
        &mut self,
        name: &str,
        categories: &[S],
    ) -> Result<TopicId, StoreError> {
        self.add_topic(name, categories, "", DEFAULT_PROMPT_TEMPLATE)
    }

    pub fn add_topic<S: AsRef<str>>(
        &mut self,
        name: &str,
        categories: &[S],
        condition: &str,
        prompt: &str,
    ) -> Result<TopicId, StoreError> {
        let mut seen: Vec<&str> = Vec::with_capacity(categories.len());
        for category in categories {
            let category = category.as_ref();
            if seen.contains(&category) {
                warn!("Rejecting topic '{}': duplicate category '{}'", name, category);
                return Err(StoreError::DuplicateCategoryName {
                    topic: name.to_string(),
                    name: category.to_string(),
                });
            }
            seen.push(category);
        }

        self.counter += 1;
        let id = format!("T{}", self.counter);

        self.topics.push(Topic {
            id: id.clone(),
            name: name.to_string(),
            condition: condition.to_string(),
            prompt: prompt.to_string(),
            categories: seen.into_iter().map(|c| Category::new(c, "")).collect(),
        });

        debug!("Topic '{}' added with ID {}", name, id);
        Ok(id)
    }

    pub fn remove_topic(&mut self, topic_id: &str) -> Result<Topic, StoreError> {
        match self.topics.iter().position(|t| t.id == topic_id) {
            Some(index) => {
                debug!("Topic with ID {} removed", topic_id);
                Ok(self.topics.remove(index))
            }
            None => Err(not_found(topic_id)),
        }
    }

    pub fn add_category(
        &mut self,
        topic_id: &str,
        name: &str,
        condition: &str,
    ) -> Result<CategoryId, StoreError> {
        let topic = self.topic_mut(topic_id)?;
        if topic.category_by_name(name).is_some() {
            warn!("Category '{}' already exists in topic ID {}", name, topic_id);
            return Err(StoreError::DuplicateCategoryName {
                topic: topic_id.to_string(),
                name: name.to_string(),
            });
        }

        let category = Category::new(name, condition);
        let id = category.id.clone();
        topic.categories.push(category);
        debug!("Category '{}' added to topic ID {} with ID {}", name, topic_id, id);
        Ok(id)
    }

    pub fn remove_category(
        &mut self,
        topic_id: &str,
        category_id: &str,
    ) -> Result<Category, StoreError> {
        let topic = self.topic_mut(topic_id)?;
        match topic.categories.iter().position(|c| c.id == category_id) {
            Some(index) => Ok(topic.categories.remove(index)),
            None => Err(category_not_found(topic_id, category_id)),
        }
    }

    pub fn set_prompt(&mut self, topic_id: &str, prompt: &str) -> Result<(), StoreError> {
        self.topic_mut(topic_id)?.prompt = prompt.to_string();
        Ok(())
    }

    pub fn set_topic_condition(&mut self, topic_id: &str, condition: &str) -> Result<(), StoreError> {
        self.topic_mut(topic_id)?.condition = condition.to_string();
        Ok(())
    }

    pub fn clear_topic_condition(&mut self, topic_id: &str) -> Result<(), StoreError> {
        self.set_topic_condition(topic_id, "")
    }

    pub fn set_category_condition(
        &mut self,
        topic_id: &str,
        category_id: &str,
        condition: &str,
    ) -> Result<(), StoreError> {
        let topic = self.topic_mut(topic_id)?;
        match topic.category_mut(category_id) {
            Some(category) => {
                category.condition = condition.to_string();
                Ok(())
            }
            None => Err(category_not_found(topic_id, category_id)),
        }
    }

    pub fn clear_category_condition(
        &mut self,
        topic_id: &str,
        category_id: &str,
    ) -> Result<(), StoreError> {
        self.set_category_condition(topic_id, category_id, "")
    }

    /// Drop every topic and restart numbering at `T1`
    pub fn remove_all_topics(&mut self) {
        self.topics.clear();
        self.counter = 0;
    }

    fn topic_mut(&mut self, topic_id: &str) -> Result<&mut Topic, StoreError> {
        self.topics
            .iter_mut()
            .find(|t| t.id == topic_id)
            .ok_or_else(|| not_found(topic_id))
    }
}

fn not_found(topic_id: &str) -> StoreError {
    warn!("Topic with ID {} not found", topic_id);
    StoreError::TopicNotFound(topic_id.to_string())
}

fn category_not_found(topic_id: &str, category_id: &str) -> StoreError {
    warn!("Category ID {} not found in topic ID {}", category_id, topic_id);
    StoreError::CategoryNotFound {
        topic_id: topic_id.to_string(),
        category_id: category_id.to_string(),
    }
}

impl fmt::Display for TopicStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.topics.is_empty() {
            return writeln!(f, "No topics are currently defined.");
        }
        for (i, topic) in self.topics.iter().enumerate() {
            write!(f, "Topic {}: {}", i + 1, topic)?;
        }
        Ok(())
    }
}
