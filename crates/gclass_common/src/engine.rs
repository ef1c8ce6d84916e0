//! Classification engine: one pass over all topics in creation order.
//!
//! For each topic the gating condition is evaluated against the results
//! recorded earlier in the same pass. Satisfied topics get their prompt
//! rendered and scored by the backend; skipped topics contribute an empty
//! answer and no confidence.

use crate::cancel::CancellationToken;
use crate::condition::{evaluate_condition, ConditionError, ConditionOutcome, PreviousResults};
use crate::config::ClassifySettings;
use crate::persistence::{self, PersistenceError};
use crate::scoring_backend::{Answer, BackendError, Confidence, ScoringBackend};
use crate::topic::{CategoryId, Topic, TopicId};
use crate::topic_store::TopicStore;
use std::path::Path;
use tracing::{debug, info, warn};

/// Per-call options
#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions<'a> {
    /// Log each topic decision at info level
    pub single_mode: bool,
    /// Ask for probability scoring over the candidate set
    pub constrained_output: bool,
    /// Labelled row laid out like `TopicStore::header_list`; enables evaluation mode
    pub ground_truth: Option<&'a [String]>,
}

impl Default for ClassifyOptions<'_> {
    fn default() -> Self {
        Self {
            single_mode: true,
            constrained_output: true,
            ground_truth: None,
        }
    }
}

impl From<&ClassifySettings> for ClassifyOptions<'_> {
    fn from(settings: &ClassifySettings) -> Self {
        Self {
            single_mode: settings.single_mode,
            constrained_output: settings.constrained_output,
            ground_truth: None,
        }
    }
}

impl<'a> ClassifyOptions<'a> {
    pub fn with_ground_truth(mut self, row: &'a [String]) -> Self {
        self.ground_truth = Some(row);
        self
    }
}

/// Why a topic was not scored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The referenced topic chose a different category
    NotSatisfied,
    /// The condition string is malformed
    InvalidCondition(ConditionError),
    /// The referenced topic has no result in this pass
    UnresolvedDependency(TopicId),
}

/// What happened to one topic during a pass
#[derive(Debug, Clone, PartialEq)]
pub enum TopicOutcome {
    Scored {
        topic_id: TopicId,
        answer: Answer,
        /// Category the answer resolved to, if any
        category_id: Option<CategoryId>,
    },
    Skipped {
        topic_id: TopicId,
        reason: SkipReason,
    },
}

impl TopicOutcome {
    pub fn topic_id(&self) -> &str {
        match self {
            TopicOutcome::Scored { topic_id, .. } | TopicOutcome::Skipped { topic_id, .. } => topic_id,
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, TopicOutcome::Scored { .. })
    }
}

/// Result of one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// One entry per topic, empty string for skipped topics
    pub answers: Vec<String>,
    /// One entry per scored topic only
    pub confidences: Vec<Confidence>,
    /// One entry per topic
    pub outcomes: Vec<TopicOutcome>,
}

/// Classification errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifyError {
    #[error("Scoring failed for topic {topic_id}: {source}")]
    Backend {
        topic_id: TopicId,
        #[source]
        source: BackendError,
    },

    #[error("Ground truth row has {actual} columns, expected at least {expected}")]
    GroundTruthTooShort { expected: usize, actual: usize },

    #[error("Classification cancelled")]
    Cancelled,
}

pub struct ClassificationEngine {
    store: TopicStore,
    backend: Box<dyn ScoringBackend>,
    previous_results: PreviousResults,
    cancel: CancellationToken,
}

impl ClassificationEngine {
    pub fn new(store: TopicStore, backend: Box<dyn ScoringBackend>) -> Self {
        Self {
            store,
            backend,
            previous_results: PreviousResults::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Share `cancel` with whoever may need to abort a pass
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &TopicStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TopicStore {
        &mut self.store
    }

    pub fn backend(&self) -> &dyn ScoringBackend {
        self.backend.as_ref()
    }

    pub fn set_backend(&mut self, backend: Box<dyn ScoringBackend>) {
        self.backend = backend;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Results recorded by the most recent pass
    pub fn previous_results(&self) -> &PreviousResults {
        &self.previous_results
    }

    /// Drop all topics, restart numbering and forget the last pass
    pub fn remove_all_topics(&mut self) {
        self.store.remove_all_topics();
        self.previous_results.clear();
        info!("All topics removed, counters reset");
    }

    pub fn save_topics(&self, path: &Path) -> Result<(), PersistenceError> {
        persistence::save_topics(&self.store, path)
    }

    /// Replace the topic graph with the snapshot at `path`
    pub fn load_topics(&mut self, path: &Path) -> Result<(), PersistenceError> {
        self.store = persistence::load_topics(path)?;
        self.previous_results.clear();
        Ok(())
    }

    pub fn classify(&mut self, text: &str, options: ClassifyOptions<'_>) -> Result<Classification, ClassifyError> {
        self.previous_results.clear();

        let candidate_lists: Vec<String> = self.store.topics().iter().map(Topic::candidate_list).collect();

        if let Some(row) = options.ground_truth {
            self.assign_ground_truth(row)?;
        }

        let mut classification = Classification::default();

        for (topic, candidate_list) in self.store.topics().iter().zip(&candidate_lists) {
            if self.cancel.is_cancelled() {
                return Err(ClassifyError::Cancelled);
            }

            let outcome = evaluate_condition(&topic.condition, &self.previous_results, &self.store);
            if let Some(reason) = skip_reason(outcome) {
                log_skip(topic, &reason, options.single_mode);
                classification.answers.push(String::new());
                classification.outcomes.push(TopicOutcome::Skipped {
                    topic_id: topic.id.clone(),
                    reason,
                });
                continue;
            }

            let prompt = topic.render_prompt(candidate_list, text);
            let answer = self
                .backend
                .get_answer(&prompt, &topic.candidate_labels(), options.constrained_output)
                .map_err(|source| match source {
                    BackendError::Cancelled => ClassifyError::Cancelled,
                    source => ClassifyError::Backend {
                        topic_id: topic.id.clone(),
                        source,
                    },
                })?;

            if options.single_mode {
                info!("{}: {} (Relative Probability: {})", topic.name, answer.label, answer.confidence);
            } else {
                debug!("{}: {} (Relative Probability: {})", topic.name, answer.label, answer.confidence);
            }

            let category_id = topic.category_by_name(&answer.label).map(|c| c.id.clone());
            if options.ground_truth.is_none() {
                self.previous_results.insert(topic.id.clone(), category_id.clone());
            }

            classification.answers.push(answer.label.clone());
            classification.confidences.push(answer.confidence);
            classification.outcomes.push(TopicOutcome::Scored {
                topic_id: topic.id.clone(),
                answer,
                category_id,
            });
        }

        Ok(classification)
    }

    /// Seed previous results from a labelled row instead of from scoring
    fn assign_ground_truth(&mut self, row: &[String]) -> Result<(), ClassifyError> {
        let expected = self.store.len() + 1;
        if row.len() < expected {
            return Err(ClassifyError::GroundTruthTooShort {
                expected,
                actual: row.len(),
            });
        }

        for (topic, label) in self.store.topics().iter().zip(&row[1..]) {
            let category_id = topic.category_by_name(label).map(|c| c.id.clone());
            self.previous_results.insert(topic.id.clone(), category_id);
        }
        Ok(())
    }
}

fn skip_reason(outcome: ConditionOutcome) -> Option<SkipReason> {
    match outcome {
        ConditionOutcome::Satisfied => None,
        ConditionOutcome::NotSatisfied => Some(SkipReason::NotSatisfied),
        ConditionOutcome::Invalid(e) => Some(SkipReason::InvalidCondition(e)),
        ConditionOutcome::Unresolved(topic_id) => Some(SkipReason::UnresolvedDependency(topic_id)),
    }
}

fn log_skip(topic: &Topic, reason: &SkipReason, single_mode: bool) {
    match reason {
        SkipReason::InvalidCondition(e) => warn!("Skipping {}: {}", topic.name, e),
        SkipReason::UnresolvedDependency(dependency) => debug!(
            "Skipping {}: topic {} has no result in this pass ({})",
            topic.name, dependency, topic.condition
        ),
        SkipReason::NotSatisfied if single_mode => {
            info!("Skipping {} due to unmet condition: {}", topic.name, topic.condition)
        }
        SkipReason::NotSatisfied => {
            debug!("Skipping {} due to unmet condition: {}", topic.name, topic.condition)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring_backend::FakeBackend;
    use std::sync::Arc;

    /// Backend wrapper so tests can inspect the fake after handing it to the engine
    struct Shared(Arc<FakeBackend>);

    impl ScoringBackend for Shared {
        fn get_answer(&self, prompt: &str, candidates: &[String], constrained: bool) -> Result<Answer, BackendError> {
            self.0.get_answer(prompt, candidates, constrained)
        }

        fn name(&self) -> &str {
            self.0.name()
        }
    }

    /// Answers with the first candidate mentioned in the text part of the prompt
    fn keyword_backend() -> Arc<FakeBackend> {
        Arc::new(FakeBackend::answering(|prompt, candidates| {
            let text = prompt.split("QUESTION:").nth(1).unwrap_or(prompt);
            let label = candidates
                .iter()
                .find(|c| text.contains(c.as_str()))
                .or_else(|| candidates.first())
                .cloned()
                .unwrap_or_default();
            Ok(Answer::new(label, Confidence::Score(0.9)))
        }))
    }

    fn car_store() -> TopicStore {
        let mut store = TopicStore::new();
        let brand = store
            .add_topic_with_defaults("Car Brand", &["BMW", "Audi", "Mercedes", "Toyota"])
            .unwrap();
        store
            .add_topic(
                "BMW Model Type",
                &["SUV", "Sedan", "Coupe"],
                &format!("{}==BMW", brand),
                crate::topic::DEFAULT_PROMPT_TEMPLATE,
            )
            .unwrap();
        store
    }

    fn engine_with(backend: Arc<FakeBackend>) -> ClassificationEngine {
        ClassificationEngine::new(car_store(), Box::new(Shared(backend)))
    }

    #[test]
    fn test_condition_met_scores_dependent_topic() {
        let backend = keyword_backend();
        let mut engine = engine_with(backend.clone());

        let result = engine
            .classify("The new BMW X5 SUV has a powerful engine.", ClassifyOptions::default())
            .unwrap();

        assert_eq!(result.answers, vec!["BMW", "SUV"]);
        assert_eq!(result.confidences.len(), 2);
        assert_eq!(backend.call_count(), 2);
        assert!(result.outcomes.iter().all(TopicOutcome::is_scored));
    }

    #[test]
    fn test_condition_unmet_skips_dependent_topic() {
        let backend = keyword_backend();
        let mut engine = engine_with(backend.clone());

        let result = engine
            .classify("The Audi A4 is a popular sedan.", ClassifyOptions::default())
            .unwrap();

        assert_eq!(result.answers, vec!["Audi", ""]);
        assert_eq!(result.confidences.len(), 1);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(
            result.outcomes[1],
            TopicOutcome::Skipped {
                topic_id: "T2".to_string(),
                reason: SkipReason::NotSatisfied
            }
        );
        assert!(!engine.previous_results().contains_key("T2"));
    }

    #[test]
    fn test_previous_results_reset_between_calls() {
        let mut engine = engine_with(keyword_backend());
        engine.classify("A BMW coupe", ClassifyOptions::default()).unwrap();
        assert!(engine.previous_results().contains_key("T2"));

        engine.classify("An Audi", ClassifyOptions::default()).unwrap();
        assert!(!engine.previous_results().contains_key("T2"));
        assert_eq!(engine.previous_results().len(), 1);
    }

    #[test]
    fn test_prompt_rendering_reaches_backend() {
        let backend = keyword_backend();
        let mut engine = engine_with(backend.clone());
        engine.classify("A BMW coupe", ClassifyOptions::default()).unwrap();

        let prompts = backend.prompts();
        assert!(prompts[0].contains("'Car Brand'"));
        assert!(prompts[0].contains("['BMW','Audi','Mercedes','Toyota']"));
        assert!(prompts[0].contains("'A BMW coupe'"));
        assert!(prompts[1].contains("['SUV','Sedan','Coupe']"));
    }

    #[test]
    fn test_unresolved_dependency_is_distinct() {
        let mut store = TopicStore::new();
        store
            .add_topic("Orphan", &["X"], "T9==X", crate::topic::DEFAULT_PROMPT_TEMPLATE)
            .unwrap();
        let mut engine = ClassificationEngine::new(store, Box::new(FakeBackend::always("X", Confidence::NoScore)));

        let result = engine.classify("text", ClassifyOptions::default()).unwrap();
        assert_eq!(result.answers, vec![""]);
        assert_eq!(
            result.outcomes[0],
            TopicOutcome::Skipped {
                topic_id: "T1".to_string(),
                reason: SkipReason::UnresolvedDependency("T9".to_string())
            }
        );
    }

    #[test]
    fn test_invalid_condition_skips_topic() {
        let mut store = TopicStore::new();
        store
            .add_topic("Broken", &["X"], "T1 is X", crate::topic::DEFAULT_PROMPT_TEMPLATE)
            .unwrap();
        let mut engine = ClassificationEngine::new(store, Box::new(FakeBackend::always("X", Confidence::NoScore)));

        let result = engine.classify("text", ClassifyOptions::default()).unwrap();
        assert!(matches!(
            &result.outcomes[0],
            TopicOutcome::Skipped { reason: SkipReason::InvalidCondition(_), .. }
        ));
        assert!(result.confidences.is_empty());
    }

    #[test]
    fn test_undefined_answer_records_no_category() {
        let backend = Arc::new(FakeBackend::always("undefined", Confidence::NoScore));
        let mut engine = engine_with(backend);

        let result = engine.classify("???", ClassifyOptions::default()).unwrap();
        assert_eq!(result.answers, vec!["undefined", ""]);
        assert_eq!(result.confidences, vec![Confidence::NoScore]);
        assert_eq!(engine.previous_results().get("T1"), Some(&None));
    }

    #[test]
    fn test_backend_error_aborts() {
        let backend = Arc::new(FakeBackend::always_error(BackendError::Timeout(30)));
        let mut engine = engine_with(backend);

        let err = engine.classify("text", ClassifyOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::Backend {
                topic_id: "T1".to_string(),
                source: BackendError::Timeout(30)
            }
        );
    }

    #[test]
    fn test_ground_truth_drives_conditions() {
        let backend = keyword_backend();
        let mut engine = engine_with(backend.clone());
        let row: Vec<String> = ["An Audi A4", "BMW", "Sedan"].iter().map(|s| s.to_string()).collect();

        let result = engine
            .classify("An Audi A4", ClassifyOptions::default().with_ground_truth(&row))
            .unwrap();

        // Scoring still picks Audi, but the gate follows the ground truth label
        assert_eq!(result.answers[0], "Audi");
        assert!(result.outcomes[1].is_scored());
        assert_eq!(backend.call_count(), 2);

        let sedan = engine.store().topic("T2").unwrap().category_by_name("Sedan").unwrap().id.clone();
        assert_eq!(engine.previous_results().get("T2"), Some(&Some(sedan)));
    }

    #[test]
    fn test_short_ground_truth_row_rejected() {
        let mut engine = engine_with(keyword_backend());
        let row = vec!["text".to_string(), "BMW".to_string()];
        let err = engine
            .classify("text", ClassifyOptions::default().with_ground_truth(&row))
            .unwrap_err();
        assert_eq!(err, ClassifyError::GroundTruthTooShort { expected: 3, actual: 2 });
    }

    #[test]
    fn test_empty_condition_always_scored() {
        let backend = Arc::new(FakeBackend::always("Toyota", Confidence::Score(0.4)));
        let mut engine = engine_with(backend);
        engine.store_mut().add_topic_with_defaults("Color", &["Red", "Blue"]).unwrap();

        let result = engine.classify("text", ClassifyOptions::default()).unwrap();
        assert!(result.outcomes[0].is_scored());
        assert!(!result.outcomes[1].is_scored());
        assert!(result.outcomes[2].is_scored());
        assert_eq!(result.confidences.len(), 2);
    }

    #[test]
    fn test_topic_without_categories_still_prompted() {
        let backend = keyword_backend();
        let mut store = TopicStore::new();
        store.add_topic_with_defaults::<&str>("Empty", &[]).unwrap();
        let mut engine = ClassificationEngine::new(store, Box::new(Shared(backend.clone())));

        let result = engine.classify("text", ClassifyOptions::default()).unwrap();
        assert_eq!(result.answers, vec![""]);
        assert!(backend.prompts()[0].contains("'[]'"));
    }

    #[test]
    fn test_cancelled_before_first_topic() {
        let backend = keyword_backend();
        let mut engine = engine_with(backend.clone());
        engine.cancellation_token().cancel();

        assert_eq!(
            engine.classify("BMW", ClassifyOptions::default()).unwrap_err(),
            ClassifyError::Cancelled
        );
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_remove_all_topics_clears_results() {
        let mut engine = engine_with(keyword_backend());
        engine.classify("BMW", ClassifyOptions::default()).unwrap();
        engine.remove_all_topics();
        assert!(engine.previous_results().is_empty());
        assert!(engine.store().is_empty());
    }
}
