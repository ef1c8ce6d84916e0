//! gclass common - rule-driven multi-topic text classification
//!
//! Topics are evaluated in creation order. Each topic has a closed category
//! vocabulary and may be gated on the category chosen for an earlier topic in
//! the same pass. Answers come from a `ScoringBackend`: a cloud chat model
//! matched against the candidates, or a local model scored over the candidate
//! set with `ConstrainedOptionScorer`.

pub mod cancel;
pub mod condition;
pub mod config;
pub mod engine;
pub mod evaluation;
pub mod persistence;
pub mod scorer;
pub mod scoring_backend;
pub mod topic;
pub mod topic_store;

pub use cancel::CancellationToken;
pub use condition::{Condition, ConditionError, ConditionOutcome, PreviousResults};
pub use config::{BackendConfig, BackendKind, ClassifierConfig, ClassifySettings, ConfigError, Provider};
pub use engine::{Classification, ClassificationEngine, ClassifyError, ClassifyOptions, SkipReason, TopicOutcome};
pub use evaluation::{evaluate, EvaluationReport, TopicAccuracy};
pub use persistence::{load_topics, save_topics, PersistenceError};
pub use scorer::{ConstrainedOptionScorer, LanguageModel, ModelError, OptionScores, ScorerError};
pub use scoring_backend::{
    backend_from_config, Answer, BackendError, CloudBackend, Confidence, FakeBackend, LocalBackend,
    ScoringBackend, UNDEFINED_ANSWER,
};
pub use topic::{Category, CategoryId, Topic, TopicId, DEFAULT_PROMPT_TEMPLATE};
pub use topic_store::{StoreError, TopicStore};
