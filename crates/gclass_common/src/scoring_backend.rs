//! Scoring backends.
//!
//! A backend maps a rendered prompt and a closed candidate list to one chosen
//! label plus a confidence. Two real implementations:
//! - `CloudBackend`: OpenAI-compatible chat completion, answer picked by
//!   case-insensitive substring match, no numeric confidence
//! - `LocalBackend`: constrained scoring over a `LanguageModel`
//!
//! `FakeBackend` replays scripted answers for tests.

use crate::cancel::CancellationToken;
use crate::config::{BackendConfig, BackendKind};
use crate::scorer::{ConstrainedOptionScorer, LanguageModel, ScorerError};
use regex::RegexBuilder;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Label returned when a free-text answer names none of the candidates
pub const UNDEFINED_ANSWER: &str = "undefined";

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Confidence attached to an answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Confidence {
    /// Relative probability of the chosen candidate
    Score(f64),
    /// The backend cannot produce a numeric score
    NoScore,
}

impl Confidence {
    pub fn value(&self) -> Option<f64> {
        match self {
            Confidence::Score(v) => Some(*v),
            Confidence::NoScore => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Score(v) => write!(f, "{:.4}", v),
            Confidence::NoScore => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub label: String,
    pub confidence: Confidence,
}

impl Answer {
    pub fn new(label: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Backend errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend returned empty response")]
    EmptyResponse,

    #[error("Unsupported scoring mode: {0}")]
    Unsupported(String),

    #[error("No candidates to choose from")]
    NoCandidates,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Scoring cancelled")]
    Cancelled,

    #[error("Backend configuration error: {0}")]
    Config(String),
}

impl From<ScorerError> for BackendError {
    fn from(e: ScorerError) -> Self {
        match e {
            ScorerError::NoCandidates => BackendError::NoCandidates,
            ScorerError::Cancelled => BackendError::Cancelled,
            other => BackendError::Model(other.to_string()),
        }
    }
}

/// Capability interface between the engine and a model
pub trait ScoringBackend: Send + Sync {
    /// Choose one of `candidates` for `prompt`.
    ///
    /// `constrained` asks for probability scoring restricted to the candidate
    /// set; backends that cannot honor a mode must return `Unsupported`.
    fn get_answer(
        &self,
        prompt: &str,
        candidates: &[String],
        constrained: bool,
    ) -> Result<Answer, BackendError>;

    fn name(&self) -> &str;
}

/// First candidate, in list order, found anywhere in `response` ignoring case
pub fn match_candidate<'a>(response: &str, candidates: &'a [String]) -> Option<&'a str> {
    candidates
        .iter()
        .find(|option| {
            RegexBuilder::new(&regex::escape(option))
                .case_insensitive(true)
                .build()
                .map(|re| re.is_match(response))
                .unwrap_or(false)
        })
        .map(String::as_str)
}

/// OpenAI-compatible chat completion backend
pub struct CloudBackend {
    config: BackendConfig,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl CloudBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let base_url = config
            .resolved_base_url()
            .map_err(|e| BackendError::Config(e.to_string()))?;
        let api_key = config.api_key();

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            base_url,
            api_key,
            client,
        })
    }

    fn chat(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.config.timeout_secs)
            } else {
                BackendError::Http(format!("Request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(BackendError::Http(format!(
                "HTTP {} from {}",
                response.status(),
                self.base_url
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        extract_message_content(&response_json)
    }
}

/// Pull `choices[0].message.content` out of a chat completion response
fn extract_message_content(response: &serde_json::Value) -> Result<String, BackendError> {
    response
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(BackendError::EmptyResponse)
}

impl ScoringBackend for CloudBackend {
    fn get_answer(
        &self,
        prompt: &str,
        candidates: &[String],
        _constrained: bool,
    ) -> Result<Answer, BackendError> {
        if self.config.think_steps > 0 {
            return Err(BackendError::Unsupported(format!(
                "reasoning with {} think steps",
                self.config.think_steps
            )));
        }

        let generated = self.chat(prompt)?;
        debug!("Cloud backend answered: {}", generated);

        let label = match_candidate(&generated, candidates).unwrap_or(UNDEFINED_ANSWER);
        Ok(Answer::new(label, Confidence::NoScore))
    }

    fn name(&self) -> &str {
        "cloud"
    }
}

/// Build the backend described by `config`.
///
/// Only the cloud backend can be built from configuration alone; a local
/// backend needs a `LanguageModel` and is constructed with `LocalBackend::new`.
pub fn backend_from_config(config: &BackendConfig) -> Result<Box<dyn ScoringBackend>, BackendError> {
    match config.kind {
        BackendKind::Cloud => Ok(Box::new(CloudBackend::new(config.clone())?)),
        BackendKind::Local => Err(BackendError::Config(
            "local backend requires an in-process language model".to_string(),
        )),
    }
}

/// Constrained scoring over a local next-token model
pub struct LocalBackend<M: LanguageModel> {
    model: M,
    think_steps: u32,
    cancel: Option<CancellationToken>,
}

impl<M: LanguageModel> LocalBackend<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            think_steps: 0,
            cancel: None,
        }
    }

    /// Request intermediate reasoning steps before answering
    pub fn with_think_steps(mut self, think_steps: u32) -> Self {
        self.think_steps = think_steps;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: LanguageModel> ScoringBackend for LocalBackend<M> {
    fn get_answer(
        &self,
        prompt: &str,
        candidates: &[String],
        constrained: bool,
    ) -> Result<Answer, BackendError> {
        if self.think_steps > 0 {
            return Err(BackendError::Unsupported(format!(
                "reasoning with {} think steps",
                self.think_steps
            )));
        }
        if !constrained {
            return Err(BackendError::Unsupported("free generation".to_string()));
        }

        let mut scorer = ConstrainedOptionScorer::new(&self.model);
        if let Some(cancel) = &self.cancel {
            scorer = scorer.with_cancellation(cancel);
        }
        let scores = scorer.score(prompt, candidates)?;

        Ok(Answer::new(
            scores.best_label(),
            Confidence::Score(scores.best_relative()),
        ))
    }

    fn name(&self) -> &str {
        "local"
    }
}

type Responder = Box<dyn Fn(&str, &[String]) -> Result<Answer, BackendError> + Send + Sync>;

/// Scripted backend for testing
pub struct FakeBackend {
    responder: Responder,
    prompts: Mutex<Vec<String>>,
}

impl FakeBackend {
    /// Replay `responses` in order; the last one repeats once the rest are used
    pub fn new(responses: Vec<Result<Answer, BackendError>>) -> Self {
        let queue = Mutex::new(responses);
        Self::answering(move |_, _| {
            let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
            match queue.len() {
                0 => Err(BackendError::EmptyResponse),
                1 => queue[0].clone(),
                _ => queue.remove(0),
            }
        })
    }

    /// Always answer with `label`
    pub fn always(label: &str, confidence: Confidence) -> Self {
        Self::new(vec![Ok(Answer::new(label, confidence))])
    }

    pub fn always_error(error: BackendError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Compute each answer from the prompt and candidates
    pub fn answering<F>(responder: F) -> Self
    where
        F: Fn(&str, &[String]) -> Result<Answer, BackendError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ScoringBackend for FakeBackend {
    fn get_answer(
        &self,
        prompt: &str,
        candidates: &[String],
        _constrained: bool,
    ) -> Result<Answer, BackendError> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).push(prompt.to_string());
        (self.responder)(prompt, candidates)
    }

    fn name(&self) -> &str {
        "fake"
    }
}
