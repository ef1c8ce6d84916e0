//! Constrained option scoring.
//!
//! Turns a language model's next-token distribution into a probability over a
//! small closed set of candidate labels. Candidates of different token lengths
//! become comparable because each gets its exact joint probability at the
//! answer position, and the result is normalized over the candidate set only.
//!
//! Forward passes:
//! - one shared pass over the prompt
//! - one pass per token for every candidate that is multi-token or shares its
//!   first token with another candidate
//!
//! A candidate that is a single token and alone in its first-token group is
//! read straight off the shared distribution. Every other candidate is chained
//! from the bare prompt, so its first pass repeats the shared one. Total cost
//! is `1 + sum(token count of chained candidates)`.

use crate::cancel::CancellationToken;
use std::collections::HashMap;
use tracing::debug;

/// Failure reported by a language model implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(pub String);

/// Next-token model used by the local backend.
///
/// Loading weights and running the network live outside this crate.
pub trait LanguageModel: Send + Sync {
    /// Token ids for `text`, without special tokens
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError>;

    /// Logits over the full vocabulary for the position after `context`
    fn next_token_logits(&self, context: &[u32]) -> Result<Vec<f32>, ModelError>;
}

/// Scorer errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScorerError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("No candidates to score")]
    NoCandidates,

    #[error("Model returned no logits")]
    EmptyLogits,

    #[error("Model returned non-finite logits")]
    InvalidLogits,

    #[error("Token {token} outside vocabulary of size {vocab_size}")]
    TokenOutOfRange { token: u32, vocab_size: usize },

    #[error("Scoring cancelled")]
    Cancelled,
}

/// Scores for one candidate set, in candidate order
#[derive(Debug, Clone, PartialEq)]
pub struct OptionScores {
    pub labels: Vec<String>,
    /// Probability of generating each label at the answer position
    pub raw: Vec<f64>,
    /// `raw` normalized over the candidate set (all zero if the raw total is zero)
    pub relative: Vec<f64>,
    pub best_index: usize,
    pub forward_passes: usize,
}

impl OptionScores {
    pub fn best_label(&self) -> &str {
        &self.labels[self.best_index]
    }

    pub fn best_relative(&self) -> f64 {
        self.relative[self.best_index]
    }
}

/// Numerically stable softmax in f64
pub fn softmax(logits: &[f32]) -> Result<Vec<f64>, ScorerError> {
    if logits.is_empty() {
        return Err(ScorerError::EmptyLogits);
    }

    let max = logits
        .iter()
        .map(|&l| l as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() || logits.iter().any(|l| l.is_nan()) {
        return Err(ScorerError::InvalidLogits);
    }

    let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

pub struct ConstrainedOptionScorer<'a, M: LanguageModel + ?Sized> {
    model: &'a M,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, M: LanguageModel + ?Sized> ConstrainedOptionScorer<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model, cancel: None }
    }

    /// Abort between forward passes once `cancel` is set
    pub fn with_cancellation(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn score(&self, prompt: &str, candidates: &[String]) -> Result<OptionScores, ScorerError> {
        if candidates.is_empty() {
            return Err(ScorerError::NoCandidates);
        }

        let separator = if prompt.ends_with(char::is_whitespace) { "" } else { " " };
        let encodings = candidates
            .iter()
            .map(|label| self.model.encode(&format!("{}{}", separator, label)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut group_sizes: HashMap<u32, usize> = HashMap::new();
        for tokens in &encodings {
            if let Some(&first) = tokens.first() {
                *group_sizes.entry(first).or_insert(0) += 1;
            }
        }

        let prompt_tokens = self.model.encode(prompt)?;
        let mut forward_passes = 0;
        let base = self.distribution(&prompt_tokens, &mut forward_passes)?;

        let mut raw = Vec::with_capacity(candidates.len());
        for tokens in &encodings {
            let probability = match tokens.as_slice() {
                [] => 0.0,
                [only] if group_sizes.get(only) == Some(&1) => probability_of(&base, *only)?,
                _ => self.sequence_probability(&prompt_tokens, tokens, &mut forward_passes)?,
            };
            raw.push(probability);
        }

        let total: f64 = raw.iter().sum();
        let relative: Vec<f64> = if total > 0.0 {
            raw.iter().map(|p| p / total).collect()
        } else {
            vec![0.0; raw.len()]
        };

        let mut best_index = 0;
        for (i, p) in raw.iter().enumerate() {
            if *p > raw[best_index] {
                best_index = i;
            }
        }

        debug!(
            "Scored {} candidates with {} forward passes, best '{}' ({:.4})",
            candidates.len(),
            forward_passes,
            candidates[best_index],
            relative[best_index]
        );

        Ok(OptionScores {
            labels: candidates.to_vec(),
            raw,
            relative,
            best_index,
            forward_passes,
        })
    }

    /// Joint probability of emitting `tokens` after the prompt, one pass per token
    fn sequence_probability(
        &self,
        prompt_tokens: &[u32],
        tokens: &[u32],
        forward_passes: &mut usize,
    ) -> Result<f64, ScorerError> {
        let mut context = prompt_tokens.to_vec();
        let mut log_probability = 0.0;

        for &token in tokens {
            let distribution = self.distribution(&context, forward_passes)?;
            let p = probability_of(&distribution, token)?;
            if p <= 0.0 {
                return Ok(0.0);
            }
            log_probability += p.ln();
            context.push(token);
        }

        Ok(log_probability.exp())
    }

    fn distribution(&self, context: &[u32], forward_passes: &mut usize) -> Result<Vec<f64>, ScorerError> {
        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(ScorerError::Cancelled);
        }
        *forward_passes += 1;
        softmax(&self.model.next_token_logits(context)?)
    }
}

fn probability_of(distribution: &[f64], token: u32) -> Result<f64, ScorerError> {
    distribution
        .get(token as usize)
        .copied()
        .ok_or(ScorerError::TokenOutOfRange {
            token,
            vocab_size: distribution.len(),
        })
}
