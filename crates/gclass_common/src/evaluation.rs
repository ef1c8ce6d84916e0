//! Accuracy of the engine against labelled rows.
//!
//! Rows are laid out like `TopicStore::header_list`: the text first, then one
//! expected label per topic. Each row is classified in ground-truth mode, so
//! gating follows the expected labels rather than earlier predictions.

use crate::engine::{ClassificationEngine, ClassifyError, ClassifyOptions};
use crate::topic::TopicId;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAccuracy {
    pub topic_id: TopicId,
    pub name: String,
    pub correct: usize,
    /// Rows where the topic was scored or a label was expected
    pub total: usize,
}

impl TopicAccuracy {
    pub fn accuracy(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.correct as f64 / self.total as f64)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub rows: usize,
    pub topics: Vec<TopicAccuracy>,
}

impl EvaluationReport {
    /// Correct decisions over all counted decisions
    pub fn overall(&self) -> Option<f64> {
        let correct: usize = self.topics.iter().map(|t| t.correct).sum();
        let total: usize = self.topics.iter().map(|t| t.total).sum();
        if total == 0 {
            None
        } else {
            Some(correct as f64 / total as f64)
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rows evaluated: {}", self.rows)?;
        for topic in &self.topics {
            match topic.accuracy() {
                Some(acc) => writeln!(
                    f,
                    "  {} ({}): {}/{} = {:.1}%",
                    topic.name,
                    topic.topic_id,
                    topic.correct,
                    topic.total,
                    acc * 100.0
                )?,
                None => writeln!(f, "  {} ({}): no decisions", topic.name, topic.topic_id)?,
            }
        }
        if let Some(overall) = self.overall() {
            writeln!(f, "Overall: {:.1}%", overall * 100.0)?;
        }
        Ok(())
    }
}

pub fn evaluate(
    engine: &mut ClassificationEngine,
    rows: &[Vec<String>],
    constrained_output: bool,
) -> Result<EvaluationReport, ClassifyError> {
    let mut topics: Vec<TopicAccuracy> = engine
        .store()
        .topics()
        .iter()
        .map(|t| TopicAccuracy {
            topic_id: t.id.clone(),
            name: t.name.clone(),
            correct: 0,
            total: 0,
        })
        .collect();

    for row in rows {
        let text = row.first().map(String::as_str).unwrap_or("");
        let options = ClassifyOptions {
            single_mode: false,
            constrained_output,
            ground_truth: Some(row.as_slice()),
        };
        let classification = engine.classify(text, options)?;

        for (i, (tally, outcome)) in topics.iter_mut().zip(&classification.outcomes).enumerate() {
            let expected = row[i + 1].as_str();
            if !outcome.is_scored() && expected.is_empty() {
                continue;
            }
            tally.total += 1;
            if classification.answers[i] == expected {
                tally.correct += 1;
            }
        }
    }

    let report = EvaluationReport {
        rows: rows.len(),
        topics,
    };
    info!("Evaluated {} rows, overall accuracy {:?}", report.rows, report.overall());
    Ok(report)
}
