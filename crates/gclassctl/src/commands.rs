//! Command handlers for gclassctl.
//!
//! Every editing command loads the topic file, applies one change and saves
//! it back. A missing topic file is treated as an empty topic graph.

use anyhow::{bail, Context as _, Result};
use gclass_common::{
    backend_from_config, evaluate as evaluate_rows, load_topics, save_topics, Classification,
    ClassificationEngine, ClassifierConfig, ClassifyOptions, Condition, Confidence, TopicOutcome,
    TopicStore, DEFAULT_PROMPT_TEMPLATE,
};
use owo_colors::OwoColorize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Paths shared by all commands
pub struct Context {
    topics_path: PathBuf,
    config_path: Option<PathBuf>,
}

impl Context {
    pub fn new(topics_path: PathBuf, config_path: Option<PathBuf>) -> Self {
        Self {
            topics_path,
            config_path,
        }
    }

    fn load_store(&self) -> Result<TopicStore> {
        if !self.topics_path.exists() {
            debug!("No topic file at {}, starting empty", self.topics_path.display());
            return Ok(TopicStore::new());
        }
        load_topics(&self.topics_path)
            .with_context(|| format!("Failed to load topics from {}", self.topics_path.display()))
    }

    fn save_store(&self, store: &TopicStore) -> Result<()> {
        save_topics(store, &self.topics_path)
            .with_context(|| format!("Failed to save topics to {}", self.topics_path.display()))
    }

    /// Load, edit, save
    fn edit<T>(&self, f: impl FnOnce(&mut TopicStore) -> Result<T>) -> Result<T> {
        let mut store = self.load_store()?;
        let value = f(&mut store)?;
        self.save_store(&store)?;
        Ok(value)
    }

    fn load_config(&self) -> Result<ClassifierConfig> {
        let config = match &self.config_path {
            Some(path) => ClassifierConfig::load(path)?,
            None => ClassifierConfig::load_default()?,
        };
        Ok(config)
    }

    fn engine(&self, config: &ClassifierConfig) -> Result<ClassificationEngine> {
        let store = self.load_store()?;
        let backend = backend_from_config(&config.backend).context("Failed to build scoring backend")?;
        info!("Using {} backend with {} topics", backend.name(), store.len());
        Ok(ClassificationEngine::new(store, backend))
    }
}

pub fn show(ctx: &Context) -> Result<()> {
    let store = ctx.load_store()?;
    print!("{}", store);
    Ok(())
}

pub fn header(ctx: &Context) -> Result<()> {
    let store = ctx.load_store()?;
    println!("{}", serde_json::to_string(&store.header_list())?);
    Ok(())
}

pub fn add_topic(
    ctx: &Context,
    name: &str,
    categories: &[String],
    condition: &str,
    prompt: Option<&str>,
) -> Result<()> {
    check_condition(condition)?;
    let prompt = prompt.unwrap_or(DEFAULT_PROMPT_TEMPLATE);
    let id = ctx.edit(|store| Ok(store.add_topic(name, categories, condition, prompt)?))?;
    println!("{} Topic '{}' added with ID {}", "[OK]".green(), name, id.bold());
    Ok(())
}

pub fn remove_topic(ctx: &Context, topic_id: &str) -> Result<()> {
    let removed = ctx.edit(|store| Ok(store.remove_topic(topic_id)?))?;
    println!("{} Topic '{}' ({}) removed", "[OK]".green(), removed.name, topic_id);
    Ok(())
}

pub fn add_category(ctx: &Context, topic_id: &str, name: &str, condition: &str) -> Result<()> {
    check_condition(condition)?;
    let id = ctx.edit(|store| Ok(store.add_category(topic_id, name, condition)?))?;
    println!("{} Category '{}' added to {} with ID {}", "[OK]".green(), name, topic_id, id.dimmed());
    Ok(())
}

pub fn remove_category(ctx: &Context, topic_id: &str, category_id: &str) -> Result<()> {
    let removed = ctx.edit(|store| Ok(store.remove_category(topic_id, category_id)?))?;
    println!("{} Category '{}' removed from {}", "[OK]".green(), removed.name, topic_id);
    Ok(())
}

pub fn set_prompt(ctx: &Context, topic_id: &str, prompt: &str) -> Result<()> {
    ctx.edit(|store| Ok(store.set_prompt(topic_id, prompt)?))?;
    println!("{} Prompt updated for {}", "[OK]".green(), topic_id);
    Ok(())
}

/// Set or clear (empty `condition`) a topic or category condition
pub fn set_condition(ctx: &Context, topic_id: &str, category_id: Option<&str>, condition: &str) -> Result<()> {
    check_condition(condition)?;
    ctx.edit(|store| {
        match category_id {
            Some(category_id) => store.set_category_condition(topic_id, category_id, condition)?,
            None => store.set_topic_condition(topic_id, condition)?,
        }
        Ok(())
    })?;

    let target = match category_id {
        Some(category_id) => format!("category {} of {}", category_id, topic_id),
        None => format!("topic {}", topic_id),
    };
    if condition.is_empty() {
        println!("{} Condition cleared for {}", "[OK]".green(), target);
    } else {
        println!("{} Condition for {} set to {}", "[OK]".green(), target, condition.cyan());
    }
    Ok(())
}

pub fn clear(ctx: &Context) -> Result<()> {
    ctx.edit(|store| {
        store.remove_all_topics();
        Ok(())
    })?;
    println!("{} All topics removed", "[OK]".green());
    Ok(())
}

pub fn classify(ctx: &Context, text: &str, as_json: bool) -> Result<()> {
    let config = ctx.load_config()?;
    let mut engine = ctx.engine(&config)?;

    let classification = engine.classify(text, ClassifyOptions::from(&config.classify))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&classification_json(engine.store(), &classification))?);
    } else {
        print_classification(engine.store(), &classification);
    }
    Ok(())
}

pub fn evaluate(ctx: &Context, dataset: &Path) -> Result<()> {
    let config = ctx.load_config()?;
    let mut engine = ctx.engine(&config)?;
    let rows = read_dataset(dataset)?;

    let report = evaluate_rows(&mut engine, &rows, config.classify.constrained_output)?;
    print!("{}", report);
    Ok(())
}

/// Empty is allowed; anything else must be `T<n>==<category>`
fn check_condition(condition: &str) -> Result<()> {
    if !condition.is_empty() {
        Condition::parse(condition).with_context(|| format!("Invalid condition '{}'", condition))?;
    }
    Ok(())
}

/// One JSON array of strings per non-blank line
fn read_dataset(path: &Path) -> Result<Vec<Vec<String>>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read dataset {}", path.display()))?;

    let mut rows = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: Vec<String> = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: expected a JSON array of strings", path.display(), number + 1))?;
        if row.is_empty() {
            bail!("{}:{}: empty row", path.display(), number + 1);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn confidence_json(confidence: &Confidence) -> serde_json::Value {
    match confidence.value() {
        Some(value) => json!(value),
        None => serde_json::Value::Null,
    }
}

fn classification_json(store: &TopicStore, classification: &Classification) -> serde_json::Value {
    let topics: Vec<serde_json::Value> = store
        .topics()
        .iter()
        .zip(&classification.outcomes)
        .map(|(topic, outcome)| match outcome {
            TopicOutcome::Scored { answer, category_id, .. } => json!({
                "topic_id": topic.id,
                "topic": topic.name,
                "answer": answer.label,
                "category_id": category_id,
                "confidence": confidence_json(&answer.confidence),
            }),
            TopicOutcome::Skipped { reason, .. } => json!({
                "topic_id": topic.id,
                "topic": topic.name,
                "answer": "",
                "skipped": format!("{:?}", reason),
            }),
        })
        .collect();

    json!({
        "answers": classification.answers,
        "confidences": classification.confidences.iter().map(confidence_json).collect::<Vec<_>>(),
        "topics": topics,
    })
}

fn print_classification(store: &TopicStore, classification: &Classification) {
    for (topic, outcome) in store.topics().iter().zip(&classification.outcomes) {
        match outcome {
            TopicOutcome::Scored { answer, category_id, .. } => {
                let label = if category_id.is_some() {
                    answer.label.bright_green().to_string()
                } else {
                    answer.label.yellow().to_string()
                };
                println!("{:<6} {:<24} {}  ({})", topic.id, topic.name, label, answer.confidence);
            }
            TopicOutcome::Skipped { .. } => {
                println!(
                    "{:<6} {:<24} {}",
                    topic.id,
                    topic.name,
                    format!("skipped ({})", topic.condition).dimmed()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gclass_common::{Answer, FakeBackend};
    use tempfile::tempdir;

    fn context(dir: &Path) -> Context {
        Context::new(dir.join("topics.json"), Some(dir.join("gclass.toml")))
    }

    #[test]
    fn test_missing_topic_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = context(dir.path()).load_store().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_edits_persist_between_commands() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());

        add_topic(&ctx, "Car Brand", &["BMW".to_string(), "Audi".to_string()], "", None).unwrap();
        add_topic(&ctx, "BMW Model Type", &["SUV".to_string()], "T1==BMW", None).unwrap();
        set_prompt(&ctx, "T2", "Pick one of [CATEGORIES] for [TEXT]").unwrap();

        let store = ctx.load_store().unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.topic("T2").unwrap().condition, "T1==BMW");
        assert_eq!(store.topic("T2").unwrap().prompt, "Pick one of [CATEGORIES] for [TEXT]");

        set_condition(&ctx, "T2", None, "").unwrap();
        assert_eq!(ctx.load_store().unwrap().topic("T2").unwrap().condition, "");
    }

    #[test]
    fn test_invalid_condition_rejected_before_save() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());

        let err = add_topic(&ctx, "Broken", &[], "T1 is BMW", None).unwrap_err();
        assert!(err.to_string().contains("Invalid condition"));
        assert!(!dir.path().join("topics.json").exists());
    }

    #[test]
    fn test_unknown_topic_is_an_error() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        assert!(remove_topic(&ctx, "T7").is_err());
    }

    #[test]
    fn test_clear_restarts_numbering() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        add_topic(&ctx, "A", &[], "", None).unwrap();
        add_topic(&ctx, "B", &[], "", None).unwrap();
        clear(&ctx).unwrap();
        add_topic(&ctx, "C", &[], "", None).unwrap();

        let store = ctx.load_store().unwrap();
        assert_eq!(store.topics()[0].id, "T1");
    }

    #[test]
    fn test_read_dataset_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        fs::write(&path, "[\"bmw text\", \"BMW\"]\n\n[\"audi text\", \"Audi\"]\n").unwrap();

        let rows = read_dataset(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["audi text", "Audi"]);
    }

    #[test]
    fn test_read_dataset_reports_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        fs::write(&path, "[\"ok\"]\n{\"not\": \"a row\"}\n").unwrap();

        let err = read_dataset(&path).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_think_steps_in_config_fail_classify() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        fs::write(dir.path().join("gclass.toml"), "[backend]\nthink_steps = 2\n").unwrap();
        add_topic(&ctx, "Car Brand", &["BMW".to_string()], "", None).unwrap();

        let err = classify(&ctx, "BMW X5", false).unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported scoring mode"));
    }

    #[test]
    fn test_classification_json_shape() {
        let mut store = TopicStore::new();
        store.add_topic_with_defaults("Car Brand", &["BMW", "Audi"]).unwrap();
        store
            .add_topic("Model", &["SUV"], "T1==Audi", DEFAULT_PROMPT_TEMPLATE)
            .unwrap();
        let backend = FakeBackend::answering(|_, _| Ok(Answer::new("BMW", Confidence::Score(0.75))));
        let mut engine = ClassificationEngine::new(store, Box::new(backend));

        let classification = engine.classify("BMW X5", ClassifyOptions::default()).unwrap();
        let value = classification_json(engine.store(), &classification);

        assert_eq!(value["answers"], json!(["BMW", ""]));
        assert_eq!(value["confidences"], json!([0.75]));
        assert_eq!(value["topics"][0]["topic"], "Car Brand");
        assert!(value["topics"][1]["skipped"].is_string());
    }
}
