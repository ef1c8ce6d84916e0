//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gclass topic classifier CLI
#[derive(Parser)]
#[command(name = "gclassctl")]
#[command(about = "Rule-driven multi-topic text classifier", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Topic file (JSON snapshot)
    #[arg(long, global = true, default_value = "topics.json")]
    pub topics: PathBuf,

    /// Config file (overrides $GCLASS_CONFIG and ./gclass.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// List topics and their categories
    Show,

    /// Print dataset column headers
    Header,

    /// Add a topic
    AddTopic {
        #[arg(long)]
        name: String,

        /// Category name (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Gating condition, e.g. "T1==BMW"
        #[arg(long, default_value = "")]
        condition: String,

        /// Prompt template with [TOPIC], [CATEGORIES] and [TEXT] placeholders
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Remove a topic
    RemoveTopic { topic_id: String },

    /// Add a category to a topic
    AddCategory {
        topic_id: String,
        name: String,

        #[arg(long, default_value = "")]
        condition: String,
    },

    /// Remove a category from a topic
    RemoveCategory { topic_id: String, category_id: String },

    /// Replace a topic's prompt template
    SetPrompt { topic_id: String, prompt: String },

    /// Set the condition of a topic, or of one of its categories
    SetCondition {
        topic_id: String,
        condition: String,

        #[arg(long)]
        category: Option<String>,
    },

    /// Clear the condition of a topic, or of one of its categories
    ClearCondition {
        topic_id: String,

        #[arg(long)]
        category: Option<String>,
    },

    /// Remove every topic and restart numbering
    Clear,

    /// Classify one text
    Classify {
        text: String,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Measure accuracy over a labelled dataset (JSON lines, one array per row)
    Evaluate { dataset: PathBuf },
}
