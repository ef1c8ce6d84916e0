//! gclassctl - manage topic graphs and classify text from the command line

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::Context;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = Context::new(cli.topics, cli.config);

    match cli.command {
        Commands::Show => commands::show(&ctx),
        Commands::Header => commands::header(&ctx),
        Commands::AddTopic {
            name,
            categories,
            condition,
            prompt,
        } => commands::add_topic(&ctx, &name, &categories, &condition, prompt.as_deref()),
        Commands::RemoveTopic { topic_id } => commands::remove_topic(&ctx, &topic_id),
        Commands::AddCategory {
            topic_id,
            name,
            condition,
        } => commands::add_category(&ctx, &topic_id, &name, &condition),
        Commands::RemoveCategory {
            topic_id,
            category_id,
        } => commands::remove_category(&ctx, &topic_id, &category_id),
        Commands::SetPrompt { topic_id, prompt } => commands::set_prompt(&ctx, &topic_id, &prompt),
        Commands::SetCondition {
            topic_id,
            condition,
            category,
        } => commands::set_condition(&ctx, &topic_id, category.as_deref(), &condition),
        Commands::ClearCondition { topic_id, category } => {
            commands::set_condition(&ctx, &topic_id, category.as_deref(), "")
        }
        Commands::Clear => commands::clear(&ctx),
        Commands::Classify { text, json } => commands::classify(&ctx, &text, json),
        Commands::Evaluate { dataset } => commands::evaluate(&ctx, &dataset),
    }
}

/// RUST_LOG wins; otherwise -v/-vv raise the default warn level
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
