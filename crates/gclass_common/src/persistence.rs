//! Topic graph snapshots.
//!
//! A snapshot is a JSON array of topic records:
//!
//! ```json
//! [{"id": "T1", "topic_input": "Car Brand", "condition": "", "prompt": "...",
//!   "categories": [{"id": "...", "name": "BMW", "condition": ""}]}]
//! ```
//!
//! Missing fields load as empty strings. Loading resumes topic numbering after
//! the largest `T<digits>` id.

use crate::topic::Topic;
use crate::topic_store::TopicStore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn to_json(store: &TopicStore) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(store.topics())?)
}

pub fn from_json(json: &str) -> Result<TopicStore, PersistenceError> {
    let topics: Vec<Topic> = serde_json::from_str(json)?;
    Ok(TopicStore::from_topics(topics))
}

/// Write the snapshot atomically (temp file, then rename)
pub fn save_topics(store: &TopicStore, path: &Path) -> Result<(), PersistenceError> {
    let json = to_json(store)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json).map_err(io_error(&temp_path))?;
    fs::rename(&temp_path, path).map_err(io_error(path))?;

    info!("Topics saved to {}", path.display());
    Ok(())
}

pub fn load_topics(path: &Path) -> Result<TopicStore, PersistenceError> {
    let json = fs::read_to_string(path).map_err(io_error(path))?;
    let store = from_json(&json)?;
    info!("Loaded {} topics from {}", store.len(), path.display());
    Ok(store)
}
