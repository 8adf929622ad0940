//! Playbook definition loading.

use std::path::Path;

use common::errors::{AppError, AppResult};
use common::models::playbook::Playbook;
use serde::Deserialize;
use validator::Validate;

/// Accepted top-level shapes of a playbook file.
#[derive(Deserialize)]
#[serde(untagged)]
enum PlaybookFile {
    List(Vec<serde_json::Value>),
    Wrapped { playbooks: Vec<serde_json::Value> },
}

/// Parses playbook definitions from JSON text.
///
/// The document is either a list of playbooks or an object with a
/// `playbooks` list. Entries that fail to deserialize or validate are
/// skipped with a warning.
///
/// # Errors
/// Returns `AppError::PlaybookConfig` when the document itself is malformed.
pub fn parse_playbooks(text: &str) -> AppResult<Vec<Playbook>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries = match serde_json::from_str::<PlaybookFile>(text) {
        Ok(PlaybookFile::List(entries)) | Ok(PlaybookFile::Wrapped { playbooks: entries }) => entries,
        Err(e) => return Err(AppError::PlaybookConfig(e.to_string())),
    };

    let mut playbooks = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let playbook: Playbook = match serde_json::from_value(entry) {
            Ok(playbook) => playbook,
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping malformed playbook");
                continue;
            }
        };
        if let Err(e) = playbook.validate() {
            tracing::warn!(index, playbook = %playbook.name, error = %e, "Skipping invalid playbook");
            continue;
        }
        playbooks.push(playbook);
    }
    Ok(playbooks)
}

/// Reads and parses the playbook file at `path`.
pub fn read_playbooks(path: impl AsRef<Path>) -> AppResult<Vec<Playbook>> {
    let text = std::fs::read_to_string(path)?;
    parse_playbooks(&text)
}

/// Loads playbooks from `path`. Any failure is logged and yields an empty
/// list so that monitoring keeps running without playbooks.
pub fn load_playbooks(path: impl AsRef<Path>) -> Vec<Playbook> {
    let path = path.as_ref();
    match read_playbooks(path) {
        Ok(playbooks) => {
            tracing::info!(
                path = %path.display(),
                total = playbooks.len(),
                enabled = playbooks.iter().filter(|p| p.enabled).count(),
                "Playbooks loaded"
            );
            playbooks
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Could not load playbook file");
            Vec::new()
        }
    }
}
