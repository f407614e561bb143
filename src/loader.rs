//! Content input: authored JSON documents -> validated templates
//!
//! Loading fails closed per document: one malformed or invalid file is
//! rejected and reported with its id and reason, siblings are unaffected.

use crate::capability::ActionRegistry;
use crate::model::validate::{validate_structure, ValidationError, ValidationResult};
use crate::model::{DialogueTemplate, InstancedAction};
use crate::registry::DialogueRegistry;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why one template document was rejected.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not parse dialogue document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("dialogue failed validation: {0}")]
    Validation(ValidationError),
    #[error("dialogue references unregistered action type \"{0}\"")]
    UnknownActionKind(String),
    #[error("could not read dialogue file: {0}")]
    Io(#[from] std::io::Error),
}

/// One rejected document, reported alongside the successfully loaded rest.
#[derive(Debug)]
pub struct LoadFailure {
    pub id: String,
    pub error: LoadError,
}

/// Result of loading a content directory.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub templates: Vec<(String, DialogueTemplate)>,
    pub failures: Vec<LoadFailure>,
}

impl LoadOutcome {
    pub fn into_registry(self) -> DialogueRegistry {
        DialogueRegistry::from_entries(self.templates)
    }
}

/// Parse and validate one dialogue document.
///
/// Gate order matches load-time responsibilities: JSON shape, then action
/// kinds against the registry (an unregistered side effect must never reach a
/// running session), then graph structure. Warnings are surfaced to the
/// operator via the log and do not reject the template.
pub fn parse_template(
    id: &str,
    source: &str,
    actions: &ActionRegistry,
) -> Result<DialogueTemplate, LoadError> {
    let template: DialogueTemplate = serde_json::from_str(source)?;

    if let Some(kind) = first_unknown_action_kind(&template, actions) {
        return Err(LoadError::UnknownActionKind(kind));
    }

    match validate_structure(&template) {
        ValidationResult::Pass => {}
        ValidationResult::Warnings(warnings) => {
            for warning in warnings {
                tracing::warn!(dialogue = %id, %warning, "dialogue loaded with warnings");
            }
        }
        ValidationResult::Error(error) => return Err(LoadError::Validation(error)),
    }

    Ok(template)
}

fn first_unknown_action_kind(
    template: &DialogueTemplate,
    actions: &ActionRegistry,
) -> Option<String> {
    let check = |action: &InstancedAction| {
        if actions.contains(&action.kind) {
            None
        } else {
            Some(action.kind.clone())
        }
    };
    template
        .start_action
        .as_ref()
        .and_then(check)
        .or_else(|| {
            template
                .states
                .values()
                .filter_map(|state| state.action.as_ref())
                .find_map(check)
        })
}

/// Load every `*.json` document under `root`, recursively. Template ids are
/// the `/`-separated relative paths without the extension.
pub fn load_dir(root: &Path, actions: &ActionRegistry) -> std::io::Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();
    let mut files: Vec<PathBuf> = Vec::new();
    collect_json_files(root, &mut files)?;
    files.sort();

    for path in files {
        let id = template_id(root, &path);
        let loaded = std::fs::read_to_string(&path)
            .map_err(LoadError::from)
            .and_then(|source| parse_template(&id, &source, actions));
        match loaded {
            Ok(template) => outcome.templates.push((id, template)),
            Err(error) => {
                tracing::error!(dialogue = %id, %error, "rejected dialogue document");
                outcome.failures.push(LoadFailure { id, error });
            }
        }
    }
    Ok(outcome)
}

fn collect_json_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(())
}

fn template_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
