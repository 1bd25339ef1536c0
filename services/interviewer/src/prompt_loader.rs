use anyhow::{Context, Result};
use interview_core::reviewer::{EVALUATE_PROMPT_KEY, FOLLOW_UP_PROMPT_KEY};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reads every `*.md` file in `dir_path` into a map keyed by file stem.
///
/// Blank files are skipped so the reviewer falls back to its built-in
/// template instead of sending an empty prompt.
pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }

        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Could not get file stem for prompt file")?
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

        if content.trim().is_empty() {
            tracing::warn!("Prompt file {} is empty; using the default.", path.display());
            continue;
        }
        if key != EVALUATE_PROMPT_KEY && key != FOLLOW_UP_PROMPT_KEY {
            tracing::debug!("Loaded prompt '{}' which no reviewer uses.", key);
        }
        prompts.insert(key, content);
    }

    Ok(prompts)
}
