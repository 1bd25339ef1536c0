use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Used when no question file is given.
pub const DEFAULT_QUESTIONS: &[&str] = &[
    "Tell me about a technically challenging project you worked on recently.",
    "How do you approach debugging a problem you cannot reproduce locally?",
    "Describe a time you disagreed with a design decision. What did you do?",
];

pub fn default_questions() -> Vec<String> {
    DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

/// Loads the main questions for an interview.
///
/// A `.json` file must hold an array of strings. Anything else is read as
/// plain text with one question per line; blank lines and lines starting with
/// `#` are skipped.
pub fn load_questions(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read question file: {}", path.display()))?;

    let questions: Vec<String> = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Question file is not a JSON string array: {}", path.display()))?
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    let questions: Vec<String> = questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if questions.is_empty() {
        tracing::warn!(
            "{} contains no questions; the interview ends after the introduction.",
            path.display()
        );
    }
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_one_question_per_line() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("backend.txt");
        fs::write(
            &path,
            "# backend round\nWhat is a race condition?\n\n  How would you shard a table?  \n",
        )?;

        let questions = load_questions(&path)?;
        assert_eq!(
            questions,
            vec!["What is a race condition?", "How would you shard a table?"]
        );
        Ok(())
    }

    #[test]
    fn reads_json_array() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("questions.json");
        fs::write(&path, r#"["Explain CAP.", " ", "What is idempotency?"]"#)?;

        assert_eq!(
            load_questions(&path)?,
            vec!["Explain CAP.", "What is idempotency?"]
        );
        Ok(())
    }

    #[test]
    fn rejects_malformed_json_and_missing_files() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("questions.json");
        fs::write(&path, r#"{"questions": []}"#)?;
        assert!(load_questions(&path).is_err());
        assert!(load_questions(&dir.path().join("missing.txt")).is_err());
        Ok(())
    }

    #[test]
    fn defaults_are_not_empty() {
        assert_eq!(default_questions().len(), DEFAULT_QUESTIONS.len());
    }
}
