use crate::turn::Turn;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use std::path::PathBuf;

/// Result of persisting a finished interview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub success: bool,
    /// Where to send the user next: a route, a record id or a file path.
    pub location: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn finalize(&self, transcript: &[Turn]) -> Result<FinalizeOutcome>;
}

/// Writes each finished transcript as a pretty-printed JSON document.
pub struct JsonFileFinalizer {
    dir: PathBuf,
}

#[derive(Serialize)]
struct FeedbackRecord<'a> {
    created_at: chrono::DateTime<Utc>,
    turn_count: usize,
    transcript: &'a [Turn],
}

impl JsonFileFinalizer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Finalizer for JsonFileFinalizer {
    async fn finalize(&self, transcript: &[Turn]) -> Result<FinalizeOutcome> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create feedback dir: {}", self.dir.display()))?;

        let created_at = Utc::now();
        let path = self.dir.join(format!(
            "interview-{}.json",
            created_at.format("%Y%m%dT%H%M%S%.3f")
        ));
        let record = FeedbackRecord {
            created_at,
            turn_count: transcript.len(),
            transcript,
        };
        let body = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write feedback file: {}", path.display()))?;

        tracing::info!("Saved interview transcript to {}", path.display());
        Ok(FinalizeOutcome {
            success: true,
            location: path.display().to_string(),
        })
    }
}
