pub mod config;
pub mod prompt_loader;
pub mod questions;
pub mod terminal;

use crate::config::{Config, ConfigError, ReviewerProvider};
use interview_core::offline_reviewer::OfflineReviewer;
use interview_core::reviewer::{Evaluator, FollowUpGenerator, ReviewerClient};
use interview_core::session::SessionSnapshot;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;

/// The answer reviewers selected by `REVIEWER_PROVIDER`.
pub struct Reviewers {
    pub evaluator: Arc<dyn Evaluator>,
    pub follow_up: Arc<dyn FollowUpGenerator>,
}

pub fn reviewers_from_config(
    config: &Config,
    prompts: HashMap<String, String>,
) -> Result<Reviewers, ConfigError> {
    match config.provider {
        ReviewerProvider::OpenAI => {
            let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
                ConfigError::MissingVar("OPENAI_API_KEY must be set for openai provider".to_string())
            })?;
            let client = Arc::new(
                ReviewerClient::new(
                    SecretString::from(api_key.expose_secret().to_string()),
                    config.chat_model.clone(),
                    prompts,
                )
                .with_base_url(config.openai_base_url.as_str()),
            );
            tracing::info!("Reviewing answers with {} at {}", config.chat_model, config.openai_base_url);
            let evaluator: Arc<dyn Evaluator> = client.clone();
            let follow_up: Arc<dyn FollowUpGenerator> = client;
            Ok(Reviewers {
                evaluator,
                follow_up,
            })
        }
        ReviewerProvider::Offline => {
            tracing::info!("Reviewing answers offline.");
            let reviewer = Arc::new(OfflineReviewer::default());
            let evaluator: Arc<dyn Evaluator> = reviewer.clone();
            let follow_up: Arc<dyn FollowUpGenerator> = reviewer;
            Ok(Reviewers {
                evaluator,
                follow_up,
            })
        }
    }
}

/// One status line for a snapshot, e.g. `[Main 2/5 | 1:07] last score 72/100`.
pub fn status_line(snapshot: &SessionSnapshot) -> String {
    let mut line = format!(
        "[{:?} {}/{} | {}]",
        snapshot.phase,
        (snapshot.question_index + 1).min(snapshot.question_count.max(1)),
        snapshot.question_count,
        snapshot.elapsed_label()
    );
    if let Some(feedback) = &snapshot.pending_feedback {
        line.push_str(&format!(" last score {}/100: {}", feedback.score, feedback.feedback));
    }
    line
}
