use crate::reviewer::{Evaluation, Evaluator, FollowUpGenerator};
use anyhow::Result;
use async_trait::async_trait;

/// A reviewer that never leaves the process.
///
/// Scores grow with the length of the answer and very short answers get one
/// clarifying follow-up. Useful for demos and for running the interview loop
/// without an API key.
#[derive(Debug, Clone)]
pub struct OfflineReviewer {
    pub short_answer_words: usize,
}

impl Default for OfflineReviewer {
    fn default() -> Self {
        Self {
            short_answer_words: 8,
        }
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[async_trait]
impl Evaluator for OfflineReviewer {
    async fn evaluate(&self, _question: &str, answer: &str) -> Result<Evaluation> {
        let words = word_count(answer);
        let score = (30 + words * 2).min(95) as u8;
        let feedback = if words < self.short_answer_words {
            "The answer is very brief. Add specifics and a concrete example."
        } else if score < 70 {
            "Reasonable answer. More detail on your own contribution would help."
        } else {
            "Well developed answer with useful detail."
        };
        Ok(Evaluation {
            score,
            feedback: feedback.to_string(),
        })
    }
}

#[async_trait]
impl FollowUpGenerator for OfflineReviewer {
    async fn follow_up(
        &self,
        _question: &str,
        answer: &str,
        _context: &str,
    ) -> Result<Option<String>> {
        if word_count(answer) < self.short_answer_words {
            Ok(Some(
                "Could you elaborate on that with a concrete example?".to_string(),
            ))
        } else {
            Ok(None)
        }
    }
}
