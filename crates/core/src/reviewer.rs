use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

/// Score and written feedback for one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0 ..= 100
    pub score: u8,
    pub feedback: String,
}

// The controller only knows these two contracts. Scoring feeds the on-screen
// feedback; the follow-up decision drives the flow. Both are mocked in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, question: &str, answer: &str) -> Result<Evaluation>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait FollowUpGenerator: Send + Sync {
    /// `Ok(None)` means "move on to the next question".
    async fn follow_up(&self, question: &str, answer: &str, context: &str)
    -> Result<Option<String>>;
}

pub const EVALUATE_PROMPT_KEY: &str = "evaluate";
pub const FOLLOW_UP_PROMPT_KEY: &str = "follow_up";

const DEFAULT_EVALUATE_PROMPT: &str = r#"As an interviewer, analyze this response.
Question: {question}
Response: {answer}

Return ONLY valid JSON with keys: "score" (0-100 integer) and "feedback" (string). No code fences, no comments, no extra text.
"#;

const DEFAULT_FOLLOW_UP_PROMPT: &str = r#"You are an expert interviewer.
Question: {question}
Candidate response: {answer}
Conversation context so far:
{context}

If a targeted follow-up question would clarify gaps, ask ONE concise follow-up.
Otherwise, return exactly the string: NONE.

Rules:
- Keep the follow-up under 20 words.
- Do not include commentary, only the question text.
"#;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions backed reviewer.
pub struct ReviewerClient {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    prompts: HashMap<String, String>,
}

impl ReviewerClient {
    /// `prompts` may override the `evaluate` and `follow_up` templates; missing
    /// keys fall back to the built-in ones.
    pub fn new(api_key: SecretString, model: String, prompts: HashMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            prompts,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn template(&self, key: &str) -> &str {
        match self.prompts.get(key) {
            Some(prompt) => prompt,
            None if key == EVALUATE_PROMPT_KEY => DEFAULT_EVALUATE_PROMPT,
            None => DEFAULT_FOLLOW_UP_PROMPT,
        }
    }

    async fn complete(&self, prompt: String, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": temperature
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Reviewer request failed")?
            .error_for_status()
            .context("Reviewer returned an error status")?
            .json::<LlmResponse>()
            .await
            .context("Reviewer response was not a chat completion")?;

        let answer = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?
            .message
            .content;
        Ok(answer.clone())
    }
}

pub fn render_prompt(template: &str, question: &str, answer: &str, context: &str) -> String {
    template
        .replace("{question}", question)
        .replace("{answer}", answer)
        .replace("{context}", context)
}

/// Strips Markdown code fences some models wrap around JSON.
fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    for prefix in ["```json", "```JSON", "```"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    s.strip_suffix("```").unwrap_or(s).trim()
}

pub fn parse_evaluation(raw: &str) -> Result<Evaluation> {
    #[derive(Deserialize)]
    struct RawEvaluation {
        score: f64,
        feedback: String,
    }

    let clean = strip_code_fences(raw);
    let parsed: RawEvaluation = serde_json::from_str(clean)
        .with_context(|| format!("Invalid evaluation JSON: {clean}"))?;
    if !(0.0..=100.0).contains(&parsed.score) {
        anyhow::bail!("Evaluation score {} is outside 0..=100", parsed.score);
    }
    Ok(Evaluation {
        score: parsed.score.round() as u8,
        feedback: parsed.feedback.trim().to_string(),
    })
}

/// `None` for the literal `NONE` or an empty reply.
pub fn parse_follow_up(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return None;
    }
    let unquoted = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted).trim();
    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_string())
    }
}

#[async_trait]
impl Evaluator for ReviewerClient {
    async fn evaluate(&self, question: &str, answer: &str) -> Result<Evaluation> {
        let prompt = render_prompt(self.template(EVALUATE_PROMPT_KEY), question, answer, "");
        let reply = self.complete(prompt, 0.1).await?;
        parse_evaluation(&reply)
    }
}

#[async_trait]
impl FollowUpGenerator for ReviewerClient {
    async fn follow_up(
        &self,
        question: &str,
        answer: &str,
        context: &str,
    ) -> Result<Option<String>> {
        let prompt = render_prompt(
            self.template(FOLLOW_UP_PROMPT_KEY),
            question,
            answer,
            context,
        );
        let reply = self.complete(prompt, 0.3).await?;
        Ok(parse_follow_up(&reply))
    }
}
