//! Draft reply generation
//!
//! One trait seam around an OpenAI-compatible chat-completion endpoint.
//! The generator owns no retry or timeout policy; bounding the call is the
//! orchestrator's responsibility. Generated text is sanitized before it is
//! queued so stray markup from the model never reaches the review queue.

use async_openai::config::OpenAIConfig;
use async_openai::types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{ConfigError, GenerateError, Result};
use crate::types::Tone;

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(
        &self,
        text: &str,
        tone: Tone,
    ) -> std::result::Result<String, GenerateError>;
}

pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    /// Build a generator from config, reading the API key from the
    /// configured key file.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let key_path = shellexpand::tilde(&config.key_file).to_string();
        let api_key = std::fs::read_to_string(&key_path)
            .map_err(ConfigError::ReadError)?
            .trim()
            .to_string();
        if api_key.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "generation key file {} is empty",
                key_path
            ))
            .into());
        }

        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_base(config.api_base.clone())
                .with_api_key(api_key),
        );

        Ok(Self {
            client,
            model: config.model.clone(),
        })
    }

    fn build_prompt(text: &str, tone: Tone) -> String {
        format!(
            "You are replying to a social media post. Adopt a {tone} tone. \
             Comment on one specific detail from the post and keep the reply \
             under 200 characters. Plain text only: no hashtags, no markup, \
             no quotes, at most one emoji.\n\nPost: \"{text}\"\n\nReply:"
        )
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        text: &str,
        tone: Tone,
    ) -> std::result::Result<String, GenerateError> {
        let prompt = Self::build_prompt(text, tone);
        debug!(model = %self.model, %tone, "requesting draft reply");

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| GenerateError::Failed(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([message.into()])
            .temperature(1.0)
            .max_tokens(512u32)
            .build()
            .map_err(|e| GenerateError::Failed(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| GenerateError::Failed(e.to_string()))?;

        let reply = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| sanitize_reply(&content))
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(GenerateError::Empty);
        }
        Ok(reply)
    }
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn markdown_bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*[^*]*\*\*").unwrap())
}

fn markdown_italic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*[^*]*\*").unwrap())
}

/// Strip markup the model was told not to produce but sometimes does
/// anyway: HTML tags and markdown emphasis spans.
pub fn sanitize_reply(raw: &str) -> String {
    let stripped = html_tag_re().replace_all(raw, "");
    let stripped = markdown_bold_re().replace_all(&stripped, "");
    let stripped = markdown_italic_re().replace_all(&stripped, "");
    stripped.trim().to_string()
}

/// Scripted generator for tests: returns canned replies or a scripted
/// failure and records every call.
pub struct MockGenerator {
    reply: std::result::Result<String, GenerateError>,
    delay: std::time::Duration,
    calls: Mutex<Vec<(String, Tone)>>,
}

impl MockGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: std::time::Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(detail: &str) -> Self {
        Self {
            reply: Err(GenerateError::Failed(detail.to_string())),
            delay: std::time::Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A generator that stalls, for exercising the orchestrator's timeout.
    pub fn stalling(reply: &str, delay: std::time::Duration) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, Tone)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn generate(
        &self,
        text: &str,
        tone: Tone,
    ) -> std::result::Result<String, GenerateError> {
        self.calls.lock().unwrap().push((text.to_string(), tone));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(GenerateError::Failed(detail)) => Err(GenerateError::Failed(detail.clone())),
            Err(GenerateError::TimedOut(secs)) => Err(GenerateError::TimedOut(*secs)),
            Err(GenerateError::Empty) => Err(GenerateError::Empty),
        }
    }
}
