//! Answer generation backends.
//!
//! A [`ChatBackend`] turns a rendered prompt into answer text. Backends:
//! - **[`OllamaChat`]** — `POST /api/chat` on a local Ollama (default model `gemma3:4b`).
//! - **[`OpenAIChat`]** — any OpenAI-compatible `/v1/chat/completions` endpoint.
//! - **[`ExtractiveChat`]** — offline; answers with the context sentence that
//!   best overlaps the question. No model, no network.
//!
//! Network backends retry 429/5xx and connection errors with the same
//! exponential backoff as the embedding providers.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::embedding::{backoff, tokenize};
use crate::models::ConversationTurn;

const SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions about the \
documents in a knowledge base. Answer using only the provided context. If the context \
does not contain the answer, say that you don't know. Cite sources by their [n] number.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// A context passage handed to the backend.
#[derive(Debug, Clone)]
pub struct ContextPassage {
    pub filename: String,
    pub text: String,
}

/// Everything a backend may need to produce an answer.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub question: String,
    pub contexts: Vec<ContextPassage>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Render the prompt: system instruction, recent history, then the
/// numbered context passages followed by the question.
pub fn build_messages(
    question: &str,
    contexts: &[ContextPassage],
    history: &[ConversationTurn],
    max_history_turns: usize,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new("system", SYSTEM_PROMPT)];

    let start = history.len().saturating_sub(max_history_turns);
    for turn in &history[start..] {
        if turn.content.trim().is_empty() {
            continue;
        }
        let role = match turn.role.as_str() {
            "assistant" | "bot" | "ai" => "assistant",
            _ => "user",
        };
        messages.push(ChatMessage::new(role, turn.content.trim()));
    }

    let mut prompt = String::from("Context:\n");
    for (i, ctx) in contexts.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] (source: {})\n{}\n",
            i + 1,
            ctx.filename,
            ctx.text.trim()
        ));
    }
    prompt.push_str(&format!("\nQuestion: {}", question));
    messages.push(ChatMessage::new("user", prompt));

    messages
}

/// Number of history turns [`build_messages`] will include.
pub fn history_turns_used(history: &[ConversationTurn], max_history_turns: usize) -> usize {
    let start = history.len().saturating_sub(max_history_turns);
    history[start..]
        .iter()
        .filter(|t| !t.content.trim().is_empty())
        .count()
}

// ============ Ollama ============

pub struct OllamaChat {
    model: String,
    url: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl ChatBackend for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        let endpoint = format!("{}/api/chat", self.url.trim_end_matches('/'));

        let json = post_with_retry(&self.client, &endpoint, None, &body, self.max_retries, "Ollama")
            .await?;
        let parsed: OllamaChatResponse = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("Invalid Ollama chat response: {}", e))?;
        Ok(parsed.message.content.trim().to_string())
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAIChat {
    model: String,
    url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[derive(Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: ChatMessage,
}

#[async_trait]
impl ChatBackend for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let endpoint = format!("{}/v1/chat/completions", self.url.trim_end_matches('/'));

        let json = post_with_retry(
            &self.client,
            &endpoint,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        let parsed: OpenAIChatResponse = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("Invalid chat completion response: {}", e))?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat completion returned no choices"))?;
        Ok(answer.trim().to_string())
    }
}

async fn post_with_retry(
    client: &reqwest::Client,
    endpoint: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff(attempt)).await;
        }

        let mut req = client.post(endpoint).json(body);
        if let Some(key) = bearer {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(%status, attempt, "{} chat request failed, retrying", label);
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    label,
                    endpoint,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", label)))
}

// ============ Extractive ============

/// Answers with the single context sentence sharing the most words with
/// the question. The first sentence of the top passage is the fallback.
pub struct ExtractiveChat;

#[async_trait]
impl ChatBackend for ExtractiveChat {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let question: HashSet<String> = tokenize(&request.question)
            .filter(|t| t.chars().count() > 2)
            .collect();

        let mut best: Option<(usize, &str)> = None;
        for ctx in &request.contexts {
            for sentence in split_sentences(&ctx.text) {
                let overlap = tokenize(sentence)
                    .filter(|t| question.contains(t))
                    .collect::<HashSet<_>>()
                    .len();
                match best {
                    Some((score, _)) if score >= overlap => {}
                    _ => best = Some((overlap, sentence)),
                }
            }
        }

        match best {
            Some((_, sentence)) => Ok(sentence.to_string()),
            None => bail!("No context available to answer from"),
        }
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            let s = text[start..end].trim();
            if !s.is_empty() && s.chars().any(|ch| ch.is_alphanumeric()) {
                sentences.push(s);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() && rest.chars().any(|ch| ch.is_alphanumeric()) {
        sentences.push(rest);
    }
    sentences
}

/// Create the chat backend named by `llm.provider`.
pub fn create_backend(config: &LlmConfig) -> Result<Box<dyn ChatBackend>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        "extractive" => Ok(Box::new(ExtractiveChat)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
