use serde::{Deserialize, Serialize};
use reqwest::blocking::Client;
use anyhow::{Context, Result};
use std::time::Duration;

use crate::engine::oracle::{DecisionService, OracleRequest};

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
}

#[derive(Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessageResponse,
}

#[derive(Deserialize)]
pub struct ChatMessageResponse {
    pub content: String,
}

/// Blocking client for an Ollama-compatible `/api/chat` endpoint.
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn chat(&self, request: &OracleRequest) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".into(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".into(),
            content: request.prompt.clone(),
        });

        let req = ChatRequest {
            model: request.model.clone(),
            messages,
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
            },
        };

        let mut builder = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&req);
        if request.timeout > 0 {
            builder = builder.timeout(Duration::from_millis(request.timeout));
        }

        let resp = builder
            .send()
            .with_context(|| format!("chat request to {} failed", self.base_url))?
            .error_for_status()?
            .json::<ChatResponse>()
            .context("malformed chat response")?;

        Ok(strip_think(&resp.message.content))
    }

    pub fn test_connection(&self) -> Result<String> {
        let resp: serde_json::Value = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()?
            .json()?;

        Ok(format!(
            "Connected ({} models available)",
            resp["models"].as_array().map(|a| a.len()).unwrap_or(0)
        ))
    }
}

impl DecisionService for OllamaClient {
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        self.chat(request)
    }
}

/// Drops `<think>...</think>` reasoning blocks some models emit. An
/// unterminated block swallows the rest of the reply.
pub fn strip_think(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_blocks_are_removed() {
        assert_eq!(strip_think("<think>hmm, roar?</think>\nRoar"), "Roar");
        assert_eq!(
            strip_think("a <think>x</think>b<think>y</think> c"),
            "a b c"
        );
        assert_eq!(strip_think("plain answer "), "plain answer");
        assert_eq!(strip_think("yes <think>never closed"), "yes");
    }

    #[test]
    fn request_body_matches_the_chat_api() {
        let req = ChatRequest {
            model: "gemma:7b".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "pick".into(),
            }],
            stream: false,
            options: ChatOptions { temperature: 0.5 },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
