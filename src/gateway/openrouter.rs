//! OpenRouter chat-completions client
//!
//! Speaks the OpenAI-compatible wire format. Messages whose parts are all
//! text go out as plain string content; anything carrying an image goes out
//! as a content-part array.

use super::config::GatewayConfig;
use super::{ChatGateway, GatewayError, GatewayReply, ReplyImage, TokenUsage};
use crate::context::{ChatPayload, MessageRole, PayloadMessage, PayloadPart};
use crate::conversation::ReasoningEffort;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<WireReasoning>,
}

#[derive(Debug, Serialize)]
struct WireReasoning {
    effort: &'static str,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: MessageRole,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    images: Vec<ResponseImage>,
}

#[derive(Debug, Deserialize)]
struct ResponseImage {
    image_url: WireImageUrl,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl From<&PayloadMessage> for WireMessage {
    fn from(message: &PayloadMessage) -> Self {
        let has_images = message
            .parts
            .iter()
            .any(|p| matches!(p, PayloadPart::ImageUrl { .. }));

        let content = if has_images {
            WireContent::Parts(
                message
                    .parts
                    .iter()
                    .map(|part| match part {
                        PayloadPart::Text { text } => WirePart::Text { text: text.clone() },
                        PayloadPart::ImageUrl { url } => WirePart::ImageUrl {
                            image_url: WireImageUrl { url: url.clone() },
                        },
                    })
                    .collect(),
            )
        } else {
            WireContent::Text(message.text())
        };

        Self {
            role: message.role,
            content,
        }
    }
}

/// Split a `data:<mime>;base64,<data>` URL
/// Error body text for a non-success response, or why it could not be read
fn upstream_error_message<E: std::fmt::Display>(body: Result<String, E>) -> String {
    match body {
        Ok(body) => body,
        Err(e) => format!("failed to read error body: {}", e),
    }
}

fn parse_data_url(url: &str) -> Option<ReplyImage> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    Some(ReplyImage {
        media_type: media_type.to_string(),
        data: data.to_string(),
    })
}

/// OpenRouter gateway client
pub struct OpenRouterGateway {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    referer: String,
    title: String,
}

impl OpenRouterGateway {
    /// Create a new client; an API key is required
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .api_key
            .ok_or_else(|| GatewayError::new(None, "OPENROUTER_API_KEY is not configured"))?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GatewayError::new(None, e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint,
            api_key,
            referer: config.referer,
            title: config.title,
        })
    }
}

#[async_trait]
impl ChatGateway for OpenRouterGateway {
    async fn send_chat_request(
        &self,
        model_id: &str,
        payload: &ChatPayload,
        reasoning_effort: Option<ReasoningEffort>,
    ) -> Result<GatewayReply, GatewayError> {
        let request = ChatCompletionRequest {
            model: model_id,
            messages: payload.messages.iter().map(WireMessage::from).collect(),
            reasoning: reasoning_effort.map(|e| WireReasoning { effort: e.as_str() }),
        };

        debug!(
            "Calling chat completions: model={}, messages={}, ~{} tokens",
            model_id,
            request.messages.len(),
            payload.total_tokens()
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::new(None, format!("request timed out: {}", e))
                } else {
                    GatewayError::new(None, format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = upstream_error_message(response.text().await);
            warn!("Upstream returned {} for model {}", status, model_id);
            return Err(GatewayError::new(Some(status.as_u16()), message));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            GatewayError::new(Some(status.as_u16()), format!("invalid response body: {}", e))
        })?;

        let usage = completion.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| GatewayError::new(Some(status.as_u16()), "response contained no choices"))?;

        let images = message
            .images
            .iter()
            .filter_map(|img| {
                let parsed = parse_data_url(&img.image_url.url);
                if parsed.is_none() {
                    warn!("Ignoring non-data image URL in reply from {}", model_id);
                }
                parsed
            })
            .collect();

        if let Some(usage) = &usage {
            debug!(
                "Upstream usage for {}: prompt={}, completion={}",
                model_id, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(GatewayReply {
            content: message.content.unwrap_or_default(),
            images,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BudgetAllocation;
    use mockito::Matcher;

    fn payload(messages: Vec<PayloadMessage>) -> ChatPayload {
        ChatPayload {
            messages,
            allocation: BudgetAllocation::new(1, 1, 0, 100),
            included_turns: 0,
            omitted_turns: 0,
            truncation_notices: Vec::new(),
        }
    }

    fn gateway(endpoint: String) -> OpenRouterGateway {
        OpenRouterGateway::new(GatewayConfig {
            endpoint,
            api_key: Some(SecretString::new("test-key".to_string())),
            ..GatewayConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_text_only_message_serializes_as_string() {
        let msg = PayloadMessage::system("be helpful", 3);
        let wire = serde_json::to_value(WireMessage::from(&msg)).unwrap();
        assert_eq!(wire["role"], "system");
        assert_eq!(wire["content"], "be helpful");
    }

    #[test]
    fn test_image_message_serializes_as_parts() {
        let msg = PayloadMessage {
            role: MessageRole::User,
            parts: vec![
                PayloadPart::Text { text: "look".into() },
                PayloadPart::ImageUrl {
                    url: "data:image/png;base64,QUJD".into(),
                },
            ],
            token_estimate: 10,
        };
        let wire = serde_json::to_value(WireMessage::from(&msg)).unwrap();
        assert_eq!(wire["content"][0]["type"], "text");
        assert_eq!(wire["content"][1]["type"], "image_url");
        assert_eq!(wire["content"][1]["image_url"]["url"], "data:image/png;base64,QUJD");
    }

    #[test]
    fn test_unreadable_error_body_is_reported() {
        let read: Result<String, &str> = Err("connection reset");
        assert_eq!(
            upstream_error_message(read),
            "failed to read error body: connection reset"
        );
        assert_eq!(
            upstream_error_message::<&str>(Ok("rate limited".to_string())),
            "rate limited"
        );
    }

    #[test]
    fn test_parse_data_url() {
        let img = parse_data_url("data:image/webp;base64,AAAA").unwrap();
        assert_eq!(img.media_type, "image/webp");
        assert_eq!(img.data, "AAAA");
        assert!(parse_data_url("https://example.com/a.png").is_none());
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        assert!(OpenRouterGateway::new(GatewayConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat")
            .match_header("authorization", "Bearer test-key")
            .match_header("x-title", "Peer Chat Gateway")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "openai/gpt-5",
                "reasoning": {"effort": "high"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"hello back"}}],
                    "usage":{"prompt_tokens":12,"completion_tokens":3}}"#,
            )
            .create_async()
            .await;

        let gw = gateway(format!("{}/chat", server.url()));
        let reply = gw
            .send_chat_request(
                "openai/gpt-5",
                &payload(vec![PayloadMessage::system("sys", 1)]),
                Some(ReasoningEffort::High),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply.content, "hello back");
        assert_eq!(
            reply.usage,
            Some(TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 3
            })
        );
    }

    #[tokio::test]
    async fn test_reply_images_are_collected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"content":"here","images":[
                    {"type":"image_url","image_url":{"url":"data:image/png;base64,iVBO"}}]}}]}"#,
            )
            .create_async()
            .await;

        let reply = gateway(format!("{}/chat", server.url()))
            .send_chat_request("google/gemini-2.5-flash", &payload(Vec::new()), None)
            .await
            .unwrap();
        assert_eq!(reply.images.len(), 1);
        assert_eq!(reply.images[0].media_type, "image/png");
    }

    #[tokio::test]
    async fn test_upstream_error_passes_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat")
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limited"}}"#)
            .create_async()
            .await;

        let err = gateway(format!("{}/chat", server.url()))
            .send_chat_request("openai/gpt-5", &payload(Vec::new()), None)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(429));
        assert_eq!(err.message, r#"{"error":{"message":"rate limited"}}"#);
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = gateway(format!("{}/chat", server.url()))
            .send_chat_request("openai/gpt-5", &payload(Vec::new()), None)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(200));
    }
}
