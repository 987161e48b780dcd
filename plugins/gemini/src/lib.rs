//! Gemini-style remote Generation Client
//!
//! Talks to the `models/{model}:generateContent` REST endpoint. There are no
//! automatic retries; wrap the client in [`TimedClient`] for the generation
//! ceiling.

use async_trait::async_trait;
use pagesmith_core::{
    ContextTurn, GenerationClient, GenerationConfig, GenerationError, GenerationRequest,
    GenerationResult, Role, TimedClient,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Fixed instruction sent with every request
pub const SYSTEM_INSTRUCTION: &str = "You are a web page generator. Answer with one complete, \
self-contained HTML document (inline CSS and JavaScript, no external build step). \
When current code is provided, return the full updated document, not a diff. \
Do not add explanations before or after the code.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationParams,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Image { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    max_output_tokens: u32,
}

pub struct GeminiClient {
    http: reqwest::Client,
    config: GenerationConfig,
}

impl GeminiClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Client with the configured timeout ceiling applied
    pub fn timed(config: GenerationConfig) -> TimedClient<Self> {
        let ceiling = config.timeout();
        TimedClient::new(Self::new(config), ceiling)
    }

    pub fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    /// JSON body for a request
    pub fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut contents: Vec<Content> = request.context.iter().filter_map(context_content).collect();

        let mut parts = vec![Part::Text {
            text: prompt_text(request),
        }];
        if let Some(image) = &request.image {
            parts.push(Part::Image {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.base64_payload().to_string(),
                },
            });
        }
        contents.push(Content {
            role: Some("user"),
            parts,
        });

        let body = RequestBody {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents,
            generation_config: GenerationParams {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };
        serde_json::to_value(body).unwrap_or(Value::Null)
    }
}

fn context_content(turn: &ContextTurn) -> Option<Content> {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "model",
        Role::System => return None,
    };
    Some(Content {
        role: Some(role),
        parts: vec![Part::Text {
            text: turn.content.clone(),
        }],
    })
}

fn prompt_text(request: &GenerationRequest) -> String {
    match &request.prior_document {
        Some(document) => format!(
            "Current code:\n```html\n{}\n```\n\nRequested change: {}",
            document, request.instruction
        ),
        None => request.instruction.clone(),
    }
}

/// Concatenated text of the first candidate
pub fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

/// Map a non-success HTTP answer onto the generation error taxonomy
pub fn map_status(status: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        429 => GenerationError::RateLimited,
        413 => GenerationError::RequestTooLarge,
        400 if mentions_size_limit(&message) => GenerationError::RequestTooLarge,
        _ => GenerationError::Remote { status, message },
    }
}

fn mentions_size_limit(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ["too large", "too long", "size", "token", "exceeds"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key,
            _ => return Err(GenerationError::NotConfigured),
        };

        debug!(
            "Sending {:?} request to {} ({} context turns)",
            request.shape(),
            self.config.model,
            request.context.len()
        );
        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            let error = map_status(status.as_u16(), &body);
            warn!("Generation request failed ({}): {}", status, error);
            return Err(error);
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Transport(format!("invalid response body: {}", e)))?;
        // A response without candidates is treated as empty output
        Ok(extract_text(&value).unwrap_or_default())
    }

    fn client_name(&self) -> &str {
        "GeminiClient"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesmith_core::{Attachment, Turn};
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status(429, ""), GenerationError::RateLimited);
        assert_eq!(map_status(413, ""), GenerationError::RequestTooLarge);
        assert_eq!(
            map_status(
                400,
                r#"{"error":{"message":"The input token count exceeds the maximum"}}"#
            ),
            GenerationError::RequestTooLarge
        );
        assert_eq!(
            map_status(400, r#"{"error":{"message":"Invalid argument"}}"#),
            GenerationError::Remote {
                status: 400,
                message: "Invalid argument".to_string()
            }
        );
        assert!(matches!(
            map_status(503, "unavailable"),
            GenerationError::Remote { status: 503, .. }
        ));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = json!({
            "candidates": [{
                "content": {"parts": [{"text": "<p>"}, {"text": "hi</p>"}]}
            }]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("<p>hi</p>"));
        assert_eq!(extract_text(&json!({"candidates": []})), None);
    }

    #[test]
    fn test_request_body_shape() {
        let client = GeminiClient::new(GenerationConfig::default());
        let context = [Turn::user("Make a page", vec![]), Turn::assistant("Done")];
        let image = Attachment::from_bytes("image/png", b"png", "shot.png");
        let request = GenerationRequest::new("Add a footer")
            .with_prior_document("<p>x</p>")
            .with_context(&context)
            .with_image(Some(image));

        let body = client.request_body(&request);
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        let last = &contents[2]["parts"];
        assert!(last[0]["text"].as_str().unwrap().contains("<p>x</p>"));
        assert_eq!(last[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(last[1]["inline_data"]["data"], "cG5n");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], SYSTEM_INSTRUCTION);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[tokio::test]
    async fn test_missing_key_fails_closed() {
        let client = GeminiClient::new(GenerationConfig::default());
        let result = client.generate(&GenerationRequest::new("hi")).await;
        assert_eq!(result, Err(GenerationError::NotConfigured));
    }
}
