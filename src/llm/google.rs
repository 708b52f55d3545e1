// Google Gemini adapter (generateContent with function calling)
// API Reference: https://ai.google.dev/api/generate-content

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DEFAULT_GEMINI_API_BASE;
use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse, Role, TokenUsage, ToolCall};
use crate::utils::{with_retry, Attempt};

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    api_base: String,
    max_retries: u32,
    retry_delay: Duration,
}

// Request types for the Gemini API
#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "functionCall", default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(rename = "functionResponse", default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
    // Thinking models interleave their reasoning as `thought` parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
struct GeminiTool {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

// Response types for the Gemini API
#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
    status: Option<String>,
}

impl GoogleAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_GEMINI_API_BASE)
    }

    /// Point the adapter at another endpoint (proxies, test servers)
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    /// Convert the conversation into Gemini `contents`, merging consecutive
    /// turns of the same role (parallel function responses share one turn)
    fn convert_messages(messages: &[LLMMessage]) -> Vec<GeminiContent> {
        let mut contents: Vec<GeminiContent> = Vec::new();

        for msg in messages {
            let role = match msg.role {
                Role::Assistant => "model",
                Role::User | Role::Tool => "user",
            };

            let mut parts = Vec::new();
            match msg.role {
                Role::Tool => parts.push(GeminiPart {
                    function_response: Some(GeminiFunctionResponse {
                        name: msg.tool_name.clone().unwrap_or_default(),
                        response: serde_json::json!({ "content": msg.content }),
                    }),
                    ..Default::default()
                }),
                _ => {
                    if !msg.content.is_empty() {
                        parts.push(GeminiPart {
                            text: Some(msg.content.clone()),
                            ..Default::default()
                        });
                    }
                    for call in &msg.tool_calls {
                        parts.push(GeminiPart {
                            function_call: Some(GeminiFunctionCall {
                                name: call.name.clone(),
                                args: call.arguments.clone(),
                            }),
                            ..Default::default()
                        });
                    }
                }
            }

            if parts.is_empty() {
                continue;
            }

            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
                _ => contents.push(GeminiContent {
                    role: Some(role.to_string()),
                    parts,
                }),
            }
        }

        contents
    }

    fn build_request(request: &LLMRequest) -> GeminiRequest {
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }]
        };

        GeminiRequest {
            contents: Self::convert_messages(&request.messages),
            system_instruction: request.system_instruction.as_ref().map(|s| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(s.clone()),
                    ..Default::default()
                }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
            tools,
        }
    }

    fn parse_response(response: GeminiResponse) -> AppResult<LLMResponse> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("Gemini returned no candidates".to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if part.thought == Some(true) {
                continue;
            }
            if let Some(text) = part.text {
                content.push_str(&text);
            }
            if let Some(fc) = part.function_call {
                tool_calls.push(ToolCall {
                    id: format!("call_{}", tool_calls.len()),
                    name: fc.name,
                    arguments: fc.args,
                });
            }
        }

        let usage = response
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            tool_calls,
            finish_reason: candidate.finish_reason.unwrap_or_else(|| "STOP".to_string()),
            usage,
        })
    }

    async fn send_once(&self, url: &str, body: &GeminiRequest) -> Result<GeminiResponse, Attempt<AppError>> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let err = AppError::LLMApi(format!("Gemini request failed: {}", e));
                if e.is_timeout() || e.is_connect() {
                    Attempt::Retry(err)
                } else {
                    Attempt::Abort(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GeminiErrorResponse>(&error_text) {
                Ok(parsed) => format!(
                    "Gemini API error ({}): {} ({})",
                    status,
                    parsed.error.message,
                    parsed.error.status.unwrap_or_default()
                ),
                Err(_) => format!("Gemini API error ({}): {}", status, error_text),
            };
            let err = AppError::LLMApi(message);
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(Attempt::Retry(err))
            } else {
                Err(Attempt::Abort(err))
            };
        }

        response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| Attempt::Abort(AppError::LLMApi(format!("Failed to parse Gemini response: {}", e))))
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = self.endpoint(&request.model);
        let body = Self::build_request(request);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending Gemini request"
        );

        let response = with_retry(|_| self.send_once(&url, &body), self.max_retries, self.retry_delay).await?;
        let parsed = Self::parse_response(response)?;

        info!(
            model = %request.model,
            tool_calls = parsed.tool_calls.len(),
            total_tokens = parsed.usage.total_tokens,
            "Gemini response received"
        );

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolSpec;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "call_0".to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({"path": "data.csv"}),
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let adapter = GoogleAdapter::with_base_url("k", "http://localhost:1234/v1beta/");
        assert_eq!(
            adapter.endpoint("gemini-2.5-flash"),
            "http://localhost:1234/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_convert_messages_maps_roles_and_tool_turns() {
        let c = call("inspect_csv");
        let messages = vec![
            LLMMessage::user("Inspect the data"),
            LLMMessage::assistant_with_calls("", vec![c.clone()]),
            LLMMessage::tool_result(&c, "shape: (12, 4)"),
        ];

        let contents = GoogleAdapter::convert_messages(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        assert_eq!(
            contents[1].parts[0].function_call.as_ref().map(|f| f.name.as_str()),
            Some("inspect_csv")
        );
        let response = contents[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "inspect_csv");
        assert_eq!(response.response["content"], "shape: (12, 4)");
    }

    #[test]
    fn test_consecutive_tool_results_share_a_turn() {
        let a = call("inspect_csv");
        let b = ToolCall { id: "call_1".to_string(), ..call("train_model") };
        let messages = vec![
            LLMMessage::user("go"),
            LLMMessage::assistant_with_calls("", vec![a.clone(), b.clone()]),
            LLMMessage::tool_result(&a, "ok"),
            LLMMessage::tool_result(&b, "ok"),
        ];

        let contents = GoogleAdapter::convert_messages(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[2].parts.len(), 2);
    }

    #[test]
    fn test_build_request_declares_tools() {
        let request = LLMRequest {
            model: "gemini-2.5-pro".to_string(),
            messages: vec![LLMMessage::user("hi")],
            max_tokens: None,
            temperature: Some(0.7),
            system_instruction: Some("You are a Data Engineer.".to_string()),
            tools: vec![ToolSpec {
                name: "inspect_csv".to_string(),
                description: "Describe a CSV".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        };

        let body = serde_json::to_value(GoogleAdapter::build_request(&request)).unwrap();
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "inspect_csv");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are a Data Engineer.");
        assert_eq!(body["generationConfig"]["temperature"], serde_json::json!(0.7f32));
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn test_parse_response_skips_thoughts() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "thinking...", "thought": true},
                        {"text": "Approved."},
                        {"functionCall": {"name": "save_file", "args": {"filename": "jira_ticket.txt", "content": "x"}}}
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
        });

        let parsed = GoogleAdapter::parse_response(serde_json::from_value(raw).unwrap()).unwrap();
        assert_eq!(parsed.content, "Approved.");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "save_file");
        assert_eq!(parsed.usage.total_tokens, 15);
    }

    #[test]
    fn test_parse_response_without_candidates_fails() {
        let raw = serde_json::json!({"candidates": []});
        let err = GoogleAdapter::parse_response(serde_json::from_value(raw).unwrap()).unwrap_err();
        assert!(matches!(err, AppError::LLMApi(_)));
    }
}
