//! Model tiers and the adapter seam between the crew runtime and a hosted model.
//!
//! Two tiers exist per pipeline invocation: a "capable" model for reasoning and
//! code-heavy work, and a "fast" model for formatting and bookkeeping. Both are
//! built from an explicit [`Config`](crate::config::Config) and an optional API
//! key override; nothing here reads global state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse, ToolSpec};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// One hosted model configuration
#[derive(Clone, PartialEq)]
pub struct ModelTier {
    pub model: String,
    pub temperature: f32,
    pub api_key: String,
}

impl std::fmt::Debug for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelTier")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTiers {
    pub capable: ModelTier,
    pub fast: ModelTier,
}

impl ModelTiers {
    pub fn from_config(config: &Config, api_key_override: Option<&str>) -> AppResult<Self> {
        let api_key = config.llm.resolve_api_key(api_key_override).ok_or_else(|| {
            AppError::Config("GOOGLE_API_KEY is not set and no API key was supplied".to_string())
        })?;

        Ok(Self {
            capable: ModelTier {
                model: config.llm.capable_model.clone(),
                temperature: config.llm.capable_temperature,
                api_key: api_key.clone(),
            },
            fast: ModelTier {
                model: config.llm.fast_model.clone(),
                temperature: config.llm.fast_temperature,
                api_key,
            },
        })
    }
}

/// Builds the adapter serving a tier
pub trait LLMFactory: Send + Sync {
    fn adapter_for(&self, tier: &ModelTier) -> AppResult<Arc<dyn LLMAdapter>>;
}

/// Factory for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiFactory {
    pub api_base: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl GeminiFactory {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_base: config.llm.api_base.clone(),
            timeout: Duration::from_secs(config.llm.timeout_secs),
            max_retries: config.llm.max_retries,
        }
    }
}

impl LLMFactory for GeminiFactory {
    fn adapter_for(&self, tier: &ModelTier) -> AppResult<Arc<dyn LLMAdapter>> {
        let adapter = crate::llm::google::GoogleAdapter::with_base_url(&tier.api_key, &self.api_base)
            .with_timeout(self.timeout)?
            .with_max_retries(self.max_retries);
        Ok(Arc::new(adapter))
    }
}

/// A tier bound to its adapter
pub struct LLM {
    adapter: Arc<dyn LLMAdapter>,
    tier: ModelTier,
}

impl LLM {
    pub fn new(adapter: Arc<dyn LLMAdapter>, tier: ModelTier) -> Self {
        Self { adapter, tier }
    }

    pub fn model(&self) -> &str {
        &self.tier.model
    }

    pub async fn complete(
        &self,
        system_instruction: Option<&str>,
        messages: &[LLMMessage],
        tools: Vec<ToolSpec>,
    ) -> AppResult<LLMResponse> {
        let request = LLMRequest {
            model: self.tier.model.clone(),
            messages: messages.to_vec(),
            max_tokens: None,
            temperature: Some(self.tier.temperature),
            system_instruction: system_instruction.map(str::to_string),
            tools,
        };
        self.adapter.create_chat_completion(&request).await
    }
}
