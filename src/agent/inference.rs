use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::config::AgentConfig;
use super::error::{AgentError, Result};
use super::toolkit::ToolSpec;

/// One action the model picked during classification. `arguments` is the
/// raw JSON payload as returned by the API.
#[derive(Debug, Clone)]
pub struct SelectedAction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub action: Option<SelectedAction>,
    pub raw_text: String,
}

/// The LLM collaborator. Trait-shaped so the dispatcher and the repair
/// loop can be exercised with scripted models in tests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn classify(
        &self,
        system_prompt: &str,
        user_instruction: &str,
        tools: &[ToolSpec],
    ) -> Result<Classification>;

    async fn generate(&self, system_prompt: &str, user_instruction: &str) -> Result<String>;

    async fn describe_image(&self, prompt: &str, png_base64: &str) -> Result<String>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<FunctionTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Value,
}

#[derive(Debug, Serialize)]
struct FunctionTool {
    #[serde(rename = "type")]
    kind: String,
    function: ToolSpec,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallEnvelope>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallEnvelope {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible chat-completions and embeddings client.
pub struct InferenceClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
}

impl InferenceClient {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| AgentError::Model(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ResponseMessage> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            "Sending chat request with {} messages to {}",
            request.messages.len(),
            url
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Model(format!(
                "Chat API error ({}): {}",
                status, error_text
            )));
        }

        let mut parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Model(format!("Failed to parse chat response: {}", e)))?;

        if parsed.choices.is_empty() {
            return Err(AgentError::Model("Chat response has no choices".to_string()));
        }
        Ok(parsed.choices.remove(0).message)
    }

    fn text_message(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: Value::String(content.to_string()),
        }
    }
}

#[async_trait]
impl LanguageModel for InferenceClient {
    async fn classify(
        &self,
        system_prompt: &str,
        user_instruction: &str,
        tools: &[ToolSpec],
    ) -> Result<Classification> {
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![
                Self::text_message("system", system_prompt),
                Self::text_message("user", user_instruction),
            ],
            tools: Some(
                tools
                    .iter()
                    .map(|spec| FunctionTool {
                        kind: "function".to_string(),
                        function: spec.clone(),
                    })
                    .collect(),
            ),
            tool_choice: Some("auto".to_string()),
        };

        let message = self.chat(&request).await?;
        let raw_text = message.content.unwrap_or_default();
        let action = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|call| SelectedAction {
                name: call.function.name,
                arguments: call.function.arguments,
            });

        Ok(Classification { action, raw_text })
    }

    async fn generate(&self, system_prompt: &str, user_instruction: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![
                Self::text_message("system", system_prompt),
                Self::text_message("user", user_instruction),
            ],
            tools: None,
            tool_choice: None,
        };

        let message = self.chat(&request).await?;
        message
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AgentError::Model("Chat response has no text content".to_string()))
    }

    async fn describe_image(&self, prompt: &str, png_base64: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: serde_json::json!([
                    {"type": "text", "text": prompt},
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/png;base64,{}", png_base64)
                        }
                    }
                ]),
            }],
            tools: None,
            tool_choice: None,
        };

        let message = self.chat(&request).await?;
        message
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AgentError::Model("Vision response has no text content".to_string()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Model(format!(
                "Embeddings API error ({}): {}",
                status, error_text
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            AgentError::Model(format!("Failed to parse embeddings response: {}", e))
        })?;

        if parsed.data.is_empty() {
            return Err(AgentError::Model(
                "Embeddings response has no data".to_string(),
            ));
        }
        Ok(parsed.data.remove(0).embedding)
    }
}
