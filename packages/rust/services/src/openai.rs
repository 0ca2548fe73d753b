//! OpenAI-compatible chat-completion and embedding clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use personagraph_shared::{EmbeddingsConfig, LlmConfig, PersonaGraphError, Result};

use crate::{Embedder, LanguageModel};

/// User-Agent string for outgoing requests.
const USER_AGENT: &str = concat!("personagraph/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed back into an error message.
const MAX_ERROR_BODY: usize = 200;

/// Connection settings shared by both clients.
#[derive(Debug, Clone)]
pub struct OpenAiOptions {
    /// API root, e.g. `https://api.openai.com/v1` (no trailing slash needed).
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OpenAiOptions {
    pub fn from_llm_config(config: &LlmConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn from_embeddings_config(
        config: &EmbeddingsConfig,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            timeout_secs,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PersonaGraphError::Network(format!("failed to build HTTP client: {e}")))
}

/// POST `body` as JSON and decode a JSON reply, mapping failures onto `service`.
async fn post_json<B, R>(
    client: &Client,
    url: &str,
    api_key: &str,
    body: &B,
    service: &'static str,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| PersonaGraphError::Network(format!("{service} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
        return Err(PersonaGraphError::service(
            service,
            format!("HTTP {status}: {snippet}"),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| PersonaGraphError::service(service, format!("invalid response body: {e}")))
}

// ---------------------------------------------------------------------------
// Chat completions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// [`LanguageModel`] backed by `POST {base}/chat/completions`.
pub struct ChatCompletionsClient {
    options: OpenAiOptions,
    temperature: f32,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn new(options: OpenAiOptions, temperature: f32) -> Result<Self> {
        let client = build_client(options.timeout_secs)?;
        Ok(Self {
            options,
            temperature,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    #[instrument(skip_all, fields(model = %self.options.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.options.model,
            temperature: self.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let url = self.options.endpoint("chat/completions");
        let response: ChatResponse = post_json(
            &self.client,
            &url,
            &self.options.api_key,
            &request,
            "language model",
        )
        .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PersonaGraphError::service("language model", "empty completion"))?;

        debug!(reply_len = text.len(), "completion received");
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// [`Embedder`] backed by `POST {base}/embeddings`.
pub struct EmbeddingsClient {
    options: OpenAiOptions,
    client: Client,
}

impl EmbeddingsClient {
    pub fn new(options: OpenAiOptions) -> Result<Self> {
        let client = build_client(options.timeout_secs)?;
        Ok(Self { options, client })
    }
}

#[async_trait]
impl Embedder for EmbeddingsClient {
    #[instrument(skip_all, fields(model = %self.options.model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.options.model,
            input: text,
        };

        let url = self.options.endpoint("embeddings");
        let response: EmbeddingResponse = post_json(
            &self.client,
            &url,
            &self.options.api_key,
            &request,
            "embeddings",
        )
        .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PersonaGraphError::service("embeddings", "no embedding returned"))
    }
}
