use crate::core::config::Config;
use crate::core::state::ImagePayload;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

// --- Config ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // only "gemini" can draw panels
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    pub gemini: Option<GeminiConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub text_model: String,
    #[serde(default = "default_model")]
    pub image_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            text_model: default_model(),
            image_model: default_model(),
        }
    }
}

fn default_retry_count() -> usize {
    1
}
fn default_retry_delay() -> u64 {
    2
}
fn default_request_timeout() -> u64 {
    120
}
fn default_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

impl LlmConfig {
    /// Fills an empty Gemini key from the environment.
    pub fn apply_env_overrides(&mut self) {
        let from_env = API_KEY_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));
        let Some(key) = from_env else { return };
        let gemini = self.gemini.get_or_insert_with(GeminiConfig::default);
        if gemini.api_key.trim().is_empty() {
            gemini.api_key = key;
        }
    }
}

// --- Capabilities ---

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    /// Returns the raw text of a response that was asked to be JSON.
    async fn generate_json(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image(ImagePayload),
}

#[async_trait]
pub trait ImageClient: Send + Sync + Debug {
    /// `Ok(None)` when the backend answered without any inline image.
    async fn generate_image(
        &self,
        parts: &[ContentPart],
        aspect_ratio: &str,
    ) -> Result<Option<ImagePayload>>;
}

pub struct Backend {
    pub text: Arc<dyn LlmClient>,
    pub image: Arc<dyn ImageClient>,
    pub gemini: Arc<GeminiClient>,
}

pub fn create_backend(config: &Config) -> Result<Backend> {
    match config.llm.provider.as_str() {
        "gemini" => {
            let cfg = config.llm.gemini.clone().unwrap_or_default();
            let client = Arc::new(GeminiClient::new(
                &cfg.api_key,
                &cfg.text_model,
                &cfg.image_model,
            ));
            Ok(Backend {
                text: client.clone(),
                image: client.clone(),
                gemini: client,
            })
        }
        _ => Err(anyhow!("Unknown LLM provider: {}", config.llm.provider)),
    }
}

// --- Gemini ---

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug)]
pub struct GeminiClient {
    api_key: RwLock<String>,
    text_model: String,
    image_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, text_model: &str, image_model: &str) -> Self {
        Self {
            api_key: RwLock::new(api_key.to_string()),
            text_model: text_model.to_string(),
            image_model: image_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .read()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    /// Swaps the key used by every later request.
    pub fn update_api_key(&self, api_key: &str) {
        if let Ok(mut key) = self.api_key.write() {
            *key = api_key.trim().to_string();
        }
    }

    fn endpoint(&self, model: &str) -> Result<url::Url> {
        let key = self
            .api_key
            .read()
            .map_err(|_| anyhow!("API key lock poisoned"))?
            .clone();
        url::Url::parse_with_params(
            &format!("{}/{}:generateContent", GEMINI_BASE_URL, model),
            &[("key", key.as_str())],
        )
        .context("Failed to build Gemini endpoint")
    }

    async fn send(&self, model: &str, request: &GeminiRequest) -> Result<GeminiResponse> {
        let resp = self
            .client
            .post(self.endpoint(model)?)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let response_text = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Gemini API error ({}): {}", status, response_text));
        }

        let result: GeminiResponse = serde_json::from_str(&response_text).map_err(|e| {
            anyhow!("Failed to parse Gemini response: {}. Body: {}", e, response_text)
        })?;

        if let Some(err) = &result.error {
            return Err(anyhow!("Gemini API returned error: {}", err.message));
        }
        Ok(result)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

impl From<&ContentPart> for GeminiPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => GeminiPart::Text { text: text.clone() },
            ContentPart::Image(image) => GeminiPart::Inline {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            },
        }
    }
}

fn first_text(response: &GeminiResponse) -> Result<String> {
    let first = response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow!("Gemini response format unexpected or empty"))?;

    let text = first
        .content
        .as_ref()
        .and_then(|content| content.parts.iter().find_map(|p| p.text.clone()));

    match text {
        Some(text) => Ok(text),
        None => {
            let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
            Err(anyhow!("Gemini response empty. Finish reason: {}", reason))
        }
    }
}

fn first_inline_image(response: &GeminiResponse) -> Option<ImagePayload> {
    response
        .candidates
        .iter()
        .flatten()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .find_map(|part| part.inline_data.as_ref())
        .filter(|inline| !inline.data.is_empty())
        .map(|inline| ImagePayload {
            mime_type: inline.mime_type.clone(),
            data: inline.data.clone(),
        })
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate_json(&self, prompt: &str) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart::Text { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                ..Default::default()
            },
        };

        let response = self.send(&self.text_model, &request).await?;
        first_text(&response)
    }
}

#[async_trait]
impl ImageClient for GeminiClient {
    async fn generate_image(
        &self,
        parts: &[ContentPart],
        aspect_ratio: &str,
    ) -> Result<Option<ImagePayload>> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: parts.iter().map(GeminiPart::from).collect(),
            }],
            generation_config: GenerationConfig {
                image_config: Some(ImageConfig {
                    aspect_ratio: aspect_ratio.to_string(),
                }),
                ..Default::default()
            },
        };

        let response = self.send(&self.image_model, &request).await?;
        let image = first_inline_image(&response);
        if image.is_none() {
            debug!("Gemini image response carried no inline image");
        }
        Ok(image)
    }
}
