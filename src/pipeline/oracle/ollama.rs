use serde::{Deserialize, Serialize};

use super::types::{OracleResponse, SemanticOracle, StructuredReply};
use super::OracleError;
use crate::pipeline_config::{OracleConfig, OracleEndpoint};

/// Instruction-following models in order of preference when none is configured.
const PREFERRED_MODELS: &[&str] = &[
    "qwen2.5",
    "mistral-nemo",
    "mistral",
    "llama3.1",
    "llama3",
];

/// Ollama HTTP client used as the semantic oracle.
pub struct OllamaOracle {
    base_url: String,
    model: String,
    endpoint: OracleEndpoint,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaOracle {
    /// Build a client for `config`. When no model is configured, the best
    /// installed one is discovered through `/api/tags`.
    pub fn connect(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::HttpClient(e.to_string()))?;

        let mut oracle = Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone().unwrap_or_default(),
            endpoint: config.endpoint,
            client,
            timeout_secs: config.timeout_secs,
        };

        if oracle.model.is_empty() {
            oracle.model = oracle.find_best_model()?;
            tracing::info!(model = %oracle.model, "Discovered oracle model");
        }
        Ok(oracle)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// First preferred model that is installed locally.
    pub fn find_best_model(&self) -> Result<String, OracleError> {
        let available = self.list_models()?;
        pick_preferred(&available).ok_or(OracleError::NoModelAvailable)
    }

    pub fn list_models(&self) -> Result<Vec<String>, OracleError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| OracleError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    fn map_send_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_connect() {
            OracleError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            OracleError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
        } else {
            OracleError::HttpClient(e.to_string())
        }
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::blocking::Response, OracleError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn generate(&self, prompt: &str, system: &str) -> Result<OracleResponse, OracleError> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            options: GenerationOptions { temperature: 0.0 },
        };
        let parsed: OllamaGenerateResponse = self
            .post("/api/generate", &body)?
            .json()
            .map_err(|e| OracleError::ResponseParsing(e.to_string()))?;
        Ok(OracleResponse::PlainText(parsed.response))
    }

    fn chat(&self, prompt: &str, system: &str) -> Result<OracleResponse, OracleError> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            stream: false,
            options: GenerationOptions { temperature: 0.0 },
        };
        let parsed: OllamaChatResponse = self
            .post("/api/chat", &body)?
            .json()
            .map_err(|e| OracleError::ResponseParsing(e.to_string()))?;
        Ok(OracleResponse::Structured(parsed.message))
    }
}

fn pick_preferred(available: &[String]) -> Option<String> {
    PREFERRED_MODELS.iter().find_map(|preferred| {
        available
            .iter()
            .find(|m| m.starts_with(preferred))
            .cloned()
    })
}

#[derive(Serialize)]
struct GenerationOptions {
    temperature: f32,
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerationOptions,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Request body for Ollama /api/chat
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: GenerationOptions,
}

/// Response body from Ollama /api/chat; `message` carries `role` and `content`.
#[derive(Deserialize)]
struct OllamaChatResponse {
    message: StructuredReply,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl SemanticOracle for OllamaOracle {
    fn invoke(&self, prompt: &str, system: &str) -> Result<OracleResponse, OracleError> {
        let _span = tracing::debug_span!("oracle_invoke", model = %self.model).entered();
        let started = std::time::Instant::now();

        let result = match self.endpoint {
            OracleEndpoint::Generate => self.generate(prompt, system),
            OracleEndpoint::Chat => self.chat(prompt, system),
        };

        match &result {
            Ok(_) => tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Oracle answered"),
            Err(e) => tracing::warn!(error = %e, "Oracle call failed"),
        }
        result
    }

    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }
}
