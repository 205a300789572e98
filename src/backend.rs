//! Blocking clients for OpenAI-compatible and Azure OpenAI endpoints.
//!
//! Each call is attempted exactly once; timeouts surface as ordinary errors.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Number, Provider, SearchDataSource, Settings};
use crate::model::Answer;
use crate::pipeline::{Answerer, Embedder};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const SYSTEM_PROMPT: &str = "You are a helpful Assistant";

/// Where requests go and how they authenticate.
#[derive(Debug, Clone)]
struct Target {
    provider: Provider,
    base_url: String,
    api_version: String,
}

impl Target {
    fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = match (settings.provider, settings.endpoint.as_deref()) {
            (_, Some(endpoint)) => endpoint.trim_end_matches('/').to_string(),
            (Provider::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (Provider::Azure, None) => {
                anyhow::bail!("DOCQA_ENDPOINT must be set for the azure provider")
            }
        };
        Ok(Self {
            provider: settings.provider,
            base_url,
            api_version: settings.api_version.clone(),
        })
    }

    /// `operation` is `embeddings` or `chat/completions`.
    fn url(&self, deployment: Option<&str>, operation: &str) -> Result<String> {
        match self.provider {
            Provider::Azure => {
                let deployment = deployment
                    .filter(|d| !d.trim().is_empty())
                    .with_context(|| format!("missing Azure deployment for {}", operation))?;
                Ok(format!(
                    "{}/openai/deployments/{}/{}?api-version={}",
                    self.base_url, deployment, operation, self.api_version
                ))
            }
            Provider::OpenAi => Ok(format!("{}/{}", self.base_url, operation)),
        }
    }

    fn client(&self, api_key: &str, settings: &Settings) -> Result<Client> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing API key");
        let mut headers = HeaderMap::new();
        match self.provider {
            Provider::Azure => {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key.trim()).context("invalid Azure API key")?,
                );
            }
            Provider::OpenAi => {
                let auth = format!("Bearer {}", api_key.trim());
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
                );
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")
    }
}

fn api_key(settings: &Settings) -> Result<&str> {
    settings
        .api_key
        .as_deref()
        .context("DOCQA_API_KEY must be set to call the backend")
}

pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: Option<String>,
}

impl HttpEmbedder {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let target = Target::from_settings(settings)?;
        let endpoint = target.url(settings.embeddings_deployment.as_deref(), "embeddings")?;
        let model = match settings.provider {
            Provider::OpenAi => Some(settings.embeddings_model.clone()),
            Provider::Azure => None,
        };
        Ok(Self {
            client: target.client(api_key(settings)?, settings)?,
            endpoint,
            model,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<Number>,
    #[serde(default)]
    index: usize,
}

fn parse_embeddings(body: &str) -> Result<Vec<Vec<Number>>> {
    let mut parsed: EmbeddingResponse =
        serde_json::from_str(body).context("failed to parse embedding response")?;
    parsed.data.sort_by_key(|entry| entry.index);
    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

impl Embedder for HttpEmbedder {
    fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<Number>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: self.model.as_deref(),
            input: inputs,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .with_context(|| format!("failed to call embeddings endpoint {}", self.endpoint))?;
        let status = resp.status();
        let body = resp
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        if !status.is_success() {
            anyhow::bail!("embeddings request failed ({}): {}", status, body);
        }
        parse_embeddings(&body)
    }
}

pub struct ChatAnswerer {
    client: Client,
    endpoint: String,
    model: Option<String>,
    temperature: f32,
    max_tokens: usize,
    search: Option<SearchDataSource>,
}

impl ChatAnswerer {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let target = Target::from_settings(settings)?;
        let endpoint = target.url(settings.chat_deployment.as_deref(), "chat/completions")?;
        let model = match settings.provider {
            Provider::OpenAi => Some(settings.chat_model.clone()),
            Provider::Azure => None,
        };
        Ok(Self {
            client: target.client(api_key(settings)?, settings)?,
            endpoint,
            model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            search: settings.search.clone(),
        })
    }
}

/// User message sent to the chat model: the bare question, or the context
/// followed by the question.
pub fn build_prompt(question: &str, context: &str) -> String {
    if context.is_empty() {
        question.to_string()
    } else {
        format!("Context:\n{}\n\nQuestion: {}", context, question)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    #[serde(rename = "dataSources", skip_serializing_if = "Vec::is_empty")]
    data_sources: Vec<DataSource<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct DataSource<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    parameters: DataSourceParameters<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceParameters<'a> {
    endpoint: &'a str,
    key: &'a str,
    index_name: &'a str,
}

/// Pulls `choices[0].message.content` out of a chat response, keeping the
/// full payload alongside it.
pub fn parse_answer(raw: Value) -> Answer {
    let text = raw
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Answer { text, raw }
}

impl Answerer for ChatAnswerer {
    fn answer(&self, question: &str, context: &str) -> Result<Answer> {
        let prompt = build_prompt(question, context);
        let data_sources = self
            .search
            .iter()
            .map(|search| DataSource {
                kind: "AzureCognitiveSearch",
                parameters: DataSourceParameters {
                    endpoint: &search.endpoint,
                    key: &search.key,
                    index_name: &search.index,
                },
            })
            .collect();
        let body = ChatRequest {
            model: self.model.as_deref(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            data_sources,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .with_context(|| format!("failed to call chat endpoint {}", self.endpoint))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("chat request failed ({}): {}", status, text);
        }
        let raw: Value = resp.json().context("failed to parse chat response")?;
        Ok(parse_answer(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocqaConfig;
    use serde_json::json;

    fn settings(raw: DocqaConfig) -> Settings {
        Settings::from_raw(raw).unwrap()
    }

    #[test]
    fn azure_urls_use_deployments() {
        let s = settings(DocqaConfig {
            endpoint: Some("https://example.openai.azure.com/".into()),
            ..Default::default()
        });
        let target = Target::from_settings(&s).unwrap();
        assert_eq!(
            target.url(Some("embed"), "embeddings").unwrap(),
            "https://example.openai.azure.com/openai/deployments/embed/embeddings?api-version=2023-09-01-preview"
        );
        assert!(target.url(None, "chat/completions").is_err());
    }

    #[test]
    fn openai_urls_default_base() {
        let s = settings(DocqaConfig {
            provider: Some("openai".into()),
            ..Default::default()
        });
        let target = Target::from_settings(&s).unwrap();
        assert_eq!(
            target.url(None, "chat/completions").unwrap(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn azure_requires_endpoint_and_key() {
        let s = settings(DocqaConfig::default());
        assert!(Target::from_settings(&s).is_err());
        let s = settings(DocqaConfig {
            endpoint: Some("https://example".into()),
            embeddings_deployment: Some("embed".into()),
            ..Default::default()
        });
        assert!(HttpEmbedder::from_settings(&s).is_err());
    }

    #[test]
    fn prompt_includes_context_only_when_present() {
        assert_eq!(build_prompt("Why?", ""), "Why?");
        assert_eq!(
            build_prompt("Why?", "[chunk-0] because"),
            "Context:\n[chunk-0] because\n\nQuestion: Why?"
        );
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let body = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        })
        .to_string();
        assert_eq!(
            parse_embeddings(&body).unwrap(),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]]
        );
        assert!(parse_embeddings("not json").is_err());
    }

    #[test]
    fn answer_text_extracted_from_first_choice() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "42"}}]});
        let answer = parse_answer(raw.clone());
        assert_eq!(answer.text, "42");
        assert_eq!(answer.raw, raw);
        assert_eq!(parse_answer(json!({"choices": []})).text, "");
    }

    #[test]
    fn chat_request_serializes_search_source() {
        let body = ChatRequest {
            model: None,
            messages: vec![],
            max_tokens: 10,
            temperature: 0.5,
            data_sources: vec![DataSource {
                kind: "AzureCognitiveSearch",
                parameters: DataSourceParameters {
                    endpoint: "https://search",
                    key: "k",
                    index_name: "idx",
                },
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("model").is_none());
        assert_eq!(value["dataSources"][0]["parameters"]["indexName"], "idx");
    }
}
