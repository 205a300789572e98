use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: usize = 3;

/// Raw values as they come out of the layered config sources. Everything is
/// optional here; defaults and validation happen in [`Settings::from_config`].
#[derive(Debug, Default)]
pub struct DocqaConfig {
    pub document_path: Option<String>,
    pub questions_path: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub concurrency: Option<usize>,
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub chat_deployment: Option<String>,
    pub chat_model: Option<String>,
    pub embeddings_deployment: Option<String>,
    pub embeddings_model: Option<String>,
    pub api_version: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub isolate_answer_failures: Option<bool>,
    pub snap_to_expected: Option<bool>,
    pub search_endpoint: Option<String>,
    pub search_key: Option<String>,
    pub search_index: Option<String>,
}

fn lookup<T: DeserializeOwned>(config: &Config, key: &str) -> Result<Option<T>, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

impl DocqaConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(DocqaConfig {
            document_path: lookup(config, "document_path")?,
            questions_path: lookup(config, "questions_path")?,
            chunk_size: lookup(config, "chunk_size")?,
            chunk_overlap: lookup(config, "chunk_overlap")?,
            top_k: lookup(config, "top_k")?,
            concurrency: lookup(config, "concurrency")?,
            provider: lookup(config, "provider")?,
            endpoint: lookup(config, "endpoint")?,
            api_key: lookup(config, "api_key")?,
            chat_deployment: lookup(config, "chat_deployment")?,
            chat_model: lookup(config, "chat_model")?,
            embeddings_deployment: lookup(config, "embeddings_deployment")?,
            embeddings_model: lookup(config, "embeddings_model")?,
            api_version: lookup(config, "api_version")?,
            temperature: lookup(config, "temperature")?,
            max_tokens: lookup(config, "max_tokens")?,
            timeout_secs: lookup(config, "timeout_secs")?,
            isolate_answer_failures: lookup(config, "isolate_answer_failures")?,
            snap_to_expected: lookup(config, "snap_to_expected")?,
            search_endpoint: lookup(config, "search_endpoint")?,
            search_key: lookup(config, "search_key")?,
            search_index: lookup(config, "search_index")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Azure,
    OpenAi,
}

impl Provider {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "azure" => Ok(Provider::Azure),
            "openai" => Ok(Provider::OpenAi),
            other => anyhow::bail!("unknown provider '{}' (expected 'azure' or 'openai')", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Azure => "azure",
            Provider::OpenAi => "openai",
        }
    }
}

/// Optional Azure Cognitive Search data source forwarded with chat requests.
#[derive(Debug, Clone)]
pub struct SearchDataSource {
    pub endpoint: String,
    pub key: String,
    pub index: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub document_path: String,
    pub questions_path: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub concurrency: usize,
    pub provider: Provider,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub chat_deployment: Option<String>,
    pub chat_model: String,
    pub embeddings_deployment: Option<String>,
    pub embeddings_model: String,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
    pub isolate_answer_failures: bool,
    pub snap_to_expected: bool,
    pub search: Option<SearchDataSource>,
}

impl Settings {
    /// Loads `docqa_config.*` from the working directory (if present) and then
    /// `DOCQA_*` environment variables on top of it.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name("docqa_config").required(false))
            .add_source(Environment::with_prefix("DOCQA"))
            .build()
            .context("failed to read docqa configuration")?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let raw = DocqaConfig::try_from(config).context("invalid docqa configuration value")?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: DocqaConfig) -> Result<Self> {
        let provider = Provider::parse(raw.provider.as_deref().unwrap_or("azure"))?;

        let search = match (raw.search_endpoint, raw.search_key, raw.search_index) {
            (Some(endpoint), Some(key), Some(index)) => Some(SearchDataSource {
                endpoint,
                key,
                index,
            }),
            (None, None, None) => None,
            _ => anyhow::bail!(
                "search_endpoint, search_key and search_index must be configured together"
            ),
        };

        let settings = Self {
            document_path: raw
                .document_path
                .unwrap_or_else(|| "sustainable-finance-impact-report.pdf".to_string()),
            questions_path: raw
                .questions_path
                .unwrap_or_else(|| "questions.csv".to_string()),
            chunk_size: raw.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: raw.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            top_k: raw.top_k.unwrap_or(DEFAULT_TOP_K),
            concurrency: raw.concurrency.unwrap_or(1),
            provider,
            endpoint: raw.endpoint.filter(|s| !s.trim().is_empty()),
            api_key: raw.api_key.filter(|s| !s.trim().is_empty()),
            chat_deployment: raw.chat_deployment,
            chat_model: raw.chat_model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            embeddings_deployment: raw.embeddings_deployment,
            embeddings_model: raw
                .embeddings_model
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            api_version: raw
                .api_version
                .unwrap_or_else(|| "2023-09-01-preview".to_string()),
            temperature: raw.temperature.unwrap_or(0.5),
            max_tokens: raw.max_tokens.unwrap_or(1000),
            timeout: Duration::from_secs(raw.timeout_secs.unwrap_or(60)),
            isolate_answer_failures: raw.isolate_answer_failures.unwrap_or(false),
            snap_to_expected: raw.snap_to_expected.unwrap_or(false),
            search,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("DOCQA_CHUNK_SIZE must be greater than zero.");
        }
        if self.chunk_overlap >= self.chunk_size {
            anyhow::bail!(
                "DOCQA_CHUNK_OVERLAP ({}) must be smaller than DOCQA_CHUNK_SIZE ({}).",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.concurrency == 0 {
            anyhow::bail!("DOCQA_CONCURRENCY must be at least 1.");
        }
        Ok(())
    }

    pub fn print_config(&self) {
        println!("document_path={}", self.document_path);
        println!("questions_path={}", self.questions_path);
        println!("chunk_size={}", self.chunk_size);
        println!("chunk_overlap={}", self.chunk_overlap);
        println!("top_k={}", self.top_k);
        println!("concurrency={}", self.concurrency);
        println!("provider={}", self.provider.as_str());
        println!("endpoint={}", self.endpoint.as_deref().unwrap_or(""));
        println!("api_key={}", mask(self.api_key.as_deref()));
        println!("chat_deployment={}", self.chat_deployment.as_deref().unwrap_or(""));
        println!("chat_model={}", self.chat_model);
        println!(
            "embeddings_deployment={}",
            self.embeddings_deployment.as_deref().unwrap_or("")
        );
        println!("embeddings_model={}", self.embeddings_model);
        println!("api_version={}", self.api_version);
        println!("temperature={}", self.temperature);
        println!("max_tokens={}", self.max_tokens);
        println!("timeout_secs={}", self.timeout.as_secs());
        println!("isolate_answer_failures={}", self.isolate_answer_failures);
        println!("snap_to_expected={}", self.snap_to_expected);
        if let Some(search) = &self.search {
            println!("search_endpoint={}", search.endpoint);
            println!("search_key={}", mask(Some(&search.key)));
            println!("search_index={}", search.index);
        }
    }
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        Some(s) if s.chars().count() > 4 => {
            let tail: String = s.chars().skip(s.chars().count() - 4).collect();
            format!("****{}", tail)
        }
        Some(_) => "****".to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn defaults_match_reference_pipeline() {
        let settings = Settings::from_config(&config_from(&[])).unwrap();
        assert_eq!(settings.chunk_size, 1000);
        assert_eq!(settings.chunk_overlap, 200);
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.provider, Provider::Azure);
        assert!(!settings.isolate_answer_failures);
        assert!(settings.search.is_none());
    }

    #[test]
    fn string_values_are_coerced() {
        let settings = Settings::from_config(&config_from(&[
            ("chunk_size", "500"),
            ("chunk_overlap", "50"),
            ("isolate_answer_failures", "true"),
            ("provider", "OpenAI"),
        ]))
        .unwrap();
        assert_eq!(settings.chunk_size, 500);
        assert_eq!(settings.chunk_overlap, 50);
        assert!(settings.isolate_answer_failures);
        assert_eq!(settings.provider, Provider::OpenAi);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_window() {
        let err = Settings::from_config(&config_from(&[
            ("chunk_size", "100"),
            ("chunk_overlap", "100"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DOCQA_CHUNK_OVERLAP"));
    }

    #[test]
    fn rejects_partial_search_source() {
        let raw = DocqaConfig {
            search_endpoint: Some("https://search".to_string()),
            ..Default::default()
        };
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn masks_secrets() {
        assert_eq!(mask(Some("abcdef123")), "****f123");
        assert_eq!(mask(Some("abc")), "****");
        assert_eq!(mask(None), "");
    }
}
