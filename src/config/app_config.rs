use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ingestion::{ChunkingConfig, ChunkingType, ContextFailurePolicy};
use crate::domain::retry::RetryPolicy;
use crate::domain::search::FusionWeights;
use crate::domain::DomainError;
use crate::infrastructure::ingestion::PipelineSettings;
use crate::infrastructure::search::RetrievalSettings;

/// Application configuration, loaded once at start-up and passed by handle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub retrieval: RetrievalConfig,
    pub chunking: ChunkingSection,
    pub ingestion: IngestionConfig,
    pub retry: RetryPolicy,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RerankerKind {
    #[default]
    Passthrough,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    pub top_k_per_source: usize,
    pub top_n: usize,
    pub reranker: RerankerKind,
    pub vector_collection: String,
    /// Int8 first pass, exact retry when it finds nothing
    pub quantized_search: bool,
    pub score_threshold: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.8,
            lexical_weight: 0.2,
            top_k_per_source: 20,
            top_n: 5,
            reranker: RerankerKind::default(),
            vector_collection: "chunks".to_string(),
            quantized_search: true,
            score_threshold: None,
        }
    }
}

impl RetrievalConfig {
    pub fn settings(&self) -> Result<RetrievalSettings, DomainError> {
        Ok(RetrievalSettings {
            weights: FusionWeights::new(self.semantic_weight, self.lexical_weight)?,
            top_n: self.top_n,
            vector_collection: self.vector_collection.clone(),
            score_threshold: self.score_threshold,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSection {
    pub strategy: ChunkingType,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    pub breakpoint_percentile: f64,
}

impl Default for ChunkingSection {
    fn default() -> Self {
        let defaults = ChunkingConfig::default();

        Self {
            strategy: ChunkingType::default(),
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
            min_chunk_size: defaults.min_chunk_size,
            breakpoint_percentile: 95.0,
        }
    }
}

impl ChunkingSection {
    pub fn config(&self) -> ChunkingConfig {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
            .with_min_chunk_size(self.min_chunk_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub max_concurrent_jobs: usize,
    pub contextualize_concurrency: usize,
    pub contextualize_timeout_ms: u64,
    pub context_failure_policy: ContextFailurePolicy,
    pub bucket: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            contextualize_concurrency: 8,
            contextualize_timeout_ms: 30_000,
            context_failure_policy: ContextFailurePolicy::default(),
            bucket: "uploads".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub embedding_model: String,
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            request_timeout_ms: 60_000,
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Result<String, DomainError> {
        std::env::var(&self.api_key_env).map_err(|_| {
            DomainError::configuration(format!(
                "Environment variable {} is not set",
                self.api_key_env
            ))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub object_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            object_root: "./data/objects".to_string(),
        }
    }
}

impl AppConfig {
    /// Layers `config/default`, `config/local` and `APP__SECTION__KEY`
    /// environment variables, after loading `.env`
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: Self = config.try_deserialize()?;
        app.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.retrieval.settings()?;
        self.chunking.config().validate()?;

        if !(0.0..=100.0).contains(&self.chunking.breakpoint_percentile) {
            return Err(DomainError::configuration(
                "chunking.breakpoint_percentile must be within 0..=100",
            ));
        }

        if self.retrieval.top_k_per_source == 0 || self.retrieval.top_n == 0 {
            return Err(DomainError::configuration(
                "retrieval.top_k_per_source and retrieval.top_n must be greater than 0",
            ));
        }

        if self.ingestion.max_concurrent_jobs == 0 || self.ingestion.contextualize_concurrency == 0
        {
            return Err(DomainError::configuration(
                "ingestion concurrency limits must be greater than 0",
            ));
        }

        if self.ingestion.contextualize_timeout_ms == 0 {
            return Err(DomainError::configuration(
                "ingestion.contextualize_timeout_ms must be greater than 0",
            ));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(DomainError::configuration(
                "retry.backoff_multiplier must be at least 1.0",
            ));
        }

        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            bucket: self.ingestion.bucket.clone(),
            vector_collection: self.retrieval.vector_collection.clone(),
            contextualize_concurrency: self.ingestion.contextualize_concurrency,
            contextualize_timeout: Duration::from_millis(self.ingestion.contextualize_timeout_ms),
            context_failure_policy: self.ingestion.context_failure_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.semantic_weight, 0.8);
        assert_eq!(config.retrieval.lexical_weight, 0.2);
        assert_eq!(config.chunking.strategy, ChunkingType::Semantic);
        assert_eq!(config.ingestion.context_failure_policy, ContextFailurePolicy::Blank);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.retrieval.lexical_weight = -0.1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ingestion.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let json = serde_json::json!({
            "retrieval": { "top_n": 3, "reranker": "llm" },
            "ingestion": { "context_failure_policy": "abort" },
            "logging": { "format": "json" }
        });

        let config: AppConfig = serde_json::from_value(json).unwrap();

        assert_eq!(config.retrieval.top_n, 3);
        assert_eq!(config.retrieval.reranker, RerankerKind::Llm);
        assert_eq!(config.retrieval.top_k_per_source, 20);
        assert_eq!(config.ingestion.context_failure_policy, ContextFailurePolicy::Abort);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_pipeline_settings_follow_config() {
        let mut config = AppConfig::default();
        config.ingestion.contextualize_timeout_ms = 1500;
        config.retrieval.vector_collection = "docs".to_string();

        let settings = config.pipeline_settings();

        assert_eq!(settings.contextualize_timeout, Duration::from_millis(1500));
        assert_eq!(settings.vector_collection, "docs");
        assert_eq!(settings.bucket, "uploads");
    }
}
