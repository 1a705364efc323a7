//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, ChunkingSection, IngestionConfig, LlmConfig, LogFormat, LoggingConfig,
    RerankerKind, RetrievalConfig, StorageConfig,
};
