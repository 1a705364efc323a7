//! Infrastructure layer - concrete collaborators and the services wiring them

pub mod embedding;
pub mod ingestion;
pub mod jobs;
pub mod llm;
pub mod locks;
pub mod logging;
pub mod object_store;
pub mod search;
pub mod services;
pub mod storage;
