//! Ask command - ingests files into an in-process engine and answers a question

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::document::DocumentStatus;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::infrastructure::services::CreateKnowledgeBaseRequest;
use crate::Engine;

const CLI_OWNER: &str = "cli";

/// Arguments for the ask command
#[derive(Args, Clone, Debug)]
pub struct AskArgs {
    /// Knowledge base to create and query
    #[arg(long)]
    pub kb: String,

    /// Files ingested into `--kb`
    #[arg(long = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Knowledge base that `--kb` inherits from
    #[arg(long)]
    pub parent_kb: Option<String>,

    /// Files ingested into `--parent-kb`
    #[arg(long = "parent-file", requires = "parent_kb")]
    pub parent_files: Vec<PathBuf>,

    #[arg(long, short)]
    pub question: String,

    /// Seconds to wait for each document to finish ingesting
    #[arg(long, default_value_t = 300)]
    pub ingest_timeout_secs: u64,
}

/// Run the ask command
pub async fn run(config: AppConfig, args: AskArgs) -> anyhow::Result<()> {
    let engine = crate::create_engine(config).await?;
    let result = ask(&engine, &args).await;
    engine.shutdown().await;

    println!("{}", result?);
    Ok(())
}

async fn ask(engine: &Engine, args: &AskArgs) -> anyhow::Result<String> {
    let timeout = Duration::from_secs(args.ingest_timeout_secs);
    let kb = create_knowledge_base(engine, &args.kb).await?;
    ingest_all(engine, &kb, &args.files, timeout).await?;

    if let Some(ref parent) = args.parent_kb {
        let parent = create_knowledge_base(engine, parent).await?;
        ingest_all(engine, &parent, &args.parent_files, timeout).await?;
        engine
            .knowledge_bases()
            .inherit(&parent, Some(&kb))
            .await
            .with_context(|| format!("{} cannot inherit from {}", kb, parent))?;
    }

    let output = engine.ask(&kb, &args.question).await?;
    info!(contexts = output.contexts.len(), "Question answered");
    Ok(output.answer)
}

async fn create_knowledge_base(engine: &Engine, name: &str) -> anyhow::Result<KnowledgeBaseId> {
    let kb = engine
        .knowledge_bases()
        .create(CreateKnowledgeBaseRequest::new(CLI_OWNER, name).with_id(name))
        .await?;
    Ok(kb.id().clone())
}

async fn ingest_all(
    engine: &Engine,
    kb: &KnowledgeBaseId,
    files: &[PathBuf],
    timeout: Duration,
) -> anyhow::Result<()> {
    for path in files {
        let document = engine
            .ingest_path(kb, path, timeout)
            .await
            .with_context(|| format!("failed to ingest {}", path.display()))?;

        if document.status() == DocumentStatus::Failed {
            bail!(
                "ingestion of {} failed: {}",
                path.display(),
                document.last_error().unwrap_or("unknown error")
            );
        }
        info!(file = %path.display(), document_id = %document.id(), "Ingested");
    }
    Ok(())
}
