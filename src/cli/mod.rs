//! CLI for the contextual retrieval engine
//!
//! Subcommands:
//! - `ask`: ingest files into a throwaway engine and answer one question
//! - `config`: print the resolved configuration

pub mod ask;
pub mod show_config;

use clap::{Parser, Subcommand};

/// Contextual retrieval over your own documents
#[derive(Parser)]
#[command(name = "contextual-rag")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest files and answer a question from them
    Ask(ask::AskArgs),

    /// Print the resolved configuration as JSON
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_ask_with_parent() {
        let cli = Cli::try_parse_from([
            "contextual-rag",
            "ask",
            "--kb",
            "guide",
            "--file",
            "a.md",
            "--file",
            "b.txt",
            "--parent-kb",
            "base",
            "--parent-file",
            "c.pdf",
            "--question",
            "how long do kettles take",
        ])
        .unwrap();

        let Command::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(args.kb, "guide");
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.parent_kb.as_deref(), Some("base"));
        assert_eq!(args.parent_files.len(), 1);
    }

    #[test]
    fn test_parent_files_require_parent_kb() {
        let result = Cli::try_parse_from([
            "contextual-rag",
            "ask",
            "--kb",
            "guide",
            "--file",
            "a.md",
            "--parent-file",
            "c.pdf",
            "--question",
            "q",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_parses_config() {
        let cli = Cli::try_parse_from(["contextual-rag", "config"]).unwrap();
        assert!(matches!(cli.command, Command::Config));
    }
}
