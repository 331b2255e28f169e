use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use pgvector_rag::RagError;
use pgvector_rag::commands::{
    ask_question, chat_session, drop_collection, ingest_documents, show_status, verify_setup,
};
use pgvector_rag::config::{Config, ConfigError, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "pgvector-rag")]
#[command(about = "Chat with your PDF documents using OpenAI and PostgreSQL/pgvector")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "PGVECTOR_RAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or show the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Load PDFs from a directory into a collection
    Ingest {
        /// Directory containing the PDF files (defaults to the configured data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Collection to write to
        #[arg(long)]
        collection: Option<String>,
        /// Chunk the documents and report counts without embedding or storing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Start an interactive chat session over the ingested documents
    Chat {
        /// Collection to search
        #[arg(long)]
        collection: Option<String>,
    },
    /// Answer a single question
    Ask {
        /// The question to answer
        question: String,
        /// Collection to search
        #[arg(long)]
        collection: Option<String>,
        /// List the retrieved chunks after the answer
        #[arg(long)]
        sources: bool,
    },
    /// Show database and collection status
    Status {
        /// Collection to inspect
        #[arg(long)]
        collection: Option<String>,
    },
    /// Check the environment and run a round trip against the database
    Verify,
    /// Drop a collection and all of its records
    Drop {
        /// Collection to drop
        #[arg(long)]
        collection: Option<String>,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), err);
            let code = exit_code(&err);
            if let Some(hint) = err
                .chain()
                .find_map(|e| e.downcast_ref::<RagError>())
                .and_then(RagError::hint)
            {
                eprintln!("{}", style(hint).dim());
            }
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = cli.config.as_deref();

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(path)?;
        } else {
            run_interactive_config(path)?;
        }
        return Ok(());
    }

    let config = Config::load(path).map_err(RagError::from)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Ingest {
            data_dir,
            collection,
            dry_run,
        } => {
            ingest_documents(&config, data_dir, collection, dry_run).await?;
        }
        Commands::Chat { collection } => {
            chat_session(&config, collection).await?;
        }
        Commands::Ask {
            question,
            collection,
            sources,
        } => {
            ask_question(&config, &question, collection, sources).await?;
        }
        Commands::Status { collection } => {
            show_status(&config, collection).await?;
        }
        Commands::Verify => {
            verify_setup(&config).await?;
        }
        Commands::Drop { collection, yes } => {
            drop_collection(&config, collection, yes).await?;
        }
    }

    Ok(())
}

/// Map a failure to the documented process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(rag) = err.chain().find_map(|e| e.downcast_ref::<RagError>()) {
        return rag.exit_code();
    }
    if err.chain().any(|e| e.is::<ConfigError>()) {
        return 2;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["pgvector-rag", "verify"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Verify));
        }
    }

    #[test]
    fn ingest_defaults() {
        let parsed = Cli::try_parse_from(["pgvector-rag", "ingest"]).expect("should parse ingest");

        if let Commands::Ingest {
            data_dir,
            collection,
            dry_run,
        } = parsed.command
        {
            assert_eq!(data_dir, None);
            assert_eq!(collection, None);
            assert!(!dry_run);
        } else {
            panic!("expected ingest command");
        }
    }

    #[test]
    fn ingest_with_options() {
        let parsed = Cli::try_parse_from([
            "pgvector-rag",
            "ingest",
            "--data-dir",
            "./pdfs",
            "--collection",
            "manuals",
            "--dry-run",
        ])
        .expect("should parse ingest options");

        if let Commands::Ingest {
            data_dir,
            collection,
            dry_run,
        } = parsed.command
        {
            assert_eq!(data_dir, Some(PathBuf::from("./pdfs")));
            assert_eq!(collection, Some("manuals".to_string()));
            assert!(dry_run);
        } else {
            panic!("expected ingest command");
        }
    }

    #[test]
    fn ask_takes_question() {
        let parsed = Cli::try_parse_from([
            "pgvector-rag",
            "ask",
            "What is pgvector?",
            "--sources",
        ])
        .expect("should parse ask");

        if let Commands::Ask {
            question, sources, ..
        } = parsed.command
        {
            assert_eq!(question, "What is pgvector?");
            assert!(sources);
        } else {
            panic!("expected ask command");
        }
    }

    #[test]
    fn global_config_flag() {
        let parsed = Cli::try_parse_from([
            "pgvector-rag",
            "status",
            "--config",
            "/etc/rag.toml",
        ])
        .expect("should parse global flag after subcommand");
        assert_eq!(parsed.config, Some(PathBuf::from("/etc/rag.toml")));
    }

    #[test]
    fn drop_yes_flag() {
        let parsed =
            Cli::try_parse_from(["pgvector-rag", "drop", "-y"]).expect("should parse drop");
        assert!(matches!(parsed.command, Commands::Drop { yes: true, .. }));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["pgvector-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Config { show: true }));
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["pgvector-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["pgvector-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }

    #[test]
    fn exit_codes_come_from_rag_errors() {
        let err: anyhow::Error = RagError::RateLimited {
            service: "OpenAI embeddings".to_string(),
            attempts: 3,
        }
        .into();
        assert_eq!(exit_code(&err), 5);

        let wrapped = anyhow::Error::from(RagError::NoDocuments(PathBuf::from("data")))
            .context("Failed to ingest documents from data");
        assert_eq!(exit_code(&wrapped), 4);

        let config: anyhow::Error = ConfigError::MissingVariable("OPENAI_API_KEY").into();
        assert_eq!(exit_code(&config), 2);

        assert_eq!(exit_code(&anyhow::anyhow!("something else")), 1);
    }
}
