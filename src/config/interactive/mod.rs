
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, Secrets};
use crate::database::DistanceMetric;
use crate::embeddings::ChunkingConfig;

#[inline]
pub fn run_interactive_config(path: Option<&Path>) -> Result<()> {
    eprintln!("{}", style("🔧 pgvector-rag Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(path);

    eprintln!("{}", style("Models").bold().yellow());
    eprintln!("Embedding and chat models served by an OpenAI-compatible API.");
    eprintln!();
    configure_models(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    configure_retrieval(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Chunking").bold().yellow());
    configure_chunking(&mut config.chunking)?;

    eprintln!();
    eprintln!("{}", style("Testing API endpoint...").yellow());
    if test_api_connection(&config.embedding.base_url) {
        eprintln!("{}", style("✓ API endpoint reachable").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the API endpoint").yellow()
        );
        eprintln!("You can continue, but ingestion and chat will fail until it is reachable.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        let config_path = target_path(path)?;
        config
            .save(&config_path)
            .context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config_path.display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(path: Option<&Path>) -> Result<()> {
    let config = Config::load(path).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.embedding.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());

    eprintln!("{}", style("Chat:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.chat.base_url).cyan());
    eprintln!("  Model: {}", style(&config.chat.model).cyan());
    eprintln!("  Temperature: {}", style(config.chat.temperature).cyan());

    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Collection: {}", style(&config.retrieval.collection).cyan());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!("  Distance: {}", style(config.retrieval.distance).cyan());
    eprintln!(
        "  Chunks: {} chars, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!("{}", style("Environment:").bold().yellow());
    match Secrets::from_env() {
        Ok(secrets) => {
            eprintln!("  API key: {}", style("set").green());
            eprintln!(
                "  Database: {}",
                style(secrets.redacted_database_url()).cyan()
            );
        }
        Err(e) => eprintln!("  {} ({})", style("Incomplete").red(), e),
    }

    eprintln!();
    eprintln!("Config file: {}", style(target_path(path)?.display()).dim());

    Ok(())
}

fn target_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::default_config_path().context("Failed to get config file path"),
    }
}

fn load_existing_config(path: Option<&Path>) -> Config {
    Config::load(path).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config::default()
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_models(config: &mut Config) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(config.embedding.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let mut candidate = config.embedding.clone();
            candidate.base_url.clone_from(input);
            candidate.validate()
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(config.embedding.model.clone())
        .validate_with(|input: &String| non_empty(input))
        .interact_text()?;

    let dimension: usize = Input::new()
        .with_prompt("Embedding dimension")
        .default(config.embedding.dimension)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=16_000).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 1 and 16000")
            }
        })
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(config.chat.model.clone())
        .validate_with(|input: &String| non_empty(input))
        .interact_text()?;

    config.embedding.base_url.clone_from(&base_url);
    config.chat.base_url = base_url;
    config.embedding.model = model;
    config.embedding.dimension = dimension;
    config.chat.model = chat_model;

    Ok(())
}

fn configure_retrieval(config: &mut Config) -> Result<()> {
    let collection: String = Input::new()
        .with_prompt("Collection name")
        .default(config.retrieval.collection.clone())
        .validate_with(|input: &String| non_empty(input))
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Top K must be between 1 and 100")
            }
        })
        .interact_text()?;

    let metrics = [DistanceMetric::Cosine, DistanceMetric::L2];
    let labels: Vec<&str> = metrics.iter().map(|m| m.as_str()).collect();
    let default_index = metrics
        .iter()
        .position(|&m| m == config.retrieval.distance)
        .unwrap_or(0);
    let index = Select::new()
        .with_prompt("Distance for new collections")
        .default(default_index)
        .items(&labels)
        .interact()?;

    config.retrieval.collection = collection;
    config.retrieval.top_k = top_k;
    config.retrieval.distance = metrics[index];

    Ok(())
}

fn configure_chunking(chunking: &mut ChunkingConfig) -> Result<()> {
    let chunk_size: usize = Input::new()
        .with_prompt("Chunk size (characters)")
        .default(chunking.chunk_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Chunk size must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let chunk_overlap: usize = Input::new()
        .with_prompt("Chunk overlap (characters)")
        .default(chunking.chunk_overlap.min(chunk_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            ChunkingConfig {
                chunk_size,
                chunk_overlap: *input,
            }
            .validate()
        })
        .interact_text()?;

    chunking.chunk_size = chunk_size;
    chunking.chunk_overlap = chunk_overlap;

    Ok(())
}

fn non_empty(input: &str) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Value cannot be empty")
    } else {
        Ok(())
    }
}

/// Any HTTP answer means the host is reachable; auth is checked later.
fn test_api_connection(base_url: &str) -> bool {
    let url = crate::http::endpoint(base_url, "models");
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) | Err(ureq::Error::StatusCode(_)) => true,
        Err(_) => false,
    }
}
