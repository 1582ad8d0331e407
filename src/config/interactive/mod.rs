use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, EmbeddingConfig};
use crate::embeddings::ollama::OllamaClient;

#[inline]
pub async fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Rulebook QA Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    eprintln!("Configure the embedding endpoint used for indexing and search.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;
    configure_chunking(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_embedding_connection(&config).await {
        eprintln!("{}", style("✓ Embedding provider reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the embedding provider").yellow()
        );
        eprintln!("You can continue, but make sure it is running before indexing.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());

        let config_path = config
            .config_file_path()
            .context("Failed to get config file path")?;
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
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.embedding.host).cyan());
    eprintln!("  Port: {}", style(config.embedding.port).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());

    eprintln!();
    eprintln!("{}", style("Chunking Settings:").bold().yellow());
    eprintln!("  Target Size: {}", style(config.chunking.target_size).cyan());
    eprintln!("  Overlap: {}", style(config.chunking.overlap).cyan());

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Synthesis Top K: {}",
        style(config.retrieval.synthesis_top_k).cyan()
    );
    eprintln!("  Min Score: {}", style(config.retrieval.min_score).cyan());

    eprintln!();
    match config.embedding.endpoint_url() {
        Ok(url) => eprintln!("  Endpoint URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint URL: {} ({})", style("Invalid").red(), e),
    }

    let config_path = config
        .config_file_path()
        .context("Failed to get config file path")?;
    eprintln!();
    eprintln!("Config file: {}", style(config_path.display()).dim());

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == embedding.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Provider protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;
    embedding.protocol = protocols[protocol_index].to_string();

    embedding.host = Input::new()
        .with_prompt("Provider host")
        .default(embedding.host.clone())
        .interact_text()?;

    embedding.port = Input::new()
        .with_prompt("Provider port")
        .default(embedding.port)
        .validate_with(|input: &u16| -> Result<(), ConfigError> {
            if *input == 0 {
                Err(ConfigError::InvalidPort(*input))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.model = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            if input.trim().is_empty() {
                Err(ConfigError::InvalidModel(input.clone()))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.dimension = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), ConfigError> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err(ConfigError::InvalidEmbeddingDimension(*input))
            }
        })
        .interact_text()?;

    Ok(())
}

fn configure_chunking(config: &mut Config) -> Result<()> {
    eprintln!();
    eprintln!("{}", style("Chunking").bold().yellow());

    config.chunking.target_size = Input::new()
        .with_prompt("Target chunk size (characters)")
        .default(config.chunking.target_size)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            if (100..=4000).contains(input) {
                Ok(())
            } else {
                Err(ConfigError::InvalidTargetChunkSize(*input))
            }
        })
        .interact_text()?;

    let target = config.chunking.target_size;
    config.chunking.overlap = Input::new()
        .with_prompt("Chunk overlap (characters)")
        .default(config.chunking.overlap.min(target - 1))
        .validate_with(move |input: &usize| -> Result<(), ConfigError> {
            if *input > 512 {
                Err(ConfigError::InvalidOverlap(*input))
            } else if *input >= target {
                Err(ConfigError::OverlapTooLarge(*input, target))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    Ok(())
}

async fn test_embedding_connection(config: &Config) -> bool {
    match OllamaClient::new(&config.embedding) {
        Ok(client) => client.ping().await.is_ok(),
        Err(_) => false,
    }
}
