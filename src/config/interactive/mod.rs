
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Config, ConfigError, EncoderBackend, OllamaConfig};
use crate::embeddings::OllamaClient;
use crate::policy::{DialogMode, MAX_SUGGESTIONS_LIMIT, TierPolicy};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 FAQ Retriever Configuration Setup").bold().cyan());
    eprintln!();

    let config_dir = Config::config_dir().context("Failed to locate config directory")?;
    let mut config = load_existing_config(&config_dir)?;

    eprintln!("{}", style("Encoder").bold().yellow());
    configure_backend(&mut config)?;

    match config.encoder.backend {
        EncoderBackend::Ollama => {
            eprintln!();
            eprintln!("{}", style("Ollama Configuration").bold().yellow());
            eprintln!("Configure the local Ollama instance serving the embedding model.");
            eprintln!();
            configure_ollama(&mut config.ollama)?;
        }
        EncoderBackend::Hashed => {
            eprintln!(
                "{}",
                style("Hashed n-gram encoder selected: no server needed, lexical matching only.")
                    .dim()
            );
        }
    }

    eprintln!();
    eprintln!("{}", style("Knowledge Base").bold().yellow());
    configure_paths(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Answer Thresholds").bold().yellow());
    eprintln!("Scores at or above 'high' answer directly; between 'low' and 'high' suggest.");
    for mode in [DialogMode::FaqSearch, DialogMode::FreeDialog] {
        let tiers = match mode {
            DialogMode::FaqSearch => &mut config.policy.faq_search,
            DialogMode::FreeDialog => &mut config.policy.free_dialog,
        };
        configure_tiers(mode, tiers)?;
    }

    if config.encoder.backend == EncoderBackend::Ollama {
        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        match test_ollama_connection(&config.ollama) {
            Ok(()) => eprintln!("{}", style("✓ Ollama connection successful!").green()),
            Err(e) => {
                eprintln!(
                    "{}",
                    style("⚠ Warning: Could not use the configured model").yellow()
                );
                eprintln!("  {}", style(e).dim());
                eprintln!("You can continue, but make sure Ollama is running before building.");
            }
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Encoder:").bold().yellow());
    eprintln!("  Backend: {}", style(backend_name(config.encoder.backend)).cyan());
    eprintln!("  Model ID: {}", style(config.model_id()).cyan());

    if config.encoder.backend == EncoderBackend::Ollama {
        eprintln!();
        eprintln!("{}", style("Ollama Settings:").bold().yellow());
        match config.ollama_url() {
            Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
            Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
        }
        eprintln!("  Model: {}", style(&config.ollama.model).cyan());
        eprintln!(
            "  Dimension: {}",
            style(config.ollama.embedding_dimension).cyan()
        );
        eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
        eprintln!(
            "  Timeout: {}s, {} attempts",
            style(config.ollama.timeout_secs).cyan(),
            style(config.ollama.retry_attempts).cyan()
        );
    } else {
        eprintln!("  Dimension: {}", style(config.hashed.dimension).cyan());
    }

    eprintln!();
    eprintln!("{}", style("Paths:").bold().yellow());
    eprintln!("  Catalog: {}", style(config.catalog_path().display()).cyan());
    eprintln!("  Index: {}", style(config.index_dir().display()).cyan());

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    for mode in [DialogMode::FaqSearch, DialogMode::FreeDialog] {
        eprintln!("  {}", describe_tiers(mode, config.policy.for_mode(mode)));
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    if config_dir.join("config.toml").exists() {
        let config = Config::load(config_dir)?;
        eprintln!("{}", style("Found existing configuration.").green());
        Ok(config)
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        Config::load(config_dir)
    }
}

const fn backend_name(backend: EncoderBackend) -> &'static str {
    match backend {
        EncoderBackend::Ollama => "ollama",
        EncoderBackend::Hashed => "hashed",
    }
}

fn describe_tiers(mode: DialogMode, tiers: &TierPolicy) -> String {
    format!(
        "{:<6} direct >= {:.2}, suggest >= {:.2} (up to {})",
        mode.to_string(),
        tiers.high,
        tiers.low,
        tiers.max_suggestions
    )
}

fn configure_backend(config: &mut Config) -> Result<()> {
    let backends = [EncoderBackend::Ollama, EncoderBackend::Hashed];
    let labels = &[
        "ollama (multilingual sentence embeddings)",
        "hashed (offline n-gram hashing)",
    ];
    let default_index = backends
        .iter()
        .position(|b| *b == config.encoder.backend)
        .unwrap_or(0);

    let selected = Select::new()
        .with_prompt("Encoder backend")
        .default(default_index)
        .items(labels)
        .interact()?;

    config.encoder.backend = backends[selected];
    Ok(())
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            }
            .validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension of this model")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_embedding_dimension(dimension)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_paths(config: &mut Config) -> Result<()> {
    let catalog: String = Input::new()
        .with_prompt("FAQ catalog (JSON)")
        .default(config.paths.catalog.display().to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Path cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let index_dir: String = Input::new()
        .with_prompt("Index directory")
        .default(config.paths.index_dir.display().to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Path cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    config.paths.catalog = PathBuf::from(catalog.trim());
    config.paths.index_dir = PathBuf::from(index_dir.trim());
    Ok(())
}

fn configure_tiers(mode: DialogMode, tiers: &mut TierPolicy) -> Result<()> {
    eprintln!("{}", style(format!("Mode: {}", mode)).bold());

    let high: f32 = Input::new()
        .with_prompt("  Direct-answer threshold (high)")
        .default(tiers.high)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if input.is_finite() && (-1.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Threshold must be between -1 and 1")
            }
        })
        .interact_text()?;

    let low: f32 = Input::new()
        .with_prompt("  Suggestion threshold (low)")
        .default(tiers.low.min(high))
        .validate_with(|input: &f32| -> Result<(), String> {
            if !input.is_finite() || !(-1.0..=1.0).contains(input) {
                Err("Threshold must be between -1 and 1".to_string())
            } else if *input > high {
                Err(format!("Must not exceed the high threshold ({})", high))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let max_suggestions: usize = Input::new()
        .with_prompt("  Maximum suggestions")
        .default(tiers.max_suggestions)
        .validate_with(|input: &usize| -> Result<(), String> {
            if (1..=MAX_SUGGESTIONS_LIMIT).contains(input) {
                Ok(())
            } else {
                Err(format!("Must be between 1 and {}", MAX_SUGGESTIONS_LIMIT))
            }
        })
        .interact_text()?;

    tiers.set_thresholds(high, low)?;
    tiers.set_max_suggestions(max_suggestions)?;
    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> crate::Result<()> {
    OllamaClient::new(ollama)?
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(1)
        .health_check()
}
