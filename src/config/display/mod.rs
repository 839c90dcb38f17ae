use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use super::Config;

/// Print the resolved configuration, credentials masked
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("OpenAI-compatible API:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.openai.base_url).cyan());
    eprintln!("  API key: {}", style(config.openai.masked_api_key()).cyan());
    eprintln!(
        "  Embedding model: {}",
        style(&config.openai.embedding_model).cyan()
    );
    eprintln!("  Chat model: {}", style(&config.openai.chat_model).cyan());
    eprintln!(
        "  Timeout: {}s, attempts: {}",
        style(config.openai.timeout_seconds).cyan(),
        style(config.openai.retry_attempts).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Corpus:").bold().yellow());
    eprintln!(
        "  Course content: {} ({})",
        style(config.course_dir().display()).cyan(),
        config.corpus.course_extensions.join(", ")
    );
    eprintln!(
        "  Forum dump: {}",
        style(config.discourse_file().display()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Index:").bold().yellow());
    eprintln!("  Directory: {}", style(config.index_root().display()).cyan());
    eprintln!(
        "  Stored text: {} chars, concurrency: {}, kept versions: {}",
        config.index.stored_text_chars, config.index.concurrency, config.index.keep_versions
    );
    eprintln!(
        "  Retrieval: top {} chunks, {} char excerpts",
        config.retrieval.top_k, config.retrieval.excerpt_chars
    );

    eprintln!();
    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Bind: {}", style(&config.server.bind).cyan());
    eprintln!(
        "  Allowed origins: {}",
        config.server.allowed_origins.join(", ")
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

/// Write a default `config.toml` into `base_dir`
#[inline]
pub fn init_config(base_dir: &Path, force: bool) -> Result<Config> {
    let config = Config {
        base_dir: base_dir.to_path_buf(),
        ..Config::default()
    };

    let path = config.config_file_path();
    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    config.save().context("Failed to save configuration")?;
    eprintln!(
        "{} {}",
        style("✓ Configuration written to").green(),
        style(path.display()).cyan()
    );

    Ok(config)
}
