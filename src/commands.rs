use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::answer::{Answer, Assistant, ChatModel};
use crate::config::{Config, init_config, show_config};
use crate::embeddings::Embedder;
use crate::index::{IndexStore, KnowledgeBase};
use crate::indexer::{BuildReport, Indexer};
use crate::openai::OpenAiClient;
use crate::retriever::Retriever;
use crate::server;

/// Collect, embed and publish a fresh index
#[inline]
pub async fn build(base_dir: &Path) -> Result<BuildReport> {
    let config = Config::load(base_dir)?;
    let client = OpenAiClient::new(&config.openai).context("Failed to create API client")?;

    let report = Indexer::new(config, Arc::new(client)).build().await?;
    print_build_report(&report);
    Ok(report)
}

/// Load the published index and serve the HTTP API
#[inline]
pub async fn serve(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir)?;
    let assistant = open_assistant(&config)?;
    server::serve(&config, assistant).await
}

/// Answer a single question on the terminal
#[inline]
pub async fn ask(base_dir: &Path, question: &str) -> Result<Answer> {
    let config = Config::load(base_dir)?;
    let assistant = open_assistant(&config)?;

    let answer = assistant.ask(question).await?;
    print_answer(&answer);
    Ok(answer)
}

/// Show or initialize the configuration file
#[inline]
pub fn config(base_dir: &Path, init: bool, force: bool) -> Result<()> {
    if init {
        init_config(base_dir, force)?;
        return Ok(());
    }
    show_config(&Config::load(base_dir)?)
}

/// Describe the live index and the versions kept on disk
#[inline]
pub fn show_status(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir)?;
    let store = IndexStore::new(config.index_root());

    println!("📊 Index Status Report");
    println!("{}", "=".repeat(50));
    println!("Index directory: {}", store.root().display());

    match store.current_version() {
        Ok(Some(version)) => println!("Live version: {}", style(version).green()),
        Ok(None) => {
            println!("{}", style("No index has been built yet").yellow());
            return Ok(());
        }
        Err(e) => {
            println!("{} {}", style("Index pointer is unreadable:").red(), e);
            return Ok(());
        }
    }

    match store.load_manifest() {
        Ok(manifest) => {
            println!("   Entries: {}", manifest.entries);
            println!("   Dimension: {}", manifest.dimension);
            println!("   Embedding model: {}", manifest.embedding_model);
            println!("   Stored text: {} chars", manifest.stored_text_chars);
            println!("   Built at: {}", manifest.built_at.to_rfc3339());
            if manifest.embedding_model != config.openai.embedding_model {
                println!(
                    "   {}",
                    style(format!(
                        "Configured embedding model is {}; rebuild before serving",
                        config.openai.embedding_model
                    ))
                    .yellow()
                );
            }
        }
        Err(e) => println!("   {} {}", style("Manifest unavailable:").yellow(), e),
    }

    let versions = store.versions();
    println!("Versions on disk: {}", versions.len());
    for version in versions {
        println!("   {}", version);
    }

    Ok(())
}

/// Load the index (fatal if missing or inconsistent) and wire it to the API client
fn open_assistant(config: &Config) -> Result<Assistant> {
    let store = IndexStore::new(config.index_root());
    let knowledge: KnowledgeBase = store.load()?;

    if let Some(manifest) = knowledge.manifest() {
        if manifest.embedding_model != config.openai.embedding_model {
            warn!(
                "Index was built with {} but queries will use {}",
                manifest.embedding_model, config.openai.embedding_model
            );
        }
    }
    info!("Serving {} indexed chunks", knowledge.len());

    let client = Arc::new(OpenAiClient::new(&config.openai).context("Failed to create API client")?);
    let embedder: Arc<dyn Embedder> = Arc::clone(&client) as Arc<dyn Embedder>;
    let model: Arc<dyn ChatModel> = client;

    let retriever = Retriever::new(Arc::new(knowledge), embedder);
    Ok(Assistant::from_config(config, retriever, model))
}

fn print_build_report(report: &BuildReport) {
    println!(
        "{} {} of {} chunks indexed (dimension {})",
        style("✓").green(),
        report.stored,
        report.collected,
        report.dimension
    );
    println!("   Version: {}", report.version);
    if report.skipped_sources > 0 {
        println!(
            "   {}",
            style(format!("{} sources could not be read", report.skipped_sources)).yellow()
        );
    }
    if !report.failures.is_empty() {
        println!(
            "   {}",
            style(format!("{} chunks failed to embed:", report.failures.len())).yellow()
        );
        for failure in &report.failures {
            println!("     - {}", failure);
        }
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if !answer.links.is_empty() {
        println!();
        println!("{}", style("Sources:").bold());
        for link in &answer.links {
            println!("  {} {}", style(&link.url).cyan(), style(&link.text).dim());
        }
    }
}
