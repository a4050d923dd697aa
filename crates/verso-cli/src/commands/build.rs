use anyhow::{Context, Result};
use std::path::PathBuf;
use verso_agent::Config;
use verso_core::schema::Database;
use verso_search::corpus::{ingest, load_csv};
use verso_search::{Engine, Preprocessor};

/// Ingest a CSV corpus, build a new generation and store it.
pub fn run_build(config: &Config, corpus: Option<PathBuf>) -> Result<()> {
    let corpus = corpus
        .or_else(|| config.corpus_path.clone())
        .context("No corpus given; pass --corpus or set corpus_path in the config file")?;

    println!("\n📚 Building verso index\n");
    println!("  Corpus: {}", corpus.display());
    println!("  Database: {}", config.database_path.display());
    println!("  Strategy: {}", config.search.index_strategy);
    println!();

    let songs = load_csv(&corpus).context("Failed to read corpus")?;
    let preprocessor = Preprocessor::from_config(&config.search);
    let report = ingest(songs, &preprocessor);
    if !report.skipped.is_empty() {
        println!(
            "  ⚠ {} songs have no usable lyrics and were skipped",
            report.skipped.len()
        );
    }

    let engine = Engine::new(config.search.clone());
    let mut db = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    // Continue numbering after whatever is already stored.
    if let Some(header) = db.artifact_header()? {
        engine.reserve_generation(header.generation + 1);
    }

    let snapshot = engine
        .rebuild(report.documents)
        .context("Failed to build the vector space")?;
    let generation = engine.save_to(&mut db).context("Failed to save artifacts")?;

    println!("  ✓ Generation {generation} saved");
    println!("    Songs indexed: {}", snapshot.index().len());
    println!("    Vocabulary: {} terms", snapshot.space().len());

    Ok(())
}
