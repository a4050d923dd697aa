use anyhow::Result;
use std::sync::Arc;
use verso_agent::Config;
use verso_core::schema::Database;
use verso_search::{Engine, QueryService};

pub fn show_status(config: &Config) -> Result<()> {
    let db = Database::open(&config.database_path)?;

    println!("\n📊 Verso Status\n");
    println!("  Database: {}", config.database_path.display());
    println!("  Stored songs: {}", db.count_documents()?);

    let Some(header) = db.artifact_header()? else {
        println!("  Index: not built");
        println!("\n  Run `verso build --corpus <csv>` to build it");
        return Ok(());
    };
    println!(
        "  Stored generation: {} (built {}, format v{})",
        header.generation, header.built_at, header.artifact_version
    );

    let engine = Arc::new(Engine::new(config.search.clone()));
    if let Err(e) = engine.load_from(&db) {
        println!("  Index: unusable ({e})");
        println!("\n  Run `verso build` to rebuild it");
        return Ok(());
    }

    let status = QueryService::new(engine, &config.search).status();
    println!("  Available: {}", if status.available { "yes" } else { "no" });
    println!("  Indexed songs: {}", status.documents);
    println!("  Vocabulary: {} terms", status.vocabulary_size);
    if let Some(strategy) = status.strategy {
        println!("  Strategy: {strategy}");
    }
    if strategy_mismatch(status.strategy, config) {
        println!(
            "\n  Config asks for {}; rebuild to switch strategies",
            config.search.index_strategy
        );
    }

    Ok(())
}

fn strategy_mismatch(stored: Option<verso_search::IndexStrategy>, config: &Config) -> bool {
    stored.is_some_and(|s| s != config.search.index_strategy)
}
