pub mod build;
pub mod chat;
pub mod config;
pub mod recommend;
pub mod songs;
pub mod status;

pub use build::run_build;
pub use chat::run_chat;
pub use recommend::{run_recommend, Target};
pub use songs::list_songs;
pub use status::show_status;

use anyhow::{Context, Result};
use std::sync::Arc;
use verso_agent::Config;
use verso_core::schema::Database;
use verso_search::{Engine, QueryService};

/// Load the stored generation and wrap it in a query service.
pub fn open_service(config: &Config) -> Result<QueryService> {
    let db = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    let engine = Arc::new(Engine::new(config.search.clone()));
    engine
        .load_from(&db)
        .context("No usable index found; run `verso build` first")?;
    Ok(QueryService::new(engine, &config.search))
}
