use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use verso_agent::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "verso", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the artifact database (default: ~/.local/share/verso/verso.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Build the vector space from a song lyric CSV
    ///
    /// Reads the dataset (columns: artist, song, link, text and an optional
    /// id), cleans every lyric, selects the vocabulary, computes TF-IDF
    /// vectors and stores a new artifact generation in the database.
    ///
    /// Rows without a title or lyrics are skipped. Songs whose lyrics are
    /// made only of stop words are reported and left out of the index.
    ///
    /// The index strategy, vocabulary size and stemming come from the
    /// [search] section of the config file.
    Build {
        /// Path to the CSV dataset (default: corpus_path from config)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Recommend songs with similar lyrics
    Recommend {
        /// Title of a song in the catalogue
        #[arg(long, conflicts_with_all = ["text", "id"])]
        song: Option<String>,

        /// Free text (descriptors, a lyric fragment)
        #[arg(long, conflicts_with = "id")]
        text: Option<String>,

        /// Document id of a song in the catalogue
        #[arg(long)]
        id: Option<String>,

        /// Number of songs to return (default: search.default_k)
        #[arg(short, long, allow_negative_numbers = true)]
        k: Option<i64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the song titles in the catalogue
    Songs {
        /// Show at most this many titles
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show the state of the stored index
    Status,
    /// Talk to the recommender
    ///
    /// Starts an interactive session on stdin. Describe a mood ("something
    /// upbeat but soulful") or name a song in quotes. Type /quit to leave.
    ///
    /// Replies are phrased by the configured LLM when an API key is set
    /// (llm.api_key or GROQ_API_KEY); otherwise plain templates are used.
    Chat,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print one value, or the whole config file when no key is given
    Get {
        /// Dotted key, e.g. search.default_k
        key: Option<String>,
    },
    /// Set a value in the config file
    Set {
        /// Dotted key, e.g. llm.model_name
        key: String,
        value: String,
    },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Config { action } = cli.command {
        return match action {
            ConfigAction::Show => commands::config::show_config(),
            ConfigAction::Get { key } => commands::config::get_config(key),
            ConfigAction::Set { key, value } => commands::config::set_config(&key, &value),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Example => commands::config::show_example(),
            ConfigAction::Init => commands::config::init_config(),
        };
    }

    let config = match cli.db {
        Some(db) => Config::load_with_db_path(db)?,
        None => Config::load()?,
    };

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match cli.command {
        Commands::Build { corpus } => {
            commands::run_build(&config, corpus)?;
        }
        Commands::Recommend {
            song,
            text,
            id,
            k,
            json,
        } => {
            let target = commands::Target::from_args(song, text, id)?;
            commands::run_recommend(&config, target, k, json).await?;
        }
        Commands::Songs { limit } => {
            commands::list_songs(&config, limit)?;
        }
        Commands::Status => {
            commands::show_status(&config)?;
        }
        Commands::Chat => {
            commands::run_chat(&config).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
