use anyhow::{bail, Context, Result};
use toml_edit::{value, Array, DocumentMut, Item};
use verso_agent::{config, Config};

/// Keys accepted by `verso config get` and `verso config set`.
const KEYS: &[(&str, Kind)] = &[
    ("corpus_path", Kind::Str),
    ("database_path", Kind::Str),
    ("search.vocabulary_size", Kind::Int),
    ("search.index_strategy", Kind::Strategy),
    ("search.default_k", Kind::Int),
    ("search.stemming", Kind::Bool),
    ("search.extra_stop_words", Kind::List),
    ("search.workers", Kind::Int),
    ("llm.provider", Kind::Str),
    ("llm.model_name", Kind::Str),
    ("llm.api_key", Kind::Str),
    ("llm.base_url", Kind::Str),
    ("llm.timeout_secs", Kind::Int),
    ("llm.max_retries", Kind::Int),
    ("llm.temperature", Kind::Float),
    ("conversation.history_turns", Kind::Int),
    ("conversation.lexicon_path", Kind::Str),
];

#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Int,
    Float,
    Bool,
    List,
    Strategy,
}

fn kind_of(key: &str) -> Result<Kind> {
    KEYS.iter()
        .find(|(k, _)| *k == key)
        .map(|(_, kind)| *kind)
        .with_context(|| format!("Unknown config key: {key}\n\nValid keys: {}", valid_keys()))
}

fn valid_keys() -> String {
    KEYS.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(", ")
}

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    for (key, _) in KEYS {
        let shown = if *key == "llm.api_key" {
            mask(config.llm.resolved_api_key().as_deref())
        } else {
            lookup(&config, key)?
        };
        println!("  {key}: {shown}");
    }

    println!("\nPriority: CLI args > ENV vars (VERSO_*) > Config file > Defaults");

    Ok(())
}

/// Get a specific config value.
pub fn get_config(key: Option<String>) -> Result<()> {
    if let Some(key) = key {
        kind_of(&key)?;
        let config = Config::load()?;
        println!("{}", lookup(&config, &key)?);
    } else {
        // No key provided, show entire config file contents
        let config_path = config::config_file_path();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            print!("{}", contents);
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'verso config init' to create it.");
        }
    }

    Ok(())
}

/// Set a config value, keeping the rest of the file (comments included)
/// as it is.
pub fn set_config(key: &str, raw: &str) -> Result<()> {
    let config_path = config::config_file_path();

    // Ensure config file exists
    config::ensure_config_file()?;

    let contents = std::fs::read_to_string(&config_path)
        .context("Failed to read config file")?;
    let updated = apply_setting(&contents, key, raw)?;

    std::fs::write(&config_path, updated)
        .context("Failed to write config file")?;

    println!("✓ Updated {} = {}", key, raw);
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure verso.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}

/// Write `raw` under the dotted `key` in the TOML document `contents`.
fn apply_setting(contents: &str, key: &str, raw: &str) -> Result<String> {
    let item = typed_item(kind_of(key)?, raw)?;
    let mut doc: DocumentMut = contents.parse().context("Failed to parse config file")?;

    match key.split_once('.') {
        Some((section, field)) => {
            if doc.get(section).is_some_and(|s| !s.is_table_like()) {
                bail!("[{section}] in the config file is not a table");
            }
            doc[section][field] = item;
        }
        None => {
            doc[key] = item;
        }
    }
    Ok(doc.to_string())
}

fn typed_item(kind: Kind, raw: &str) -> Result<Item> {
    let raw = raw.trim();
    Ok(match kind {
        Kind::Str => value(raw),
        Kind::Int => value(
            raw.parse::<i64>()
                .with_context(|| format!("Expected an integer, got {raw:?}"))?,
        ),
        Kind::Float => value(
            raw.parse::<f64>()
                .with_context(|| format!("Expected a number, got {raw:?}"))?,
        ),
        Kind::Bool => value(
            raw.parse::<bool>()
                .with_context(|| format!("Expected true or false, got {raw:?}"))?,
        ),
        Kind::List => {
            let words: Array = raw
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .collect();
            value(words)
        }
        Kind::Strategy => {
            if verso_search::IndexStrategy::parse(raw).is_none() {
                bail!("Expected on_demand or precomputed, got {raw:?}");
            }
            value(raw)
        }
    })
}

/// Render the effective value of a dotted key.
fn lookup(config: &Config, key: &str) -> Result<String> {
    let tree = serde_json::to_value(config).context("Failed to serialize config")?;
    let node = key
        .split('.')
        .try_fold(&tree, |node, part| node.get(part))
        .with_context(|| format!("Unknown config key: {key}"))?;
    Ok(match node {
        serde_json::Value::Null => "<not set>".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn mask(key: Option<&str>) -> String {
    match key {
        None => "<not set>".to_string(),
        Some(k) if k.chars().count() <= 8 => "****".to_string(),
        Some(k) => format!("{}****", k.chars().take(4).collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "\
# Verso Configuration File
database_path = \"/tmp/verso.db\"

[search]
# how many songs
default_k = 5
";

    #[test]
    fn test_set_keeps_comments() {
        let updated = apply_setting(FILE, "search.default_k", "8").unwrap();
        assert!(updated.contains("# how many songs"));
        assert!(updated.contains("default_k = 8"));
        assert!(updated.starts_with("# Verso Configuration File"));
    }

    #[test]
    fn test_set_creates_missing_section() {
        let updated = apply_setting(FILE, "llm.model_name", "llama-3.1-8b-instant").unwrap();
        let doc: DocumentMut = updated.parse().unwrap();
        assert_eq!(doc["llm"]["model_name"].as_str(), Some("llama-3.1-8b-instant"));
    }

    #[test]
    fn test_set_parses_typed_values() {
        let updated = apply_setting(FILE, "search.extra_stop_words", "la, oh ,yeah").unwrap();
        let doc: DocumentMut = updated.parse().unwrap();
        let words: Vec<&str> = doc["search"]["extra_stop_words"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(words, vec!["la", "oh", "yeah"]);

        assert!(apply_setting(FILE, "search.default_k", "many").is_err());
        assert!(apply_setting(FILE, "search.index_strategy", "eager").is_err());
        assert!(apply_setting(FILE, "search.index_strategy", "precomputed").is_ok());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = apply_setting(FILE, "acoustid_api_key", "x").unwrap_err();
        assert!(err.to_string().contains("Unknown config key"));
    }

    #[test]
    fn test_lookup_reads_nested_values() {
        let config = Config::default();
        assert_eq!(lookup(&config, "search.default_k").unwrap(), "5");
        assert_eq!(lookup(&config, "search.index_strategy").unwrap(), "on_demand");
        assert_eq!(lookup(&config, "corpus_path").unwrap(), "<not set>");
        assert!(lookup(&config, "search.nope").is_err());
    }

    #[test]
    fn test_mask_hides_key() {
        assert_eq!(mask(None), "<not set>");
        assert_eq!(mask(Some("short")), "****");
        assert_eq!(mask(Some("gsk_abcdefghijkl")), "gsk_****");
    }
}
