use anyhow::{bail, Context, Result};
use verso_agent::Config;
use verso_core::model::DocId;
use verso_search::{QueryRequest, RecommendationResult};

/// What to find neighbours for.
#[derive(Debug)]
pub enum Target {
    Song(String),
    Text(String),
    Id(DocId),
}

impl Target {
    pub fn from_args(song: Option<String>, text: Option<String>, id: Option<String>) -> Result<Self> {
        match (song, text, id) {
            (Some(song), None, None) => Ok(Self::Song(song)),
            (None, Some(text), None) => Ok(Self::Text(text)),
            (None, None, Some(id)) => Ok(Self::Id(DocId::new(id))),
            (None, None, None) => bail!("Give one of --song, --text or --id"),
            _ => bail!("--song, --text and --id are mutually exclusive"),
        }
    }
}

pub async fn run_recommend(
    config: &Config,
    target: Target,
    k: Option<i64>,
    json: bool,
) -> Result<()> {
    let service = super::open_service(config)?;
    let k = k.unwrap_or(config.search.default_k as i64);

    let (request, heading) = match target {
        Target::Song(title) => {
            let Some(song) = service.resolve_title(&title)? else {
                bail!("No song titled {title:?} in the catalogue (see `verso songs`)");
            };
            let heading = format!("Songs with lyrics like {} by {}", song.title, song.artist);
            (QueryRequest::by_id(song.doc_id, k), heading)
        }
        Target::Text(text) => {
            let heading = format!("Songs matching {text:?}");
            (QueryRequest::by_text(text, k), heading)
        }
        Target::Id(id) => {
            let heading = format!("Songs with lyrics like {id}");
            (QueryRequest::by_id(id, k), heading)
        }
    };

    let result = service
        .query_async(request)
        .await
        .context("Recommendation query failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&heading, &result);
    }
    Ok(())
}

fn print_result(heading: &str, result: &RecommendationResult) {
    println!("\n🎵 {heading}\n");
    if result.is_empty() {
        println!("  No songs share vocabulary with this query.");
        return;
    }
    for (n, rec) in result.results.iter().enumerate() {
        println!(
            "  {:>2}. {} by {}  [{}]  {:.3}",
            n + 1,
            rec.title,
            rec.artist,
            rec.doc_id,
            rec.score
        );
        if let Some(rationale) = &rec.rationale {
            println!("      shared: {}", rationale.shared_terms.join(", "));
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_requires_exactly_one_source() {
        assert!(matches!(
            Target::from_args(Some("Song A".into()), None, None).unwrap(),
            Target::Song(_)
        ));
        assert!(matches!(
            Target::from_args(None, None, Some("0000001".into())).unwrap(),
            Target::Id(id) if id.as_str() == "0000001"
        ));
        assert!(Target::from_args(None, None, None).is_err());
        assert!(Target::from_args(Some("a".into()), Some("b".into()), None).is_err());
    }
}
