use anyhow::Result;
use verso_agent::Config;

pub fn list_songs(config: &Config, limit: Option<usize>) -> Result<()> {
    let service = super::open_service(config)?;
    let titles = service.titles()?;
    let total = titles.len();
    let shown = limit.unwrap_or(total).min(total);

    for title in titles.iter().take(shown) {
        println!("{title}");
    }
    if shown < total {
        println!("... and {} more ({} titles)", total - shown, total);
    }
    Ok(())
}
