use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use verso_agent::{Config, Controller};

const QUIT: &str = "/quit";

/// Interactive session on stdin.
pub async fn run_chat(config: &Config) -> Result<()> {
    let service = super::open_service(config)?;
    let controller =
        Arc::new(Controller::from_config(config, service).context("Failed to start the assistant")?);
    let mut session = controller.session();

    println!("\n🎧 verso chat (session {})", session.id());
    if !controller.has_port() {
        println!("  No LLM API key configured; replies use plain templates.");
    }
    println!("  Describe a mood or name a song in quotes. Type {QUIT} to leave.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line == QUIT {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let reply = session.handle_turn(line).await;
        if reply.fallback {
            log::debug!("turn answered with a fallback reply");
        }
        println!("\nverso> {}\n", reply.text);
    }

    println!("Bye!");
    Ok(())
}
