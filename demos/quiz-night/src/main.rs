//! Quiz-night: a ready-to-run buzzer server.
//!
//! Start it, point a host client at `ws://localhost:8080`, send
//! `{"action":"start_game","host_name":"..."}`, and hand the returned
//! join token to the players.

use buzzwire::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let server = QuizServerBuilder::new()
        .bind("0.0.0.0:8080")
        .build(MemoryStore::new())
        .await?;

    eprintln!("quiz-night listening on 0.0.0.0:8080");
    server.run().await?;
    Ok(())
}
