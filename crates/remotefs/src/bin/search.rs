//! One-shot search against a Drive-style store.
//!
//! Usage: `remotefs-search <query> [root-id]`
//!
//! Reads `REMOTEFS_ACCESS_TOKEN` and, optionally, `REMOTEFS_CONFIG` (a JSON
//! engine config) from the environment or a `.env` file.

use std::path::PathBuf;
use std::process::ExitCode;

use remotefs::{Credential, CredentialChannel, EngineConfig, RemoteError, RemoteSearchEngine};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("remotefs=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(query) = args.next() else {
        eprintln!("usage: remotefs-search <query> [root-id]");
        return ExitCode::from(2);
    };
    let root_id = args.next();

    match run(&query, root_id.as_deref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("search failed ({}): {error}", error.status_code());
            ExitCode::FAILURE
        }
    }
}

async fn run(query: &str, root_id: Option<&str>) -> Result<(), RemoteError> {
    let token = dotenvy::var("REMOTEFS_ACCESS_TOKEN").map_err(|_| {
        RemoteError::Configuration("REMOTEFS_ACCESS_TOKEN is not set".to_string())
    })?;
    let config = match dotenvy::var("REMOTEFS_CONFIG") {
        Ok(path) => EngineConfig::load(&PathBuf::from(path))?,
        Err(_) => EngineConfig::default(),
    }
    .with_env_overrides();

    let engine = RemoteSearchEngine::http(config)?;
    let credentials = CredentialChannel::fixed(Credential::new(token));
    let outcome = engine.search(credentials, query, root_id).await?;

    let json = serde_json::to_string_pretty(&outcome)
        .map_err(|error| RemoteError::Decode(error.to_string()))?;
    println!("{json}");
    Ok(())
}
