//! `promptline serve` — Start the HTTP gateway.

use std::path::Path;

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Promptline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {}", config.provider);
    println!("   Corpus:    {} ({})", config.corpus.path.display(), config.corpus.reload);
    println!("   Framing:   {}", config.gateway.framing);

    promptline_gateway::start(config).await?;

    Ok(())
}
