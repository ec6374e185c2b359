//! Promptline CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP gateway
//! - `onboard` — Write a default config and sample corpus
//! - `render`  — Print the prompt a pipeline would send, without calling the backend
//! - `doctor`  — Diagnose configuration and corpus

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use promptline_core::variant::PipelineKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "promptline",
    about = "Promptline — prompt assembly and streaming chat pipelines",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.promptline/config.toml
    #[arg(short, long, global = true, env = "PROMPTLINE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write a default config file and a sample corpus
    Onboard,

    /// Render a pipeline's prompt for a conversation
    Render {
        /// Pipeline to render: direct, history, or rag
        variant: PipelineKind,

        /// Conversation as a JSON array of {role, content}, or a full request body
        #[arg(short, long)]
        messages: String,
    },

    /// Diagnose configuration, credentials and corpus
    Doctor {
        /// Also check that the backend is reachable
        #[arg(long)]
        ping: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Render { variant, messages } => {
            commands::render::run(config_path, variant, &messages).await?
        }
        Commands::Doctor { ping } => commands::doctor::run(config_path, ping).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_render_command() {
        let cli = Cli::try_parse_from([
            "promptline",
            "render",
            "history",
            "--messages",
            r#"[{"role":"user","content":"hi"}]"#,
        ])
        .unwrap();
        match cli.command {
            Commands::Render { variant, .. } => assert_eq!(variant, PipelineKind::History),
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn unknown_variant_rejected() {
        let result = Cli::try_parse_from(["promptline", "render", "react", "--messages", "[]"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["promptline", "serve", "--port", "8080", "-v", "-c", "/tmp/p.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
        assert!(matches!(cli.command, Commands::Serve { port: Some(8080) }));
    }
}
