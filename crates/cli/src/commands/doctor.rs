//! `promptline doctor` — Diagnose configuration and corpus.

use std::path::Path;

use promptline_config::AppConfig;
use promptline_pipeline::documents::load_documents;

use super::config_file;

pub async fn run(config_path: Option<&Path>, ping: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Promptline Doctor — Diagnostics");
    println!("===============================\n");

    let mut issues = 0;

    // Check config
    let file = config_file(config_path);
    if !file.exists() {
        println!("  ⚠️  No config file at {} — using defaults (run `promptline onboard`)", file.display());
        issues += 1;
    }

    let config = match AppConfig::load(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid (templates bound, settings in range)");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 blocking issue found. Fix the config and re-run.");
            return Ok(());
        }
    };

    // Check API key
    if config.has_api_key() {
        println!("  ✅ API key configured for provider '{}'", config.provider);
    } else {
        println!("  ⚠️  No API key — set api_key in config.toml or OPENAI_API_KEY");
        issues += 1;
    }

    // Check corpus
    match load_documents(&config.corpus.path, config.corpus.pointer.as_deref()).await {
        Ok(documents) if documents.is_empty() => {
            println!("  ⚠️  Corpus {} has no string documents", config.corpus.path.display());
            issues += 1;
        }
        Ok(documents) => println!(
            "  ✅ Corpus readable: {} document(s) from {} (reload: {})",
            documents.len(),
            config.corpus.path.display(),
            config.corpus.reload
        ),
        Err(e) => {
            println!("  ❌ Corpus unreadable: {e}");
            issues += 1;
        }
    }

    // Check backend
    if ping {
        let backend = promptline_providers::build_from_config(&config);
        match backend.health_check().await {
            Ok(true) => println!("  ✅ Backend '{}' reachable", backend.name()),
            Ok(false) => {
                println!("  ⚠️  Backend '{}' answered but reported unhealthy", backend.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Backend '{}' unreachable: {e}", backend.name());
                issues += 1;
            }
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
