//! `promptline onboard` — First-time setup.

use std::path::Path;

use promptline_config::AppConfig;

use super::config_file;

/// A small starter corpus for the rag pipeline.
const SAMPLE_CORPUS: &str = r#"[
  {
    "question": "What is Promptline?",
    "answer": "Promptline serves chat pipelines over HTTP and streams model output back as it is generated."
  },
  {
    "question": "Which pipelines are available?",
    "answer": "Three: direct passes the last message through, history adds the conversation so far, and rag also adds this document corpus."
  },
  {
    "question": "Where does the rag pipeline get its answers?",
    "answer": "From the JSON file configured under [corpus]. Every string in the file becomes one document."
  }
]
"#;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_file(config_path);

    println!("Promptline — First-Time Setup");
    println!("=============================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("  Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load_from(&config_path)?;
    let corpus = &config.corpus.path;
    if corpus.exists() {
        println!("  Corpus already exists at: {}", corpus.display());
    } else {
        if let Some(dir) = corpus.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(corpus, SAMPLE_CORPUS)?;
        println!("  Created sample corpus at: {}", corpus.display());
    }

    println!("\nNext steps:");
    println!("   1. Edit {} and add your API key (or set OPENAI_API_KEY)", config_path.display());
    println!("   2. Run: promptline doctor");
    println!("   3. Run: promptline serve\n");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_corpus_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(SAMPLE_CORPUS).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(3));
    }
}
