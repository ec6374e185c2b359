pub mod doctor;
pub mod onboard;
pub mod render;
pub mod serve;

use std::path::{Path, PathBuf};

use promptline_config::AppConfig;

/// Load config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
    AppConfig::load(path).map_err(|e| format!("Failed to load config: {e}"))
}

/// Where the config file lives for this invocation.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}
