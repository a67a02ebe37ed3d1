use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Context, Result},
    schema::PinboardConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "pinboard.toml",
    "pinboard.yaml",
    "pinboard.yml",
    "pinboard.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<PinboardConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

fn parse_config(raw: &str, path: &Path) -> Result<PinboardConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml")
        .to_ascii_lowercase();
    let cfg = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(raw)
            .with_context(|| format!("invalid YAML in {}", path.display()))?,
        "json" => serde_json::from_str(raw)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
        _ => {
            toml::from_str(raw).with_context(|| format!("invalid TOML in {}", path.display()))?
        },
    };
    Ok(cfg)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./pinboard.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/pinboard/pinboard.{toml,yaml,yml,json}` (user-global)
///
/// Returns `PinboardConfig::default()` if no config file is found.
pub fn discover_and_load() -> PinboardConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    PinboardConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/pinboard/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pinboard").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user-global data directory (`~/.local/share/pinboard/`).
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pinboard").map(|d| d.data_dir().to_path_buf())
}

/// Resolve the queue database path: configured value, or
/// `<data_dir>/queue.db`, or a working-directory fallback.
pub fn queue_db_path(cfg: &PinboardConfig) -> PathBuf {
    if let Some(path) = &cfg.delivery.queue_db {
        return path.clone();
    }
    data_dir()
        .map(|d| d.join("queue.db"))
        .unwrap_or_else(|| PathBuf::from("pinboard-queue.db"))
}
