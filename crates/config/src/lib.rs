//! Configuration loading, validation, and env substitution.
//!
//! Config files: `pinboard.toml`, `pinboard.yaml`, or `pinboard.json`,
//! searched in `./` then `~/.config/pinboard/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, data_dir, discover_and_load, load_config, queue_db_path},
    schema::{BoardConfig, ContextConfig, DeliveryConfig, PinboardConfig, ScopeConfig},
};
