//! Configuration system for Sleuth.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (user config, project-local `sleuth.toml`, explicit file)
//! - API key resolution (env var, `.env`, then config file)
//! - [`ResolvedSettings`], the flat struct the binary builds backends and agents from

pub mod discovery;
pub mod error;
pub mod resolve;
pub mod secrets;
pub mod types;

pub use discovery::{
    load_config, load_config_file, load_config_with_options, user_config_dir, user_config_path,
    ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use resolve::{Overrides, ResolvedSettings};
pub use secrets::{load_dotenv, resolve_api_key, ResolvedSecret, SecretSource};
pub use types::*;
