//! YAML configuration loading
//!
//! Loads `configuration.yaml` and resolves the hub's custom tags:
//!
//! - `!include path` - contents of another YAML file
//! - `!secret key` - value from `secrets.yaml` next to the main file
//! - `!env_var VAR` - value of an environment variable
//!
//! Integration sections are read with [`platform_configs`], which gathers
//! every `cover:` / `cover other:` entry the way platforms expect them.
//!
//! ```ignore
//! let config = ha_config::load_yaml("/config", "configuration.yaml")?;
//! for entry in ha_config::platform_configs(&config, "cover") { ... }
//! ```

mod error;
mod loader;
mod platforms;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use platforms::platform_configs;

pub use serde_yaml::Value;
