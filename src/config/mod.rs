//! Persistent console settings stored as TOML under the app directory.

mod defaults;
mod errors;
mod io;
mod types;

pub use errors::ConfigError;
pub use io::{CONFIG_FILE_NAME, config_path, load_from_path, load_or_default, save_to_path};
pub use types::{AppConfig, ClusterSettings, HttpSettings, TrainingSettings, UploadSettings};
