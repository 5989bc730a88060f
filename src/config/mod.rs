// Configuration management module
// TOML settings for the encoder backend, storage paths and answer thresholds

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EncoderBackend, EncoderConfig, HashedConfig, OllamaConfig, PathsConfig,
    PolicyConfig, RetrievalConfig,
};
