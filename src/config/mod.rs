// Configuration management module
// TOML settings file, defaults, validation and environment overrides

pub mod display;
pub mod settings;


pub use display::{init_config, show_config};
pub use settings::{
    Config, ConfigError, CorpusConfig, IndexConfig, OpenAiConfig, RetrievalConfig, ServerConfig,
};
