pub mod env;
mod loader;

pub use env::{
    AppConfig, DirectoryConfig, DispatchMode, LoggingConfig, PacingConfig, RenderConfig,
    ScrapeConfig,
};
pub use loader::load_config;
