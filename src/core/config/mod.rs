pub mod data;
pub mod io;

pub use data::{Config, ModelConfig, PolicyConfig, ToolServerConfig};
pub use io::ConfigError;

#[cfg(test)]
pub mod tests;
