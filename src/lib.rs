pub mod cli;
pub mod github;
pub mod load_config;
pub mod server;
pub mod slack;

pub use cli::{run, Cli, Commands};
