//! SupportChat CLI library
//!
//! This library provides the pieces of the `supportchat` terminal client:
//! argument parsing, configuration loading, command handlers and the
//! interactive chat loop.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::ChatApp;
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
