//! Command line front end for depot
//!
//! Configuration comes from the environment (see [`config::DepotConfig`]),
//! commands are defined in [`cli`].

pub mod cli;
pub mod config;

pub use cli::{Cli, Command, run};
pub use config::{ConfigError, DepotConfig};
