//! llmq: a query CLI, plugin framework and I/O manager for conversational
//! AIs.
//!
//! # Public API Overview
//! - [`Cli`] and [`Action`] describe one invocation.
//! - [`Driver`] runs an action against a [`llmq_plugin::PluginRegistry`] and a
//!   [`Transport`]; [`builtin_registry`] holds the compiled-in plugins.
//! - [`ReqwestTransport`] is the HTTP transport; tests substitute their own.
//! - Contexts live in the `context_store` crate.

#![allow(clippy::too_many_arguments)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod editor;
pub mod logging;
pub mod paths;
pub mod registry;
pub mod session;
pub mod transport;

use std::io;
use std::time::Duration;

pub use cli::{Action, Cli, CliError, Target};
pub use config::EnvConfig;
pub use paths::PluginDirs;
pub use registry::builtin_registry;
pub use session::Driver;
pub use transport::{ReqwestTransport, Request, Transport, TransportError};

/// Runs one parsed invocation against stdin/stdout.
pub fn run(cli: &Cli, env: &EnvConfig) -> anyhow::Result<()> {
    cli.validate()?;
    let registry = builtin_registry()?;
    let timeout = cli.timeout.map(Duration::from_secs).or(env.timeout);
    let transport = ReqwestTransport::new(timeout);

    let stdin = io::stdin();
    let stdout = io::stdout();
    Driver::new(&registry, &transport, env).run(cli, &mut stdin.lock(), &mut stdout.lock())
}
