//! MCP Capabilities Library
//!
//! Capability registry for Model Context Protocol servers: tools, static
//! resources, resource templates and prompts, generated from `OpenAPI`
//! documents or registered locally, and composed by namespaced mounting.
//!
//! # Features
//!
//! - **`OpenAPI` bridge**: ordered route rules classify each operation as a
//!   tool, static resource or resource template; arguments are synthesized
//!   from path/query/header/cookie parameters and the flattened body
//! - **URI templates**: `{name}` placeholders, first-registered-wins
//!   resolution, typed coercion of extracted values
//! - **Duplicate policies**: warn, error, replace or ignore, per namespace
//! - **Mounting**: prefix a child registry into a parent, sharing handlers
//!   and nesting startup/shutdown hooks
//! - **Transports**: `reqwest` for real backends, in-process `axum` apps
//!   for tests and embedding

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Returns [`Error::Internal`] if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
