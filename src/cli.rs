//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// MCP capability registry - inspect and exercise `OpenAPI`-derived capabilities
#[derive(Parser, Debug)]
#[command(name = "mcp-capabilities")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MCP_CAPABILITIES_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// `OpenAPI` document (overrides `openapi.spec` from the config)
    #[arg(short, long, global = true)]
    pub spec: Option<PathBuf>,

    /// Backend base URL (overrides config and the document's servers)
    #[arg(long, env = "MCP_CAPABILITIES_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "MCP_CAPABILITIES_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MCP_CAPABILITIES_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Output format of `inspect`
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON array
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show how every operation of the document is classified
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Read a resource by URI
    Read {
        /// Concrete resource URI (e.g. `resource://openapi/showPetById/42`)
        #[arg(required = true)]
        uri: String,
    },

    /// Call a tool
    Call {
        /// Tool name
        #[arg(required = true)]
        tool: String,

        /// JSON arguments to pass to the tool
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}
