//! Error types for the capability registry

use std::io;

use thiserror::Error;

/// Result type alias for the capability registry
pub type Result<T> = std::result::Result<T, Error>;

/// Capability registry errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Duplicate key rejected under the `error` duplicate policy
    #[error("{namespace} already registered: {key}")]
    RegistrationConflict {
        /// Namespace the key collided in (tool, resource, template, prompt)
        namespace: &'static str,
        /// Colliding key
        key: String,
    },

    /// Mounting produced a key that already exists in the parent
    #[error("Mount '{prefix}' collides on {key}")]
    MountCollision {
        /// Mount prefix
        prefix: String,
        /// Rewritten key that collided
        key: String,
    },

    /// URI template and handler parameters disagree
    #[error("Invalid resource template '{template}': {reason}")]
    TemplateDefinition {
        /// The offending URI template
        template: String,
        /// What is wrong with it
        reason: String,
    },

    /// Malformed `OpenAPI` operation
    #[error("Invalid operation '{operation}': {reason}")]
    InvalidOperation {
        /// Operation identifier (or `METHOD path`)
        operation: String,
        /// What is wrong with it
        reason: String,
    },

    /// No static resource or template matches the URI
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Tool or prompt not registered
    #[error("{kind} not found: {name}")]
    NotFound {
        /// "Tool" or "Prompt"
        kind: &'static str,
        /// Requested name
        name: String,
    },

    /// A placeholder value could not be converted to its declared type
    #[error("Cannot convert parameter '{parameter}' value '{value}' to {expected}")]
    Coercion {
        /// Parameter name
        parameter: String,
        /// Raw value extracted from the URI
        value: String,
        /// Declared type
        expected: &'static str,
    },

    /// Arguments supplied to a capability are unusable
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Backend HTTP call failed (transport error or non-2xx status)
    #[error("Backend request failed{}: {message}", status_suffix(.status))]
    Backend {
        /// HTTP status when a response was received
        status: Option<u16>,
        /// Human-readable reason
        message: String,
        /// Response body when available
        body: Option<String>,
    },

    /// Invocation cancelled by the caller
    #[error("Request cancelled")]
    Cancelled,

    /// Capability handler failed
    #[error("Handler error: {0}")]
    Handler(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a backend failure without a response
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Create a template definition error
    pub fn template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TemplateDefinition {
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid operation error
    pub fn operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that indicate a lookup miss rather than a fault
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound(_) | Self::NotFound { .. })
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::NotFound { .. } => rpc_codes::METHOD_NOT_FOUND,
            Self::Coercion { .. } | Self::InvalidArguments(_) => rpc_codes::INVALID_PARAMS,
            Self::ResourceNotFound(_) => rpc_codes::RESOURCE_NOT_FOUND,
            Self::Backend { .. } | Self::Http(_) | Self::Cancelled => rpc_codes::SERVER_ERROR_START,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Resource not found (MCP)
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
}
