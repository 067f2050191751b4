//! MCP-facing descriptor types and the result serialization collaborator

mod serialize;
mod types;

pub use serialize::{JsonResultSerializer, ResultSerializer};
pub use types::*;
