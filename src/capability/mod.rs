//! Capabilities and the `OpenAPI` bridge
//!
//! A capability is a tool, a static resource, a resource template or a
//! prompt, backed either by a local async function or by an HTTP operation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────────┐   ┌───────────────────┐
//! │ OpenAPI doc  │──▶│ RouteClassifier │──▶│ SchemaSynthesizer│──▶│ CapabilityFactory │
//! │ (YAML/JSON)  │   │ (ordered rules) │   │ (ParameterSpec[])│   │  (Capability)     │
//! └──────────────┘   └─────────────────┘   └──────────────────┘   └─────────┬─────────┘
//!                                                                           │ Handler::Http
//!                                                                           ▼
//!                                                                 ┌───────────────────┐
//!                                                                 │   HttpExecutor    │
//!                                                                 │ reqwest / in-proc │
//!                                                                 └───────────────────┘
//! ```

mod definition;
mod executor;
mod factory;
mod openapi;
mod route_map;
mod schema;

pub use definition::*;
pub use executor::{
    BoundOperation, HttpExecutor, HttpRequest, HttpResponse, HttpTransport, IN_PROCESS_BASE_URL,
    InProcessTransport, ReqwestTransport,
};
pub use factory::{BuildReport, CapabilityFactory, DEFAULT_URI_PREFIX, OPENAPI_MIME_TYPE};
pub use openapi::{
    OpenApiDocument, OperationDescriptor, OperationParameter, RequestBody, format_name,
};
pub use route_map::{MethodSet, RouteClassifier, RouteKind, RouteMapConfig, RouteMapRule};
pub use schema::{BODY_ARGUMENT, BodyEncoding, SchemaSynthesizer, SynthesizedSchema};
