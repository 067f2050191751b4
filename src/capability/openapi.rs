//! `OpenAPI` document parsing
//!
//! Extracts one [`OperationDescriptor`] per `(path, method)` pair from an
//! `OpenAPI` 3.0 or 3.1 document (YAML or JSON). Local `$ref`s are inlined,
//! path-level parameters are merged into each operation, and operations
//! that cannot be described are collected in [`OpenApiDocument::skipped`]
//! instead of failing the whole document.
//!
//! # Usage
//!
//! ```ignore
//! let doc = OpenApiDocument::from_file("petstore.yaml")?;
//! for op in &doc.operations {
//!     println!("{} {} -> {}", op.method, op.path, op.id());
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::definition::ParameterLocation;
use crate::{Error, Result};

/// HTTP methods that may appear under a path item
const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Nested `$ref` depth after which resolution gives up
const MAX_REF_DEPTH: usize = 32;

/// One operation parameter (path, query, header or cookie)
#[derive(Debug, Clone, PartialEq)]
pub struct OperationParameter {
    /// Parameter name
    pub name: String,
    /// Where it travels
    pub location: ParameterLocation,
    /// Required flag (always `true` for path parameters)
    pub required: bool,
    /// Resolved JSON schema
    pub schema: Value,
    /// Default value from the schema
    pub default: Option<Value>,
    /// Description
    pub description: Option<String>,
}

/// Request body of an operation
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    /// Whether the body must be sent
    pub required: bool,
    /// Chosen media type
    pub content_type: String,
    /// Resolved JSON schema of the body
    pub schema: Value,
}

/// One HTTP operation extracted from a document. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    /// Upper-case HTTP method
    pub method: String,
    /// Path pattern with `{param}` placeholders
    pub path: String,
    /// `operationId`
    pub operation_id: Option<String>,
    /// Summary
    pub summary: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Tags
    pub tags: Vec<String>,
    /// Parameters in declaration order (path-level first, then operation-level)
    pub parameters: Vec<OperationParameter>,
    /// Request body
    pub request_body: Option<RequestBody>,
    /// Response descriptions by status code
    pub responses: BTreeMap<String, String>,
}

impl OperationDescriptor {
    /// `operationId`, or `METHOD path` when absent
    #[must_use]
    pub fn id(&self) -> String {
        self.operation_id
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method, self.path))
    }

    /// Parameters at one location, in declaration order
    pub fn parameters_in(
        &self,
        location: ParameterLocation,
    ) -> impl Iterator<Item = &OperationParameter> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }

    /// Placeholder names in the path, in path order
    #[must_use]
    pub fn path_placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(rest[start + 1..start + len].to_string());
            rest = &rest[start + len + 1..];
        }
        names
    }

    /// Human description: summary, then description, then `METHOD path`
    #[must_use]
    pub fn display_description(&self) -> String {
        self.summary
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| format!("{} {}", self.method, self.path))
    }
}

/// A parsed document
#[derive(Debug)]
pub struct OpenApiDocument {
    /// `info.title`
    pub title: String,
    /// `openapi` version string
    pub openapi_version: String,
    /// First server URL, if any
    pub base_url: Option<String>,
    /// Operations in document order
    pub operations: Vec<OperationDescriptor>,
    /// Operations that could not be described
    pub skipped: Vec<Error>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    operation_id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    parameters: Vec<Value>,
    request_body: Option<Value>,
    #[serde(default)]
    responses: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "in")]
    location: String,
    #[serde(default)]
    required: bool,
    schema: Option<Value>,
    description: Option<String>,
}

impl OpenApiDocument {
    /// Parse a document from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read OpenAPI spec {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse a document from YAML or JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not a document, or declares
    /// a version other than 3.0.x / 3.1.x.
    pub fn parse(content: &str) -> Result<Self> {
        let root: Value = match serde_json::from_str(content) {
            Ok(root) => root,
            Err(_) => {
                // YAML may use non-string keys (e.g. `200:`), which serde_json stringifies
                let yaml: serde_yaml::Value = serde_yaml::from_str(content)
                    .map_err(|e| Error::Config(format!("Failed to parse OpenAPI spec: {e}")))?;
                serde_json::to_value(yaml)?
            }
        };
        Self::from_value(&root)
    }

    /// Build from an already parsed document.
    ///
    /// # Errors
    ///
    /// See [`Self::parse`].
    pub fn from_value(root: &Value) -> Result<Self> {
        let version = root
            .get("openapi")
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| {
                Error::Config(
                    "Not an OpenAPI 3 document (missing 'openapi' version field)".to_string(),
                )
            })?;
        if !(version.starts_with("3.0") || version.starts_with("3.1")) {
            return Err(Error::Config(format!(
                "Unsupported OpenAPI version '{version}' (expected 3.0.x or 3.1.x)"
            )));
        }

        let title = root
            .get("info")
            .and_then(|i| serde_json::from_value::<RawInfo>(i.clone()).ok())
            .map(|i| i.title)
            .unwrap_or_default();

        let base_url = root
            .get("servers")
            .and_then(|s| serde_json::from_value::<Vec<RawServer>>(s.clone()).ok())
            .and_then(|s| s.into_iter().next())
            .map(|s| s.url);

        info!(title = %title, version = %version, "Parsing OpenAPI spec");

        let resolver = RefResolver::new(root);
        let mut operations = Vec::new();
        let mut skipped = Vec::new();

        let paths = root.get("paths").and_then(Value::as_object);
        for (path, item) in paths.into_iter().flatten() {
            let item = match resolver.deref(item) {
                Ok(item) => item,
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping path item");
                    skipped.push(e);
                    continue;
                }
            };
            // Operations resolve their own references
            let shared = match item
                .get("parameters")
                .map(|p| resolver.resolve(p))
                .transpose()
            {
                Ok(Some(Value::Array(shared))) => shared,
                Ok(_) => Vec::new(),
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping path item");
                    skipped.push(e);
                    continue;
                }
            };

            for method in METHODS {
                let Some(raw) = item.get(method) else {
                    continue;
                };
                match parse_operation(path, method, raw, &shared, &resolver) {
                    Ok(op) => {
                        debug!(operation = %op.id(), method = %op.method, path = %op.path, "Parsed operation");
                        operations.push(op);
                    }
                    Err(e) => {
                        warn!(path = %path, method = %method, error = %e, "Skipping operation");
                        skipped.push(e);
                    }
                }
            }
        }

        info!(
            operations = operations.len(),
            skipped = skipped.len(),
            "Parsed OpenAPI spec"
        );

        Ok(Self {
            title,
            openapi_version: version,
            base_url,
            operations,
            skipped,
        })
    }
}

fn parse_operation(
    path: &str,
    method: &str,
    raw: &Value,
    shared: &[Value],
    resolver: &RefResolver<'_>,
) -> Result<OperationDescriptor> {
    let label = || format!("{} {path}", method.to_uppercase());
    let raw: RawOperation = serde_json::from_value(raw.clone())
        .map_err(|e| Error::operation(label(), e.to_string()))?;
    let label = || {
        raw.operation_id
            .clone()
            .unwrap_or_else(|| format!("{} {path}", method.to_uppercase()))
    };

    let unresolved = |e: Error| Error::operation(label(), e.to_string());
    let own = raw
        .parameters
        .iter()
        .map(|p| resolver.resolve(p))
        .collect::<Result<Vec<_>>>()
        .map_err(&unresolved)?;

    // Operation-level parameters override path-level ones with the same (name, in)
    let mut parameters: Vec<OperationParameter> = Vec::new();
    for value in shared.iter().chain(own.iter()) {
        let param = parse_parameter(value).map_err(|reason| Error::operation(label(), reason))?;
        if let Some(existing) = parameters
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            *existing = param;
        } else {
            parameters.push(param);
        }
    }

    let request_body = raw
        .request_body
        .as_ref()
        .map(|body| resolver.resolve(body))
        .transpose()
        .map_err(&unresolved)?
        .as_ref()
        .map(parse_request_body)
        .transpose()
        .map_err(|reason| Error::operation(label(), reason))?;

    // Response schemas are never resolved
    let responses = raw
        .responses
        .iter()
        .map(|(status, resp)| {
            let description = resolver
                .deref(resp)
                .ok()
                .and_then(|resp| resp.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            (status.clone(), description)
        })
        .collect();

    Ok(OperationDescriptor {
        method: method.to_uppercase(),
        path: path.to_string(),
        operation_id: raw.operation_id,
        summary: raw.summary,
        description: raw.description,
        tags: raw.tags,
        parameters,
        request_body,
        responses,
    })
}

fn parse_parameter(value: &Value) -> std::result::Result<OperationParameter, String> {
    let raw: RawParameter =
        serde_json::from_value(value.clone()).map_err(|e| format!("bad parameter: {e}"))?;
    let location = match raw.location.as_str() {
        "path" => ParameterLocation::Path,
        "query" => ParameterLocation::Query,
        "header" => ParameterLocation::Header,
        "cookie" => ParameterLocation::Cookie,
        other => {
            return Err(format!(
                "parameter '{}' has unknown location '{other}'",
                raw.name
            ));
        }
    };
    let schema = raw
        .schema
        .unwrap_or_else(|| serde_json::json!({"type": "string"}));
    let default = schema.get("default").cloned();

    Ok(OperationParameter {
        required: raw.required || location == ParameterLocation::Path,
        name: raw.name,
        location,
        schema,
        default,
        description: raw.description,
    })
}

fn parse_request_body(value: &Value) -> std::result::Result<RequestBody, String> {
    let required = value
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let content = value
        .get("content")
        .and_then(Value::as_object)
        .ok_or_else(|| "request body has no content".to_string())?;

    let (content_type, media) = content
        .iter()
        .find(|(k, _)| *k == "application/json")
        .or_else(|| content.iter().find(|(k, _)| k.ends_with("+json")))
        .or_else(|| content.iter().next())
        .ok_or_else(|| "request body has no media types".to_string())?;

    Ok(RequestBody {
        required,
        content_type: content_type.clone(),
        schema: media
            .get("schema")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})),
    })
}

// ============================================================================
// $ref resolution
// ============================================================================

/// Inlines local `#/...` references. Cyclic references are replaced by an
/// empty (untyped) schema.
struct RefResolver<'a> {
    root: &'a Value,
}

impl<'a> RefResolver<'a> {
    fn new(root: &'a Value) -> Self {
        Self { root }
    }

    fn resolve(&self, value: &Value) -> Result<Value> {
        self.inline(value, &mut HashSet::new(), 0)
    }

    /// Follow a top-level `$ref` chain without inlining anything below it
    fn deref<'v>(&self, mut value: &'v Value) -> Result<&'v Value>
    where
        'a: 'v,
    {
        for _ in 0..MAX_REF_DEPTH {
            let Some(reference) = value.get("$ref").and_then(Value::as_str) else {
                return Ok(value);
            };
            let pointer = reference.strip_prefix('#').ok_or_else(|| {
                Error::Config(format!("External $ref '{reference}' is not supported"))
            })?;
            value = self
                .root
                .pointer(pointer)
                .ok_or_else(|| Error::Config(format!("Unresolved $ref '{reference}'")))?;
        }
        Err(Error::Config(format!(
            "$ref nesting deeper than {MAX_REF_DEPTH}"
        )))
    }

    fn inline(&self, value: &Value, stack: &mut HashSet<String>, depth: usize) -> Result<Value> {
        if depth > MAX_REF_DEPTH {
            return Err(Error::Config(format!(
                "$ref nesting deeper than {MAX_REF_DEPTH}"
            )));
        }
        match value {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    return self.follow(reference, stack, depth);
                }
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.inline(v, stack, depth)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|v| self.inline(v, stack, depth))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn follow(&self, reference: &str, stack: &mut HashSet<String>, depth: usize) -> Result<Value> {
        let pointer = reference.strip_prefix('#').ok_or_else(|| {
            Error::Config(format!("External $ref '{reference}' is not supported"))
        })?;
        if stack.contains(reference) {
            debug!(reference = %reference, "Cyclic $ref, leaving schema untyped");
            return Ok(Value::Object(Map::new()));
        }
        let target = self
            .root
            .pointer(pointer)
            .ok_or_else(|| Error::Config(format!("Unresolved $ref '{reference}'")))?;

        stack.insert(reference.to_string());
        let resolved = self.inline(target, stack, depth + 1);
        stack.remove(reference);
        resolved
    }
}

/// Format a capability name: non-alphanumerics collapse to single `_`,
/// leading/trailing `_` trimmed, case preserved.
#[must_use]
pub fn format_name(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut prev_underscore = false;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            result.push(c);
            prev_underscore = false;
        } else if !prev_underscore {
            result.push('_');
            prev_underscore = true;
        }
    }
    result.trim_matches('_').to_string()
}
