//! Argument schema synthesis
//!
//! Merges an operation's path, query, header and cookie parameters with its
//! flattened request body into one ordered parameter list. The same list
//! drives the tool input schema, template validation and request building.

use serde_json::{Map, Value};

use super::definition::{ParameterLocation, ParameterSpec, SemanticType};
use super::openapi::{OperationDescriptor, RequestBody};
use crate::{Error, Result};

/// Argument name used for a body that is not a JSON object
pub const BODY_ARGUMENT: &str = "body";

/// How body arguments are put back together into a request body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BodyEncoding {
    /// Operation declares no body
    #[default]
    None,
    /// Object body: these arguments become its top-level properties
    Fields(Vec<String>),
    /// Non-object body: this argument is sent as the whole body
    Whole(String),
}

/// Result of synthesizing one operation
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedSchema {
    /// Parameters: path, query, header, cookie, then body fields
    pub parameters: Vec<ParameterSpec>,
    /// Body reassembly rule
    pub body: BodyEncoding,
}

impl SynthesizedSchema {
    /// Parameters at one location
    pub fn at(&self, location: ParameterLocation) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }
}

/// Builds declared parameters from operations. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaSynthesizer;

impl SchemaSynthesizer {
    /// Synthesize the parameter list of an operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when two sources declare the
    /// same argument name.
    pub fn synthesize(&self, op: &OperationDescriptor) -> Result<SynthesizedSchema> {
        let mut parameters: Vec<ParameterSpec> = Vec::new();

        for location in [
            ParameterLocation::Path,
            ParameterLocation::Query,
            ParameterLocation::Header,
            ParameterLocation::Cookie,
        ] {
            for param in op.parameters_in(location) {
                let mut spec = ParameterSpec::new(&param.name, SemanticType::from_schema(&param.schema))
                    .at(location);
                spec.required = param.required;
                spec.default.clone_from(&param.default);
                spec.description.clone_from(&param.description);
                spec.schema = param.schema.clone();
                push_unique(op, &mut parameters, spec)?;
            }
        }

        let body = match op.request_body {
            None => BodyEncoding::None,
            Some(ref body) => match object_properties(&body.schema) {
                Some((properties, required)) => {
                    let mut fields = Vec::with_capacity(properties.len());
                    for (name, schema) in properties {
                        let spec = body_field(body, &name, schema, required.contains(&name));
                        push_unique(op, &mut parameters, spec)?;
                        fields.push(name);
                    }
                    BodyEncoding::Fields(fields)
                }
                None => {
                    let mut spec =
                        ParameterSpec::new(BODY_ARGUMENT, SemanticType::from_schema(&body.schema))
                            .at(ParameterLocation::Body);
                    spec.required = body.required;
                    spec.schema = body.schema.clone();
                    push_unique(op, &mut parameters, spec)?;
                    BodyEncoding::Whole(BODY_ARGUMENT.to_string())
                }
            },
        };

        Ok(SynthesizedSchema { parameters, body })
    }
}

fn push_unique(
    op: &OperationDescriptor,
    parameters: &mut Vec<ParameterSpec>,
    spec: ParameterSpec,
) -> Result<()> {
    if let Some(existing) = parameters.iter().find(|p| p.name == spec.name) {
        return Err(Error::operation(
            op.id(),
            format!(
                "argument '{}' is declared by both {:?} and {:?} sources",
                spec.name, existing.location, spec.location
            ),
        ));
    }
    parameters.push(spec);
    Ok(())
}

fn body_field(body: &RequestBody, name: &str, schema: Value, listed_required: bool) -> ParameterSpec {
    let mut spec = ParameterSpec::new(name, SemanticType::from_schema(&schema))
        .at(ParameterLocation::Body);
    spec.required = body.required && listed_required;
    spec.default = schema.get("default").cloned();
    spec.description = schema
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    spec.schema = schema;
    spec
}

/// Properties and required names of an object schema, merging `allOf`
/// members. `None` when the schema is not object-shaped or declares no
/// properties (a free-form object is sent whole).
fn object_properties(schema: &Value) -> Option<(Map<String, Value>, Vec<String>)> {
    let is_object = schema.get("type").and_then(Value::as_str) == Some("object")
        || schema.get("properties").is_some()
        || schema.get("allOf").is_some();
    if !is_object {
        return None;
    }

    let mut properties = Map::new();
    let mut required = Vec::new();
    collect_object(schema, &mut properties, &mut required);
    (!properties.is_empty()).then_some((properties, required))
}

fn collect_object(schema: &Value, properties: &mut Map<String, Value>, required: &mut Vec<String>) {
    for member in schema
        .get("allOf")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        collect_object(member, properties, required);
    }
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            properties.insert(name.clone(), prop.clone());
        }
    }
    for name in schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
    {
        if !required.iter().any(|r| r == name) {
            required.push(name.to_string());
        }
    }
}
