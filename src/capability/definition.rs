//! Capability records
//!
//! A [`Capability`] is one registry entry: a tool, a static resource, a
//! resource template or a prompt. All four share the same metadata and
//! handler reference and differ only in how they are located, which the
//! [`Locator`] tag captures.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::executor::{BoundOperation, HttpExecutor};
use crate::protocol::{Prompt, PromptArgument, Resource, ResourceTemplate, Tool, ToolAnnotations};
use crate::registry::UriTemplate;
use crate::{Error, Result};

/// Named arguments passed to a handler
pub type Arguments = Map<String, Value>;

/// Default MIME type for locally registered resources
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

// ============================================================================
// Parameters
// ============================================================================

/// Declared type of a handler parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// Any string
    #[default]
    String,
    /// Signed 64-bit integer
    Integer,
    /// Floating point number
    Number,
    /// Boolean
    Boolean,
    /// JSON object
    Object,
    /// JSON array
    Array,
    /// Untyped
    Any,
}

impl SemanticType {
    /// Derive the semantic type from a JSON schema.
    ///
    /// Handles 3.1 style `type: [integer, "null"]` and `anyOf`/`oneOf`
    /// unions by taking the first non-null member.
    #[must_use]
    pub fn from_schema(schema: &Value) -> Self {
        match schema.get("type") {
            Some(Value::String(t)) => Self::from_name(t),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map_or(Self::Any, Self::from_name),
            _ => {
                if schema.get("properties").is_some() {
                    return Self::Object;
                }
                ["anyOf", "oneOf"]
                    .iter()
                    .filter_map(|k| schema.get(*k).and_then(Value::as_array))
                    .flatten()
                    .map(Self::from_schema)
                    .find(|t| *t != Self::Any)
                    .unwrap_or(Self::Any)
            }
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            "array" => Self::Array,
            _ => Self::Any,
        }
    }

    /// JSON schema type name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }

    /// Convert a raw string extracted from a URI into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Coercion`] naming the parameter and raw value.
    pub fn coerce(self, parameter: &str, raw: &str) -> Result<Value> {
        let fail = || Error::Coercion {
            parameter: parameter.to_string(),
            value: raw.to_string(),
            expected: self.as_str(),
        };

        match self {
            Self::String | Self::Any => Ok(Value::String(raw.to_string())),
            Self::Integer => raw.parse::<i64>().map(Value::from).map_err(|_| fail()),
            Self::Number => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(fail),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" | "t" | "y" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" | "f" | "n" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            Self::Object => match serde_json::from_str::<Value>(raw) {
                Ok(v @ Value::Object(_)) => Ok(v),
                _ => Err(fail()),
            },
            Self::Array => match serde_json::from_str::<Value>(raw) {
                Ok(v @ Value::Array(_)) => Ok(v),
                _ => Err(fail()),
            },
        }
    }
}

/// Where a parameter's value travels when the capability is backed by HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Substituted into the URL path
    Path,
    /// Appended to the query string
    Query,
    /// Sent as a request header
    Header,
    /// Sent in the `Cookie` header
    Cookie,
    /// Part of the JSON request body
    Body,
    /// Plain argument of a local handler
    Argument,
}

/// One declared handler parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    /// Argument name
    pub name: String,
    /// Declared type
    pub semantic_type: SemanticType,
    /// Whether callers must supply it
    pub required: bool,
    /// Value used when the caller omits it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Source location
    pub location: ParameterLocation,
    /// Human description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Full JSON schema for the argument
    pub schema: Value,
}

impl ParameterSpec {
    /// Optional local-handler parameter of the given type
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        let schema = match semantic_type {
            SemanticType::Any => json!({}),
            other => json!({ "type": other.as_str() }),
        };
        Self {
            name: name.into(),
            semantic_type,
            required: false,
            default: None,
            location: ParameterLocation::Argument,
            description: None,
            schema,
        }
    }

    /// Mark as required
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set a default value
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the location
    #[must_use]
    pub fn at(mut self, location: ParameterLocation) -> Self {
        self.location = location;
        self
    }

    /// Required and without a default: must be supplied by the caller
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default.is_none()
    }
}

/// Build a JSON object schema from a parameter list
#[must_use]
pub fn input_schema(parameters: &[ParameterSpec]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in parameters {
        let mut prop = param.schema.as_object().cloned().unwrap_or_default();
        if let Some(ref desc) = param.description {
            prop.entry("description")
                .or_insert_with(|| Value::String(desc.clone()));
        }
        if let Some(ref default) = param.default {
            prop.entry("default").or_insert_with(|| default.clone());
        }
        properties.insert(param.name.clone(), Value::Object(prop));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Boxed local handler function
pub type LocalFn = Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// What runs when a capability is invoked
pub enum Handler {
    /// In-process async function
    Local(LocalFn),
    /// `OpenAPI` operation sent through an [`HttpExecutor`]
    Http {
        /// Operation plus its synthesized parameters
        operation: Arc<BoundOperation>,
        /// Executor owning the backend transport
        executor: Arc<HttpExecutor>,
    },
}

impl Handler {
    /// Wrap an async closure as a local handler
    pub fn local<F, Fut>(f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::Local(Arc::new(move |args| Box::pin(f(args))))
    }

    /// Returns `true` for HTTP-backed handlers
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    /// Run the handler
    ///
    /// # Errors
    ///
    /// Propagates handler errors; HTTP handlers fail with [`Error::Backend`]
    /// on transport errors and non-2xx responses.
    pub async fn invoke(&self, args: Arguments) -> Result<Value> {
        match self {
            Self::Local(f) => f(args).await,
            Self::Http {
                operation,
                executor,
            } => executor.execute(operation, &args).await?.into_result(),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Handler::Local"),
            Self::Http { operation, .. } => write!(
                f,
                "Handler::Http({} {})",
                operation.operation.method, operation.operation.path
            ),
        }
    }
}

// ============================================================================
// Capability
// ============================================================================

/// Kind tag of a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Invokable tool
    Action,
    /// Fixed-URI readable resource
    StaticResource,
    /// Parameterized readable resource
    ResourceTemplate,
    /// Prompt template
    Prompt,
}

impl CapabilityKind {
    /// Label used in log lines and conflict errors
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Action => "Tool",
            Self::StaticResource => "Resource",
            Self::ResourceTemplate => "Resource template",
            Self::Prompt => "Prompt",
        }
    }
}

/// How a capability is addressed
#[derive(Debug, Clone)]
pub enum Locator {
    /// Tool name
    Action(String),
    /// Exact resource URI
    StaticResource(String),
    /// Compiled URI template
    ResourceTemplate(UriTemplate),
    /// Prompt name
    Prompt(String),
}

/// A registry entry
#[derive(Debug, Clone)]
pub struct Capability {
    locator: Locator,
    name: String,
    description: Option<String>,
    tags: BTreeSet<String>,
    mime_type: Option<String>,
    parameters: Vec<ParameterSpec>,
    read_only: Option<bool>,
    handler: Arc<Handler>,
}

impl Capability {
    fn with_locator(locator: Locator, name: String, handler: Arc<Handler>) -> Self {
        Self {
            locator,
            name,
            description: None,
            tags: BTreeSet::new(),
            mime_type: None,
            parameters: Vec::new(),
            read_only: None,
            handler,
        }
    }

    /// New tool
    pub fn action(name: impl Into<String>, handler: impl Into<Arc<Handler>>) -> Self {
        let name = name.into();
        Self::with_locator(Locator::Action(name.clone()), name, handler.into())
    }

    /// New static resource
    pub fn resource(
        uri: impl Into<String>,
        name: impl Into<String>,
        handler: impl Into<Arc<Handler>>,
    ) -> Self {
        let mut cap = Self::with_locator(
            Locator::StaticResource(uri.into()),
            name.into(),
            handler.into(),
        );
        cap.mime_type = Some(DEFAULT_MIME_TYPE.to_string());
        cap
    }

    /// New resource template. Several templates may share one handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateDefinition`] if the template has no
    /// placeholders, names a placeholder the handler does not declare, or
    /// leaves a mandatory parameter out of the URI.
    pub fn template(
        uri_template: &str,
        name: impl Into<String>,
        parameters: Vec<ParameterSpec>,
        handler: impl Into<Arc<Handler>>,
    ) -> Result<Self> {
        let template = UriTemplate::parse(uri_template)?;
        let mut cap = Self::with_locator(
            Locator::ResourceTemplate(template),
            name.into(),
            handler.into(),
        );
        cap.mime_type = Some(DEFAULT_MIME_TYPE.to_string());
        cap.parameters = parameters;
        cap.validate()?;
        Ok(cap)
    }

    /// New prompt
    pub fn prompt(name: impl Into<String>, handler: impl Into<Arc<Handler>>) -> Self {
        let name = name.into();
        Self::with_locator(Locator::Prompt(name.clone()), name, handler.into())
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the declared parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<ParameterSpec>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Add tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Set the MIME type
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Mark the capability as read-only (tool annotation hint)
    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    /// Check the template/parameter agreement.
    ///
    /// Only resource templates carry a constraint; every other kind is
    /// always valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateDefinition`] describing the mismatch.
    pub fn validate(&self) -> Result<()> {
        let Locator::ResourceTemplate(ref template) = self.locator else {
            return Ok(());
        };

        for placeholder in template.placeholders() {
            if !self.parameters.iter().any(|p| &p.name == placeholder) {
                return Err(Error::template(
                    template.as_str(),
                    format!("placeholder '{placeholder}' is not a handler parameter"),
                ));
            }
        }

        let placeholders = template.placeholders();
        if let Some(missing) = self
            .parameters
            .iter()
            .find(|p| p.is_mandatory() && !placeholders.contains(&p.name))
        {
            return Err(Error::template(
                template.as_str(),
                format!(
                    "required parameter '{}' has no default and is not in the URI",
                    missing.name
                ),
            ));
        }

        Ok(())
    }

    /// Registry key: tool/prompt name, resource URI or URI template
    #[must_use]
    pub fn key(&self) -> &str {
        match &self.locator {
            Locator::Action(name) | Locator::Prompt(name) => name,
            Locator::StaticResource(uri) => uri,
            Locator::ResourceTemplate(template) => template.as_str(),
        }
    }

    /// Kind tag
    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        match self.locator {
            Locator::Action(_) => CapabilityKind::Action,
            Locator::StaticResource(_) => CapabilityKind::StaticResource,
            Locator::ResourceTemplate(_) => CapabilityKind::ResourceTemplate,
            Locator::Prompt(_) => CapabilityKind::Prompt,
        }
    }

    /// Addressing details
    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Compiled template, for resource templates
    #[must_use]
    pub fn uri_template(&self) -> Option<&UriTemplate> {
        match self.locator {
            Locator::ResourceTemplate(ref t) => Some(t),
            _ => None,
        }
    }

    /// Human name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Tags
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// MIME type
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Declared parameters
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Shared handler
    #[must_use]
    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    /// Copy of this capability under a new key, sharing the handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateDefinition`] if the new key of a resource
    /// template does not compile.
    pub fn rekeyed(&self, key: String) -> Result<Self> {
        let mut cap = self.clone();
        cap.locator = match self.locator {
            Locator::Action(_) => {
                cap.name.clone_from(&key);
                Locator::Action(key)
            }
            Locator::Prompt(_) => {
                cap.name.clone_from(&key);
                Locator::Prompt(key)
            }
            Locator::StaticResource(_) => Locator::StaticResource(key),
            Locator::ResourceTemplate(_) => Locator::ResourceTemplate(UriTemplate::parse(&key)?),
        };
        Ok(cap)
    }

    /// Check required arguments and, for local handlers, fill defaults
    fn prepare(&self, mut args: Arguments) -> Result<Arguments> {
        let missing: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.is_mandatory() && !args.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidArguments(format!(
                "{} '{}' is missing required argument(s): {}",
                self.kind().label(),
                self.key(),
                missing.join(", ")
            )));
        }

        if !self.handler.is_http() {
            for param in &self.parameters {
                if let Some(ref default) = param.default {
                    args.entry(param.name.clone())
                        .or_insert_with(|| default.clone());
                }
            }
        }
        Ok(args)
    }

    /// Invoke the handler with caller-supplied arguments
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when a mandatory argument is
    /// missing, otherwise whatever the handler returns.
    pub async fn invoke(&self, args: Arguments) -> Result<Value> {
        let args = self.prepare(args)?;
        self.handler.invoke(args).await
    }

    /// Tool descriptor
    #[must_use]
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.key().to_string(),
            description: self.description.clone(),
            input_schema: input_schema(&self.parameters),
            annotations: self.read_only.map(|read_only| ToolAnnotations {
                read_only_hint: Some(read_only),
                open_world_hint: Some(self.handler.is_http()),
            }),
        }
    }

    /// Resource descriptor
    #[must_use]
    pub fn to_resource(&self) -> Resource {
        Resource {
            uri: self.key().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    /// Resource template descriptor
    #[must_use]
    pub fn to_resource_template(&self) -> ResourceTemplate {
        ResourceTemplate {
            uri_template: self.key().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    /// Prompt descriptor
    #[must_use]
    pub fn to_prompt(&self) -> Prompt {
        Prompt {
            name: self.key().to_string(),
            description: self.description.clone(),
            arguments: self
                .parameters
                .iter()
                .map(|p| PromptArgument {
                    name: p.name.clone(),
                    description: p.description.clone(),
                    required: p.required,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn echo() -> Handler {
        Handler::local(|args| async move { Ok(Value::Object(args)) })
    }

    #[test]
    fn coerce_integer_and_number() {
        assert_eq!(SemanticType::Integer.coerce("id", "42").unwrap(), json!(42));
        assert_eq!(SemanticType::Number.coerce("p", "9.5").unwrap(), json!(9.5));
        assert!(SemanticType::Integer.coerce("id", "4.2").is_err());
        assert!(SemanticType::Number.coerce("p", "NaN").is_err());
    }

    #[test]
    fn coerce_boolean_literals() {
        for raw in ["true", "True", "1", "yes", "on"] {
            assert_eq!(SemanticType::Boolean.coerce("b", raw).unwrap(), json!(true));
        }
        for raw in ["false", "0", "no", "OFF"] {
            assert_eq!(SemanticType::Boolean.coerce("b", raw).unwrap(), json!(false));
        }
        let err = SemanticType::Boolean.coerce("flag", "maybe").unwrap_err();
        assert!(matches!(
            err,
            Error::Coercion { ref parameter, ref value, .. } if parameter == "flag" && value == "maybe"
        ));
    }

    #[test]
    fn semantic_type_from_31_style_schema() {
        assert_eq!(
            SemanticType::from_schema(&json!({"type": ["integer", "null"]})),
            SemanticType::Integer
        );
        assert_eq!(
            SemanticType::from_schema(&json!({"anyOf": [{"type": "null"}, {"type": "boolean"}]})),
            SemanticType::Boolean
        );
        assert_eq!(SemanticType::from_schema(&json!({})), SemanticType::Any);
    }

    #[test]
    fn template_requires_placeholder() {
        let err = Capability::template("data://static", "x", vec![], echo()).unwrap_err();
        assert!(matches!(err, Error::TemplateDefinition { .. }));
    }

    #[test]
    fn template_placeholder_must_be_declared() {
        let params = vec![ParameterSpec::new("key", SemanticType::String).required()];
        let err = Capability::template("test://{key}/{value}", "t", params, echo()).unwrap_err();
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn template_mandatory_parameter_must_be_placeholder() {
        let params = vec![
            ParameterSpec::new("key", SemanticType::String).required(),
            ParameterSpec::new("other", SemanticType::String).required(),
        ];
        let err = Capability::template("test://{key}", "t", params, echo()).unwrap_err();
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn template_optional_extra_parameter_is_allowed() {
        let params = vec![
            ParameterSpec::new("key", SemanticType::String).required(),
            ParameterSpec::new("limit", SemanticType::Integer).with_default(json!(10)),
        ];
        let cap = Capability::template("test://{key}", "t", params, echo()).unwrap();
        assert_eq!(cap.kind(), CapabilityKind::ResourceTemplate);
        assert_eq!(cap.key(), "test://{key}");
    }

    #[tokio::test]
    async fn local_invoke_fills_defaults_and_checks_required() {
        let cap = Capability::action("greet", echo()).with_parameters(vec![
            ParameterSpec::new("name", SemanticType::String).required(),
            ParameterSpec::new("greeting", SemanticType::String).with_default(json!("hi")),
        ]);

        let mut args = Arguments::new();
        args.insert("name".into(), json!("Ada"));
        let out = cap.invoke(args).await.unwrap();
        assert_eq!(out, json!({"name": "Ada", "greeting": "hi"}));

        let err = cap.invoke(Arguments::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn rekeyed_shares_handler() {
        let cap = Capability::action("search", echo());
        let copy = cap.rekeyed("web_search".to_string()).unwrap();
        assert_eq!(copy.key(), "web_search");
        assert_eq!(copy.name(), "web_search");
        assert!(Arc::ptr_eq(cap.handler(), copy.handler()));
    }

    #[test]
    fn input_schema_lists_required() {
        let schema = input_schema(&[
            ParameterSpec::new("name", SemanticType::String).required(),
            ParameterSpec::new("price", SemanticType::Number),
        ]);
        assert_eq!(schema["required"], json!(["name"]));
        assert_eq!(schema["properties"]["price"]["type"], "number");
    }
}
