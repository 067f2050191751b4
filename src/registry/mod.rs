//! Capability registry
//!
//! Four independent namespaces (tools, static resources, resource
//! templates, prompts) held in one immutable snapshot. Registration and
//! mounting build a new snapshot and swap it in under a write lock, so an
//! invocation always sees either the state before or after a change.
//!
//! ```text
//! ┌──────────────────────────── CapabilityRegistry ───────────────────────────┐
//! │  RwLock<Arc<RegistryState>>                                               │
//! │    tools ─────────── name ──▶ Arc<Capability> ─┐                          │
//! │    resources ─────── uri ───▶ Arc<Capability> ─┼──▶ Arc<Handler> (shared) │
//! │    templates ─────── tpl ───▶ Arc<Capability> ─┤                          │
//! │    prompts ───────── name ──▶ Arc<Capability> ─┘                          │
//! │  mounts: prefix ──▶ child registry (lifespan only)                        │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```

mod lifespan;
mod mount;
mod template;

pub use lifespan::{ActiveLifespan, Lifespan};
pub use mount::{CompositionMounter, MountOptions, MountRecord, MountSummary};
pub use template::{Resolution, TemplateResolver, UriTemplate};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capability::{Arguments, Capability, CapabilityKind};
use crate::config::Config;
use crate::protocol::{
    Content, JsonResultSerializer, Prompt, PromptMessage, Resource, ResourceContents,
    ResourceTemplate, ResultSerializer, Tool, ToolsCallResult,
};
use crate::{Error, Result};

// ============================================================================
// Duplicate policy
// ============================================================================

/// What happens when a registration collides with an existing key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Log a warning and replace
    #[default]
    Warn,
    /// Reject the new entry
    Error,
    /// Replace silently
    Replace,
    /// Keep the existing entry silently
    Ignore,
}

impl FromStr for DuplicatePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "replace" => Ok(Self::Replace),
            "ignore" => Ok(Self::Ignore),
            other => Err(Error::Config(format!(
                "Unknown duplicate policy '{other}' (expected warn, error, replace or ignore)"
            ))),
        }
    }
}

/// Per-namespace duplicate policies. Templates follow the resource policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicatePolicies {
    /// Tools
    pub tools: DuplicatePolicy,
    /// Static resources and templates
    pub resources: DuplicatePolicy,
    /// Prompts
    pub prompts: DuplicatePolicy,
}

impl DuplicatePolicies {
    /// Same policy for every namespace
    #[must_use]
    pub fn uniform(policy: DuplicatePolicy) -> Self {
        Self {
            tools: policy,
            resources: policy,
            prompts: policy,
        }
    }

    /// Policy for a capability kind
    #[must_use]
    pub fn for_kind(&self, kind: CapabilityKind) -> DuplicatePolicy {
        match kind {
            CapabilityKind::Action => self.tools,
            CapabilityKind::StaticResource | CapabilityKind::ResourceTemplate => self.resources,
            CapabilityKind::Prompt => self.prompts,
        }
    }
}

/// Result of a single registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Key was new
    Inserted,
    /// Existing entry replaced
    Replaced,
    /// New entry discarded
    Ignored,
}

// ============================================================================
// Snapshot state
// ============================================================================

/// One keyed namespace: records in registration order plus a key index
#[derive(Clone, Default)]
pub struct Namespace {
    entries: Vec<Arc<Capability>>,
    index: HashMap<String, usize>,
}

impl Namespace {
    /// Look up by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<Capability>> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Iterate in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Capability>> {
        self.entries.iter()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, capability: Arc<Capability>) {
        self.index
            .insert(capability.key().to_string(), self.entries.len());
        self.entries.push(capability);
    }

    fn insert(
        &mut self,
        capability: Arc<Capability>,
        policy: DuplicatePolicy,
    ) -> Result<Registration> {
        let Some(&slot) = self.index.get(capability.key()) else {
            self.push(capability);
            return Ok(Registration::Inserted);
        };

        match policy {
            DuplicatePolicy::Warn => {
                warn!(
                    kind = capability.kind().label(),
                    key = %capability.key(),
                    "Duplicate registration, replacing existing entry"
                );
                self.entries[slot] = capability;
                Ok(Registration::Replaced)
            }
            DuplicatePolicy::Replace => {
                self.entries[slot] = capability;
                Ok(Registration::Replaced)
            }
            DuplicatePolicy::Ignore => Ok(Registration::Ignored),
            DuplicatePolicy::Error => Err(Error::RegistrationConflict {
                namespace: capability.kind().label(),
                key: capability.key().to_string(),
            }),
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|c| c.key()))
            .finish()
    }
}

/// Immutable view of everything registered at one point in time
#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    /// Tools by name
    pub tools: Namespace,
    /// Static resources by URI
    pub resources: Namespace,
    /// Resource templates by template text
    pub templates: Namespace,
    /// Prompts by name
    pub prompts: Namespace,
}

impl RegistryState {
    fn namespace_mut(&mut self, kind: CapabilityKind) -> &mut Namespace {
        match kind {
            CapabilityKind::Action => &mut self.tools,
            CapabilityKind::StaticResource => &mut self.resources,
            CapabilityKind::ResourceTemplate => &mut self.templates,
            CapabilityKind::Prompt => &mut self.prompts,
        }
    }

    /// Namespace holding a capability kind
    #[must_use]
    pub fn namespace(&self, kind: CapabilityKind) -> &Namespace {
        match kind {
            CapabilityKind::Action => &self.tools,
            CapabilityKind::StaticResource => &self.resources,
            CapabilityKind::ResourceTemplate => &self.templates,
            CapabilityKind::Prompt => &self.prompts,
        }
    }

    pub(crate) fn insert(
        &mut self,
        capability: Arc<Capability>,
        policies: &DuplicatePolicies,
    ) -> Result<Registration> {
        let kind = capability.kind();
        self.namespace_mut(kind)
            .insert(capability, policies.for_kind(kind))
    }

    /// Every capability, namespace by namespace
    pub fn all(&self) -> impl Iterator<Item = &Arc<Capability>> {
        self.tools
            .iter()
            .chain(self.resources.iter())
            .chain(self.templates.iter())
            .chain(self.prompts.iter())
    }

    /// Resolver over this snapshot
    #[must_use]
    pub fn resolver(&self) -> TemplateResolver<'_> {
        TemplateResolver::new(&self.resources, &self.templates)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Store of capabilities with duplicate-policy enforcement, resolution,
/// mounting and lifecycle delegation.
///
/// ```
/// use std::sync::Arc;
/// use serde_json::json;
/// use mcp_capabilities::capability::{Capability, Handler};
/// use mcp_capabilities::registry::CapabilityRegistry;
///
/// # tokio_test::block_on(async {
/// let math = CapabilityRegistry::new("math");
/// math.register(Capability::action(
///     "add",
///     Handler::local(|args| async move {
///         let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
///         Ok(json!(sum))
///     }),
/// ))?;
///
/// let main = CapabilityRegistry::new("main");
/// main.mount_default("math", Arc::new(math))?;
///
/// let content = main.call_tool("math_add", json!({"a": 2, "b": 3})).await?;
/// assert_eq!(content[0].as_text(), Some("5"));
/// # Ok::<(), mcp_capabilities::Error>(())
/// # }).unwrap();
/// ```
pub struct CapabilityRegistry {
    name: String,
    policies: DuplicatePolicies,
    state: RwLock<Arc<RegistryState>>,
    mounts: RwLock<Vec<MountRecord>>,
    mount_options: MountOptions,
    lifespan: Option<Arc<dyn Lifespan>>,
    serializer: Arc<dyn ResultSerializer>,
}

impl CapabilityRegistry {
    /// Empty registry with the `warn` policy everywhere
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policies: DuplicatePolicies::default(),
            state: RwLock::new(Arc::new(RegistryState::default())),
            mounts: RwLock::new(Vec::new()),
            mount_options: MountOptions::default(),
            lifespan: None,
            serializer: Arc::new(JsonResultSerializer),
        }
    }

    /// Registry configured from the `registry` and `mount` config sections
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let registry = &config.registry;
        Self::new(registry.name.clone())
            .with_policies(DuplicatePolicies {
                tools: registry.on_duplicate_tools,
                resources: registry.on_duplicate_resources,
                prompts: registry.on_duplicate_prompts,
            })
            .with_mount_options(config.mount.clone())
    }

    /// Use one duplicate policy for every namespace
    #[must_use]
    pub fn with_policy(self, policy: DuplicatePolicy) -> Self {
        self.with_policies(DuplicatePolicies::uniform(policy))
    }

    /// Set per-namespace duplicate policies
    #[must_use]
    pub fn with_policies(mut self, policies: DuplicatePolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Separators used by [`Self::mount_default`]
    #[must_use]
    pub fn with_mount_options(mut self, options: MountOptions) -> Self {
        self.mount_options = options;
        self
    }

    /// Attach a startup/shutdown hook
    #[must_use]
    pub fn with_lifespan(mut self, lifespan: Arc<dyn Lifespan>) -> Self {
        self.lifespan = Some(lifespan);
        self
    }

    /// Replace the result serializer
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn ResultSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Registry name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured duplicate policies
    #[must_use]
    pub fn policies(&self) -> &DuplicatePolicies {
        &self.policies
    }

    /// Current immutable snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistryState> {
        Arc::clone(&self.state.read())
    }

    /// Apply a change to a private copy of the state and swap it in.
    /// Nothing is published if `change` fails.
    fn update<T>(&self, change: impl FnOnce(&mut RegistryState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write();
        let mut next = RegistryState::clone(&guard);
        let out = change(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }

    /// Register a capability under its own key.
    ///
    /// # Errors
    ///
    /// [`Error::TemplateDefinition`] for an inconsistent template;
    /// [`Error::RegistrationConflict`] for a duplicate under the `error`
    /// policy (the existing entry stays active).
    pub fn register(&self, capability: Capability) -> Result<Registration> {
        capability.validate()?;
        let kind = capability.kind();
        let key = capability.key().to_string();
        let outcome = self.update(|state| state.insert(Arc::new(capability), &self.policies))?;
        debug!(registry = %self.name, kind = kind.label(), key = %key, outcome = ?outcome, "Registered capability");
        Ok(outcome)
    }

    /// Tool by name
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<Arc<Capability>> {
        self.snapshot().tools.get(name).cloned()
    }

    /// Static resource by exact URI
    #[must_use]
    pub fn get_resource(&self, uri: &str) -> Option<Arc<Capability>> {
        self.snapshot().resources.get(uri).cloned()
    }

    /// Resource template by template text
    #[must_use]
    pub fn get_template(&self, uri_template: &str) -> Option<Arc<Capability>> {
        self.snapshot().templates.get(uri_template).cloned()
    }

    /// Prompt by name
    #[must_use]
    pub fn get_prompt(&self, name: &str) -> Option<Arc<Capability>> {
        self.snapshot().prompts.get(name).cloned()
    }

    /// Tool descriptors in registration order
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.snapshot().tools.iter().map(|c| c.to_tool()).collect()
    }

    /// Static resource descriptors in registration order
    #[must_use]
    pub fn list_resources(&self) -> Vec<Resource> {
        self.snapshot()
            .resources
            .iter()
            .map(|c| c.to_resource())
            .collect()
    }

    /// Resource template descriptors in registration order
    #[must_use]
    pub fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        self.snapshot()
            .templates
            .iter()
            .map(|c| c.to_resource_template())
            .collect()
    }

    /// Prompt descriptors in registration order
    #[must_use]
    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.snapshot().prompts.iter().map(|c| c.to_prompt()).collect()
    }

    /// Find the capability serving a resource URI.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceNotFound`] or [`Error::Coercion`].
    pub fn resolve(&self, uri: &str) -> Result<Resolution> {
        self.snapshot().resolver().resolve(uri)
    }

    /// Invoke a tool and return its raw result.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown tools, [`Error::InvalidArguments`]
    /// for non-object arguments, otherwise the handler's error.
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self.get_tool(name).ok_or_else(|| Error::NotFound {
            kind: "Tool",
            name: name.to_string(),
        })?;
        tool.invoke(into_arguments(arguments)?).await
    }

    /// Invoke a tool and serialize its result.
    ///
    /// # Errors
    ///
    /// See [`Self::invoke_tool`].
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Vec<Content>> {
        let value = self.invoke_tool(name, arguments).await?;
        self.serializer.tool_content(value)
    }

    /// Invoke a tool and wrap the outcome as a `tools/call` result.
    ///
    /// Handler and backend failures become `isError` results carrying the
    /// message; unknown tools and unusable arguments stay errors.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::InvalidArguments`] or a serializer
    /// error.
    pub async fn call_tool_result(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        match self.call_tool(name, arguments).await {
            Ok(content) => Ok(ToolsCallResult {
                content,
                is_error: false,
            }),
            Err(e @ (Error::Backend { .. } | Error::Handler(_) | Error::Cancelled)) => {
                Ok(ToolsCallResult {
                    content: vec![Content::text(e.to_string())],
                    is_error: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`Self::call_tool`], but abandoned when `cancel` fires. The
    /// invocation future is dropped, aborting any in-flight backend request.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] on cancellation, otherwise see
    /// [`Self::invoke_tool`].
    pub async fn call_tool_with_cancel(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Vec<Content>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = self.call_tool(name, arguments) => result,
        }
    }

    /// Read a resource by concrete URI.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceNotFound`], [`Error::Coercion`] or the handler's
    /// error.
    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContents> {
        let Resolution {
            capability,
            arguments,
        } = self.resolve(uri)?;
        let value = capability.invoke(arguments).await?;
        self.serializer
            .resource_contents(uri, capability.mime_type(), value)
    }

    /// Render a prompt.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown prompts, otherwise the handler's or
    /// serializer's error.
    pub async fn render_prompt(&self, name: &str, arguments: Value) -> Result<Vec<PromptMessage>> {
        let prompt = self.get_prompt(name).ok_or_else(|| Error::NotFound {
            kind: "Prompt",
            name: name.to_string(),
        })?;
        let value = prompt.invoke(into_arguments(arguments)?).await?;
        self.serializer.prompt_messages(value)
    }

    /// Number of capabilities across all namespaces
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.snapshot();
        state.tools.len() + state.resources.len() + state.templates.len() + state.prompts.len()
    }

    /// Returns `true` if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("name", &self.name)
            .field("policies", &self.policies)
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn into_arguments(value: Value) -> Result<Arguments> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Arguments::new()),
        other => Err(Error::InvalidArguments(format!(
            "arguments must be an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Handler, ParameterSpec, SemanticType};
    use serde_json::json;

    fn constant(value: Value) -> Handler {
        Handler::local(move |_| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    fn config_resource(value: &str) -> Capability {
        Capability::resource("data://config", "config", constant(json!(value)))
    }

    #[tokio::test]
    async fn error_policy_keeps_original_and_reports_conflict() {
        // GIVEN: a registry with the error policy and one resource
        let registry = CapabilityRegistry::new("test").with_policy(DuplicatePolicy::Error);
        registry.register(config_resource("first")).unwrap();

        // WHEN: registering the same URI again
        let err = registry.register(config_resource("second")).unwrap_err();

        // THEN: conflict reported and the first handler still serves reads
        assert!(matches!(err, Error::RegistrationConflict { .. }));
        let contents = registry.read_resource("data://config").await.unwrap();
        assert_eq!(contents.as_text(), Some("first"));
    }

    #[tokio::test]
    async fn replace_policy_serves_second_handler() {
        let registry = CapabilityRegistry::new("test").with_policy(DuplicatePolicy::Replace);
        registry.register(config_resource("first")).unwrap();
        let outcome = registry.register(config_resource("second")).unwrap();

        assert_eq!(outcome, Registration::Replaced);
        let contents = registry.read_resource("data://config").await.unwrap();
        assert_eq!(contents.as_text(), Some("second"));
    }

    #[tokio::test]
    async fn warn_policy_replaces() {
        let registry = CapabilityRegistry::new("test");
        registry.register(config_resource("first")).unwrap();
        assert_eq!(
            registry.register(config_resource("second")).unwrap(),
            Registration::Replaced
        );
        let contents = registry.read_resource("data://config").await.unwrap();
        assert_eq!(contents.as_text(), Some("second"));
    }

    #[tokio::test]
    async fn ignore_policy_keeps_existing() {
        let registry = CapabilityRegistry::new("test").with_policy(DuplicatePolicy::Ignore);
        registry.register(config_resource("first")).unwrap();
        assert_eq!(
            registry.register(config_resource("second")).unwrap(),
            Registration::Ignored
        );
        let contents = registry.read_resource("data://config").await.unwrap();
        assert_eq!(contents.as_text(), Some("first"));
    }

    #[test]
    fn policies_apply_per_namespace() {
        let registry = CapabilityRegistry::new("test").with_policies(DuplicatePolicies {
            tools: DuplicatePolicy::Error,
            ..DuplicatePolicies::default()
        });
        registry
            .register(Capability::action("a", constant(json!(1))))
            .unwrap();
        assert!(
            registry
                .register(Capability::action("a", constant(json!(2))))
                .is_err()
        );
        registry.register(config_resource("x")).unwrap();
        assert!(registry.register(config_resource("y")).is_ok());
    }

    #[test]
    fn same_key_in_different_namespaces_does_not_collide() {
        let registry = CapabilityRegistry::new("test").with_policy(DuplicatePolicy::Error);
        registry
            .register(Capability::action("summary", constant(json!(1))))
            .unwrap();
        registry
            .register(Capability::prompt("summary", constant(json!("p"))))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookups_do_not_mutate() {
        let registry = CapabilityRegistry::new("test");
        let before = registry.snapshot();
        assert!(registry.get_tool("missing").is_none());
        let _ = registry.list_tools();
        assert!(Arc::ptr_eq(&before, &registry.snapshot()));
    }

    #[tokio::test]
    async fn stacked_templates_share_one_handler() {
        let handler = Arc::new(Handler::local(|args| async move { Ok(Value::Object(args)) }));
        let params = vec![
            ParameterSpec::new("email", SemanticType::String).with_default(json!("")),
            ParameterSpec::new("name", SemanticType::String).with_default(json!("")),
        ];
        let registry = CapabilityRegistry::new("users");
        for template in ["users://email/{email}", "users://name/{name}"] {
            let cap =
                Capability::template(template, "lookup", params.clone(), Arc::clone(&handler))
                    .unwrap();
            registry.register(cap).unwrap();
        }

        let first = registry.get_template("users://email/{email}").unwrap();
        let second = registry.get_template("users://name/{name}").unwrap();
        assert!(Arc::ptr_eq(first.handler(), second.handler()));
        assert_eq!(registry.list_resource_templates().len(), 2);
        let by_email = registry.read_resource("users://email/a@example.com").await.unwrap();
        assert_eq!(
            by_email.as_text(),
            Some(r#"{"email":"a@example.com","name":""}"#)
        );
    }

    #[tokio::test]
    async fn call_tool_serializes_and_reports_unknown() {
        let registry = CapabilityRegistry::new("test");
        registry
            .register(Capability::action("hello", constant(json!("world"))))
            .unwrap();

        let content = registry.call_tool("hello", Value::Null).await.unwrap();
        assert_eq!(content[0].as_text(), Some("world"));

        let err = registry.call_tool("nope", json!({})).await.unwrap_err();
        assert!(err.is_not_found());

        let err = registry.call_tool("hello", json!([1])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn render_prompt_uses_serializer() {
        let registry = CapabilityRegistry::new("test");
        registry
            .register(
                Capability::prompt(
                    "summarize",
                    Handler::local(|args| async move {
                        let topic = args.get("topic").and_then(Value::as_str).unwrap_or("");
                        Ok(json!(format!("Summarize {topic}")))
                    }),
                )
                .with_parameters(vec![ParameterSpec::new("topic", SemanticType::String).required()]),
            )
            .unwrap();

        let messages = registry
            .render_prompt("summarize", json!({"topic": "Rust"}))
            .await
            .unwrap();
        assert_eq!(messages[0].content.as_text(), Some("Summarize Rust"));
        assert_eq!(registry.list_prompts()[0].arguments[0].name, "topic");
    }

    #[tokio::test]
    async fn handler_failure_becomes_error_result() {
        let registry = CapabilityRegistry::new("test");
        registry
            .register(Capability::action(
                "fail",
                Handler::local(|_| async { Err(Error::Handler("disk full".into())) }),
            ))
            .unwrap();

        let result = registry.call_tool_result("fail", json!({})).await.unwrap();
        assert!(result.is_error);
        assert!(result.content[0].as_text().unwrap().contains("disk full"));

        assert!(registry.call_tool_result("missing", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn cancelled_call_stops_waiting() {
        let registry = CapabilityRegistry::new("test");
        registry
            .register(Capability::action(
                "slow",
                Handler::local(|_| async {
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    Ok(json!("done"))
                }),
            ))
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = registry
            .call_tool_with_cancel("slow", json!({}), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("ERROR".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Error);
        assert!("sometimes".parse::<DuplicatePolicy>().is_err());
    }
}
