//! Capability construction from `OpenAPI` operations
//!
//! For each operation: classify, synthesize parameters, bind to the
//! executor, and build the matching capability:
//!
//! | Kind | Key |
//! |------|-----|
//! | action | `{name}` |
//! | static resource | `resource://openapi/{name}` |
//! | resource template | `resource://openapi/{name}/{p1}/{p2}...` (path order) |
//!
//! A failing operation is reported in the [`BuildReport`]; the rest of the
//! document is still registered.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::definition::{Capability, Handler, ParameterLocation, ParameterSpec};
use super::executor::{BoundOperation, HttpExecutor};
use super::openapi::{OpenApiDocument, OperationDescriptor, format_name};
use super::route_map::{RouteClassifier, RouteKind};
use super::schema::SchemaSynthesizer;
use crate::config::OpenApiConfig;
use crate::registry::CapabilityRegistry;
use crate::{Error, Result};

/// URI prefix of generated resources
pub const DEFAULT_URI_PREFIX: &str = "resource://openapi";

/// MIME type of generated resources
pub const OPENAPI_MIME_TYPE: &str = "application/json";

/// Outcome of registering a whole document
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Registry keys that were registered, in document order
    pub registered: Vec<String>,
    /// Operations dropped by an `exclude` rule
    pub excluded: Vec<String>,
    /// Operations that could not be turned into capabilities
    pub errors: Vec<Error>,
}

impl BuildReport {
    /// Returns `true` if every operation was handled without error
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Builds capabilities bound to one backend
#[derive(Debug)]
pub struct CapabilityFactory {
    classifier: RouteClassifier,
    synthesizer: SchemaSynthesizer,
    executor: Arc<HttpExecutor>,
    uri_prefix: String,
    tags: Vec<String>,
}

impl CapabilityFactory {
    /// Factory using the default route rules
    #[must_use]
    pub fn new(executor: Arc<HttpExecutor>) -> Self {
        Self {
            classifier: RouteClassifier::default(),
            synthesizer: SchemaSynthesizer,
            executor,
            uri_prefix: DEFAULT_URI_PREFIX.to_string(),
            tags: Vec::new(),
        }
    }

    /// Factory configured from the `openapi` config section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid route pattern.
    pub fn from_config(config: &OpenApiConfig, executor: Arc<HttpExecutor>) -> Result<Self> {
        Ok(Self::new(executor)
            .with_classifier(config.classifier()?)
            .with_uri_prefix(config.uri_prefix.clone())
            .with_tags(config.tags.clone()))
    }

    /// Use custom route rules
    #[must_use]
    pub fn with_classifier(mut self, classifier: RouteClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Change the resource URI prefix
    #[must_use]
    pub fn with_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uri_prefix = prefix.into();
        self
    }

    /// Tags added to every capability
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Classifier in use
    #[must_use]
    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }

    /// Capability name for an operation: `operationId`, or `method_path`
    #[must_use]
    pub fn capability_name(op: &OperationDescriptor) -> String {
        match op.operation_id {
            Some(ref id) => format_name(id),
            None => format_name(&format!("{}_{}", op.method.to_lowercase(), op.path)),
        }
    }

    /// Build the capability for one operation; `None` when excluded.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] from schema synthesis, when an action's
    /// path placeholders do not equal its declared path parameters, or when
    /// a static resource needs arguments a read cannot supply;
    /// [`Error::TemplateDefinition`] for the same placeholder mismatch on a
    /// template.
    pub fn build(&self, op: &OperationDescriptor) -> Result<Option<Capability>> {
        let kind = self.classifier.classify(op);
        if kind == RouteKind::Exclude {
            debug!(operation = %op.id(), "Operation excluded by route map");
            return Ok(None);
        }

        let schema = self.synthesizer.synthesize(op)?;
        let name = Self::capability_name(op);
        let parameters = schema.parameters.clone();
        let handler = Arc::new(Handler::Http {
            operation: Arc::new(BoundOperation::new(Arc::new(op.clone()), schema)),
            executor: Arc::clone(&self.executor),
        });

        let capability = match kind {
            RouteKind::Action => {
                if let Some(reason) = placeholder_mismatch(op, &parameters) {
                    return Err(Error::operation(op.id(), reason));
                }
                Capability::action(name, handler)
                    .with_parameters(parameters)
                    .with_read_only(op.method == "GET")
            }
            RouteKind::StaticResource => {
                if !op.path_placeholders().is_empty()
                    || parameters.iter().any(|p| p.location == ParameterLocation::Path)
                {
                    return Err(Error::operation(
                        op.id(),
                        "a static resource cannot take path parameters",
                    ));
                }
                let unreadable: Vec<&str> = parameters
                    .iter()
                    .filter(|p| p.location != ParameterLocation::Body && p.is_mandatory())
                    .map(|p| p.name.as_str())
                    .collect();
                if !unreadable.is_empty() {
                    return Err(Error::operation(
                        op.id(),
                        format!(
                            "a static resource cannot require arguments: {}",
                            unreadable.join(", ")
                        ),
                    ));
                }
                let uri = format!("{}/{name}", self.uri_prefix);
                Capability::resource(uri, name, handler)
                    .with_parameters(non_body(parameters))
                    .with_mime_type(OPENAPI_MIME_TYPE)
            }
            RouteKind::ResourceTemplate => {
                let uri_template = self.template_uri(op, &name, &parameters)?;
                Capability::template(&uri_template, name, parameters, handler)?
                    .with_mime_type(OPENAPI_MIME_TYPE)
            }
            RouteKind::Exclude => return Ok(None),
        };

        let tags: BTreeSet<&String> = op.tags.iter().chain(self.tags.iter()).collect();
        Ok(Some(
            capability
                .with_description(op.display_description())
                .with_tags(tags.into_iter().cloned()),
        ))
    }

    fn template_uri(
        &self,
        op: &OperationDescriptor,
        name: &str,
        parameters: &[ParameterSpec],
    ) -> Result<String> {
        let placeholders = op.path_placeholders();
        let mut uri = format!("{}/{name}", self.uri_prefix);

        if let Some(reason) = placeholder_mismatch(op, parameters) {
            let mut template = uri.clone();
            for p in &placeholders {
                template.push_str(&format!("/{{{p}}}"));
            }
            return Err(Error::template(template, reason));
        }

        for p in &placeholders {
            uri.push_str(&format!("/{{{p}}}"));
        }
        Ok(uri)
    }

    /// Register every operation of `doc` into `registry`. Failures are
    /// collected per operation and never abort the rest.
    pub fn populate(&self, doc: OpenApiDocument, registry: &CapabilityRegistry) -> BuildReport {
        let mut report = BuildReport {
            errors: doc.skipped,
            ..BuildReport::default()
        };

        info!(title = %doc.title, operations = doc.operations.len(), "Building capabilities");

        for op in &doc.operations {
            let capability = match self.build(op) {
                Ok(Some(capability)) => capability,
                Ok(None) => {
                    report.excluded.push(op.id());
                    continue;
                }
                Err(e) => {
                    warn!(operation = %op.id(), error = %e, "Skipping operation");
                    report.errors.push(e);
                    continue;
                }
            };
            let key = capability.key().to_string();
            match registry.register(capability) {
                Ok(_) => report.registered.push(key),
                Err(e) => {
                    warn!(operation = %op.id(), error = %e, "Registration failed");
                    report.errors.push(e);
                }
            }
        }

        info!(
            registered = report.registered.len(),
            excluded = report.excluded.len(),
            errors = report.errors.len(),
            "Built capabilities"
        );
        report
    }
}

/// Parameters a static resource can take (no body)
/// Why the path placeholders and declared path parameters differ, if they do
fn placeholder_mismatch(op: &OperationDescriptor, parameters: &[ParameterSpec]) -> Option<String> {
    let placeholders = op.path_placeholders();
    let in_path: BTreeSet<&str> = placeholders.iter().map(String::as_str).collect();
    let declared: BTreeSet<&str> = parameters
        .iter()
        .filter(|p| p.location == ParameterLocation::Path)
        .map(|p| p.name.as_str())
        .collect();
    (declared != in_path).then(|| {
        format!("path placeholders {in_path:?} do not match declared path parameters {declared:?}")
    })
}

fn non_body(parameters: Vec<ParameterSpec>) -> Vec<ParameterSpec> {
    parameters
        .into_iter()
        .filter(|p| p.location != ParameterLocation::Body)
        .collect()
}
