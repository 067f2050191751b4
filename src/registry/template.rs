//! URI templates and resolution of concrete URIs against them.
//!
//! A template is a URI with `{name}` placeholders, where a name is word
//! characters, `-` and `.` (as `OpenAPI` path parameters allow). Each
//! placeholder matches one or more characters other than `/`, and the whole
//! URI must match.
//! Resolution checks exact static resources first, then templates in
//! registration order; the first template that matches wins.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use super::Namespace;
use crate::capability::{Arguments, Capability};
use crate::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([\w.-]+)\}").expect("placeholder pattern is valid"));

/// A compiled URI template
#[derive(Clone)]
pub struct UriTemplate {
    source: String,
    placeholders: Vec<String>,
    pattern: Regex,
}

impl UriTemplate {
    /// Compile a template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateDefinition`] if the template has no
    /// placeholders or repeats one.
    pub fn parse(template: &str) -> Result<Self> {
        let mut placeholders: Vec<String> = Vec::new();
        let mut pattern = String::from("^");
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = name.as_str().to_string();
            if placeholders.contains(&name) {
                return Err(Error::template(
                    template,
                    format!("placeholder '{name}' appears more than once"),
                ));
            }
            pattern.push_str(&regex::escape(&template[last..whole.start()]));
            pattern.push_str("([^/]+)");
            placeholders.push(name);
            last = whole.end();
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push('$');

        if placeholders.is_empty() {
            return Err(Error::template(
                template,
                "URI template must contain at least one parameter",
            ));
        }

        let pattern =
            Regex::new(&pattern).map_err(|e| Error::template(template, e.to_string()))?;

        Ok(Self {
            source: template.to_string(),
            placeholders,
            pattern,
        })
    }

    /// Returns `true` if the string contains at least one `{placeholder}`
    #[must_use]
    pub fn is_template(uri: &str) -> bool {
        PLACEHOLDER.is_match(uri)
    }

    /// The original template text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in template order
    #[must_use]
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Match a concrete URI, returning raw placeholder values in order
    #[must_use]
    pub fn matches(&self, uri: &str) -> Option<Vec<(String, String)>> {
        let caps = self.pattern.captures(uri)?;
        self.placeholders
            .iter()
            .enumerate()
            .map(|(i, name)| {
                caps.get(i + 1)
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect()
    }
}

impl fmt::Debug for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UriTemplate").field(&self.source).finish()
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A resolved resource read
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Matched capability
    pub capability: Arc<Capability>,
    /// Coerced placeholder values plus declared defaults
    pub arguments: Arguments,
}

/// Resolves concrete URIs against one registry snapshot
pub struct TemplateResolver<'a> {
    resources: &'a Namespace,
    templates: &'a Namespace,
}

impl<'a> TemplateResolver<'a> {
    pub(crate) fn new(resources: &'a Namespace, templates: &'a Namespace) -> Self {
        Self {
            resources,
            templates,
        }
    }

    /// Find the capability serving `uri`.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceNotFound`] when nothing matches;
    /// [`Error::Coercion`] when a template matches but a placeholder value
    /// does not convert to its declared type.
    pub fn resolve(&self, uri: &str) -> Result<Resolution> {
        if let Some(capability) = self.resources.get(uri) {
            return Ok(Resolution {
                capability: Arc::clone(capability),
                arguments: Arguments::new(),
            });
        }

        for capability in self.templates.iter() {
            let Some(template) = capability.uri_template() else {
                continue;
            };
            if let Some(raw) = template.matches(uri) {
                debug!(uri = %uri, template = %template, "Matched resource template");
                let arguments = coerce_arguments(capability, raw)?;
                return Ok(Resolution {
                    capability: Arc::clone(capability),
                    arguments,
                });
            }
        }

        Err(Error::ResourceNotFound(uri.to_string()))
    }
}

/// Convert raw placeholder values to declared types and add defaults
fn coerce_arguments(capability: &Capability, raw: Vec<(String, String)>) -> Result<Arguments> {
    let mut arguments = Arguments::new();

    for (name, value) in raw {
        let coerced = match capability.parameters().iter().find(|p| p.name == name) {
            Some(param) => param.semantic_type.coerce(&name, &value)?,
            None => serde_json::Value::String(value),
        };
        arguments.insert(name, coerced);
    }

    for param in capability.parameters() {
        if arguments.contains_key(&param.name) {
            continue;
        }
        if let Some(ref default) = param.default {
            arguments.insert(param.name.clone(), default.clone());
        }
    }

    Ok(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Handler, ParameterSpec, SemanticType};
    use serde_json::{Value, json};

    fn echo() -> Handler {
        Handler::local(|args| async move { Ok(Value::Object(args)) })
    }

    fn string_param(name: &str) -> ParameterSpec {
        ParameterSpec::new(name, SemanticType::String).required()
    }

    fn namespace_of(caps: Vec<Capability>) -> Namespace {
        let mut ns = Namespace::default();
        for cap in caps {
            ns.push(Arc::new(cap));
        }
        ns
    }

    #[test]
    fn parse_extracts_placeholders_in_order() {
        let t = UriTemplate::parse("test://{key}/{value}").unwrap();
        assert_eq!(t.placeholders(), ["key", "value"]);
    }

    #[test]
    fn template_matches_and_rejects() {
        let t = UriTemplate::parse("test://{key}/{value}").unwrap();
        assert_eq!(
            t.matches("test://foo/123").unwrap(),
            vec![
                ("key".to_string(), "foo".to_string()),
                ("value".to_string(), "123".to_string())
            ]
        );
        assert!(t.matches("test://foo").is_none());
        assert!(t.matches("other://foo/123").is_none());
        assert!(t.matches("test://foo/123/extra").is_none());
    }

    #[test]
    fn placeholder_names_may_contain_dash_and_dot() {
        let t = UriTemplate::parse("resource://openapi/getPet/{pet-id}/{user.id}").unwrap();
        assert_eq!(t.placeholders(), ["pet-id", "user.id"]);
        assert_eq!(
            t.matches("resource://openapi/getPet/7/ann").unwrap(),
            vec![
                ("pet-id".to_string(), "7".to_string()),
                ("user.id".to_string(), "ann".to_string())
            ]
        );
    }

    #[test]
    fn literal_parts_are_escaped() {
        let t = UriTemplate::parse("api+data://items.{id}?").unwrap();
        assert!(t.matches("api+data://items.7?").is_some());
        assert!(t.matches("apiidata://itemsx7").is_none());
    }

    #[test]
    fn rejects_templates_without_placeholders_or_with_repeats() {
        assert!(UriTemplate::parse("data://config").is_err());
        assert!(UriTemplate::parse("x://{a}/{a}").is_err());
    }

    #[test]
    fn static_resource_wins_before_templates() {
        let resources = namespace_of(vec![Capability::resource("users://me", "me", echo())]);
        let templates = namespace_of(vec![
            Capability::template("users://{id}", "user", vec![string_param("id")], echo())
                .unwrap(),
        ]);
        let resolver = TemplateResolver::new(&resources, &templates);

        let res = resolver.resolve("users://me").unwrap();
        assert_eq!(res.capability.key(), "users://me");
        assert!(res.arguments.is_empty());

        let res = resolver.resolve("users://42").unwrap();
        assert_eq!(res.arguments["id"], json!("42"));
    }

    #[test]
    fn overlapping_templates_match_by_pattern() {
        let resources = Namespace::default();
        let templates = namespace_of(vec![
            Capability::template("users://email/{email}", "by_email", vec![string_param("email")], echo())
                .unwrap(),
            Capability::template("users://name/{name}", "by_name", vec![string_param("name")], echo())
                .unwrap(),
        ]);
        let resolver = TemplateResolver::new(&resources, &templates);

        let res = resolver.resolve("users://email/a@example.com").unwrap();
        assert_eq!(res.capability.name(), "by_email");
        assert_eq!(res.arguments["email"], json!("a@example.com"));

        let res = resolver.resolve("users://name/ada").unwrap();
        assert_eq!(res.capability.name(), "by_name");
    }

    #[test]
    fn first_registered_template_wins_when_both_match() {
        let resources = Namespace::default();
        let templates = namespace_of(vec![
            Capability::template("items://{id}", "generic", vec![string_param("id")], echo())
                .unwrap(),
            Capability::template("items://{slug}", "slug", vec![string_param("slug")], echo())
                .unwrap(),
        ]);
        let resolver = TemplateResolver::new(&resources, &templates);
        assert_eq!(resolver.resolve("items://x").unwrap().capability.name(), "generic");
    }

    #[test]
    fn coerces_and_fills_defaults() {
        let resources = Namespace::default();
        let templates = namespace_of(vec![
            Capability::template(
                "pets://{petId}",
                "pet",
                vec![
                    ParameterSpec::new("petId", SemanticType::Integer).required(),
                    ParameterSpec::new("verbose", SemanticType::Boolean).with_default(json!(false)),
                ],
                echo(),
            )
            .unwrap(),
        ]);
        let resolver = TemplateResolver::new(&resources, &templates);

        let res = resolver.resolve("pets://42").unwrap();
        assert_eq!(res.arguments["petId"], json!(42));
        assert_eq!(res.arguments["verbose"], json!(false));
    }

    #[test]
    fn coercion_failure_is_not_not_found() {
        let resources = Namespace::default();
        let templates = namespace_of(vec![
            Capability::template(
                "pets://{petId}",
                "pet",
                vec![ParameterSpec::new("petId", SemanticType::Integer).required()],
                echo(),
            )
            .unwrap(),
        ]);
        let resolver = TemplateResolver::new(&resources, &templates);

        let err = resolver.resolve("pets://abc").unwrap_err();
        assert!(matches!(
            err,
            Error::Coercion { ref parameter, ref value, .. } if parameter == "petId" && value == "abc"
        ));

        let err = resolver.resolve("cats://1").unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(_)));
    }
}
