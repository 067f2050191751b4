//! Namespaced composition of registries.
//!
//! # Behaviour
//!
//! Mounting child registry `weather` under prefix `wx` copies every child
//! entry into the parent under a rewritten key, sharing the handler:
//!
//! | Namespace | Child key | Parent key (default separators) |
//! |-----------|-----------|---------------------------------|
//! | tool | `forecast` | `wx_forecast` |
//! | prompt | `brief` | `wx_brief` |
//! | resource | `weather://today` | `wx+weather://today` |
//! | template | `weather://{city}` | `wx+weather://{city}` |
//!
//! The rewritten entries are a snapshot: capabilities added to the child
//! later are not visible until it is mounted again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{CapabilityRegistry, DuplicatePolicies, Registration, RegistryState};
use crate::capability::{Capability, CapabilityKind};
use crate::{Error, Result};

/// Separators used when rewriting child keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// Between prefix and tool name
    pub tool_separator: String,
    /// Between prefix and resource URI / template
    pub resource_separator: String,
    /// Between prefix and prompt name
    pub prompt_separator: String,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            tool_separator: "_".to_string(),
            resource_separator: "+".to_string(),
            prompt_separator: "_".to_string(),
        }
    }
}

/// A mounted child, kept for lifecycle delegation
#[derive(Debug, Clone)]
pub struct MountRecord {
    /// Prefix the child was mounted under
    pub prefix: String,
    /// The child registry (shared, not owned exclusively)
    pub child: Arc<CapabilityRegistry>,
    /// Separators used for this mount
    pub options: MountOptions,
}

/// Counts produced by one mount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountSummary {
    /// New keys added to the parent
    pub inserted: usize,
    /// Existing parent keys replaced
    pub replaced: usize,
    /// Child entries discarded by the `ignore` policy
    pub ignored: usize,
}

/// Rewrites child keys under a prefix and merges them into a parent state
#[derive(Debug, Clone)]
pub struct CompositionMounter {
    prefix: String,
    options: MountOptions,
}

impl CompositionMounter {
    /// New mounter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty prefix.
    pub fn new(prefix: impl Into<String>, options: MountOptions) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(Error::Config("Mount prefix must not be empty".to_string()));
        }
        Ok(Self { prefix, options })
    }

    /// Rewritten key for a capability of the given kind
    #[must_use]
    pub fn rewrite_key(&self, kind: CapabilityKind, key: &str) -> String {
        let separator = match kind {
            CapabilityKind::Action => &self.options.tool_separator,
            CapabilityKind::Prompt => &self.options.prompt_separator,
            CapabilityKind::StaticResource | CapabilityKind::ResourceTemplate => {
                &self.options.resource_separator
            }
        };
        format!("{}{separator}{key}", self.prefix)
    }

    /// Rewritten copies of every child entry, sharing handlers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateDefinition`] if a rewritten template fails
    /// to compile.
    pub fn rewrite(&self, child: &RegistryState) -> Result<Vec<Capability>> {
        child
            .all()
            .map(|cap| cap.rekeyed(self.rewrite_key(cap.kind(), cap.key())))
            .collect()
    }

    /// Merge rewritten entries into `parent` under its duplicate policies.
    ///
    /// A collision under the `error` policy fails the whole merge with
    /// [`Error::MountCollision`]; the caller discards the partial state.
    pub fn merge(
        &self,
        parent: &mut RegistryState,
        entries: Vec<Capability>,
        policies: &DuplicatePolicies,
    ) -> Result<MountSummary> {
        let mut summary = MountSummary::default();
        for cap in entries {
            let key = cap.key().to_string();
            match parent.insert(Arc::new(cap), policies) {
                Ok(Registration::Inserted) => summary.inserted += 1,
                Ok(Registration::Replaced) => summary.replaced += 1,
                Ok(Registration::Ignored) => summary.ignored += 1,
                Err(Error::RegistrationConflict { .. }) => {
                    return Err(Error::MountCollision {
                        prefix: self.prefix.clone(),
                        key,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }
}

impl CapabilityRegistry {
    /// Mount `child` under `prefix`.
    ///
    /// The merge is atomic: concurrent readers see the parent either
    /// without or with all of the child's entries. The child's lifespan
    /// is run nested inside this registry's.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an empty prefix or a self-mount;
    /// [`Error::MountCollision`] when a rewritten key collides under the
    /// `error` policy (the parent is left unchanged).
    pub fn mount(
        &self,
        prefix: &str,
        child: Arc<CapabilityRegistry>,
        options: MountOptions,
    ) -> Result<MountSummary> {
        if std::ptr::eq(self, Arc::as_ptr(&child)) {
            return Err(Error::Config(format!(
                "Registry '{}' cannot be mounted into itself",
                self.name
            )));
        }

        let mounter = CompositionMounter::new(prefix, options.clone())?;
        let entries = mounter.rewrite(&child.snapshot())?;
        let summary = self.update(|state| mounter.merge(state, entries, &self.policies))?;

        {
            let mut mounts = self.mounts.write();
            let already = mounts
                .iter()
                .any(|m| m.prefix == prefix && Arc::ptr_eq(&m.child, &child));
            if !already {
                mounts.push(MountRecord {
                    prefix: prefix.to_string(),
                    child: Arc::clone(&child),
                    options,
                });
            }
        }

        info!(
            parent = %self.name,
            child = %child.name(),
            prefix = %prefix,
            inserted = summary.inserted,
            replaced = summary.replaced,
            ignored = summary.ignored,
            "Mounted registry"
        );
        Ok(summary)
    }

    /// Mount with this registry's separators: `_`, `+`, `_` unless set by
    /// [`Self::with_mount_options`] or the `mount` config section.
    ///
    /// # Errors
    ///
    /// See [`Self::mount`].
    pub fn mount_default(&self, prefix: &str, child: Arc<CapabilityRegistry>) -> Result<MountSummary> {
        self.mount(prefix, child, self.mount_options.clone())
    }

    /// Mounted children in mount order
    #[must_use]
    pub fn mounts(&self) -> Vec<MountRecord> {
        self.mounts.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Handler, ParameterSpec, SemanticType};
    use crate::registry::DuplicatePolicy;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn weather() -> Arc<CapabilityRegistry> {
        let child = CapabilityRegistry::new("weather");
        child
            .register(Capability::action(
                "forecast",
                Handler::local(|args| async move { Ok(json!({"forecast": "sun", "args": args})) }),
            ))
            .unwrap();
        child
            .register(Capability::resource(
                "weather://today",
                "today",
                Handler::local(|_| async { Ok(json!("sunny")) }),
            ))
            .unwrap();
        child
            .register(
                Capability::template(
                    "weather://{city}/temp",
                    "temp",
                    vec![ParameterSpec::new("city", SemanticType::String).required()],
                    Handler::local(|args| async move { Ok(args["city"].clone()) }),
                )
                .unwrap(),
            )
            .unwrap();
        child
            .register(Capability::prompt(
                "brief",
                Handler::local(|_| async { Ok(json!("Give a brief")) }),
            ))
            .unwrap();
        Arc::new(child)
    }

    #[test]
    fn rewrite_key_uses_per_namespace_separators() {
        let mounter = CompositionMounter::new(
            "wx",
            MountOptions {
                tool_separator: "-".into(),
                resource_separator: "/".into(),
                prompt_separator: ".".into(),
            },
        )
        .unwrap();
        assert_eq!(mounter.rewrite_key(CapabilityKind::Action, "forecast"), "wx-forecast");
        assert_eq!(mounter.rewrite_key(CapabilityKind::Prompt, "brief"), "wx.brief");
        assert_eq!(
            mounter.rewrite_key(CapabilityKind::StaticResource, "weather://today"),
            "wx/weather://today"
        );
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(CompositionMounter::new("", MountOptions::default()).is_err());
    }

    #[tokio::test]
    async fn mount_rewrites_every_namespace() {
        // GIVEN: a child with one entry per namespace
        let parent = CapabilityRegistry::new("main");
        let child = weather();

        // WHEN: mounting under "wx"
        let summary = parent.mount_default("wx", Arc::clone(&child)).unwrap();

        // THEN: all four entries present under rewritten keys
        assert_eq!(summary.inserted, 4);
        assert!(parent.get_tool("wx_forecast").is_some());
        assert!(parent.get_prompt("wx_brief").is_some());
        assert!(parent.get_resource("wx+weather://today").is_some());
        assert!(parent.get_template("wx+weather://{city}/temp").is_some());

        let temp = parent.read_resource("wx+weather://paris/temp").await.unwrap();
        assert_eq!(temp.as_text(), Some("paris"));
        let today = parent.read_resource("wx+weather://today").await.unwrap();
        assert_eq!(today.as_text(), Some("sunny"));
    }

    #[tokio::test]
    async fn mounted_entries_share_handlers_and_behaviour() {
        let parent = CapabilityRegistry::new("main");
        let child = weather();
        parent.mount_default("wx", Arc::clone(&child)).unwrap();

        let direct = child.get_tool("forecast").unwrap();
        let mounted = parent.get_tool("wx_forecast").unwrap();
        assert!(Arc::ptr_eq(direct.handler(), mounted.handler()));

        let a = child.invoke_tool("forecast", json!({"d": 1})).await.unwrap();
        let b = parent.invoke_tool("wx_forecast", json!({"d": 1})).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn same_child_under_two_prefixes_is_independent() {
        let parent = CapabilityRegistry::new("main").with_policy(DuplicatePolicy::Error);
        let child = weather();
        parent.mount_default("a", Arc::clone(&child)).unwrap();
        parent.mount_default("b", Arc::clone(&child)).unwrap();

        assert_eq!(parent.list_tools().len(), 2);
        let a = parent.invoke_tool("a_forecast", Value::Null).await.unwrap();
        let b = parent.invoke_tool("b_forecast", Value::Null).await.unwrap();
        assert_eq!(a, b);
        // child itself is untouched and still usable
        assert_eq!(child.len(), 4);
    }

    #[test]
    fn remounting_same_prefix_follows_error_policy_atomically() {
        let parent = CapabilityRegistry::new("main").with_policy(DuplicatePolicy::Error);
        let child = weather();
        parent.mount_default("wx", Arc::clone(&child)).unwrap();
        let before = parent.snapshot();

        let err = parent.mount_default("wx", Arc::clone(&child)).unwrap_err();

        assert!(matches!(err, Error::MountCollision { ref prefix, .. } if prefix == "wx"));
        assert!(Arc::ptr_eq(&before, &parent.snapshot()));
        assert_eq!(parent.mounts().len(), 1);
    }

    #[test]
    fn remounting_same_prefix_replaces_under_warn_policy() {
        let parent = CapabilityRegistry::new("main");
        let child = weather();
        parent.mount_default("wx", Arc::clone(&child)).unwrap();
        let summary = parent.mount_default("wx", Arc::clone(&child)).unwrap();
        assert_eq!(summary.replaced, 4);
        assert_eq!(parent.len(), 4);
    }

    #[test]
    fn remount_picks_up_new_child_entries() {
        let parent = CapabilityRegistry::new("main");
        let child = weather();
        parent.mount_default("wx", Arc::clone(&child)).unwrap();
        child
            .register(Capability::action(
                "alerts",
                Handler::local(|_| async { Ok(json!([])) }),
            ))
            .unwrap();
        assert!(parent.get_tool("wx_alerts").is_none());

        parent.mount_default("wx", Arc::clone(&child)).unwrap();
        assert!(parent.get_tool("wx_alerts").is_some());
    }

    #[test]
    fn self_mount_is_rejected() {
        let registry = Arc::new(CapabilityRegistry::new("loop"));
        assert!(registry.mount_default("me", Arc::clone(&registry)).is_err());
    }

    #[tokio::test]
    async fn configured_separators_drive_mount_default() {
        // GIVEN: a parent built from config with custom mount separators
        let mut config = crate::config::Config::default();
        config.registry.name = "main".into();
        config.mount.tool_separator = "__".into();
        config.mount.resource_separator = "/".into();
        let parent = CapabilityRegistry::from_config(&config);

        // WHEN
        parent.mount_default("wx", weather()).unwrap();

        // THEN
        assert_eq!(parent.name(), "main");
        assert!(parent.get_tool("wx__forecast").is_some());
        assert!(parent.get_prompt("wx_brief").is_some());
        let contents = parent.read_resource("wx/weather://oslo/temp").await.unwrap();
        assert_eq!(contents.as_text(), Some("oslo"));
        assert_eq!(parent.mounts()[0].options.tool_separator, "__");
    }
}
