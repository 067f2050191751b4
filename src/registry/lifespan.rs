//! Startup/shutdown hooks, delegated through mounted children.
//!
//! Startup runs the registry's own hook first, then each mounted child's
//! (recursively, in mount order). Shutdown runs in exact reverse order.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::CapabilityRegistry;
use crate::Result;

/// Hook run around the lifetime of a registry
#[async_trait]
pub trait Lifespan: Send + Sync + 'static {
    /// Acquire resources.
    ///
    /// # Errors
    ///
    /// A failure aborts startup; hooks already started are shut down.
    async fn startup(&self) -> Result<()>;

    /// Release resources.
    ///
    /// # Errors
    ///
    /// Errors are logged; remaining hooks still run.
    async fn shutdown(&self) -> Result<()>;
}

struct Hook {
    owner: String,
    lifespan: Arc<dyn Lifespan>,
}

/// Hooks that started successfully, waiting to be shut down
#[must_use = "call `shutdown` to run teardown hooks"]
pub struct ActiveLifespan {
    started: Vec<Hook>,
    finished: bool,
}

impl ActiveLifespan {
    /// Owners of the started hooks, in startup order
    #[must_use]
    pub fn started(&self) -> Vec<&str> {
        self.started.iter().map(|h| h.owner.as_str()).collect()
    }

    /// Run every shutdown hook in reverse startup order.
    ///
    /// # Errors
    ///
    /// Returns the first shutdown error after all hooks have run.
    pub async fn shutdown(mut self) -> Result<()> {
        self.finished = true;
        let mut first_error = None;
        while let Some(hook) = self.started.pop() {
            debug!(registry = %hook.owner, "Running shutdown hook");
            if let Err(e) = hook.lifespan.shutdown().await {
                error!(registry = %hook.owner, error = %e, "Shutdown hook failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ActiveLifespan {
    fn drop(&mut self) {
        if !self.finished && !self.started.is_empty() {
            warn!(
                hooks = self.started.len(),
                "Lifespan dropped without shutdown, teardown hooks skipped"
            );
        }
    }
}

impl CapabilityRegistry {
    /// Hooks of this registry and its mounted children, in startup order
    fn collect_hooks(&self, seen: &mut HashSet<*const CapabilityRegistry>, out: &mut Vec<Hook>) {
        if !seen.insert(std::ptr::from_ref(self)) {
            return;
        }
        if let Some(ref lifespan) = self.lifespan {
            out.push(Hook {
                owner: self.name.clone(),
                lifespan: Arc::clone(lifespan),
            });
        }
        for record in self.mounts() {
            record.child.collect_hooks(seen, out);
        }
    }

    /// Run startup hooks: this registry's, then each child's in mount
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the failing hook's error after shutting down every hook that
    /// had already started.
    pub async fn start(&self) -> Result<ActiveLifespan> {
        let mut hooks = Vec::new();
        self.collect_hooks(&mut HashSet::new(), &mut hooks);

        let mut active = ActiveLifespan {
            started: Vec::with_capacity(hooks.len()),
            finished: false,
        };
        for hook in hooks {
            debug!(registry = %hook.owner, "Running startup hook");
            if let Err(e) = hook.lifespan.startup().await {
                error!(registry = %hook.owner, error = %e, "Startup hook failed");
                if let Err(unwind) = active.shutdown().await {
                    warn!(error = %unwind, "Shutdown after failed startup also failed");
                }
                return Err(e);
            }
            active.started.push(hook);
        }

        info!(registry = %self.name, hooks = active.started.len(), "Lifespan started");
        Ok(active)
    }

    /// Run `body` between startup and shutdown. Shutdown always runs once
    /// startup succeeded, even if `body` fails.
    ///
    /// # Errors
    ///
    /// The startup error, else the body's error, else the first shutdown
    /// error.
    pub async fn run<F, T>(&self, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let active = self.start().await?;
        let outcome = body.await;
        let teardown = active.shutdown().await;
        let value = outcome?;
        teardown?;
        Ok(value)
    }
}
