//! Post-commit event hooks.
//!
//! The write path fires these after the metadata commit: notification
//! dispatch, replication enqueue, lambda triggers, search-index updates.
//! Hooks run asynchronously and never block or fail the response; errors
//! are logged and swallowed.

use std::sync::Arc;
use tracing::debug;

/// What happened to an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectEvent {
    Created {
        bucket: String,
        key: String,
        version_id: Option<String>,
        size: u64,
    },
    Removed {
        bucket: String,
        key: String,
        version_id: Option<String>,
        delete_marker: bool,
    },
}

impl ObjectEvent {
    #[must_use]
    pub fn bucket(&self) -> &str {
        match self {
            ObjectEvent::Created { bucket, .. } | ObjectEvent::Removed { bucket, .. } => bucket,
        }
    }
}

type Hook = Arc<dyn Fn(ObjectEvent) + Send + Sync>;

/// Registered event callbacks.
#[derive(Clone, Default)]
pub struct EventHooks {
    hooks: Vec<Hook>,
}

impl EventHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl Fn(ObjectEvent) + Send + Sync + 'static) {
        self.hooks.push(Arc::new(hook));
    }

    /// Fire-and-forget: each hook runs on its own task.
    pub fn fire(&self, event: ObjectEvent) {
        debug!(bucket = event.bucket(), "dispatching object event");
        for hook in &self.hooks {
            let hook = hook.clone();
            let event = event.clone();
            tokio::spawn(async move {
                // Hooks are plain closures; a panic here must not take the
                // worker down with it.
                if let Err(e) = tokio::task::spawn_blocking(move || hook(event)).await {
                    tracing::warn!(error = %e, "event hook panicked");
                }
            });
        }
    }
}

impl std::fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHooks")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_hooks_fire() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut hooks = EventHooks::new();
        let c = counter.clone();
        hooks.register(move |_event| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hooks.fire(ObjectEvent::Created {
            bucket: "b".into(),
            key: "k".into(),
            version_id: None,
            size: 1,
        });

        // Hooks are async; give them a beat.
        for _ in 0..50 {
            if counter.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("hook did not fire");
    }
}
