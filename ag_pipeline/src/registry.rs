//! ABOUTME: Registry: process-wide map of live Controls, backing the add/cancel/status/list API.
//! ABOUTME: Owns the Manager spawn for `add` and the wait-for-teardown logic for `cancel`.

use crate::behavior::build_plugin;
use crate::context::PipelineContext;
use crate::control::{Control, ControlSnapshot};
use crate::manager;
use ag_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

struct Entry {
    control: Arc<Control>,
    done: Arc<Notify>,
}

/// Process-wide registry of live Controls (§4.1). Cheap to clone via
/// `Arc<Registry>`; every mutating method takes `self: &Arc<Self>` since
/// `add` needs to hand the Manager a handle back to the registry.
pub struct Registry {
    entries: Mutex<HashMap<String, Entry>>,
    ctx: Arc<PipelineContext>,
}

impl Registry {
    pub fn new(ctx: Arc<PipelineContext>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            ctx,
        })
    }

    /// Start a new pipeline for `code`. Rejects a duplicate live code and
    /// an unknown `behavior_code` before anything is spawned.
    pub fn add(
        self: &Arc<Self>,
        code: String,
        behavior_code: String,
        stream_url: String,
        push_stream: bool,
        push_stream_url: Option<String>,
    ) -> Result<()> {
        // Validate the behavior code is one of the known plug-ins before
        // doing anything else; the model path/class list used here are
        // placeholders purely for this existence check, the Manager
        // rebuilds the real plug-in with the configured model.
        build_plugin(&behavior_code, "validate", Vec::new(), 1)?;

        if push_stream && push_stream_url.is_none() {
            return Err(Error::Validation(
                "pushStreamUrl is required when pushStream is true".to_string(),
            ));
        }

        let mut entries = self.entries.lock().expect("registry mutex poisoned");
        if entries.contains_key(&code) {
            return Err(Error::Validation(format!(
                "a control with code {code} is already running"
            )));
        }

        let control = Arc::new(Control::new(
            code.clone(),
            behavior_code,
            stream_url,
            push_stream,
            push_stream_url,
        ));
        let done = Arc::new(Notify::new());
        entries.insert(
            code.clone(),
            Entry {
                control: Arc::clone(&control),
                done: Arc::clone(&done),
            },
        );
        drop(entries);

        let registry = Arc::clone(self);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(manager::run(control, ctx, registry, done));

        info!(code = %code, "control added");
        Ok(())
    }

    /// Request graceful shutdown of `code`. Returns `(true, message)` once
    /// the Manager has reclaimed the Control, or `(false, message)` if it
    /// fails to within the configured join timeout (in which case the
    /// entry is forcibly removed here).
    pub async fn cancel(self: &Arc<Self>, code: &str) -> (bool, String) {
        let (control, done) = {
            let entries = self.entries.lock().expect("registry mutex poisoned");
            match entries.get(code) {
                Some(entry) => (Arc::clone(&entry.control), Arc::clone(&entry.done)),
                None => return (false, format!("no control with code {code}")),
            }
        };

        control.stop.cancel();

        let join_timeout = Duration::from_secs(self.ctx.config.pipeline.join_timeout);
        match tokio::time::timeout(join_timeout, done.notified()).await {
            Ok(()) => (true, "control stopped".to_string()),
            Err(_) => {
                self.remove(code);
                (
                    false,
                    format!("control {code} did not stop within {}s", join_timeout.as_secs()),
                )
            }
        }
    }

    /// A point-in-time snapshot of `code`. Never errors: an unknown code
    /// gets [`ControlSnapshot::inactive`] (§4.1).
    pub fn status(&self, code: &str) -> ControlSnapshot {
        let entries = self.entries.lock().expect("registry mutex poisoned");
        match entries.get(code) {
            Some(entry) => ControlSnapshot::from_control(&entry.control),
            None => ControlSnapshot::inactive(code),
        }
    }

    /// Whether `code` is currently registered, regardless of status.
    pub fn contains(&self, code: &str) -> bool {
        self.entries
            .lock()
            .expect("registry mutex poisoned")
            .contains_key(code)
    }

    /// Snapshot every live Control.
    pub fn list(&self) -> Vec<ControlSnapshot> {
        let entries = self.entries.lock().expect("registry mutex poisoned");
        entries
            .values()
            .map(|entry| ControlSnapshot::from_control(&entry.control))
            .collect()
    }

    /// The number of Controls currently tracked, regardless of status.
    pub fn active_count(&self) -> usize {
        self.entries.lock().expect("registry mutex poisoned").len()
    }

    /// Drop `code` from the registry without touching its Control. Called
    /// by the Manager on teardown and by `cancel`'s force-cleanup path.
    pub fn remove(&self, code: &str) {
        self.entries.lock().expect("registry mutex poisoned").remove(code);
    }
}
