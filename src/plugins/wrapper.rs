use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::Plugin;
use crate::worker::panic_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Created,
    Initializing,
    Ready,
}

#[derive(Debug)]
struct Gate {
    state: PluginState,
    failure: Option<String>,
}

/// A loaded plugin plus its one-shot readiness gate.
///
/// The gate opens exactly once, when `init()` returns, whatever the outcome.
pub struct PluginWrapper {
    id: Uuid,
    bundle: String,
    delegate: Arc<dyn Plugin>,
    gate: Mutex<Gate>,
    ready: Condvar,
}

impl PluginWrapper {
    pub fn new(bundle: impl Into<String>, delegate: Arc<dyn Plugin>) -> Self {
        Self {
            id: delegate.id(),
            bundle: bundle.into(),
            delegate,
            gate: Mutex::new(Gate {
                state: PluginState::Created,
                failure: None,
            }),
            ready: Condvar::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identity of the bundle that provided this plugin.
    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    /// The plugin instance, without waiting for readiness.
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.delegate
    }

    pub fn state(&self) -> PluginState {
        self.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == PluginState::Ready
    }

    /// Why `init()` failed, once ready. `None` for a healthy plugin.
    pub fn failure(&self) -> Option<String> {
        self.lock().failure.clone()
    }

    pub(crate) fn mark_initializing(&self) {
        let mut gate = self.lock();
        if gate.state == PluginState::Created {
            gate.state = PluginState::Initializing;
        }
    }

    /// Runs the delegate's `init()` and opens the gate.
    ///
    /// Returns the failure message when `init()` errored or panicked. Waiters
    /// are released either way.
    pub(crate) fn run_init(&self) -> Result<(), String> {
        self.mark_initializing();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.delegate.init())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(format!("init panicked: {}", panic_message(payload.as_ref()))),
        };

        let mut gate = self.lock();
        gate.state = PluginState::Ready;
        gate.failure = outcome.as_ref().err().cloned();
        drop(gate);
        self.ready.notify_all();

        outcome
    }

    /// Opens the gate with `reason` as the failure if `init()` never ran.
    pub(crate) fn abandon(&self, reason: &str) {
        let mut gate = self.lock();
        if gate.state == PluginState::Ready {
            return;
        }
        gate.state = PluginState::Ready;
        gate.failure = Some(reason.to_string());
        drop(gate);
        self.ready.notify_all();
    }

    /// Blocks until the plugin is ready.
    ///
    /// A plugin whose `init()` never returns keeps its caller blocked; use
    /// [`wait_ready_timeout`](Self::wait_ready_timeout) for a bounded wait.
    pub fn wait_ready(&self) {
        let gate = self.lock();
        let _gate = self
            .ready
            .wait_while(gate, |g| g.state != PluginState::Ready)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Blocks for at most `timeout`. Returns whether the plugin is ready.
    pub fn wait_ready_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.lock();
        while gate.state != PluginState::Ready {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            gate = self
                .ready
                .wait_timeout(gate, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A submitted `init()` call. Dropping it before it runs opens the gate
/// with a failure.
pub(crate) struct InitTask {
    wrapper: Option<Arc<PluginWrapper>>,
}

impl InitTask {
    pub(crate) fn new(wrapper: Arc<PluginWrapper>) -> Self {
        Self {
            wrapper: Some(wrapper),
        }
    }

    pub(crate) fn run(mut self) -> Result<(), String> {
        match self.wrapper.take() {
            Some(wrapper) => wrapper.run_init(),
            None => Ok(()),
        }
    }
}

impl Drop for InitTask {
    fn drop(&mut self) {
        if let Some(wrapper) = self.wrapper.take() {
            tracing::warn!(
                plugin_id = %wrapper.id(),
                bundle = %wrapper.bundle(),
                "Plugin init discarded before it ran"
            );
            wrapper.abandon("init never ran: worker pool shut down");
        }
    }
}

impl fmt::Debug for PluginWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.lock();
        f.debug_struct("PluginWrapper")
            .field("id", &self.id)
            .field("bundle", &self.bundle)
            .field("state", &gate.state)
            .field("failure", &gate.failure)
            .finish()
    }
}
