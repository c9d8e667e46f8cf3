//! Isolated execution of extension source.
//!
//! The loader does not run code itself. It hands an [`InjectedScript`] to a
//! [`ScriptHost`], which evaluates the wrapped source in a fresh context
//! whose container exposes the capability surface. The script either calls
//! `register` on that surface or reports a failure through its
//! [`ScriptReporter`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tether_capabilities::CapabilitySurface;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Identifies an injected script so the host can remove its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InjectionHandle(pub Uuid);

impl InjectionHandle {
    /// A fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InjectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InjectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a load attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// An extension registered with this id.
    Registered(String),
    /// The script or the registration failed.
    Failed(String),
}

/// One-shot completion signal shared by the register hook and the reporter.
/// Only the first outcome is delivered.
#[derive(Clone)]
pub(crate) struct LoadSignal {
    sender: Arc<Mutex<Option<oneshot::Sender<LoadOutcome>>>>,
}

impl LoadSignal {
    pub(crate) fn new() -> (Self, oneshot::Receiver<LoadOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    pub(crate) fn send(&self, outcome: LoadOutcome) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(outcome);
        }
    }
}

/// Lets the script host report a failure before `register` is called.
#[derive(Clone)]
pub struct ScriptReporter {
    signal: LoadSignal,
}

impl ScriptReporter {
    pub(crate) fn new(signal: LoadSignal) -> Self {
        Self { signal }
    }

    /// Fail the load. Ignored once the load has completed.
    pub fn fail(&self, message: impl Into<String>) {
        self.signal.send(LoadOutcome::Failed(message.into()));
    }
}

impl fmt::Debug for ScriptReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptReporter").finish_non_exhaustive()
    }
}

/// Everything a script host needs to run one load.
#[derive(Debug)]
pub struct InjectedScript {
    /// Id of the container element exposing the surface.
    pub container_id: String,
    /// Wrapped source (see [`wrap_source`]).
    pub source: String,
    /// Load origin.
    pub origin: String,
    /// Surface the script sees as `Scratch`.
    pub surface: Arc<CapabilitySurface>,
    /// Failure channel.
    pub reporter: ScriptReporter,
}

/// Evaluates extension source in an isolated context.
pub trait ScriptHost: Send + Sync {
    /// Start evaluating `script`.
    ///
    /// # Errors
    ///
    /// Returns an error if the context cannot be created.
    fn inject(&self, script: InjectedScript) -> anyhow::Result<InjectionHandle>;

    /// Remove the context created for `handle`.
    fn dispose(&self, handle: InjectionHandle);
}

/// Wrap extension code so it binds the surface from its container and
/// reports `origin` as its source location.
#[must_use]
pub fn wrap_source(code: &str, container_id: &str, origin: &str) -> String {
    format!(
        "// Generated by tether {version}\n\
         let Scratch = document.getElementById('{container_id}')?.Scratch;\n\
         {code}\n\
         //# sourceURL={origin}\n",
        version = env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_source() {
        let wrapped = wrap_source("register();", "tether-extension", "https://x/ext.js");
        let lines: Vec<&str> = wrapped.lines().collect();
        assert!(lines[0].starts_with("// Generated by tether"));
        assert_eq!(
            lines[1],
            "let Scratch = document.getElementById('tether-extension')?.Scratch;"
        );
        assert_eq!(lines[2], "register();");
        assert_eq!(lines[3], "//# sourceURL=https://x/ext.js");
    }

    #[tokio::test]
    async fn test_only_first_outcome_is_delivered() {
        let (signal, rx) = LoadSignal::new();
        let reporter = ScriptReporter::new(signal.clone());
        signal.send(LoadOutcome::Registered("a".to_owned()));
        reporter.fail("late");
        assert_eq!(rx.await.unwrap(), LoadOutcome::Registered("a".to_owned()));
    }
}
