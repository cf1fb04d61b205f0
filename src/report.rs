use std::fmt;
use std::sync::Mutex;

use uuid::Uuid;

/// Failures that are reported out of band instead of being returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// One address could not be dialed and was left out of the set.
    DialFailed {
        /// The address as given.
        address: String,
        /// Why the dial failed.
        error: String,
    },
    /// Fewer upstreams connected than were requested.
    Degraded {
        /// Upstreams in the set.
        connected: usize,
        /// Addresses that were dialed.
        requested: usize,
    },
    /// A write failed on some, but not all, upstreams.
    PartialWriteFailure {
        /// Upstreams whose write failed.
        failed: usize,
        /// Upstreams in the set.
        total: usize,
        /// One message per failed upstream.
        messages: Vec<String>,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DialFailed { address, error } => {
                write!(f, "can't connect to {address}: {error}")
            }
            Diagnostic::Degraded { connected, requested } => {
                write!(f, "only {connected} of {requested} upstreams connected")
            }
            Diagnostic::PartialWriteFailure { messages, .. } => {
                write!(f, "error writing to upstreams: {}", messages.join("; "))
            }
        }
    }
}

/// Receives the diagnostics of a [`MultiConnection`](crate::MultiConnection).
///
/// `adapter` identifies the connection that produced the diagnostic.
pub trait Reporter: Send + Sync {
    /// Handles one diagnostic.
    fn report(&self, adapter: Uuid, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, adapter: Uuid, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::PartialWriteFailure { failed, total, .. } => {
                log::warn!("[{adapter}] {diagnostic} ({failed} of {total} failed)")
            }
            _ => log::error!("[{adapter}] {diagnostic}"),
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything reported so far.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }

    /// Takes everything reported so far.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        // push and take leave the Vec whole even if a holder panicked
        self.diagnostics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, _adapter: Uuid, diagnostic: &Diagnostic) {
        self.lock().push(diagnostic.clone());
    }
}
