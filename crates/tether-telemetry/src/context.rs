//! Per-load context for correlating log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one extension load or refresh.
///
/// Every log line emitted inside [`LoadContext::span`] carries the load id,
/// so interleaved concurrent loads can be told apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadContext {
    /// Unique load identifier.
    pub load_id: Uuid,
    /// Extension origin (URL or `data:` URL) being loaded.
    pub origin: String,
    /// Operation being performed (`load`, `refresh`).
    pub operation: String,
    /// When the load started.
    pub started_at: DateTime<Utc>,
}

impl LoadContext {
    /// Create a context for loading `origin`.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            load_id: Uuid::new_v4(),
            origin: origin.into(),
            operation: "load".to_string(),
            started_at: Utc::now(),
        }
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Milliseconds since the load started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        // started_at is set at creation time, so this never underflows in practice
        #[allow(clippy::arithmetic_side_effects)]
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_milliseconds()
    }

    /// Origins can be whole `data:` URLs; keep log lines readable.
    #[must_use]
    pub fn display_origin(&self) -> String {
        const MAX: usize = 80;
        if self.origin.chars().count() <= MAX {
            return self.origin.clone();
        }
        let head: String = self.origin.chars().take(MAX).collect();
        format!("{head}...")
    }

    /// Create a tracing span for this load.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "extension_load",
            load_id = %self.load_id,
            origin = %self.display_origin(),
            operation = %self.operation,
        )
    }
}

/// Guard that logs when a load completes.
pub struct LoadGuard {
    context: LoadContext,
    _span: tracing::span::EnteredSpan,
}

impl LoadGuard {
    /// Enter the context's span.
    #[must_use]
    pub fn new(context: LoadContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("load started");
        Self {
            context,
            _span: span,
        }
    }

    /// The load context.
    #[must_use]
    pub fn context(&self) -> &LoadContext {
        &self.context
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        tracing::debug!(elapsed_ms = self.context.elapsed_ms(), "load finished");
    }
}
