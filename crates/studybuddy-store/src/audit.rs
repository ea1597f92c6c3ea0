//! Audit sink decorator that mirrors entries into the log.

use std::sync::Arc;

use async_trait::async_trait;

use studybuddy_core::model::AuditLogEntry;
use studybuddy_core::traits::AuditSink;

/// Logs each entry under the `studybuddy::audit` target, then forwards it.
pub struct TracingAuditSink {
    inner: Arc<dyn AuditSink>,
}

impl TracingAuditSink {
    pub fn new(inner: Arc<dyn AuditSink>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditLogEntry) -> anyhow::Result<()> {
        tracing::info!(
            target: "studybuddy::audit",
            id = %entry.id,
            user = %entry.user_id,
            feature = %entry.feature,
            prompt_len = entry.prompt.len(),
            "generation call"
        );
        self.inner.record(entry).await
    }
}
