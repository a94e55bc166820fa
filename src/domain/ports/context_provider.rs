use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::ContextFlags;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context lookup unavailable: {0}")]
    Unavailable(String),

    #[error("Context lookup timed out after {0}ms")]
    Timeout(u64),
}

/// Port for business-context lookups (VIP status, escalation history).
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn lookup(
        &self,
        business_context: &str,
        contact: Option<&str>,
    ) -> Result<ContextFlags, ContextError>;

    /// Record that an escalation was opened for a contact.
    async fn record_escalation(&self, _contact: &str) {}
}
