use async_trait::async_trait;

use super::types::{EntityDetails, NotificationMessage, TemplateInfo};
use crate::error::CollaboratorError;
use crate::state_machine::WorkflowKind;

/// Looks up the template for a `(workflow, state)` pair.
#[async_trait]
pub trait TemplateResolver: Send + Sync {
    /// `Ok(None)` when the state is not notification-worthy.
    async fn resolve(
        &self,
        workflow: WorkflowKind,
        state: &str,
    ) -> Result<Option<TemplateInfo>, CollaboratorError>;
}

/// Resolves the recipient and template variables of an entity.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn lookup(
        &self,
        entity_id: &str,
        workflow: WorkflowKind,
    ) -> Result<Option<EntityDetails>, CollaboratorError>;
}

/// Per-recipient, per-workflow notification opt-outs.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// The stored preference, `None` when the recipient never chose.
    async fn preference(
        &self,
        recipient_id: &str,
        workflow: WorkflowKind,
    ) -> Result<Option<bool>, CollaboratorError>;

    /// Unset preferences count as enabled.
    async fn is_enabled(
        &self,
        recipient_id: &str,
        workflow: WorkflowKind,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.preference(recipient_id, workflow).await?.unwrap_or(true))
    }
}

/// Best-effort outbound channel (message broker, queue, ...).
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        message: &NotificationMessage,
    ) -> Result<(), CollaboratorError>;
}
