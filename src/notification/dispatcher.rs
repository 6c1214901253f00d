use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::collaborators::{EntityLookup, MessageChannel, PreferenceStore, TemplateResolver};
use super::types::{NotificationMessage, Recipient, TemplateInfo};
use crate::config::{DEFAULT_ROUTING_KEY, DEFAULT_TOPIC};
use crate::error::CollaboratorError;
use crate::events::TransitionEvent;

/// What happened to one dispatch attempt.
///
/// Everything except [`Sent`](DispatchOutcome::Sent) is a silent no-op from
/// the caller's point of view; none of them is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    NoTemplate,
    RecipientNotFound,
    MissingAddress,
    Disabled,
    /// A collaborator or the channel failed; logged and swallowed.
    Failed(String),
}

impl DispatchOutcome {
    /// Only failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchOutcome::Failed(_))
    }
}

/// Topic and routing key used when handing messages to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    pub topic: String,
    pub routing_key: String,
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            routing_key: DEFAULT_ROUTING_KEY.to_string(),
        }
    }
}

/// Turns committed transitions into citizen-facing messages.
///
/// Holds no per-call state; concurrent dispatches are limited only by the
/// collaborators it was built with.
pub struct NotificationDispatcher {
    templates: Arc<dyn TemplateResolver>,
    entities: Arc<dyn EntityLookup>,
    preferences: Arc<dyn PreferenceStore>,
    channel: Arc<dyn MessageChannel>,
    routing: Routing,
}

impl NotificationDispatcher {
    pub fn new(
        templates: Arc<dyn TemplateResolver>,
        entities: Arc<dyn EntityLookup>,
        preferences: Arc<dyn PreferenceStore>,
        channel: Arc<dyn MessageChannel>,
    ) -> Self {
        Self {
            templates,
            entities,
            preferences,
            channel,
            routing: Routing::default(),
        }
    }

    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    /// Runs the dispatch protocol for one event. Never fails and never panics
    /// into the caller: collaborator errors and panics become
    /// [`DispatchOutcome::Failed`].
    pub async fn dispatch(&self, event: &TransitionEvent) -> DispatchOutcome {
        match AssertUnwindSafe(self.try_dispatch(event)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                error!(
                    workflow = %event.workflow(),
                    entity_id = event.entity_id(),
                    error = %err,
                    "notification dispatch failed"
                );
                DispatchOutcome::Failed(err.to_string())
            }
            Err(_) => {
                error!(
                    workflow = %event.workflow(),
                    entity_id = event.entity_id(),
                    "notification dispatch panicked"
                );
                DispatchOutcome::Failed("dispatch panicked".to_string())
            }
        }
    }

    async fn try_dispatch(
        &self,
        event: &TransitionEvent,
    ) -> Result<DispatchOutcome, CollaboratorError> {
        let workflow = event.workflow();

        let Some(template) = self.templates.resolve(workflow, event.new_state()).await? else {
            debug!(%workflow, state = event.new_state(), "no template, nothing to notify");
            return Ok(DispatchOutcome::NoTemplate);
        };

        let details = self.entities.lookup(event.entity_id(), workflow).await?;
        let Some((recipient, variables)) =
            details.and_then(|d| d.recipient.map(|r| (r, d.variables)))
        else {
            warn!(
                %workflow,
                entity_id = event.entity_id(),
                "recipient not found, notification skipped"
            );
            return Ok(DispatchOutcome::RecipientNotFound);
        };

        let Some(to_address) = recipient.address() else {
            warn!(
                %workflow,
                entity_id = event.entity_id(),
                recipient_id = %recipient.id,
                "recipient has no destination address"
            );
            return Ok(DispatchOutcome::MissingAddress);
        };

        if !self.preferences.is_enabled(&recipient.id, workflow).await? {
            info!(
                %workflow,
                recipient_id = %recipient.id,
                "notifications disabled by recipient"
            );
            return Ok(DispatchOutcome::Disabled);
        }

        let message = build_message(event, &template, &recipient, to_address, variables);
        if let Err(err) = self
            .channel
            .publish(&self.routing.topic, &self.routing.routing_key, &message)
            .await
        {
            error!(
                %workflow,
                entity_id = event.entity_id(),
                topic = %self.routing.topic,
                error = %err,
                "failed to publish notification"
            );
            return Ok(DispatchOutcome::Failed(err.to_string()));
        }

        info!(
            %workflow,
            entity_id = event.entity_id(),
            template_id = %message.template_id,
            recipient_id = %message.recipient_id,
            "notification published"
        );
        Ok(DispatchOutcome::Sent)
    }
}

fn build_message(
    event: &TransitionEvent,
    template: &TemplateInfo,
    recipient: &Recipient,
    to_address: &str,
    variables: BTreeMap<String, String>,
) -> NotificationMessage {
    NotificationMessage {
        recipient_id: recipient.id.clone(),
        to_address: to_address.to_string(),
        subject: template.subject.clone(),
        template_id: template.template_id.clone(),
        variables: merge_variables(variables, recipient, event),
        workflow_name: event.workflow(),
        entity_id: event.entity_id().to_string(),
    }
}

/// Lookup variables first, then the transition's own keys on top.
fn merge_variables(
    mut variables: BTreeMap<String, String>,
    recipient: &Recipient,
    event: &TransitionEvent,
) -> BTreeMap<String, String> {
    if let Some(previous) = event.previous_state() {
        variables.insert("previousState".into(), previous.to_string());
    }
    variables.insert("displayName".into(), recipient.display_name.clone());
    variables.insert("newState".into(), event.new_state().to_string());
    if let Some(comment) = event.comment() {
        variables.insert("comment".into(), comment.to_string());
    }
    variables
}
