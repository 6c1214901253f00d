//! Shared fixtures for the notification and event tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::collaborators::MessageChannel;
use super::dispatcher::NotificationDispatcher;
use super::memory::{CollectingChannel, EntityDirectory, PreferenceMap, TemplateRegistry};
use super::types::{EntityDetails, NotificationMessage, Recipient, TemplateInfo};
use crate::error::CollaboratorError;
use crate::state_machine::WorkflowKind;

pub(crate) fn recipient(address: &str) -> Recipient {
    Recipient::new("cidadao-1", "Ana Silva", Some(address.to_string()))
}

pub(crate) struct FailingChannel;

#[async_trait]
impl MessageChannel for FailingChannel {
    async fn publish(
        &self,
        _topic: &str,
        _routing_key: &str,
        _message: &NotificationMessage,
    ) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Publish("broker unreachable".into()))
    }
}

/// Fails its first `failures` publishes, then collects like
/// [`CollectingChannel`].
pub(crate) struct FlakyChannel {
    remaining_failures: AtomicUsize,
    pub inner: CollectingChannel,
}

impl FlakyChannel {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            inner: CollectingChannel::new(),
        }
    }
}

#[async_trait]
impl MessageChannel for FlakyChannel {
    async fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        message: &NotificationMessage,
    ) -> Result<(), CollaboratorError> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollaboratorError::Publish("broker hiccup".into()));
        }
        self.inner.publish(topic, routing_key, message).await
    }
}

pub(crate) struct Fixture {
    pub templates: Arc<TemplateRegistry>,
    pub entities: Arc<EntityDirectory>,
    pub preferences: Arc<PreferenceMap>,
    pub channel: Arc<CollectingChannel>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            templates: Arc::new(TemplateRegistry::new()),
            entities: Arc::new(EntityDirectory::new()),
            preferences: Arc::new(PreferenceMap::new()),
            channel: Arc::new(CollectingChannel::new()),
        }
    }

    /// Template id is `<workflow>-<state>` in lower kebab case.
    pub fn with_template(self, workflow: WorkflowKind, state: &str) -> Self {
        let template_id = format!(
            "{}-{}",
            workflow.name().to_lowercase(),
            state.to_lowercase().replace('_', "-")
        );
        self.templates.insert(
            workflow,
            state,
            TemplateInfo::new(template_id, format!("{workflow}: {state}")),
        );
        self
    }

    /// Registers the entity under every workflow.
    pub fn with_entity(self, entity_id: &str, recipient: Recipient) -> Self {
        for workflow in WorkflowKind::ALL {
            self.entities
                .insert(entity_id, *workflow, EntityDetails::new(recipient.clone()));
        }
        self
    }

    pub fn with_details(self, entity_id: &str, workflow: WorkflowKind, details: EntityDetails) -> Self {
        self.entities.insert(entity_id, workflow, details);
        self
    }

    pub fn dispatcher_owned(&self) -> NotificationDispatcher {
        self.dispatcher_with_channel(self.channel.clone())
    }

    pub fn dispatcher(&self) -> Arc<NotificationDispatcher> {
        Arc::new(self.dispatcher_owned())
    }

    pub fn dispatcher_with_channel(&self, channel: Arc<dyn MessageChannel>) -> NotificationDispatcher {
        NotificationDispatcher::new(
            self.templates.clone(),
            self.entities.clone(),
            self.preferences.clone(),
            channel,
        )
    }
}
