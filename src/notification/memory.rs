//! In-memory collaborators: a config-driven template registry, an entity
//! directory, a preference map and two channels. Used by the demo and tests,
//! and as a reference for real adapters.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use super::collaborators::{EntityLookup, MessageChannel, PreferenceStore, TemplateResolver};
use super::types::{EntityDetails, NotificationMessage, TemplateInfo};
use crate::config::TemplateConfig;
use crate::error::CollaboratorError;
use crate::state_machine::WorkflowKind;

/// Templates keyed by `(workflow, state token)`.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<(WorkflowKind, String), TemplateInfo>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(entries: &[TemplateConfig]) -> Self {
        let registry = Self::new();
        for entry in entries {
            registry.insert(
                entry.workflow,
                &entry.state,
                TemplateInfo::new(&entry.template_id, &entry.subject),
            );
        }
        registry
    }

    pub fn insert(&self, workflow: WorkflowKind, state: &str, template: TemplateInfo) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((workflow, state.to_ascii_uppercase()), template);
    }

    pub fn len(&self) -> usize {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TemplateResolver for TemplateRegistry {
    async fn resolve(
        &self,
        workflow: WorkflowKind,
        state: &str,
    ) -> Result<Option<TemplateInfo>, CollaboratorError> {
        Ok(self
            .templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(workflow, state.to_ascii_uppercase()))
            .cloned())
    }
}

/// Entity details keyed by `(entity id, workflow)`; ids are only unique
/// within one workflow.
#[derive(Debug, Default)]
pub struct EntityDirectory {
    entries: RwLock<HashMap<(String, WorkflowKind), EntityDetails>>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity_id: impl Into<String>, workflow: WorkflowKind, details: EntityDetails) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((entity_id.into(), workflow), details);
    }
}

#[async_trait]
impl EntityLookup for EntityDirectory {
    async fn lookup(
        &self,
        entity_id: &str,
        workflow: WorkflowKind,
    ) -> Result<Option<EntityDetails>, CollaboratorError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(entity_id.to_string(), workflow))
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct PreferenceMap {
    preferences: RwLock<HashMap<(String, WorkflowKind), bool>>,
}

impl PreferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, recipient_id: impl Into<String>, workflow: WorkflowKind, enabled: bool) {
        self.preferences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((recipient_id.into(), workflow), enabled);
    }
}

#[async_trait]
impl PreferenceStore for PreferenceMap {
    async fn preference(
        &self,
        recipient_id: &str,
        workflow: WorkflowKind,
    ) -> Result<Option<bool>, CollaboratorError> {
        Ok(self
            .preferences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(recipient_id.to_string(), workflow))
            .copied())
    }
}

/// Keeps every published message, with its topic and routing key.
#[derive(Debug, Default)]
pub struct CollectingChannel {
    published: Mutex<Vec<(String, String, NotificationMessage)>>,
}

impl CollectingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String, NotificationMessage)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.published()
            .into_iter()
            .map(|(_, _, message)| message)
            .collect()
    }
}

#[async_trait]
impl MessageChannel for CollectingChannel {
    async fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        message: &NotificationMessage,
    ) -> Result<(), CollaboratorError> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), routing_key.to_string(), message.clone()));
        Ok(())
    }
}

/// Writes each message to the log instead of delivering it. Handy for dry
/// runs against real collaborators.
#[derive(Debug, Default)]
pub struct LoggingChannel;

#[async_trait]
impl MessageChannel for LoggingChannel {
    async fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        message: &NotificationMessage,
    ) -> Result<(), CollaboratorError> {
        info!(
            target: "consular::outbound",
            topic,
            routing_key,
            template_id = %message.template_id,
            to = %message.to_address,
            entity_id = %message.entity_id,
            payload = %serde_json::to_string(message)?,
            "notification"
        );
        Ok(())
    }
}

/// A message as seen by a delivery worker on the other side of an
/// [`MpscChannel`]: the serialized wire payload plus its routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub topic: String,
    pub routing_key: String,
    pub payload: String,
}

impl Envelope {
    pub fn message(&self) -> Result<NotificationMessage, CollaboratorError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Hands serialized messages to an in-process delivery worker.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    sender: mpsc::Sender<Envelope>,
}

impl MpscChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl MessageChannel for MpscChannel {
    async fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        message: &NotificationMessage,
    ) -> Result<(), CollaboratorError> {
        let envelope = Envelope {
            topic: topic.to_string(),
            routing_key: routing_key.to_string(),
            payload: serde_json::to_string(message)?,
        };
        self.sender
            .send(envelope)
            .await
            .map_err(|_| CollaboratorError::Publish("delivery worker is gone".into()))
    }
}
