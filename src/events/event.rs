use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::state_machine::{WorkflowCatalog, WorkflowKind};

/// One applied state change of one entity.
///
/// Only a [`WorkflowDefinition`](crate::state_machine::WorkflowDefinition) can
/// build one, after validating the edge, so an illegal transition never
/// reaches the publisher. Deserialized events (persisted outbox records) are
/// checked against the same edge table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredEvent")]
pub struct TransitionEvent {
    entity_id: String,
    workflow: WorkflowKind,
    previous_state: Option<String>,
    new_state: String,
    comment: Option<String>,
    occurred_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEvent {
    entity_id: String,
    workflow: WorkflowKind,
    previous_state: Option<String>,
    new_state: String,
    #[serde(default)]
    comment: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<StoredEvent> for TransitionEvent {
    type Error = WorkflowError;

    fn try_from(stored: StoredEvent) -> Result<Self, Self::Error> {
        let workflow = WorkflowCatalog::global().get(stored.workflow);
        match stored.previous_state.as_deref() {
            Some(from) => workflow.validate_named(from, &stored.new_state)?,
            None if !workflow.state_names().iter().any(|s| *s == stored.new_state) => {
                return Err(WorkflowError::UnknownState {
                    workflow: stored.workflow.to_string(),
                    state: stored.new_state,
                });
            }
            None => {}
        }
        let mut event = Self::new(
            stored.entity_id,
            stored.workflow,
            stored.previous_state,
            stored.new_state,
            stored.comment,
        );
        event.occurred_at = stored.occurred_at;
        Ok(event)
    }
}

impl TransitionEvent {
    pub(crate) fn new(
        entity_id: String,
        workflow: WorkflowKind,
        previous_state: Option<String>,
        new_state: String,
        comment: Option<String>,
    ) -> Self {
        Self {
            entity_id,
            workflow,
            previous_state,
            new_state,
            // Blank comments carry nothing worth notifying about.
            comment: comment.filter(|c| !c.trim().is_empty()),
            occurred_at: Utc::now(),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn workflow(&self) -> WorkflowKind {
        self.workflow
    }

    pub fn previous_state(&self) -> Option<&str> {
        self.previous_state.as_deref()
    }

    pub fn new_state(&self) -> &str {
        &self.new_state
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn is_creation(&self) -> bool {
        self.previous_state.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::TransitionEvent;
    use crate::state_machine::{VisaState, WorkflowCatalog};

    #[test]
    fn blank_comment_is_dropped() {
        let event = WorkflowCatalog::global().visa().creation_event(
            "1",
            VisaState::Rascunho,
            Some("   ".into()),
        );
        assert_eq!(event.comment(), None);
        assert!(event.is_creation());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let event = WorkflowCatalog::global()
            .visa()
            .transition_event(
                "99",
                VisaState::EmAnalise,
                VisaState::Aprovado,
                Some("documentos conferidos".into()),
            )
            .unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["entityId"], "99");
        assert_eq!(json["workflow"], "Visa");
        assert_eq!(json["previousState"], "EM_ANALISE");
        assert_eq!(json["newState"], "APROVADO");
        assert_eq!(json["comment"], "documentos conferidos");
        assert!(json.get("occurredAt").is_some());
    }

    #[test]
    fn stored_event_reloads_unchanged() {
        let event = WorkflowCatalog::global()
            .visa()
            .transition_event("7", VisaState::Aprovado, VisaState::Emitido, None)
            .unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let reloaded: TransitionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, event);
    }

    #[test]
    fn stored_event_with_illegal_edge_is_refused() {
        let forged = r#"{
            "entityId": "7",
            "workflow": "Visa",
            "previousState": "RASCUNHO",
            "newState": "EMITIDO",
            "comment": null,
            "occurredAt": "2026-01-05T10:00:00Z"
        }"#;
        let err = serde_json::from_str::<TransitionEvent>(forged).unwrap_err();
        assert!(err.to_string().contains("RASCUNHO -> EMITIDO"));

        let unknown = r#"{
            "entityId": "7",
            "workflow": "Agendamento",
            "previousState": null,
            "newState": "EMITIDO",
            "occurredAt": "2026-01-05T10:00:00Z"
        }"#;
        assert!(serde_json::from_str::<TransitionEvent>(unknown).is_err());
    }
}
