//! Scripted walk through the five workflows.
//!
//! [`CaseService`] plays the entity-service layer: it validates a transition,
//! publishes the event, records the new state inside a [`UnitOfWork`] and
//! commits. [`run`] drives a fixed script of cases through it and collects
//! what reached the delivery worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tracing::info;

use crate::config::{ConsularConfig, DispatchMode};
use crate::error::{ConsularError, WorkflowError};
use crate::events::{AuditSubscriber, CommitReport, TransitionPublisher, UnitOfWork};
use crate::notification::{
    EntityDetails, EntityDirectory, Envelope, InMemoryOutbox, MpscChannel, NotificationDispatcher,
    OutboxRelay, PreferenceMap, Recipient, TemplateRegistry,
};
use crate::state_machine::{WorkflowCatalog, WorkflowKind};

type StateTable = HashMap<(WorkflowKind, String), String>;

/// Minimal in-memory case store driving transitions through the engine.
pub struct CaseService {
    catalog: &'static WorkflowCatalog,
    publisher: TransitionPublisher,
    states: Arc<Mutex<StateTable>>,
}

impl CaseService {
    pub fn new(publisher: TransitionPublisher) -> Self {
        Self {
            catalog: WorkflowCatalog::global(),
            publisher,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn publisher(&self) -> &TransitionPublisher {
        &self.publisher
    }

    pub fn current_state(&self, workflow: WorkflowKind, entity_id: &str) -> Option<String> {
        lock(&self.states)
            .get(&(workflow, entity_id.to_string()))
            .cloned()
    }

    /// Moves the entity to `to` (or creates it in `to`) and commits.
    pub async fn transition(
        &self,
        workflow: WorkflowKind,
        entity_id: &str,
        to: &str,
        comment: Option<&str>,
    ) -> Result<CommitReport, ConsularError> {
        let mut uow = UnitOfWork::begin();
        self.stage(workflow, entity_id, to, comment, &mut uow)?;
        Ok(uow.commit().await?)
    }

    /// Same as [`transition`](Self::transition) but the unit of work is rolled
    /// back after the event was published.
    pub fn transition_then_rollback(
        &self,
        workflow: WorkflowKind,
        entity_id: &str,
        to: &str,
    ) -> Result<(), ConsularError> {
        let mut uow = UnitOfWork::begin();
        self.stage(workflow, entity_id, to, None, &mut uow)?;
        uow.rollback();
        Ok(())
    }

    fn stage(
        &self,
        workflow: WorkflowKind,
        entity_id: &str,
        to: &str,
        comment: Option<&str>,
        uow: &mut UnitOfWork,
    ) -> Result<(), WorkflowError> {
        let current = self.current_state(workflow, entity_id);
        let event = self.catalog.get(workflow).event_named(
            entity_id,
            current.as_deref(),
            to,
            comment.map(str::to_string),
        )?;

        let new_state = event.new_state().to_string();
        // The outbox append (if any) is staged first, so the state is only
        // written once the notification side is durable.
        self.publisher.publish(event, uow);

        let key = (workflow, entity_id.to_string());
        let (states, restore) = (Arc::clone(&self.states), Arc::clone(&self.states));
        let restore_key = key.clone();
        uow.register_before_commit_with_undo(
            move || async move {
                lock(&states).insert(key, new_state);
                Ok(())
            },
            move || {
                let mut states = lock(&restore);
                match current {
                    Some(previous) => states.insert(restore_key, previous),
                    None => states.remove(&restore_key),
                };
            },
        );
        Ok(())
    }
}

fn lock(states: &Mutex<StateTable>) -> MutexGuard<'_, StateTable> {
    states.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One scripted action.
#[derive(Debug, Clone, Copy)]
enum Step {
    Apply(WorkflowKind, &'static str, &'static str, Option<&'static str>),
    Rollback(WorkflowKind, &'static str, &'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Committed,
    RolledBack,
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub workflow: WorkflowKind,
    pub entity_id: String,
    pub target: String,
    pub outcome: StepOutcome,
}

#[derive(Debug)]
pub struct DemoSummary {
    pub mode: DispatchMode,
    pub steps: Vec<StepResult>,
    pub audited: u64,
    pub delivered: Vec<Envelope>,
}

impl DemoSummary {
    pub fn count(&self, predicate: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|s| predicate(&s.outcome)).count()
    }
}

fn script() -> Vec<Step> {
    use Step::*;
    use WorkflowKind::*;
    vec![
        Apply(Visa, "v-2026-001", "RASCUNHO", None),
        Apply(Visa, "v-2026-001", "SUBMETIDO", None),
        Apply(Visa, "v-2026-001", "EM_ANALISE", None),
        Apply(Visa, "v-2026-001", "DOCUMENTOS_PENDENTES", Some("falta comprovativo de meios de subsistência")),
        Apply(Visa, "v-2026-001", "EM_ANALISE", None),
        Apply(Visa, "v-2026-001", "APROVADO", None),
        Apply(Visa, "v-2026-001", "EMITIDO", Some("levantamento no balcão 3")),
        Apply(Visa, "v-2026-001", "RASCUNHO", None),
        Apply(Agendamento, "a-2026-014", "PENDENTE", None),
        Apply(Agendamento, "a-2026-014", "COMPLETADO", None),
        Apply(Agendamento, "a-2026-014", "CONFIRMADO", None),
        Apply(Agendamento, "a-2026-014", "COMPLETADO", None),
        Apply(RegistoCivil, "r-2026-007", "RASCUNHO", None),
        Apply(RegistoCivil, "r-2026-007", "SUBMETIDO", None),
        Apply(RegistoCivil, "r-2026-007", "EM_VERIFICACAO", None),
        Apply(RegistoCivil, "r-2026-007", "VERIFICADO", None),
        Apply(RegistoCivil, "r-2026-007", "CERTIFICADO_EMITIDO", None),
        Apply(ServicoNotarial, "n-2026-003", "RASCUNHO", None),
        Apply(ServicoNotarial, "n-2026-003", "SUBMETIDO", None),
        Apply(ServicoNotarial, "n-2026-003", "EM_PROCESSAMENTO", None),
        Apply(ServicoNotarial, "n-2026-003", "CONCLUIDO", None),
        Apply(ServicoNotarial, "n-2026-003", "EM_PROCESSAMENTO", None),
        Apply(Processo, "p-2026-021", "RASCUNHO", None),
        Apply(Processo, "p-2026-021", "SUBMETIDO", None),
        Apply(Processo, "p-2026-021", "EM_ANALISE", None),
        Rollback(Processo, "p-2026-021", "REJEITADO"),
        Apply(Processo, "p-2026-021", "REJEITADO", Some("formulário incompleto")),
        Apply(Processo, "p-2026-021", "RASCUNHO", None),
        Apply(Processo, "p-2026-021", "SUBMETIDO", None),
    ]
}

/// Citizens behind the scripted cases. Carla opted out of civil-registry
/// notifications; Duarte has no e-mail on file.
fn seed(directory: &EntityDirectory, preferences: &PreferenceMap) {
    let people = [
        (WorkflowKind::Visa, "v-2026-001", "c-101", "Ana Silva", "ana.silva@example.org"),
        (WorkflowKind::Agendamento, "a-2026-014", "c-102", "Bruno Costa", "bruno.costa@example.org"),
        (WorkflowKind::RegistoCivil, "r-2026-007", "c-103", "Carla Mendes", "carla.mendes@example.org"),
        (WorkflowKind::ServicoNotarial, "n-2026-003", "c-104", "Duarte Lopes", ""),
        (WorkflowKind::Processo, "p-2026-021", "c-105", "Eva Rocha", "eva.rocha@example.org"),
    ];
    for (workflow, entity_id, recipient_id, name, address) in people {
        let details = EntityDetails::new(Recipient::new(
            recipient_id,
            name,
            Some(address.to_string()),
        ))
        .with_variable("numeroProcesso", entity_id)
        .with_variable("posto", "Consulado-Geral em Lisboa");
        directory.insert(entity_id, workflow, details);
    }
    preferences.set("c-103", WorkflowKind::RegistoCivil, false);
}

/// Runs the script with the given dispatch mode.
pub async fn run(config: &ConsularConfig, mode: DispatchMode) -> Result<DemoSummary> {
    let (channel, mut receiver) = MpscChannel::new(64);
    let worker = tokio::spawn(async move {
        let mut delivered = Vec::new();
        while let Some(envelope) = receiver.recv().await {
            delivered.push(envelope);
        }
        delivered
    });

    let audit = Arc::new(AuditSubscriber::new());
    let steps = {
        let directory = Arc::new(EntityDirectory::new());
        let preferences = Arc::new(PreferenceMap::new());
        seed(&directory, &preferences);
        let dispatcher = Arc::new(
            NotificationDispatcher::new(
                Arc::new(TemplateRegistry::from_config(&config.templates)),
                directory,
                preferences,
                Arc::new(channel),
            )
            .with_routing(config.routing()),
        );

        let outbox = Arc::new(InMemoryOutbox::new());
        let publisher = match mode {
            DispatchMode::AfterCommit => TransitionPublisher::after_commit(dispatcher.clone()),
            DispatchMode::Outbox => TransitionPublisher::with_outbox(outbox.clone()),
        };
        let service = CaseService::new(publisher.with_audit(audit.clone()));
        let steps = execute(&service, &script()).await?;

        if mode == DispatchMode::Outbox {
            let relay = OutboxRelay::new(outbox, dispatcher, config.outbox.clone());
            loop {
                let report = relay.drain_once().await?;
                if report.is_empty() {
                    break;
                }
                info!(?report, "outbox drained");
            }
            relay.purge().await?;
        }
        steps
    };

    // Every channel handle is gone by now, so the worker sees end-of-stream.
    let delivered = worker.await?;
    Ok(DemoSummary {
        mode,
        steps,
        audited: audit.recorded(),
        delivered,
    })
}

async fn execute(service: &CaseService, steps: &[Step]) -> Result<Vec<StepResult>> {
    let mut results = Vec::with_capacity(steps.len());
    for step in steps {
        let (workflow, entity_id, target, outcome) = match *step {
            Step::Apply(workflow, entity_id, to, comment) => {
                let outcome = match service.transition(workflow, entity_id, to, comment).await {
                    Ok(_) => StepOutcome::Committed,
                    Err(ConsularError::Workflow(err)) => StepOutcome::Rejected(err.to_string()),
                    Err(err) => return Err(err.into()),
                };
                (workflow, entity_id, to, outcome)
            }
            Step::Rollback(workflow, entity_id, to) => {
                let outcome = match service.transition_then_rollback(workflow, entity_id, to) {
                    Ok(()) => StepOutcome::RolledBack,
                    Err(ConsularError::Workflow(err)) => StepOutcome::Rejected(err.to_string()),
                    Err(err) => return Err(err.into()),
                };
                (workflow, entity_id, to, outcome)
            }
        };
        results.push(StepResult {
            workflow,
            entity_id: entity_id.to_string(),
            target: target.to_string(),
            outcome,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::notification::{OutboxRecord, OutboxStatus, OutboxStore, TemplateRegistry};

    fn templates(kind: WorkflowKind, delivered: &[Envelope]) -> Vec<String> {
        delivered
            .iter()
            .map(|e| e.message().unwrap())
            .filter(|m| m.workflow_name == kind)
            .map(|m| m.template_id)
            .collect()
    }

    #[tokio::test]
    async fn after_commit_demo_delivers_expected_messages() {
        let summary = run(&ConsularConfig::default(), DispatchMode::AfterCommit)
            .await
            .unwrap();

        assert_eq!(summary.count(|o| *o == StepOutcome::Committed), 25);
        assert_eq!(summary.count(|o| *o == StepOutcome::RolledBack), 1);
        assert_eq!(summary.count(|o| matches!(o, StepOutcome::Rejected(_))), 3);
        // The rolled-back transition was audited too.
        assert_eq!(summary.audited, 26);

        assert_eq!(summary.delivered.len(), 8);
        assert_eq!(
            templates(WorkflowKind::Visa, &summary.delivered),
            vec!["visa-submetido", "visa-documentos-pendentes", "visa-aprovado", "visa-emitido"]
        );
        assert_eq!(
            templates(WorkflowKind::Processo, &summary.delivered),
            vec!["processo-submetido", "processo-rejeitado", "processo-submetido"]
        );
        // Opted out and missing address.
        assert!(templates(WorkflowKind::RegistoCivil, &summary.delivered).is_empty());
        assert!(templates(WorkflowKind::ServicoNotarial, &summary.delivered).is_empty());
    }

    #[tokio::test]
    async fn outbox_demo_delivers_the_same_messages() {
        let after_commit = run(&ConsularConfig::default(), DispatchMode::AfterCommit)
            .await
            .unwrap();
        let outbox = run(&ConsularConfig::default(), DispatchMode::Outbox)
            .await
            .unwrap();

        let ids = |s: &DemoSummary| {
            s.delivered
                .iter()
                .map(|e| e.message().unwrap().template_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&after_commit), ids(&outbox));
        assert_eq!(outbox.audited, after_commit.audited);
    }

    #[tokio::test]
    async fn rejected_transition_leaves_state_untouched() {
        let config = ConsularConfig::default();
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(TemplateRegistry::from_config(&config.templates)),
            Arc::new(EntityDirectory::new()),
            Arc::new(PreferenceMap::new()),
            Arc::new(crate::notification::CollectingChannel::new()),
        ));
        let service = CaseService::new(TransitionPublisher::after_commit(dispatcher));

        service
            .transition(WorkflowKind::Visa, "v-1", "RASCUNHO", None)
            .await
            .unwrap();
        service
            .transition(WorkflowKind::Visa, "v-1", "SUBMETIDO", None)
            .await
            .unwrap();
        let err = service
            .transition(WorkflowKind::Visa, "v-1", "RASCUNHO", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConsularError::Workflow(WorkflowError::InvalidTransition { .. })
        ));
        assert_eq!(
            service.current_state(WorkflowKind::Visa, "v-1").as_deref(),
            Some("SUBMETIDO")
        );
        // Rejected attempts never reach the publisher.
        assert_eq!(service.publisher().audit().recorded(), 2);
    }

    /// Refuses to store submissions; everything else goes to memory.
    struct RejectingOutbox(InMemoryOutbox);

    #[async_trait::async_trait]
    impl OutboxStore for RejectingOutbox {
        async fn append(&self, record: OutboxRecord) -> Result<(), CollaboratorError> {
            if record.event.new_state() == "SUBMETIDO" {
                return Err(CollaboratorError::unavailable("outbox", "disk full"));
            }
            self.0.append(record).await
        }

        async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>, CollaboratorError> {
            self.0.pending(limit).await
        }

        async fn mark_delivered(&self, id: uuid::Uuid) -> Result<(), CollaboratorError> {
            self.0.mark_delivered(id).await
        }

        async fn record_failure(
            &self,
            id: uuid::Uuid,
            error: &str,
            max_attempts: u32,
        ) -> Result<OutboxStatus, CollaboratorError> {
            self.0.record_failure(id, error, max_attempts).await
        }

        async fn purge_finished(&self) -> Result<usize, CollaboratorError> {
            self.0.purge_finished().await
        }
    }

    #[tokio::test]
    async fn failed_outbox_write_leaves_no_state_behind() {
        let outbox = Arc::new(RejectingOutbox(InMemoryOutbox::new()));
        let service = CaseService::new(TransitionPublisher::with_outbox(outbox.clone()));

        service
            .transition(WorkflowKind::Visa, "v-1", "RASCUNHO", None)
            .await
            .unwrap();
        let err = service
            .transition(WorkflowKind::Visa, "v-1", "SUBMETIDO", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConsularError::UnitOfWork(_)));
        assert_eq!(
            service.current_state(WorkflowKind::Visa, "v-1").as_deref(),
            Some("RASCUNHO")
        );
        assert_eq!(outbox.0.records().len(), 1);

        // A failed creation leaves no entity at all.
        let fresh = CaseService::new(TransitionPublisher::with_outbox(outbox.clone()));
        assert!(fresh
            .transition(WorkflowKind::Processo, "p-1", "SUBMETIDO", None)
            .await
            .is_err());
        assert_eq!(fresh.current_state(WorkflowKind::Processo, "p-1"), None);
    }

    #[tokio::test]
    async fn rollback_keeps_previous_state() {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(TemplateRegistry::new()),
            Arc::new(EntityDirectory::new()),
            Arc::new(PreferenceMap::new()),
            Arc::new(crate::notification::CollectingChannel::new()),
        ));
        let service = CaseService::new(TransitionPublisher::after_commit(dispatcher));
        service
            .transition(WorkflowKind::Agendamento, "a-1", "PENDENTE", None)
            .await
            .unwrap();
        service
            .transition_then_rollback(WorkflowKind::Agendamento, "a-1", "CONFIRMADO")
            .unwrap();
        assert_eq!(
            service.current_state(WorkflowKind::Agendamento, "a-1").as_deref(),
            Some("PENDENTE")
        );
    }
}
