//! Transactional outbox for notification events.
//!
//! The publisher writes an [`OutboxRecord`] as part of the caller's unit of
//! work; [`OutboxRelay`] later hands pending records to the dispatcher.
//! A record survives a crash between commit and delivery, at the price of
//! at-least-once delivery.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dispatcher::NotificationDispatcher;
use crate::config::OutboxConfig;
use crate::error::CollaboratorError;
use crate::events::TransitionEvent;
use crate::state_machine::WorkflowKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    /// Gave up after too many failed attempts.
    Dead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub event: TransitionEvent,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn new(event: TransitionEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }
}

/// Durable storage for outbox records.
///
/// `append` is expected to run inside the same transaction that records the
/// entity's new state.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn append(&self, record: OutboxRecord) -> Result<(), CollaboratorError>;

    /// Oldest pending records first, at most `limit`. Records of one entity
    /// come back in the order they were appended.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>, CollaboratorError>;

    async fn mark_delivered(&self, id: Uuid) -> Result<(), CollaboratorError>;

    /// Counts a failed attempt; the record goes `Dead` once it reaches
    /// `max_attempts`. Returns the resulting status.
    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        max_attempts: u32,
    ) -> Result<OutboxStatus, CollaboratorError>;

    /// Drops `Delivered` and `Dead` records; returns how many were removed.
    async fn purge_finished(&self) -> Result<usize, CollaboratorError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    records: Mutex<Vec<OutboxRecord>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OutboxRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut OutboxRecord) -> T,
    ) -> Result<T, CollaboratorError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .iter_mut()
            .find(|r| r.id == id)
            .map(f)
            .ok_or(CollaboratorError::OutboxRecordNotFound(id))
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn append(&self, record: OutboxRecord) -> Result<(), CollaboratorError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>, CollaboratorError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<(), CollaboratorError> {
        self.update(id, |record| {
            record.status = OutboxStatus::Delivered;
            record.attempts += 1;
        })
    }

    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        max_attempts: u32,
    ) -> Result<OutboxStatus, CollaboratorError> {
        self.update(id, |record| {
            record.attempts += 1;
            record.last_error = Some(error.to_string());
            if record.attempts >= max_attempts {
                record.status = OutboxStatus::Dead;
            }
            record.status
        })
    }

    async fn purge_finished(&self) -> Result<usize, CollaboratorError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|r| r.status == OutboxStatus::Pending);
        Ok(before - records.len())
    }
}

/// Counts from one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub retried: usize,
    pub dead: usize,
    /// Left for a later pass because an older record of the same entity is
    /// still pending.
    pub deferred: usize,
}

impl RelayReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Polls an [`OutboxStore`] and dispatches pending records.
pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    dispatcher: Arc<NotificationDispatcher>,
    config: OutboxConfig,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        dispatcher: Arc<NotificationDispatcher>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            outbox,
            dispatcher,
            config,
        }
    }

    /// Dispatches one batch of pending records, oldest first.
    ///
    /// Only [`DispatchOutcome::Failed`](super::DispatchOutcome::Failed) keeps a
    /// record pending; the silent no-op outcomes are final. Once a record is
    /// kept pending, later records of the same entity wait for the next pass.
    pub async fn drain_once(&self) -> Result<RelayReport, CollaboratorError> {
        let mut report = RelayReport::default();
        let mut blocked: HashSet<(WorkflowKind, String)> = HashSet::new();
        for record in self.outbox.pending(self.config.batch_size).await? {
            let entity = (record.event.workflow(), record.event.entity_id().to_string());
            if blocked.contains(&entity) {
                debug!(record = %record.id, entity_id = %entity.1, "deferred behind a failed record");
                report.deferred += 1;
                continue;
            }

            let outcome = self.dispatcher.dispatch(&record.event).await;
            if !outcome.is_retryable() {
                self.outbox.mark_delivered(record.id).await?;
                report.delivered += 1;
                continue;
            }

            let reason = format!("{outcome:?}");
            match self
                .outbox
                .record_failure(record.id, &reason, self.config.max_attempts)
                .await?
            {
                OutboxStatus::Dead => {
                    error!(
                        record = %record.id,
                        entity_id = record.event.entity_id(),
                        attempts = record.attempts + 1,
                        "outbox record abandoned"
                    );
                    report.dead += 1;
                }
                _ => {
                    blocked.insert(entity);
                    report.retried += 1;
                }
            }
        }
        Ok(report)
    }

    /// Removes finished records from the store.
    pub async fn purge(&self) -> Result<usize, CollaboratorError> {
        let purged = self.outbox.purge_finished().await?;
        if purged > 0 {
            debug!(purged, "outbox records purged");
        }
        Ok(purged)
    }

    /// Drains the outbox every `poll_interval_ms` until `shutdown` turns true
    /// or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        info!(
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "outbox relay started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.drain_once().await {
                    Ok(report) if report.delivered + report.dead > 0 => {
                        debug!(?report, "outbox pass");
                        if let Err(err) = self.purge().await {
                            warn!(error = %err, "outbox purge failed");
                        }
                    }
                    Ok(report) if !report.is_empty() => debug!(?report, "outbox pass"),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "outbox pass failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("outbox relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::testing::{FailingChannel, Fixture, FlakyChannel, recipient};
    use crate::state_machine::{RegistoCivilState, VisaState, WorkflowCatalog};

    fn certificate_issued(entity_id: &str) -> TransitionEvent {
        WorkflowCatalog::global()
            .registo_civil()
            .transition_event(
                entity_id,
                RegistoCivilState::Verificado,
                RegistoCivilState::CertificadoEmitido,
                None,
            )
            .unwrap()
    }

    fn config(max_attempts: u32) -> OutboxConfig {
        OutboxConfig {
            batch_size: 10,
            max_attempts,
            poll_interval_ms: 10,
        }
    }

    fn fixture() -> Fixture {
        Fixture::new()
            .with_template(WorkflowKind::RegistoCivil, "CERTIFICADO_EMITIDO")
            .with_entity("r-1", recipient("rui@example.org"))
    }

    #[tokio::test]
    async fn drain_delivers_and_marks_records() {
        let fixture = fixture();
        let outbox = Arc::new(InMemoryOutbox::new());
        outbox.append(OutboxRecord::new(certificate_issued("r-1"))).await.unwrap();
        // No recipient: a final no-op, not a retry.
        outbox.append(OutboxRecord::new(certificate_issued("r-404"))).await.unwrap();

        let relay = OutboxRelay::new(outbox.clone(), fixture.dispatcher(), config(3));
        let report = relay.drain_once().await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(fixture.channel.messages().len(), 1);
        assert!(outbox
            .records()
            .iter()
            .all(|r| r.status == OutboxStatus::Delivered));
        assert!(relay.drain_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_channel_retries_then_gives_up() {
        let fixture = fixture();
        let dispatcher = Arc::new(fixture.dispatcher_with_channel(Arc::new(FailingChannel)));
        let outbox = Arc::new(InMemoryOutbox::new());
        outbox.append(OutboxRecord::new(certificate_issued("r-1"))).await.unwrap();
        let relay = OutboxRelay::new(outbox.clone(), dispatcher, config(2));

        let first = relay.drain_once().await.unwrap();
        assert_eq!(first.retried, 1);
        assert_eq!(outbox.records()[0].status, OutboxStatus::Pending);

        let second = relay.drain_once().await.unwrap();
        assert_eq!(second.dead, 1);
        let record = &outbox.records()[0];
        assert_eq!(record.status, OutboxStatus::Dead);
        assert_eq!(record.attempts, 2);
        assert!(record.last_error.is_some());
    }

    fn visa_event(entity_id: &str, from: VisaState, to: VisaState) -> TransitionEvent {
        WorkflowCatalog::global()
            .visa()
            .transition_event(entity_id, from, to, None)
            .unwrap()
    }

    #[tokio::test]
    async fn retry_keeps_per_entity_order() {
        let fixture = Fixture::new()
            .with_template(WorkflowKind::Visa, "SUBMETIDO")
            .with_template(WorkflowKind::Visa, "EM_ANALISE")
            .with_entity("v-1", recipient("ana@example.org"))
            .with_entity("v-2", recipient("rui@example.org"));
        let channel = Arc::new(FlakyChannel::new(1));
        let dispatcher = Arc::new(fixture.dispatcher_with_channel(channel.clone()));

        let outbox = Arc::new(InMemoryOutbox::new());
        for event in [
            visa_event("v-1", VisaState::Rascunho, VisaState::Submetido),
            visa_event("v-1", VisaState::Submetido, VisaState::EmAnalise),
            visa_event("v-2", VisaState::Rascunho, VisaState::Submetido),
        ] {
            outbox.append(OutboxRecord::new(event)).await.unwrap();
        }
        let relay = OutboxRelay::new(outbox.clone(), dispatcher, config(3));

        let first = relay.drain_once().await.unwrap();
        assert_eq!(first.retried, 1);
        assert_eq!(first.deferred, 1);
        // Other entities are not held back.
        assert_eq!(first.delivered, 1);

        let second = relay.drain_once().await.unwrap();
        assert_eq!(second.delivered, 2);

        let delivered: Vec<_> = channel
            .inner
            .messages()
            .into_iter()
            .map(|m| (m.entity_id, m.variables["newState"].clone()))
            .collect();
        assert_eq!(
            delivered,
            vec![
                ("v-2".to_string(), "SUBMETIDO".to_string()),
                ("v-1".to_string(), "SUBMETIDO".to_string()),
                ("v-1".to_string(), "EM_ANALISE".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn purge_drops_finished_records_only() {
        let fixture = fixture();
        let outbox = Arc::new(InMemoryOutbox::new());
        outbox.append(OutboxRecord::new(certificate_issued("r-1"))).await.unwrap();
        outbox.append(OutboxRecord::new(certificate_issued("r-2"))).await.unwrap();
        let pending = OutboxRecord::new(certificate_issued("r-3"));
        let pending_id = pending.id;
        let relay = OutboxRelay::new(
            outbox.clone(),
            fixture.dispatcher(),
            OutboxConfig {
                batch_size: 2,
                ..config(3)
            },
        );

        relay.drain_once().await.unwrap();
        outbox.append(pending).await.unwrap();
        assert_eq!(relay.purge().await.unwrap(), 2);

        let records = outbox.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, pending_id);
        assert_eq!(relay.purge().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_size_limits_one_pass() {
        let fixture = fixture();
        let outbox = Arc::new(InMemoryOutbox::new());
        for _ in 0..3 {
            outbox.append(OutboxRecord::new(certificate_issued("r-1"))).await.unwrap();
        }
        let relay = OutboxRelay::new(
            outbox.clone(),
            fixture.dispatcher(),
            OutboxConfig {
                batch_size: 2,
                ..config(3)
            },
        );
        assert_eq!(relay.drain_once().await.unwrap().delivered, 2);
        assert_eq!(relay.drain_once().await.unwrap().delivered, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let fixture = fixture();
        let outbox = Arc::new(InMemoryOutbox::new());
        outbox.append(OutboxRecord::new(certificate_issued("r-1"))).await.unwrap();
        let relay = Arc::new(OutboxRelay::new(outbox.clone(), fixture.dispatcher(), config(3)));

        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn({
            let relay = relay.clone();
            async move { relay.run(shutdown).await }
        });
        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(fixture.channel.messages().len(), 1);
        assert!(outbox.records().is_empty());
    }

    #[tokio::test]
    async fn unknown_record_is_an_error() {
        let outbox = InMemoryOutbox::new();
        assert!(matches!(
            outbox.mark_delivered(Uuid::new_v4()).await,
            Err(CollaboratorError::OutboxRecordNotFound(_))
        ));
    }
}
