use std::sync::Arc;

use tracing::debug;

use super::audit::AuditSubscriber;
use super::event::TransitionEvent;
use super::unit_of_work::UnitOfWork;
use crate::notification::{NotificationDispatcher, OutboxRecord, OutboxStore};

/// Where the notification side of a transition goes.
pub enum NotificationRoute {
    /// Dispatch in-process once the unit of work commits.
    AfterCommit(Arc<NotificationDispatcher>),
    /// Write an outbox record as part of the unit of work; a relay delivers it.
    Outbox(Arc<dyn OutboxStore>),
}

/// Fans a transition event out to the audit and notification subscribers.
///
/// The audit subscriber fires immediately. The notification subscriber is
/// tied to the caller's [`UnitOfWork`]: it never fires for a rolled-back
/// transition.
pub struct TransitionPublisher {
    audit: Arc<AuditSubscriber>,
    route: NotificationRoute,
}

impl TransitionPublisher {
    pub fn new(route: NotificationRoute) -> Self {
        Self {
            audit: Arc::new(AuditSubscriber::new()),
            route,
        }
    }

    pub fn after_commit(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self::new(NotificationRoute::AfterCommit(dispatcher))
    }

    pub fn with_outbox(outbox: Arc<dyn OutboxStore>) -> Self {
        Self::new(NotificationRoute::Outbox(outbox))
    }

    /// Shares an existing audit subscriber (and its counters).
    pub fn with_audit(mut self, audit: Arc<AuditSubscriber>) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit(&self) -> &AuditSubscriber {
        &self.audit
    }

    /// Publishes an event for a transition the caller has already recorded
    /// inside `uow`.
    pub fn publish(&self, event: TransitionEvent, uow: &mut UnitOfWork) {
        self.audit.on_transition(&event);

        match &self.route {
            NotificationRoute::AfterCommit(dispatcher) => {
                let dispatcher = Arc::clone(dispatcher);
                debug!(
                    unit_of_work = %uow.id(),
                    entity_id = event.entity_id(),
                    "notification deferred until commit"
                );
                uow.register_after_commit(move || async move {
                    dispatcher.dispatch(&event).await;
                });
            }
            NotificationRoute::Outbox(outbox) => {
                let outbox = Arc::clone(outbox);
                let record = OutboxRecord::new(event);
                debug!(
                    unit_of_work = %uow.id(),
                    record = %record.id,
                    "outbox record staged"
                );
                uow.register_before_commit(move || async move { outbox.append(record).await });
            }
        }
    }
}
