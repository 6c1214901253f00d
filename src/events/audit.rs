use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use super::event::TransitionEvent;

/// Logs every published transition, synchronously and independently of
/// whether the enclosing unit of work later commits.
#[derive(Debug, Default)]
pub struct AuditSubscriber {
    recorded: AtomicU64,
}

impl AuditSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_transition(&self, event: &TransitionEvent) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "consular::audit",
            workflow = %event.workflow(),
            entity_id = event.entity_id(),
            previous_state = event.previous_state().unwrap_or("-"),
            new_state = event.new_state(),
            comment = event.comment().unwrap_or(""),
            occurred_at = %event.occurred_at(),
            "workflow transition"
        );
    }

    /// Number of events audited since start-up.
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{AgendamentoState, WorkflowCatalog};

    #[test]
    fn counts_every_event() {
        let audit = AuditSubscriber::new();
        let agendamento = WorkflowCatalog::global().agendamento();
        let created = agendamento.creation_event("5", AgendamentoState::Pendente, None);
        let confirmed = agendamento
            .transition_event("5", AgendamentoState::Pendente, AgendamentoState::Confirmado, None)
            .unwrap();

        audit.on_transition(&created);
        audit.on_transition(&confirmed);
        assert_eq!(audit.recorded(), 2);
    }
}
