use std::sync::LazyLock;

use super::definition::{Workflow, WorkflowDefinition};
use super::states::{
    AgendamentoState, ProcessoState, RegistoCivilState, ServicoNotarialState, VisaState,
    WorkflowKind,
};

static CATALOG: LazyLock<WorkflowCatalog> = LazyLock::new(WorkflowCatalog::build);

/// The five workflow definitions of the consular administration.
///
/// Built once on first access and read-only afterwards.
#[derive(Debug)]
pub struct WorkflowCatalog {
    visa: WorkflowDefinition<VisaState>,
    processo: WorkflowDefinition<ProcessoState>,
    agendamento: WorkflowDefinition<AgendamentoState>,
    registo_civil: WorkflowDefinition<RegistoCivilState>,
    servico_notarial: WorkflowDefinition<ServicoNotarialState>,
}

impl WorkflowCatalog {
    pub fn global() -> &'static WorkflowCatalog {
        &CATALOG
    }

    fn build() -> Self {
        Self {
            visa: visa_workflow(),
            processo: processo_workflow(),
            agendamento: agendamento_workflow(),
            registo_civil: registo_civil_workflow(),
            servico_notarial: servico_notarial_workflow(),
        }
    }

    pub fn visa(&self) -> &WorkflowDefinition<VisaState> {
        &self.visa
    }

    pub fn processo(&self) -> &WorkflowDefinition<ProcessoState> {
        &self.processo
    }

    pub fn agendamento(&self) -> &WorkflowDefinition<AgendamentoState> {
        &self.agendamento
    }

    pub fn registo_civil(&self) -> &WorkflowDefinition<RegistoCivilState> {
        &self.registo_civil
    }

    pub fn servico_notarial(&self) -> &WorkflowDefinition<ServicoNotarialState> {
        &self.servico_notarial
    }

    /// Name-based view of the definition for `kind`.
    pub fn get(&self, kind: WorkflowKind) -> &dyn Workflow {
        match kind {
            WorkflowKind::Visa => &self.visa,
            WorkflowKind::Processo => &self.processo,
            WorkflowKind::Agendamento => &self.agendamento,
            WorkflowKind::RegistoCivil => &self.registo_civil,
            WorkflowKind::ServicoNotarial => &self.servico_notarial,
        }
    }
}

fn visa_workflow() -> WorkflowDefinition<VisaState> {
    use VisaState::*;
    WorkflowDefinition::builder()
        .add_transition(Rascunho, [Submetido, Cancelado])
        .add_transition(Submetido, [EmAnalise, Cancelado])
        .add_transition(EmAnalise, [DocumentosPendentes, Aprovado, Rejeitado, Cancelado])
        .add_transition(DocumentosPendentes, [EmAnalise, Cancelado])
        .add_transition(Aprovado, [Emitido, Cancelado])
        .add_terminal_state(Emitido)
        .add_terminal_state(Rejeitado)
        .add_terminal_state(Cancelado)
        .build()
}

// REJEITADO -> RASCUNHO lets a rejected process be reworked and resubmitted.
fn processo_workflow() -> WorkflowDefinition<ProcessoState> {
    use ProcessoState::*;
    WorkflowDefinition::builder()
        .add_transition(Rascunho, [Submetido, Cancelado])
        .add_transition(Submetido, [EmAnalise, Cancelado])
        .add_transition(EmAnalise, [Aprovado, Rejeitado, Cancelado])
        .add_transition(Aprovado, [Concluido, Cancelado])
        .add_transition(Rejeitado, [Rascunho])
        .add_terminal_state(Concluido)
        .add_terminal_state(Cancelado)
        .build()
}

fn agendamento_workflow() -> WorkflowDefinition<AgendamentoState> {
    use AgendamentoState::*;
    WorkflowDefinition::builder()
        .add_transition(Pendente, [Confirmado, Cancelado])
        .add_transition(Confirmado, [Reagendado, Cancelado, Completado, NaoCompareceu])
        .add_transition(Reagendado, [Confirmado, Cancelado])
        .add_terminal_state(Cancelado)
        .add_terminal_state(Completado)
        .add_terminal_state(NaoCompareceu)
        .build()
}

fn registo_civil_workflow() -> WorkflowDefinition<RegistoCivilState> {
    use RegistoCivilState::*;
    WorkflowDefinition::builder()
        .add_transition(Rascunho, [Submetido, Cancelado])
        .add_transition(Submetido, [EmVerificacao, Cancelado])
        .add_transition(EmVerificacao, [Verificado, Rejeitado, Cancelado])
        .add_transition(Verificado, [CertificadoEmitido, Cancelado])
        .add_terminal_state(CertificadoEmitido)
        .add_terminal_state(Rejeitado)
        .add_terminal_state(Cancelado)
        .build()
}

fn servico_notarial_workflow() -> WorkflowDefinition<ServicoNotarialState> {
    use ServicoNotarialState::*;
    WorkflowDefinition::builder()
        .add_transition(Rascunho, [Submetido, Cancelado])
        .add_transition(Submetido, [EmProcessamento, Cancelado])
        .add_transition(EmProcessamento, [Concluido, Rejeitado, Cancelado])
        .add_terminal_state(Concluido)
        .add_terminal_state(Rejeitado)
        .add_terminal_state(Cancelado)
        .build()
}
