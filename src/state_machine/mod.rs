mod catalog;
mod definition;
mod states;

pub use catalog::WorkflowCatalog;
pub use definition::{Workflow, WorkflowBuilder, WorkflowDefinition, WorkflowState};
pub use states::{
    AgendamentoState, ProcessoState, RegistoCivilState, ServicoNotarialState, VisaState,
    WorkflowKind,
};
