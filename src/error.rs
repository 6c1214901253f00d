//! Tipos de erro do motor de workflows e do pipeline de notificações.
//!
//! A taxonomia é assimétrica: [`WorkflowError`] é estrita e aborta a operação
//! antes de qualquer persistência, enquanto [`CollaboratorError`] nunca
//! escapa do despachante de notificações (é registrada e descartada).

use thiserror::Error;

/// Erro de nível superior da crate: configuração e operações de caso.
#[derive(Debug, Error)]
pub enum ConsularError {
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Erros estritos do motor de transições.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// A transição pedida não consta da tabela de arestas do workflow.
    /// Quem chama não deve retentar; deve escolher outro estado de destino.
    #[error("invalid transition in workflow {workflow}: {from} -> {to}")]
    InvalidTransition {
        workflow: String,
        from: String,
        to: String,
    },

    #[error("unknown state {state:?} for workflow {workflow}")]
    UnknownState { workflow: String, state: String },

    #[error("unknown workflow {0:?}")]
    UnknownWorkflow(String),
}

impl WorkflowError {
    pub fn invalid_transition(
        workflow: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            workflow: workflow.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Falhas de colaboradores externos (templates, entidades, preferências,
/// canal de saída e outbox).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },

    #[error("channel publish failed: {0}")]
    Publish(String),

    #[error("outbox record not found: {0}")]
    OutboxRecordNotFound(uuid::Uuid),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CollaboratorError {
    pub fn unavailable(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// Um hook de pré-commit falhou; a unidade de trabalho foi revertida.
    #[error("before-commit hook {index} failed, unit of work {id} rolled back: {source}")]
    BeforeCommit {
        id: uuid::Uuid,
        index: usize,
        #[source]
        source: CollaboratorError,
    },
}
