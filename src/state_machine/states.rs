use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::definition::WorkflowState;
use crate::error::WorkflowError;

/// The five case types managed by the consular administration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkflowKind {
    Visa,
    Processo,
    Agendamento,
    RegistoCivil,
    ServicoNotarial,
}

impl WorkflowKind {
    pub const ALL: &'static [WorkflowKind] = &[
        WorkflowKind::Visa,
        WorkflowKind::Processo,
        WorkflowKind::Agendamento,
        WorkflowKind::RegistoCivil,
        WorkflowKind::ServicoNotarial,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowKind::Visa => "Visa",
            WorkflowKind::Processo => "Processo",
            WorkflowKind::Agendamento => "Agendamento",
            WorkflowKind::RegistoCivil => "RegistoCivil",
            WorkflowKind::ServicoNotarial => "ServicoNotarial",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkflowKind {
    type Err = WorkflowError;

    /// Accepts the canonical name in any case, with or without separators
    /// (`RegistoCivil`, `registo-civil`, `REGISTO_CIVIL`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        WorkflowKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(s.to_string()))
    }
}

/// Declares a state enum together with its canonical tokens.
macro_rules! workflow_states {
    (
        $(#[$meta:meta])*
        $name:ident for $kind:expr => { $($variant:ident = $token:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $token)]
                $variant,
            )+
        }

        impl WorkflowState for $name {
            const WORKFLOW: WorkflowKind = $kind;
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $token,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = WorkflowError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($token => Ok($name::$variant),)+
                    _ => Err(WorkflowError::UnknownState {
                        workflow: $kind.to_string(),
                        state: s.to_string(),
                    }),
                }
            }
        }
    };
}

workflow_states! {
    /// Lifecycle of a visa application.
    VisaState for WorkflowKind::Visa => {
        Rascunho = "RASCUNHO",
        Submetido = "SUBMETIDO",
        EmAnalise = "EM_ANALISE",
        DocumentosPendentes = "DOCUMENTOS_PENDENTES",
        Aprovado = "APROVADO",
        Rejeitado = "REJEITADO",
        Emitido = "EMITIDO",
        Cancelado = "CANCELADO",
    }
}

workflow_states! {
    /// Lifecycle of a generic administrative process.
    ProcessoState for WorkflowKind::Processo => {
        Rascunho = "RASCUNHO",
        Submetido = "SUBMETIDO",
        EmAnalise = "EM_ANALISE",
        Aprovado = "APROVADO",
        Rejeitado = "REJEITADO",
        Concluido = "CONCLUIDO",
        Cancelado = "CANCELADO",
    }
}

workflow_states! {
    /// Lifecycle of an appointment at the consulate.
    AgendamentoState for WorkflowKind::Agendamento => {
        Pendente = "PENDENTE",
        Confirmado = "CONFIRMADO",
        Reagendado = "REAGENDADO",
        Cancelado = "CANCELADO",
        Completado = "COMPLETADO",
        NaoCompareceu = "NAO_COMPARECEU",
    }
}

workflow_states! {
    /// Lifecycle of a civil-registry record (birth, marriage, death).
    RegistoCivilState for WorkflowKind::RegistoCivil => {
        Rascunho = "RASCUNHO",
        Submetido = "SUBMETIDO",
        EmVerificacao = "EM_VERIFICACAO",
        Verificado = "VERIFICADO",
        CertificadoEmitido = "CERTIFICADO_EMITIDO",
        Rejeitado = "REJEITADO",
        Cancelado = "CANCELADO",
    }
}

workflow_states! {
    /// Lifecycle of a notarial service request.
    ServicoNotarialState for WorkflowKind::ServicoNotarial => {
        Rascunho = "RASCUNHO",
        Submetido = "SUBMETIDO",
        EmProcessamento = "EM_PROCESSAMENTO",
        Concluido = "CONCLUIDO",
        Rejeitado = "REJEITADO",
        Cancelado = "CANCELADO",
    }
}
