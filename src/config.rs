//! Configuração carregada a partir de `consular.toml`.
//!
//! A struct [`ConsularConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis `CONSULAR_LOG` e `CONSULAR_DISPATCH_MODE` têm precedência
//! sobre o arquivo.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConsularError;

use crate::notification::Routing;
use crate::state_machine::{WorkflowCatalog, WorkflowKind};

pub const DEFAULT_TOPIC: &str = "consular.notifications";
pub const DEFAULT_ROUTING_KEY: &str = "notification.email";
pub const CONFIG_FILE: &str = "consular.toml";

/// Como as notificações saem de uma transição confirmada.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Hook em memória executado após o commit.
    #[default]
    AfterCommit,
    /// Registro de outbox gravado na transação e entregue por um relay.
    Outbox,
}

impl FromStr for DispatchMode {
    type Err = ConsularError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "after_commit" => Ok(DispatchMode::AfterCommit),
            "outbox" => Ok(DispatchMode::Outbox),
            other => Err(ConsularError::Config(format!(
                "unknown dispatch mode {other:?} (expected after_commit or outbox)"
            ))),
        }
    }
}

/// Parâmetros do relay de outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Máximo de registros por passada.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Tentativas antes de abandonar um registro.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Intervalo entre passadas, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Entrada `[[templates]]`: template de notificação para um estado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub workflow: WorkflowKind,
    pub state: String,
    pub template_id: String,
    pub subject: String,
}

/// Configuração de nível superior carregada de `consular.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsularConfig {
    /// Filtro de log no formato do `EnvFilter` (ex.: "info", "consular=debug").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emite logs em JSON em vez de texto.
    #[serde(default)]
    pub json_logs: bool,

    #[serde(default)]
    pub dispatch_mode: DispatchMode,

    /// Tópico do canal de saída.
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_routing_key")]
    pub routing_key: String,

    #[serde(default)]
    pub outbox: OutboxConfig,

    /// Templates por (workflow, estado). Substitui a lista padrão por inteiro.
    #[serde(default = "default_templates")]
    pub templates: Vec<TemplateConfig>,
}

// Valor padrão para o filtro de log: "info".
fn default_log_level() -> String {
    "info".to_string()
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_routing_key() -> String {
    DEFAULT_ROUTING_KEY.to_string()
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Templates para os estados que interessam ao cidadão.
pub fn default_templates() -> Vec<TemplateConfig> {
    use WorkflowKind::*;
    let entries: &[(WorkflowKind, &str, &str, &str)] = &[
        (Visa, "SUBMETIDO", "visa-submetido", "Pedido de visto recebido"),
        (Visa, "DOCUMENTOS_PENDENTES", "visa-documentos-pendentes", "Documentos em falta no seu pedido de visto"),
        (Visa, "APROVADO", "visa-aprovado", "Pedido de visto aprovado"),
        (Visa, "REJEITADO", "visa-rejeitado", "Pedido de visto indeferido"),
        (Visa, "EMITIDO", "visa-emitido", "O seu visto foi emitido"),
        (Processo, "SUBMETIDO", "processo-submetido", "Processo recebido"),
        (Processo, "APROVADO", "processo-aprovado", "Processo aprovado"),
        (Processo, "REJEITADO", "processo-rejeitado", "Processo devolvido para correção"),
        (Processo, "CONCLUIDO", "processo-concluido", "Processo concluído"),
        (Agendamento, "CONFIRMADO", "agendamento-confirmado", "Agendamento confirmado"),
        (Agendamento, "REAGENDADO", "agendamento-reagendado", "Agendamento alterado"),
        (Agendamento, "CANCELADO", "agendamento-cancelado", "Agendamento cancelado"),
        (RegistoCivil, "REJEITADO", "registo-rejeitado", "Pedido de registo indeferido"),
        (RegistoCivil, "CERTIFICADO_EMITIDO", "registo-certificado-emitido", "Certidão emitida"),
        (ServicoNotarial, "REJEITADO", "notarial-rejeitado", "Pedido notarial indeferido"),
        (ServicoNotarial, "CONCLUIDO", "notarial-concluido", "Ato notarial concluído"),
    ];
    entries
        .iter()
        .map(|(workflow, state, template_id, subject)| TemplateConfig {
            workflow: *workflow,
            state: state.to_string(),
            template_id: template_id.to_string(),
            subject: subject.to_string(),
        })
        .collect()
}

impl Default for ConsularConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            dispatch_mode: DispatchMode::default(),
            topic: default_topic(),
            routing_key: default_routing_key(),
            outbox: OutboxConfig::default(),
            templates: default_templates(),
        }
    }
}

impl ConsularConfig {
    /// Carrega `consular.toml` do diretório atual, ou os defaults se não existir.
    pub fn load() -> Result<Self, ConsularError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de `path`; usa defaults se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self, ConsularError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ConsularConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo.
        config.apply_overrides(
            std::env::var("CONSULAR_LOG").ok(),
            std::env::var("CONSULAR_DISPATCH_MODE").ok(),
        )?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(
        &mut self,
        log_level: Option<String>,
        dispatch_mode: Option<String>,
    ) -> Result<(), ConsularError> {
        if let Some(level) = log_level
            && !level.is_empty()
        {
            self.log_level = level;
        }
        if let Some(mode) = dispatch_mode
            && !mode.is_empty()
        {
            self.dispatch_mode = mode.parse()?;
        }
        Ok(())
    }

    /// Rejeita templates que apontam para estados inexistentes.
    pub fn validate(&self) -> Result<(), ConsularError> {
        let catalog = WorkflowCatalog::global();
        for template in &self.templates {
            let known = catalog
                .get(template.workflow)
                .state_names()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(template.state.trim()));
            if !known {
                return Err(ConsularError::Config(format!(
                    "template {:?} refers to unknown state {:?} of workflow {}",
                    template.template_id, template.state, template.workflow
                )));
            }
        }
        if self.outbox.batch_size == 0 || self.outbox.max_attempts == 0 {
            return Err(ConsularError::Config(
                "outbox.batch_size and outbox.max_attempts must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn routing(&self) -> Routing {
        Routing {
            topic: self.topic.clone(),
            routing_key: self.routing_key.clone(),
        }
    }
}
