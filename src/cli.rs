//! Interface de linha de comando baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (check, graph, demo)
//! e flags globais (--config, --verbose, --json-logs).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use consular_workflow::config::DispatchMode;

/// Motor de transições dos workflows consulares.
#[derive(Debug, Parser)]
#[command(name = "consular", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./consular.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emite logs em JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,
}

/// Modo de despacho aceito pela CLI, mapeado para [`DispatchMode`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Notifica em um hook após o commit.
    AfterCommit,
    /// Grava no outbox e entrega pelo relay.
    Outbox,
}

impl From<ModeArg> for DispatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::AfterCommit => DispatchMode::AfterCommit,
            ModeArg::Outbox => DispatchMode::Outbox,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verifica se uma transição é permitida.
    Check {
        /// Workflow (visa, processo, agendamento, registo-civil, servico-notarial).
        workflow: String,
        /// Estado de origem.
        from: String,
        /// Estado de destino.
        to: String,
    },

    /// Mostra o grafo de transições de um workflow.
    Graph {
        workflow: String,
    },

    /// Executa o cenário de demonstração de ponta a ponta.
    Demo {
        /// Sobrescreve o modo de despacho da configuração.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
}
