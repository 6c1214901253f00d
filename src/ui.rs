//! Saída de terminal colorida para a CLI.
//!
//! Usa a crate `console` para estilização. O [`Printer`] formata o resultado
//! de `check`, o grafo de um workflow e o resumo da demonstração.

use console::Style;
use consular_workflow::WorkflowError;
use consular_workflow::demo::{DemoSummary, StepOutcome};
use consular_workflow::state_machine::Workflow;

pub struct Printer {
    // Transições permitidas e entregas.
    green: Style,
    // Transições rejeitadas.
    red: Style,
    // Rollbacks e avisos.
    yellow: Style,
    // Estados terminais e cabeçalhos.
    bold: Style,
    dim: Style,
}

impl Printer {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            bold: Style::new().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Imprime o veredito de `from -> to` e, se rejeitado, os destinos válidos.
    pub fn check(&self, workflow: &dyn Workflow, from: &str, to: &str) -> Result<bool, WorkflowError> {
        let allowed = workflow.is_allowed_named(from, to)?;
        let name = workflow.kind().name();
        if allowed {
            println!("  {} {name}: {from} -> {to}", self.green.apply_to("✓"));
            return Ok(true);
        }

        println!("  {} {name}: {from} -> {to}", self.red.apply_to("✗"));
        let targets = workflow.allowed_named(from)?;
        if targets.is_empty() {
            println!("    {} is terminal", self.bold.apply_to(from));
        } else {
            println!("    allowed from {from}: {}", targets.join(", "));
        }
        Ok(false)
    }

    /// Imprime cada estado com as suas transições de saída.
    pub fn graph(&self, workflow: &dyn Workflow) -> Result<(), WorkflowError> {
        println!("{}", self.bold.apply_to(format!("─── {} ───", workflow.kind().name())));
        for state in workflow.state_names() {
            if workflow.is_terminal_named(state)? {
                println!("  {} {}", self.bold.apply_to(state), self.dim.apply_to("(terminal)"));
                continue;
            }
            let targets = workflow.allowed_named(state)?;
            println!("  {state} -> {}", targets.join(", "));
        }
        Ok(())
    }

    pub fn demo(&self, summary: &DemoSummary) {
        println!(
            "{}",
            self.bold.apply_to(format!("─── Demo ({:?}) ───", summary.mode))
        );
        for step in &summary.steps {
            let label = format!("{} {} -> {}", step.workflow.name(), step.entity_id, step.target);
            match &step.outcome {
                StepOutcome::Committed => println!("  {} {label}", self.green.apply_to("✓")),
                StepOutcome::RolledBack => {
                    println!("  {} {label} (rolled back)", self.yellow.apply_to("↺"))
                }
                StepOutcome::Rejected(reason) => {
                    println!("  {} {label}: {reason}", self.red.apply_to("✗"))
                }
            }
        }

        println!();
        println!("{}", self.bold.apply_to("─── Delivered ───"));
        for envelope in &summary.delivered {
            match envelope.message() {
                Ok(message) => println!(
                    "  {} [{}] {} <{}>: {}",
                    self.green.apply_to("✉"),
                    envelope.routing_key,
                    message.template_id,
                    message.to_address,
                    message.subject
                ),
                Err(err) => println!("  {} unreadable payload: {err}", self.red.apply_to("✗")),
            }
        }

        println!();
        println!(
            "  committed {}, rolled back {}, rejected {}, audited {}, delivered {}",
            summary.count(|o| *o == StepOutcome::Committed),
            summary.count(|o| *o == StepOutcome::RolledBack),
            summary.count(|o| matches!(o, StepOutcome::Rejected(_))),
            summary.audited,
            summary.delivered.len()
        );
    }
}
