use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use super::states::WorkflowKind;
use crate::error::WorkflowError;
use crate::events::TransitionEvent;

/// A state token of one workflow.
///
/// Implemented by the state enums in [`states`](super::states); every workflow
/// shares the same [`WorkflowDefinition`] logic and differs only in its edges.
pub trait WorkflowState:
    Copy
    + Eq
    + Ord
    + Hash
    + fmt::Debug
    + fmt::Display
    + FromStr<Err = WorkflowError>
    + Send
    + Sync
    + 'static
{
    /// Workflow this state set belongs to.
    const WORKFLOW: WorkflowKind;
    /// Every state of the workflow, in declaration order.
    const ALL: &'static [Self];

    /// Canonical upper-case token (e.g. `EM_ANALISE`).
    fn as_str(&self) -> &'static str;
}

/// Immutable finite-state-machine definition for one workflow.
///
/// Built once through [`WorkflowBuilder`]; after `build()` there is no way to
/// add edges, so a definition can be shared across threads without locking.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition<S: WorkflowState> {
    edges: BTreeMap<S, BTreeSet<S>>,
    empty: BTreeSet<S>,
}

impl<S: WorkflowState> WorkflowDefinition<S> {
    pub fn builder() -> WorkflowBuilder<S> {
        WorkflowBuilder::default()
    }

    pub fn kind(&self) -> WorkflowKind {
        S::WORKFLOW
    }

    pub fn name(&self) -> &'static str {
        S::WORKFLOW.name()
    }

    /// True iff `to` is in the declared allowed-set of `from`.
    pub fn is_transition_allowed(&self, from: S, to: S) -> bool {
        self.edges.get(&from).is_some_and(|targets| targets.contains(&to))
    }

    /// Fails with [`WorkflowError::InvalidTransition`] when the edge is not declared.
    pub fn validate_transition(&self, from: S, to: S) -> Result<(), WorkflowError> {
        if self.is_transition_allowed(from, to) {
            Ok(())
        } else {
            tracing::debug!(workflow = self.name(), %from, %to, "rejected transition");
            Err(WorkflowError::invalid_transition(self.name(), from, to))
        }
    }

    /// A state is terminal when it has no entry or an empty allowed-set.
    pub fn is_terminal_state(&self, state: S) -> bool {
        self.edges.get(&state).is_none_or(BTreeSet::is_empty)
    }

    pub fn allowed_transitions(&self, from: S) -> &BTreeSet<S> {
        self.edges.get(&from).unwrap_or(&self.empty)
    }

    /// States that appear in the definition, as a source or a target.
    pub fn states(&self) -> BTreeSet<S> {
        self.edges
            .iter()
            .flat_map(|(from, targets)| std::iter::once(*from).chain(targets.iter().copied()))
            .collect()
    }

    pub fn terminal_states(&self) -> Vec<S> {
        S::ALL
            .iter()
            .copied()
            .filter(|s| self.is_terminal_state(*s))
            .collect()
    }

    /// Number of declared directed edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Validates `from -> to` and, on success, builds the event describing it.
    pub fn transition_event(
        &self,
        entity_id: impl Into<String>,
        from: S,
        to: S,
        comment: Option<String>,
    ) -> Result<TransitionEvent, WorkflowError> {
        self.validate_transition(from, to)?;
        Ok(TransitionEvent::new(
            entity_id.into(),
            S::WORKFLOW,
            Some(from.as_str().to_string()),
            to.as_str().to_string(),
            comment,
        ))
    }

    /// Event for a newly created entity; there is no previous state to validate.
    pub fn creation_event(
        &self,
        entity_id: impl Into<String>,
        initial: S,
        comment: Option<String>,
    ) -> TransitionEvent {
        TransitionEvent::new(
            entity_id.into(),
            S::WORKFLOW,
            None,
            initial.as_str().to_string(),
            comment,
        )
    }
}

/// Single-threaded registration step producing a [`WorkflowDefinition`].
#[derive(Debug)]
pub struct WorkflowBuilder<S: WorkflowState> {
    edges: BTreeMap<S, BTreeSet<S>>,
    terminal: BTreeSet<S>,
}

impl<S: WorkflowState> Default for WorkflowBuilder<S> {
    fn default() -> Self {
        Self {
            edges: BTreeMap::new(),
            terminal: BTreeSet::new(),
        }
    }
}

impl<S: WorkflowState> WorkflowBuilder<S> {
    /// Registers the directed edges `from -> to` for every `to`.
    pub fn add_transition(mut self, from: S, to: impl IntoIterator<Item = S>) -> Self {
        self.edges.entry(from).or_default().extend(to);
        self
    }

    /// Marks `state` terminal, pinning its allowed-set to empty.
    pub fn add_terminal_state(mut self, state: S) -> Self {
        self.terminal.insert(state);
        self
    }

    pub fn build(self) -> WorkflowDefinition<S> {
        let mut edges = self.edges;
        // Terminal marking wins over any edge registered for the same state.
        for state in self.terminal {
            edges.insert(state, BTreeSet::new());
        }
        WorkflowDefinition {
            edges,
            empty: BTreeSet::new(),
        }
    }
}

/// Name-based access to a definition, for callers that only hold state tokens
/// as strings (CLI input, persisted rows).
pub trait Workflow: Send + Sync {
    fn kind(&self) -> WorkflowKind;
    fn state_names(&self) -> Vec<&'static str>;
    fn is_allowed_named(&self, from: &str, to: &str) -> Result<bool, WorkflowError>;
    fn validate_named(&self, from: &str, to: &str) -> Result<(), WorkflowError>;
    fn allowed_named(&self, from: &str) -> Result<Vec<&'static str>, WorkflowError>;
    fn is_terminal_named(&self, state: &str) -> Result<bool, WorkflowError>;
    fn event_named(
        &self,
        entity_id: &str,
        from: Option<&str>,
        to: &str,
        comment: Option<String>,
    ) -> Result<TransitionEvent, WorkflowError>;
}

impl<S: WorkflowState> Workflow for WorkflowDefinition<S> {
    fn kind(&self) -> WorkflowKind {
        S::WORKFLOW
    }

    fn state_names(&self) -> Vec<&'static str> {
        S::ALL.iter().map(|s| s.as_str()).collect()
    }

    fn is_allowed_named(&self, from: &str, to: &str) -> Result<bool, WorkflowError> {
        Ok(self.is_transition_allowed(from.parse()?, to.parse()?))
    }

    fn validate_named(&self, from: &str, to: &str) -> Result<(), WorkflowError> {
        self.validate_transition(from.parse()?, to.parse()?)
    }

    fn allowed_named(&self, from: &str) -> Result<Vec<&'static str>, WorkflowError> {
        let from: S = from.parse()?;
        Ok(self
            .allowed_transitions(from)
            .iter()
            .map(|s| s.as_str())
            .collect())
    }

    fn is_terminal_named(&self, state: &str) -> Result<bool, WorkflowError> {
        Ok(self.is_terminal_state(state.parse()?))
    }

    fn event_named(
        &self,
        entity_id: &str,
        from: Option<&str>,
        to: &str,
        comment: Option<String>,
    ) -> Result<TransitionEvent, WorkflowError> {
        let to: S = to.parse()?;
        match from {
            Some(from) => self.transition_event(entity_id, from.parse()?, to, comment),
            None => Ok(self.creation_event(entity_id, to, comment)),
        }
    }
}
