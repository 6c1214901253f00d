//! Workflow transition engine and commit-deferred notification dispatch for
//! consular case management (visas, civil registry, notarial services,
//! appointments and generic processes).
//!
//! - [`state_machine`]: one immutable transition graph per case type.
//! - [`events`]: transition events, the unit of work and the publisher that
//!   audits immediately and notifies only after commit.
//! - [`notification`]: the dispatcher, its collaborator traits, in-memory
//!   adapters and the transactional outbox.

pub mod config;
pub mod demo;
pub mod error;
pub mod events;
pub mod notification;
pub mod state_machine;
pub mod telemetry;

pub use error::{CollaboratorError, ConsularError, UnitOfWorkError, WorkflowError};
