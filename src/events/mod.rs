mod audit;
mod event;
mod publisher;
mod unit_of_work;

pub use audit::AuditSubscriber;
pub use event::TransitionEvent;
pub use publisher::{NotificationRoute, TransitionPublisher};
pub use unit_of_work::{CommitReport, UnitOfWork};
