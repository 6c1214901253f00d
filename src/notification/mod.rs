mod collaborators;
mod dispatcher;
mod memory;
mod outbox;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use collaborators::{EntityLookup, MessageChannel, PreferenceStore, TemplateResolver};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, Routing};
pub use memory::{
    CollectingChannel, EntityDirectory, Envelope, LoggingChannel, MpscChannel, PreferenceMap,
    TemplateRegistry,
};
pub use outbox::{InMemoryOutbox, OutboxRecord, OutboxRelay, OutboxStatus, OutboxStore, RelayReport};
pub use types::{EntityDetails, NotificationMessage, Recipient, TemplateInfo};
