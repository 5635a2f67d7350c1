//! Slack Events API broker.
//!
//! Inbound deliveries are parsed once into an [`EventEnvelope`]. The
//! [`EventBroker`] answers URL verification handshakes directly and routes
//! domain events through deduplication, team lookup and the ordered chain of
//! [`EventReceiver`]s. A failing receiver never stops the receivers behind it;
//! failures a receiver asks to escalate are raised together once the chain
//! has finished.
pub mod broker;
pub mod envelope;
pub mod failure;
pub mod metrics;
pub mod receiver;
pub mod team;
pub mod user;

pub use broker::*;
pub use envelope::*;
pub use failure::*;
pub use self::metrics::*;
pub use receiver::*;
pub use team::*;
pub use user::*;

pub use seb_idempotency::{
    EventStore, EventStoreConfig, InMemoryEventStore, SharedEventStore, TtlEventStore,
};
