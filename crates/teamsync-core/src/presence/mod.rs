//! Presence channel between the leader and its members.
//!
//! The leader runs a [`hub::PresenceHub`] and one [`socket`] handler per
//! connected member. Members run a [`client::PresenceClient`] whose
//! [`sink::MirrorSink`] keeps the local mirror in step with the leader.

pub mod client;
pub mod events;
pub mod hub;
pub mod sink;
pub mod socket;

pub use client::{EventSink, PresenceClient, PresenceSettings};
pub use events::{Event, EventType};
pub use hub::PresenceHub;
pub use sink::MirrorSink;
pub use socket::PresenceContext;
