//! Core types shared by every crate of the hub
//!
//! Entity identifiers, state snapshots, events, contexts and service calls.
//! These are plain data types; the behaviour lives in the event bus, the
//! state machine and the service registry.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::{ServiceCall, ENTITY_MATCH_ALL};
pub use state::{Attributes, State};

/// State value reported when an entity's state cannot be determined
pub const STATE_UNKNOWN: &str = "unknown";

/// State value reported when an entity is not reachable
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Standard event types fired on the bus
pub mod events {
    use super::*;

    /// Fired whenever the state machine writes a state
    pub const STATE_CHANGED: &str = "state_changed";

    /// Payload of a `state_changed` event
    ///
    /// `old_state` is `None` for a newly created entity and `new_state` is
    /// `None` when the entity was removed.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
