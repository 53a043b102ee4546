//! Entity state store
//!
//! The StateMachine holds the current state of every entity and fires a
//! `state_changed` event on the bus for every write and removal.

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Attributes, Context, EntityId, State};
use ha_event_bus::EventBus;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Current state of all entities
pub struct StateMachine {
    /// States keyed by entity id string
    states: DashMap<String, State>,
    event_bus: Arc<EventBus>,
}

impl StateMachine {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// The bus this machine reports changes on
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Write the state of an entity, replacing state and attributes at once
    ///
    /// Fires `state_changed` carrying the previous and the new state.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: Attributes,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.get(&key);

        let new_state = match &old_state {
            Some(existing) => existing.successor(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(state = %new_state.state, "Setting entity state");

        self.states.insert(key, new_state.clone());

        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Just the state value of an entity
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove an entity; fires `state_changed` with no new state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let key = entity_id.to_string();
        let (_, old_state) = self.states.remove(&key)?;

        trace!("Removing entity state");

        self.event_bus.fire_typed(
            StateChangedData {
                entity_id: entity_id.clone(),
                old_state: Some(old_state.clone()),
                new_state: None,
            },
            context,
        );

        Some(old_state)
    }
}
