//! State snapshot of an entity

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// Attribute map carried by every state
pub type Attributes = HashMap<String, serde_json::Value>;

/// The state of an entity at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub entity_id: EntityId,

    /// The state value, e.g. "open", "closed", "23.5"
    pub state: String,

    #[serde(default)]
    pub attributes: Attributes,

    /// Last time the state value itself changed
    pub last_changed: DateTime<Utc>,

    /// Last time the state or its attributes were written
    pub last_updated: DateTime<Utc>,

    pub context: Context,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: Attributes,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Successor of this state; `last_changed` only moves if the value differs
    pub fn successor(
        &self,
        state: impl Into<String>,
        attributes: Attributes,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let state = state.into();
        let last_changed = if self.state == state {
            self.last_changed
        } else {
            now
        };

        Self {
            entity_id: self.entity_id.clone(),
            state,
            attributes,
            last_changed,
            last_updated: now,
            context,
        }
    }

    /// Whether the state carries a real value
    pub fn has_value(&self) -> bool {
        self.state != STATE_UNKNOWN && self.state != STATE_UNAVAILABLE
    }

    /// Typed attribute lookup
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl PartialEq for State {
    // timestamps and context are bookkeeping, not part of the snapshot
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}
