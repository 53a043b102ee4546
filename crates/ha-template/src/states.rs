//! The `states` object and state helper functions exposed to templates

use ha_core::{State, STATE_UNKNOWN};
use ha_state_machine::StateMachine;
use minijinja::value::{Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind};
use std::fmt;
use std::sync::Arc;

use crate::filters::as_number;

/// Entry point for state access from templates
///
/// - `states('cover.garage')` returns the state value
/// - `states.cover` returns a proxy over the `cover` domain
/// - `states.cover.garage` returns the full state object
#[derive(Clone)]
pub struct StatesObject {
    state_machine: Arc<StateMachine>,
}

impl fmt::Debug for StatesObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatesObject").finish_non_exhaustive()
    }
}

impl StatesObject {
    pub fn new(state_machine: Arc<StateMachine>) -> Self {
        Self { state_machine }
    }

    /// State value, `unknown` for a missing entity
    pub fn state_of(&self, entity_id: &str) -> String {
        self.state_machine
            .get_state(entity_id)
            .unwrap_or_else(|| STATE_UNKNOWN.to_string())
    }

    /// `is_state`; `expected` may be a single value or a list of values
    pub fn is_state(&self, entity_id: &str, expected: &Value) -> bool {
        let Some(current) = self.state_machine.get_state(entity_id) else {
            return false;
        };
        if let Some(s) = expected.as_str() {
            return current == s;
        }
        expected
            .try_iter()
            .map(|mut it| it.any(|v| v.as_str() == Some(current.as_str())))
            .unwrap_or(false)
    }

    /// Attribute of an entity, undefined when either is missing
    pub fn state_attr(&self, entity_id: &str, attribute: &str) -> Value {
        self.state_machine
            .get(entity_id)
            .and_then(|s| s.attributes.get(attribute).map(Value::from_serialize))
            .unwrap_or(Value::UNDEFINED)
    }

    pub fn is_state_attr(&self, entity_id: &str, attribute: &str, expected: &Value) -> bool {
        let actual = self.state_attr(entity_id, attribute);
        if actual.is_undefined() {
            return false;
        }
        match (as_number(&actual), as_number(expected)) {
            (Some(a), Some(b)) if actual.as_str().is_none() && expected.as_str().is_none() => {
                (a - b).abs() < f64::EPSILON
            }
            _ => &actual == expected,
        }
    }

    /// Whether the entity exists and is neither unknown nor unavailable
    pub fn has_value(&self, entity_id: &str) -> bool {
        self.state_machine
            .get(entity_id)
            .map(|s| s.has_value())
            .unwrap_or(false)
    }
}

impl Object for StatesObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;

        if key.contains('.') {
            return self.state_machine.get(key).map(StateWrapper::value);
        }

        Some(Value::from_object(DomainProxy {
            domain: key.to_string(),
            state_machine: self.state_machine.clone(),
        }))
    }

    fn call(self: &Arc<Self>, _state: &minijinja::State, args: &[Value]) -> Result<Value, Error> {
        let entity_id = args.first().and_then(|v| v.as_str()).ok_or_else(|| {
            Error::new(ErrorKind::InvalidOperation, "states() requires an entity_id")
        })?;
        Ok(Value::from(self.state_of(entity_id)))
    }
}

/// `states.<domain>`: resolves `.object_id` to a state object
#[derive(Clone)]
struct DomainProxy {
    domain: String,
    state_machine: Arc<StateMachine>,
}

impl fmt::Debug for DomainProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainProxy")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl Object for DomainProxy {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let entity_id = format!("{}.{}", self.domain, key.as_str()?);
        self.state_machine.get(&entity_id).map(StateWrapper::value)
    }
}

/// A state as seen from a template
#[derive(Debug, Clone)]
pub struct StateWrapper(pub State);

impl StateWrapper {
    fn value(state: State) -> Value {
        Value::from_object(StateWrapper(state))
    }
}

impl Object for StateWrapper {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let state = &self.0;
        match key.as_str()? {
            "state" => Some(Value::from(state.state.as_str())),
            "entity_id" => Some(Value::from(state.entity_id.to_string())),
            "domain" => Some(Value::from(state.entity_id.domain())),
            "object_id" => Some(Value::from(state.entity_id.object_id())),
            "name" => Some(
                state
                    .attributes
                    .get("friendly_name")
                    .and_then(|v| v.as_str())
                    .map(Value::from)
                    .unwrap_or_else(|| Value::from(state.entity_id.object_id())),
            ),
            "attributes" => Some(Value::from_serialize(&state.attributes)),
            "last_changed" => Some(Value::from(state.last_changed.to_rfc3339())),
            "last_updated" => Some(Value::from(state.last_updated.to_rfc3339())),
            _ => None,
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.state)
    }
}
