//! Hub services consumed by template covers
//!
//! Covers never talk to the state machine, template engine or service
//! registry directly; they go through these traits so each can be swapped
//! out in isolation.

use async_trait::async_trait;
use ha_core::events::StateChangedData;
use ha_core::{Attributes, Context, EntityId, State};
use ha_event_bus::TypedEventReceiver;
use ha_service_registry::ServiceRegistry;
use ha_state_machine::StateMachine;
use ha_template::{TemplateEngine, TemplateResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Entity state storage
pub trait StateStore: Send + Sync {
    /// Receiver of every `state_changed` event fired from now on
    fn subscribe_state_changes(&self) -> TypedEventReceiver<StateChangedData>;

    fn read(&self, entity_id: &str) -> Option<State>;

    /// Replace state and attributes of an entity in one write
    fn publish(&self, entity_id: &EntityId, state: &str, attributes: Attributes, context: Context);

    fn remove(&self, entity_id: &EntityId, context: Context);
}

impl StateStore for StateMachine {
    fn subscribe_state_changes(&self) -> TypedEventReceiver<StateChangedData> {
        self.bus().subscribe_typed()
    }

    fn read(&self, entity_id: &str) -> Option<State> {
        self.get(entity_id)
    }

    fn publish(&self, entity_id: &EntityId, state: &str, attributes: Attributes, context: Context) {
        self.set(entity_id.clone(), state, attributes, context);
    }

    fn remove(&self, entity_id: &EntityId, context: Context) {
        StateMachine::remove(self, entity_id, context);
    }
}

/// Template compilation and rendering
pub trait Evaluator: Send + Sync {
    fn compile(&self, template: &str) -> TemplateResult<()>;

    /// Render against current state with extra top-level `variables`
    fn render(&self, template: &str, variables: &Map<String, Value>) -> TemplateResult<String>;
}

impl Evaluator for TemplateEngine {
    fn compile(&self, template: &str) -> TemplateResult<()> {
        TemplateEngine::compile(self, template)
    }

    fn render(&self, template: &str, variables: &Map<String, Value>) -> TemplateResult<String> {
        self.render_with_context(template, variables)
    }
}

/// Outbound service calls
///
/// Dispatch is fire-and-forget from the caller's point of view: failures
/// are reported by the dispatcher itself.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, domain: &str, service: &str, data: Value, context: Context);
}

#[async_trait]
impl ActionDispatcher for ServiceRegistry {
    async fn dispatch(&self, domain: &str, service: &str, data: Value, context: Context) {
        if let Err(e) = self.call(domain, service, data, context).await {
            warn!(domain = %domain, service = %service, "Cover action failed: {}", e);
        }
    }
}

/// The hub services one platform instance works against
#[derive(Clone)]
pub struct CoverHost {
    pub states: Arc<dyn StateStore>,
    pub evaluator: Arc<dyn Evaluator>,
    pub dispatcher: Arc<dyn ActionDispatcher>,
}

impl CoverHost {
    pub fn new(
        states: Arc<dyn StateStore>,
        evaluator: Arc<dyn Evaluator>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        Self {
            states,
            evaluator,
            dispatcher,
        }
    }

    /// Host backed by the hub's own state machine, engine and registry
    pub fn from_hub(
        states: Arc<StateMachine>,
        engine: Arc<TemplateEngine>,
        services: Arc<ServiceRegistry>,
    ) -> Self {
        Self::new(states, engine, services)
    }
}
