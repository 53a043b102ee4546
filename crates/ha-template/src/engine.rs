//! Template engine with state access

use crate::error::TemplateResult;
use crate::filters;
use crate::states::StatesObject;
use ha_state_machine::StateMachine;
use minijinja::{Environment, UndefinedBehavior, Value};
use std::sync::Arc;
use tracing::trace;

/// minijinja environment wired to the state machine
///
/// Templates are compiled on every render; the state they see is whatever
/// the state machine holds at that moment.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new(state_machine: Arc<StateMachine>) -> Self {
        let states = Arc::new(StatesObject::new(state_machine));
        let mut env = Environment::new();

        env.set_debug(true);
        // `states.cover.missing.state` must be falsy, not an error
        env.set_undefined_behavior(UndefinedBehavior::Chainable);

        env.add_filter("float", filters::to_float);
        env.add_filter("int", filters::to_int);
        env.add_filter("is_number", filters::is_number);
        env.add_test("number", filters::is_number);

        Self::register_state_functions(&mut env, states);

        Self { env }
    }

    fn register_state_functions(env: &mut Environment<'static>, states: Arc<StatesObject>) {
        env.add_global("states", Value::from_object((*states).clone()));

        let s = states.clone();
        env.add_function("is_state", move |entity_id: &str, state: Value| {
            s.is_state(entity_id, &state)
        });

        let s = states.clone();
        env.add_function("state_attr", move |entity_id: &str, attribute: &str| {
            s.state_attr(entity_id, attribute)
        });

        let s = states.clone();
        env.add_function(
            "is_state_attr",
            move |entity_id: &str, attribute: &str, value: Value| {
                s.is_state_attr(entity_id, attribute, &value)
            },
        );

        let s = states;
        env.add_function("has_value", move |entity_id: &str| s.has_value(entity_id));
    }

    /// Parse a template without rendering it
    pub fn compile(&self, template: &str) -> TemplateResult<()> {
        self.env.template_from_str(template)?;
        Ok(())
    }

    pub fn render(&self, template: &str) -> TemplateResult<String> {
        self.render_with_context(template, ())
    }

    /// Render with extra top-level variables, e.g. `{"position": 42}`
    pub fn render_with_context(
        &self,
        template: &str,
        context: impl serde::Serialize,
    ) -> TemplateResult<String> {
        trace!("Rendering template: {}", template);
        let tmpl = self.env.template_from_str(template)?;
        Ok(tmpl.render(context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TemplateError;
    use ha_core::{Context, EntityId};
    use ha_event_bus::EventBus;
    use serde_json::json;
    use std::collections::HashMap;

    fn make_engine() -> (Arc<StateMachine>, TemplateEngine) {
        let state_machine = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        let engine = TemplateEngine::new(state_machine.clone());
        (state_machine, engine)
    }

    #[test]
    fn test_state_object_access() {
        let (sm, engine) = make_engine();
        sm.set(
            EntityId::new("cover", "test_state").unwrap(),
            "open",
            HashMap::new(),
            Context::new(),
        );
        assert_eq!(
            engine.render("{{ states.cover.test_state.state }}").unwrap(),
            "open"
        );
        assert_eq!(engine.render("{{ states('cover.test_state') }}").unwrap(), "open");
        assert_eq!(engine.render("{{ states.cover.test_state }}").unwrap(), "open");
    }

    #[test]
    fn test_attribute_access() {
        let (sm, engine) = make_engine();
        sm.set(
            EntityId::new("cover", "test").unwrap(),
            "closed",
            HashMap::from([("position".to_string(), json!(42))]),
            Context::new(),
        );
        assert_eq!(
            engine
                .render("{{ states.cover.test.attributes.position }}")
                .unwrap(),
            "42"
        );
        assert_eq!(
            engine.render("{{ state_attr('cover.test', 'position') }}").unwrap(),
            "42"
        );
    }

    #[test]
    fn test_missing_entity_chains_to_undefined() {
        let (_, engine) = make_engine();
        let icon = "{% if states.cover.test_state.state %}mdi:check{% endif %}";
        assert_eq!(engine.render(icon).unwrap(), "");
        assert_eq!(engine.render("{{ states.cover.test.attributes.position }}").unwrap(), "");
    }

    #[test]
    fn test_undefined_variable_renders_empty() {
        let (_, engine) = make_engine();
        assert_eq!(engine.render("{{ on }}").unwrap(), "");
    }

    #[test]
    fn test_boolean_and_numeric_expressions() {
        let (_, engine) = make_engine();
        assert_eq!(engine.render("{{ 1 == 1 }}").unwrap(), "true");
        assert_eq!(engine.render("{{ 42 }}").unwrap(), "42");
        assert_eq!(engine.render("{{ -1 }}").unwrap(), "-1");
        assert_eq!(engine.render("{{ '23.5' | float + 1 }}").unwrap(), "24.5");
    }

    #[test]
    fn test_is_state_function() {
        let (sm, engine) = make_engine();
        sm.set(
            EntityId::new("cover", "garage").unwrap(),
            "open",
            HashMap::new(),
            Context::new(),
        );
        assert_eq!(
            engine.render("{{ is_state('cover.garage', 'open') }}").unwrap(),
            "true"
        );
        assert_eq!(
            engine.render("{{ has_value('cover.nothing') }}").unwrap(),
            "false"
        );
    }

    #[test]
    fn test_render_with_variables() {
        let (_, engine) = make_engine();
        assert_eq!(
            engine
                .render_with_context("{{ position }}", json!({"position": 42}))
                .unwrap(),
            "42"
        );
    }

    #[test]
    fn test_syntax_error() {
        let (_, engine) = make_engine();
        assert!(matches!(
            engine.compile("{{ states.cover.garage"),
            Err(TemplateError::SyntaxError { .. })
        ));
        assert!(engine.compile("{% if true %}x{% endif %}").is_ok());
    }
}
