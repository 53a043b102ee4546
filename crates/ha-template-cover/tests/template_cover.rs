//! End-to-end behaviour of template covers against a real state machine,
//! template engine and service registry

use ha_core::{Attributes, Context, EntityId, ServiceCall, State};
use ha_event_bus::EventBus;
use ha_service_registry::ServiceRegistry;
use ha_state_machine::StateMachine;
use ha_template::TemplateEngine;
use ha_template_cover::{
    features, register_cover_services, CoverConfigError, CoverHost, CoverPlatform, SetupOutcome,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const COVER: &str = "cover.test_template_cover";

/// Bindings shared by most definitions; none of them reach `test.automation`
const DEFAULT_ACTIONS: &str = r#"
    open_cover:
      service: cover.open_cover
      entity_id: cover.test_state
    close_cover:
      service: cover.close_cover
      entity_id: cover.test_state
    stop_cover:
      service: cover.close_cover
      entity_id: cover.test_state
"#;

struct Hub {
    states: Arc<StateMachine>,
    services: Arc<ServiceRegistry>,
    platform: Arc<CoverPlatform>,
    calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl Hub {
    fn new() -> Self {
        let states = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        let engine = Arc::new(TemplateEngine::new(states.clone()));
        let services = Arc::new(ServiceRegistry::new());

        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        services.register("test", "automation", move |call: ServiceCall| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(call);
                Ok(())
            }
        });

        let host = CoverHost::from_hub(states.clone(), engine, services.clone());
        let platform = Arc::new(CoverPlatform::new(host));
        register_cover_services(&services, platform.clone());

        Self {
            states,
            services,
            platform,
            calls,
        }
    }

    /// Set up a platform entry with a single `test_template_cover`
    async fn setup_cover(&self, definition: &str) -> SetupOutcome {
        self.setup_entry(&format!(
            "platform: template\ncovers:\n  test_template_cover:\n{}",
            definition
        ))
        .await
    }

    async fn setup_entry(&self, yaml: &str) -> SetupOutcome {
        let entry: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        self.platform.setup_entry(&entry).await.unwrap()
    }

    fn set(&self, entity_id: &str, state: &str, attributes: Attributes) {
        let entity_id: EntityId = entity_id.parse().unwrap();
        self.states.set(entity_id, state, attributes, Context::new());
    }

    fn cover(&self) -> State {
        self.states.get(COVER).expect("template cover state")
    }

    async fn call_cover(&self, service: &str, data: Value) {
        self.call_cover_with_context(service, data, Context::new())
            .await;
    }

    async fn call_cover_with_context(&self, service: &str, data: Value, context: Context) {
        self.services
            .call("cover", service, data, context)
            .await
            .unwrap();
    }

    fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

fn position_attrs(position: Value) -> Attributes {
    HashMap::from([("position".to_string(), position)])
}

#[tokio::test]
async fn test_template_state_text() {
    let hub = Hub::new();
    let outcome = hub
        .setup_cover(&format!(
            "    value_template: \"{{{{ states.cover.test_state.state }}}}\"\n{}",
            DEFAULT_ACTIONS
        ))
        .await;
    assert_eq!(outcome.created, vec![COVER]);

    hub.set("cover.test_state", "open", HashMap::new());
    wait_until(|| hub.cover().state == "open").await;

    hub.set("cover.test_state", "closed", HashMap::new());
    wait_until(|| hub.cover().state == "closed").await;
}

#[tokio::test]
async fn test_template_state_boolean() {
    let hub = Hub::new();
    hub.setup_cover(&format!("    value_template: \"{{{{ 1 == 1 }}}}\"\n{}", DEFAULT_ACTIONS))
        .await;

    assert_eq!(hub.cover().state, "open");
}

#[tokio::test]
async fn test_template_state_unrecognised_value() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        "    value_template: \"{{{{ states.cover.test_state.state }}}}\"\n{}",
        DEFAULT_ACTIONS
    ))
    .await;
    assert_eq!(hub.cover().state, "unknown");

    hub.set("cover.test_state", "on", HashMap::new());
    wait_until(|| hub.cover().state == "open").await;

    hub.set("cover.test_state", "opening", HashMap::new());
    wait_until(|| hub.cover().state == "unknown").await;
}

#[tokio::test]
async fn test_template_position() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        "    position_template: \"{{{{ states.cover.test.attributes.position }}}}\"\n{}",
        DEFAULT_ACTIONS
    ))
    .await;

    hub.set("cover.test", "closed", HashMap::new());
    wait_until(|| hub.cover().state == "unknown").await;

    hub.set("cover.test", "closed", position_attrs(json!(42)));
    wait_until(|| hub.cover().attribute::<f64>("current_position") == Some(42.0)).await;
    assert_eq!(hub.cover().state, "open");

    hub.set("cover.test", "open", position_attrs(json!(0.0)));
    wait_until(|| hub.cover().attribute::<f64>("current_position") == Some(0.0)).await;
    assert_eq!(hub.cover().state, "closed");
}

#[tokio::test]
async fn test_template_tilt() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        "    value_template: \"{{{{ 1 == 1 }}}}\"\n    tilt_template: \"{{{{ 42 }}}}\"\n{}",
        DEFAULT_ACTIONS
    ))
    .await;

    assert_eq!(
        hub.cover().attribute::<f64>("current_tilt_position"),
        Some(42.0)
    );
}

#[tokio::test]
async fn test_template_out_of_bounds() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        "    position_template: \"{{{{ -1 }}}}\"\n    tilt_template: \"{{{{ 110 }}}}\"\n{}",
        DEFAULT_ACTIONS
    ))
    .await;

    let state = hub.cover();
    assert!(state.attributes.get("current_tilt_position").is_none());
    assert!(state.attributes.get("current_position").is_none());
    assert_eq!(state.state, "unknown");
}

#[tokio::test]
async fn test_template_mutex() {
    let hub = Hub::new();
    let outcome = hub
        .setup_cover(&format!(
            concat!(
                "    value_template: \"{{{{ 1 == 1 }}}}\"\n",
                "    position_template: \"{{{{ 42 }}}}\"\n",
                "    icon_template: \"{{% if states.cover.test_state.state %}}mdi:check{{% endif %}}\"\n",
                "{}"
            ),
            DEFAULT_ACTIONS
        ))
        .await;

    assert!(!outcome.is_success());
    assert!(matches!(
        outcome.errors[0].1,
        CoverConfigError::ConflictingStateTemplates { .. }
    ));
    assert!(outcome.created.is_empty());
    assert!(hub.states.all().is_empty());
}

#[tokio::test]
async fn test_invalid_definition_does_not_block_others() {
    let hub = Hub::new();
    let outcome = hub
        .setup_entry(
            r#"
platform: template
covers:
  broken:
    value_template: "{{ 1 == 1 }}"
    position_template: "{{ 42 }}"
  garage:
    position_template: "{{ 100 }}"
"#,
        )
        .await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.created, vec!["cover.garage"]);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(hub.states.get_state("cover.garage").as_deref(), Some("open"));
}


#[tokio::test]
async fn test_duplicate_cover_reported() {
    let hub = Hub::new();
    let definition = format!("    position_template: \"{{{{ 100 }}}}\"\n{}", DEFAULT_ACTIONS);

    let first = hub.setup_cover(&definition).await;
    assert!(first.is_success());

    let second = hub.setup_cover(&definition).await;
    assert!(!second.is_success());
    assert!(second.created.is_empty());
    assert_eq!(second.errors.len(), 1);
    assert_eq!(second.errors[0].0, "test_template_cover");
    assert!(matches!(
        second.errors[0].1,
        CoverConfigError::DuplicateEntityId { .. }
    ));
    assert_eq!(hub.platform.len(), 1);
    assert_eq!(hub.cover().state, "open");
}

#[tokio::test]
async fn test_template_position_or_value() {
    let hub = Hub::new();
    let outcome = hub
        .setup_cover(&format!(
            "    icon_template: \"{{% if states.cover.test_state.state %}}mdi:check{{% endif %}}\"\n{}",
            DEFAULT_ACTIONS
        ))
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.skipped, vec!["test_template_cover"]);
    assert!(hub.states.all().is_empty());
}

#[tokio::test]
async fn test_invalid_template_rejected() {
    let hub = Hub::new();
    let outcome = hub
        .setup_cover("    position_template: \"{{ states.cover.test\"\n")
        .await;

    assert!(matches!(
        outcome.errors[0].1,
        CoverConfigError::InvalidTemplate { .. }
    ));
    assert!(hub.states.all().is_empty());
}

#[tokio::test]
async fn test_template_non_numeric() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        concat!(
            "    position_template: \"{{{{ on }}}}\"\n",
            "    tilt_template: \"{{% if states.cover.test_state.state %}}on{{% else %}}off{{% endif %}}\"\n",
            "{}"
        ),
        DEFAULT_ACTIONS
    ))
    .await;

    let state = hub.cover();
    assert!(state.attributes.get("current_tilt_position").is_none());
    assert!(state.attributes.get("current_position").is_none());
}


#[tokio::test]
async fn test_render_error_resets_values() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        concat!(
            "    position_template: \"{{{{ states('sensor.level') | float }}}}\"\n",
            "    tilt_template: \"{{{{ states('sensor.level') | float }}}}\"\n",
            "    icon_template: \"mdi:{{{{ states('sensor.level') | float }}}}\"\n",
            "{}"
        ),
        DEFAULT_ACTIONS
    ))
    .await;

    hub.set("sensor.level", "50", HashMap::new());
    wait_until(|| hub.cover().state == "open").await;
    let state = hub.cover();
    assert_eq!(state.attribute::<f64>("current_position"), Some(50.0));
    assert_eq!(state.attribute::<f64>("current_tilt_position"), Some(50.0));
    assert_eq!(state.attribute::<String>("icon").as_deref(), Some("mdi:50.0"));

    // `float` without a default fails on a non-numeric state
    hub.set("sensor.level", "n/a", HashMap::new());
    wait_until(|| hub.cover().state == "unknown").await;
    let state = hub.cover();
    assert!(state.attributes.get("current_position").is_none());
    assert!(state.attributes.get("current_tilt_position").is_none());
    assert!(state.attributes.get("icon").is_none());
}

#[tokio::test]
async fn test_open_action() {
    let hub = Hub::new();
    hub.setup_cover(
        r#"    position_template: "{{ 0 }}"
    open_cover:
      service: test.automation
    close_cover:
      service: cover.close_cover
      entity_id: cover.test_state
"#,
    )
    .await;
    assert_eq!(hub.cover().state, "closed");

    hub.call_cover("open_cover", json!({"entity_id": COVER}))
        .await;

    assert_eq!(hub.calls().len(), 1);
    // commands do not change the reported state
    assert_eq!(hub.cover().state, "closed");
}


#[tokio::test]
async fn test_action_context_links_to_command() {
    let hub = Hub::new();
    hub.setup_cover(
        r#"    position_template: "{{ 0 }}"
    open_cover:
      service: test.automation
    close_cover:
      service: cover.close_cover
      entity_id: cover.test_state
"#,
    )
    .await;

    let context = Context::new();
    hub.call_cover_with_context("open_cover", json!({"entity_id": COVER}), context.clone())
        .await;

    let calls = hub.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].context.parent_id.as_deref(), Some(context.id.as_str()));
    assert_ne!(calls[0].context.id, context.id);
}

#[tokio::test]
async fn test_close_stop_action() {
    let hub = Hub::new();
    hub.setup_cover(
        r#"    position_template: "{{ 100 }}"
    open_cover:
      service: cover.open_cover
      entity_id: cover.test_state
    close_cover:
      service: test.automation
    stop_cover:
      service: test.automation
"#,
    )
    .await;
    assert_eq!(hub.cover().state, "open");

    hub.call_cover("close_cover", json!({"entity_id": COVER}))
        .await;
    hub.call_cover("stop_cover", json!({"entity_id": COVER}))
        .await;

    assert_eq!(hub.calls().len(), 2);
}

#[tokio::test]
async fn test_command_without_binding_is_noop() {
    let hub = Hub::new();
    hub.setup_cover("    position_template: \"{{ 100 }}\"\n").await;

    for service in ["open_cover", "close_cover", "stop_cover", "open_cover_tilt"] {
        hub.call_cover(service, json!({"entity_id": COVER})).await;
    }
    hub.call_cover("set_cover_position", json!({"entity_id": COVER, "position": 42}))
        .await;

    assert!(hub.calls().is_empty());
    assert_eq!(hub.cover().attribute::<u32>("supported_features"), Some(0));
}

#[tokio::test]
async fn test_set_position() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        "    position_template: \"{{{{ 100 }}}}\"\n{}    set_cover_position:\n      service: test.automation\n",
        DEFAULT_ACTIONS
    ))
    .await;
    assert_eq!(hub.cover().state, "open");

    hub.call_cover("set_cover_position", json!({"entity_id": COVER, "position": 42}))
        .await;

    let calls = hub.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].get::<u8>("position"), Some(42));
}

#[tokio::test]
async fn test_set_position_data_template() {
    let hub = Hub::new();
    hub.setup_cover(
        r#"    position_template: "{{ 100 }}"
    set_cover_position:
      service: test.automation
      entity_id: switch.motor
      data_template:
        percent: "{{ position * 2 }}"
"#,
    )
    .await;

    hub.call_cover("set_cover_position", json!({"entity_id": COVER, "position": 21}))
        .await;

    let calls = hub.calls();
    assert_eq!(
        calls[0].service_data,
        json!({"entity_id": "switch.motor", "percent": 42, "position": 21})
    );
}

const TILT_BINDING: &str = r#"    position_template: "{{ 100 }}"
    set_cover_tilt_position:
      service: test.automation
"#;

#[tokio::test]
async fn test_set_tilt_position() {
    let hub = Hub::new();
    hub.setup_cover(TILT_BINDING).await;

    hub.call_cover(
        "set_cover_tilt_position",
        json!({"entity_id": COVER, "tilt_position": 42}),
    )
    .await;

    let calls = hub.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].get::<u8>("tilt"), Some(42));
}

#[tokio::test]
async fn test_open_tilt_action() {
    let hub = Hub::new();
    hub.setup_cover(TILT_BINDING).await;

    hub.call_cover("open_cover_tilt", json!({"entity_id": COVER}))
        .await;

    let calls = hub.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].get::<u8>("tilt"), Some(100));
}

#[tokio::test]
async fn test_close_tilt_action() {
    let hub = Hub::new();
    hub.setup_cover(TILT_BINDING).await;

    hub.call_cover("close_cover_tilt", json!({"entity_id": COVER}))
        .await;

    let calls = hub.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].get::<u8>("tilt"), Some(0));
}

#[tokio::test]
async fn test_icon_template() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        concat!(
            "    value_template: \"{{{{ states.cover.test_state.state }}}}\"\n",
            "    icon_template: \"{{% if states.cover.test_state.state %}}mdi:check{{% endif %}}\"\n",
            "{}"
        ),
        DEFAULT_ACTIONS
    ))
    .await;

    assert_eq!(hub.cover().attribute::<String>("icon").as_deref(), Some(""));

    hub.set("cover.test_state", "open", HashMap::new());
    wait_until(|| hub.cover().attribute::<String>("icon").as_deref() == Some("mdi:check")).await;
}

#[tokio::test]
async fn test_friendly_name_and_supported_features() {
    let hub = Hub::new();
    hub.setup_cover(&format!(
        "    friendly_name: Garage door\n    value_template: \"{{{{ 1 == 1 }}}}\"\n{}{}",
        DEFAULT_ACTIONS,
        "    set_cover_tilt_position:\n      service: test.automation\n"
    ))
    .await;

    let state = hub.cover();
    assert_eq!(
        state.attribute::<String>("friendly_name").as_deref(),
        Some("Garage door")
    );
    assert_eq!(
        state.attribute::<u32>("supported_features"),
        Some(
            features::OPEN
                | features::CLOSE
                | features::STOP
                | features::OPEN_TILT
                | features::CLOSE_TILT
                | features::SET_TILT_POSITION
        )
    );
}

#[tokio::test]
async fn test_target_all() {
    let hub = Hub::new();
    hub.setup_entry(
        r#"
platform: template
covers:
  left:
    position_template: "{{ 0 }}"
    open_cover:
      service: test.automation
  right:
    position_template: "{{ 0 }}"
    open_cover:
      service: test.automation
"#,
    )
    .await;

    hub.call_cover("open_cover", json!({"entity_id": "all"})).await;
    assert_eq!(hub.calls().len(), 2);

    hub.call_cover("open_cover", json!({"entity_id": ["cover.left", "cover.nope"]}))
        .await;
    assert_eq!(hub.calls().len(), 3);
}

#[tokio::test]
async fn test_cover_following_another_template_cover() {
    let hub = Hub::new();
    hub.setup_entry(
        r#"
platform: template
covers:
  leader:
    value_template: "{{ states('sensor.door') }}"
  follower:
    value_template: "{{ is_state('cover.leader', 'open') }}"
"#,
    )
    .await;
    assert_eq!(hub.states.get_state("cover.follower").as_deref(), Some("closed"));

    hub.set("sensor.door", "open", HashMap::new());
    wait_until(|| hub.states.get_state("cover.follower").as_deref() == Some("open")).await;
}

#[tokio::test]
async fn test_shutdown_removes_covers() {
    let hub = Hub::new();
    hub.setup_cover("    value_template: \"{{ states('cover.test_state') }}\"\n")
        .await;
    assert_eq!(hub.platform.len(), 1);

    hub.platform.shutdown().await;

    assert!(hub.platform.is_empty());
    assert!(hub.states.get(COVER).is_none());

    hub.set("cover.test_state", "open", HashMap::new());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(hub.states.get(COVER).is_none());
}

#[tokio::test]
async fn test_setup_from_configuration_files() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("configuration.yaml"),
        "cover: !include covers.yaml\ncover garage:\n  platform: other\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("covers.yaml"),
        r#"
- platform: template
  covers:
    patio:
      friendly_name: !secret patio_name
      position_template: "{{ state_attr('sensor.patio', 'level') }}"
"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("secrets.yaml"), "patio_name: Patio blind\n").unwrap();

    let config = ha_config::load_yaml(dir.path(), "configuration.yaml").unwrap();
    let hub = Hub::new();
    let outcomes = hub.platform.setup_from_config(&config).await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(SetupOutcome::is_success));
    assert_eq!(hub.platform.entity_ids(), vec!["cover.patio"]);

    hub.set(
        "sensor.patio",
        "ok",
        HashMap::from([("level".to_string(), json!(30))]),
    );
    wait_until(|| hub.states.get_state("cover.patio").as_deref() == Some("open")).await;
    let state = hub.states.get("cover.patio").unwrap();
    assert_eq!(state.attribute::<f64>("current_position"), Some(30.0));
    assert_eq!(
        state.attribute::<String>("friendly_name").as_deref(),
        Some("Patio blind")
    );
}
