//! Home Assistant Rust Server
//!
//! Loads `configuration.yaml`, sets up the template cover platform and runs
//! until interrupted.
//!
//! The configuration directory is the first argument, else `HA_CONFIG_DIR`,
//! else `./config`.

use anyhow::{Context as _, Result};
use ha_event_bus::EventBus;
use ha_service_registry::ServiceRegistry;
use ha_state_machine::StateMachine;
use ha_template::TemplateEngine;
use ha_template_cover::{register_cover_services, CoverHost, CoverPlatform};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "configuration.yaml";

/// The central Home Assistant instance
pub struct HomeAssistant {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateMachine>,
    pub services: Arc<ServiceRegistry>,
    pub templates: Arc<TemplateEngine>,
}

impl HomeAssistant {
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateMachine::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());
        let templates = Arc::new(TemplateEngine::new(states.clone()));

        Self {
            bus,
            states,
            services,
            templates,
        }
    }
}

impl Default for HomeAssistant {
    fn default() -> Self {
        Self::new()
    }
}

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HA_CONFIG_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Home Assistant (Rust) v{}", env!("CARGO_PKG_VERSION"));

    let config_dir = config_dir();
    let config = ha_config::load_yaml(&config_dir, CONFIG_FILE)
        .with_context(|| format!("loading {} from {}", CONFIG_FILE, config_dir.display()))?;

    let hass = HomeAssistant::new();

    let host = CoverHost::from_hub(
        hass.states.clone(),
        hass.templates.clone(),
        hass.services.clone(),
    );
    let covers = Arc::new(CoverPlatform::new(host));
    register_cover_services(&hass.services, covers.clone());

    for outcome in covers.setup_from_config(&config).await {
        if !outcome.is_success() {
            for (object_id, e) in &outcome.errors {
                error!("Template cover '{}' not created: {}", object_id, e);
            }
        }
    }
    if covers.is_empty() {
        warn!("No template covers configured");
    }

    info!(
        "Home Assistant is running with {} template covers",
        covers.len()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    covers.shutdown().await;

    Ok(())
}
