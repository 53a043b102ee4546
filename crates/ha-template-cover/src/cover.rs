//! The template cover entity
//!
//! State, position, tilt and icon are computed from templates whenever a
//! tracked entity changes; commands are forwarded to the configured
//! actions. A cover never changes its own state in response to a command.

use crate::action::Action;
use crate::config::{ActionConfig, CoverConfig, StateSource};
use crate::error::{ConfigResult, CoverConfigError};
use crate::host::CoverHost;
use ha_core::events::StateChangedData;
use ha_core::{Attributes, Context, EntityId};
use ha_template::extract_entities;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

pub const DOMAIN: &str = "cover";

pub const STATE_OPEN: &str = "open";
pub const STATE_CLOSED: &str = "closed";

pub const ATTR_CURRENT_POSITION: &str = "current_position";
pub const ATTR_CURRENT_TILT_POSITION: &str = "current_tilt_position";
pub const ATTR_ICON: &str = "icon";
pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
pub const ATTR_SUPPORTED_FEATURES: &str = "supported_features";

/// Cover feature bits reported in `supported_features`
pub mod features {
    pub const OPEN: u32 = 1;
    pub const CLOSE: u32 = 2;
    pub const SET_POSITION: u32 = 4;
    pub const STOP: u32 = 8;
    pub const OPEN_TILT: u32 = 16;
    pub const CLOSE_TILT: u32 = 32;
    pub const SET_TILT_POSITION: u32 = 128;
}

/// Tilt sent for `open_cover_tilt` / `close_cover_tilt`
const TILT_OPEN: u8 = 100;
const TILT_CLOSED: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverState {
    Open,
    Closed,
    Unknown,
}

impl CoverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverState::Open => STATE_OPEN,
            CoverState::Closed => STATE_CLOSED,
            CoverState::Unknown => ha_core::STATE_UNKNOWN,
        }
    }

    /// Boolean-like reading of a rendered value template
    fn from_rendered(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "open" | "true" | "on" | "yes" | "1" => CoverState::Open,
            "closed" | "false" | "off" | "no" | "0" => CoverState::Closed,
            _ => CoverState::Unknown,
        }
    }
}

/// Everything a cover publishes, computed in one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct CoverSnapshot {
    pub state: CoverState,
    pub current_position: Option<f64>,
    pub current_tilt_position: Option<f64>,
    pub icon: Option<String>,
}

/// A rendered value in [0, 100], if it is one
fn percentage(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| (0.0..=100.0).contains(n))
}

/// Which state changes trigger re-evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Tracking {
    All,
    Entities(HashSet<String>),
}

impl Tracking {
    fn matches(&self, entity_id: &str) -> bool {
        match self {
            Tracking::All => true,
            Tracking::Entities(ids) => ids.contains(entity_id),
        }
    }
}

pub struct TemplateCover {
    entity_id: EntityId,
    friendly_name: Option<String>,
    state_source: StateSource,
    tilt_template: Option<String>,
    icon_template: Option<String>,
    open_action: Option<Action>,
    close_action: Option<Action>,
    stop_action: Option<Action>,
    position_action: Option<Action>,
    tilt_action: Option<Action>,
    tracking: Tracking,
    /// Last snapshot written to the state store
    published: Mutex<Option<CoverSnapshot>>,
    host: CoverHost,
}

impl TemplateCover {
    /// Validate a definition and build its cover
    ///
    /// `Ok(None)` when the definition has neither a value nor a position
    /// template, so there is nothing to derive the state from.
    pub fn from_config(
        object_id: &str,
        config: &CoverConfig,
        host: CoverHost,
    ) -> ConfigResult<Option<Self>> {
        let entity_id = EntityId::new(DOMAIN, object_id).map_err(|source| {
            CoverConfigError::InvalidObjectId {
                object_id: object_id.to_string(),
                source,
            }
        })?;

        let Some(state_source) = config.state_source(object_id)? else {
            return Ok(None);
        };

        for (field, template) in config.templates() {
            host.evaluator
                .compile(template)
                .map_err(|source| CoverConfigError::InvalidTemplate {
                    field: format!("{} of {}", field, entity_id),
                    source,
                })?;
        }

        let action = |config: &Option<ActionConfig>| {
            config
                .as_ref()
                .map(|c| Action::from_config(c, &host))
                .transpose()
        };
        let open_action = action(&config.open_cover)?;
        let close_action = action(&config.close_cover)?;
        let stop_action = action(&config.stop_cover)?;
        let position_action = action(&config.set_cover_position)?;
        let tilt_action = action(&config.set_cover_tilt_position)?;

        Ok(Some(Self {
            tracking: tracking_for(config),
            entity_id,
            friendly_name: config.friendly_name.clone(),
            state_source,
            tilt_template: config.tilt_template.clone(),
            icon_template: config.icon_template.clone(),
            open_action,
            close_action,
            stop_action,
            position_action,
            tilt_action,
            published: Mutex::new(None),
            host,
        }))
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    pub fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    pub fn supported_features(&self) -> u32 {
        let mut supported = 0;
        if self.open_action.is_some() {
            supported |= features::OPEN;
        }
        if self.close_action.is_some() {
            supported |= features::CLOSE;
        }
        if self.stop_action.is_some() {
            supported |= features::STOP;
        }
        if self.position_action.is_some() {
            supported |= features::SET_POSITION;
        }
        if self.tilt_action.is_some() {
            supported |= features::OPEN_TILT | features::CLOSE_TILT | features::SET_TILT_POSITION;
        }
        supported
    }

    fn render(&self, field: &str, template: &str) -> Option<String> {
        match self.host.evaluator.render(template, &Map::new()) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(entity_id = %self.entity_id, "Could not render {}: {}", field, e);
                None
            }
        }
    }

    /// Compute state, position, tilt and icon from the current hub state
    pub fn evaluate(&self) -> CoverSnapshot {
        let (state, current_position) = match &self.state_source {
            StateSource::Position(template) => {
                match self.render("position_template", template).as_deref().and_then(percentage) {
                    Some(position) if position > 0.0 => (CoverState::Open, Some(position)),
                    Some(position) => (CoverState::Closed, Some(position)),
                    None => (CoverState::Unknown, None),
                }
            }
            StateSource::Value(template) => {
                let state = self
                    .render("value_template", template)
                    .map(|text| CoverState::from_rendered(&text))
                    .unwrap_or(CoverState::Unknown);
                (state, None)
            }
        };

        let current_tilt_position = self
            .tilt_template
            .as_deref()
            .and_then(|t| self.render("tilt_template", t))
            .as_deref()
            .and_then(percentage);

        let icon = self
            .icon_template
            .as_deref()
            .and_then(|t| self.render("icon_template", t))
            .map(|icon| icon.trim().to_string());

        CoverSnapshot {
            state,
            current_position,
            current_tilt_position,
            icon,
        }
    }

    fn attributes(&self, snapshot: &CoverSnapshot) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(name) = &self.friendly_name {
            attributes.insert(ATTR_FRIENDLY_NAME.to_string(), json!(name));
        }
        attributes.insert(
            ATTR_SUPPORTED_FEATURES.to_string(),
            json!(self.supported_features()),
        );
        if let Some(position) = snapshot.current_position {
            attributes.insert(ATTR_CURRENT_POSITION.to_string(), json!(position));
        }
        if let Some(tilt) = snapshot.current_tilt_position {
            attributes.insert(ATTR_CURRENT_TILT_POSITION.to_string(), json!(tilt));
        }
        if let Some(icon) = &snapshot.icon {
            attributes.insert(ATTR_ICON.to_string(), json!(icon));
        }
        attributes
    }

    /// Re-evaluate and publish; returns whether anything was written
    ///
    /// A snapshot equal to the last published one is not written again.
    #[instrument(skip(self), fields(entity_id = %self.entity_id))]
    pub async fn refresh(&self) -> bool {
        let snapshot = self.evaluate();
        let mut published = self.published.lock().await;
        if published.as_ref() == Some(&snapshot) {
            trace!("Cover snapshot unchanged");
            return false;
        }

        debug!(state = snapshot.state.as_str(), "Publishing cover state");
        self.host.states.publish(
            &self.entity_id,
            snapshot.state.as_str(),
            self.attributes(&snapshot),
            Context::new(),
        );
        *published = Some(snapshot);
        true
    }

    fn is_relevant(&self, change: &StateChangedData) -> bool {
        change.entity_id != self.entity_id && self.tracking.matches(&change.entity_id.to_string())
    }

    /// Publish the initial state and follow tracked entities until shutdown
    ///
    /// The subscription is taken before the initial evaluation, so no change
    /// made after this returns can be missed.
    pub async fn start(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut changes = self.host.states.subscribe_state_changes();
        self.refresh().await;

        let cover = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = changes.recv() => match received {
                        Ok(event) => {
                            if cover.is_relevant(&event.data) {
                                cover.refresh().await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(entity_id = %cover.entity_id, "Cover lagged by {} state changes", n);
                            cover.refresh().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            debug!(entity_id = %cover.entity_id, "Cover stopped tracking");
        })
    }

    /// Drop the cover's state from the store
    pub fn remove(&self) {
        self.host.states.remove(&self.entity_id, Context::new());
    }

    async fn run(
        &self,
        command: &str,
        action: Option<&Action>,
        variables: Map<String, Value>,
        context: Context,
    ) {
        match action {
            Some(action) => {
                info!(entity_id = %self.entity_id, "Running {}", command);
                action.run(variables, context, &self.host).await;
            }
            None => debug!(entity_id = %self.entity_id, "No action for {}", command),
        }
    }

    /// Commands carry the caller's context into the service calls they make
    pub async fn open(&self, context: Context) {
        self.run("open_cover", self.open_action.as_ref(), Map::new(), context)
            .await;
    }

    pub async fn close(&self, context: Context) {
        self.run("close_cover", self.close_action.as_ref(), Map::new(), context)
            .await;
    }

    pub async fn stop(&self, context: Context) {
        self.run("stop_cover", self.stop_action.as_ref(), Map::new(), context)
            .await;
    }

    /// Ask for `position`, exposed to the action as `position`
    pub async fn set_position(&self, position: u8, context: Context) {
        let variables = variable("position", position);
        self.run(
            "set_cover_position",
            self.position_action.as_ref(),
            variables,
            context,
        )
        .await;
    }

    /// Ask for a tilt, exposed to the action as `tilt`
    pub async fn set_tilt_position(&self, tilt: u8, context: Context) {
        let variables = variable("tilt", tilt);
        self.run(
            "set_cover_tilt_position",
            self.tilt_action.as_ref(),
            variables,
            context,
        )
        .await;
    }

    pub async fn open_tilt(&self, context: Context) {
        self.set_tilt_position(TILT_OPEN, context).await;
    }

    pub async fn close_tilt(&self, context: Context) {
        self.set_tilt_position(TILT_CLOSED, context).await;
    }
}

fn variable(name: &str, value: u8) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert(name.to_string(), json!(value));
    variables
}

/// Entities to follow: the configured list, else what the templates read
///
/// Falls back to every entity when a template reads nothing recognisable.
fn tracking_for(config: &CoverConfig) -> Tracking {
    if !config.entity_id.is_empty() {
        return Tracking::Entities(config.entity_id.iter().cloned().collect());
    }

    let mut ids = HashSet::new();
    for (_, template) in config.templates() {
        let found = extract_entities(template);
        if found.is_empty() {
            return Tracking::All;
        }
        ids.extend(found);
    }
    Tracking::Entities(ids)
}
