//! YAML configuration of the template cover platform
//!
//! ```yaml
//! cover:
//!   - platform: template
//!     covers:
//!       garage_door:
//!         friendly_name: Garage door
//!         position_template: "{{ state_attr('sensor.garage', 'position') }}"
//!         open_cover:
//!           service: switch.turn_on
//!           entity_id: switch.garage_open
//!         set_cover_position:
//!           service: script.garage_to
//!           data_template:
//!             target: "{{ position }}"
//! ```

use crate::error::{ConfigResult, CoverConfigError};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Platform name under which covers are configured
pub const PLATFORM: &str = "template";

fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(vec![s]),
        StringOrVec::Vec(v) => Ok(v),
    }
}

/// One `platform: template` entry of the `cover` section
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateCoverPlatformConfig {
    pub platform: String,
    /// Cover definitions keyed by object id
    #[serde(default)]
    pub covers: BTreeMap<String, CoverConfig>,
}

/// Definition of a single template cover
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoverConfig {
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub value_template: Option<String>,
    #[serde(default)]
    pub position_template: Option<String>,
    #[serde(default)]
    pub tilt_template: Option<String>,
    #[serde(default)]
    pub icon_template: Option<String>,
    /// Entities whose changes trigger re-evaluation; extracted from the
    /// templates when empty
    #[serde(default, deserialize_with = "string_or_vec")]
    pub entity_id: Vec<String>,
    #[serde(default)]
    pub open_cover: Option<ActionConfig>,
    #[serde(default)]
    pub close_cover: Option<ActionConfig>,
    #[serde(default)]
    pub stop_cover: Option<ActionConfig>,
    #[serde(default)]
    pub set_cover_position: Option<ActionConfig>,
    #[serde(default)]
    pub set_cover_tilt_position: Option<ActionConfig>,
}

/// Where a cover's open/closed state comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateSource {
    Value(String),
    Position(String),
}

impl CoverConfig {
    /// The template deciding the cover's state
    ///
    /// `Ok(None)` when neither `value_template` nor `position_template`
    /// is configured.
    pub fn state_source(&self, object_id: &str) -> ConfigResult<Option<StateSource>> {
        match (&self.value_template, &self.position_template) {
            (Some(_), Some(_)) => Err(CoverConfigError::ConflictingStateTemplates {
                object_id: object_id.to_string(),
            }),
            (Some(value), None) => Ok(Some(StateSource::Value(value.clone()))),
            (None, Some(position)) => Ok(Some(StateSource::Position(position.clone()))),
            (None, None) => Ok(None),
        }
    }

    /// Every configured template with the key it was configured under
    pub fn templates(&self) -> Vec<(&'static str, &str)> {
        [
            ("value_template", &self.value_template),
            ("position_template", &self.position_template),
            ("tilt_template", &self.tilt_template),
            ("icon_template", &self.icon_template),
        ]
        .into_iter()
        .filter_map(|(field, template)| template.as_deref().map(|t| (field, t)))
        .collect()
    }
}

/// A command binding: one service call or a sequence of them
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ActionConfig {
    Single(ServiceActionConfig),
    Sequence(Vec<ServiceActionConfig>),
}

impl ActionConfig {
    pub fn calls(&self) -> &[ServiceActionConfig] {
        match self {
            ActionConfig::Single(call) => std::slice::from_ref(call),
            ActionConfig::Sequence(calls) => calls,
        }
    }
}

/// A declarative service call
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceActionConfig {
    /// `domain.service`
    pub service: String,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub entity_id: Vec<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Values rendered as templates when the action runs
    #[serde(default)]
    pub data_template: Map<String, Value>,
}

impl ServiceActionConfig {
    /// Split `service` into domain and service name
    pub fn service_parts(&self) -> ConfigResult<(&str, &str)> {
        match self.service.split_once('.') {
            Some((domain, service)) if !domain.is_empty() && !service.is_empty() => {
                Ok((domain, service))
            }
            _ => Err(CoverConfigError::InvalidService {
                service: self.service.clone(),
            }),
        }
    }
}
