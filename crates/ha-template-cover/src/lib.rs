//! Template cover platform
//!
//! Covers whose state, position, tilt and icon are computed from templates
//! over other entities, and whose commands run configured service calls.
//!
//! ```ignore
//! let host = CoverHost::from_hub(states, engine, services.clone());
//! let platform = Arc::new(CoverPlatform::new(host));
//! platform.setup_from_config(&config).await;
//! register_cover_services(&services, platform.clone());
//! ```
//!
//! Each cover re-evaluates on its own task, in the order state changes were
//! fired. Commands never touch the cover's state; it only follows from the
//! templates once the commanded devices report back.

mod action;
mod config;
mod cover;
mod error;
mod host;
mod platform;
mod services;

pub use action::Action;
pub use config::{
    ActionConfig, CoverConfig, ServiceActionConfig, StateSource, TemplateCoverPlatformConfig,
    PLATFORM,
};
pub use cover::{
    features, CoverSnapshot, CoverState, TemplateCover, Tracking, ATTR_CURRENT_POSITION,
    ATTR_CURRENT_TILT_POSITION, ATTR_FRIENDLY_NAME, ATTR_ICON, ATTR_SUPPORTED_FEATURES, DOMAIN,
    STATE_CLOSED, STATE_OPEN,
};
pub use error::{ConfigResult, CoverConfigError};
pub use host::{ActionDispatcher, CoverHost, Evaluator, StateStore};
pub use platform::{CoverPlatform, SetupOutcome};
pub use services::{
    register_cover_services, ATTR_POSITION, ATTR_TILT_POSITION, SERVICE_CLOSE_COVER,
    SERVICE_CLOSE_COVER_TILT, SERVICE_OPEN_COVER, SERVICE_OPEN_COVER_TILT,
    SERVICE_SET_COVER_POSITION, SERVICE_SET_COVER_TILT_POSITION, SERVICE_STOP_COVER,
};
