//! `cover` domain services routed to template covers

use crate::cover::{TemplateCover, DOMAIN};
use crate::platform::CoverPlatform;
use ha_core::{Context, ServiceCall};
use ha_service_registry::{ServiceError, ServiceRegistry};
use std::sync::Arc;
use tracing::{debug, info};

pub const SERVICE_OPEN_COVER: &str = "open_cover";
pub const SERVICE_CLOSE_COVER: &str = "close_cover";
pub const SERVICE_STOP_COVER: &str = "stop_cover";
pub const SERVICE_SET_COVER_POSITION: &str = "set_cover_position";
pub const SERVICE_SET_COVER_TILT_POSITION: &str = "set_cover_tilt_position";
pub const SERVICE_OPEN_COVER_TILT: &str = "open_cover_tilt";
pub const SERVICE_CLOSE_COVER_TILT: &str = "close_cover_tilt";

pub const ATTR_POSITION: &str = "position";
pub const ATTR_TILT_POSITION: &str = "tilt_position";

const SERVICES: [&str; 7] = [
    SERVICE_OPEN_COVER,
    SERVICE_CLOSE_COVER,
    SERVICE_STOP_COVER,
    SERVICE_SET_COVER_POSITION,
    SERVICE_SET_COVER_TILT_POSITION,
    SERVICE_OPEN_COVER_TILT,
    SERVICE_CLOSE_COVER_TILT,
];

/// A cover command decoded from a service call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Open,
    Close,
    Stop,
    SetPosition(u8),
    SetTiltPosition(u8),
    OpenTilt,
    CloseTilt,
}

impl Command {
    fn from_call(call: &ServiceCall) -> Result<Self, ServiceError> {
        Ok(match call.service.as_str() {
            SERVICE_OPEN_COVER => Command::Open,
            SERVICE_CLOSE_COVER => Command::Close,
            SERVICE_STOP_COVER => Command::Stop,
            SERVICE_SET_COVER_POSITION => {
                Command::SetPosition(percentage_field(call, ATTR_POSITION)?)
            }
            SERVICE_SET_COVER_TILT_POSITION => {
                Command::SetTiltPosition(percentage_field(call, ATTR_TILT_POSITION)?)
            }
            SERVICE_OPEN_COVER_TILT => Command::OpenTilt,
            SERVICE_CLOSE_COVER_TILT => Command::CloseTilt,
            other => {
                return Err(ServiceError::NotFound {
                    domain: DOMAIN.to_string(),
                    service: other.to_string(),
                })
            }
        })
    }

    async fn apply(self, cover: &TemplateCover, context: Context) {
        match self {
            Command::Open => cover.open(context).await,
            Command::Close => cover.close(context).await,
            Command::Stop => cover.stop(context).await,
            Command::SetPosition(position) => cover.set_position(position, context).await,
            Command::SetTiltPosition(tilt) => cover.set_tilt_position(tilt, context).await,
            Command::OpenTilt => cover.open_tilt(context).await,
            Command::CloseTilt => cover.close_tilt(context).await,
        }
    }
}

/// A `0..=100` percentage field of the call data
fn percentage_field(call: &ServiceCall, key: &str) -> Result<u8, ServiceError> {
    call.get::<f64>(key)
        .filter(|n| (0.0..=100.0).contains(n))
        .map(|n| n.round() as u8)
        .ok_or_else(|| {
            ServiceError::InvalidData(format!("{} must be a number between 0 and 100", key))
        })
}

/// Template covers addressed by a call; unknown ids are ignored
fn target_covers(call: &ServiceCall, platform: &CoverPlatform) -> Vec<Arc<TemplateCover>> {
    if call.targets_all() {
        return platform.covers();
    }
    call.entity_ids()
        .iter()
        .filter_map(|entity_id| {
            let cover = platform.get(entity_id);
            if cover.is_none() {
                debug!(entity_id = %entity_id, "Not a template cover, ignoring");
            }
            cover
        })
        .collect()
}

/// Register the `cover` domain services for the platform's covers
pub fn register_cover_services(services: &ServiceRegistry, platform: Arc<CoverPlatform>) {
    for service in SERVICES {
        let platform = platform.clone();
        services.register(DOMAIN, service, move |call: ServiceCall| {
            let platform = platform.clone();
            async move {
                let command = Command::from_call(&call)?;
                for cover in target_covers(&call, &platform) {
                    command.apply(&cover, call.context.child()).await;
                }
                Ok::<(), ServiceError>(())
            }
        });
    }

    info!("Cover services registered");
}
