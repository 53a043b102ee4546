//! Configuration errors of the template cover platform

use ha_core::EntityIdError;
use ha_template::TemplateError;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, CoverConfigError>;

/// Reasons a cover definition is rejected at setup
#[derive(Debug, Error)]
pub enum CoverConfigError {
    #[error("invalid template cover platform config: {0}")]
    InvalidPlatformConfig(#[from] serde_yaml::Error),

    #[error("cover '{object_id}': value_template and position_template cannot both be set")]
    ConflictingStateTemplates { object_id: String },

    #[error("invalid cover id '{object_id}': {source}")]
    InvalidObjectId {
        object_id: String,
        #[source]
        source: EntityIdError,
    },

    #[error("cover {entity_id} is already set up")]
    DuplicateEntityId { entity_id: String },

    #[error("invalid service '{service}', expected 'domain.service'")]
    InvalidService { service: String },

    #[error("invalid {field}: {source}")]
    InvalidTemplate {
        field: String,
        #[source]
        source: TemplateError,
    },
}
