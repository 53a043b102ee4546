//! Command bindings resolved into dispatchable service calls

use crate::config::{ActionConfig, ServiceActionConfig};
use crate::error::{ConfigResult, CoverConfigError};
use crate::host::CoverHost;
use ha_core::Context;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A validated service call of an action
#[derive(Debug, Clone)]
struct ServiceStep {
    domain: String,
    service: String,
    entity_id: Vec<String>,
    data: Map<String, Value>,
    data_template: Map<String, Value>,
}

impl ServiceStep {
    fn from_config(config: &ServiceActionConfig, host: &CoverHost) -> ConfigResult<Self> {
        let (domain, service) = config.service_parts()?;

        for (key, value) in &config.data_template {
            if let Value::String(template) = value {
                host.evaluator
                    .compile(template)
                    .map_err(|source| CoverConfigError::InvalidTemplate {
                        field: format!("data_template.{}", key),
                        source,
                    })?;
            }
        }

        Ok(Self {
            domain: domain.to_string(),
            service: service.to_string(),
            entity_id: config.entity_id.clone(),
            data: config.data.clone(),
            data_template: config.data_template.clone(),
        })
    }

    /// Service data for one invocation
    ///
    /// `variables` are visible to `data_template` and fill any key the
    /// action does not set itself. Returns `None` if a template fails.
    fn service_data(&self, variables: &Map<String, Value>, host: &CoverHost) -> Option<Value> {
        let mut data = self.data.clone();

        match self.entity_id.as_slice() {
            [] => {}
            [single] => {
                data.insert("entity_id".to_string(), Value::String(single.clone()));
            }
            many => {
                data.insert("entity_id".to_string(), Value::from(many.to_vec()));
            }
        }

        for (key, value) in &self.data_template {
            let rendered = match value {
                Value::String(template) => match host.evaluator.render(template, variables) {
                    // numbers and booleans keep their type
                    Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                    Err(e) => {
                        warn!(
                            service = %format!("{}.{}", self.domain, self.service),
                            "Failed to render data_template.{}: {}", key, e
                        );
                        return None;
                    }
                },
                other => other.clone(),
            };
            data.insert(key.clone(), rendered);
        }

        for (key, value) in variables {
            data.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Some(Value::Object(data))
    }
}

/// Ordered service calls bound to a cover command
#[derive(Debug, Clone)]
pub struct Action {
    steps: Vec<ServiceStep>,
}

impl Action {
    pub fn from_config(config: &ActionConfig, host: &CoverHost) -> ConfigResult<Self> {
        let steps = config
            .calls()
            .iter()
            .map(|call| ServiceStep::from_config(call, host))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { steps })
    }

    /// Dispatch every call in order, waiting for each to complete
    pub async fn run(&self, variables: Map<String, Value>, context: Context, host: &CoverHost) {
        for step in &self.steps {
            let Some(data) = step.service_data(&variables, host) else {
                continue;
            };
            debug!(domain = %step.domain, service = %step.service, "Running cover action");
            host.dispatcher
                .dispatch(&step.domain, &step.service, data, context.clone())
                .await;
        }
    }
}
