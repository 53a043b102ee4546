//! Setting up template covers from configuration

use crate::config::{TemplateCoverPlatformConfig, PLATFORM};
use crate::cover::TemplateCover;
use crate::error::CoverConfigError;
use crate::host::CoverHost;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Result of setting up one platform entry
#[derive(Debug, Default)]
pub struct SetupOutcome {
    /// Entity ids of the covers created
    pub created: Vec<String>,
    /// Definitions rejected as invalid, by object id
    pub errors: Vec<(String, CoverConfigError)>,
    /// Definitions with no state or position template
    pub skipped: Vec<String>,
}

impl SetupOutcome {
    /// Setup fails if any definition was invalid, even when others were created
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// All template covers of the hub
pub struct CoverPlatform {
    host: CoverHost,
    covers: DashMap<String, Arc<TemplateCover>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoverPlatform {
    pub fn new(host: CoverHost) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            host,
            covers: DashMap::new(),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Create, publish and start tracking every definition of an entry
    pub async fn setup(&self, config: &TemplateCoverPlatformConfig) -> SetupOutcome {
        let mut outcome = SetupOutcome::default();

        for (object_id, cover_config) in &config.covers {
            let cover = match TemplateCover::from_config(object_id, cover_config, self.host.clone())
            {
                Ok(Some(cover)) => Arc::new(cover),
                Ok(None) => {
                    error!(
                        "Cover '{}' has neither value_template nor position_template, skipping",
                        object_id
                    );
                    outcome.skipped.push(object_id.clone());
                    continue;
                }
                Err(e) => {
                    error!("Invalid template cover '{}': {}", object_id, e);
                    outcome.errors.push((object_id.clone(), e));
                    continue;
                }
            };

            let entity_id = cover.entity_id().to_string();
            if self.covers.contains_key(&entity_id) {
                let e = CoverConfigError::DuplicateEntityId { entity_id };
                error!("Invalid template cover '{}': {}", object_id, e);
                outcome.errors.push((object_id.clone(), e));
                continue;
            }

            let task = cover.start(self.shutdown_tx.subscribe()).await;
            self.tasks.lock().await.push(task);
            self.covers.insert(entity_id.clone(), cover);
            outcome.created.push(entity_id);
        }

        info!("Set up {} template covers", outcome.created.len());
        outcome
    }

    /// Set up from one raw `cover:` entry
    ///
    /// Entries for other platforms yield an empty outcome.
    pub async fn setup_entry(
        &self,
        entry: &serde_yaml::Value,
    ) -> Result<SetupOutcome, CoverConfigError> {
        if entry.get("platform").and_then(|p| p.as_str()) != Some(PLATFORM) {
            return Ok(SetupOutcome::default());
        }
        let config: TemplateCoverPlatformConfig = serde_yaml::from_value(entry.clone())?;
        Ok(self.setup(&config).await)
    }

    /// Set up every template entry of the `cover` sections of a full config
    pub async fn setup_from_config(&self, config: &ha_config::Value) -> Vec<SetupOutcome> {
        let mut outcomes = Vec::new();
        for entry in ha_config::platform_configs(config, crate::cover::DOMAIN) {
            match self.setup_entry(&entry).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("{}", e);
                    outcomes.push(SetupOutcome {
                        errors: vec![(String::new(), e)],
                        ..Default::default()
                    });
                }
            }
        }
        outcomes
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<TemplateCover>> {
        self.covers.get(entity_id).map(|c| c.clone())
    }

    /// Entity ids of all covers, sorted
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.covers.iter().map(|c| c.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn covers(&self) -> Vec<Arc<TemplateCover>> {
        self.entity_ids()
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.covers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covers.is_empty()
    }

    /// Stop tracking and remove every cover from the state store
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        for task in self.tasks.lock().await.drain(..) {
            if let Err(e) = task.await {
                warn!("Template cover task failed: {}", e);
            }
        }

        for cover in self.covers() {
            cover.remove();
        }
        self.covers.clear();
        info!("Template covers stopped");
    }
}
