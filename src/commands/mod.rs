//! View-facing entry points. Every command reports failures as a display
//! string.

use std::sync::Arc;

use anyhow::{Context, Result};
use validator::Validate;

use crate::catalog::{load_catalog, Catalog};
use crate::config::PlannerConfig;
use crate::db;
use crate::events::EventBus;
use crate::planner::ComputeOptions;

pub mod plans;
pub mod servants;

#[derive(Clone)]
pub struct AppState {
    pub pool: db::Pool,
    pub catalog: Arc<Catalog>,
    pub events: Arc<EventBus>,
    /// Used when a command is called without explicit options.
    pub default_options: ComputeOptions,
}

impl AppState {
    /// Installs logging, opens the database and loads the catalog.
    pub async fn init(config: &PlannerConfig) -> Result<Self> {
        crate::logging::init(&config.log_filter);
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid planner configuration: {}", e))?;

        let pool = db::init_db(&config.database_path()).await?;
        let catalog = load_catalog(&config.catalog_path())
            .await
            .context("failed to load catalog")?;

        Ok(Self {
            pool,
            catalog: Arc::new(catalog),
            events: Arc::new(EventBus::new(config.event_capacity)),
            default_options: ComputeOptions {
                exclude_lores: config.exclude_lores,
                ..ComputeOptions::default()
            },
        })
    }

    pub fn store(&self) -> db::SqliteStore {
        db::SqliteStore::new(self.pool.clone())
    }

    pub(crate) fn options(&self, options: Option<ComputeOptions>) -> ComputeOptions {
        options.unwrap_or(self.default_options)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testdata::{fixtures, TestDb};

    pub fn app_state(db: &TestDb) -> AppState {
        AppState {
            pool: db.pool.clone(),
            catalog: fixtures::catalog(),
            events: Arc::new(EventBus::default()),
            default_options: ComputeOptions::default(),
        }
    }
}
