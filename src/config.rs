use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::events::DEFAULT_EVENT_CAPACITY;

pub const DEFAULT_DATABASE_PATH: &str = "planner.sqlite";
pub const DEFAULT_CATALOG_PATH: &str = "catalog.jsonl";
pub const DEFAULT_LOG_FILTER: &str = "servant_planner_lib=info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PlannerConfig {
    #[validate(length(min = 1))]
    pub database_path: String,
    #[validate(length(min = 1))]
    pub catalog_path: String,
    #[validate(length(min = 1))]
    pub log_filter: String,
    #[validate(range(min = 1, max = 4096))]
    pub event_capacity: usize,
    /// Default for `ComputeOptions::exclude_lores`.
    pub exclude_lores: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            catalog_path: DEFAULT_CATALOG_PATH.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            exclude_lores: false,
        }
    }
}

impl PlannerConfig {
    /// Reads `PLANNER_*` variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let event_capacity = match lookup("PLANNER_EVENT_CAPACITY") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("PLANNER_EVENT_CAPACITY is not a number: {}", value))?,
            None => defaults.event_capacity,
        };
        let exclude_lores = match lookup("PLANNER_EXCLUDE_LORES") {
            Some(value) => parse_flag(&value)
                .with_context(|| format!("PLANNER_EXCLUDE_LORES is not a boolean: {}", value))?,
            None => defaults.exclude_lores,
        };

        let config = Self {
            database_path: lookup("PLANNER_DATABASE_PATH").unwrap_or(defaults.database_path),
            catalog_path: lookup("PLANNER_CATALOG_PATH").unwrap_or(defaults.catalog_path),
            log_filter: lookup("PLANNER_LOG").unwrap_or(defaults.log_filter),
            event_capacity,
            exclude_lores,
        };

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid planner configuration: {}", e))?;

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
    }

    pub fn catalog_path(&self) -> PathBuf {
        PathBuf::from(&self.catalog_path)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
