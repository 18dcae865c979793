//! Enhancement planning for a servant roster: material requirements per
//! servant and per plan, chained plan totals, inventory deficits, plan
//! completion and edit sessions with dirty tracking.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod planner;
pub mod session;
pub mod utils;

#[cfg(test)]
mod testdata;

pub use commands::AppState;
pub use config::PlannerConfig;
pub use error::{SessionError, SessionResult};
