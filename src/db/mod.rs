use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{
        SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
        SqliteSynchronous,
    },
    query::Query,
    FromRow, Sqlite, SqlitePool,
};

use crate::model::{EnhancementState, SkillLevels, MAX_ASCENSION};

pub mod accounts;
pub mod plans;
pub mod store;

pub use store::SqliteStore;

pub type Pool = SqlitePool;

pub async fn init_db(db_path: &Path) -> Result<Pool> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("failed to create sqlite pool at {}", db_path.display()))?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("Migration error details: {:#}", e);
        return Err(anyhow::anyhow!(
            "failed to run database migrations. Database path: {}. Error: {}",
            db_path.display(),
            e
        ));
    }

    tracing::info!("Database ready at {}", db_path.display());
    Ok(pool)
}

/// Enhancement columns shared by `account_servants` and `plan_servants`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct StateRow {
    pub level: i64,
    pub ascension: i64,
    pub skill_1: Option<i64>,
    pub skill_2: Option<i64>,
    pub skill_3: Option<i64>,
    pub append_skill_1: Option<i64>,
    pub append_skill_2: Option<i64>,
    pub append_skill_3: Option<i64>,
}

pub(crate) const STATE_COLUMNS: &str =
    "level, ascension, skill_1, skill_2, skill_3, append_skill_1, append_skill_2, append_skill_3";

impl StateRow {
    pub fn into_state(self) -> EnhancementState {
        let slot = |value: Option<i64>| value.map(|v| v.clamp(0, u8::MAX as i64) as u8);
        EnhancementState {
            level: self.level.clamp(1, u32::MAX as i64) as u32,
            ascension: self.ascension.clamp(0, MAX_ASCENSION as i64) as u8,
            skills: SkillLevels::new(slot(self.skill_1), slot(self.skill_2), slot(self.skill_3)),
            append_skills: SkillLevels::new(
                slot(self.append_skill_1),
                slot(self.append_skill_2),
                slot(self.append_skill_3),
            ),
        }
    }
}

pub(crate) fn bind_state<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    state: &EnhancementState,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let slot = |levels: &SkillLevels, slot: u8| levels.get(slot).map(i64::from);
    query
        .bind(i64::from(state.level))
        .bind(i64::from(state.ascension))
        .bind(slot(&state.skills, 1))
        .bind(slot(&state.skills, 2))
        .bind(slot(&state.skills, 3))
        .bind(slot(&state.append_skills, 1))
        .bind(slot(&state.append_skills, 2))
        .bind(slot(&state.append_skills, 3))
}
