use crate::db::Pool;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous},
    SqlitePool,
};
use tempfile::NamedTempFile;

pub mod fixtures;

pub struct TestDb {
    pub pool: Pool,
    _temp_file: NamedTempFile,
}

impl TestDb {
    pub async fn new() -> anyhow::Result<Self> {
        let temp_file = NamedTempFile::new()?;

        let options = SqliteConnectOptions::new()
            .filename(temp_file.path())
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePool::connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            _temp_file: temp_file,
        })
    }

    /// Test database holding the fixture account and no plans.
    pub async fn new_with_account() -> anyhow::Result<Self> {
        let db = Self::new().await?;
        let account = fixtures::account();
        crate::db::accounts::insert_account(&db.pool, &account).await?;
        Ok(db)
    }
}
