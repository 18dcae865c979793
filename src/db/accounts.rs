use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{FromRow, Sqlite, Transaction};

use super::{bind_state, Pool, StateRow, STATE_COLUMNS};
use crate::model::{AccountId, AccountResources, MasterAccount, MasterServant};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, FromRow)]
struct AccountRow {
    account_id: i64,
    name: String,
    qp: i64,
    next_instance_id: i64,
}

#[derive(Debug, Clone, FromRow)]
struct ServantRow {
    instance_id: i64,
    game_id: i64,
    summon_date: Option<String>,
    #[sqlx(flatten)]
    state: StateRow,
}

/// Amounts are stored as SQLite integers; anything above `i64::MAX` is
/// refused instead of wrapping.
fn stored_amount(amount: u64, what: impl std::fmt::Display) -> Result<i64> {
    i64::try_from(amount).with_context(|| format!("{} is too large to store: {}", what, amount))
}

pub async fn insert_account(pool: &Pool, account: &MasterAccount) -> Result<()> {
    let qp = stored_amount(account.resources.qp, "qp")?;
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO accounts (account_id, name, qp, next_instance_id, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(account.account_id)
    .bind(&account.name)
    .bind(qp)
    .bind(account.min_next_instance_id())
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut *tx)
    .await?;

    write_children(&mut tx, account).await?;

    tx.commit().await?;

    Ok(())
}

pub async fn get_account(pool: &Pool, account_id: AccountId) -> Result<Option<MasterAccount>> {
    let Some(row) = sqlx::query_as::<_, AccountRow>(
        "SELECT account_id, name, qp, next_instance_id FROM accounts WHERE account_id = ?",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let items: Vec<(i64, i64)> =
        sqlx::query_as("SELECT item_id, quantity FROM account_items WHERE account_id = ?")
            .bind(account_id)
            .fetch_all(pool)
            .await?;

    let servant_rows = sqlx::query_as::<_, ServantRow>(&format!(
        "SELECT instance_id, game_id, summon_date, {}
         FROM account_servants
         WHERE account_id = ?
         ORDER BY sort_order",
        STATE_COLUMNS
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    let costumes: Vec<i64> =
        sqlx::query_scalar("SELECT costume_id FROM account_costumes WHERE account_id = ?")
            .bind(account_id)
            .fetch_all(pool)
            .await?;

    let bond_levels: Vec<(i64, i64)> =
        sqlx::query_as("SELECT game_id, bond_level FROM account_bond_levels WHERE account_id = ?")
            .bind(account_id)
            .fetch_all(pool)
            .await?;

    let mut servants = Vec::with_capacity(servant_rows.len());
    for row in servant_rows {
        let summon_date = row
            .summon_date
            .as_deref()
            .map(|date| NaiveDate::parse_from_str(date, DATE_FORMAT))
            .transpose()
            .with_context(|| format!("invalid summon date for servant {}", row.instance_id))?;
        servants.push(MasterServant {
            instance_id: row.instance_id,
            game_id: row.game_id,
            summon_date,
            state: row.state.into_state(),
        });
    }

    let mut account = MasterAccount {
        account_id: row.account_id,
        name: row.name,
        resources: AccountResources {
            items: items
                .into_iter()
                .map(|(item_id, quantity)| (item_id, u64::try_from(quantity).unwrap_or(0)))
                .collect::<BTreeMap<_, _>>(),
            qp: u64::try_from(row.qp).unwrap_or(0),
        },
        servants,
        costumes: costumes.into_iter().collect::<BTreeSet<_>>(),
        bond_levels: bond_levels
            .into_iter()
            .map(|(game_id, level)| (game_id, level.clamp(0, u8::MAX as i64) as u8))
            .collect(),
        next_instance_id: row.next_instance_id,
    };
    account.next_instance_id = account.min_next_instance_id();

    Ok(Some(account))
}

/// Replaces the stored account with `account`.
pub async fn save_account(pool: &Pool, account: &MasterAccount) -> Result<()> {
    let qp = stored_amount(account.resources.qp, "qp")?;
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE accounts SET name = ?, qp = ?, next_instance_id = ?, updated_at = ? WHERE account_id = ?",
    )
    .bind(&account.name)
    .bind(qp)
    .bind(account.min_next_instance_id())
    .bind(chrono::Utc::now().timestamp())
    .bind(account.account_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        anyhow::bail!("account {} does not exist", account.account_id);
    }

    for table in [
        "account_items",
        "account_servants",
        "account_costumes",
        "account_bond_levels",
    ] {
        sqlx::query(&format!("DELETE FROM {} WHERE account_id = ?", table))
            .bind(account.account_id)
            .execute(&mut *tx)
            .await?;
    }

    write_children(&mut tx, account).await?;

    tx.commit().await?;

    Ok(())
}

pub async fn delete_account(pool: &Pool, account_id: AccountId) -> Result<()> {
    sqlx::query("DELETE FROM accounts WHERE account_id = ?")
        .bind(account_id)
        .execute(pool)
        .await?;

    Ok(())
}

async fn write_children(tx: &mut Transaction<'_, Sqlite>, account: &MasterAccount) -> Result<()> {
    for (item_id, quantity) in &account.resources.items {
        let quantity = stored_amount(*quantity, format_args!("quantity of item {}", item_id))?;
        sqlx::query("INSERT INTO account_items (account_id, item_id, quantity) VALUES (?, ?, ?)")
            .bind(account.account_id)
            .bind(item_id)
            .bind(quantity)
            .execute(&mut **tx)
            .await?;
    }

    let insert_servant = format!(
        "INSERT INTO account_servants (account_id, instance_id, game_id, summon_date, sort_order, {})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        STATE_COLUMNS
    );
    for (index, servant) in account.servants.iter().enumerate() {
        let query = sqlx::query(&insert_servant)
            .bind(account.account_id)
            .bind(servant.instance_id)
            .bind(servant.game_id)
            .bind(servant.summon_date.map(|d| d.format(DATE_FORMAT).to_string()))
            .bind(index as i64);
        bind_state(query, &servant.state)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("failed to write servant {}", servant.instance_id))?;
    }

    for costume_id in &account.costumes {
        sqlx::query("INSERT INTO account_costumes (account_id, costume_id) VALUES (?, ?)")
            .bind(account.account_id)
            .bind(costume_id)
            .execute(&mut **tx)
            .await?;
    }

    for (game_id, level) in &account.bond_levels {
        sqlx::query(
            "INSERT INTO account_bond_levels (account_id, game_id, bond_level) VALUES (?, ?, ?)",
        )
        .bind(account.account_id)
        .bind(game_id)
        .bind(i64::from(*level))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
