use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{FromRow, Sqlite, Transaction};

use super::{bind_state, Pool, StateRow, STATE_COLUMNS};
use crate::model::{
    AccountId, Plan, PlanEnabled, PlanId, PlanServant, PlanServantEnabled, UpcomingResource,
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlanGroup {
    pub group_id: i64,
    pub account_id: i64,
    pub name: String,
}

/// Lightweight listing entry.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlanSummary {
    pub plan_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub group_id: Option<i64>,
    pub group_order: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
struct PlanRow {
    plan_id: i64,
    account_id: i64,
    group_id: Option<i64>,
    name: String,
    description: Option<String>,
    enable_ascensions: bool,
    enable_skills: bool,
    enable_append_skills: bool,
    enable_costumes: bool,
    upcoming_resources: String,
}

#[derive(Debug, Clone, FromRow)]
struct PlanServantRow {
    instance_id: i64,
    enable_servant: bool,
    enable_ascensions: bool,
    enable_skills: bool,
    enable_append_skills: bool,
    enable_costumes: bool,
    #[sqlx(flatten)]
    state: StateRow,
}

const PLAN_COLUMNS: &str = "plan_id, account_id, group_id, name, description, enable_ascensions, enable_skills, enable_append_skills, enable_costumes, upcoming_resources";

pub async fn create_plan(
    pool: &Pool,
    account_id: AccountId,
    name: &str,
    description: Option<&str>,
) -> Result<PlanId> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO plans (account_id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(account_id)
    .bind(name)
    .bind(description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let plan_id = sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()")
        .fetch_one(pool)
        .await?;

    Ok(plan_id)
}

pub async fn get_plans_for_account(pool: &Pool, account_id: AccountId) -> Result<Vec<PlanSummary>> {
    let plans = sqlx::query_as::<_, PlanSummary>(
        "SELECT plan_id, name, description, group_id, group_order, updated_at
         FROM plans
         WHERE account_id = ?
         ORDER BY group_id, group_order, created_at",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(plans)
}

pub async fn get_plan(pool: &Pool, plan_id: PlanId) -> Result<Option<Plan>> {
    let row = sqlx::query_as::<_, PlanRow>(&format!(
        "SELECT {} FROM plans WHERE plan_id = ?",
        PLAN_COLUMNS
    ))
    .bind(plan_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(load_plan_children(pool, row).await?)),
        None => Ok(None),
    }
}

/// Plans chained before `plan_id` in its group, earliest first. Empty when
/// the plan has no group.
pub async fn get_previous_plans(pool: &Pool, plan_id: PlanId) -> Result<Vec<Plan>> {
    let rows = sqlx::query_as::<_, PlanRow>(&format!(
        "SELECT {}
         FROM plans
         WHERE group_id = (SELECT group_id FROM plans WHERE plan_id = ?)
           AND group_order < (SELECT group_order FROM plans WHERE plan_id = ?)
         ORDER BY group_order",
        PLAN_COLUMNS
    ))
    .bind(plan_id)
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    let mut plans = Vec::with_capacity(rows.len());
    for row in rows {
        plans.push(load_plan_children(pool, row).await?);
    }

    Ok(plans)
}

async fn load_plan_children(pool: &Pool, row: PlanRow) -> Result<Plan> {
    let servant_rows = sqlx::query_as::<_, PlanServantRow>(&format!(
        "SELECT instance_id, enable_servant, enable_ascensions, enable_skills, enable_append_skills, enable_costumes, {}
         FROM plan_servants
         WHERE plan_id = ?
         ORDER BY sort_order",
        STATE_COLUMNS
    ))
    .bind(row.plan_id)
    .fetch_all(pool)
    .await?;

    let costumes: Vec<i64> =
        sqlx::query_scalar("SELECT costume_id FROM plan_costumes WHERE plan_id = ?")
            .bind(row.plan_id)
            .fetch_all(pool)
            .await?;

    let upcoming_resources: Vec<UpcomingResource> =
        serde_json::from_str(&row.upcoming_resources)
            .with_context(|| format!("invalid upcoming resources for plan {}", row.plan_id))?;

    Ok(Plan {
        plan_id: row.plan_id,
        account_id: row.account_id,
        name: row.name,
        description: row.description,
        group_id: row.group_id,
        enabled: PlanEnabled {
            ascensions: row.enable_ascensions,
            skills: row.enable_skills,
            append_skills: row.enable_append_skills,
            costumes: row.enable_costumes,
        },
        servants: servant_rows
            .into_iter()
            .map(|servant| PlanServant {
                instance_id: servant.instance_id,
                enabled: PlanServantEnabled {
                    servant: servant.enable_servant,
                    ascensions: servant.enable_ascensions,
                    skills: servant.enable_skills,
                    append_skills: servant.enable_append_skills,
                    costumes: servant.enable_costumes,
                },
                target: servant.state.into_state(),
            })
            .collect(),
        costumes: costumes.into_iter().collect(),
        upcoming_resources,
    })
}

/// Replaces the stored plan body (header, servants, costumes, pledges).
/// Group membership is managed separately.
pub async fn save_plan(pool: &Pool, plan: &Plan) -> Result<()> {
    let upcoming = serde_json::to_string(&plan.upcoming_resources)?;
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE plans SET name = ?, description = ?, enable_ascensions = ?, enable_skills = ?,
         enable_append_skills = ?, enable_costumes = ?, upcoming_resources = ?, updated_at = ?
         WHERE plan_id = ?",
    )
    .bind(&plan.name)
    .bind(&plan.description)
    .bind(plan.enabled.ascensions)
    .bind(plan.enabled.skills)
    .bind(plan.enabled.append_skills)
    .bind(plan.enabled.costumes)
    .bind(upcoming)
    .bind(chrono::Utc::now().timestamp())
    .bind(plan.plan_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        anyhow::bail!("plan {} does not exist", plan.plan_id);
    }

    sqlx::query("DELETE FROM plan_servants WHERE plan_id = ?")
        .bind(plan.plan_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM plan_costumes WHERE plan_id = ?")
        .bind(plan.plan_id)
        .execute(&mut *tx)
        .await?;

    write_plan_servants(&mut tx, plan).await?;

    for costume_id in &plan.costumes {
        sqlx::query("INSERT INTO plan_costumes (plan_id, costume_id) VALUES (?, ?)")
            .bind(plan.plan_id)
            .bind(costume_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(())
}

async fn write_plan_servants(tx: &mut Transaction<'_, Sqlite>, plan: &Plan) -> Result<()> {
    let insert = format!(
        "INSERT INTO plan_servants (plan_id, instance_id, sort_order, enable_servant, enable_ascensions,
         enable_skills, enable_append_skills, enable_costumes, {})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        STATE_COLUMNS
    );

    for (index, servant) in plan.servants.iter().enumerate() {
        let query = sqlx::query(&insert)
            .bind(plan.plan_id)
            .bind(servant.instance_id)
            .bind(index as i64)
            .bind(servant.enabled.servant)
            .bind(servant.enabled.ascensions)
            .bind(servant.enabled.skills)
            .bind(servant.enabled.append_skills)
            .bind(servant.enabled.costumes);
        bind_state(query, &servant.target)
            .execute(&mut **tx)
            .await
            .with_context(|| {
                format!(
                    "failed to write plan {} servant {}",
                    plan.plan_id, servant.instance_id
                )
            })?;
    }

    Ok(())
}

pub async fn delete_plan(pool: &Pool, plan_id: PlanId) -> Result<()> {
    sqlx::query("DELETE FROM plans WHERE plan_id = ?")
        .bind(plan_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_plan_group(pool: &Pool, account_id: AccountId, name: &str) -> Result<i64> {
    sqlx::query("INSERT INTO plan_groups (account_id, name) VALUES (?, ?)")
        .bind(account_id)
        .bind(name)
        .execute(pool)
        .await?;

    let group_id = sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()")
        .fetch_one(pool)
        .await?;

    Ok(group_id)
}

pub async fn get_plan_groups(pool: &Pool, account_id: AccountId) -> Result<Vec<PlanGroup>> {
    let groups = sqlx::query_as::<_, PlanGroup>(
        "SELECT group_id, account_id, name FROM plan_groups WHERE account_id = ? ORDER BY group_id",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(groups)
}

/// Appends the plan to the end of the group's chain.
pub async fn add_plan_to_group(pool: &Pool, plan_id: PlanId, group_id: i64) -> Result<()> {
    let max_order: Option<i64> =
        sqlx::query_scalar("SELECT MAX(group_order) FROM plans WHERE group_id = ?")
            .bind(group_id)
            .fetch_one(pool)
            .await?;

    let next_order = max_order.unwrap_or(-1) + 1;

    sqlx::query("UPDATE plans SET group_id = ?, group_order = ? WHERE plan_id = ?")
        .bind(group_id)
        .bind(next_order)
        .bind(plan_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn remove_plan_from_group(pool: &Pool, plan_id: PlanId) -> Result<()> {
    sqlx::query("UPDATE plans SET group_id = NULL, group_order = 0 WHERE plan_id = ?")
        .bind(plan_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn reorder_group_plans(pool: &Pool, group_id: i64, plan_ids: &[PlanId]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (index, plan_id) in plan_ids.iter().enumerate() {
        sqlx::query("UPDATE plans SET group_order = ? WHERE plan_id = ? AND group_id = ?")
            .bind(index as i64)
            .bind(plan_id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(())
}
