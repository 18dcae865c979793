use std::collections::BTreeSet;

use serde::Serialize;

use super::AppState;
use crate::db;
use crate::model::{AccountId, InstanceId, MasterAccount, Plan, PlanId};
use crate::planner::{
    compute_plan_deficits, compute_plan_requirements, fulfill_servant, ComputeOptions,
    DeficitResult, FulfillmentResult, PlanRequirementsResult,
};

#[derive(Debug, Clone, Serialize)]
pub struct PlanRequirementsResponse {
    pub requirements: PlanRequirementsResult,
    /// What the target plan alone still lacks, counting its own pledges.
    pub target_deficit: DeficitResult,
    /// What the whole chain still lacks, counting every chained plan's pledges.
    pub group_deficit: DeficitResult,
}

async fn load_plan(state: &AppState, plan_id: PlanId) -> Result<Plan, String> {
    db::plans::get_plan(&state.pool, plan_id)
        .await
        .map_err(|e| format!("Failed to get plan: {}", e))?
        .ok_or_else(|| "Plan not found".to_string())
}

async fn load_account(state: &AppState, account_id: AccountId) -> Result<MasterAccount, String> {
    db::accounts::get_account(&state.pool, account_id)
        .await
        .map_err(|e| format!("Failed to get account: {}", e))?
        .ok_or_else(|| "Account not found".to_string())
}

pub async fn list_plans(
    state: &AppState,
    account_id: AccountId,
) -> Result<Vec<db::plans::PlanSummary>, String> {
    db::plans::get_plans_for_account(&state.pool, account_id)
        .await
        .map_err(|e| format!("Failed to get plans: {}", e))
}

pub async fn get_plan_requirements(
    state: &AppState,
    plan_id: PlanId,
    options: Option<ComputeOptions>,
) -> Result<PlanRequirementsResponse, String> {
    let plan = load_plan(state, plan_id).await?;
    let account = load_account(state, plan.account_id).await?;
    let previous_plans = db::plans::get_previous_plans(&state.pool, plan_id)
        .await
        .map_err(|e| format!("Failed to get previous plans: {}", e))?;

    let requirements = compute_plan_requirements(
        &state.catalog,
        &plan,
        &account,
        &previous_plans,
        &state.options(options),
    );

    let deficits =
        compute_plan_deficits(&requirements, &account.resources, &plan, &previous_plans);

    Ok(PlanRequirementsResponse {
        requirements,
        target_deficit: deficits.target,
        group_deficit: deficits.group,
    })
}

/// Preview of completing one plan servant against the stored account.
pub async fn get_servant_fulfillment(
    state: &AppState,
    plan_id: PlanId,
    instance_id: InstanceId,
) -> Result<Option<FulfillmentResult>, String> {
    let plan = load_plan(state, plan_id).await?;
    let account = load_account(state, plan.account_id).await?;

    let plan_servant = plan
        .servant(instance_id)
        .ok_or_else(|| format!("Servant {} is not in plan {}", instance_id, plan_id))?;
    let master = account
        .servant(instance_id)
        .ok_or_else(|| format!("Servant {} not found", instance_id))?;
    let servant = state
        .catalog
        .servant(master.game_id)
        .ok_or_else(|| format!("Game servant {} not in catalog", master.game_id))?;

    let options = state.options(None).restrict_to_plan(&plan.enabled);
    let target_costumes: &BTreeSet<_> = &plan.costumes;

    Ok(fulfill_servant(
        &state.catalog,
        servant,
        master,
        plan_servant,
        &account.costumes,
        Some(target_costumes),
        &options,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::app_state;
    use crate::model::{EnhancementState, UpcomingResource};
    use crate::testdata::{fixtures, TestDb};
    use std::collections::BTreeMap;

    async fn store_plan(db: &TestDb, servants: Vec<crate::model::PlanServant>) -> Plan {
        let plan_id = db::plans::create_plan(&db.pool, 1, "Plan", None).await.unwrap();
        let plan = fixtures::plan(plan_id, servants);
        db::plans::save_plan(&db.pool, &plan).await.unwrap();
        plan
    }

    #[tokio::test]
    async fn test_plan_requirements_with_deficits() {
        let db = TestDb::new_with_account().await.unwrap();
        let state = app_state(&db);
        let mut plan = store_plan(
            &db,
            vec![fixtures::plan_servant(1, EnhancementState::new(1, 4, 1))],
        )
        .await;
        plan.upcoming_resources.push(UpcomingResource {
            start_date: None,
            items: BTreeMap::from([(fixtures::ITEM_B, 4)]),
            qp: 0,
        });
        db::plans::save_plan(&db.pool, &plan).await.unwrap();

        let response = get_plan_requirements(&state, plan.plan_id, None).await.unwrap();

        let total = &response.requirements.target_plan.total;
        assert_eq!(total.item_total(fixtures::ITEM_A), 8);
        assert_eq!(total.item_total(fixtures::ITEM_B), 12);
        // Item A: 10 owned covers 8. Item B: 12 - 3 owned - 4 pledged.
        assert!(!response.target_deficit.items.contains_key(&fixtures::ITEM_A));
        assert_eq!(response.target_deficit.items[&fixtures::ITEM_B], 5);
        assert_eq!(response.target_deficit.currency, 0);
    }

    #[tokio::test]
    async fn test_group_deficit_counts_chain() {
        let db = TestDb::new_with_account().await.unwrap();
        let state = app_state(&db);
        let first = store_plan(
            &db,
            vec![fixtures::plan_servant(2, EnhancementState::new(80, 4, 4))],
        )
        .await;
        let second = store_plan(
            &db,
            vec![fixtures::plan_servant(1, EnhancementState::new(1, 4, 1))],
        )
        .await;
        let group_id = db::plans::create_plan_group(&db.pool, 1, "Chain").await.unwrap();
        db::plans::add_plan_to_group(&db.pool, first.plan_id, group_id).await.unwrap();
        db::plans::add_plan_to_group(&db.pool, second.plan_id, group_id).await.unwrap();

        let response = get_plan_requirements(&state, second.plan_id, None).await.unwrap();

        assert_eq!(response.requirements.previous_plans.len(), 1);
        // Archer 2 -> 4 needs 12 of item B, Saber 0 -> 4 another 12.
        assert_eq!(response.requirements.group.item_total(fixtures::ITEM_B), 24);
        assert_eq!(response.group_deficit.items[&fixtures::ITEM_B], 21);
        assert_eq!(response.target_deficit.items[&fixtures::ITEM_B], 9);
    }

    #[tokio::test]
    async fn test_missing_plan_reports_error() {
        let db = TestDb::new_with_account().await.unwrap();
        let state = app_state(&db);
        let err = get_plan_requirements(&state, 404, None).await.unwrap_err();
        assert_eq!(err, "Plan not found");
    }

    #[tokio::test]
    async fn test_servant_fulfillment_preview() {
        let db = TestDb::new_with_account().await.unwrap();
        let state = app_state(&db);
        let plan = store_plan(
            &db,
            vec![
                fixtures::plan_servant(1, EnhancementState::new(1, 2, 1)),
                fixtures::plan_servant(2, EnhancementState::new(60, 2, 4)),
            ],
        )
        .await;

        let result = get_servant_fulfillment(&state, plan.plan_id, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.update.ascension, 2);
        assert_eq!(result.requirements.item_total(fixtures::ITEM_A), 8);

        assert!(get_servant_fulfillment(&state, plan.plan_id, 2)
            .await
            .unwrap()
            .is_none());
        assert!(get_servant_fulfillment(&state, plan.plan_id, 9)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_plans() {
        let db = TestDb::new_with_account().await.unwrap();
        let state = app_state(&db);
        store_plan(&db, vec![]).await;
        store_plan(&db, vec![]).await;

        assert_eq!(list_plans(&state, 1).await.unwrap().len(), 2);
    }
}
