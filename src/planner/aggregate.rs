use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::fulfillment::ratchet_state;
use super::requirements::RequirementAccumulator;
use super::servant::{compute_servant_requirements, ComputeOptions, ServantSnapshot, ServantTarget};
use crate::catalog::Catalog;
use crate::model::{
    CostumeId, EnhancementState, InstanceId, MasterAccount, MasterServant, Plan, PlanId,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequirements {
    pub plan_id: PlanId,
    pub total: RequirementAccumulator,
    pub servants: BTreeMap<InstanceId, RequirementAccumulator>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequirementsResult {
    pub target_plan: PlanRequirements,
    /// One entry per previous plan, in the order they were chained.
    pub previous_plans: Vec<PlanRequirements>,
    /// Everything needed to finish the previous plans and then the target plan.
    pub group: RequirementAccumulator,
    /// Per-servant totals across the whole chain.
    pub servants: BTreeMap<InstanceId, RequirementAccumulator>,
}

struct PlanChain<'a> {
    catalog: &'a Catalog,
    masters: BTreeMap<InstanceId, &'a MasterServant>,
    options: &'a ComputeOptions,
    running: HashMap<InstanceId, EnhancementState>,
    running_costumes: BTreeSet<CostumeId>,
    group: RequirementAccumulator,
    ledger: BTreeMap<InstanceId, RequirementAccumulator>,
}

impl<'a> PlanChain<'a> {
    fn new(catalog: &'a Catalog, account: &'a MasterAccount, options: &'a ComputeOptions) -> Self {
        Self {
            catalog,
            masters: account.servant_map(),
            options,
            running: HashMap::new(),
            running_costumes: account.costumes.clone(),
            group: RequirementAccumulator::new(),
            ledger: BTreeMap::new(),
        }
    }

    /// Adds one plan's costs and advances every touched servant to the plan's
    /// targets, so the next plan starts from there.
    fn accumulate(&mut self, plan: &Plan) -> PlanRequirements {
        let plan_options = self.options.restrict_to_plan(&plan.enabled);
        let mut result = PlanRequirements {
            plan_id: plan.plan_id,
            ..Default::default()
        };

        for plan_servant in &plan.servants {
            let options = plan_options.restrict_to_servant(&plan_servant.enabled);
            if !options.includes_any() {
                continue;
            }

            let instance_id = plan_servant.instance_id;
            let Some(master) = self.masters.get(&instance_id) else {
                tracing::warn!(
                    "Plan {} references servant instance {} missing from account; skipping",
                    plan.plan_id,
                    instance_id
                );
                continue;
            };
            let Some(servant) = self.catalog.servant(master.game_id) else {
                tracing::warn!(
                    "Plan {} servant instance {} has unknown game servant {}; skipping",
                    plan.plan_id,
                    instance_id,
                    master.game_id
                );
                continue;
            };

            let current = self
                .running
                .get(&instance_id)
                .copied()
                .unwrap_or(master.state);

            let requirements = compute_servant_requirements(
                self.catalog,
                servant,
                ServantSnapshot {
                    state: &current,
                    costumes: &self.running_costumes,
                },
                ServantTarget {
                    state: &plan_servant.target,
                    costumes: Some(&plan.costumes),
                },
                &options,
            );

            let ratchet = ratchet_state(
                servant,
                &current,
                &self.running_costumes,
                &plan_servant.target,
                Some(&plan.costumes),
                &options,
            );
            self.running.insert(instance_id, ratchet.state);
            self.running_costumes.extend(ratchet.unlocked_costumes);

            result.total.merge(&requirements);
            self.group.merge(&requirements);
            self.ledger
                .entry(instance_id)
                .or_default()
                .merge(&requirements);
            result
                .servants
                .entry(instance_id)
                .or_default()
                .merge(&requirements);
        }

        result
    }
}

/// Requirements of `target_plan` when `previous_plans` are completed first,
/// in the given order.
pub fn compute_plan_requirements(
    catalog: &Catalog,
    target_plan: &Plan,
    account: &MasterAccount,
    previous_plans: &[Plan],
    options: &ComputeOptions,
) -> PlanRequirementsResult {
    let mut chain = PlanChain::new(catalog, account, options);

    let previous: Vec<PlanRequirements> = previous_plans
        .iter()
        .map(|plan| chain.accumulate(plan))
        .collect();
    let target = chain.accumulate(target_plan);

    tracing::debug!(
        "Computed requirements for plan {} ({} servants, {} previous plans, {} items)",
        target_plan.plan_id,
        target.servants.len(),
        previous.len(),
        chain.group.items.len()
    );

    PlanRequirementsResult {
        target_plan: target,
        previous_plans: previous,
        group: chain.group,
        servants: chain.ledger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlanEnabled, PlanServantEnabled, SkillLevels};
    use crate::testdata::fixtures::{self, *};

    fn direct(current: EnhancementState, target: EnhancementState) -> RequirementAccumulator {
        let catalog = fixtures::catalog();
        let servant = catalog.servant(SABER_ID).unwrap();
        let costumes = BTreeSet::new();
        compute_servant_requirements(
            &catalog,
            servant,
            ServantSnapshot {
                state: &current,
                costumes: &costumes,
            },
            ServantTarget {
                state: &target,
                costumes: Some(&costumes),
            },
            &ComputeOptions::default(),
        )
    }

    #[test]
    fn test_single_plan_matches_servant_calculator() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();
        let target = EnhancementState::new(90, 4, 10);
        let plan = fixtures::plan(1, vec![fixtures::plan_servant(1, target)]);

        let result =
            compute_plan_requirements(&catalog, &plan, &account, &[], &ComputeOptions::default());

        let expected = direct(EnhancementState::new(1, 0, 1), target);
        assert_eq!(result.target_plan.total, expected);
        assert_eq!(result.target_plan.servants[&1], expected);
        assert_eq!(result.group, expected);
        assert!(result.previous_plans.is_empty());
    }

    #[test]
    fn test_chained_plans_start_from_previous_targets() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();
        let initial = EnhancementState::new(1, 0, 1);
        let middle = EnhancementState {
            ascension: 2,
            ..initial
        };
        let last = EnhancementState {
            ascension: 4,
            ..initial
        };

        let p1 = fixtures::plan(1, vec![fixtures::plan_servant(1, middle)]);
        let p2 = fixtures::plan(2, vec![fixtures::plan_servant(1, last)]);

        let result = compute_plan_requirements(
            &catalog,
            &p2,
            &account,
            std::slice::from_ref(&p1),
            &ComputeOptions::default(),
        );

        assert_eq!(result.target_plan.total, direct(middle, last));
        assert_eq!(result.previous_plans[0].plan_id, 1);
        assert_eq!(result.previous_plans[0].total, direct(initial, middle));
        assert_eq!(result.group, direct(initial, last));
        assert_eq!(result.servants[&1], result.group);
    }

    #[test]
    fn test_chain_with_skills_uses_previous_target_as_baseline() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();
        let p1_target = EnhancementState::new(1, 0, 6)
            .with_skills(SkillLevels::new(Some(6), Some(4), None));
        let p2_target = EnhancementState::new(1, 0, 10).with_skills(SkillLevels::uniform(10));

        let p1 = fixtures::plan(1, vec![fixtures::plan_servant(1, p1_target)]);
        let p2 = fixtures::plan(2, vec![fixtures::plan_servant(1, p2_target)]);

        let result = compute_plan_requirements(
            &catalog,
            &p2,
            &account,
            &[p1],
            &ComputeOptions::default(),
        );
        assert_eq!(result.target_plan.total.item_total(ITEM_C), 38);
        assert_eq!(result.target_plan.total, direct(p1_target, p2_target));
    }

    #[test]
    fn test_chain_baseline_never_drops_below_owned_or_disabled_state() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();

        // Archer already owns ascension 2; an earlier plan aiming lower does
        // not pull the next plan's baseline back down.
        let lower = fixtures::plan(
            1,
            vec![fixtures::plan_servant(2, EnhancementState::new(60, 1, 4))],
        );
        let raise = fixtures::plan(
            2,
            vec![fixtures::plan_servant(2, EnhancementState::new(60, 4, 4))],
        );
        let result = compute_plan_requirements(
            &catalog,
            &raise,
            &account,
            &[lower],
            &ComputeOptions::default(),
        );
        assert!(result.previous_plans[0].total.is_empty());
        assert_eq!(result.target_plan.total.item_total(ITEM_A), 0);
        assert_eq!(result.target_plan.total.item_total(ITEM_B), 12);

        // Ascensions are switched off in the earlier plan, so only its skill
        // target carries over.
        let mut skills_only = fixtures::plan(
            1,
            vec![fixtures::plan_servant(1, EnhancementState::new(1, 4, 6))],
        );
        skills_only.enabled = PlanEnabled {
            ascensions: false,
            ..Default::default()
        };
        let full = fixtures::plan(
            2,
            vec![fixtures::plan_servant(1, EnhancementState::new(1, 4, 6))],
        );
        let result = compute_plan_requirements(
            &catalog,
            &full,
            &account,
            &[skills_only],
            &ComputeOptions::default(),
        );
        assert_eq!(result.previous_plans[0].total.item_total(ITEM_C), 10);
        assert_eq!(result.target_plan.total.item_total(ITEM_C), 0);
        assert_eq!(result.target_plan.total.item_total(ITEM_A), 8);
        assert_eq!(result.target_plan.total.item_total(ITEM_B), 12);
    }

    #[test]
    fn test_missing_instance_is_skipped() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();
        let plan = fixtures::plan(
            1,
            vec![
                fixtures::plan_servant(404, EnhancementState::new(90, 4, 10)),
                fixtures::plan_servant(2, EnhancementState::new(80, 4, 4)),
            ],
        );

        let result =
            compute_plan_requirements(&catalog, &plan, &account, &[], &ComputeOptions::default());
        assert!(!result.target_plan.servants.contains_key(&404));
        assert!(result.target_plan.servants.contains_key(&2));
        // Archer 2 -> 4: 4 + 8 of item B
        assert_eq!(result.target_plan.total.item_total(ITEM_B), 12);
    }

    #[test]
    fn test_disabled_servant_creates_no_entry() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();
        let mut plan_servant = fixtures::plan_servant(1, EnhancementState::new(90, 4, 10));
        plan_servant.enabled = PlanServantEnabled {
            servant: false,
            ..Default::default()
        };
        let plan = fixtures::plan(1, vec![plan_servant]);

        let result =
            compute_plan_requirements(&catalog, &plan, &account, &[], &ComputeOptions::default());
        assert!(result.target_plan.servants.is_empty());
        assert!(result.servants.is_empty());
        assert!(result.group.is_empty());
    }

    #[test]
    fn test_plan_and_servant_flags_must_both_allow() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();
        let mut plan_servant = fixtures::plan_servant(1, EnhancementState::new(90, 4, 10));
        plan_servant.enabled.skills = false;
        let mut plan = fixtures::plan(1, vec![plan_servant]);
        plan.enabled = PlanEnabled {
            ascensions: false,
            ..Default::default()
        };

        let result =
            compute_plan_requirements(&catalog, &plan, &account, &[], &ComputeOptions::default());
        // Only costumes remain, and the plan targets none.
        assert!(result.target_plan.servants[&1].is_empty());
        assert!(result.target_plan.total.is_empty());

        plan.costumes.insert(COSTUME_2);
        let result =
            compute_plan_requirements(&catalog, &plan, &account, &[], &ComputeOptions::default());
        assert_eq!(result.target_plan.total.items[&ITEM_COSTUME].costume, 8);
    }

    #[test]
    fn test_costumes_unlocked_by_previous_plan_are_not_charged_again() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();
        let state = EnhancementState::new(1, 0, 1);
        let mut p1 = fixtures::plan(1, vec![fixtures::plan_servant(1, state)]);
        p1.costumes.insert(COSTUME_1);
        let mut p2 = fixtures::plan(2, vec![fixtures::plan_servant(1, state)]);
        p2.costumes.extend([COSTUME_1, COSTUME_2]);

        let result = compute_plan_requirements(
            &catalog,
            &p2,
            &account,
            &[p1],
            &ComputeOptions::default(),
        );
        assert_eq!(result.previous_plans[0].total.item_total(ITEM_COSTUME), 5);
        assert_eq!(result.target_plan.total.item_total(ITEM_COSTUME), 8);
        assert_eq!(result.group.item_total(ITEM_COSTUME), 13);
    }

    #[test]
    fn test_servant_only_in_previous_plan_counts_toward_group() {
        let catalog = fixtures::catalog();
        let account = fixtures::account();
        let p1 = fixtures::plan(
            1,
            vec![fixtures::plan_servant(2, EnhancementState::new(80, 4, 4))],
        );
        let p2 = fixtures::plan(
            2,
            vec![fixtures::plan_servant(1, EnhancementState::new(1, 2, 1))],
        );

        let result = compute_plan_requirements(
            &catalog,
            &p2,
            &account,
            &[p1],
            &ComputeOptions::default(),
        );
        assert!(!result.target_plan.servants.contains_key(&2));
        assert!(result.servants.contains_key(&2));
        assert_eq!(
            result.group,
            RequirementAccumulator::merged(
                &result.previous_plans[0].total,
                &result.target_plan.total
            )
        );
    }
}
