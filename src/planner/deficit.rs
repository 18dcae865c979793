use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::aggregate::PlanRequirementsResult;
use super::requirements::RequirementAccumulator;
use crate::model::{AccountResources, ItemId, Plan, UpcomingResource};

/// Amounts still missing after inventory and pledges. Items with nothing
/// missing are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeficitResult {
    pub items: BTreeMap<ItemId, u64>,
    pub currency: u64,
}

impl DeficitResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.currency == 0
    }
}

/// Sums the item and qp pledges of `upcoming`.
pub fn sum_upcoming<'a, I>(upcoming: I) -> AccountResources
where
    I: IntoIterator<Item = &'a UpcomingResource>,
{
    let mut total = AccountResources::default();
    for resource in upcoming {
        for (item_id, quantity) in &resource.items {
            let pledged = total.items.entry(*item_id).or_insert(0);
            *pledged = pledged.saturating_add(*quantity);
        }
        total.qp = total.qp.saturating_add(resource.qp);
    }
    total
}

pub fn compute_deficit(
    required: &RequirementAccumulator,
    inventory: &AccountResources,
    upcoming: &AccountResources,
) -> DeficitResult {
    let items = required
        .items
        .iter()
        .filter_map(|(item_id, requirement)| {
            let missing = requirement
                .total
                .saturating_sub(inventory.quantity(*item_id))
                .saturating_sub(upcoming.quantity(*item_id));
            (missing > 0).then_some((*item_id, missing))
        })
        .collect();

    DeficitResult {
        items,
        currency: required
            .currency
            .saturating_sub(inventory.qp)
            .saturating_sub(upcoming.qp),
    }
}

/// Deficits of a chained plan: `target` counts the target plan's own
/// pledges, `group` counts the pledges of every plan in the chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDeficits {
    pub target: DeficitResult,
    pub group: DeficitResult,
}

pub fn compute_plan_deficits(
    requirements: &PlanRequirementsResult,
    inventory: &AccountResources,
    target_plan: &Plan,
    previous_plans: &[Plan],
) -> PlanDeficits {
    let target = compute_deficit(
        &requirements.target_plan.total,
        inventory,
        &sum_upcoming(&target_plan.upcoming_resources),
    );
    let group_pledges = sum_upcoming(
        previous_plans
            .iter()
            .chain(std::iter::once(target_plan))
            .flat_map(|plan| &plan.upcoming_resources),
    );
    PlanDeficits {
        target,
        group: compute_deficit(&requirements.group, inventory, &group_pledges),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::EnhancementCategory;

    fn required(items: &[(ItemId, u64)], currency: u64) -> RequirementAccumulator {
        let mut acc = RequirementAccumulator::new();
        for (item_id, quantity) in items {
            acc.add_item(EnhancementCategory::Ascension, *item_id, *quantity);
        }
        acc.add_currency(currency);
        acc
    }

    fn resources(items: &[(ItemId, u64)], qp: u64) -> AccountResources {
        AccountResources {
            items: items.iter().copied().collect(),
            qp,
        }
    }

    #[test]
    fn test_deficit_subtracts_inventory_and_pledges() {
        let deficit = compute_deficit(
            &required(&[(1, 100), (2, 50)], 0),
            &resources(&[(1, 40), (2, 60)], 0),
            &resources(&[(1, 30)], 0),
        );

        assert_eq!(deficit.items.get(&1), Some(&30));
        assert!(!deficit.items.contains_key(&2));
    }

    #[test]
    fn test_deficit_never_negative() {
        let deficit = compute_deficit(
            &required(&[(1, 5), (3, 7)], 1_000),
            &resources(&[(1, 500), (3, 7)], 10_000),
            &resources(&[(1, 500)], 10_000),
        );

        assert!(deficit.is_empty());
        assert_eq!(deficit.currency, 0);
    }

    #[test]
    fn test_currency_deficit() {
        let deficit = compute_deficit(
            &required(&[], 5_000_000),
            &resources(&[], 1_000_000),
            &resources(&[], 500_000),
        );
        assert_eq!(deficit.currency, 3_500_000);
        assert!(deficit.items.is_empty());
    }

    #[test]
    fn test_missing_inventory_counts_as_zero() {
        let deficit = compute_deficit(
            &required(&[(9, 12)], 0),
            &AccountResources::default(),
            &AccountResources::default(),
        );
        assert_eq!(deficit.items, BTreeMap::from([(9, 12)]));
    }

    #[test]
    fn test_sum_upcoming() {
        let pledges = vec![
            UpcomingResource {
                start_date: None,
                items: BTreeMap::from([(1, 10), (2, 5)]),
                qp: 100,
            },
            UpcomingResource {
                start_date: None,
                items: BTreeMap::from([(1, 3)]),
                qp: 50,
            },
        ];

        let total = sum_upcoming(&pledges);
        assert_eq!(total.quantity(1), 13);
        assert_eq!(total.quantity(2), 5);
        assert_eq!(total.qp, 150);
    }

    #[test]
    fn test_plan_deficits_split_pledges() {
        let pledge = |item_id: ItemId, quantity: u64| UpcomingResource {
            start_date: None,
            items: BTreeMap::from([(item_id, quantity)]),
            qp: 0,
        };
        let mut previous = Plan::default();
        previous.upcoming_resources.push(pledge(1, 6));
        let mut target = Plan::default();
        target.upcoming_resources.push(pledge(1, 2));

        let mut requirements = PlanRequirementsResult::default();
        requirements.target_plan.total = required(&[(1, 10)], 0);
        requirements.group = required(&[(1, 20)], 0);

        let deficits = compute_plan_deficits(
            &requirements,
            &resources(&[(1, 5)], 0),
            &target,
            &[previous],
        );

        // Target: 10 - 5 owned - 2 own pledge. Group: 20 - 5 - (6 + 2).
        assert_eq!(deficits.target.items[&1], 3);
        assert_eq!(deficits.group.items[&1], 7);
    }
}
