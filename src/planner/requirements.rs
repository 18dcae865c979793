use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::MaterialCost;
use crate::model::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnhancementCategory {
    Ascension,
    Skill,
    AppendSkill,
    Costume,
}

impl EnhancementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnhancementCategory::Ascension => "ascension",
            EnhancementCategory::Skill => "skill",
            EnhancementCategory::AppendSkill => "append-skill",
            EnhancementCategory::Costume => "costume",
        }
    }
}

impl std::str::FromStr for EnhancementCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_plain::from_str(s).map_err(|_| ())
    }
}

/// Quantity of one item needed, split by what it is needed for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequirements {
    pub ascension: u64,
    pub skill: u64,
    pub append_skill: u64,
    pub costume: u64,
    pub total: u64,
}

impl ItemRequirements {
    pub fn get(&self, category: EnhancementCategory) -> u64 {
        match category {
            EnhancementCategory::Ascension => self.ascension,
            EnhancementCategory::Skill => self.skill,
            EnhancementCategory::AppendSkill => self.append_skill,
            EnhancementCategory::Costume => self.costume,
        }
    }

    fn add(&mut self, category: EnhancementCategory, quantity: u64) {
        let subtotal = match category {
            EnhancementCategory::Ascension => &mut self.ascension,
            EnhancementCategory::Skill => &mut self.skill,
            EnhancementCategory::AppendSkill => &mut self.append_skill,
            EnhancementCategory::Costume => &mut self.costume,
        };
        *subtotal = subtotal.saturating_add(quantity);
        self.total = self.total.saturating_add(quantity);
    }

    fn merge(&mut self, other: &ItemRequirements) {
        self.ascension = self.ascension.saturating_add(other.ascension);
        self.skill = self.skill.saturating_add(other.skill);
        self.append_skill = self.append_skill.saturating_add(other.append_skill);
        self.costume = self.costume.saturating_add(other.costume);
        self.total = self.total.saturating_add(other.total);
    }
}

/// Material and currency totals produced by a computation. Merging is plain
/// per-field addition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementAccumulator {
    pub items: BTreeMap<ItemId, ItemRequirements>,
    pub currency: u64,
}

impl RequirementAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, category: EnhancementCategory, item_id: ItemId, quantity: u64) {
        if quantity == 0 {
            return;
        }
        self.items.entry(item_id).or_default().add(category, quantity);
    }

    pub fn add_currency(&mut self, amount: u64) {
        self.currency = self.currency.saturating_add(amount);
    }

    /// Adds `cost` `times` times under `category`.
    pub fn add_cost(&mut self, category: EnhancementCategory, cost: &MaterialCost, times: u64) {
        if times == 0 {
            return;
        }
        for (&item_id, &quantity) in &cost.materials {
            self.add_item(category, item_id, quantity.saturating_mul(times));
        }
        self.add_currency(cost.qp.saturating_mul(times));
    }

    pub fn merge(&mut self, other: &RequirementAccumulator) {
        for (&item_id, requirements) in &other.items {
            self.items.entry(item_id).or_default().merge(requirements);
        }
        self.currency = self.currency.saturating_add(other.currency);
    }

    pub fn merged(a: &RequirementAccumulator, b: &RequirementAccumulator) -> Self {
        let mut result = a.clone();
        result.merge(b);
        result
    }

    pub fn item_total(&self, item_id: ItemId) -> u64 {
        self.items.get(&item_id).map(|i| i.total).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.currency == 0 && self.items.values().all(|i| i.total == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: u64) -> RequirementAccumulator {
        let mut acc = RequirementAccumulator::new();
        acc.add_item(EnhancementCategory::Ascension, 1, seed);
        acc.add_item(EnhancementCategory::Skill, 2, seed * 2);
        acc.add_item(EnhancementCategory::Costume, 1, 3);
        acc.add_currency(seed * 1000);
        acc
    }

    #[test]
    fn test_total_tracks_subtotals() {
        let acc = sample(4);
        let item = acc.items[&1];
        assert_eq!(item.ascension, 4);
        assert_eq!(item.costume, 3);
        assert_eq!(
            item.total,
            item.ascension + item.skill + item.append_skill + item.costume
        );
    }

    #[test]
    fn test_merge_is_additive_commutative_and_associative() {
        let a = sample(1);
        let b = sample(5);
        let c = sample(7);

        let ab = RequirementAccumulator::merged(&a, &b);
        assert_eq!(ab.item_total(1), a.item_total(1) + b.item_total(1));
        assert_eq!(ab.currency, a.currency + b.currency);
        assert_eq!(ab, RequirementAccumulator::merged(&b, &a));

        let left = RequirementAccumulator::merged(&ab, &c);
        let right = RequirementAccumulator::merged(&a, &RequirementAccumulator::merged(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_add_cost_multiplies_materials_and_qp() {
        let cost = MaterialCost {
            materials: BTreeMap::from([(10, 2), (11, 1)]),
            qp: 50_000,
        };
        let mut acc = RequirementAccumulator::new();
        acc.add_cost(EnhancementCategory::AppendSkill, &cost, 3);
        assert_eq!(acc.items[&10].append_skill, 6);
        assert_eq!(acc.item_total(11), 3);
        assert_eq!(acc.currency, 150_000);

        acc.add_cost(EnhancementCategory::Skill, &cost, 0);
        assert_eq!(acc.currency, 150_000);
    }

    #[test]
    fn test_huge_costs_saturate() {
        let cost = MaterialCost {
            materials: BTreeMap::from([(10, u64::MAX / 2)]),
            qp: u64::MAX / 2,
        };
        let mut acc = RequirementAccumulator::new();
        acc.add_cost(EnhancementCategory::Ascension, &cost, 3);
        acc.add_cost(EnhancementCategory::Skill, &cost, 1);

        assert_eq!(acc.item_total(10), u64::MAX);
        assert_eq!(acc.items[&10].ascension, u64::MAX);
        assert_eq!(acc.currency, u64::MAX);

        let merged = RequirementAccumulator::merged(&acc, &acc);
        assert_eq!(merged.item_total(10), u64::MAX);
        assert_eq!(merged.currency, u64::MAX);
    }

    #[test]
    fn test_zero_quantities_leave_no_entries() {
        let mut acc = RequirementAccumulator::new();
        acc.add_item(EnhancementCategory::Skill, 3, 0);
        assert!(acc.items.is_empty());
        assert!(acc.is_empty());
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!(
            "append-skill".parse::<EnhancementCategory>(),
            Ok(EnhancementCategory::AppendSkill)
        );
        assert!("grail".parse::<EnhancementCategory>().is_err());
    }
}
