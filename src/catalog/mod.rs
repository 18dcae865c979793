pub mod import;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{CostumeId, GameServantId, ItemId};

pub use import::load_catalog;

/// Item id of the grail consumed per post-max-level threshold.
pub const DEFAULT_GRAIL_ITEM_ID: ItemId = 7999;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCost {
    #[serde(default)]
    pub materials: BTreeMap<ItemId, u64>,
    #[serde(default)]
    pub qp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCostume {
    pub name: String,
    #[serde(default)]
    pub materials: MaterialCost,
}

/// Static cost data for one servant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameServant {
    pub id: GameServantId,
    pub name: String,
    pub rarity: u8,
    pub max_level: u32,
    /// Keyed by the ascension tier being reached (1..=4).
    #[serde(default)]
    pub ascension_materials: BTreeMap<u8, MaterialCost>,
    /// Keyed by the level a skill is upgraded from (1..=9).
    #[serde(default)]
    pub skill_materials: BTreeMap<u8, MaterialCost>,
    #[serde(default)]
    pub append_skill_materials: BTreeMap<u8, MaterialCost>,
    #[serde(default)]
    pub costumes: BTreeMap<CostumeId, GameCostume>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrailCost {
    pub level: u32,
    pub qp: u64,
}

/// Read-only game data shared by every computation in a session.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    servants: HashMap<GameServantId, GameServant>,
    grail_costs: BTreeMap<u8, Vec<GrailCost>>,
    grail_item_id: ItemId,
}

impl Catalog {
    pub fn new(
        servants: impl IntoIterator<Item = GameServant>,
        grail_costs: BTreeMap<u8, Vec<GrailCost>>,
    ) -> Self {
        let mut grail_costs = grail_costs;
        for table in grail_costs.values_mut() {
            table.sort_by_key(|cost| cost.level);
        }
        Self {
            servants: servants.into_iter().map(|s| (s.id, s)).collect(),
            grail_costs,
            grail_item_id: DEFAULT_GRAIL_ITEM_ID,
        }
    }

    pub fn with_grail_item_id(mut self, item_id: ItemId) -> Self {
        self.grail_item_id = item_id;
        self
    }

    pub fn servant(&self, id: GameServantId) -> Option<&GameServant> {
        self.servants.get(&id)
    }

    pub fn servants(&self) -> impl Iterator<Item = &GameServant> {
        self.servants.values()
    }

    /// Grail thresholds for a rarity, ascending by level.
    pub fn grail_costs(&self, rarity: u8) -> &[GrailCost] {
        self.grail_costs
            .get(&rarity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn grail_item_id(&self) -> ItemId {
        self.grail_item_id
    }

    pub fn len(&self) -> usize {
        self.servants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grail_costs_sorted_on_construction() {
        let catalog = Catalog::new(
            Vec::new(),
            BTreeMap::from([(
                4,
                vec![
                    GrailCost { level: 92, qp: 4_000_000 },
                    GrailCost { level: 90, qp: 3_000_000 },
                ],
            )]),
        );

        let levels: Vec<u32> = catalog.grail_costs(4).iter().map(|c| c.level).collect();
        assert_eq!(levels, vec![90, 92]);
        assert!(catalog.grail_costs(5).is_empty());
        assert_eq!(catalog.grail_item_id(), DEFAULT_GRAIL_ITEM_ID);
    }
}
