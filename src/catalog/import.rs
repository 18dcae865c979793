use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::{
    fs,
    io::{AsyncBufReadExt, BufReader},
};

use super::{Catalog, GameServant, GrailCost};
use crate::model::ItemId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CatalogRow {
    Servant(GameServant),
    GrailCosts { rarity: u8, costs: Vec<GrailCost> },
    GrailItem { item_id: ItemId },
}

/// Reads a catalog from a JSONL file. Each non-empty line holds one record
/// keyed by its kind: `servant`, `grail_costs` or `grail_item`.
pub async fn load_catalog(path: &Path) -> Result<Catalog> {
    let file = fs::File::open(path)
        .await
        .with_context(|| format!("failed to open catalog file: {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut line_number = 0;
    let mut rows = Vec::new();
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: CatalogRow = serde_json::from_str(line)
            .with_context(|| format!("failed to parse catalog line {}: {}", line_number, line))?;
        rows.push(row);
    }

    let catalog = catalog_from_rows(rows);
    tracing::info!(
        "Loaded catalog with {} servants from {}",
        catalog.len(),
        path.display()
    );
    Ok(catalog)
}

pub fn parse_catalog(content: &str) -> Result<Catalog> {
    let mut rows = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: CatalogRow = serde_json::from_str(line)
            .with_context(|| format!("failed to parse catalog line {}: {}", index + 1, line))?;
        rows.push(row);
    }
    Ok(catalog_from_rows(rows))
}

fn catalog_from_rows(rows: Vec<CatalogRow>) -> Catalog {
    let mut servants = Vec::new();
    let mut grail_costs: BTreeMap<u8, Vec<GrailCost>> = BTreeMap::new();
    let mut grail_item_id = None;

    for row in rows {
        match row {
            CatalogRow::Servant(servant) => servants.push(servant),
            CatalogRow::GrailCosts { rarity, costs } => {
                grail_costs.entry(rarity).or_default().extend(costs);
            }
            CatalogRow::GrailItem { item_id } => grail_item_id = Some(item_id),
        }
    }

    let catalog = Catalog::new(servants, grail_costs);
    match grail_item_id {
        Some(item_id) => catalog.with_grail_item_id(item_id),
        None => catalog,
    }
}
