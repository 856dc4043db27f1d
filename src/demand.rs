//! Demand for taxonomic expertise.
//!
//! A demand list is a policy or conservation species list (red lists,
//! invasive species, crop wild relatives, ...). Each list counts the
//! distinct listed species that exist in the taxonomic backbone, per
//! taxon, next to the number of authors working on those species.

use crate::error::Result;
use crate::supply::TaxonCount;
use crate::taxonomy::{Rank, TaxonomyLookup};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// One listed species, optionally pinned to a kingdom against homonyms
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DemandEntry {
    pub species: String,
    pub kingdom: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DemandRow {
    #[serde(rename = "scientificName", default)]
    scientific_name: Option<String>,
    #[serde(default)]
    kingdom: Option<String>,
}

/// Genus and species epithet; authorship and infraspecific parts dropped
pub fn binomial(scientific_name: &str) -> Option<String> {
    let mut words = scientific_name.split_whitespace();
    match (words.next(), words.next()) {
        (Some(genus), Some(epithet)) => Some(format!("{} {}", genus, epithet)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandList {
    pub name: String,
    pub entries: BTreeSet<DemandEntry>,
}

impl DemandList {
    /// Read a tab-separated list with a `scientificName` column and an
    /// optional `kingdom` column. Rows without a binomial are skipped.
    pub fn from_reader<R: Read>(name: &str, reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);

        let mut entries = BTreeSet::new();
        let mut skipped = 0usize;
        for record in rdr.deserialize::<DemandRow>() {
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    debug!(list = name, error = %e, "Skipping unreadable demand line");
                    skipped += 1;
                    continue;
                }
            };
            let Some(species) = row.scientific_name.as_deref().and_then(binomial) else {
                skipped += 1;
                continue;
            };
            let kingdom = row.kingdom.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
            entries.insert(DemandEntry { species, kingdom });
        }

        debug!(list = name, entries = entries.len(), skipped = skipped, "Demand list read");
        Ok(Self {
            name: name.to_string(),
            entries,
        })
    }

    /// The list is named after the file stem
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_reader(&name, File::open(path)?)
    }

    /// Listed species found in the backbone, each once
    pub fn matched_species<'a>(&'a self, lookup: &TaxonomyLookup) -> BTreeSet<&'a str> {
        self.entries
            .iter()
            .filter(|e| match (lookup.get(&e.species), &e.kingdom) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(lineage), Some(kingdom)) => lineage.kingdom.as_deref() == Some(kingdom.as_str()),
            })
            .map(|e| e.species.as_str())
            .collect()
    }
}

/// Every `*.tsv` list in a directory, by name. A missing directory has no lists.
pub fn read_demand_dir(dir: &Path) -> Result<Vec<DemandList>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "No demand list directory");
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "tsv"))
        .collect();
    files.sort();

    let lists = files.iter().map(|f| DemandList::from_path(f)).collect::<Result<Vec<_>>>()?;
    info!(lists = lists.len(), "Demand lists loaded");
    Ok(lists)
}

/// Supply and demand of one taxon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyDemandRow {
    pub taxon: String,
    pub kingdom: Option<String>,
    /// Author counts of its species, summed
    pub authors: usize,
    /// Listed species per demand list, in list order
    pub demand: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyDemandTable {
    pub rank: Rank,
    pub lists: Vec<String>,
    pub rows: Vec<SupplyDemandRow>,
}

impl SupplyDemandTable {
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![self.rank.as_str().to_string(), "kingdom".to_string(), "authors".to_string()];
        header.extend(self.lists.iter().cloned());
        header
    }

    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = vec![
                    row.taxon.clone(),
                    row.kingdom.clone().unwrap_or_default(),
                    row.authors.to_string(),
                ];
                record.extend(row.demand.iter().map(|n| n.to_string()));
                record
            })
            .collect()
    }
}

type RowKey = (Option<String>, String);

/// Row of the taxon `species` belongs to; `None` outside the backbone or
/// without a name at `rank`
fn row_for<'a>(
    rows: &'a mut BTreeMap<RowKey, SupplyDemandRow>,
    species: &str,
    lookup: &TaxonomyLookup,
    rank: Rank,
    list_count: usize,
) -> Option<&'a mut SupplyDemandRow> {
    let lineage = lookup.get(species)?;
    let taxon = lineage.rank(rank)?.to_string();
    let kingdom = lineage.kingdom.clone();
    Some(
        rows.entry((kingdom.clone(), taxon.clone()))
            .or_insert_with(|| SupplyDemandRow {
                taxon,
                kingdom,
                authors: 0,
                demand: vec![0; list_count],
            }),
    )
}

/// Join species-level supply with every demand list at `rank`.
///
/// Only taxa with some supply or demand get a row. Rows are sorted by
/// kingdom, then taxon.
pub fn supply_and_demand(
    species_supply: &[TaxonCount],
    lists: &[DemandList],
    lookup: &TaxonomyLookup,
    rank: Rank,
) -> SupplyDemandTable {
    let mut rows: BTreeMap<RowKey, SupplyDemandRow> = BTreeMap::new();

    for count in species_supply {
        if let Some(row) = row_for(&mut rows, &count.taxon, lookup, rank, lists.len()) {
            row.authors += count.authors;
        }
    }
    for (i, list) in lists.iter().enumerate() {
        for species in list.matched_species(lookup) {
            if let Some(row) = row_for(&mut rows, species, lookup, rank, lists.len()) {
                row.demand[i] += 1;
            }
        }
    }

    let table = SupplyDemandTable {
        rank,
        lists: lists.iter().map(|l| l.name.clone()).collect(),
        rows: rows.into_values().collect(),
    };
    info!(rank = rank.as_str(), taxa = table.rows.len(), lists = table.lists.len(), "Supply and demand joined");
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::Lineage;
    use tempfile::TempDir;

    fn lookup() -> TaxonomyLookup {
        let lineage = |order: &str, kingdom: &str| Lineage {
            order: Some(order.into()),
            kingdom: Some(kingdom.into()),
            ..Default::default()
        };
        TaxonomyLookup::from_entries(vec![
            ("Carabus auratus".to_string(), lineage("Coleoptera", "Animalia")),
            ("Carabus nemoralis".to_string(), lineage("Coleoptera", "Animalia")),
            ("Pieris rapae".to_string(), lineage("Lepidoptera", "Animalia")),
            ("Quercus robur".to_string(), lineage("Fagales", "Plantae")),
        ])
    }

    fn list(name: &str, body: &str) -> DemandList {
        DemandList::from_reader(name, body.as_bytes()).unwrap()
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial("Carabus auratus Linnaeus, 1761").as_deref(), Some("Carabus auratus"));
        assert_eq!(binomial("  Quercus   robur "), Some("Quercus robur".to_string()));
        assert_eq!(binomial("Carabus"), None);
    }

    #[test]
    fn test_read_list() {
        let redlist = list(
            "redlist",
            "scientificName\tcategory\nCarabus auratus L.\tVU\nCarabus auratus\tEN\n\tCR\nUnknown thing\tEX\n",
        );
        assert_eq!(redlist.entries.len(), 2);

        let matched = redlist.matched_species(&lookup());
        assert_eq!(matched.into_iter().collect::<Vec<_>>(), vec!["Carabus auratus"]);
    }

    #[test]
    fn test_kingdom_pin() {
        let crops = list("crops", "scientificName\tkingdom\nQuercus robur\tPlantae\nPieris rapae\tPlantae\n");
        let matched = crops.matched_species(&lookup());
        assert_eq!(matched.into_iter().collect::<Vec<_>>(), vec!["Quercus robur"]);
    }

    #[test]
    fn test_supply_and_demand() {
        let supply = vec![
            TaxonCount { taxon: "Carabus auratus".into(), authors: 3 },
            TaxonCount { taxon: "Carabus nemoralis".into(), authors: 1 },
            TaxonCount { taxon: "Not in backbone".into(), authors: 9 },
        ];
        let lists = vec![
            list("invasives", "scientificName\nPieris rapae\n"),
            list("redlist", "scientificName\nCarabus auratus\nCarabus nemoralis\n"),
        ];

        let table = supply_and_demand(&supply, &lists, &lookup(), Rank::Order);
        assert_eq!(table.header(), vec!["order", "kingdom", "authors", "invasives", "redlist"]);
        assert_eq!(
            table.records(),
            vec![
                vec!["Coleoptera", "Animalia", "4", "0", "2"],
                vec!["Lepidoptera", "Animalia", "0", "1", "0"],
            ]
        );
    }

    #[test]
    fn test_read_demand_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b_redlist.tsv"), "scientificName\nCarabus auratus\n").unwrap();
        std::fs::write(dir.path().join("a_crops.tsv"), "scientificName\nQuercus robur\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let lists = read_demand_dir(dir.path()).unwrap();
        let names: Vec<&str> = lists.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a_crops", "b_redlist"]);

        assert!(read_demand_dir(&dir.path().join("missing")).unwrap().is_empty());
    }
}
