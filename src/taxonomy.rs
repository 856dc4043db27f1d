//! Taxonomy Lookup built from the GBIF backbone (`Taxon.tsv`).
//!
//! Maps a species canonical name to its lineage (genus up to kingdom).
//! Built once, read-only afterwards, so it can be shared freely between readers.

use crate::error::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Taxonomic status excluded from the lookup
const DOUBTFUL: &str = "doubtful";

/// Taxonomic ranks tracked per species, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Genus,
    Family,
    Order,
    Class,
    Phylum,
    Kingdom,
}

impl Rank {
    /// All ranks, finest first
    pub const ALL: [Rank; 6] = [
        Rank::Genus,
        Rank::Family,
        Rank::Order,
        Rank::Class,
        Rank::Phylum,
        Rank::Kingdom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Genus => "genus",
            Rank::Family => "family",
            Rank::Order => "order",
            Rank::Class => "class",
            Rank::Phylum => "phylum",
            Rank::Kingdom => "kingdom",
        }
    }

    /// Parse a rank name as used on the command line
    pub fn parse(name: &str) -> Option<Rank> {
        Rank::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

/// Full lineage of one species. Ranks missing in the backbone are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lineage {
    pub genus: Option<String>,
    pub family: Option<String>,
    pub order: Option<String>,
    pub class: Option<String>,
    pub phylum: Option<String>,
    pub kingdom: Option<String>,
}

impl Lineage {
    /// Taxon name at the given rank
    pub fn rank(&self, rank: Rank) -> Option<&str> {
        let value = match rank {
            Rank::Genus => &self.genus,
            Rank::Family => &self.family,
            Rank::Order => &self.order,
            Rank::Class => &self.class,
            Rank::Phylum => &self.phylum,
            Rank::Kingdom => &self.kingdom,
        };
        value.as_deref()
    }
}

/// Options applied while reading the backbone
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// Keep only these kingdoms (empty = keep all)
    pub kingdoms: Vec<String>,
}

/// One backbone row. Only the columns we need; the rest are ignored.
#[derive(Debug, Deserialize)]
struct BackboneRow {
    #[serde(rename = "canonicalName", default)]
    canonical_name: Option<String>,
    #[serde(rename = "taxonomicStatus", default)]
    taxonomic_status: Option<String>,
    #[serde(default)]
    genus: Option<String>,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    phylum: Option<String>,
    #[serde(default)]
    kingdom: Option<String>,
}

/// Read-only species -> lineage map
#[derive(Debug, Clone, Default)]
pub struct TaxonomyLookup {
    entries: HashMap<String, Lineage>,
}

impl TaxonomyLookup {
    /// Build from (canonical name, lineage) pairs. The first lineage seen for a name wins.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Lineage)>,
    {
        let mut map = HashMap::new();
        for (name, lineage) in entries {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            map.entry(name).or_insert(lineage);
        }
        Self { entries: map }
    }

    /// Load the backbone from a tab-separated file
    pub fn from_path(path: &Path, options: &LookupOptions) -> Result<Self> {
        info!(path = %path.display(), "Loading taxonomic backbone");
        let file = File::open(path)?;
        Self::from_reader(file, options)
    }

    /// Load the backbone from any tab-separated reader.
    ///
    /// Rows that fail to parse are skipped, as are doubtful names and rows
    /// without a canonical name.
    pub fn from_reader<R: Read>(reader: R, options: &LookupOptions) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .from_reader(reader);

        let mut entries = Vec::new();
        let mut skipped = 0usize;

        for record in rdr.deserialize::<BackboneRow>() {
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable backbone line");
                    skipped += 1;
                    continue;
                }
            };

            if row.taxonomic_status.as_deref() == Some(DOUBTFUL) {
                continue;
            }
            let Some(name) = non_empty(row.canonical_name) else {
                continue;
            };
            let kingdom = non_empty(row.kingdom);
            if !options.kingdoms.is_empty()
                && !kingdom
                    .as_ref()
                    .is_some_and(|k| options.kingdoms.iter().any(|keep| keep == k))
            {
                continue;
            }

            entries.push((
                name,
                Lineage {
                    genus: non_empty(row.genus),
                    family: non_empty(row.family),
                    order: non_empty(row.order),
                    class: non_empty(row.class),
                    phylum: non_empty(row.phylum),
                    kingdom,
                },
            ));
        }

        let lookup = Self::from_entries(entries);
        info!(species = lookup.len(), skipped = skipped, "Backbone loaded");
        Ok(lookup)
    }

    pub fn get(&self, canonical_name: &str) -> Option<&Lineage> {
        self.entries.get(canonical_name)
    }

    pub fn contains(&self, canonical_name: &str) -> bool {
        self.entries.contains_key(canonical_name)
    }

    /// All canonical names in the lookup
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
