//! Supply of taxonomic expertise: how many disambiguated authors work on
//! each species, order or kingdom.

use crate::merge::CanonicalAuthor;
use crate::taxonomy::{Rank, TaxonomyLookup};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonCount {
    pub taxon: String,
    pub authors: usize,
}

/// Most authors first, then by name
fn into_sorted(counts: BTreeMap<String, usize>) -> Vec<TaxonCount> {
    let mut rows: Vec<TaxonCount> = counts
        .into_iter()
        .map(|(taxon, authors)| TaxonCount { taxon, authors })
        .collect();
    rows.sort_by(|a, b| b.authors.cmp(&a.authors).then_with(|| a.taxon.cmp(&b.taxon)));
    rows
}

/// Authors per species studied
pub fn count_by_species(authors: &[CanonicalAuthor]) -> Vec<TaxonCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for author in authors {
        for species in &author.species_subjects {
            *counts.entry(species.clone()).or_default() += 1;
        }
    }
    into_sorted(counts)
}

/// Authors per taxon at `rank`. Each author counts once per taxon however
/// many of its species fall under it.
pub fn count_by_rank(authors: &[CanonicalAuthor], lookup: &TaxonomyLookup, rank: Rank) -> Vec<TaxonCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for author in authors {
        let taxa: BTreeSet<&str> = author
            .species_subjects
            .iter()
            .filter_map(|s| lookup.get(s))
            .filter_map(|lineage| lineage.rank(rank))
            .collect();
        for taxon in taxa {
            *counts.entry(taxon.to_string()).or_default() += 1;
        }
    }
    into_sorted(counts)
}
