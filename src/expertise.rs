//! Expertise projection: species studied -> orders and kingdoms studied.
//!
//! Species missing from the lookup contribute nothing.

use crate::taxonomy::{Rank, TaxonomyLookup};
use std::collections::{BTreeMap, BTreeSet};

/// Orders and kingdoms an author has worked on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expertise {
    pub orders: BTreeSet<String>,
    pub kingdoms: BTreeSet<String>,
}

/// Project a set of species onto taxonomic orders and kingdoms.
pub fn project<'a, I>(species: I, lookup: &TaxonomyLookup) -> Expertise
where
    I: IntoIterator<Item = &'a String>,
{
    let mut expertise = Expertise::default();
    for lineage in species.into_iter().filter_map(|s| lookup.get(s)) {
        if let Some(order) = &lineage.order {
            expertise.orders.insert(order.clone());
        }
        if let Some(kingdom) = &lineage.kingdom {
            expertise.kingdoms.insert(kingdom.clone());
        }
    }
    expertise
}

/// Project a set of species onto every rank at once.
pub fn project_lineage<'a, I>(species: I, lookup: &TaxonomyLookup) -> BTreeMap<Rank, BTreeSet<String>>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut ranks: BTreeMap<Rank, BTreeSet<String>> =
        Rank::ALL.into_iter().map(|r| (r, BTreeSet::new())).collect();

    for lineage in species.into_iter().filter_map(|s| lookup.get(s)) {
        for rank in Rank::ALL {
            if let Some(taxon) = lineage.rank(rank) {
                ranks.entry(rank).or_default().insert(taxon.to_string());
            }
        }
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::Lineage;

    fn lookup() -> TaxonomyLookup {
        TaxonomyLookup::from_entries(vec![
            (
                "Carabus auratus".to_string(),
                Lineage {
                    genus: Some("Carabus".into()),
                    family: Some("Carabidae".into()),
                    order: Some("Coleoptera".into()),
                    class: Some("Insecta".into()),
                    phylum: Some("Arthropoda".into()),
                    kingdom: Some("Animalia".into()),
                },
            ),
            (
                "Pieris rapae".to_string(),
                Lineage {
                    genus: Some("Pieris".into()),
                    family: Some("Pieridae".into()),
                    order: Some("Lepidoptera".into()),
                    class: Some("Insecta".into()),
                    phylum: Some("Arthropoda".into()),
                    kingdom: Some("Animalia".into()),
                },
            ),
            (
                "Nomen nudum".to_string(),
                Lineage {
                    kingdom: Some("Plantae".into()),
                    ..Default::default()
                },
            ),
        ])
    }

    #[test]
    fn test_project_unions_and_skips_misses() {
        let species: Vec<String> = vec![
            "Carabus auratus".into(),
            "Pieris rapae".into(),
            "Unknown thing".into(),
            "Nomen nudum".into(),
        ];
        let expertise = project(&species, &lookup());

        assert_eq!(
            expertise.orders.iter().collect::<Vec<_>>(),
            vec!["Coleoptera", "Lepidoptera"]
        );
        assert_eq!(
            expertise.kingdoms.iter().collect::<Vec<_>>(),
            vec!["Animalia", "Plantae"]
        );
    }

    #[test]
    fn test_project_empty() {
        let species: Vec<String> = vec!["Unknown thing".into()];
        assert_eq!(project(&species, &lookup()), Expertise::default());
    }

    #[test]
    fn test_project_lineage() {
        let species: Vec<String> = vec!["Carabus auratus".into(), "Pieris rapae".into()];
        let ranks = project_lineage(&species, &lookup());

        assert_eq!(ranks[&Rank::Family].len(), 2);
        assert_eq!(ranks[&Rank::Class].len(), 1);
        assert!(ranks[&Rank::Genus].contains("Pieris"));
    }
}
