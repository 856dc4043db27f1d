//! Author Record Extractor.
//!
//! Turns articles into one appearance per (article, listed author), each
//! carrying the author's name, first listed institution and the species the
//! article is about.

use crate::error::Result;
use crate::expertise;
use crate::names;
use crate::openalex::Work;
use crate::store::{join_multi, split_multi};
use crate::taxonomy::TaxonomyLookup;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Keys attached by the normalizer and projector before disambiguation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedKeys {
    pub truncated_key: String,
    pub stripped_key: String,
    pub orders: BTreeSet<String>,
    pub kingdoms: BTreeSet<String>,
}

/// One author on one article
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorAppearance {
    /// Source author id; not unique to a real person
    pub author_id: String,
    pub display_name: String,
    pub orcid: Option<String>,
    pub article_id: String,
    pub publication_date: Option<String>,
    /// First listed institution, if any
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    pub country_code: Option<String>,
    pub species_subjects: BTreeSet<String>,
    /// Set by `pipeline::prepare`
    pub keys: Option<DerivedKeys>,
}

impl AuthorAppearance {
    /// Attach name keys and taxonomic expertise.
    ///
    /// Fails with `InvalidInput` for an unusable display name, leaving the
    /// appearance without keys.
    pub fn derive_keys(&mut self, lookup: &TaxonomyLookup) -> Result<()> {
        let name = names::normalize(&self.display_name)?;
        let expertise = expertise::project(&self.species_subjects, lookup);
        self.keys = Some(DerivedKeys {
            truncated_key: name.truncated,
            stripped_key: name.stripped,
            orders: expertise.orders,
            kingdoms: expertise.kingdoms,
        });
        Ok(())
    }
}

/// Flat TSV row for appearances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppearanceRow {
    pub author_id: String,
    pub display_name: String,
    pub orcid: Option<String>,
    pub article_id: String,
    pub publication_date: Option<String>,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    pub country_code: Option<String>,
    pub species_subjects: String,
}

impl From<&AuthorAppearance> for AppearanceRow {
    fn from(a: &AuthorAppearance) -> Self {
        Self {
            author_id: a.author_id.clone(),
            display_name: a.display_name.clone(),
            orcid: a.orcid.clone(),
            article_id: a.article_id.clone(),
            publication_date: a.publication_date.clone(),
            institution_id: a.institution_id.clone(),
            institution_name: a.institution_name.clone(),
            country_code: a.country_code.clone(),
            species_subjects: join_multi(&a.species_subjects),
        }
    }
}

impl From<AppearanceRow> for AuthorAppearance {
    fn from(row: AppearanceRow) -> Self {
        Self {
            author_id: row.author_id,
            display_name: row.display_name,
            orcid: row.orcid,
            article_id: row.article_id,
            publication_date: row.publication_date,
            institution_id: row.institution_id,
            institution_name: row.institution_name,
            country_code: row.country_code,
            species_subjects: split_multi(&row.species_subjects),
            keys: None,
        }
    }
}

/// One appearance per listed author. Authorships without an author id or
/// display name are skipped.
pub fn extract_appearances(works: &[Work]) -> Vec<AuthorAppearance> {
    let mut appearances = Vec::new();
    let mut skipped = 0usize;

    for work in works {
        let species: BTreeSet<String> = work.species_subject.iter().cloned().collect();

        for authorship in &work.authorships {
            let Some(author) = &authorship.author else {
                skipped += 1;
                continue;
            };
            let (Some(author_id), Some(display_name)) = (&author.id, &author.display_name) else {
                skipped += 1;
                continue;
            };

            let institution = authorship.institutions.first();
            appearances.push(AuthorAppearance {
                author_id: author_id.clone(),
                display_name: display_name.clone(),
                orcid: author.orcid.clone(),
                article_id: work.id.clone(),
                publication_date: work.publication_date.clone(),
                institution_id: institution.and_then(|i| i.id.clone()),
                institution_name: institution.and_then(|i| i.display_name.clone()),
                country_code: institution.and_then(|i| i.country_code.clone()),
                species_subjects: species.clone(),
                keys: None,
            });
        }
    }

    info!(
        articles = works.len(),
        appearances = appearances.len(),
        skipped = skipped,
        "Extracted author appearances"
    );
    appearances
}

/// Keep appearances whose institution is in one of `countries`.
/// An empty list keeps everything.
pub fn filter_by_country(appearances: Vec<AuthorAppearance>, countries: &[String]) -> Vec<AuthorAppearance> {
    if countries.is_empty() {
        return appearances;
    }
    appearances
        .into_iter()
        .filter(|a| {
            a.country_code
                .as_ref()
                .is_some_and(|c| countries.iter().any(|keep| keep.eq_ignore_ascii_case(c)))
        })
        .collect()
}

/// One row per source author id: the most recent appearance, carrying the
/// species of all that author's appearances.
///
/// Output keeps the order in which author ids first appear.
pub fn collapse_by_author(appearances: Vec<AuthorAppearance>) -> Vec<AuthorAppearance> {
    let total = appearances.len();
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, AuthorAppearance> = HashMap::new();
    let mut species: HashMap<String, BTreeSet<String>> = HashMap::new();

    for appearance in appearances {
        species
            .entry(appearance.author_id.clone())
            .or_default()
            .extend(appearance.species_subjects.iter().cloned());

        match latest.get_mut(&appearance.author_id) {
            Some(current) => {
                // ISO dates compare lexicographically; a missing date is oldest
                if appearance.publication_date > current.publication_date {
                    *current = appearance;
                }
            }
            None => {
                order.push(appearance.author_id.clone());
                latest.insert(appearance.author_id.clone(), appearance);
            }
        }
    }

    let collapsed: Vec<AuthorAppearance> = order
        .into_iter()
        .filter_map(|id| {
            let mut row = latest.remove(&id)?;
            row.species_subjects = species.remove(&id).unwrap_or_default();
            Some(row)
        })
        .collect();

    debug!(before = total, after = collapsed.len(), "Collapsed appearances by author id");
    collapsed
}
