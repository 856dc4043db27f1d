//! Keyword and concept filtering of harvested articles.
//!
//! Journals that publish taxonomy also publish plenty of other things; an
//! article is kept only if its title, abstract or concepts look taxonomic.

use crate::error::{TaxoError, Result};
use crate::openalex::Work;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use tracing::info;

/// Single-word terms ("checklist" led to too many false positives)
const ONE_WORD_TERMS: &[&str] = &["taxonomic", "taxon", "lectotype", "paratype", "neotype"];

/// Two-word phrases
const TWO_WORD_TERMS: &[&str] = &[
    "new species",
    "novel species",
    "new genus",
    "new genera",
    "holotype specimen",
    "taxonomic revision",
    "species delimitation",
    "taxonomic key",
    "phylogenetic tree",
    "type locality",
    "type specimen",
    "taxonomic rank",
    "species epithet",
    "type designation",
];

/// Abbreviation of "novus/nova" in new taxon names
const NOV: &str = "nov.";

/// OpenAlex concepts: taxonomy (biology), taxon
const TAXONOMY_CONCEPTS: &[&str] = &[
    "https://openalex.org/C58642233",
    "https://openalex.org/C71640776",
];

/// Life Sciences domain
pub const LIFE_SCIENCES_DOMAIN: &str = "https://openalex.org/domains/1";

/// Characters stripped from both ends of abstract words
const WORD_PUNCTUATION: &[char] = &[',', ';', '.', '?', '!', '\'', '(', ')', '-', ']'];

/// Title / abstract / concept filter
pub struct KeywordFilter {
    phrase_patterns: Vec<Regex>,
}

impl KeywordFilter {
    pub fn new() -> Result<Self> {
        let phrase_patterns = TWO_WORD_TERMS
            .iter()
            .map(|phrase| {
                let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
                let pattern = format!(r"\b{}\b", words.join(r"\b\s+\b"));
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| TaxoError::Parse(format!("Invalid phrase pattern {:?}: {}", phrase, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { phrase_patterns })
    }

    /// Whether an article looks taxonomic
    pub fn matches(&self, work: &Work) -> bool {
        if let Some(title) = work.title_text() {
            let title = title.to_lowercase();
            let hit = ONE_WORD_TERMS
                .iter()
                .chain(TWO_WORD_TERMS)
                .chain(std::iter::once(&NOV))
                .any(|term| title.contains(term));
            if hit {
                return true;
            }
        }

        if let Some(index) = &work.abstract_inverted_index {
            if index.contains_key(NOV) {
                return true;
            }

            let words: HashSet<String> = index
                .keys()
                .map(|w| w.to_lowercase().trim_matches(WORD_PUNCTUATION).to_string())
                .collect();
            if ONE_WORD_TERMS.iter().any(|term| words.contains(*term)) {
                return true;
            }

            if let Some(text) = work.abstract_text() {
                if self.phrase_patterns.iter().any(|re| re.is_match(&text)) {
                    return true;
                }
            }
        }

        work.concepts
            .iter()
            .any(|c| TAXONOMY_CONCEPTS.contains(&c.id.as_str()))
    }

    /// Keep matching articles, dropping repeated OpenAlex ids
    pub fn apply(&self, works: Vec<Work>) -> Vec<Work> {
        let total = works.len();
        let kept = dedup_by_id(works.into_iter().filter(|w| self.matches(w)).collect());
        info!(total = total, kept = kept.len(), "Keyword filter applied");
        kept
    }
}

/// Keep articles whose primary topic falls in the given domain
pub fn filter_by_domain(works: Vec<Work>, domain_id: &str) -> Vec<Work> {
    works
        .into_iter()
        .filter(|w| {
            w.primary_topic
                .as_ref()
                .and_then(|t| t.domain.as_ref())
                .and_then(|d| d.id.as_deref())
                == Some(domain_id)
        })
        .collect()
}

/// Drop works whose OpenAlex id was already seen (first occurrence wins)
pub fn dedup_by_id(works: Vec<Work>) -> Vec<Work> {
    let mut seen = HashSet::new();
    works
        .into_iter()
        .filter(|w| seen.insert(w.id.clone()))
        .collect()
}
