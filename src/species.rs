//! Species name recognition in article titles and abstracts.
//!
//! Anything shaped like a binomial ("Abcd efg") is checked against the set of
//! known canonical names. Abbreviated mentions ("A. efg") are expanded for
//! genera already found in the same text.

use crate::error::{TaxoError, Result};
use crate::openalex::Work;
use crate::taxonomy::TaxonomyLookup;
use regex::Regex;
use std::collections::HashSet;

/// Binomial-shaped candidate
const BINOMIAL_PATTERN: &str = r"[A-Z][a-z]+ [a-z]+";

/// Matches candidate species names against a fixed set of canonical names
pub struct SpeciesMatcher {
    names: HashSet<String>,
    binomial: Regex,
}

impl SpeciesMatcher {
    /// Build from any collection of canonical names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let binomial = Regex::new(BINOMIAL_PATTERN)
            .map_err(|e| TaxoError::Parse(format!("Invalid binomial pattern: {}", e)))?;
        Ok(Self {
            names: names.into_iter().map(Into::into).collect(),
            binomial,
        })
    }

    /// Build from every name in a taxonomy lookup
    pub fn from_lookup(lookup: &TaxonomyLookup) -> Result<Self> {
        Self::new(lookup.names())
    }

    /// Species mentioned in a work.
    ///
    /// The title is searched first; the abstract is only searched when the
    /// title mentions no species.
    pub fn find_in_work(&self, work: &Work) -> Vec<String> {
        if let Some(title) = work.title_text() {
            let found = self.find_in_text(title);
            if !found.is_empty() {
                return found;
            }
        }
        work.abstract_text()
            .map(|text| self.find_in_text(&text))
            .unwrap_or_default()
    }

    /// Known species in a piece of text, in order of first mention, without repeats
    pub fn find_in_text(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();

        for candidate in self.binomial.find_iter(text) {
            let candidate = candidate.as_str();
            if self.names.contains(candidate) && !found.iter().any(|f| f == candidate) {
                found.push(candidate.to_string());
            }
        }

        let full_names = found.clone();
        for taxon in &full_names {
            for expanded in self.abbreviations(taxon, text) {
                if self.names.contains(&expanded) && !found.contains(&expanded) {
                    found.push(expanded);
                }
            }
        }

        found
    }

    /// Expand "G. epithet" mentions using the genus of an already found taxon
    fn abbreviations(&self, taxon: &str, text: &str) -> Vec<String> {
        let Some(genus) = taxon.split_whitespace().next() else {
            return Vec::new();
        };
        let Some(initial) = genus.chars().next() else {
            return Vec::new();
        };

        let pattern = format!(r"{}\. ([a-z]+)", regex::escape(&initial.to_string()));
        let Ok(re) = Regex::new(&pattern) else {
            return Vec::new();
        };

        re.captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|epithet| format!("{} {}", genus, epithet.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
