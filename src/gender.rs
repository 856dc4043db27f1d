//! Gender inference from first names.
//!
//! Uses a table of given names with per-gender usage counts (the Wikidata
//! given-name prevalence table). Counts are normalized by each gender's
//! total so that a gender with more recorded people does not dominate.
//! An author gets a gender only when the normalized share of the prevalent
//! gender exceeds the confidence threshold.

use crate::error::Result;
use crate::extract::AuthorAppearance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Minimum share of the prevalent gender
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

/// Language tag of names listed once for all languages
const MULTILINGUAL: &str = "mul";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    Inconclusive,
}

/// Usage counts of one given name in one language
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameCounts {
    pub name: String,
    pub lang: String,
    pub male: f64,
    pub female: f64,
}

#[derive(Debug, Deserialize)]
struct GivenNameRow {
    #[serde(rename = "nameLabel", default)]
    name_label: Option<String>,
    #[serde(rename = "nameLang", default)]
    name_lang: Option<String>,
    #[serde(default)]
    count_male: Option<f64>,
    #[serde(default)]
    count_female: Option<f64>,
}

/// Prevalent gender of a name and its normalized share
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenderEstimate {
    pub gender: Gender,
    pub confidence: f64,
}

impl GenderEstimate {
    fn from_shares(male: f64, female: f64) -> Self {
        if male > female {
            Self {
                gender: Gender::Male,
                confidence: male / (male + female),
            }
        } else if male == female {
            Self {
                gender: Gender::Inconclusive,
                confidence: 0.5,
            }
        } else {
            Self {
                gender: Gender::Female,
                confidence: female / (male + female),
            }
        }
    }
}

/// First name -> gender estimate
#[derive(Debug, Clone, Default)]
pub struct GenderTable {
    names: HashMap<String, GenderEstimate>,
}

impl GenderTable {
    /// Build from raw counts. Totals run over every row; only multilingual
    /// names are kept, the first one seen winning.
    pub fn from_counts(counts: &[NameCounts]) -> Self {
        let total_male: f64 = counts.iter().map(|c| c.male).sum();
        let total_female: f64 = counts.iter().map(|c| c.female).sum();
        let share = |count: f64, total: f64| if total > 0.0 { count / total } else { 0.0 };

        let mut names = HashMap::new();
        for c in counts.iter().filter(|c| c.lang == MULTILINGUAL) {
            let name = c.name.trim();
            if name.is_empty() {
                continue;
            }
            names.entry(name.to_string()).or_insert_with(|| {
                GenderEstimate::from_shares(share(c.male, total_male), share(c.female, total_female))
            });
        }
        Self { names }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "Loading given-name table");
        Self::from_reader(File::open(path)?)
    }

    /// Read the tab-separated given-name table. Unreadable rows are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .from_reader(reader);

        let mut counts = Vec::new();
        for record in rdr.deserialize::<GivenNameRow>() {
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable given-name line");
                    continue;
                }
            };
            counts.push(NameCounts {
                name: row.name_label.unwrap_or_default(),
                lang: row.name_lang.unwrap_or_default(),
                male: row.count_male.unwrap_or(0.0),
                female: row.count_female.unwrap_or(0.0),
            });
        }

        let table = Self::from_counts(&counts);
        info!(rows = counts.len(), names = table.len(), "Given-name table loaded");
        Ok(table)
    }

    pub fn estimate(&self, first_name: &str) -> Option<&GenderEstimate> {
        self.names.get(first_name)
    }

    /// Prevalent gender when its share exceeds `confidence`, otherwise
    /// inconclusive. Unknown names are inconclusive.
    pub fn infer(&self, first_name: &str, confidence: f64) -> Gender {
        match self.estimate(first_name) {
            Some(e) if e.gender != Gender::Inconclusive && e.confidence > confidence => e.gender,
            _ => Gender::Inconclusive,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// First whitespace-delimited word of a display name
pub fn first_name(display_name: &str) -> Option<&str> {
    display_name.split_whitespace().next()
}

/// Row of `gender_per_author.tsv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderRow {
    pub author_id: String,
    pub display_name: String,
    pub publication_year: Option<String>,
    pub first_name: Option<String>,
    pub gender: Gender,
}

/// One row per author appearance
pub fn infer_genders(appearances: &[AuthorAppearance], table: &GenderTable, confidence: f64) -> Vec<GenderRow> {
    let rows: Vec<GenderRow> = appearances
        .iter()
        .map(|a| {
            let first = first_name(&a.display_name);
            GenderRow {
                author_id: a.author_id.clone(),
                display_name: a.display_name.clone(),
                publication_year: a
                    .publication_date
                    .as_deref()
                    .and_then(|d| d.get(..4))
                    .map(String::from),
                first_name: first.map(String::from),
                gender: first.map_or(Gender::Inconclusive, |f| table.infer(f, confidence)),
            }
        })
        .collect();

    info!(
        authors = rows.len(),
        female = rows.iter().filter(|r| r.gender == Gender::Female).count(),
        male = rows.iter().filter(|r| r.gender == Gender::Male).count(),
        "Genders inferred"
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "nameLabel\tnameLang\tcount_male\tcount_female\tcount_other\tcount_undefined
Maria\tmul\t10\t990\t0\t0
Jan\tmul\t900\t100\t0\t0
Andrea\tmul\t500\t500\t0\t0
Maria\ten\t0\t5000\t0\t0
Kim\tmul\t0\t0\t0\t0
broken line
";

    fn table() -> GenderTable {
        GenderTable::from_reader(TABLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_only_multilingual_names() {
        let table = table();
        assert_eq!(table.len(), 4);
        assert!(table.estimate("Maria").is_some());
    }

    #[test]
    fn test_shares_are_normalized() {
        // totals: male 1410, female 6590; the English row counts towards them
        let table = table();
        let jan = table.estimate("Jan").unwrap();
        assert_eq!(jan.gender, Gender::Male);
        assert!(jan.confidence > 0.97);

        // equal raw counts, but female usage is spread over more people
        let andrea = table.estimate("Andrea").unwrap();
        assert_eq!(andrea.gender, Gender::Male);
        assert!(andrea.confidence < DEFAULT_CONFIDENCE);

        let kim = table.estimate("Kim").unwrap();
        assert_eq!(kim.gender, Gender::Inconclusive);
        assert_eq!(kim.confidence, 0.5);
    }

    #[test]
    fn test_infer_threshold() {
        let table = table();
        assert_eq!(table.infer("Maria", DEFAULT_CONFIDENCE), Gender::Female);
        assert_eq!(table.infer("Jan", DEFAULT_CONFIDENCE), Gender::Male);
        assert_eq!(table.infer("Andrea", DEFAULT_CONFIDENCE), Gender::Inconclusive);
        assert_eq!(table.infer("Kim", 0.1), Gender::Inconclusive);
        assert_eq!(table.infer("Zygmunt", 0.1), Gender::Inconclusive);
        assert_eq!(table.infer("Andrea", 0.5), Gender::Male);
    }

    #[test]
    fn test_infer_genders() {
        let appearances = vec![
            AuthorAppearance {
                author_id: "A1".into(),
                display_name: "Maria S. Lopez".into(),
                publication_date: Some("2021-03-04".into()),
                ..Default::default()
            },
            AuthorAppearance {
                author_id: "A2".into(),
                display_name: "  ".into(),
                ..Default::default()
            },
        ];

        let rows = infer_genders(&appearances, &table(), DEFAULT_CONFIDENCE);
        assert_eq!(rows[0].first_name.as_deref(), Some("Maria"));
        assert_eq!(rows[0].publication_year.as_deref(), Some("2021"));
        assert_eq!(rows[0].gender, Gender::Female);
        assert_eq!(rows[1].first_name, None);
        assert_eq!(rows[1].gender, Gender::Inconclusive);
    }
}
