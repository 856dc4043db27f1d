//! Pipeline configuration and data directory layout.
//!
//! Settings live in a JSON file (`~/.taxosupply.json` by default). A missing
//! file means defaults; command-line flags override file values.

use crate::error::{Result, TaxoError};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = ".taxosupply.json";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Default config path: `~/.taxosupply.json`
pub fn default_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(CONFIG_FILE_NAME))
        .ok_or_else(|| TaxoError::Config("Cannot determine home directory".to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Contact address for the OpenAlex polite pool
    pub mailto: Option<String>,
    /// First publication date harvested (`YYYY-MM-DD`)
    pub from_date: String,
    /// Last publication date harvested (`YYYY-MM-DD`)
    pub to_date: String,
    /// ISO 3166-1 alpha-2 codes; empty means every country
    pub countries: Vec<String>,
    pub data_dir: PathBuf,
    /// OpenAlex source ids never harvested
    pub exclude_journals: Vec<String>,
    /// Articles per interim JSON-lines file
    pub batch_size: usize,
    /// Keep only articles whose primary topic is in this OpenAlex domain
    pub domain: Option<String>,
    /// Minimum share of the prevalent gender for a first name
    pub gender_confidence: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mailto: None,
            from_date: "2014-01-01".to_string(),
            to_date: "2023-12-31".to_string(),
            countries: Vec::new(),
            data_dir: PathBuf::from("./data"),
            exclude_journals: Vec::new(),
            batch_size: 10_000,
            domain: None,
            gender_confidence: crate::gender::DEFAULT_CONFIDENCE,
        }
    }
}

impl PipelineConfig {
    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| TaxoError::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Check dates and sizes
    pub fn validate(&self) -> Result<()> {
        let from = parse_date(&self.from_date)?;
        let to = parse_date(&self.to_date)?;
        if from > to {
            return Err(TaxoError::Config(format!(
                "from_date {} is after to_date {}",
                self.from_date, self.to_date
            )));
        }
        if self.batch_size == 0 {
            return Err(TaxoError::Config("batch_size must be positive".to_string()));
        }
        if self.gender_confidence.is_nan() || self.gender_confidence <= 0.0 || self.gender_confidence >= 1.0 {
            return Err(TaxoError::Config(format!(
                "gender_confidence must be between 0 and 1, got {}",
                self.gender_confidence
            )));
        }
        if let Some(bad) = self.countries.iter().find(|c| c.len() != 2) {
            return Err(TaxoError::Config(format!("Not a two-letter country code: {}", bad)));
        }
        Ok(())
    }

    /// Year of `from_date`
    pub fn from_year(&self) -> Result<i32> {
        Ok(parse_date(&self.from_date)?.year())
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| TaxoError::Config(format!("Invalid date {:?}: {}", value, e)))
}

/// Where each stage reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn interim(&self) -> PathBuf {
        self.root.join("interim")
    }

    pub fn processed(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn external(&self) -> PathBuf {
        self.root.join("external")
    }

    /// Taxonomic backbone table
    pub fn backbone(&self) -> PathBuf {
        self.external().join("backbone").join("Taxon.tsv")
    }

    pub fn journals(&self) -> PathBuf {
        self.processed().join("journals.csv")
    }

    /// Directory of filtered article batches
    pub fn article_batches(&self) -> PathBuf {
        self.interim().join("articles")
    }

    pub fn articles_with_subjects(&self) -> PathBuf {
        self.processed().join("articles_with_subjects.jsonl")
    }

    pub fn authors(&self) -> PathBuf {
        self.processed().join("authors.tsv")
    }

    pub fn authors_disambiguated(&self) -> PathBuf {
        self.processed().join("authors_disambiguated.tsv")
    }

    pub fn merged_groups(&self) -> PathBuf {
        self.interim().join("merged_groups.tsv")
    }

    /// Wikidata given names with per-gender counts
    pub fn given_names(&self) -> PathBuf {
        self.external().join("given_names.tsv")
    }

    /// Directory of demand species lists
    pub fn demand_lists(&self) -> PathBuf {
        self.external().join("demand")
    }

    pub fn genders(&self) -> PathBuf {
        self.processed().join("gender_per_author.tsv")
    }

    pub fn supply_and_demand(&self, rank: &str) -> PathBuf {
        self.processed().join(format!("supply_and_demand_{}.tsv", rank))
    }

    /// Supply counts for one rank (`species`, `order`, `kingdom`)
    pub fn supply(&self, rank: &str) -> PathBuf {
        self.processed().join(format!("supply_{}.tsv", rank))
    }

    /// Create every directory the pipeline writes to
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.raw(),
            self.interim(),
            self.article_batches(),
            self.processed(),
            self.external().join("backbone"),
            self.demand_lists(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
