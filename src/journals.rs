//! Taxonomic journal list.
//!
//! Homogenizes Wikidata and OpenAlex journal records into one table and
//! decides which journals were still publishing in the harvest window.

use crate::openalex::{Source, YearCount};
use crate::wikidata::Binding;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Label for journals found through Wikidata subjects
pub const SOURCE_WIKIDATA_SUBJECT: &str = "Wikidata taxonomic subject";
/// Label for journals found through IPNI/ZooBank ids
pub const SOURCE_IPNI_ZOOBANK: &str = "IPNI or ZooBank ID";
/// Label for journals found through the OpenAlex taxonomy concept
pub const SOURCE_OPENALEX_CONCEPT: &str = "OpenAlex taxonomy concept";

/// Last year a journal is known to have published, or an upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastActive {
    /// Dissolved (Wikidata) or last year with works (OpenAlex)
    Year(i32),
    /// No works in any listed year; listed years start at this one
    Before(i32),
}

impl LastActive {
    /// Parse the form written by `Display`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.strip_prefix("before ") {
            Some(year) => year.trim().parse().ok().map(LastActive::Before),
            None => value.parse().ok().map(LastActive::Year),
        }
    }
}

impl fmt::Display for LastActive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastActive::Year(y) => write!(f, "{}", y),
            LastActive::Before(y) => write!(f, "before {}", y),
        }
    }
}

/// One journal from any discovery source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalRecord {
    pub title: Option<String>,
    pub wikidata_url: Option<String>,
    pub openalex_id: Option<String>,
    pub issn_l: Option<String>,
    pub issn: Option<String>,
    pub ipni_id: Option<String>,
    pub zoobank_id: Option<String>,
    pub country: Option<String>,
    pub last_active: Option<LastActive>,
    /// `None` when it cannot be decided
    pub dissolved: Option<bool>,
    pub source: String,
}

/// Flat CSV row for `journals.csv`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRow {
    pub title: Option<String>,
    pub wikidata_url: Option<String>,
    pub issn_l: Option<String>,
    pub issn: Option<String>,
    pub ipni_pub_id: Option<String>,
    pub zoobank_pub_id: Option<String>,
    pub openalex_id: Option<String>,
    pub country: Option<String>,
    pub dissolved_year: Option<String>,
    pub dissolved: Option<bool>,
    pub source: String,
}

impl From<&JournalRecord> for JournalRow {
    fn from(j: &JournalRecord) -> Self {
        Self {
            title: j.title.clone(),
            wikidata_url: j.wikidata_url.clone(),
            issn_l: j.issn_l.clone(),
            issn: j.issn.clone(),
            ipni_pub_id: j.ipni_id.clone(),
            zoobank_pub_id: j.zoobank_id.clone(),
            openalex_id: j.openalex_id.clone(),
            country: j.country.clone(),
            dissolved_year: j.last_active.map(|d| d.to_string()),
            dissolved: j.dissolved,
            source: j.source.clone(),
        }
    }
}

impl From<JournalRow> for JournalRecord {
    fn from(row: JournalRow) -> Self {
        Self {
            title: row.title,
            wikidata_url: row.wikidata_url,
            openalex_id: row.openalex_id,
            issn_l: row.issn_l,
            issn: row.issn,
            ipni_id: row.ipni_pub_id,
            zoobank_id: row.zoobank_pub_id,
            country: row.country,
            last_active: row.dissolved_year.as_deref().and_then(LastActive::parse),
            dissolved: row.dissolved,
            source: row.source,
        }
    }
}

/// Convert Wikidata bindings into journal records.
///
/// `countries` maps country entity URLs to two-letter codes; unknown
/// countries are dropped.
pub fn from_wikidata(
    bindings: &[Binding],
    countries: &HashMap<String, String>,
    source: &str,
) -> Vec<JournalRecord> {
    bindings
        .iter()
        .map(|b| JournalRecord {
            title: b.get("itemLabel").cloned(),
            wikidata_url: b.get("item").cloned(),
            openalex_id: b.get("openAlexID").map(|id| modern_source_id(id)),
            issn_l: b.get("issnL").cloned(),
            issn: b.get("issn").cloned(),
            ipni_id: b.get("IPNIpubID").cloned(),
            zoobank_id: b.get("ZooBankPubID").cloned(),
            country: b.get("country").and_then(|c| countries.get(c)).cloned(),
            last_active: b
                .get("dissolved")
                .and_then(|d| d.get(..4))
                .and_then(|y| y.parse().ok())
                .map(LastActive::Year),
            dissolved: None,
            source: source.to_string(),
        })
        .collect()
}

/// Convert an OpenAlex source into a journal record
pub fn from_openalex(source: &Source) -> JournalRecord {
    JournalRecord {
        title: source.display_name.clone(),
        wikidata_url: source.ids.wikidata.clone(),
        openalex_id: Some(short_id(&source.id).to_string()),
        issn_l: source.issn_l.clone(),
        issn: source.issn.as_ref().map(|v| v.join("|")),
        ipni_id: None,
        zoobank_id: None,
        country: source.country_code.clone(),
        last_active: last_active_year(&source.counts_by_year),
        dissolved: None,
        source: SOURCE_OPENALEX_CONCEPT.to_string(),
    }
}

/// Legacy OpenAlex venue ids (`V123`) became source ids (`S123`)
pub fn modern_source_id(id: &str) -> String {
    let id = short_id(id);
    match id.strip_prefix('V') {
        Some(rest) => format!("S{}", rest),
        None => id.to_string(),
    }
}

/// Last path segment of an OpenAlex URL
pub fn short_id(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Most recent year with works, or `Before(oldest listed year)` if none.
/// Expects OpenAlex order (most recent first).
pub fn last_active_year(counts: &[YearCount]) -> Option<LastActive> {
    if let Some(active) = counts.iter().find(|c| c.works_count != 0) {
        return Some(LastActive::Year(active.year));
    }
    counts.last().map(|oldest| LastActive::Before(oldest.year))
}

/// Whether a journal stopped publishing before the harvest window.
///
/// The cutoff is the year before `from_year`.
pub fn dissolved_flag(last_active: Option<LastActive>, from_year: i32) -> Option<bool> {
    let cutoff = from_year - 1;
    match last_active? {
        LastActive::Year(y) => Some(y < cutoff),
        LastActive::Before(y) if y <= cutoff => Some(true),
        LastActive::Before(_) => None,
    }
}

/// Fill in `dissolved` flags and drop duplicate (wikidata, openalex) pairs
pub fn finalize(journals: Vec<JournalRecord>, from_year: i32) -> Vec<JournalRecord> {
    let mut seen = HashSet::new();
    journals
        .into_iter()
        .map(|mut j| {
            j.dissolved = dissolved_flag(j.last_active, from_year);
            j
        })
        .filter(|j| seen.insert((j.wikidata_url.clone(), j.openalex_id.clone())))
        .collect()
}

/// OpenAlex source ids of journals worth harvesting
pub fn harvestable_ids(journals: &[JournalRecord], exclude: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    journals
        .iter()
        .filter(|j| j.dissolved != Some(true))
        .filter_map(|j| j.openalex_id.clone())
        .filter(|id| !exclude.contains(id))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(i32, i64)]) -> Vec<YearCount> {
        pairs
            .iter()
            .map(|(year, works_count)| YearCount { year: *year, works_count: *works_count })
            .collect()
    }

    #[test]
    fn test_modern_source_id() {
        assert_eq!(modern_source_id("V123"), "S123");
        assert_eq!(modern_source_id("S123"), "S123");
        assert_eq!(modern_source_id("https://openalex.org/V9"), "S9");
    }

    #[test]
    fn test_last_active_year() {
        assert_eq!(
            last_active_year(&counts(&[(2024, 0), (2023, 5), (2022, 7)])),
            Some(LastActive::Year(2023))
        );
        assert_eq!(
            last_active_year(&counts(&[(2024, 0), (2023, 0), (2012, 0)])),
            Some(LastActive::Before(2012))
        );
        assert_eq!(last_active_year(&[]), None);
    }

    #[test]
    fn test_dissolved_flag() {
        // harvesting from 2014: cutoff year 2013
        assert_eq!(dissolved_flag(Some(LastActive::Year(2013)), 2014), Some(false));
        assert_eq!(dissolved_flag(Some(LastActive::Year(2012)), 2014), Some(true));
        assert_eq!(dissolved_flag(Some(LastActive::Before(2013)), 2014), Some(true));
        assert_eq!(dissolved_flag(Some(LastActive::Before(2017)), 2014), None);
        assert_eq!(dissolved_flag(None, 2014), None);
    }

    #[test]
    fn test_from_wikidata() {
        let mut b = Binding::new();
        b.insert("item".into(), "http://www.wikidata.org/entity/Q1".into());
        b.insert("itemLabel".into(), "Old Journal".into());
        b.insert("openAlexID".into(), "V77".into());
        b.insert("dissolved".into(), "1999-01-01T00:00:00Z".into());
        b.insert("country".into(), "http://www.wikidata.org/entity/Q31".into());

        let mut countries = HashMap::new();
        countries.insert("http://www.wikidata.org/entity/Q31".to_string(), "BE".to_string());

        let journals = from_wikidata(&[b], &countries, SOURCE_WIKIDATA_SUBJECT);
        assert_eq!(journals[0].openalex_id.as_deref(), Some("S77"));
        assert_eq!(journals[0].last_active, Some(LastActive::Year(1999)));
        assert_eq!(journals[0].country.as_deref(), Some("BE"));
    }

    #[test]
    fn test_finalize_and_harvestable() {
        let a = JournalRecord {
            wikidata_url: Some("Q1".into()),
            openalex_id: Some("S1".into()),
            source: SOURCE_WIKIDATA_SUBJECT.into(),
            ..Default::default()
        };
        let dup = JournalRecord {
            source: SOURCE_IPNI_ZOOBANK.into(),
            ..a.clone()
        };
        let dead = JournalRecord {
            openalex_id: Some("S2".into()),
            last_active: Some(LastActive::Year(2001)),
            ..Default::default()
        };
        let skipped = JournalRecord {
            openalex_id: Some("S3".into()),
            ..Default::default()
        };

        let journals = finalize(vec![a, dup, dead, skipped], 2014);
        assert_eq!(journals.len(), 3);
        assert_eq!(journals[1].dissolved, Some(true));

        let ids = harvestable_ids(&journals, &["S3".to_string()]);
        assert_eq!(ids, vec!["S1".to_string()]);

        let row = JournalRow::from(&journals[1]);
        assert_eq!(row.dissolved_year.as_deref(), Some("2001"));
        let back = JournalRecord::from(row);
        assert_eq!(back.last_active, Some(LastActive::Year(2001)));
        assert_eq!(back.dissolved, Some(true));
    }

    #[test]
    fn test_last_active_parse() {
        assert_eq!(LastActive::parse("2019"), Some(LastActive::Year(2019)));
        assert_eq!(LastActive::parse("before 2012"), Some(LastActive::Before(2012)));
        assert_eq!(LastActive::parse(&LastActive::Before(2012).to_string()), Some(LastActive::Before(2012)));
        assert_eq!(LastActive::parse("unknown"), None);
    }
}
