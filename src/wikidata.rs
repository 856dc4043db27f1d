//! Wikidata SPARQL client.
//!
//! Finds journals by taxonomic subject or by IPNI/ZooBank publication id,
//! and resolves country entities to ISO 3166-1 alpha-2 codes.

use crate::error::{TaxoError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Wikidata query service endpoint
const SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";

/// Taxonomy-related subjects: taxonomy, biological classification, plant and
/// animal taxonomy, biological, botanical and zoological nomenclature
pub const TAXONOMY_SUBJECTS: &[&str] = &[
    "Q8269924", "Q11398", "Q1138178", "Q1469725", "Q522190", "Q3310776", "Q3343211",
];

/// Systematics, phylogenetics, animal phylogeny (queried separately, the
/// combined query is too long for the endpoint)
pub const SYSTEMATICS_SUBJECTS: &[&str] = &["Q3516404", "Q171184", "Q115135896"];

/// Optional journal columns shared by every journal query
const JOURNAL_OPTIONALS: &str = r#"
    OPTIONAL{?item wdt:P10283 ?openAlexID}
    OPTIONAL{?item wdt:P7363 ?issnL}
    OPTIONAL{?item wdt:P236 ?issn}
    OPTIONAL{?item wdt:P2008 ?IPNIpubID}
    OPTIONAL{?item wdt:P2007 ?ZooBankPubID}
    OPTIONAL{?item wdt:P576 ?dissolved}
    OPTIONAL{?item wdt:P495 ?country}

    SERVICE wikibase:label { bd:serviceParam wikibase:language "[AUTO_LANGUAGE],en". }
}"#;

/// Journals with any ZooBank or IPNI publication id
pub const IPNI_ZOOBANK_QUERY: &str = r#"SELECT DISTINCT ?item ?itemLabel ?openAlexID ?issnL ?issn ?IPNIpubID ?ZooBankPubID ?dissolved ?country
WHERE {
    VALUES ?journaltype {wd:Q5633421 wd:Q737498}
    ?item wdt:P31/wdt:P279* ?journaltype .
    {
    ?item p:P2008 ?zooid.
    ?zooid (ps:P2008) _:anyValueP2007.
    }
    UNION
    {
    ?item p:P2007 ?ipniid.
    ?ipniid (ps:P2007) _:anyValueP2008.
    }
    OPTIONAL{?item wdt:P10283 ?openAlexID}
    OPTIONAL{?item wdt:P7363 ?issnL}
    OPTIONAL{?item wdt:P236 ?issn}
    OPTIONAL{?item wdt:P2008 ?IPNIpubID}
    OPTIONAL{?item wdt:P2007 ?ZooBankPubID}
    OPTIONAL{?item wdt:P576 ?dissolved}
    OPTIONAL{?item wdt:P495 ?country}

    SERVICE wikibase:label { bd:serviceParam wikibase:language "[AUTO_LANGUAGE],en". }
}"#;

/// Countries (instances of Q6256) with their two-letter code (P297)
pub const COUNTRY_CODE_QUERY: &str = r#"SELECT DISTINCT ?item ?itemLabel ?twoLetterCode WHERE {
  ?item wdt:P297 ?twoLetterCode
  SERVICE wikibase:label { bd:serviceParam wikibase:language "[AUTO_LANGUAGE]". }
  {
    SELECT DISTINCT ?item WHERE {
      ?item p:P31 ?statement0.
      ?statement0 (ps:P31/(wdt:P279*)) wd:Q6256.
      ?item p:P297 ?statement1.
      ?statement1 (ps:P297) _:anyValueP297.
    }
  }
}"#;

/// One result row: variable name -> value
pub type Binding = HashMap<String, String>;

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

/// Build a query for scientific/academic journals whose main subject (P921)
/// or field of work (P101) is one of `subjects` or a subclass of one.
pub fn build_subject_query(subjects: &[&str]) -> String {
    let mut query = String::from(
        "SELECT DISTINCT ?item ?itemLabel ?openAlexID ?issnL ?issn \
         ?IPNIpubID ?ZooBankPubID ?dissolved ?country\nWHERE {\n    \
         VALUES ?journaltype {wd:Q5633421 wd:Q737498}\n    \
         ?item wdt:P31/wdt:P279* ?journaltype .",
    );

    for (i, subject) in subjects.iter().enumerate() {
        let n = 2 + i * 2;
        if i > 0 {
            query.push_str("\n      UNION");
        }
        query.push_str(&format!(
            "\n      {{\n        ?item p:P921 ?statement{n}.\n        \
             ?statement{n} (ps:P921/(wdt:P279*)) wd:{subject}.\n      }}\n      \
             UNION\n      {{\n        ?item p:P101 ?statement{m}.\n        \
             ?statement{m} (ps:P101/(wdt:P279*)) wd:{subject}.\n      }}",
            n = n,
            m = n + 1,
            subject = subject
        ));
    }

    query.push_str(JOURNAL_OPTIONALS);
    query
}

/// Wikidata query service client
pub struct WikidataClient {
    client: Client,
}

impl WikidataClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("taxosupply/0.1 (journal discovery)")
            .build()
            .map_err(|e| TaxoError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Run a SELECT query and flatten every binding to plain strings
    pub async fn select(&self, query: &str) -> Result<Vec<Binding>> {
        debug!(bytes = query.len(), "Running SPARQL query");

        let response = self
            .client
            .get(SPARQL_ENDPOINT)
            .query(&[("query", query), ("format", "json")])
            .header("Accept", "application/sparql-results+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaxoError::Api {
                code: status.as_u16() as i32,
                message: format!("Wikidata query service error: {}", status),
            });
        }

        let body = response.text().await?;
        let bindings = parse_bindings(&body)?;
        info!(rows = bindings.len(), "SPARQL query complete");
        Ok(bindings)
    }

    /// Map of country entity URL -> two-letter code
    pub async fn country_codes(&self) -> Result<HashMap<String, String>> {
        let bindings = self.select(COUNTRY_CODE_QUERY).await?;
        Ok(country_code_map(&bindings))
    }
}

/// Parse a SPARQL JSON result document into flat bindings
pub fn parse_bindings(body: &str) -> Result<Vec<Binding>> {
    let response: SparqlResponse = serde_json::from_str(body)
        .map_err(|e| TaxoError::Parse(format!("Failed to parse SPARQL response: {}", e)))?;

    Ok(response
        .results
        .bindings
        .into_iter()
        .map(|row| row.into_iter().map(|(k, v)| (k, v.value)).collect())
        .collect())
}

fn country_code_map(bindings: &[Binding]) -> HashMap<String, String> {
    bindings
        .iter()
        .filter_map(|b| Some((b.get("item")?.clone(), b.get("twoLetterCode")?.clone())))
        .collect()
}
