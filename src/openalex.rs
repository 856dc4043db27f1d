//! OpenAlex API Client
//!
//! Harvests works (articles) per journal and sources (journals) per concept.
//!
//! API Best Practices (per OpenAlex docs):
//! - Use `mailto:email` parameter for polite pool (10 req/s vs 1 req/s)
//! - Use `per-page=200` for maximum results per page
//! - Use cursor paging (`cursor=*`, then `meta.next_cursor`) for full result sets
//! - Implement exponential backoff for retries

use crate::error::{TaxoError, Result};
use rand::Rng;
use reqwest::Client;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// OpenAlex API base URL
const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Maximum results per page (OpenAlex limit)
const MAX_PER_PAGE: usize = 200;

/// Retries per page on rate limiting, server errors and transport failures
const MAX_RETRIES: u32 = 3;

/// Concept id of "Taxonomy (biology)"
pub const TAXONOMY_CONCEPT: &str = "C58642233";

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One OpenAlex work, reduced to the fields the pipeline uses.
///
/// `species_subject` is not an OpenAlex field; it is filled in by the
/// species parsing stage and carried along in the JSON-lines snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Work {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    pub title: Option<String>,
    pub display_name: Option<String>,
    pub publication_date: Option<String>,
    pub publication_year: Option<i32>,
    pub doi: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authorships: Vec<Authorship>,
    pub abstract_inverted_index: Option<BTreeMap<String, Vec<usize>>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub concepts: Vec<Concept>,
    pub primary_topic: Option<Topic>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub species_subject: Vec<String>,
}

impl Work {
    /// Title, preferring `display_name`
    pub fn title_text(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.title.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Abstract reconstructed from the inverted index
    pub fn abstract_text(&self) -> Option<String> {
        self.abstract_inverted_index
            .as_ref()
            .map(reconstruct_abstract)
            .filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authorship {
    pub author: Option<AuthorRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub institutions: Vec<InstitutionRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstitutionRef {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topic {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub domain: Option<TopicLevel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicLevel {
    pub id: Option<String>,
    pub display_name: Option<String>,
}

/// One OpenAlex source (journal)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Source {
    pub id: String,
    pub display_name: Option<String>,
    pub issn_l: Option<String>,
    pub issn: Option<Vec<String>>,
    pub country_code: Option<String>,
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    #[serde(default)]
    pub ids: SourceIds,
    #[serde(default, deserialize_with = "null_as_default")]
    pub counts_by_year: Vec<YearCount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceIds {
    pub wikidata: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YearCount {
    pub year: i32,
    #[serde(default)]
    pub works_count: i64,
}

/// OpenAlex API response structures
#[derive(Debug, Deserialize)]
struct OpenAlexResponse<T> {
    meta: OpenAlexMeta,
    // plain `default` would require `T: Default`
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexMeta {
    #[serde(default)]
    count: i64,
    next_cursor: Option<String>,
}

/// Filter options for harvesting works
#[derive(Debug, Clone, Default)]
pub struct WorksQuery {
    /// Base filter, e.g. `primary_location.source.id:S123`
    pub filter: String,
    /// Inclusive lower publication date (YYYY-MM-DD)
    pub from_date: Option<String>,
    /// Inclusive upper publication date (YYYY-MM-DD)
    pub to_date: Option<String>,
    /// Restrict to works with an author from one of these countries
    pub countries: Vec<String>,
}

/// OpenAlex client with polite-pool identification and retry policy
pub struct OpenAlexClient {
    client: Client,
    mailto: String,
    max_retries: u32,
}

impl OpenAlexClient {
    /// Create a new client identified by `mailto` for the polite pool
    pub fn new(mailto: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(format!("taxosupply/0.1 (mailto:{})", mailto))
            .build()
            .map_err(|e| TaxoError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            mailto: mailto.to_string(),
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch every work matching the query, following the cursor to the end.
    pub async fn fetch_works(&self, query: &WorksQuery) -> Result<Vec<Work>> {
        let filter = build_works_filter(query);
        info!(filter = %filter, "Starting OpenAlex works harvest");
        self.fetch_all("works", &filter).await
    }

    /// Fetch every source matching a filter (e.g. `concepts.id:C58642233`).
    pub async fn fetch_sources(&self, filter: &str) -> Result<Vec<Source>> {
        info!(filter = filter, "Starting OpenAlex sources harvest");
        self.fetch_all("sources", filter).await
    }

    async fn fetch_all<T: DeserializeOwned>(&self, entity: &str, filter: &str) -> Result<Vec<T>> {
        let mut all_results = Vec::new();
        let mut cursor = "*".to_string();
        let mut page = 0usize;

        loop {
            let url = build_page_url(entity, filter, &cursor, &self.mailto);
            debug!(url = %url, page = page, "Fetching OpenAlex page");

            let body = self.fetch_page(&url).await?;
            let response: OpenAlexResponse<T> = serde_json::from_str(&body).map_err(|e| {
                TaxoError::Parse(format!("Failed to parse OpenAlex response: {}", e))
            })?;

            if page == 0 {
                info!(entity = entity, filter = filter, count = response.meta.count, "OpenAlex result count");
            }

            let got = response.results.len();
            all_results.extend(response.results);
            page += 1;

            match response.meta.next_cursor {
                Some(next) if got > 0 => cursor = next,
                _ => break,
            }
        }

        info!(entity = entity, total = all_results.len(), pages = page, "OpenAlex harvest complete");
        Ok(all_results)
    }

    /// Fetch page content, retrying rate limits, server errors and transport failures
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let mut retries = 0;

        loop {
            let err = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(TaxoError::Network);
                    }
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        TaxoError::RateLimited(60)
                    } else {
                        TaxoError::Api {
                            code: status.as_u16() as i32,
                            message: format!("OpenAlex API error: {}", status),
                        }
                    }
                }
                Err(e) => TaxoError::Network(e),
            };

            if retries >= self.max_retries || !is_transient(&err) {
                return Err(err);
            }

            let backoff = backoff_delay(retries);
            warn!(
                retries = retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "OpenAlex request failed, backing off"
            );
            tokio::time::sleep(backoff).await;
            retries += 1;
        }
    }
}

/// Whether an error is worth retrying
fn is_transient(err: &TaxoError) -> bool {
    match err {
        TaxoError::RateLimited(_) | TaxoError::Network(_) => true,
        TaxoError::Api { code, .. } => *code >= 500,
        _ => false,
    }
}

/// Exponential backoff (2^n seconds) with up to 500 ms of jitter
fn backoff_delay(retries: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..500);
    Duration::from_secs(2u64.pow(retries)) + Duration::from_millis(jitter)
}

/// Combine base filter, country restriction and date range
fn build_works_filter(query: &WorksQuery) -> String {
    let mut filters = Vec::new();

    if !query.countries.is_empty() {
        filters.push(format!("authorships.countries:{}", query.countries.join("|")));
    }
    if !query.filter.is_empty() {
        filters.push(query.filter.clone());
    }
    if let Some(from) = &query.from_date {
        filters.push(format!("from_publication_date:{}", from));
    }
    if let Some(to) = &query.to_date {
        filters.push(format!("to_publication_date:{}", to));
    }

    filters.join(",")
}

/// Build one cursor-paged OpenAlex URL
fn build_page_url(entity: &str, filter: &str, cursor: &str, mailto: &str) -> String {
    let mut url = format!(
        "{}/{}?per-page={}&cursor={}&mailto={}",
        OPENALEX_API_BASE,
        entity,
        MAX_PER_PAGE,
        urlencoding::encode(cursor),
        urlencoding::encode(mailto)
    );
    if !filter.is_empty() {
        url.push_str(&format!("&filter={}", filter));
    }
    url
}

/// Reconstruct abstract text from inverted index.
/// OpenAlex provides abstract as inverted index for legal reasons.
pub fn reconstruct_abstract(inverted_index: &BTreeMap<String, Vec<usize>>) -> String {
    let mut words: Vec<(usize, &str)> = inverted_index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
        .collect();

    words.sort_by_key(|(pos, _)| *pos);
    words.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" ")
}
