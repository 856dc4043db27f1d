//! Pipeline stages.
//!
//! Each stage takes its input as records and returns records; the binary
//! decides where they are read from and written to.

use crate::config::PipelineConfig;
use crate::demand::{supply_and_demand, DemandList, SupplyDemandTable};
use crate::disambiguate::disambiguate;
use crate::error::{Result, TaxoError};
use crate::extract::{collapse_by_author, extract_appearances, filter_by_country, AuthorAppearance};
use crate::filter::{filter_by_domain, KeywordFilter};
use crate::journals::{self, JournalRecord, SOURCE_IPNI_ZOOBANK, SOURCE_WIKIDATA_SUBJECT};
use crate::merge::{group_trace, merge_all, CanonicalAuthor, GroupTraceRow};
use crate::openalex::{OpenAlexClient, Work, WorksQuery, TAXONOMY_CONCEPT};
use crate::species::SpeciesMatcher;
use crate::store::write_jsonl;
use crate::supply::{count_by_rank, count_by_species, TaxonCount};
use crate::taxonomy::{Rank, TaxonomyLookup};
use crate::wikidata::{build_subject_query, WikidataClient, IPNI_ZOOBANK_QUERY, SYSTEMATICS_SUBJECTS, TAXONOMY_SUBJECTS};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Journals harvested at the same time
const HARVEST_CONCURRENCY: usize = 2;

/// Find taxonomic journals on Wikidata and OpenAlex.
///
/// Country codes are optional; if that lookup fails journals are kept
/// without a country.
pub async fn discover_journals(
    wikidata: &WikidataClient,
    openalex: &OpenAlexClient,
    from_year: i32,
) -> Result<Vec<JournalRecord>> {
    let countries = match wikidata.country_codes().await {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "Country code lookup failed, continuing without countries");
            HashMap::new()
        }
    };

    let taxonomy_query = build_subject_query(TAXONOMY_SUBJECTS);
    let systematics_query = build_subject_query(SYSTEMATICS_SUBJECTS);
    let (taxonomy, systematics, ipni_zoobank) = futures::try_join!(
        wikidata.select(&taxonomy_query),
        wikidata.select(&systematics_query),
        wikidata.select(IPNI_ZOOBANK_QUERY),
    )?;

    let mut records = journals::from_wikidata(&taxonomy, &countries, SOURCE_WIKIDATA_SUBJECT);
    records.extend(journals::from_wikidata(&systematics, &countries, SOURCE_WIKIDATA_SUBJECT));
    records.extend(journals::from_wikidata(&ipni_zoobank, &countries, SOURCE_IPNI_ZOOBANK));

    let sources = openalex
        .fetch_sources(&format!("concepts.id:{}", TAXONOMY_CONCEPT))
        .await?;
    records.extend(
        sources
            .iter()
            .filter(|s| s.source_type.as_deref() == Some("journal"))
            .map(journals::from_openalex),
    );

    let found = records.len();
    let records = journals::finalize(records, from_year);
    info!(
        found = found,
        unique = records.len(),
        dissolved = records.iter().filter(|j| j.dissolved == Some(true)).count(),
        "Journal discovery complete"
    );
    Ok(records)
}

/// Writes filtered articles as numbered JSON-lines files of `batch_size` works
pub struct BatchWriter {
    dir: PathBuf,
    batch_size: usize,
    buffer: Vec<Work>,
    next_batch: usize,
    written: usize,
}

impl BatchWriter {
    pub fn new(dir: &Path, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TaxoError::Validation("batch_size must be positive".to_string()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            batch_size,
            buffer: Vec::new(),
            next_batch: 1,
            written: 0,
        })
    }

    pub fn push(&mut self, works: Vec<Work>) -> Result<()> {
        self.buffer.extend(works);
        while self.buffer.len() >= self.batch_size {
            let rest = self.buffer.split_off(self.batch_size);
            let full = std::mem::replace(&mut self.buffer, rest);
            self.write(&full)?;
        }
        Ok(())
    }

    /// Write what is left; returns the number of works written overall
    pub fn finish(mut self) -> Result<usize> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.write(&rest)?;
        }
        Ok(self.written)
    }

    fn write(&mut self, works: &[Work]) -> Result<()> {
        let path = self.dir.join(format!("articles_{:04}.jsonl", self.next_batch));
        write_jsonl(&path, works)?;
        info!(path = %path.display(), works = works.len(), "Wrote article batch");
        self.next_batch += 1;
        self.written += works.len();
        Ok(())
    }
}

/// Harvest, filter and store the articles of every journal.
///
/// A journal that keeps failing after retries is logged and skipped.
/// Returns the number of articles kept.
pub async fn harvest_articles(
    client: &OpenAlexClient,
    journal_ids: &[String],
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<usize> {
    let filter = KeywordFilter::new()?;
    let mut writer = BatchWriter::new(out_dir, config.batch_size)?;
    let mut failed = 0usize;

    let mut results = stream::iter(journal_ids.iter())
        .map(|id| async move {
            let query = WorksQuery {
                filter: format!("primary_location.source.id:{}", id),
                from_date: Some(config.from_date.clone()),
                to_date: Some(config.to_date.clone()),
                countries: config.countries.clone(),
            };
            (id, client.fetch_works(&query).await)
        })
        .buffered(HARVEST_CONCURRENCY);

    while let Some((id, result)) = results.next().await {
        match result {
            Ok(works) => {
                let mut kept = filter.apply(works);
                if let Some(domain) = &config.domain {
                    kept = filter_by_domain(kept, domain);
                }
                writer.push(kept)?
            }
            Err(e) => {
                failed += 1;
                warn!(journal = %id, error = %e, "Skipping journal");
            }
        }
    }

    let kept = writer.finish()?;
    info!(journals = journal_ids.len(), failed = failed, kept = kept, "Article harvest complete");
    Ok(kept)
}

/// Fill in the species each article is about
pub fn tag_subjects(works: Vec<Work>, matcher: &SpeciesMatcher) -> Vec<Work> {
    let tagged: Vec<Work> = works
        .into_iter()
        .map(|mut work| {
            work.species_subject = matcher.find_in_work(&work);
            work
        })
        .collect();

    info!(
        articles = tagged.len(),
        with_species = tagged.iter().filter(|w| !w.species_subject.is_empty()).count(),
        "Tagged species subjects"
    );
    tagged
}

/// One row per source author id, restricted to `countries` when given
pub fn build_author_table(works: &[Work], countries: &[String]) -> Vec<AuthorAppearance> {
    let appearances = filter_by_country(extract_appearances(works), countries);
    collapse_by_author(appearances)
}

/// Derive keys for every appearance. Appearances with an unusable display
/// name are dropped and returned as errors.
pub fn prepare(
    appearances: Vec<AuthorAppearance>,
    lookup: &TaxonomyLookup,
) -> (Vec<AuthorAppearance>, Vec<TaxoError>) {
    let mut ready = Vec::with_capacity(appearances.len());
    let mut rejected = Vec::new();

    for mut appearance in appearances {
        match appearance.derive_keys(lookup) {
            Ok(()) => ready.push(appearance),
            Err(e) => {
                warn!(author_id = %appearance.author_id, error = %e, "Skipping author");
                rejected.push(e);
            }
        }
    }
    (ready, rejected)
}

/// Outcome of the disambiguation stage
#[derive(Debug, Default)]
pub struct DisambiguationReport {
    pub input_count: usize,
    pub authors: Vec<CanonicalAuthor>,
    /// Members of every multi-member group
    pub trace: Vec<GroupTraceRow>,
    pub rejected: Vec<TaxoError>,
}

/// Normalize, cluster and merge a table of author appearances
pub fn disambiguate_authors(
    appearances: Vec<AuthorAppearance>,
    lookup: &TaxonomyLookup,
) -> Result<DisambiguationReport> {
    let input_count = appearances.len();
    let (ready, mut rejected) = prepare(appearances, lookup);

    let result = disambiguate(&ready);
    rejected.extend(result.rejected);

    let clustered: Vec<usize> = result.clusters.iter().flatten().copied().collect();
    let members: Vec<AuthorAppearance> = clustered.iter().map(|&i| ready[i].clone()).collect();

    // re-index clusters onto `members` so rejected appearances never reach the merger
    let mut offset = 0;
    let clusters: Vec<Vec<usize>> = result
        .clusters
        .iter()
        .map(|c| {
            let ids = (offset..offset + c.len()).collect();
            offset += c.len();
            ids
        })
        .collect();

    let authors = merge_all(&members, &clusters)?;
    let trace = group_trace(&members, &clusters);

    info!(
        input = input_count,
        authors = authors.len(),
        rejected = rejected.len(),
        "Author disambiguation complete"
    );

    Ok(DisambiguationReport {
        input_count,
        authors,
        trace,
        rejected,
    })
}

/// Supply tables keyed by the name used in their file name
pub fn supply_tables(authors: &[CanonicalAuthor], lookup: &TaxonomyLookup) -> Vec<(&'static str, Vec<TaxonCount>)> {
    vec![
        ("species", count_by_species(authors)),
        (Rank::Order.as_str(), count_by_rank(authors, lookup, Rank::Order)),
        (Rank::Kingdom.as_str(), count_by_rank(authors, lookup, Rank::Kingdom)),
    ]
}

/// Order-level supply next to every demand list
pub fn supply_demand_table(
    authors: &[CanonicalAuthor],
    lists: &[DemandList],
    lookup: &TaxonomyLookup,
) -> SupplyDemandTable {
    supply_and_demand(&count_by_species(authors), lists, lookup, Rank::Order)
}
