//! taxosupply - Taxonomic Expertise Supply Pipeline
//!
//! Discovers taxonomic journals, harvests their articles from OpenAlex,
//! links articles to species, disambiguates authors and counts how many
//! authors work on each taxon.
//!
//! ## Usage
//!
//! ### Whole pipeline
//! ```bash
//! taxosupply --mailto me@example.org run
//! ```
//!
//! ### Single stage
//! ```bash
//! taxosupply --data-dir ./data disambiguate
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use taxosupply::config::{default_config_path, DataLayout, PipelineConfig};
use taxosupply::demand;
use taxosupply::extract::{AppearanceRow, AuthorAppearance};
use taxosupply::gender::{self, GenderTable};
use taxosupply::journals::{self, JournalRecord, JournalRow};
use taxosupply::merge::{CanonicalAuthor, CanonicalAuthorRow};
use taxosupply::openalex::{OpenAlexClient, Work};
use taxosupply::species::SpeciesMatcher;
use taxosupply::taxonomy::{LookupOptions, TaxonomyLookup};
use taxosupply::wikidata::WikidataClient;
use taxosupply::{pipeline, store};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Taxonomic Expertise Supply Pipeline
#[derive(Parser)]
#[command(name = "taxosupply")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file (default: ~/.taxosupply.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Contact address for the OpenAlex polite pool (overrides config)
    #[arg(long, global = true)]
    mailto: Option<String>,

    /// First publication date, YYYY-MM-DD (overrides config)
    #[arg(long, global = true)]
    from_date: Option<String>,

    /// Last publication date, YYYY-MM-DD (overrides config)
    #[arg(long, global = true)]
    to_date: Option<String>,

    /// Author country filter, repeatable (overrides config)
    #[arg(long = "country", global = true)]
    countries: Vec<String>,

    /// Restrict the taxonomic backbone to these kingdoms, repeatable
    #[arg(long = "kingdom", global = true)]
    kingdoms: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover taxonomic journals on Wikidata and OpenAlex
    Journals,
    /// Harvest and keyword-filter the articles of every active journal
    Articles,
    /// Tag articles with the species they mention
    Subjects,
    /// Extract one author row per source author id
    Authors,
    /// Cluster and merge author rows into real-world authors
    Disambiguate,
    /// Count authors per species, order and kingdom
    Count,
    /// Infer author genders from first names
    Gender,
    /// Join supply with the demand species lists
    Demand,
    /// Run every stage in order
    Run,
    /// Show the resolved configuration
    Config {
        /// Write the resolved configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = resolve_config(&cli, &config_path)?;
    let layout = config.layout();

    match cli.command {
        Commands::Journals => run_journals(&config, &layout).await,
        Commands::Articles => run_articles(&config, &layout).await,
        Commands::Subjects => run_subjects(&layout, &cli.kingdoms),
        Commands::Authors => run_authors(&config, &layout),
        Commands::Disambiguate => run_disambiguate(&layout, &cli.kingdoms),
        Commands::Count => run_count(&layout, &cli.kingdoms),
        Commands::Gender => run_gender(&config, &layout),
        Commands::Demand => run_demand(&layout, &cli.kingdoms),
        Commands::Run => {
            run_journals(&config, &layout).await?;
            run_articles(&config, &layout).await?;
            run_subjects(&layout, &cli.kingdoms)?;
            run_authors(&config, &layout)?;
            run_disambiguate(&layout, &cli.kingdoms)?;
            run_count(&layout, &cli.kingdoms)?;
            if layout.given_names().exists() {
                run_gender(&config, &layout)?;
            } else {
                warn!(path = %layout.given_names().display(), "No given-name table, skipping gender inference");
            }
            run_demand(&layout, &cli.kingdoms)
        }
        Commands::Config { init } => show_config(&config, &config_path, init),
    }
}

/// Config file values with command-line overrides applied
fn resolve_config(cli: &Cli, path: &Path) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(mailto) = &cli.mailto {
        config.mailto = Some(mailto.clone());
    }
    if let Some(from) = &cli.from_date {
        config.from_date = from.clone();
    }
    if let Some(to) = &cli.to_date {
        config.to_date = to.clone();
    }
    if !cli.countries.is_empty() {
        config.countries = cli.countries.iter().map(|c| c.to_uppercase()).collect();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn show_config(config: &PipelineConfig, path: &Path, init: bool) -> Result<()> {
    println!("Config file: {}", path.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    if init {
        config.save(path).context("Failed to write config file")?;
        println!("Saved: {}", path.display());
    }
    Ok(())
}

fn openalex_client(config: &PipelineConfig) -> Result<OpenAlexClient> {
    let mailto = match config.mailto.as_deref() {
        Some(m) => m,
        None => {
            warn!("No mailto configured, OpenAlex will use the common pool");
            ""
        }
    };
    Ok(OpenAlexClient::new(mailto)?)
}

fn load_lookup(layout: &DataLayout, kingdoms: &[String]) -> Result<TaxonomyLookup> {
    let path = layout.backbone();
    let options = LookupOptions {
        kingdoms: kingdoms.to_vec(),
    };
    let lookup = TaxonomyLookup::from_path(&path, &options)
        .with_context(|| format!("Failed to read taxonomic backbone {}", path.display()))?;
    println!("Taxonomic backbone: {} species", lookup.len());
    Ok(lookup)
}

// ============================================================================
// Stages
// ============================================================================

async fn run_journals(config: &PipelineConfig, layout: &DataLayout) -> Result<()> {
    println!("\n--- Stage 1: Journal Discovery ---");
    layout.ensure().context("Failed to create data directories")?;

    let wikidata = WikidataClient::new()?;
    let openalex = openalex_client(config)?;
    let from_year = config.from_year()?;

    let journals = pipeline::discover_journals(&wikidata, &openalex, from_year)
        .await
        .context("Journal discovery failed")?;

    let rows: Vec<JournalRow> = journals.iter().map(JournalRow::from).collect();
    let path = layout.journals();
    store::write_csv(&path, &rows).context("Failed to write journal list")?;

    let active = journals.iter().filter(|j| j.dissolved != Some(true)).count();
    println!("Found {} journals ({} not dissolved).", journals.len(), active);
    println!("Saved: {}", path.display());
    Ok(())
}

async fn run_articles(config: &PipelineConfig, layout: &DataLayout) -> Result<()> {
    println!("\n--- Stage 2: Article Harvest ---");
    layout.ensure().context("Failed to create data directories")?;

    let rows: Vec<JournalRow> = store::read_csv(&layout.journals())
        .with_context(|| format!("Failed to read {}", layout.journals().display()))?;
    let records: Vec<JournalRecord> = rows.into_iter().map(JournalRecord::from).collect();
    let ids = journals::harvestable_ids(&records, &config.exclude_journals);

    println!(
        "Harvesting {} journals ({} to {})...",
        ids.len(),
        config.from_date,
        config.to_date
    );

    let client = openalex_client(config)?;
    let out_dir = layout.article_batches();
    let kept = pipeline::harvest_articles(&client, &ids, config, &out_dir)
        .await
        .context("Article harvest failed")?;

    println!("Kept {} taxonomic articles.", kept);
    println!("Saved: {}", out_dir.display());
    Ok(())
}

fn run_subjects(layout: &DataLayout, kingdoms: &[String]) -> Result<()> {
    println!("\n--- Stage 3: Species Subjects ---");

    let lookup = load_lookup(layout, kingdoms)?;
    let matcher = SpeciesMatcher::from_lookup(&lookup)?;

    let works: Vec<Work> = store::read_jsonl_dir(&layout.article_batches())
        .context("Failed to read article batches")?;
    let works = taxosupply::filter::dedup_by_id(works);
    let tagged = pipeline::tag_subjects(works, &matcher);

    let path = layout.articles_with_subjects();
    store::write_jsonl(&path, &tagged).context("Failed to write tagged articles")?;

    let with_species = tagged.iter().filter(|w| !w.species_subject.is_empty()).count();
    println!("{} / {} articles mention a known species.", with_species, tagged.len());
    println!("Saved: {}", path.display());
    Ok(())
}

fn run_authors(config: &PipelineConfig, layout: &DataLayout) -> Result<()> {
    println!("\n--- Stage 4: Author Extraction ---");

    let works: Vec<Work> = store::read_jsonl(&layout.articles_with_subjects())
        .context("Failed to read tagged articles")?;
    let appearances = pipeline::build_author_table(&works, &config.countries);

    let rows: Vec<AppearanceRow> = appearances.iter().map(AppearanceRow::from).collect();
    let path = layout.authors();
    store::write_tsv(&path, &rows).context("Failed to write author table")?;

    println!("Extracted {} authors from {} articles.", rows.len(), works.len());
    println!("Saved: {}", path.display());
    Ok(())
}

fn run_disambiguate(layout: &DataLayout, kingdoms: &[String]) -> Result<()> {
    println!("\n--- Stage 5: Author Disambiguation ---");

    let lookup = load_lookup(layout, kingdoms)?;
    let rows: Vec<AppearanceRow> = store::read_tsv(&layout.authors())
        .context("Failed to read author table")?;
    let appearances: Vec<AuthorAppearance> = rows.into_iter().map(AuthorAppearance::from).collect();

    let report = pipeline::disambiguate_authors(appearances, &lookup)?;
    for error in &report.rejected {
        warn!(error = %error, "Rejected author row");
    }

    let rows: Vec<CanonicalAuthorRow> = report.authors.iter().map(CanonicalAuthorRow::from).collect();
    let path = layout.authors_disambiguated();
    store::write_tsv(&path, &rows).context("Failed to write disambiguated authors")?;
    store::write_tsv(&layout.merged_groups(), &report.trace).context("Failed to write merged groups")?;

    info!(
        input = report.input_count,
        authors = report.authors.len(),
        rejected = report.rejected.len(),
        "Disambiguation stage done"
    );
    println!(
        "{} author rows -> {} authors ({} rejected).",
        report.input_count,
        report.authors.len(),
        report.rejected.len()
    );
    println!("Saved: {}", path.display());
    Ok(())
}

fn run_count(layout: &DataLayout, kingdoms: &[String]) -> Result<()> {
    println!("\n--- Stage 6: Supply Counts ---");

    let lookup = load_lookup(layout, kingdoms)?;
    let rows: Vec<CanonicalAuthorRow> = store::read_tsv(&layout.authors_disambiguated())
        .context("Failed to read disambiguated authors")?;
    let authors: Vec<CanonicalAuthor> = rows.into_iter().map(CanonicalAuthor::from).collect();

    for (rank, counts) in pipeline::supply_tables(&authors, &lookup) {
        let path = layout.supply(rank);
        store::write_tsv(&path, &counts)
            .with_context(|| format!("Failed to write {} counts", rank))?;

        if let Some(top) = counts.first() {
            println!("{}: {} taxa, most studied {} ({} authors)", rank, counts.len(), top.taxon, top.authors);
        }
        println!("Saved: {}", path.display());
    }
    Ok(())
}

fn run_gender(config: &PipelineConfig, layout: &DataLayout) -> Result<()> {
    println!("\n--- Stage 7: Gender Inference ---");

    let path = layout.given_names();
    let table = GenderTable::from_path(&path)
        .with_context(|| format!("Failed to read given-name table {}", path.display()))?;
    let rows: Vec<AppearanceRow> = store::read_tsv(&layout.authors())
        .context("Failed to read author table")?;
    let appearances: Vec<AuthorAppearance> = rows.into_iter().map(AuthorAppearance::from).collect();

    let genders = gender::infer_genders(&appearances, &table, config.gender_confidence);
    let path = layout.genders();
    store::write_tsv(&path, &genders).context("Failed to write genders")?;

    let conclusive = genders.iter().filter(|g| g.gender != gender::Gender::Inconclusive).count();
    println!("{} / {} authors with a conclusive gender.", conclusive, genders.len());
    println!("Saved: {}", path.display());
    Ok(())
}

fn run_demand(layout: &DataLayout, kingdoms: &[String]) -> Result<()> {
    println!("\n--- Stage 8: Supply and Demand ---");

    let lists = demand::read_demand_dir(&layout.demand_lists()).context("Failed to read demand lists")?;
    if lists.is_empty() {
        println!("No demand lists in {}.", layout.demand_lists().display());
        return Ok(());
    }

    let lookup = load_lookup(layout, kingdoms)?;
    let rows: Vec<CanonicalAuthorRow> = store::read_tsv(&layout.authors_disambiguated())
        .context("Failed to read disambiguated authors")?;
    let authors: Vec<CanonicalAuthor> = rows.into_iter().map(CanonicalAuthor::from).collect();

    let table = pipeline::supply_demand_table(&authors, &lists, &lookup);
    let path = layout.supply_and_demand(table.rank.as_str());
    store::write_table(&path, &table.header(), &table.records()).context("Failed to write supply and demand")?;

    println!("{} demand lists joined over {} taxa.", lists.len(), table.rows.len());
    println!("Saved: {}", path.display());
    Ok(())
}
