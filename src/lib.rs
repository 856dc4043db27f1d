//! # taxosupply
//!
//! Taxonomic Expertise Supply Pipeline - who describes which taxa
//!
//! ## Modules
//!
//! - [`wikidata`] / [`openalex`] - journal discovery and article harvesting
//! - [`journals`] - journal list homogenization and dissolved flags
//! - [`filter`] - keyword/concept filter for taxonomic articles
//! - [`taxonomy`] / [`species`] - backbone lookup and species recognition
//! - [`extract`] - author appearances from article metadata
//! - [`names`] / [`expertise`] - keys the disambiguation engine works on
//! - [`disambiguate`] / [`merge`] - author clustering and record merging
//! - [`supply`] - authors per species, order and kingdom
//! - [`demand`] - policy species lists joined with supply
//! - [`gender`] - gender inference from first names
//! - [`pipeline`] - stage composition
//! - [`config`] / [`store`] - settings, data layout and file formats
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taxosupply::{pipeline, taxonomy::{LookupOptions, TaxonomyLookup}};
//! use taxosupply::extract::AuthorAppearance;
//!
//! fn main() -> anyhow::Result<()> {
//!     let lookup = TaxonomyLookup::from_path(std::path::Path::new("Taxon.tsv"), &LookupOptions::default())?;
//!     let appearances: Vec<AuthorAppearance> = Vec::new();
//!     let report = pipeline::disambiguate_authors(appearances, &lookup)?;
//!     println!("{} authors", report.authors.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod demand;
pub mod disambiguate;
pub mod error;
pub mod expertise;
pub mod extract;
pub mod filter;
pub mod gender;
pub mod journals;
pub mod merge;
pub mod names;
pub mod openalex;
pub mod pipeline;
pub mod species;
pub mod store;
pub mod supply;
pub mod taxonomy;
pub mod wikidata;

pub use error::{Result, TaxoError};
