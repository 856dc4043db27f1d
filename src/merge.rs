//! Record Merger.
//!
//! Folds each cluster of appearances into one canonical author. Set-valued
//! fields are unioned; free-text fields keep every distinct value so that
//! disagreements stay visible.

use crate::disambiguate::MatchProfile;
use crate::error::{Result, TaxoError};
use crate::extract::{AuthorAppearance, DerivedKeys};
use crate::store::{join_multi, split_multi, MULTI_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Distinct non-empty values of a free-text field across cluster members
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Collapsed {
    #[default]
    Missing,
    One(String),
    /// Sorted, at least two values
    Many(Vec<String>),
}

impl Collapsed {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut distinct: Vec<String> = values
            .into_iter()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect();

        match distinct.len() {
            0 => Collapsed::Missing,
            1 => Collapsed::One(distinct.remove(0)),
            _ => Collapsed::Many(distinct),
        }
    }

    /// Read back a `|`-joined column
    pub fn parse(column: &str) -> Self {
        Self::from_values(column.split(MULTI_SEPARATOR))
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            Collapsed::Missing => Vec::new(),
            Collapsed::One(v) => vec![v.as_str()],
            Collapsed::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.values().into_iter().next()
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Collapsed::Many(_))
    }
}

impl fmt::Display for Collapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.values().join(&MULTI_SEPARATOR.to_string()))
    }
}

/// One real-world author after disambiguation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalAuthor {
    /// Sequential, for tracing back to source appearances
    pub group_number: usize,
    pub member_ids: BTreeSet<String>,
    pub truncated_key: String,
    pub stripped_keys: BTreeSet<String>,
    pub display_name: Collapsed,
    pub orcid: Collapsed,
    pub institution_ids: BTreeSet<String>,
    pub institution_names: Collapsed,
    pub country_codes: Collapsed,
    pub species_subjects: BTreeSet<String>,
    pub orders: BTreeSet<String>,
    pub kingdoms: BTreeSet<String>,
    /// Match fields of each member; not written to the output table
    pub profiles: Vec<MatchProfile>,
}

/// Merge one cluster into a canonical author.
///
/// Every member must carry derived keys and share one truncated key.
pub fn merge_cluster(group_number: usize, members: &[&AuthorAppearance]) -> Result<CanonicalAuthor> {
    if members.is_empty() {
        return Err(TaxoError::Validation(format!("group {} has no members", group_number)));
    }

    let keys: Vec<&DerivedKeys> = members
        .iter()
        .map(|m| {
            m.keys.as_ref().ok_or_else(|| {
                TaxoError::Validation(format!("{} reached the merger without derived keys", m.author_id))
            })
        })
        .collect::<Result<_>>()?;

    let truncated: BTreeSet<&str> = keys.iter().map(|k| k.truncated_key.as_str()).collect();
    let truncated_key = match truncated.into_iter().collect::<Vec<_>>().as_slice() {
        [only] => only.to_string(),
        several => {
            return Err(TaxoError::Validation(format!(
                "group {} spans name buckets {:?}",
                group_number, several
            )))
        }
    };

    Ok(CanonicalAuthor {
        group_number,
        member_ids: members.iter().map(|m| m.author_id.clone()).collect(),
        truncated_key,
        stripped_keys: keys.iter().map(|k| k.stripped_key.clone()).collect(),
        display_name: Collapsed::from_values(members.iter().map(|m| m.display_name.as_str())),
        orcid: Collapsed::from_values(members.iter().filter_map(|m| m.orcid.as_deref())),
        institution_ids: members.iter().filter_map(|m| m.institution_id.clone()).collect(),
        institution_names: Collapsed::from_values(members.iter().filter_map(|m| m.institution_name.as_deref())),
        country_codes: Collapsed::from_values(members.iter().filter_map(|m| m.country_code.as_deref())),
        species_subjects: members.iter().flat_map(|m| m.species_subjects.iter().cloned()).collect(),
        orders: keys.iter().flat_map(|k| k.orders.iter().cloned()).collect(),
        kingdoms: keys.iter().flat_map(|k| k.kingdoms.iter().cloned()).collect(),
        profiles: members
            .iter()
            .zip(&keys)
            .map(|(m, k)| MatchProfile::new(&k.stripped_key, m.institution_id.as_deref(), &k.orders))
            .collect(),
    })
}

fn cluster_members<'a>(appearances: &'a [AuthorAppearance], cluster: &[usize]) -> Result<Vec<&'a AuthorAppearance>> {
    cluster
        .iter()
        .map(|&i| {
            appearances
                .get(i)
                .ok_or_else(|| TaxoError::Validation(format!("cluster refers to missing appearance #{}", i)))
        })
        .collect()
}

/// Merge every cluster; group numbers follow cluster order, starting at 1.
pub fn merge_all(appearances: &[AuthorAppearance], clusters: &[Vec<usize>]) -> Result<Vec<CanonicalAuthor>> {
    let authors = clusters
        .iter()
        .enumerate()
        .map(|(n, cluster)| merge_cluster(n + 1, &cluster_members(appearances, cluster)?))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        appearances = appearances.len(),
        authors = authors.len(),
        ambiguous_names = authors.iter().filter(|a| a.display_name.is_ambiguous()).count(),
        "Merged clusters"
    );
    Ok(authors)
}

/// Flat TSV row for `authors_disambiguated.tsv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalAuthorRow {
    pub group_number: usize,
    pub member_ids: String,
    pub display_name: String,
    pub orcid: String,
    pub truncated_key: String,
    pub stripped_keys: String,
    pub institution_ids: String,
    pub institution_names: String,
    pub country_codes: String,
    pub species_subjects: String,
    pub orders: String,
    pub kingdoms: String,
}

impl From<&CanonicalAuthor> for CanonicalAuthorRow {
    fn from(a: &CanonicalAuthor) -> Self {
        Self {
            group_number: a.group_number,
            member_ids: join_multi(&a.member_ids),
            display_name: a.display_name.to_string(),
            orcid: a.orcid.to_string(),
            truncated_key: a.truncated_key.clone(),
            stripped_keys: join_multi(&a.stripped_keys),
            institution_ids: join_multi(&a.institution_ids),
            institution_names: a.institution_names.to_string(),
            country_codes: a.country_codes.to_string(),
            species_subjects: join_multi(&a.species_subjects),
            orders: join_multi(&a.orders),
            kingdoms: join_multi(&a.kingdoms),
        }
    }
}

impl From<CanonicalAuthorRow> for CanonicalAuthor {
    fn from(row: CanonicalAuthorRow) -> Self {
        Self {
            group_number: row.group_number,
            member_ids: split_multi(&row.member_ids),
            truncated_key: row.truncated_key,
            stripped_keys: split_multi(&row.stripped_keys),
            display_name: Collapsed::parse(&row.display_name),
            orcid: Collapsed::parse(&row.orcid),
            institution_ids: split_multi(&row.institution_ids),
            institution_names: Collapsed::parse(&row.institution_names),
            country_codes: Collapsed::parse(&row.country_codes),
            species_subjects: split_multi(&row.species_subjects),
            orders: split_multi(&row.orders),
            kingdoms: split_multi(&row.kingdoms),
            profiles: Vec::new(),
        }
    }
}

/// One member of a multi-member group, for `merged_groups.tsv`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTraceRow {
    pub group_number: usize,
    pub author_id: String,
    pub display_name: String,
    pub article_id: String,
    pub institution_id: Option<String>,
}

/// Trace rows for every cluster with more than one member, numbered like
/// [`merge_all`]
pub fn group_trace(appearances: &[AuthorAppearance], clusters: &[Vec<usize>]) -> Vec<GroupTraceRow> {
    clusters
        .iter()
        .enumerate()
        .filter(|(_, cluster)| cluster.len() > 1)
        .flat_map(|(n, cluster)| {
            cluster.iter().filter_map(|&i| appearances.get(i)).map(move |a| GroupTraceRow {
                group_number: n + 1,
                author_id: a.author_id.clone(),
                display_name: a.display_name.clone(),
                article_id: a.article_id.clone(),
                institution_id: a.institution_id.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appearance(id: &str, name: &str, inst: Option<&str>, orders: &[&str], species: &[&str]) -> AuthorAppearance {
        let keys = crate::names::normalize(name).unwrap();
        AuthorAppearance {
            author_id: id.to_string(),
            display_name: name.to_string(),
            institution_id: inst.map(String::from),
            institution_name: inst.map(|i| format!("Institute {}", i)),
            species_subjects: species.iter().map(|s| s.to_string()).collect(),
            keys: Some(DerivedKeys {
                truncated_key: keys.truncated,
                stripped_key: keys.stripped,
                orders: orders.iter().map(|s| s.to_string()).collect(),
                kingdoms: ["Animalia".to_string()].into_iter().collect(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_collapsed() {
        assert_eq!(Collapsed::from_values(Vec::<&str>::new()), Collapsed::Missing);
        assert_eq!(Collapsed::from_values(["a", "a", " "]), Collapsed::One("a".into()));

        let many = Collapsed::from_values(["John Smith", "J. Smith", "John Smith"]);
        assert_eq!(many, Collapsed::Many(vec!["J. Smith".into(), "John Smith".into()]));
        assert_eq!(many.to_string(), "J. Smith|John Smith");
        assert_eq!(Collapsed::parse(&many.to_string()), many);
        assert_eq!(Collapsed::parse(""), Collapsed::Missing);
    }

    #[test]
    fn test_merge_cluster_unions() {
        let a = appearance("A1", "J Smith", Some("X"), &["Coleoptera"], &["Carabus auratus"]);
        let mut b = appearance("A2", "J Smith", None, &["Diptera"], &["Musca domestica"]);
        b.orcid = Some("0000-0001".into());

        let merged = merge_cluster(1, &[&a, &b]).unwrap();
        assert_eq!(merged.member_ids.len(), 2);
        assert_eq!(merged.truncated_key, "J Smith");
        assert_eq!(merged.display_name, Collapsed::One("J Smith".into()));
        assert_eq!(merged.orcid, Collapsed::One("0000-0001".into()));
        assert_eq!(merged.institution_ids.iter().collect::<Vec<_>>(), vec!["X"]);
        assert_eq!(merged.orders.len(), 2);
        assert_eq!(merged.species_subjects.len(), 2);
        assert_eq!(merged.kingdoms.len(), 1);
        assert_eq!(merged.profiles.len(), 2);
        assert!(merged.profiles[1].institutions.is_empty());
    }

    #[test]
    fn test_conflicting_names_are_kept() {
        let a = appearance("A1", "John Smith", Some("X"), &[], &[]);
        let b = appearance("A2", "Jane Smith", Some("X"), &[], &[]);
        let merged = merge_cluster(1, &[&a, &b]).unwrap();
        assert!(merged.display_name.is_ambiguous());
        assert_eq!(merged.display_name.values(), vec!["Jane Smith", "John Smith"]);
    }

    #[test]
    fn test_singleton_passes_through() {
        let a = appearance("A1", "Madonna", None, &[], &[]);
        let merged = merge_cluster(7, &[&a]).unwrap();
        assert_eq!(merged.group_number, 7);
        assert_eq!(merged.member_ids.iter().collect::<Vec<_>>(), vec!["A1"]);
        assert_eq!(merged.display_name.first(), Some("Madonna"));
        assert!(merged.institution_ids.is_empty());
    }

    #[test]
    fn test_invalid_clusters() {
        assert!(matches!(merge_cluster(1, &[]), Err(TaxoError::Validation(_))));

        let a = appearance("A1", "J Smith", None, &[], &[]);
        let b = appearance("A2", "K Smith", None, &[], &[]);
        assert!(matches!(merge_cluster(1, &[&a, &b]), Err(TaxoError::Validation(_))));

        let mut bare = a.clone();
        bare.keys = None;
        assert!(merge_cluster(1, &[&bare]).is_err());
    }

    #[test]
    fn test_merge_all_and_trace() {
        let appearances = vec![
            appearance("A1", "J Smith", Some("X"), &[], &[]),
            appearance("A2", "K Lee", None, &[], &[]),
            appearance("A3", "J Smith", Some("X"), &[], &[]),
        ];
        let clusters = vec![vec![0, 2], vec![1]];

        let authors = merge_all(&appearances, &clusters).unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0].group_number, 1);
        assert_eq!(authors[1].group_number, 2);

        let trace = group_trace(&appearances, &clusters);
        assert_eq!(trace.len(), 2);
        assert!(trace.iter().all(|t| t.group_number == 1));

        assert!(merge_all(&appearances, &[vec![5]]).is_err());
    }

    #[test]
    fn test_row_conversion() {
        let a = appearance("A1", "J Smith", Some("X"), &["Coleoptera"], &["Carabus auratus"]);
        let b = appearance("A2", "J. Smith", Some("Y"), &["Diptera"], &[]);
        let merged = merge_cluster(3, &[&a, &b]).unwrap();

        let row = CanonicalAuthorRow::from(&merged);
        assert_eq!(row.member_ids, "A1|A2");
        assert_eq!(row.institution_ids, "X|Y");

        let restored = CanonicalAuthor::from(row.clone());
        assert!(restored.profiles.is_empty());
        assert_eq!(restored.display_name, merged.display_name);
        assert_eq!(CanonicalAuthorRow::from(&restored), row);
    }
}
