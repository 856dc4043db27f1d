//! Author disambiguation engine.
//!
//! Decides which author appearances belong to the same person:
//!
//! 1. Appearances are bucketed by truncated name key. Only appearances in the
//!    same bucket are ever compared.
//! 2. Within a bucket, [`is_match`] decides whether two appearances are
//!    directly linked.
//! 3. Each appearance's [`aliases`] (its direct neighbours) are unioned into a
//!    disjoint set, so clusters are the connected components of the match
//!    graph. Chains (A-B, B-C but not A-C) end up in one cluster and the
//!    result does not depend on input order.
//!
//! The engine does no I/O. Appearances without derived keys are rejected
//! individually and the rest of the batch is still clustered.

use crate::error::TaxoError;
use crate::extract::AuthorAppearance;
use crate::merge::CanonicalAuthor;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// The fields the match rule compares for one source appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchProfile {
    pub stripped_keys: BTreeSet<String>,
    pub institutions: BTreeSet<String>,
    pub orders: BTreeSet<String>,
}

impl MatchProfile {
    pub fn new(stripped_key: &str, institution: Option<&str>, orders: &BTreeSet<String>) -> Self {
        Self {
            stripped_keys: std::iter::once(stripped_key.to_string()).collect(),
            institutions: institution.map(String::from).into_iter().collect(),
            orders: orders.clone(),
        }
    }

    /// Whether two profiles describe the same person.
    ///
    /// - Either side without known orders: same institution when both have
    ///   one, otherwise same stripped name.
    /// - Both sides with known orders: same institution and at least one
    ///   shared order.
    ///
    /// A missing institution never counts as agreement.
    pub fn matches(&self, other: &MatchProfile) -> bool {
        if self.orders.is_empty() || other.orders.is_empty() {
            if !self.institutions.is_empty() && !other.institutions.is_empty() {
                shares(&self.institutions, &other.institutions)
            } else {
                shares(&self.stripped_keys, &other.stripped_keys)
            }
        } else {
            shares(&self.institutions, &other.institutions) && shares(&self.orders, &other.orders)
        }
    }
}

/// An appearance or an already merged author, as the engine sees it.
///
/// A merged author keeps one profile per member, so it links to another
/// record only where one of its members would have.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRecord {
    pub truncated_key: String,
    pub profiles: Vec<MatchProfile>,
}

impl MatchRecord {
    /// Build from an appearance at position `index` of its batch.
    pub fn from_appearance(index: usize, appearance: &AuthorAppearance) -> Result<Self, TaxoError> {
        let malformed = |reason: &str| TaxoError::MalformedAppearance {
            index,
            author_id: appearance.author_id.clone(),
            reason: reason.to_string(),
        };

        let keys = appearance.keys.as_ref().ok_or_else(|| malformed("missing derived keys"))?;
        if keys.truncated_key.is_empty() {
            return Err(malformed("empty truncated key"));
        }
        if keys.stripped_key.is_empty() {
            return Err(malformed("empty stripped key"));
        }

        Ok(Self {
            truncated_key: keys.truncated_key.clone(),
            profiles: vec![MatchProfile::new(
                &keys.stripped_key,
                appearance.institution_id.as_deref(),
                &keys.orders,
            )],
        })
    }

    /// Build from an already merged author.
    ///
    /// Authors read back from a table carry no member profiles and re-enter
    /// with their unioned fields as a single profile.
    pub fn from_canonical(author: &CanonicalAuthor) -> Self {
        let profiles = if author.profiles.is_empty() {
            vec![MatchProfile {
                stripped_keys: author.stripped_keys.clone(),
                institutions: author.institution_ids.clone(),
                orders: author.orders.clone(),
            }]
        } else {
            author.profiles.clone()
        };

        Self {
            truncated_key: author.truncated_key.clone(),
            profiles,
        }
    }
}

/// At least one common element; never true for an empty side
fn shares(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    !a.is_empty() && !b.is_empty() && !a.is_disjoint(b)
}

/// Whether two records of the same bucket are the same person: some
/// profile of one matches some profile of the other.
pub fn is_match(a: &MatchRecord, b: &MatchRecord) -> bool {
    a.profiles
        .iter()
        .any(|p| b.profiles.iter().any(|q| p.matches(q)))
}

/// Direct neighbours of `member` within its bucket, `member` included
pub fn aliases(records: &[MatchRecord], bucket: &[usize], member: usize) -> Vec<usize> {
    bucket
        .iter()
        .copied()
        .filter(|&other| other == member || is_match(&records[member], &records[other]))
        .collect()
}

/// Partition `records` into clusters of positions.
///
/// Every position appears in exactly one cluster. Members are ascending
/// within a cluster and clusters are ordered by their first member.
pub fn cluster(records: &[MatchRecord]) -> Vec<Vec<usize>> {
    let mut buckets: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        buckets.entry(record.truncated_key.as_str()).or_default().push(i);
    }

    let mut dsu = DisjointSet::new(records.len());
    let mut colliding = 0usize;

    for members in buckets.values() {
        // a lone key cannot collide with anyone
        if members.len() < 2 {
            continue;
        }
        colliding += 1;
        for &member in members {
            for alias in aliases(records, members, member) {
                dsu.union(member, alias);
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..records.len() {
        let root = dsu.find(i);
        components.entry(root).or_default().push(i);
    }

    let mut clusters: Vec<Vec<usize>> = components.into_values().collect();
    clusters.sort_by_key(|c| c.first().copied());

    debug!(
        records = records.len(),
        buckets = buckets.len(),
        colliding_buckets = colliding,
        clusters = clusters.len(),
        "Clustered match records"
    );
    clusters
}

/// Result of one disambiguation run
#[derive(Debug, Default)]
pub struct Disambiguation {
    /// Clusters of positions in the input slice
    pub clusters: Vec<Vec<usize>>,
    /// Appearances that could not be clustered
    pub rejected: Vec<TaxoError>,
}

/// Cluster a batch of appearances.
///
/// Appearances without usable derived keys are logged, reported in
/// `rejected` and left out of every cluster.
pub fn disambiguate(appearances: &[AuthorAppearance]) -> Disambiguation {
    let mut positions = Vec::with_capacity(appearances.len());
    let mut records = Vec::with_capacity(appearances.len());
    let mut rejected = Vec::new();

    for (index, appearance) in appearances.iter().enumerate() {
        match MatchRecord::from_appearance(index, appearance) {
            Ok(record) => {
                positions.push(index);
                records.push(record);
            }
            Err(e) => {
                warn!(error = %e, "Dropping appearance");
                rejected.push(e);
            }
        }
    }

    let clusters: Vec<Vec<usize>> = cluster(&records)
        .into_iter()
        .map(|c| c.into_iter().map(|i| positions[i]).collect())
        .collect();

    info!(
        appearances = appearances.len(),
        rejected = rejected.len(),
        clusters = clusters.len(),
        merged = clusters.iter().filter(|c| c.len() > 1).count(),
        "Disambiguation complete"
    );

    Disambiguation { clusters, rejected }
}

#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, left: usize, right: usize) {
        let left_root = self.find(left);
        let right_root = self.find(right);
        if left_root == right_root {
            return;
        }

        match self.rank[left_root].cmp(&self.rank[right_root]) {
            std::cmp::Ordering::Less => self.parent[left_root] = right_root,
            std::cmp::Ordering::Greater => self.parent[right_root] = left_root,
            std::cmp::Ordering::Equal => {
                self.parent[right_root] = left_root;
                self.rank[left_root] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DerivedKeys;
    use crate::merge::merge_all;

    fn appearance(id: &str, name: &str, inst: Option<&str>, orders: &[&str]) -> AuthorAppearance {
        let keys = crate::names::normalize(name).unwrap();
        AuthorAppearance {
            author_id: id.to_string(),
            display_name: name.to_string(),
            institution_id: inst.map(String::from),
            keys: Some(DerivedKeys {
                truncated_key: keys.truncated,
                stripped_key: keys.stripped,
                orders: orders.iter().map(|s| s.to_string()).collect(),
                kingdoms: BTreeSet::new(),
            }),
            ..Default::default()
        }
    }

    fn record(name: &str, inst: Option<&str>, orders: &[&str]) -> MatchRecord {
        MatchRecord::from_appearance(0, &appearance("A", name, inst, orders)).unwrap()
    }

    /// Partition as sets of author ids, independent of positions
    fn id_partition(appearances: &[AuthorAppearance], clusters: &[Vec<usize>]) -> BTreeSet<BTreeSet<String>> {
        clusters
            .iter()
            .map(|c| c.iter().map(|&i| appearances[i].author_id.clone()).collect())
            .collect()
    }

    fn mixed_batch() -> Vec<AuthorAppearance> {
        vec![
            appearance("1", "J Smith", Some("X"), &[]),
            appearance("2", "J Smith", Some("X"), &[]),
            appearance("3", "J Smith", Some("Y"), &["Coleoptera"]),
            appearance("4", "J Smith", Some("Y"), &["Lepidoptera"]),
            appearance("5", "A Jones", Some("Z"), &["Diptera"]),
            appearance("6", "A Jones", None, &["Diptera", "Coleoptera"]),
            appearance("7", "Madonna", None, &[]),
            appearance("8", "K Lee", Some("X"), &["Lepidoptera"]),
            appearance("9", "K Lee", Some("X"), &["Lepidoptera", "Coleoptera"]),
            appearance("10", "K Lee", Some("X"), &["Coleoptera"]),
            appearance("11", "Anne-Marie Berg", None, &[]),
            appearance("12", "Anne Marie Berg", None, &["Diptera"]),
        ]
    }

    #[test]
    fn test_same_institution_without_orders_merges() {
        let batch = vec![
            appearance("1", "J Smith", Some("X"), &[]),
            appearance("2", "J Smith", Some("X"), &[]),
        ];
        let result = disambiguate(&batch);
        assert_eq!(result.clusters, vec![vec![0, 1]]);

        let authors = merge_all(&batch, &result.clusters).unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].member_ids.iter().collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn test_disjoint_orders_do_not_merge() {
        let batch = vec![
            appearance("3", "J Smith", Some("Y"), &["Coleoptera"]),
            appearance("4", "J Smith", Some("Y"), &["Lepidoptera"]),
        ];
        assert_eq!(disambiguate(&batch).clusters, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_missing_institution_is_not_agreement() {
        let batch = vec![
            appearance("5", "A Jones", Some("Z"), &["Diptera"]),
            appearance("6", "A Jones", None, &["Diptera", "Coleoptera"]),
        ];
        assert_eq!(disambiguate(&batch).clusters, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_single_token_name() {
        let batch = vec![appearance("7", "Madonna", None, &[])];
        let result = disambiguate(&batch);
        assert_eq!(result.clusters, vec![vec![0]]);
        assert_eq!(batch[0].keys.as_ref().unwrap().truncated_key, "M Madonna");
    }

    #[test]
    fn test_stripped_key_fallback() {
        // no orders on one side, no institution on the other
        assert!(is_match(
            &record("Anne-Marie Berg", None, &[]),
            &record("Anne Marie Berg", Some("X"), &["Diptera"]),
        ));
        assert!(!is_match(
            &record("Anne-Marie Berg", None, &[]),
            &record("A. Berg", None, &[]),
        ));
        // both institutions known and different: names are not consulted
        assert!(!is_match(
            &record("Anne Berg", Some("X"), &[]),
            &record("Anne Berg", Some("Y"), &[]),
        ));
    }

    #[test]
    fn test_match_is_symmetric() {
        let records: Vec<MatchRecord> = mixed_batch()
            .iter()
            .enumerate()
            .map(|(i, a)| MatchRecord::from_appearance(i, a).unwrap())
            .collect();

        for a in &records {
            for b in &records {
                assert_eq!(is_match(a, b), is_match(b, a), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_chain_is_one_cluster() {
        let batch = vec![
            appearance("8", "K Lee", Some("X"), &["Lepidoptera"]),
            appearance("9", "K Lee", Some("X"), &["Lepidoptera", "Coleoptera"]),
            appearance("10", "K Lee", Some("X"), &["Coleoptera"]),
        ];
        let records: Vec<MatchRecord> = batch
            .iter()
            .enumerate()
            .map(|(i, a)| MatchRecord::from_appearance(i, a).unwrap())
            .collect();
        assert!(!is_match(&records[0], &records[2]));

        assert_eq!(disambiguate(&batch).clusters, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_no_cross_bucket_merging() {
        let batch = vec![
            appearance("1", "J Smith", Some("X"), &[]),
            appearance("2", "K Smith", Some("X"), &[]),
        ];
        let records: Vec<MatchRecord> = batch
            .iter()
            .enumerate()
            .map(|(i, a)| MatchRecord::from_appearance(i, a).unwrap())
            .collect();
        // the rule alone would link them
        assert!(is_match(&records[0], &records[1]));

        assert_eq!(disambiguate(&batch).clusters, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_aliases_include_self() {
        let records = vec![
            record("J Smith", Some("X"), &[]),
            record("J Smith", Some("X"), &[]),
            record("J Smith", Some("Y"), &["Coleoptera"]),
        ];
        let bucket = vec![0, 1, 2];
        assert_eq!(aliases(&records, &bucket, 0), vec![0, 1]);
        assert_eq!(aliases(&records, &bucket, 2), vec![2]);
    }

    #[test]
    fn test_partition_invariant() {
        let batch = mixed_batch();
        let result = disambiguate(&batch);

        let mut seen: Vec<usize> = result.clusters.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..batch.len()).collect::<Vec<_>>());
        assert!(result.rejected.is_empty());

        let expected: BTreeSet<BTreeSet<String>> = [
            vec!["1", "2"],
            vec!["3"],
            vec!["4"],
            vec!["5"],
            vec!["6"],
            vec!["7"],
            vec!["8", "9", "10"],
            vec!["11", "12"],
        ]
        .into_iter()
        .map(|ids| ids.into_iter().map(String::from).collect())
        .collect();
        assert_eq!(id_partition(&batch, &result.clusters), expected);
    }

    #[test]
    fn test_order_independence() {
        let batch = mixed_batch();
        let mut reversed = batch.clone();
        reversed.reverse();
        let mut rotated = batch.clone();
        rotated.rotate_left(5);

        let forward = id_partition(&batch, &disambiguate(&batch).clusters);
        assert_eq!(forward, id_partition(&reversed, &disambiguate(&reversed).clusters));
        assert_eq!(forward, id_partition(&rotated, &disambiguate(&rotated).clusters));
    }

    fn rerun(batch: &[AuthorAppearance]) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
        let first = disambiguate(batch).clusters;
        let authors = merge_all(batch, &first).unwrap();
        let records: Vec<MatchRecord> = authors.iter().map(MatchRecord::from_canonical).collect();
        (first, cluster(&records))
    }

    #[test]
    fn test_rerun_on_merged_output_is_stable() {
        let (first, again) = rerun(&mixed_batch());
        assert_eq!(again.len(), first.len());
        assert!(again.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_rerun_does_not_link_through_unioned_fields() {
        // the merged Smith gains institution X and order O from different
        // members; no single member matches Jo Smith
        let batch = vec![
            appearance("a1", "J Smith", Some("X"), &["P"]),
            appearance("a3", "J Smith", None, &[]),
            appearance("a2", "J Smith", None, &["O"]),
            appearance("b", "Jo Smith", Some("X"), &["O"]),
        ];
        let (first, again) = rerun(&batch);
        assert_eq!(first, vec![vec![0, 1, 2], vec![3]]);
        assert_eq!(again, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_canonical_profiles() {
        let batch = vec![
            appearance("1", "J Smith", Some("X"), &["P"]),
            appearance("2", "J Smith", None, &[]),
        ];
        let authors = merge_all(&batch, &disambiguate(&batch).clusters).unwrap();
        let record = MatchRecord::from_canonical(&authors[0]);
        assert_eq!(record.profiles.len(), 2);

        let mut from_table = authors[0].clone();
        from_table.profiles.clear();
        let record = MatchRecord::from_canonical(&from_table);
        assert_eq!(record.profiles.len(), 1);
        assert_eq!(record.profiles[0].institutions.len(), 1);
    }

    #[test]
    fn test_malformed_appearance_is_rejected() {
        let mut bare = appearance("2", "J Smith", Some("X"), &[]);
        bare.keys = None;
        let batch = vec![
            appearance("1", "J Smith", Some("X"), &[]),
            bare,
            appearance("3", "J Smith", Some("X"), &[]),
        ];

        let result = disambiguate(&batch);
        assert_eq!(result.clusters, vec![vec![0, 2]]);
        assert_eq!(result.rejected.len(), 1);
        assert!(matches!(
            &result.rejected[0],
            TaxoError::MalformedAppearance { index: 1, author_id, .. } if author_id == "2"
        ));
    }

    #[test]
    fn test_disjoint_set() {
        let mut dsu = DisjointSet::new(5);
        dsu.union(0, 1);
        dsu.union(3, 4);
        dsu.union(1, 4);
        assert_eq!(dsu.find(0), dsu.find(3));
        assert_ne!(dsu.find(0), dsu.find(2));
    }
}
