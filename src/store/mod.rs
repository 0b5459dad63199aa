//! Job store
//!
//! Owns every [`JobRecord`] for one report run and maintains two
//! insertion-ordered index views over the single backing collection:
//! by site and by cluster. The store imposes no sort; the aggregator reads
//! the views in natural (insertion) order.

use std::collections::HashMap;

use tracing::debug;

use crate::record::JobRecord;

/// Sentinel site value; records carrying it are excluded from the store
/// entirely.
pub const NULL_SITE: &str = "NULL";

struct SiteSlot {
    site: String,
    indices: Vec<usize>,
}

struct ClusterSlot {
    cluster_id: String,
    user: String,
    indices: Vec<usize>,
}

/// A view of one cluster: the originating user identity (from the first
/// record seen for the cluster) and its job records in insertion order.
pub struct ClusterEntry<'a> {
    cluster_id: &'a str,
    user: &'a str,
    indices: &'a [usize],
    records: &'a [JobRecord],
}

impl<'a> ClusterEntry<'a> {
    pub fn cluster_id(&self) -> &'a str {
        self.cluster_id
    }

    pub fn user(&self) -> &'a str {
        self.user
    }

    pub fn job_count(&self) -> usize {
        self.indices.len()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &'a JobRecord> + '_ {
        let records = self.records;
        self.indices.iter().map(move |&i| &records[i])
    }
}

/// Accumulates normalized job records for a single report run.
///
/// Insertion is O(1) amortized. Iteration order of [`JobStore::sites`] and
/// [`JobStore::clusters`] is the order in which sites/clusters were first
/// seen, stable for the lifetime of the store.
#[derive(Default)]
pub struct JobStore {
    records: Vec<JobRecord>,
    site_slots: Vec<SiteSlot>,
    site_index: HashMap<String, usize>,
    cluster_slots: Vec<ClusterSlot>,
    cluster_index: HashMap<String, usize>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record into the per-site and per-cluster views.
    ///
    /// Records whose site is the `"NULL"` sentinel are rejected here, after
    /// normalization: they appear in no view and no total. The cluster
    /// entry is created on first sight, keyed by the job id prefix before
    /// the first `.`, and remembers `user` from that first record.
    pub fn add(&mut self, user: &str, record: JobRecord) {
        if record.site == NULL_SITE {
            debug!(job_id = %record.job_id, "excluding record with NULL site");
            return;
        }

        let site = record.site.clone();
        let cluster_id = record.cluster_id().to_string();
        let index = self.records.len();
        self.records.push(record);

        match self.site_index.get(&site) {
            Some(&slot) => self.site_slots[slot].indices.push(index),
            None => {
                self.site_index.insert(site.clone(), self.site_slots.len());
                self.site_slots.push(SiteSlot {
                    site,
                    indices: vec![index],
                });
            }
        }

        match self.cluster_index.get(&cluster_id) {
            Some(&slot) => self.cluster_slots[slot].indices.push(index),
            None => {
                self.cluster_index
                    .insert(cluster_id.clone(), self.cluster_slots.len());
                self.cluster_slots.push(ClusterSlot {
                    cluster_id,
                    user: user.to_string(),
                    indices: vec![index],
                });
            }
        }
    }

    /// True when no usable record was inserted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Sites with their records, in first-seen order.
    pub fn sites<'a>(
        &'a self,
    ) -> impl Iterator<Item = (&'a str, impl Iterator<Item = &'a JobRecord> + 'a)> + 'a {
        let records = self.records.as_slice();
        self.site_slots.iter().map(move |slot| {
            (
                slot.site.as_str(),
                slot.indices.iter().map(move |&i| &records[i]),
            )
        })
    }

    /// Clusters with their entries, in first-seen order.
    pub fn clusters(&self) -> impl Iterator<Item = ClusterEntry<'_>> + '_ {
        let records = self.records.as_slice();
        self.cluster_slots.iter().map(move |slot| ClusterEntry {
            cluster_id: &slot.cluster_id,
            user: &slot.user,
            indices: &slot.indices,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(job_id: &str, site: &str, exit_code: i64) -> JobRecord {
        let start = NaiveDate::from_ymd_opt(2018, 3, 28)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();
        JobRecord {
            start_time: start,
            end_time: start,
            job_id: job_id.to_string(),
            site: site.to_string(),
            host: "fnpc1234.fnal.gov".to_string(),
            exit_code,
        }
    }

    #[test]
    fn groups_by_site_and_cluster() {
        let mut store = JobStore::new();
        store.add("alice", record("100.0@fifebatch1.fnal.gov", "SiteA", 0));
        store.add("alice", record("100.1@fifebatch1.fnal.gov", "SiteB", 1));
        store.add("bob", record("200.0@fifebatch1.fnal.gov", "SiteA", 0));

        let sites: Vec<(&str, usize)> = store.sites().map(|(s, jobs)| (s, jobs.count())).collect();
        assert_eq!(sites, vec![("SiteA", 2), ("SiteB", 1)]);

        let clusters: Vec<(String, String, usize)> = store
            .clusters()
            .map(|c| (c.cluster_id().to_string(), c.user().to_string(), c.job_count()))
            .collect();
        assert_eq!(
            clusters,
            vec![
                ("100".to_string(), "alice".to_string(), 2),
                ("200".to_string(), "bob".to_string(), 1),
            ]
        );
    }

    #[test]
    fn cluster_user_taken_from_first_record() {
        let mut store = JobStore::new();
        store.add("alice", record("100.0@fifebatch1.fnal.gov", "SiteA", 0));
        store.add("mallory", record("100.1@fifebatch1.fnal.gov", "SiteA", 0));

        let users: Vec<&str> = store.clusters().map(|c| c.user()).collect();
        assert_eq!(users, vec!["alice"]);
    }

    #[test]
    fn null_site_records_excluded_entirely() {
        let mut store = JobStore::new();
        store.add("alice", record("100.0@fifebatch1.fnal.gov", NULL_SITE, 1));

        assert!(store.is_empty());
        assert_eq!(store.sites().count(), 0);
        assert_eq!(store.clusters().count(), 0);
    }

    #[test]
    fn insertion_order_is_stable() {
        let mut store = JobStore::new();
        for i in 0..20 {
            let site = format!("Site{}", i % 5);
            store.add("alice", record(&format!("{i}.0@fifebatch1.fnal.gov"), &site, 0));
        }

        let first: Vec<String> = store.sites().map(|(s, _)| s.to_string()).collect();
        let second: Vec<String> = store.sites().map(|(s, _)| s.to_string()).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], "Site0");
    }
}
