//! Report data model

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::record::JobRecord;

/// Maximum number of failing clusters given detail rows in the report
/// body. Clusters beyond the cap still count toward grand totals.
pub const CLUSTER_DETAIL_CAP: usize = 100;

/// Final immutable output of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    /// Per-site summaries, in store iteration order.
    pub sites: Vec<SiteSummary>,
    /// Failure detail for at most [`CLUSTER_DETAIL_CAP`] clusters, in
    /// store iteration order.
    pub failed_clusters: Vec<ClusterFailure>,
    /// Grand total of jobs across all site buckets.
    pub total_jobs: usize,
    /// Grand total of failed jobs across all site buckets.
    pub total_failed: usize,
    /// Grand success rate, rounded to one decimal place.
    pub success_rate_pct: f64,
}

/// Aggregate over the records of one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub site: String,
    pub total: usize,
    pub failed: usize,
    /// `round((total - failed) * 100 / total, 1)`; a site summary is only
    /// built for a non-empty bucket.
    pub success_rate_pct: f64,
    /// Failure counts keyed by `(host, exit_code)`, in first-failure order.
    pub failures: Vec<HostFailureCount>,
}

/// Count of failures on one host with one exit code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostFailureCount {
    pub host: String,
    pub exit_code: i64,
    pub count: usize,
}

/// Failure detail for one cluster with at least one failed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterFailure {
    pub cluster_id: String,
    /// Identity taken from the first record seen for the cluster.
    pub user: String,
    /// All jobs in the cluster, failed or not.
    pub total_jobs: usize,
    pub failed_jobs: usize,
    /// One entry per failed job, in cluster insertion order.
    pub jobs: Vec<FailedJob>,
}

/// One failed job rendered in the detail table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedJob {
    pub job_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub site: String,
    pub host: String,
    pub exit_code: i64,
}

impl FailedJob {
    pub(crate) fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            start_time: record.start_time,
            end_time: record.end_time,
            site: record.site.clone(),
            host: record.host.clone(),
            exit_code: record.exit_code,
        }
    }
}
