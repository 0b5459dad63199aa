//! Aggregation passes over the job store

use crate::record::JobRecord;
use crate::store::JobStore;

use super::report::{
    ClusterFailure, FailedJob, HostFailureCount, SiteSummary, SummaryReport, CLUSTER_DETAIL_CAP,
};

/// Build a [`SummaryReport`] from the store, or `None` when the store is
/// empty ("nothing to report").
///
/// Two independent passes over disjoint views: cluster failure detail and
/// per-site summaries. Grand totals come from the site pass, so the
/// cluster detail cap never affects them. Re-running over an unmodified
/// store yields an identical report.
pub fn summarize(store: &JobStore) -> Option<SummaryReport> {
    if store.is_empty() {
        return None;
    }

    let failed_clusters = cluster_failures(store);
    let sites = site_summaries(store);

    let total_jobs: usize = sites.iter().map(|s| s.total).sum();
    let total_failed: usize = sites.iter().map(|s| s.failed).sum();

    Some(SummaryReport {
        sites,
        failed_clusters,
        total_jobs,
        total_failed,
        success_rate_pct: success_rate(total_jobs, total_failed),
    })
}

/// Pass A: detail for failing clusters, capped at [`CLUSTER_DETAIL_CAP`]
/// entries in store iteration order. Zero-failure clusters are skipped;
/// clusters beyond the cap are silently omitted from the detail table.
fn cluster_failures(store: &JobStore) -> Vec<ClusterFailure> {
    let mut detail = Vec::new();
    for entry in store.clusters() {
        let failures: Vec<&JobRecord> = entry.jobs().filter(|job| job.is_failure()).collect();
        if failures.is_empty() {
            continue;
        }
        if detail.len() == CLUSTER_DETAIL_CAP {
            break;
        }
        detail.push(ClusterFailure {
            cluster_id: entry.cluster_id().to_string(),
            user: entry.user().to_string(),
            total_jobs: entry.job_count(),
            failed_jobs: failures.len(),
            jobs: failures.into_iter().map(FailedJob::from_record).collect(),
        });
    }
    detail
}

/// Pass B: per-site totals, success rate, and the `(host, exit_code)`
/// failure breakdown. Site buckets are never empty, so the rate division
/// is always defined.
fn site_summaries(store: &JobStore) -> Vec<SiteSummary> {
    store
        .sites()
        .map(|(site, jobs)| {
            let mut total = 0;
            let mut failed = 0;
            let mut failures: Vec<HostFailureCount> = Vec::new();
            for job in jobs {
                total += 1;
                if !job.is_failure() {
                    continue;
                }
                failed += 1;
                match failures
                    .iter_mut()
                    .find(|f| f.host == job.host && f.exit_code == job.exit_code)
                {
                    Some(entry) => entry.count += 1,
                    None => failures.push(HostFailureCount {
                        host: job.host.clone(),
                        exit_code: job.exit_code,
                        count: 1,
                    }),
                }
            }
            SiteSummary {
                site: site.to_string(),
                total,
                failed,
                success_rate_pct: success_rate(total, failed),
                failures,
            }
        })
        .collect()
}

/// `round((total - failed) * 100 / total, 1)`. Callers guarantee
/// `total > 0`.
fn success_rate(total: usize, failed: usize) -> f64 {
    let rate = (total - failed) as f64 * 100.0 / total as f64;
    (rate * 10.0).round() / 10.0
}
