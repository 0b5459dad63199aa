//! Summary aggregation
//!
//! Walks the job store and produces the immutable [`SummaryReport`]
//! consumed by the renderer: per-site totals and success rates, capped
//! per-cluster failure detail, and grand totals.

mod aggregate;
mod report;

pub use aggregate::summarize;
pub use report::{
    ClusterFailure, FailedJob, HostFailureCount, SiteSummary, SummaryReport, CLUSTER_DETAIL_CAP,
};
