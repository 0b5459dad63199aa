//! GRACC accounting reports
//!
//! Generates periodic accounting reports from the GRACC event store:
//! per-VO job success rates and project-level wall-hour summaries, rendered
//! as HTML and emailed to subscribers.
//!
//! The pipeline: raw records from the search backend are normalized into
//! typed job records, accumulated in a per-run job store, aggregated into
//! an immutable summary report, rendered, and handed to the delivery
//! collaborator.

pub mod config;
pub mod deliver;
pub mod projects;
pub mod record;
pub mod render;
pub mod report;
pub mod search;
pub mod store;
pub mod summary;
pub mod window;

pub use config::ReportConfig;
pub use deliver::{Delivery, EmailMessage, SmtpDelivery};
pub use record::{JobRecord, Normalizer, RawRecord};
pub use report::{JobRateReport, ProjectSummaryReport, ReportError, RunOutcome};
pub use search::{ElasticsearchSource, RecordSource};
pub use store::JobStore;
pub use summary::{summarize, SummaryReport};
pub use window::ReportWindow;
