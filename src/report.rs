//! Report run orchestration
//!
//! Wires the collaborators around the aggregation core: query the search
//! backend, normalize into a fresh job store, aggregate, render, persist
//! the document, deliver. Every run builds fresh state; nothing is shared
//! across invocations beyond the on-disk rendered file, which is removed
//! after successful delivery and left in place for inspection otherwise.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ReportConfig};
use crate::deliver::{Delivery, DeliveryError, EmailMessage};
use crate::projects::{report_title, ProjectError, ProjectReport, PROJECTS_TEMPLATE};
use crate::record::Normalizer;
use crate::render::{RenderError, Renderer, JOBRATE_TEMPLATE};
use crate::search::{jobrate_query, projects_query, RecordSource, SearchError};
use crate::store::JobStore;
use crate::summary::summarize;
use crate::window::{ReportWindow, WindowError};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid report window: {0}")]
    Window(#[from] WindowError),

    #[error("search backend error: {0}")]
    Search(#[from] SearchError),

    #[error("rendering error: {0}")]
    Render(#[from] RenderError),

    #[error("project aggregation error: {0}")]
    Project(#[from] ProjectError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a run ended; all three are clean terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Report rendered and delivered; the on-disk copy was removed.
    Sent,
    /// No usable records in the window; nothing rendered, nothing sent.
    NothingToReport,
    /// Report rendered and persisted, delivery suppressed (`--no-email`).
    EmailSuppressed,
}

/// One job success rate report run for a single VO and window.
pub struct JobRateReport<'a> {
    config: &'a ReportConfig,
    window: ReportWindow,
    vo: String,
    template: String,
    is_test: bool,
    no_email: bool,
    out_dir: PathBuf,
}

impl<'a> JobRateReport<'a> {
    pub fn new(
        config: &'a ReportConfig,
        window: ReportWindow,
        vo: &str,
        template: Option<String>,
        is_test: bool,
        no_email: bool,
    ) -> Self {
        Self {
            config,
            window,
            vo: vo.to_string(),
            template: template.unwrap_or_else(|| JOBRATE_TEMPLATE.to_string()),
            is_test,
            no_email,
            out_dir: PathBuf::new(),
        }
    }

    /// Persist the rendered document under `dir` instead of the working
    /// directory.
    pub fn in_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    /// Where the rendered report is persisted before delivery.
    pub fn report_path(&self) -> PathBuf {
        self.out_dir.join(format!(
            "{}-jobrate.{}",
            self.vo.to_lowercase(),
            self.window.start_display().replace('/', "-")
        ))
    }

    pub fn subject(&self) -> String {
        format!(
            "{} Production Jobs Success Rate on the OSG Sites ({} - {})",
            self.vo,
            self.window.start_display(),
            self.window.end_display()
        )
    }

    pub fn execute(
        &self,
        source: &dyn RecordSource,
        delivery: &dyn Delivery,
    ) -> Result<RunOutcome, ReportError> {
        let vo_config = self.config.vo(&self.vo)?;
        let index = self.window.index(&self.config.index_pattern);
        let raws = source.scan(&index, &jobrate_query(&self.window, vo_config))?;

        let normalizer = Normalizer::new();
        let mut store = JobStore::new();
        for raw in &raws {
            if let Some(normalized) = normalizer.normalize(raw) {
                store.add(&normalized.user, normalized.record);
            }
        }
        debug!(
            fetched = raws.len(),
            stored = store.len(),
            "normalized result set"
        );

        let Some(report) = summarize(&store) else {
            info!(vo = %self.vo, "nothing to report");
            return Ok(RunOutcome::NothingToReport);
        };

        let renderer = Renderer::new(self.window, &self.vo);
        let sections = renderer.sections(&report);
        let html = renderer.merge(&self.template, &sections)?;

        let path = self.report_path();
        fs::write(&path, &html)?;
        info!(path = %path.display(), "report written");

        if self.no_email {
            info!("not sending email");
            return Ok(RunOutcome::EmailSuppressed);
        }

        let message = EmailMessage::addressed(
            &self.config.email,
            &vo_config.emails,
            self.is_test,
            self.subject(),
            html,
        );
        // A delivery failure leaves the rendered file in place for manual
        // inspection.
        delivery.send(&message)?;

        if let Err(err) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %err, "could not remove delivered report");
        }
        Ok(RunOutcome::Sent)
    }
}

/// One project wall-hours report run.
pub struct ProjectSummaryReport<'a> {
    config: &'a ReportConfig,
    window: ReportWindow,
    report_type: String,
    template: String,
    is_test: bool,
    no_email: bool,
}

impl<'a> ProjectSummaryReport<'a> {
    pub fn new(
        config: &'a ReportConfig,
        window: ReportWindow,
        report_type: &str,
        template: Option<String>,
        is_test: bool,
        no_email: bool,
    ) -> Self {
        Self {
            config,
            window,
            report_type: report_type.to_string(),
            template: template.unwrap_or_else(|| PROJECTS_TEMPLATE.to_string()),
            is_test,
            no_email,
        }
    }

    pub fn execute(
        &self,
        source: &dyn RecordSource,
        delivery: &dyn Delivery,
    ) -> Result<RunOutcome, ReportError> {
        let project_config = self.config.project(&self.report_type)?;
        let index = self.window.index(&self.config.index_pattern);
        let aggregations =
            source.aggregate(&index, &projects_query(&self.window, project_config))?;

        let report = ProjectReport::from_aggregations(&aggregations)?;
        if report.is_empty() {
            info!(report_type = %self.report_type, "nothing to report");
            return Ok(RunOutcome::NothingToReport);
        }

        let title = report_title(&self.report_type, &self.window);
        let html = report.render(&self.template, &title)?;

        if self.no_email {
            info!("not sending email");
            return Ok(RunOutcome::EmailSuppressed);
        }

        let message = EmailMessage::addressed(
            &self.config.email,
            &project_config.emails,
            self.is_test,
            title,
            html,
        );
        delivery.send(&message)?;
        Ok(RunOutcome::Sent)
    }
}
