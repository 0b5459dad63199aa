//! Report rendering
//!
//! A pure stage that turns a [`SummaryReport`] into the report's tabular
//! HTML sections and dashboard deep links, plus the template merge that
//! assembles the final document. Aggregation never depends on anything in
//! this module.

use chrono::NaiveDateTime;
use regex_lite::Regex;
use tera::{Context, Tera};
use thiserror::Error;

use crate::summary::SummaryReport;
use crate::window::ReportWindow;

/// Default document template for the job success rate report.
pub const JOBRATE_TEMPLATE: &str = include_str!("../../templates/jobrate.html");

/// Padding applied around a job's own window in its dashboard link.
const LINK_PADDING_MS: i64 = 300_000;

const DASHBOARD_BASE: &str = "https://fifemon.fnal.gov/monitor/dashboard/db";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template merge failed: {0}")]
    Template(#[from] tera::Error),
}

/// The rendered tabular sections of one report, independent of the final
/// document template.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSections {
    /// Per-site summary rows with a trailing Total row.
    pub table_summary: String,
    /// Per-site rows interleaved with the `(host, exit code)` failure
    /// breakdown, with a trailing Total row.
    pub table: String,
    /// Per-cluster failure detail rows with per-job deep links.
    pub job_table: String,
    /// Top-level batch history deep link for the report audience.
    pub fifemon_link: String,
    /// True when there is nothing to show in the failure detail table;
    /// the section is then hidden but still present in the document.
    pub hide_failed_table: bool,
}

/// Renders [`SummaryReport`]s for one audience and window.
pub struct Renderer {
    window: ReportWindow,
    vo: String,
    jobparts: Regex,
}

impl Renderer {
    pub fn new(window: ReportWindow, vo: &str) -> Self {
        Self {
            window,
            vo: vo.to_string(),
            jobparts: Regex::new(r"(\d+)\.\d+@(fifebatch\d\.fnal\.gov)").unwrap(),
        }
    }

    /// Pure function from report to sections.
    pub fn sections(&self, report: &SummaryReport) -> ReportSections {
        ReportSections {
            table_summary: self.summary_table(report),
            table: self.breakdown_table(report),
            job_table: self.job_table(report),
            fifemon_link: self.batch_history_link(),
            hide_failed_table: report.total_failed == 0,
        }
    }

    /// Merge sections into the document template. The core hands the
    /// template collaborator plain strings only, never template syntax.
    pub fn merge(&self, template: &str, sections: &ReportSections) -> Result<String, RenderError> {
        let (divopen, divclose) = if sections.hide_failed_table {
            ("\n<div style=\"display:none\">", "\n</div>")
        } else {
            ("", "")
        };

        let mut context = Context::new();
        context.insert("vo", &self.vo);
        context.insert("start", &self.window.start_display());
        context.insert("end", &self.window.end_display());
        context.insert("table_summary", &sections.table_summary);
        context.insert("table", &sections.table);
        context.insert("table_jobs", &sections.job_table);
        context.insert("divopen", divopen);
        context.insert("divclose", divclose);
        context.insert("fifemon_link", &sections.fifemon_link);

        Ok(Tera::one_off(template, &context, false)?)
    }

    fn summary_table(&self, report: &SummaryReport) -> String {
        let mut table = String::new();
        for site in &report.sites {
            table.push_str(&format!(
                "\n<tr><td align = \"left\">{}</td>\
                 <td align = \"right\">{}</td>\
                 <td align = \"right\">{}</td>\
                 <td align = \"right\">{:.1}</td></tr>",
                site.site, site.total, site.failed, site.success_rate_pct
            ));
        }
        table.push_str(&format!(
            "\n<tr><td align = \"left\">Total</td>\
             <td align = \"right\">{}</td>\
             <td align = \"right\">{}</td>\
             <td align = \"right\">{:.1}</td></tr>",
            report.total_jobs, report.total_failed, report.success_rate_pct
        ));
        table
    }

    fn breakdown_table(&self, report: &SummaryReport) -> String {
        let mut table = String::new();
        for site in &report.sites {
            table.push_str(&format!(
                "\n<tr><td align = \"left\">{}</td>\
                 <td align = \"right\">{}</td>\
                 <td align = \"right\">{}</td>\
                 <td align = \"right\">{:.1}</td>\
                 <td></td><td></td><td></td></tr>",
                site.site, site.total, site.failed, site.success_rate_pct
            ));
            for failure in &site.failures {
                table.push_str(&format!(
                    "\n<tr><td></td><td></td><td></td><td></td>\
                     <td align = \"left\">{}</td>\
                     <td align = \"right\">{}</td>\
                     <td align = \"right\">{}</td></tr>",
                    failure.host, failure.exit_code, failure.count
                ));
            }
        }
        table.push_str(&format!(
            "\n<tr><td align = \"left\">Total</td>\
             <td align = \"right\">{}</td>\
             <td align = \"right\">{}</td>\
             <td align = \"right\">{:.1}</td>\
             <td></td><td></td><td></td></tr>",
            report.total_jobs, report.total_failed, report.success_rate_pct
        ));
        table
    }

    fn job_table(&self, report: &SummaryReport) -> String {
        let mut table = String::new();
        for cluster in &report.failed_clusters {
            table.push_str(&format!(
                "\n<tr><td align = \"left\">{}</td>\
                 <td align = \"right\">{}</td>\
                 <td align = \"right\">{}</td>\
                 <td align = \"right\">{}</td>\
                 <td></td><td></td><td></td><td></td><td></td><td></td></tr>",
                cluster.cluster_id, cluster.user, cluster.total_jobs, cluster.failed_jobs
            ));
            for job in &cluster.jobs {
                table.push_str(&format!(
                    "\n<tr><td></td><td></td><td></td><td></td>\
                     <td align = \"left\">{}</td>\
                     <td align = \"left\">{}</td>\
                     <td align = \"left\">{}</td>\
                     <td align = \"right\">{}</td>\
                     <td align = \"right\">{}</td>\
                     <td align = \"right\">{}</td></tr>",
                    self.job_html(&job.job_id, job.start_time, job.end_time),
                    format_time(job.start_time),
                    format_time(job.end_time),
                    job.site,
                    job.host,
                    job.exit_code
                ));
            }
        }
        table
    }

    /// Deep link to the cluster dashboard for one job, padded around its
    /// own start/end. A raw (unreconstructed) job id has no cluster and
    /// scheduler parts to link with and renders as plain text.
    fn job_html(&self, job_id: &str, start: NaiveDateTime, end: NaiveDateTime) -> String {
        match self.jobparts.captures(job_id) {
            Some(caps) => {
                let from = start.and_utc().timestamp_millis() - LINK_PADDING_MS;
                let to = end.and_utc().timestamp_millis() + LINK_PADDING_MS;
                let link = format!(
                    "{DASHBOARD_BASE}/job-cluster-summary?var-cluster={}&var-schedd={}&from={}&to={}",
                    &caps[1], &caps[2], from, to
                );
                format!("<a href=\"{link}\">{job_id}</a>")
            }
            None => job_id.to_string(),
        }
    }

    fn batch_history_link(&self) -> String {
        let (from, to) = self.window.epoch_millis();
        let link = format!(
            "{DASHBOARD_BASE}/user-batch-history?from={from}&to={to}&var-user={}pro",
            self.vo.to_lowercase()
        );
        format!("<a href=\"{link}\">Fifemon</a>")
    }
}

fn format_time(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{ClusterFailure, FailedJob, HostFailureCount, SiteSummary};
    use chrono::NaiveDate;

    fn window() -> ReportWindow {
        ReportWindow::parse("2018/03/28 06:30", "2018/03/29 06:30").unwrap()
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 3, 28)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn report() -> SummaryReport {
        SummaryReport {
            sites: vec![SiteSummary {
                site: "SiteA".to_string(),
                total: 10,
                failed: 3,
                success_rate_pct: 70.0,
                failures: vec![HostFailureCount {
                    host: "fnpc1234.fnal.gov".to_string(),
                    exit_code: 1,
                    count: 3,
                }],
            }],
            failed_clusters: vec![ClusterFailure {
                cluster_id: "12345".to_string(),
                user: "jdoe".to_string(),
                total_jobs: 4,
                failed_jobs: 1,
                jobs: vec![FailedJob {
                    job_id: "12345.0@fifebatch1.fnal.gov".to_string(),
                    start_time: ts(),
                    end_time: ts(),
                    site: "SiteA".to_string(),
                    host: "fnpc1234.fnal.gov".to_string(),
                    exit_code: 1,
                }],
            }],
            total_jobs: 10,
            total_failed: 3,
            success_rate_pct: 70.0,
        }
    }

    #[test]
    fn summary_table_has_trailing_total_row() {
        let sections = Renderer::new(window(), "uboone").sections(&report());
        assert!(sections.table_summary.contains("SiteA"));
        assert!(sections.table_summary.contains("70.0"));
        assert!(sections
            .table_summary
            .ends_with("<td align = \"right\">70.0</td></tr>"));
        assert!(sections.table_summary.contains(">Total</td>"));
    }

    #[test]
    fn job_link_padded_around_job_window() {
        let renderer = Renderer::new(window(), "uboone");
        let html = renderer.job_html("12345.0@fifebatch1.fnal.gov", ts(), ts());

        let millis = ts().and_utc().timestamp_millis();
        assert!(html.contains("var-cluster=12345"));
        assert!(html.contains("var-schedd=fifebatch1.fnal.gov"));
        assert!(html.contains(&format!("from={}", millis - 300_000)));
        assert!(html.contains(&format!("to={}", millis + 300_000)));
    }

    #[test]
    fn unlinkable_job_id_renders_plain() {
        let renderer = Renderer::new(window(), "uboone");
        let html = renderer.job_html("garbage-id-string", ts(), ts());
        assert_eq!(html, "garbage-id-string");
    }

    #[test]
    fn batch_history_link_uses_lowercased_audience() {
        let sections = Renderer::new(window(), "UBooNE").sections(&report());
        assert!(sections.fifemon_link.contains("var-user=uboonepro"));
    }

    #[test]
    fn zero_failures_hides_detail_section_but_keeps_it() {
        let mut r = report();
        r.total_failed = 0;
        r.failed_clusters.clear();

        let renderer = Renderer::new(window(), "uboone");
        let sections = renderer.sections(&r);
        assert!(sections.hide_failed_table);

        let html = renderer.merge(JOBRATE_TEMPLATE, &sections).unwrap();
        assert!(html.contains("<div style=\"display:none\">"));
    }

    #[test]
    fn merge_substitutes_all_placeholders() {
        let renderer = Renderer::new(window(), "uboone");
        let sections = renderer.sections(&report());
        let html = renderer.merge(JOBRATE_TEMPLATE, &sections).unwrap();

        assert!(html.contains("uboone"));
        assert!(html.contains("2018/03/28 06:30"));
        assert!(html.contains("SiteA"));
        assert!(html.contains("Fifemon"));
        assert!(!html.contains("{{"));
    }
}
