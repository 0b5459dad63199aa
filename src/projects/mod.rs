//! Project wall-hours report
//!
//! Companion report to the job success rate report: flattens the nested
//! terms-aggregation response (ProjectName → PIName → Organization →
//! FieldOfScience, with a CoreHours sum at the leaves) into rows ordered
//! case-insensitively by project name, with a trailing Total row.
//!
//! Unlike the job report, ordering here is imposed by the report itself,
//! not by insertion order.

use serde::Deserialize;
use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;

use crate::render::RenderError;
use crate::window::ReportWindow;

/// Default document template for the project report.
pub const PROJECTS_TEMPLATE: &str = include_str!("../../templates/projects.html");

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("malformed aggregation response: {0}")]
    MalformedAggregations(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct TermsAgg<B> {
    buckets: Vec<B>,
}

#[derive(Debug, Deserialize)]
struct ProjectBucket {
    key: String,
    #[serde(rename = "group_PIName")]
    pis: TermsAgg<PiBucket>,
}

#[derive(Debug, Deserialize)]
struct PiBucket {
    key: String,
    #[serde(rename = "group_Organization")]
    organizations: TermsAgg<OrganizationBucket>,
}

#[derive(Debug, Deserialize)]
struct OrganizationBucket {
    key: String,
    #[serde(rename = "group_FOS")]
    fields_of_science: TermsAgg<FosBucket>,
}

#[derive(Debug, Deserialize)]
struct FosBucket {
    key: String,
    #[serde(rename = "CoreHours_sum")]
    core_hours: MetricValue,
}

#[derive(Debug, Deserialize)]
struct MetricValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ProjectAggregations {
    #[serde(rename = "group_ProjectName")]
    projects: TermsAgg<ProjectBucket>,
}

/// One flattened row of the project report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRow {
    pub project: String,
    pub pi: String,
    pub institution: String,
    pub field_of_science: String,
    pub wall_hours: f64,
}

/// The flattened project report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectReport {
    /// Rows ordered case-insensitively by project name.
    pub rows: Vec<ProjectRow>,
    pub total_wall_hours: f64,
}

impl ProjectReport {
    /// Flatten an `aggregations` tree from the search backend.
    pub fn from_aggregations(aggregations: &Value) -> Result<Self, ProjectError> {
        let parsed: ProjectAggregations = serde_json::from_value(aggregations.clone())?;

        let mut projects = parsed.projects.buckets;
        projects.sort_by_key(|bucket| bucket.key.to_lowercase());

        let mut rows = Vec::new();
        for project in &projects {
            for pi in &project.pis.buckets {
                for organization in &pi.organizations.buckets {
                    for fos in &organization.fields_of_science.buckets {
                        rows.push(ProjectRow {
                            project: project.key.clone(),
                            pi: pi.key.clone(),
                            institution: organization.key.clone(),
                            field_of_science: fos.key.clone(),
                            wall_hours: fos.core_hours.value,
                        });
                    }
                }
            }
        }

        let total_wall_hours = rows.iter().map(|row| row.wall_hours).sum();
        Ok(Self {
            rows,
            total_wall_hours,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the table rows with a trailing Total row.
    pub fn table(&self) -> String {
        let mut table = String::new();
        for row in &self.rows {
            table.push_str(&format!(
                "\n<tr><td align = \"left\">{}</td>\
                 <td align = \"left\">{}</td>\
                 <td align = \"left\">{}</td>\
                 <td align = \"left\">{}</td>\
                 <td align = \"right\">{:.1}</td></tr>",
                row.project, row.pi, row.institution, row.field_of_science, row.wall_hours
            ));
        }
        table.push_str(&format!(
            "\n<tr><td align = \"left\">Total</td>\
             <td></td><td></td><td></td>\
             <td align = \"right\">{:.1}</td></tr>",
            self.total_wall_hours
        ));
        table
    }

    /// Merge the table into the document template.
    pub fn render(&self, template: &str, title: &str) -> Result<String, RenderError> {
        let mut context = Context::new();
        context.insert("title", title);
        context.insert("table", &self.table());
        Ok(Tera::one_off(template, &context, false)?)
    }
}

/// Report title, dependent on the report type the way the predecessor
/// system named them.
pub fn report_title(report_type: &str, window: &ReportWindow) -> String {
    let range = format!("{} - {}", window.start_display(), window.end_display());
    match report_type.to_uppercase().as_str() {
        "OSG" => format!("OSG-Direct Projects {range}"),
        "XD" => format!("OSG-XD Projects {range}"),
        _ => format!("{report_type} Projects {range}"),
    }
}
