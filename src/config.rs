//! Report configuration
//!
//! Typed view of the TOML config file shared by all report types:
//! search backend location, email routing, per-VO query settings and
//! project-report probe lists.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("VO '{0}' is not configured")]
    UnknownVo(String),

    #[error("project report type '{0}' is not configured")]
    UnknownReportType(String),
}

/// Top-level report configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// strftime-style index pattern, e.g. `gracc.osg.raw-%Y.%m`.
    pub index_pattern: String,
    pub elasticsearch: ElasticsearchConfig,
    pub email: EmailConfig,
    /// Per-VO settings for the job success rate report, keyed by the
    /// lowercased VO name used on the command line.
    #[serde(default)]
    pub vo: HashMap<String, VoConfig>,
    /// Per-report-type settings for the project summary report.
    #[serde(default)]
    pub project: HashMap<String, ProjectConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    /// Base URL of the search backend, e.g.
    /// `https://gracc.opensciencegrid.org/q`.
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host.
    pub smtphost: String,
    pub from_name: String,
    pub from_email: String,
    /// Recipients for test runs; also appended to production runs.
    #[serde(default)]
    pub test_to: Vec<String>,
    /// Maintainer addresses for failure notifications. Falls back to
    /// `test_to` when empty.
    #[serde(default)]
    pub maintainers: Vec<String>,
}

impl EmailConfig {
    /// Addresses to notify when a run fails.
    pub fn failure_recipients(&self) -> &[String] {
        if self.maintainers.is_empty() {
            &self.test_to
        } else {
            &self.maintainers
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoConfig {
    /// VOName value used in the backend query.
    pub voname: String,
    /// Production distribution list.
    #[serde(default)]
    pub emails: Vec<String>,
    /// VOs without a production role get a plain wildcard VOName query
    /// instead of the `*Role=Production*` filter.
    #[serde(default)]
    pub no_production: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// ProbeName values to include.
    pub probe_list: Vec<String>,
    /// Distribution list for this report type.
    #[serde(default)]
    pub emails: Vec<String>,
}

impl ReportConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: ReportConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn vo(&self, name: &str) -> Result<&VoConfig, ConfigError> {
        self.vo
            .get(&name.to_lowercase())
            .ok_or_else(|| ConfigError::UnknownVo(name.to_string()))
    }

    pub fn project(&self, report_type: &str) -> Result<&ProjectConfig, ConfigError> {
        self.project
            .get(&report_type.to_lowercase())
            .ok_or_else(|| ConfigError::UnknownReportType(report_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
index_pattern = "gracc.osg.raw-%Y.%m"

[elasticsearch]
hostname = "https://gracc.opensciencegrid.org/q"

[email]
smtphost = "smtp.example.com"
from_name = "GRACC Operations"
from_email = "ops@example.com"
test_to = ["nobody@example.com"]

[vo.uboone]
voname = "uboone"
emails = ["uboone-list@example.com"]

[vo.darkside]
voname = "darkside"
no_production = true

[project.osg]
probe_list = ["condor:amundsen.grid.uchicago.edu", "condor:gate02.grid.umich.edu"]
emails = ["osg-list@example.com"]
"#;

    fn sample_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_sample_config() {
        let file = sample_file();
        let config = ReportConfig::from_file(file.path()).unwrap();

        assert_eq!(config.index_pattern, "gracc.osg.raw-%Y.%m");
        assert_eq!(config.email.smtphost, "smtp.example.com");
        assert_eq!(config.vo("UBooNE").unwrap().voname, "uboone");
        assert!(config.vo("darkside").unwrap().no_production);
        assert_eq!(config.project("OSG").unwrap().probe_list.len(), 2);
    }

    #[test]
    fn unknown_vo_is_an_error() {
        let file = sample_file();
        let config = ReportConfig::from_file(file.path()).unwrap();
        assert!(matches!(
            config.vo("nosuchvo"),
            Err(ConfigError::UnknownVo(_))
        ));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"blahblah\"").unwrap();
        assert!(matches!(
            ReportConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn failure_recipients_fall_back_to_test_list() {
        let file = sample_file();
        let config = ReportConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.email.failure_recipients(),
            &["nobody@example.com".to_string()]
        );
    }
}
