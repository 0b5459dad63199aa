//! Record normalization
//!
//! Turns raw event-store records (field name → value mappings, as returned
//! by the search backend) into typed [`JobRecord`]s. A record missing any
//! required field is skipped without surfacing an error; this matches the
//! behavior of the predecessor accounting system and keeps report totals
//! comparable across the migration.
//!
//! Identity and job-id extraction are ordered chains of pure parse
//! attempts: each tier returns `Option` and a failed tier falls through to
//! the next, ending at the raw string verbatim.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use regex_lite::Regex;
use serde_json::Value;
use tracing::debug;

/// A raw record as returned by the search backend.
pub type RawRecord = HashMap<String, Value>;

/// Raw record field holding the job start timestamp.
pub const FIELD_START_TIME: &str = "StartTime";
/// Raw record field holding the job end timestamp.
pub const FIELD_END_TIME: &str = "EndTime";
/// Raw record field holding the credential subject (identity).
pub const FIELD_COMMON_NAME: &str = "CommonName";
/// Raw record field holding the globally-reported job id.
pub const FIELD_GLOBAL_JOB_ID: &str = "GlobalJobId";
/// Raw record field holding the execution resource description (site).
pub const FIELD_HOST_DESCRIPTION: &str = "Host_description";
/// Raw record field holding the real execution hostname.
pub const FIELD_HOST: &str = "Host";
/// Raw record field holding the job exit code.
pub const FIELD_EXIT_CODE: &str = "Resource_ExitCode";

/// One job execution instance, validated and typed.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    /// Job start timestamp. `start_time <= end_time` is expected but a
    /// violating record is kept as-is, not corrected.
    pub start_time: NaiveDateTime,
    /// Job end timestamp.
    pub end_time: NaiveDateTime,
    /// Job id, unique within a cluster. Synthesized as
    /// `<cluster.proc>@<schedd>` when the global job id is well-formed,
    /// otherwise the raw global job id verbatim.
    pub job_id: String,
    /// Execution resource description.
    pub site: String,
    /// Real hostname, with any `" (primary)"` annotation stripped.
    pub host: String,
    /// Exit code: zero is success, anything else is failure.
    pub exit_code: i64,
}

impl JobRecord {
    /// The cluster this record belongs to: the job id prefix before the
    /// first `.` separator.
    pub fn cluster_id(&self) -> &str {
        self.job_id.split('.').next().unwrap_or(&self.job_id)
    }

    /// Whether this job execution failed.
    pub fn is_failure(&self) -> bool {
        self.exit_code != 0
    }
}

/// A normalized record: the job itself plus the submitting user identity
/// extracted from the credential subject.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// Extracted user identity (uid, institutional host, or raw subject).
    pub user: String,
    /// The typed job record.
    pub record: JobRecord,
}

/// Parses raw records into [`NormalizedRecord`]s.
///
/// Holds the compiled extraction patterns; construct once per report run.
pub struct Normalizer {
    usermatch_cilogon: Regex,
    usermatch_fnal: Regex,
    globaljob_parts: Regex,
    realhost_pattern: Regex,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            usermatch_cilogon: Regex::new(r"CN=UID:(\w+)").unwrap(),
            usermatch_fnal: Regex::new(r".+/(\w+\.fnal\.gov)").unwrap(),
            globaljob_parts: Regex::new(r"\w+\.(fifebatch\d\.fnal\.gov)#(\d+\.\d+)#.+").unwrap(),
            realhost_pattern: Regex::new(r"\s\(primary\)").unwrap(),
        }
    }

    /// Normalize one raw record, or decide to skip it.
    ///
    /// Returns `None` when any required field is absent or unusable; the
    /// record then contributes to no bucket and no total. Skips are logged
    /// at debug level only.
    pub fn normalize(&self, raw: &RawRecord) -> Option<NormalizedRecord> {
        let start_raw = self.required(raw, FIELD_START_TIME)?;
        let end_raw = self.required(raw, FIELD_END_TIME)?;
        let common_name = self.required(raw, FIELD_COMMON_NAME)?;
        let global_job_id = self.required(raw, FIELD_GLOBAL_JOB_ID)?;
        let site = self.required(raw, FIELD_HOST_DESCRIPTION)?;
        let host_raw = self.required(raw, FIELD_HOST)?;
        let exit_raw = self.required(raw, FIELD_EXIT_CODE)?;

        let start_time = self.timestamp(FIELD_START_TIME, &start_raw)?;
        let end_time = self.timestamp(FIELD_END_TIME, &end_raw)?;
        let exit_code = self.exit_code(&exit_raw)?;

        Some(NormalizedRecord {
            user: self.parse_identity(&common_name),
            record: JobRecord {
                start_time,
                end_time,
                job_id: self.parse_job_id(&global_job_id),
                site,
                host: self.strip_primary(&host_raw),
                exit_code,
            },
        })
    }

    /// Identity extraction chain: CILogon uid, then institutional host,
    /// then the raw credential subject verbatim. Never fails.
    pub fn parse_identity(&self, common_name: &str) -> String {
        self.cilogon_uid(common_name)
            .or_else(|| self.fnal_host(common_name))
            .unwrap_or_else(|| common_name.to_string())
    }

    /// Tier 1: uid after the `CN=UID:` marker.
    fn cilogon_uid(&self, common_name: &str) -> Option<String> {
        self.usermatch_cilogon
            .captures(common_name)
            .map(|caps| caps[1].to_string())
    }

    /// Tier 2: trailing `<name>.fnal.gov` hostname.
    fn fnal_host(&self, common_name: &str) -> Option<String> {
        self.usermatch_fnal
            .captures(common_name)
            .map(|caps| caps[1].to_string())
    }

    /// Job-id derivation: `<prefix>.<schedd>#<cluster.proc>#<suffix>`
    /// becomes `<cluster.proc>@<schedd>`; anything else passes through
    /// verbatim.
    pub fn parse_job_id(&self, global_job_id: &str) -> String {
        match self.globaljob_parts.captures(global_job_id) {
            Some(caps) => format!("{}@{}", &caps[2], &caps[1]),
            None => global_job_id.to_string(),
        }
    }

    /// Drop any `" (primary)"` annotation from a hostname.
    pub fn strip_primary(&self, host: &str) -> String {
        self.realhost_pattern.replace_all(host, "").into_owned()
    }

    fn required(&self, raw: &RawRecord, field: &str) -> Option<String> {
        match raw.get(field).and_then(field_string) {
            Some(value) => Some(value),
            None => {
                debug!(field, "skipping record: required field missing");
                None
            }
        }
    }

    fn timestamp(&self, field: &str, value: &str) -> Option<NaiveDateTime> {
        match parse_timestamp(value) {
            Some(ts) => Some(ts),
            None => {
                debug!(field, value, "skipping record: unparseable timestamp");
                None
            }
        }
    }

    fn exit_code(&self, value: &str) -> Option<i64> {
        match value.parse::<i64>() {
            Ok(code) => Some(code),
            Err(_) => {
                debug!(value, "skipping record: non-integer exit code");
                None
            }
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend values arrive as strings or numbers; anything else counts as
/// missing.
fn field_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a backend timestamp, tolerating the `T` separator and a trailing
/// `Z` marker.
fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let cleaned = value.trim().replace('T', " ").replace('Z', "");
    NaiveDateTime::parse_from_str(&cleaned, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&cleaned, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}
