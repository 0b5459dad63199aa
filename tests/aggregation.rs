//! End-to-end aggregation pipeline tests over in-memory records.

use std::sync::Mutex;

use serde_json::{json, Value};

use gracc_reporting::config::{
    ElasticsearchConfig, EmailConfig, ProjectConfig, ReportConfig, VoConfig,
};
use gracc_reporting::deliver::{notify_failure, Delivery, DeliveryError, EmailMessage};
use gracc_reporting::record::{Normalizer, RawRecord};
use gracc_reporting::search::{RecordSource, SearchError};
use gracc_reporting::store::JobStore;
use gracc_reporting::summary::{summarize, CLUSTER_DETAIL_CAP};
use gracc_reporting::{JobRateReport, ReportError, ReportWindow, RunOutcome};

/// Serves a canned result set instead of a live backend.
struct StaticSource {
    records: Vec<RawRecord>,
    aggregations: Value,
}

impl RecordSource for StaticSource {
    fn scan(&self, _index: &str, _body: &Value) -> Result<Vec<RawRecord>, SearchError> {
        Ok(self.records.clone())
    }

    fn aggregate(&self, _index: &str, _body: &Value) -> Result<Value, SearchError> {
        Ok(self.aggregations.clone())
    }
}

/// Records sent messages instead of delivering them.
#[derive(Default)]
struct RecordingDelivery {
    sent: Mutex<Vec<EmailMessage>>,
}

impl Delivery for RecordingDelivery {
    fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Refuses every message.
struct FailingDelivery;

impl Delivery for FailingDelivery {
    fn send(&self, _message: &EmailMessage) -> Result<(), DeliveryError> {
        Err(DeliveryError::NoRecipients)
    }
}

fn raw_record(cluster: u32, proc: u32, site: &str, exit_code: i64) -> RawRecord {
    let mut raw = RawRecord::new();
    raw.insert("StartTime".into(), json!("2018-03-28T06:30:00Z"));
    raw.insert("EndTime".into(), json!("2018-03-28T07:45:00Z"));
    raw.insert(
        "CommonName".into(),
        json!("/DC=org/DC=cilogon/C=US/O=Fermilab/CN=UID:jdoe"),
    );
    raw.insert(
        "GlobalJobId".into(),
        json!(format!(
            "condor.fifebatch1.fnal.gov#{cluster}.{proc}#1522218600"
        )),
    );
    raw.insert("Host_description".into(), json!(site));
    raw.insert("Host".into(), json!("fnpc1234.fnal.gov (primary)"));
    raw.insert("Resource_ExitCode".into(), json!(exit_code));
    raw
}

fn build_store(raws: &[RawRecord]) -> JobStore {
    let normalizer = Normalizer::new();
    let mut store = JobStore::new();
    for raw in raws {
        if let Some(normalized) = normalizer.normalize(raw) {
            store.add(&normalized.user, normalized.record);
        }
    }
    store
}

fn config() -> ReportConfig {
    let mut config = ReportConfig {
        index_pattern: "gracc.osg.raw-%Y.%m".to_string(),
        elasticsearch: ElasticsearchConfig {
            hostname: "http://localhost:9200".to_string(),
        },
        email: EmailConfig {
            smtphost: "smtp.example.com".to_string(),
            from_name: "GRACC Operations".to_string(),
            from_email: "ops@example.com".to_string(),
            test_to: vec!["tester@example.com".to_string()],
            maintainers: vec![],
        },
        vo: Default::default(),
        project: Default::default(),
    };
    config.vo.insert(
        "uboone".to_string(),
        VoConfig {
            voname: "uboone".to_string(),
            emails: vec!["uboone-list@example.com".to_string()],
            no_production: false,
        },
    );
    config.project.insert(
        "osg".to_string(),
        ProjectConfig {
            probe_list: vec!["condor:example.edu".to_string()],
            emails: vec![],
        },
    );
    config
}

fn window() -> ReportWindow {
    ReportWindow::parse("2018/03/28 06:30", "2018/03/29 06:30").unwrap()
}

#[test]
fn records_missing_required_fields_reach_no_bucket() {
    let mut broken = raw_record(1, 0, "SiteA", 0);
    broken.remove("Resource_ExitCode");

    let store = build_store(&[broken, raw_record(2, 0, "SiteA", 1)]);

    assert_eq!(store.len(), 1);
    let report = summarize(&store).unwrap();
    assert_eq!(report.total_jobs, 1);
    assert_eq!(report.total_failed, 1);
}

#[test]
fn null_site_records_reach_no_bucket_and_no_cluster() {
    let store = build_store(&[raw_record(1, 0, "NULL", 1), raw_record(2, 0, "SiteA", 0)]);

    assert_eq!(store.len(), 1);
    assert_eq!(store.clusters().count(), 1);
    let report = summarize(&store).unwrap();
    assert_eq!(report.total_jobs, 1);
    assert_eq!(report.total_failed, 0);
}

#[test]
fn cluster_cap_limits_detail_but_not_totals() {
    let raws: Vec<RawRecord> = (0..150).map(|i| raw_record(i, 0, "SiteA", 1)).collect();
    let report = summarize(&build_store(&raws)).unwrap();

    assert_eq!(report.failed_clusters.len(), CLUSTER_DETAIL_CAP);
    assert_eq!(report.total_failed, 150);
}

#[test]
fn aggregation_is_idempotent_end_to_end() {
    let raws: Vec<RawRecord> = (0..30)
        .map(|i| raw_record(i, 0, if i % 2 == 0 { "SiteA" } else { "SiteB" }, (i % 3) as i64))
        .collect();
    let store = build_store(&raws);

    assert_eq!(summarize(&store), summarize(&store));
}

#[test]
fn empty_result_set_sends_nothing() {
    let source = StaticSource {
        records: vec![],
        aggregations: json!({}),
    };
    let delivery = RecordingDelivery::default();
    let config = config();

    let outcome = JobRateReport::new(&config, window(), "uboone", None, false, false)
        .execute(&source, &delivery)
        .unwrap();

    assert_eq!(outcome, RunOutcome::NothingToReport);
    assert!(delivery.sent.lock().unwrap().is_empty());
}

#[test]
fn all_records_skipped_sends_nothing() {
    let mut broken = raw_record(1, 0, "SiteA", 0);
    broken.remove("Host");
    let source = StaticSource {
        records: vec![broken],
        aggregations: json!({}),
    };
    let delivery = RecordingDelivery::default();
    let config = config();

    let outcome = JobRateReport::new(&config, window(), "uboone", None, false, false)
        .execute(&source, &delivery)
        .unwrap();

    assert_eq!(outcome, RunOutcome::NothingToReport);
    assert!(delivery.sent.lock().unwrap().is_empty());
}

#[test]
fn full_run_delivers_and_removes_report_file() {
    let workdir = tempfile::tempdir().unwrap();

    let source = StaticSource {
        records: vec![
            raw_record(1, 0, "SiteA", 0),
            raw_record(2, 0, "SiteA", 1),
            raw_record(3, 0, "SiteB", 0),
        ],
        aggregations: json!({}),
    };
    let delivery = RecordingDelivery::default();
    let config = config();

    let report = JobRateReport::new(&config, window(), "uboone", None, false, false)
        .in_directory(workdir.path());
    let outcome = report.execute(&source, &delivery).unwrap();

    assert_eq!(outcome, RunOutcome::Sent);
    assert!(!report.report_path().exists());

    let sent = delivery.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let message = &sent[0];
    assert!(message.subject.contains("uboone Production Jobs Success Rate"));
    assert_eq!(
        message.to,
        vec![
            "uboone-list@example.com".to_string(),
            "tester@example.com".to_string()
        ]
    );
    assert!(message.html_body.contains("SiteA"));
    assert!(message.html_body.contains("Fifemon"));
}

#[test]
fn delivery_failure_leaves_report_file_in_place() {
    let workdir = tempfile::tempdir().unwrap();

    let source = StaticSource {
        records: vec![raw_record(1, 0, "SiteA", 1)],
        aggregations: json!({}),
    };
    let config = config();

    let report = JobRateReport::new(&config, window(), "uboone", None, false, false)
        .in_directory(workdir.path());
    let result = report.execute(&source, &FailingDelivery);

    assert!(matches!(result, Err(ReportError::Delivery(_))));
    assert!(report.report_path().exists());
}

#[test]
fn failure_notification_targets_maintainers_and_swallows_errors() {
    let mut email = config().email;
    email.maintainers = vec!["oncall@example.com".to_string()];

    let delivery = RecordingDelivery::default();
    notify_failure(&delivery, &email, "search backend error: boom");

    let sent = delivery.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["oncall@example.com".to_string()]);
    assert!(sent[0].subject.contains("Error running GRACC report"));
    assert!(sent[0].html_body.contains("boom"));
    drop(sent);

    // A refused notification must not propagate.
    notify_failure(&FailingDelivery, &email, "boom");
}

#[test]
fn setup_errors_feed_the_failure_notification() {
    let err: ReportError = ReportWindow::parse("garbage", "2018/03/29 06:30")
        .unwrap_err()
        .into();

    let delivery = RecordingDelivery::default();
    let email = config().email;
    notify_failure(&delivery, &email, &err.to_string());

    let sent = delivery.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    // Maintainers unset in this config; notifications fall back to the
    // test list.
    assert_eq!(sent[0].to, vec!["tester@example.com".to_string()]);
    assert!(sent[0].html_body.contains("invalid report window"));
}
