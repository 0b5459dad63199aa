//! Search backend collaborator
//!
//! The core depends only on [`RecordSource`]: a finite sequence of raw
//! record mappings (or a pre-aggregated bucket tree) for one time window.
//! [`ElasticsearchSource`] is the production implementation; a query
//! failure surfaces as [`SearchError`] to the caller and is fatal to the
//! run — no partial report is built.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::{ProjectConfig, VoConfig};
use crate::record::RawRecord;
use crate::window::ReportWindow;

/// Documents fetched per scroll page.
const SCROLL_PAGE_SIZE: usize = 1000;
/// Scroll context keep-alive.
const SCROLL_KEEP_ALIVE: &str = "5m";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

/// Supplies raw records and aggregation trees for a report run.
pub trait RecordSource {
    /// Fetch every document matching `body` from `index`.
    fn scan(&self, index: &str, body: &Value) -> Result<Vec<RawRecord>, SearchError>;

    /// Run an aggregation-only query and return the `aggregations` tree.
    fn aggregate(&self, index: &str, body: &Value) -> Result<Value, SearchError>;
}

/// Query body for the job success rate report.
///
/// Filters the window on `EndTime` and payload records only. VOs without a
/// production role match their VOName by wildcard; everyone else must
/// carry `*Role=Production*` and match VOName exactly.
pub fn jobrate_query(window: &ReportWindow, vo: &VoConfig) -> Value {
    let mut filter = vec![
        json!({"range": {"EndTime": {"gte": window.start_iso(), "lt": window.end_iso()}}}),
        json!({"term": {"ResourceType": "Payload"}}),
    ];

    let must = if vo.no_production {
        json!([{"wildcard": {"VOName": vo.voname}}])
    } else {
        filter.push(json!({"term": {"VOName": vo.voname}}));
        json!([{"wildcard": {"VOName": "*Role=Production*"}}])
    };

    json!({
        "query": {
            "bool": {
                "filter": filter,
                "must": must,
            }
        }
    })
}

/// Aggregation-only query body for the project summary report:
/// ProjectName → PIName → Organization → FieldOfScience buckets with a
/// CoreHours sum at the leaves.
pub fn projects_query(window: &ReportWindow, project: &ProjectConfig) -> Value {
    json!({
        "size": 0,
        "query": {
            "bool": {
                "filter": [
                    {"range": {"EndTime": {"gte": window.start_iso(), "lt": window.end_iso()}}},
                    {"range": {"WallDuration": {"gt": 0}}},
                    {"terms": {"ProbeName": project.probe_list}},
                    {"term": {"ResourceType": "Payload"}},
                ]
            }
        },
        "aggs": {
            "group_ProjectName": {
                "terms": {"field": "ProjectName", "size": 1000000000, "order": {"_key": "asc"}},
                "aggs": {
                    "group_PIName": {
                        "terms": {"field": "PIName"},
                        "aggs": {
                            "group_Organization": {
                                "terms": {"field": "Organization"},
                                "aggs": {
                                    "group_FOS": {
                                        "terms": {"field": "FieldOfScience"},
                                        "aggs": {
                                            "CoreHours_sum": {"sum": {"field": "CoreHours"}}
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Elasticsearch-backed [`RecordSource`] using scroll pagination.
pub struct ElasticsearchSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl ElasticsearchSource {
    pub fn new(base_url: &str) -> Result<Self, SearchError> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn post(&self, url: &str, body: &Value) -> Result<Value, SearchError> {
        let response = self.client.post(url).json(body).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Backend {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(response.json()?)
    }

    fn scroll_id(page: &Value) -> Result<&str, SearchError> {
        page.get("_scroll_id")
            .and_then(Value::as_str)
            .ok_or_else(|| SearchError::MalformedResponse("missing _scroll_id".to_string()))
    }

    fn page_hits(page: &Value) -> Result<Vec<RawRecord>, SearchError> {
        let hits = page
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchError::MalformedResponse("missing hits.hits".to_string()))?;

        let mut records = Vec::with_capacity(hits.len());
        for hit in hits {
            let source = hit
                .get("_source")
                .and_then(Value::as_object)
                .ok_or_else(|| SearchError::MalformedResponse("hit without _source".to_string()))?;
            records.push(source.clone().into_iter().collect());
        }
        Ok(records)
    }
}

impl RecordSource for ElasticsearchSource {
    fn scan(&self, index: &str, body: &Value) -> Result<Vec<RawRecord>, SearchError> {
        let mut paged = body.clone();
        if let Value::Object(ref mut map) = paged {
            map.insert("size".to_string(), json!(SCROLL_PAGE_SIZE));
        }

        let url = format!(
            "{}/{}/_search?scroll={}",
            self.base_url, index, SCROLL_KEEP_ALIVE
        );
        let mut page = self.post(&url, &paged)?;
        let mut records = Self::page_hits(&page)?;

        let scroll_url = format!("{}/_search/scroll", self.base_url);
        let mut scroll_id = Self::scroll_id(&page)?.to_string();
        loop {
            page = self.post(
                &scroll_url,
                &json!({"scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id}),
            )?;
            scroll_id = Self::scroll_id(&page)?.to_string();
            let batch = Self::page_hits(&page)?;
            if batch.is_empty() {
                break;
            }
            records.extend(batch);
        }

        // Free the scroll context instead of letting it idle out the
        // keep-alive server-side; best-effort only.
        let clear = self
            .client
            .delete(&scroll_url)
            .json(&json!({"scroll_id": scroll_id}))
            .send();
        if let Err(err) = clear {
            debug!(error = %err, "could not clear scroll context");
        }

        debug!(count = records.len(), index, "fetched records");
        Ok(records)
    }

    fn aggregate(&self, index: &str, body: &Value) -> Result<Value, SearchError> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let response = self.post(&url, body)?;
        response
            .get("aggregations")
            .cloned()
            .ok_or_else(|| SearchError::MalformedResponse("missing aggregations".to_string()))
    }
}
