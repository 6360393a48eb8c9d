//! Navigation reports from Google Analytics.
//!
//! Page transitions are read from the Reporting API (`ga:previousPagePath` -> `ga:pagePath`, weighted by `ga:pageviews`), then folded onto
//! the project's routes: `/blog/hello` and `/blog/world` both count towards `/blog/[slug]`.
use std::{env, time::Duration};

use async_trait::async_trait;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::{
    errors::ReportProviderError,
    graph::ReportGraph,
    options::Period,
    routing::{RouteMatcher, RoutingModule, normalize_path},
};

pub const ACCESS_TOKEN_ENV: &str = "AUGURE_GA_ACCESS_TOKEN";
pub const REPORTING_ENDPOINT: &str = "https://analyticsreporting.googleapis.com/v4/reports:batchGet";

const ENTRANCE: &str = "(entrance)";

/// Number of page views from one page to another, as reported by analytics.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTransition {
    pub from: String,
    pub to: String,
    pub pageviews: f64,
}

impl PageTransition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, pageviews: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            pageviews,
        }
    }
}

/// Source of raw page transitions for an analytics view.
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    async fn transitions(
        &self,
        view_id: &str,
        period: &Period,
    ) -> Result<Vec<PageTransition>, ReportProviderError>;
}

/// Client for the Google Analytics Reporting API v4.
#[derive(Clone)]
pub struct GoogleAnalyticsClient {
    access_token: String,
    endpoint: String,
    page_size: u32,
    timeout: Option<Duration>,
}

impl GoogleAnalyticsClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            endpoint: REPORTING_ENDPOINT.to_string(),
            page_size: 10_000,
            timeout: None,
        }
    }

    /// Creates a client using the OAuth access token in `AUGURE_GA_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, ReportProviderError> {
        env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .map(Self::new)
            .ok_or(ReportProviderError::MissingCredentials {
                env: ACCESS_TOKEN_ENV,
            })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Bounds each HTTP request, connection included. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn fetch_all(
        &self,
        view_id: &str,
        period: &Period,
    ) -> Result<Vec<PageTransition>, ReportProviderError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(self.timeout)
            .build()
            .into();

        let mut transitions = Vec::new();
        let mut page_token = None;

        loop {
            let request = report_request(view_id, period, self.page_size, page_token.take());

            let mut response = agent
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.access_token))
                .send_json(&request)
                .map_err(|err| ReportProviderError::Request(err.to_string()))?;

            let body: BatchGetResponse = response
                .body_mut()
                .read_json()
                .map_err(|err| ReportProviderError::MalformedResponse(err.to_string()))?;

            let (page, next_page_token) = parse_report_page(body)?;
            trace!(target: "report", "Received {} rows from Google Analytics", page.len());
            transitions.extend(page);

            match next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(target: "report", "Received {} page transitions from Google Analytics", transitions.len());

        Ok(transitions)
    }
}

#[async_trait]
impl AnalyticsClient for GoogleAnalyticsClient {
    async fn transitions(
        &self,
        view_id: &str,
        period: &Period,
    ) -> Result<Vec<PageTransition>, ReportProviderError> {
        let client = self.clone();
        let view_id = view_id.to_string();
        let period = *period;

        tokio::task::spawn_blocking(move || client.fetch_all(&view_id, &period))
            .await
            .map_err(|err| ReportProviderError::Request(err.to_string()))?
    }
}

/// Folds raw page transitions onto `routes`.
///
/// Paths are stripped of their query string and fragment, passed through `formatter`, then replaced by the most specific route pattern
/// matching them. Paths matching no route are kept as-is. Entrances and transitions collapsing into self-loops are dropped.
pub fn build_graph(
    transitions: &[PageTransition],
    routes: &[RoutingModule],
    formatter: Option<&(dyn Fn(&str) -> String + Send + Sync)>,
) -> Result<ReportGraph, ReportProviderError> {
    let matcher = RouteMatcher::new(routes.iter().map(|route| route.path.as_str()));

    let to_route = |path: &str| -> String {
        let path = normalize_path(path);
        let path = match formatter {
            Some(formatter) => formatter(&path),
            None => path,
        };

        matcher
            .find(&path)
            .map(str::to_string)
            .unwrap_or_else(|| normalize_path(&path))
    };

    let mut graph = ReportGraph::new();
    for transition in transitions {
        if transition.from.is_empty() || transition.from == ENTRANCE {
            continue;
        }

        graph.add_transition(
            to_route(&transition.from),
            to_route(&transition.to),
            transition.pageviews,
        )?;
    }

    Ok(graph)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetRequest {
    report_requests: Vec<ReportRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportRequest {
    view_id: String,
    date_ranges: Vec<DateRange>,
    metrics: Vec<Metric>,
    dimensions: Vec<Dimension>,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize)]
struct Metric {
    expression: &'static str,
}

#[derive(Debug, Serialize)]
struct Dimension {
    name: &'static str,
}

fn report_request(
    view_id: &str,
    period: &Period,
    page_size: u32,
    page_token: Option<String>,
) -> BatchGetRequest {
    BatchGetRequest {
        report_requests: vec![ReportRequest {
            view_id: view_id.to_string(),
            date_ranges: vec![DateRange {
                start_date: period.start.format("%Y-%m-%d").to_string(),
                end_date: period.end.format("%Y-%m-%d").to_string(),
            }],
            metrics: vec![Metric {
                expression: "ga:pageviews",
            }],
            dimensions: vec![
                Dimension {
                    name: "ga:previousPagePath",
                },
                Dimension {
                    name: "ga:pagePath",
                },
            ],
            page_size,
            page_token,
        }],
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    reports: Vec<Report>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    #[serde(default)]
    data: ReportData,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportData {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    dimensions: Vec<String>,
    metrics: Vec<DateRangeValues>,
}

#[derive(Debug, Deserialize)]
struct DateRangeValues {
    values: Vec<String>,
}

fn parse_report_page(
    response: BatchGetResponse,
) -> Result<(Vec<PageTransition>, Option<String>), ReportProviderError> {
    let Some(report) = response.reports.into_iter().next() else {
        return Ok((Vec::new(), None));
    };

    let mut transitions = Vec::with_capacity(report.data.rows.len());
    for row in report.data.rows {
        let [from, to] = <[String; 2]>::try_from(row.dimensions).map_err(|dimensions| {
            ReportProviderError::MalformedResponse(format!(
                "expected 2 dimensions per row, got {}",
                dimensions.len()
            ))
        })?;

        let value = row
            .metrics
            .first()
            .and_then(|metric| metric.values.first())
            .ok_or_else(|| {
                ReportProviderError::MalformedResponse(format!("no pageviews for {} -> {}", from, to))
            })?;

        let pageviews: f64 = value.parse().map_err(|_| {
            ReportProviderError::MalformedResponse(format!(
                "invalid pageviews `{}` for {} -> {}",
                value, from, to
            ))
        })?;

        transitions.push(PageTransition::new(from, to, pageviews));
    }

    Ok((transitions, report.next_page_token))
}
