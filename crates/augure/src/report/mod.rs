//! Navigation reports: where users go next, from each route.
use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info};

use crate::{
    config::ReportSource,
    errors::{BoxError, ReportProviderError},
    graph::ReportGraph,
    options::{AugureOptions, Period, RouteFormatter},
    routing::RoutingModule,
};

pub mod ga;

use ga::{AnalyticsClient, GoogleAnalyticsClient};

/// A custom source of navigation reports, used instead of Google Analytics.
///
/// Implemented for async closures:
/// ```rust,ignore
/// use augure::ReportGraph;
///
/// let provider = || async {
///     let report = std::fs::read_to_string("report.json")?;
///     Ok::<_, augure::errors::BoxError>(ReportGraph::from_json(&report)?)
/// };
/// ```
#[async_trait]
pub trait ReportProvider: Send + Sync {
    async fn report(&self) -> Result<ReportGraph, BoxError>;
}

#[async_trait]
impl<F, Fut, E> ReportProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ReportGraph, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn report(&self) -> Result<ReportGraph, BoxError> {
        (self)().await.map_err(Into::into)
    }
}

pub struct ReportFetcher {
    source: ReportSource,
    period: Period,
    formatter: Option<RouteFormatter>,
    timeout: Option<Duration>,
}

impl ReportFetcher {
    pub fn new(source: ReportSource, options: &AugureOptions) -> Self {
        Self {
            source,
            period: options.period.unwrap_or_default(),
            formatter: options.route_formatter.clone(),
            timeout: options.timeout,
        }
    }

    /// Fetches the report for `routes`. Failures are returned as-is, nothing is retried.
    pub async fn fetch(&self, routes: &[RoutingModule]) -> Result<ReportGraph, ReportProviderError> {
        let graph = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.fetch_source(routes))
                .await
                .map_err(|_| ReportProviderError::Timeout(timeout))??,
            None => self.fetch_source(routes).await?,
        };

        graph.validate()?;

        info!(target: "report", "Report contains {} transitions", graph.edge_count());

        Ok(graph)
    }

    async fn fetch_source(&self, routes: &[RoutingModule]) -> Result<ReportGraph, ReportProviderError> {
        match &self.source {
            ReportSource::Analytics { view_id, client } => {
                let client: Arc<dyn AnalyticsClient> = match client {
                    Some(client) => client.clone(),
                    None => Arc::new(GoogleAnalyticsClient::from_env()?.with_timeout(self.timeout)),
                };

                debug!(target: "report", "Fetching Google Analytics report for view {} ({} to {})", view_id, self.period.start, self.period.end);

                let transitions = client.transitions(view_id, &self.period).await?;
                ga::build_graph(&transitions, routes, self.formatter.as_deref())
            }
            ReportSource::Custom(provider) => provider
                .report()
                .await
                .map_err(ReportProviderError::Provider),
        }
    }
}
