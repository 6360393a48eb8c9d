//! Route resolution: figures out which routes the project has, and which chunk owns each of them.
use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::{
    errors::{BoxError, RouteResolutionError},
    options::{AugureOptions, Mode, ProjectLayout, RouteProviderSetting},
    routing::RoutingModule,
};

pub mod defaults;
pub mod parser;

use parser::{FileSystemRouteParser, RouteParser};

/// A custom source of routes.
///
/// Implemented for async closures, so most of the time a closure is enough:
/// ```rust,ignore
/// use augure::{RouteProviderSetting, RoutingModule};
///
/// let provider = RouteProviderSetting::custom(|| async {
///     Ok::<_, augure::errors::BoxError>(vec![RoutingModule::new("/blog", "blog").lazy()])
/// });
/// ```
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn routes(&self) -> Result<Vec<RoutingModule>, BoxError>;
}

#[async_trait]
impl<F, Fut, E> RouteProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<RoutingModule>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn routes(&self) -> Result<Vec<RoutingModule>, BoxError> {
        (self)().await.map_err(Into::into)
    }
}

/// Strategy used to extract routes, chosen once from the options.
#[derive(Clone)]
pub enum RouteSource {
    Disabled,
    Custom(Arc<dyn RouteProvider>),
    StaticParse {
        root: PathBuf,
        parser: Arc<dyn RouteParser>,
    },
    Convention {
        mode: Mode,
        layout: ProjectLayout,
        root: PathBuf,
    },
}

impl RouteSource {
    /// Picks the strategy in a fixed order: disabled, then custom provider, then static parsing in [`Mode::Auto`], then the mode's conventions.
    pub fn from_options(options: &AugureOptions) -> Self {
        match &options.route_provider {
            RouteProviderSetting::Disabled => RouteSource::Disabled,
            RouteProviderSetting::Custom(provider) => RouteSource::Custom(provider.clone()),
            RouteProviderSetting::Unset if options.mode == Mode::Auto => RouteSource::StaticParse {
                root: options.project_root.clone(),
                parser: options
                    .route_parser
                    .clone()
                    .unwrap_or_else(|| Arc::new(FileSystemRouteParser::for_layout(&options.layout))),
            },
            RouteProviderSetting::Unset => RouteSource::Convention {
                mode: options.mode,
                layout: options.layout.clone(),
                root: options.project_root.clone(),
            },
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            RouteSource::Disabled => "disabled",
            RouteSource::Custom(_) => "custom provider",
            RouteSource::StaticParse { .. } => "static parsing",
            RouteSource::Convention { .. } => "project conventions",
        }
    }
}

pub struct RouteResolver {
    source: RouteSource,
    timeout: Option<Duration>,
}

impl RouteResolver {
    pub fn new(source: RouteSource, timeout: Option<Duration>) -> Self {
        Self { source, timeout }
    }

    pub fn from_options(options: &AugureOptions) -> Self {
        Self::new(RouteSource::from_options(options), options.timeout)
    }

    pub async fn resolve(&self) -> Result<Vec<RoutingModule>, RouteResolutionError> {
        debug!(target: "routes", "Resolving routes through {}", self.source.describe());

        let routes = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.resolve_source())
                .await
                .map_err(|_| RouteResolutionError::Timeout(timeout))??,
            None => self.resolve_source().await?,
        };

        info!(target: "routes", "{} routes found through {}", routes.len(), self.source.describe());

        Ok(routes)
    }

    async fn resolve_source(&self) -> Result<Vec<RoutingModule>, RouteResolutionError> {
        match &self.source {
            RouteSource::Disabled => Ok(Vec::new()),
            RouteSource::Custom(provider) => provider
                .routes()
                .await
                .map_err(RouteResolutionError::Provider),
            RouteSource::StaticParse { root, parser } => {
                let root = root.clone();
                let parser = parser.clone();
                let routes = tokio::task::spawn_blocking(move || parser.parse(&root))
                    .await
                    .map_err(|err| RouteResolutionError::Provider(Box::new(err)))??;

                Ok(dedup_routes(routes))
            }
            RouteSource::Convention { mode, layout, root } => {
                let (mode, layout, root) = (*mode, layout.clone(), root.clone());
                let routes = tokio::task::spawn_blocking(move || {
                    defaults::convention_routes(mode, &layout, &root)
                })
                .await
                .map_err(|err| RouteResolutionError::Provider(Box::new(err)))??;

                Ok(dedup_routes(routes))
            }
        }
    }
}

/// Removes routes sharing the same path and module. The last duplicate's data is kept, at the position of the first one.
pub fn dedup_routes(routes: Vec<RoutingModule>) -> Vec<RoutingModule> {
    let mut positions: FxHashMap<(String, String), usize> = FxHashMap::default();
    let mut deduped: Vec<RoutingModule> = Vec::with_capacity(routes.len());

    for route in routes {
        let key = (route.path.clone(), route.module.clone());
        match positions.get(&key) {
            Some(&index) => {
                debug!(target: "routes", "Duplicate route {} ({}), keeping the last one", route.path, route.module);
                deduped[index] = route;
            }
            None => {
                positions.insert(key, deduped.len());
                deduped.push(route);
            }
        }
    }

    deduped
}
