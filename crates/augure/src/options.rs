use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    plan::Trigger,
    report::{ReportProvider, ga::AnalyticsClient},
    routes::{RouteProvider, parser::RouteParser},
};

/// Normalizes a path reported by analytics before it is matched against the project's routes.
pub type RouteFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Augure options. Should be passed to [`Augure::new()`](crate::Augure::new) or [`foretell()`](crate::foretell).
///
/// Exactly one report source must be set: either `ga` or `report_provider`.
///
/// ## Example
/// ```rust,ignore
/// use augure::{AugureOptions, Mode, RuntimeOptions};
///
/// let options = AugureOptions {
///     ga: Some("123456789".into()),
///     mode: Mode::NextJs,
///     project_root: "./site".into(),
///     runtime: RuntimeOptions {
///         base_path: "/static/".into(),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct AugureOptions {
    /// Google Analytics view ID to fetch the navigation report from.
    pub ga: Option<String>,

    /// Custom source for the navigation report, used instead of Google Analytics.
    pub report_provider: Option<Arc<dyn ReportProvider>>,

    /// Client used to query Google Analytics when `ga` is set. Defaults to [`GoogleAnalyticsClient::from_env()`](crate::report::ga::GoogleAnalyticsClient::from_env).
    pub analytics_client: Option<Arc<dyn AnalyticsClient>>,

    /// How routes are extracted from the project when no `route_provider` is set.
    pub mode: Mode,

    /// Project layout used by the non-[`Mode::Auto`] strategies.
    pub layout: ProjectLayout,

    /// Root of the project routes are extracted from. Relative paths in `layout` are resolved against it.
    pub project_root: PathBuf,

    /// Observation window of the analytics report. Defaults to the last year.
    pub period: Option<Period>,

    pub route_formatter: Option<RouteFormatter>,

    /// Logs the full prefetch plan and makes the injected runtime log its prefetches. Also enabled by `AUGURE_DEBUG=true`.
    pub debug: bool,

    pub route_provider: RouteProviderSetting,

    /// Static route parser used in [`Mode::Auto`]. Defaults to [`FileSystemRouteParser`](crate::routes::parser::FileSystemRouteParser).
    pub route_parser: Option<Arc<dyn RouteParser>>,

    pub runtime: RuntimeOptions,

    /// Upper bound for route resolution and for the report fetch, each. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for AugureOptions {
    fn default() -> Self {
        Self {
            ga: None,
            report_provider: None,
            analytics_client: None,
            mode: Mode::Auto,
            layout: ProjectLayout::default(),
            project_root: ".".into(),
            period: None,
            route_formatter: None,
            debug: false,
            route_provider: RouteProviderSetting::Unset,
            route_parser: None,
            runtime: RuntimeOptions::default(),
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Where the routes of the project come from.
#[derive(Clone, Default)]
pub enum RouteProviderSetting {
    /// Extract routes according to [`AugureOptions::mode`].
    #[default]
    Unset,
    /// Don't extract any route. The report is still fetched and the plan computed, but no route maps to a chunk.
    Disabled,
    /// Use the routes returned by a custom provider, as-is.
    Custom(Arc<dyn RouteProvider>),
}

impl RouteProviderSetting {
    pub fn custom(provider: impl RouteProvider + 'static) -> Self {
        RouteProviderSetting::Custom(Arc::new(provider))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Detect the pages directory of the project and extract routes from its files.
    #[default]
    Auto,
    /// Gatsby conventions: routes are the files in `src/pages`.
    Gatsby,
    /// Next.js conventions: routes are the files in `pages` (or `src/pages`).
    NextJs,
    /// Routes are read from a JSON or YAML manifest, see [`ProjectLayout::manifest`].
    Manifest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectLayout {
    /// Overrides the pages directory of the mode's convention.
    pub pages_dir: Option<PathBuf>,
    /// Route manifest used by [`Mode::Manifest`], a list of [`RoutingModule`](crate::RoutingModule).
    pub manifest: Option<PathBuf>,
}

/// Observation window of a navigation report, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// The `days` days ending today.
    pub fn last_days(days: u64) -> Self {
        let end = Local::now().date_naive();
        let start = end.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);

        Self { start, end }
    }
}

impl Default for Period {
    fn default() -> Self {
        Period::last_days(365)
    }
}

/// Options for the code injected in the build output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Prefix of the URLs chunks are fetched from. Default: `"/"`.
    pub base_path: String,
    pub prefetch_config: PrefetchConfig,
    /// Leave triggering prefetches to a script of the page instead of the injected runtime. Default: `false`.
    ///
    /// The plan is still embedded in the output, under `window.__AUGURE__.routes`.
    pub delegate: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            base_path: "/".to_string(),
            prefetch_config: PrefetchConfig::default(),
            delegate: false,
        }
    }
}

/// Tuning of the prefetch plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrefetchConfig {
    /// Minimum probability for a chunk to be fetched on a 4G connection. Default: `0.15`
    #[serde(rename = "4g")]
    pub four_g: f64,
    /// Default: `0.3`
    #[serde(rename = "3g")]
    pub three_g: f64,
    /// Default: `0.45`
    #[serde(rename = "2g")]
    pub two_g: f64,
    /// Default: `0.6`
    #[serde(rename = "slow-2g")]
    pub slow_two_g: f64,
    /// Maximum number of routes prefetched from a single route. Default: `3`
    pub max_targets: usize,
    /// Transitions less likely than this are never planned. Default: `0.01`
    pub min_probability: f64,
    /// Transitions must weigh more than this to be planned, whatever their probability. Default: `0.001`
    pub min_weight: f64,
    /// Default: [`Trigger::Idle`]
    pub default_trigger: Trigger,
    /// Trigger overrides, by target route.
    pub triggers: BTreeMap<String, Trigger>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            four_g: 0.15,
            three_g: 0.3,
            two_g: 0.45,
            slow_two_g: 0.6,
            max_targets: 3,
            min_probability: 0.01,
            min_weight: 0.001,
            default_trigger: Trigger::Idle,
            triggers: BTreeMap::new(),
        }
    }
}

impl PrefetchConfig {
    /// Minimum probability per effective connection type, as read by the runtime.
    pub(crate) fn connection_thresholds(&self) -> BTreeMap<&'static str, f64> {
        self.thresholds()
            .into_iter()
            .filter(|(name, _)| *name != "min_probability")
            .collect()
    }

    pub(crate) fn thresholds(&self) -> [(&'static str, f64); 5] {
        [
            ("4g", self.four_g),
            ("3g", self.three_g),
            ("2g", self.two_g),
            ("slow-2g", self.slow_two_g),
            ("min_probability", self.min_probability),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_options_from_json() {
        let runtime: RuntimeOptions = serde_json::from_str(
            r#"{"basePath": "/assets/", "prefetchConfig": {"4g": 0.2, "maxTargets": 5, "triggers": {"/blog": "hover"}}}"#,
        )
        .unwrap();

        assert_eq!(runtime.base_path, "/assets/");
        assert!(!runtime.delegate);
        assert_eq!(runtime.prefetch_config.four_g, 0.2);
        assert_eq!(runtime.prefetch_config.three_g, 0.3);
        assert_eq!(runtime.prefetch_config.max_targets, 5);
        assert_eq!(
            runtime.prefetch_config.triggers.get("/blog"),
            Some(&Trigger::Hover)
        );
    }

    #[test]
    fn test_default_period_covers_last_year() {
        let period = Period::default();

        assert_eq!((period.end - period.start).num_days(), 365);
    }

    #[test]
    fn test_mode_names() {
        let mode: Mode = serde_json::from_str("\"next-js\"").unwrap();
        assert_eq!(mode, Mode::NextJs);

        let layout: ProjectLayout = serde_json::from_str(r#"{"pagesDir": "app/pages"}"#).unwrap();
        assert_eq!(layout.pages_dir, Some(PathBuf::from("app/pages")));
        assert_eq!(layout.manifest, None);
    }
}
