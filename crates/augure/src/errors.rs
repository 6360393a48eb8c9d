//! Error types for Augure.
use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error type returned by caller-supplied providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

macro_rules! impl_debug_for_error {
    ($($t:ty),*) => {
        $(
            impl Debug for $t {
                fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                    // Rust's uses the Debug trait to show errors when they're returned from main
                    // But, thiserror uses the Display trait to show errors. This redirects Debug to Display, essentially.
                    write!(f, "{}", self)
                }
            }
        )*
    };
}

/// Invalid configuration, raised once when constructing [`Augure`](crate::Augure).
#[derive(Error)]
pub enum ConfigError {
    #[error(
        "Only a single report provider is allowed. You have specified `ga` (used by the Google Analytics provider) and `report_provider`."
    )]
    AmbiguousReportSource,
    #[error(
        "Report provider not specified. You should specify either `ga` (Google Analytics view ID) or `report_provider`."
    )]
    MissingReportSource,
    #[error("`{name}` must be between 0 and 1, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("`min_weight` must be finite and non-negative, got {0}")]
    InvalidMinWeight(f64),
    #[error("`max_targets` must be at least 1")]
    InvalidMaxTargets,
    #[error("The report period starts on {start}, after its end on {end}")]
    InvalidPeriod { start: String, end: String },
}

#[derive(Error)]
pub enum RouteResolutionError {
    #[error("Failed to read routes from {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid route glob pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("No pages directory could be found in {root}. Set `layout.pages_dir` or use a `route_provider`.")]
    NoLayoutDetected { root: PathBuf },
    #[error("The `manifest` mode requires `layout.manifest` to point to a route manifest")]
    MissingManifest,
    #[error("Failed to parse route manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },
    #[error("Route provider failed: {0}")]
    Provider(#[source] BoxError),
    #[error("Route resolution timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error)]
pub enum ReportProviderError {
    #[error("Google Analytics credentials not found. Set the `{env}` environment variable to an OAuth access token.")]
    MissingCredentials { env: &'static str },
    #[error("Google Analytics request failed: {0}")]
    Request(String),
    #[error("Malformed Google Analytics response: {0}")]
    MalformedResponse(String),
    #[error("Report provider failed: {0}")]
    Provider(#[source] BoxError),
    #[error("Report graph is invalid: {0}")]
    InvalidGraph(#[from] GraphError),
    #[error("Report fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure to apply the plan of a single route. These are logged and reported, never fatal.
#[derive(Error)]
pub enum PlanApplicationError {
    #[error("`{route}` prefetches chunk `{chunk}`, but no script artifact was emitted for it")]
    MissingChunk { route: String, chunk: String },
    #[error("No artifact was emitted for `{route}` (entry chunk `{chunk}`)")]
    MissingEntry { route: String, chunk: String },
    #[error("Failed to rewrite `{file}`: {message}")]
    Rewrite { file: String, message: String },
}

#[derive(Error)]
pub enum GraphError {
    #[error("Transition {from} -> {to} has an invalid weight ({weight}), weights must be finite and non-negative")]
    InvalidWeight { from: String, to: String, weight: f64 },
    #[error("Failed to parse report graph")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AugureError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Routes(#[from] RouteResolutionError),

    #[error(transparent)]
    Report(#[from] ReportProviderError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl_debug_for_error!(
    ConfigError,
    RouteResolutionError,
    ReportProviderError,
    PlanApplicationError,
    GraphError
);
