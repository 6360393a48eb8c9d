#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Modules the end-user will interact directly or indirectly with
pub mod artifacts;
pub mod errors;
pub mod graph;
pub mod report;
pub mod routes;
pub mod routing;

// Exports for end-users
pub use artifacts::{Artifact, ArtifactSet};
pub use graph::ReportGraph;
pub use options::{
    AugureOptions, Mode, Period, PrefetchConfig, ProjectLayout, RouteFormatter,
    RouteProviderSetting, RuntimeOptions,
};
pub use plan::{PlanEntry, PlannedChunk, PrefetchPlan, Trigger};
pub use plugin::{Augure, EmitOutput};
pub use routing::RoutingModule;

mod apply;
mod config;
mod options;
mod plan;
mod plugin;

// Internal modules
mod logging;

use std::{env, path::Path};

use logging::init_logging;

/// Returns whether debug output was requested through the `AUGURE_DEBUG` environment variable.
///
/// When enabled, the full prefetch plan is logged and the injected runtime logs every prefetch to the browser console.
pub fn is_debug() -> bool {
    env::var("AUGURE_DEBUG").map(|v| v == "true").unwrap_or(false)
}

/// 🔮 Augure entrypoint. Plans prefetches for the build output in `output_dir` and writes the rewritten files back.
///
/// ## Example
/// Should be called once the bundler is done writing its output.
/// ```rs
/// use augure::{foretell, AugureOptions, EmitOutput};
///
/// fn main() -> Result<EmitOutput, Box<dyn std::error::Error>> {
///   foretell(
///     AugureOptions {
///       ga: Some("123456789".into()),
///       ..Default::default()
///     },
///     "dist",
///   )
/// }
/// ```
pub fn foretell(
    options: AugureOptions,
    output_dir: impl AsRef<Path>,
) -> Result<EmitOutput, Box<dyn std::error::Error>> {
    init_logging();

    let output_dir = output_dir.as_ref();
    let augure = Augure::new(options)?;

    let async_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let mut artifacts = ArtifactSet::read_dir(output_dir)?;
    let result = async_runtime.block_on(augure.emit(&mut artifacts));
    // Blocking route parsing or report requests may still be running after a timeout
    async_runtime.shutdown_background();
    let output = result?;

    artifacts.write_dir(output_dir)?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{BoxError, RouteResolutionError},
        routes::parser::RouteParser,
    };
    use serial_test::serial;
    use std::{
        fs,
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };
    use tempfile::tempdir;

    struct StalledParser;

    impl RouteParser for StalledParser {
        fn parse(&self, _root: &Path) -> Result<Vec<RoutingModule>, RouteResolutionError> {
            thread::sleep(Duration::from_secs(4));
            Ok(Vec::new())
        }
    }

    #[test]
    #[serial]
    fn test_is_debug() {
        unsafe { env::remove_var("AUGURE_DEBUG") };
        assert!(!is_debug());

        unsafe { env::set_var("AUGURE_DEBUG", "true") };
        assert!(is_debug());

        unsafe { env::set_var("AUGURE_DEBUG", "1") };
        assert!(!is_debug());

        unsafe { env::remove_var("AUGURE_DEBUG") };
    }

    #[test]
    #[serial]
    fn test_foretell_rewrites_output_dir() {
        let project = tempdir().unwrap();
        fs::create_dir_all(project.path().join("src/pages")).unwrap();
        fs::write(project.path().join("src/pages/index.js"), "").unwrap();
        fs::write(project.path().join("src/pages/blog.js"), "").unwrap();

        let dist = tempdir().unwrap();
        fs::write(dist.path().join("index.5e1f.js"), "render();").unwrap();
        fs::write(dist.path().join("blog.9c0d.js"), "render();").unwrap();
        fs::write(
            dist.path().join("index.html"),
            "<!doctype html><html><head></head><body></body></html>",
        )
        .unwrap();

        let output = foretell(
            AugureOptions {
                project_root: project.path().to_path_buf(),
                report_provider: Some(Arc::new(|| async {
                    ReportGraph::from_json(r#"{"/": {"/blog": 12}}"#)
                })),
                ..Default::default()
            },
            dist.path(),
        )
        .unwrap();

        assert_eq!(output.routes, 2);
        assert_eq!(output.rewritten, vec!["index.5e1f.js", "index.html"]);

        let index = fs::read_to_string(dist.path().join("index.html")).unwrap();
        assert!(index.contains(r#""url":"/blog.9c0d.js""#));
        assert_eq!(
            fs::read_to_string(dist.path().join("blog.9c0d.js")).unwrap(),
            "render();"
        );
    }

    #[test]
    #[serial]
    fn test_foretell_nested_pages() {
        let project = tempdir().unwrap();
        fs::create_dir_all(project.path().join("src/pages/docs")).unwrap();
        fs::write(project.path().join("src/pages/index.js"), "").unwrap();
        fs::write(project.path().join("src/pages/docs/intro.js"), "").unwrap();

        let dist = tempdir().unwrap();
        fs::create_dir_all(dist.path().join("docs")).unwrap();
        fs::write(dist.path().join("index.1.js"), "render();").unwrap();
        fs::write(dist.path().join("docs/intro.2.js"), "render();").unwrap();

        let output = foretell(
            AugureOptions {
                project_root: project.path().to_path_buf(),
                report_provider: Some(Arc::new(|| async {
                    ReportGraph::from_json(r#"{"/": {"/docs/intro": 5}}"#)
                })),
                ..Default::default()
            },
            dist.path(),
        )
        .unwrap();

        assert_eq!(output.rewritten, vec!["index.1.js"]);
        assert!(output.skipped.is_empty());

        let index = fs::read_to_string(dist.path().join("index.1.js")).unwrap();
        assert!(index.contains(r#""url":"/docs/intro.2.js""#));
    }

    #[test]
    fn test_foretell_returns_on_timeout() {
        let project = tempdir().unwrap();
        let dist = tempdir().unwrap();

        let start = Instant::now();
        let result = foretell(
            AugureOptions {
                project_root: project.path().to_path_buf(),
                route_parser: Some(Arc::new(StalledParser)),
                report_provider: Some(Arc::new(|| async {
                    Ok::<_, BoxError>(ReportGraph::new())
                })),
                timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
            dist.path(),
        );

        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_foretell_rejects_invalid_options() {
        let dist = tempdir().unwrap();
        let result = foretell(
            AugureOptions {
                report_provider: Some(Arc::new(|| async {
                    Ok::<_, BoxError>(ReportGraph::new())
                })),
                runtime: RuntimeOptions {
                    prefetch_config: PrefetchConfig {
                        max_targets: 0,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                ..Default::default()
            },
            dist.path(),
        );

        assert!(result.is_err());
    }
}
