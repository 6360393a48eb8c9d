use std::time::Instant;

use colored::Colorize;
use log::{error, info};

use crate::{
    apply::apply,
    artifacts::ArtifactSet,
    config,
    errors::{AugureError, ConfigError, PlanApplicationError},
    is_debug,
    logging::{FormatElapsedTimeOptions, format_elapsed_time, print_title},
    options::AugureOptions,
    plan::{PrefetchPlan, plan},
    report::ReportFetcher,
    routes::RouteResolver,
};

/// Result of planning and applying the prefetches of a build.
#[derive(Debug)]
pub struct EmitOutput {
    /// Number of routes the project was found to have.
    pub routes: usize,
    pub plan: PrefetchPlan,
    /// Files that received prefetch data.
    pub rewritten: Vec<String>,
    /// Plan entries that couldn't be applied. These never fail the build.
    pub skipped: Vec<PlanApplicationError>,
}

/// Predictive prefetching for the output of a bundler.
///
/// Options are validated once, on construction. The instance holds no state between builds, use one instance per concurrent build.
pub struct Augure {
    options: AugureOptions,
    routes: RouteResolver,
    reports: ReportFetcher,
}

impl Augure {
    pub fn new(options: AugureOptions) -> Result<Self, ConfigError> {
        let source = config::validate(&options)?;

        Ok(Self {
            routes: RouteResolver::from_options(&options),
            reports: ReportFetcher::new(source, &options),
            options,
        })
    }

    pub fn options(&self) -> &AugureOptions {
        &self.options
    }

    /// Resolves the project's routes, fetches the navigation report, computes the prefetch plan and applies it to `artifacts`.
    ///
    /// If routes or the report can't be obtained, `artifacts` are left untouched and the error is returned.
    pub async fn emit(&self, artifacts: &mut ArtifactSet) -> Result<EmitOutput, AugureError> {
        let emit_start = Instant::now();
        let debug = self.options.debug || is_debug();

        print_title("planning prefetches");

        let routes = self.routes.resolve().await?;
        let report = self.reports.fetch(&routes).await?;

        let plan_start = Instant::now();
        let plan = plan(&report, &routes, &self.options.runtime);
        info!(target: "plan", "{} routes will prefetch chunks, planned in {}", plan.len(), format_elapsed_time(plan_start.elapsed(), &FormatElapsedTimeOptions::default()));

        if debug {
            match plan.to_json() {
                Ok(json) => info!(target: "plan", "{}", json),
                Err(err) => error!(target: "plan", "Failed to serialize the prefetch plan: {}", err),
            }
        }

        let applied = apply(&plan, artifacts, &self.options.runtime, debug);

        info!(target: "augure", "{}", format!("Prefetches planned in {}", format_elapsed_time(emit_start.elapsed(), &FormatElapsedTimeOptions::default())).bold());

        Ok(EmitOutput {
            routes: routes.len(),
            plan,
            rewritten: applied.rewritten,
            skipped: applied.skipped,
        })
    }

    /// Same as [`emit()`](Self::emit), for hosts that wait on a completion callback.
    ///
    /// `done` is called exactly once, whether the emit succeeded or not, before the result is returned.
    pub async fn emit_with_callback<F>(
        &self,
        artifacts: &mut ArtifactSet,
        done: F,
    ) -> Result<EmitOutput, AugureError>
    where
        F: FnOnce(),
    {
        let result = self.emit(artifacts).await;

        if let Err(err) = &result {
            error!(target: "augure", "Prefetching skipped for this build: {}", err);
        }

        done();

        result
    }
}
