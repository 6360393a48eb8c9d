//! Embeds a prefetch plan, and the runtime executing it, into the artifacts of a build.
use std::{cell::Cell, collections::BTreeMap};

use log::{debug, info, warn};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    artifacts::{Artifact, ArtifactKind, ArtifactSet},
    errors::PlanApplicationError,
    options::RuntimeOptions,
    plan::{PlanEntry, PrefetchPlan, Trigger},
};

const DATA_TEMPLATE: &str = include_str!("../js/data.js");
const RUNTIME_CODE: &str = include_str!("../js/runtime.js");

#[derive(Debug, Default)]
pub struct ApplyOutput {
    /// Files that received prefetch data, in file order.
    pub rewritten: Vec<String>,
    pub skipped: Vec<PlanApplicationError>,
}

/// A planned chunk as the runtime sees it.
#[derive(Debug, Clone, Serialize)]
struct RuntimePrefetch<'a> {
    chunk: &'a str,
    route: &'a str,
    url: String,
    trigger: Trigger,
    priority: usize,
    probability: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeConfig<'a> {
    base_path: &'a str,
    thresholds: BTreeMap<&'static str, f64>,
    debug: bool,
}

type RoutePayloads<'a> = BTreeMap<&'a str, Vec<RuntimePrefetch<'a>>>;

pub fn apply(
    plan: &PrefetchPlan,
    artifacts: &mut ArtifactSet,
    runtime: &RuntimeOptions,
    debug: bool,
) -> ApplyOutput {
    let mut output = ApplyOutput::default();

    // File name -> routes whose data it carries
    let mut payloads: BTreeMap<String, RoutePayloads> = BTreeMap::new();

    for entry in plan.entries() {
        match resolve_entry(entry, artifacts, &runtime.base_path) {
            Ok((files, prefetches)) => {
                for file in files {
                    payloads
                        .entry(file)
                        .or_default()
                        .insert(entry.route.as_str(), prefetches.clone());
                }
            }
            Err(err) => {
                warn!(target: "apply", "{}, skipping", err);
                output.skipped.push(err);
            }
        }
    }

    if payloads.is_empty() {
        return output;
    }

    let config = RuntimeConfig {
        base_path: &runtime.base_path,
        thresholds: runtime.prefetch_config.connection_thresholds(),
        debug,
    };
    let config_json = escape_script(&to_json(&config));

    let results: Vec<(String, Result<(), PlanApplicationError>)> = artifacts
        .par_iter_mut()
        .filter_map(|(file, artifact)| payloads.get(file).map(|routes| (file, artifact, routes)))
        .map(|(file, artifact, routes)| {
            let snippet = snippet(routes, &config_json, runtime.delegate);
            (file.clone(), inject(file, artifact, &snippet))
        })
        .collect();

    for (file, result) in results {
        match result {
            Ok(()) => {
                debug!(target: "apply", "Injected prefetch data into {}", file);
                output.rewritten.push(file);
            }
            Err(err) => {
                warn!(target: "apply", "{}, leaving it untouched", err);
                output.skipped.push(err);
            }
        }
    }

    output.rewritten.sort();

    info!(target: "apply", "Prefetch data injected into {} files", output.rewritten.len());

    output
}

fn resolve_entry<'a>(
    entry: &'a PlanEntry,
    artifacts: &ArtifactSet,
    base_path: &str,
) -> Result<(Vec<String>, Vec<RuntimePrefetch<'a>>), PlanApplicationError> {
    let prefetches = entry
        .prefetch
        .iter()
        .map(|planned| {
            let file = artifacts.scripts_for_chunk(&planned.chunk).next().ok_or_else(|| {
                PlanApplicationError::MissingChunk {
                    route: entry.route.clone(),
                    chunk: planned.chunk.clone(),
                }
            })?;

            Ok(RuntimePrefetch {
                chunk: &planned.chunk,
                route: &planned.route,
                url: chunk_url(base_path, file),
                trigger: planned.trigger,
                priority: planned.priority,
                probability: planned.probability,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let files: Vec<String> = artifacts
        .scripts_for_chunk(&entry.chunk)
        .chain(artifacts.pages_for_route(&entry.route))
        .map(str::to_string)
        .collect();

    if files.is_empty() {
        return Err(PlanApplicationError::MissingEntry {
            route: entry.route.clone(),
            chunk: entry.chunk.clone(),
        });
    }

    Ok((files, prefetches))
}

fn chunk_url(base_path: &str, file: &str) -> String {
    format!(
        "{}/{}",
        base_path.trim_end_matches('/'),
        file.trim_start_matches('/')
    )
}

fn snippet(routes: &RoutePayloads, config_json: &str, delegate: bool) -> String {
    let routes_json = escape_script(&to_json(routes));
    let mut snippet = DATA_TEMPLATE
        .replace("__AUGURE_ROUTES__", &routes_json)
        .replace("__AUGURE_CONFIG__", config_json);

    if !delegate {
        snippet.push_str(RUNTIME_CODE);
    }

    snippet
}

fn inject(file: &str, artifact: &mut Artifact, snippet: &str) -> Result<(), PlanApplicationError> {
    let rewrite_error = |message: String| PlanApplicationError::Rewrite {
        file: file.to_string(),
        message,
    };

    match ArtifactKind::from_file_name(file) {
        ArtifactKind::Script => {
            if !artifact.contents.ends_with(b"\n") && !artifact.contents.is_empty() {
                artifact.contents.push(b'\n');
            }
            artifact.contents.extend_from_slice(snippet.as_bytes());
            Ok(())
        }
        ArtifactKind::Html => {
            let html = std::str::from_utf8(&artifact.contents)
                .map_err(|_| rewrite_error("page is not valid UTF-8".into()))?;

            let script = format!("<script>{}</script>", snippet);
            let head_found = Cell::new(false);

            let element_content_handlers = vec![element!("head", |el| {
                if !head_found.get() {
                    head_found.set(true);
                    el.append(&script, lol_html::html_content::ContentType::Html);
                }
                Ok(())
            })];

            let output = rewrite_str(
                html,
                RewriteStrSettings {
                    element_content_handlers,
                    ..RewriteStrSettings::new()
                },
            )
            .map_err(|err| rewrite_error(err.to_string()))?;

            if !head_found.get() {
                return Err(rewrite_error("page has no <head> element".into()));
            }

            artifact.contents = output.into_bytes();
            Ok(())
        }
        ArtifactKind::Other => Err(rewrite_error("unsupported artifact type".into())),
    }
}

fn to_json(value: &impl Serialize) -> String {
    // Maps with string keys, strings and finite numbers always serialize
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Keeps JSON from closing the surrounding `<script>` element.
fn escape_script(json: &str) -> String {
    json.replace("</", "<\\/").replace("<!--", "<\\!--")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::ReportGraph, plan::plan, routing::RoutingModule};

    fn sample_plan(runtime: &RuntimeOptions) -> PrefetchPlan {
        let mut report = ReportGraph::new();
        report.add_transition("/", "/blog", 8.0).unwrap();
        report.add_transition("/", "/about", 2.0).unwrap();

        let routes = vec![
            RoutingModule::new("/", "main"),
            RoutingModule::new("/blog", "blog").lazy(),
            RoutingModule::new("/about", "about").lazy(),
        ];

        plan(&report, &routes, runtime)
    }

    fn sample_artifacts() -> ArtifactSet {
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("main.11aa.js", Artifact::chunk("main", "console.log('main');"));
        artifacts.insert("blog.22bb.js", Artifact::chunk("blog", "console.log('blog');"));
        artifacts.insert("about.33cc.js", Artifact::chunk("about", "console.log('about');"));
        artifacts.insert(
            "index.html",
            Artifact::page("/", "<html><head><title>Home</title></head><body></body></html>"),
        );
        artifacts.insert("style.css", Artifact::asset("body {}"));
        artifacts
    }

    fn contents(artifacts: &ArtifactSet, file: &str) -> String {
        String::from_utf8(artifacts.get(file).unwrap().contents.clone()).unwrap()
    }

    #[test]
    fn test_injects_data_and_runtime() {
        let runtime = RuntimeOptions::default();
        let plan = sample_plan(&runtime);
        let mut artifacts = sample_artifacts();

        let output = apply(&plan, &mut artifacts, &runtime, false);

        assert_eq!(output.rewritten, vec!["index.html", "main.11aa.js"]);
        assert!(output.skipped.is_empty());

        let main = contents(&artifacts, "main.11aa.js");
        assert!(main.starts_with("console.log('main');\n"));
        assert!(main.contains(r#""url":"/blog.22bb.js""#));
        assert!(main.contains(r#""url":"/about.33cc.js""#));
        assert!(main.contains(r#""trigger":"idle""#));
        assert_eq!(main.matches("augure.started = true").count(), 1);

        let page = contents(&artifacts, "index.html");
        assert!(page.contains("<title>Home</title><script>"));
        assert!(page.ends_with("</script></head><body></body></html>"));

        assert_eq!(contents(&artifacts, "blog.22bb.js"), "console.log('blog');");
        assert_eq!(contents(&artifacts, "style.css"), "body {}");
    }

    #[test]
    fn test_base_path() {
        let runtime = RuntimeOptions {
            base_path: "https://cdn.example.com/static/".into(),
            ..Default::default()
        };
        let plan = sample_plan(&runtime);
        let mut artifacts = sample_artifacts();

        apply(&plan, &mut artifacts, &runtime, false);

        assert!(contents(&artifacts, "main.11aa.js")
            .contains(r#""url":"https://cdn.example.com/static/blog.22bb.js""#));
        assert_eq!(chunk_url("", "blog.js"), "/blog.js");
        assert_eq!(chunk_url("/assets", "chunks/blog.js"), "/assets/chunks/blog.js");
    }

    #[test]
    fn test_delegate_mode_embeds_data_only() {
        let runtime = RuntimeOptions {
            delegate: true,
            ..Default::default()
        };
        let plan = sample_plan(&runtime);
        let mut artifacts = sample_artifacts();

        apply(&plan, &mut artifacts, &runtime, false);

        let main = contents(&artifacts, "main.11aa.js");
        assert!(main.contains("__AUGURE__"));
        assert!(main.contains(r#""trigger":"delegate""#));
        assert!(!main.contains("augure.started = true"));
    }

    #[test]
    fn test_missing_chunk_skips_entry() {
        let runtime = RuntimeOptions::default();
        let plan = sample_plan(&runtime);
        let mut artifacts = sample_artifacts();
        artifacts.insert("about.33cc.js", Artifact::asset("renamed"));

        let output = apply(&plan, &mut artifacts, &runtime, false);

        assert!(output.rewritten.is_empty());
        assert!(matches!(
            output.skipped.as_slice(),
            [PlanApplicationError::MissingChunk { route, chunk }] if route == "/" && chunk == "about"
        ));
        assert_eq!(contents(&artifacts, "main.11aa.js"), "console.log('main');");
    }

    #[test]
    fn test_missing_entry_skips_entry() {
        let runtime = RuntimeOptions::default();
        let plan = sample_plan(&runtime);
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("blog.22bb.js", Artifact::chunk("blog", ""));
        artifacts.insert("about.33cc.js", Artifact::chunk("about", ""));

        let output = apply(&plan, &mut artifacts, &runtime, false);

        assert!(output.rewritten.is_empty());
        assert!(matches!(
            output.skipped.as_slice(),
            [PlanApplicationError::MissingEntry { route, .. }] if route == "/"
        ));
    }

    #[test]
    fn test_page_without_head_is_left_untouched() {
        let runtime = RuntimeOptions::default();
        let plan = sample_plan(&runtime);
        let mut artifacts = sample_artifacts();
        artifacts.insert("index.html", Artifact::page("/", "<p>no head here</p>"));

        let output = apply(&plan, &mut artifacts, &runtime, false);

        assert_eq!(output.rewritten, vec!["main.11aa.js"]);
        assert!(matches!(
            output.skipped.as_slice(),
            [PlanApplicationError::Rewrite { file, .. }] if file == "index.html"
        ));
        assert_eq!(contents(&artifacts, "index.html"), "<p>no head here</p>");
    }

    #[test]
    fn test_shared_chunk_receives_runtime_once() {
        let mut report = ReportGraph::new();
        report.add_transition("/", "/blog", 1.0).unwrap();
        report.add_transition("/about", "/blog", 1.0).unwrap();

        let routes = vec![
            RoutingModule::new("/", "main"),
            RoutingModule::new("/about", "main"),
            RoutingModule::new("/blog", "blog").lazy(),
        ];
        let runtime = RuntimeOptions::default();
        let plan = plan(&report, &routes, &runtime);

        let mut artifacts = ArtifactSet::new();
        artifacts.insert("main.js", Artifact::chunk("main", ""));
        artifacts.insert("blog.js", Artifact::chunk("blog", ""));

        let output = apply(&plan, &mut artifacts, &runtime, true);

        assert_eq!(output.rewritten, vec!["main.js"]);
        let main = contents(&artifacts, "main.js");
        assert!(main.contains(r#""/about":["#));
        assert!(main.contains(r#""/":["#));
        assert!(main.contains(r#""debug":true"#));
        assert_eq!(main.matches("augure.started = true").count(), 1);
    }

    #[test]
    fn test_escape_script() {
        assert_eq!(
            escape_script(r#"{"/a":"</script><!--"}"#),
            r#"{"/a":"<\/script><\!--"}"#
        );
    }

    #[test]
    fn test_empty_plan_changes_nothing() {
        let mut artifacts = sample_artifacts();
        let before = artifacts.clone();

        let output = apply(
            &PrefetchPlan::default(),
            &mut artifacts,
            &RuntimeOptions::default(),
            false,
        );

        assert!(output.rewritten.is_empty());
        assert_eq!(artifacts, before);
    }
}
