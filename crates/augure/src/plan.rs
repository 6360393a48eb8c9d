//! Prefetch planning: which chunks to fetch from each route, and when.
use std::collections::BTreeMap;

use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{graph::ReportGraph, options::RuntimeOptions, routing::RoutingModule};

/// Runtime condition under which a planned chunk is fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Once the browser is idle after navigating to the route.
    #[default]
    Idle,
    /// When the user hovers a link to the target route.
    Hover,
    /// When a link to the target route enters the viewport.
    Visible,
    /// Left to a script of the page, which reads the plan from `window.__AUGURE__`.
    Delegate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChunk {
    pub chunk: String,
    /// Route the chunk belongs to.
    pub route: String,
    pub trigger: Trigger,
    /// Rank of the route among the ones prefetched from the same source, `0` being the most likely.
    pub priority: usize,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub route: String,
    /// Chunk of the route the prefetching logic is injected in.
    pub chunk: String,
    pub prefetch: Vec<PlannedChunk>,
}

/// Chunks to prefetch from each route. Computed for a single build, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PrefetchPlan {
    entries: BTreeMap<String, PlanEntry>,
}

impl PrefetchPlan {
    pub fn get(&self, route: &str) -> Option<&PlanEntry> {
        self.entries.get(route)
    }

    /// Entries, ordered by route.
    pub fn entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Derives the prefetch plan of a build from its navigation report.
///
/// For every known route with outgoing transitions, targets are ranked by weight (ties broken by path) and the `max_targets` most likely
/// ones above `min_probability` and `min_weight` are kept. Targets without a chunk are skipped, and so are targets sharing a chunk with the
/// source route.
/// The output only depends on the inputs, so identical inputs give byte-identical plans.
pub fn plan(report: &ReportGraph, routes: &[RoutingModule], runtime: &RuntimeOptions) -> PrefetchPlan {
    let config = &runtime.prefetch_config;

    let mut chunks_by_route: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for route in routes {
        let chunks = chunks_by_route.entry(route.path.as_str()).or_default();
        let module = route.module.trim();
        if !module.is_empty() && !chunks.contains(&module) {
            chunks.push(module);
        }
    }

    let mut entries = BTreeMap::new();

    for source in report.sources() {
        let source_chunks = match chunks_by_route.get(source) {
            Some(chunks) if !chunks.is_empty() => chunks,
            Some(_) => {
                warn!(target: "plan", "{} has no chunk, it won't prefetch anything", source);
                continue;
            }
            None => {
                debug!(target: "plan", "{} is not a route of the project, skipping it", source);
                continue;
            }
        };

        let mut targets: Vec<(&str, f64)> = report
            .outgoing(source)
            .filter(|(_, weight)| *weight > 0.0)
            .collect();

        // Probabilities are taken over every observed transition, before near-zero edges are dropped
        let total: f64 = targets.iter().map(|(_, weight)| weight).sum();
        if total <= 0.0 {
            continue;
        }

        targets.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut prefetch: Vec<PlannedChunk> = Vec::new();
        let mut selected = 0;

        for (target, weight) in targets {
            if selected == config.max_targets {
                break;
            }

            if weight <= config.min_weight {
                debug!(target: "plan", "{} -> {} weighs {}, below `min_weight`", source, target, weight);
                break;
            }

            let probability = weight / total;
            if probability < config.min_probability {
                break;
            }

            let target_chunks = match chunks_by_route.get(target) {
                Some(chunks) if !chunks.is_empty() => chunks,
                _ => {
                    warn!(target: "plan", "{} -> {} has no chunk mapping, skipping it", source, target);
                    continue;
                }
            };

            if target_chunks.iter().any(|chunk| source_chunks.contains(chunk)) {
                debug!(target: "plan", "{} shares a chunk with {}, skipping it", target, source);
                continue;
            }

            let trigger = if runtime.delegate {
                Trigger::Delegate
            } else {
                config
                    .triggers
                    .get(target)
                    .copied()
                    .unwrap_or(config.default_trigger)
            };

            let mut planned_any = false;
            for chunk in target_chunks {
                if prefetch.iter().any(|planned| planned.chunk == *chunk) {
                    continue;
                }

                prefetch.push(PlannedChunk {
                    chunk: chunk.to_string(),
                    route: target.to_string(),
                    trigger,
                    priority: selected,
                    probability,
                });
                planned_any = true;
            }

            if planned_any {
                selected += 1;
            }
        }

        if prefetch.is_empty() {
            continue;
        }

        entries.insert(
            source.to_string(),
            PlanEntry {
                route: source.to_string(),
                chunk: source_chunks[0].to_string(),
                prefetch,
            },
        );
    }

    PrefetchPlan { entries }
}
