//! Weighted navigation graph between routes.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::GraphError;

/// Observed transitions between routes over a report period.
///
/// Serialized as a nested map, e.g. `{"/": {"/blog": 42, "/about": 3}}`: the outer key is the route the user came from, the inner key the route
/// they navigated to, and the value how often (or how likely) it happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportGraph {
    edges: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ReportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a graph from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let graph: ReportGraph = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Record a transition, adding `weight` to any weight already observed between the two routes.
    ///
    /// Self-loops carry no information for prefetching and are ignored.
    pub fn add_transition(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        weight: f64,
    ) -> Result<(), GraphError> {
        let from = from.into();
        let to = to.into();

        if !weight.is_finite() || weight < 0.0 {
            return Err(GraphError::InvalidWeight { from, to, weight });
        }

        if from == to {
            return Ok(());
        }

        *self.edges.entry(from).or_default().entry(to).or_insert(0.0) += weight;

        Ok(())
    }

    /// Weight of the edge `from -> to`, `0.0` if it was never observed.
    pub fn weight(&self, from: &str, to: &str) -> f64 {
        self.edges
            .get(from)
            .and_then(|targets| targets.get(to))
            .copied()
            .unwrap_or(0.0)
    }

    /// Outgoing edges of `from`, excluding self-loops, in target order.
    pub fn outgoing<'a>(&'a self, from: &'a str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.edges
            .get(from)
            .into_iter()
            .flat_map(|targets| targets.iter())
            .filter(move |(to, _)| to.as_str() != from)
            .map(|(to, weight)| (to.as_str(), *weight))
    }

    /// Routes that have at least one recorded outgoing edge.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn edge_count(&self) -> usize {
        self.edges
            .iter()
            .map(|(from, targets)| targets.keys().filter(|to| *to != from).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }

    /// Checks that every weight is finite and non-negative.
    ///
    /// Graphs built through [`ReportGraph::add_transition`] are always valid, but graphs coming from deserialization or custom providers may not be.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (from, targets) in &self.edges {
            for (to, weight) in targets {
                if !weight.is_finite() || *weight < 0.0 {
                    return Err(GraphError::InvalidWeight {
                        from: from.clone(),
                        to: to.clone(),
                        weight: *weight,
                    });
                }
            }
        }

        Ok(())
    }
}
