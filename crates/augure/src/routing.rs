//! Routes, and matching concrete URLs back to the route patterns they belong to.
use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

/// A route bound to the build chunk that owns it.
///
/// `module` is the chunk identifier emitted by the build for this route, which is what ends up being prefetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingModule {
    pub path: String,
    pub module: String,
    #[serde(default)]
    pub parent_module: Option<String>,
    #[serde(default)]
    pub lazy: bool,
}

impl RoutingModule {
    pub fn new(path: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            module: module.into(),
            parent_module: None,
            lazy: false,
        }
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_parent(mut self, parent_module: impl Into<String>) -> Self {
        self.parent_module = Some(parent_module.into());
        self
    }
}

#[derive(Debug, PartialEq)]
pub struct ParameterDef {
    pub(crate) key: String,
    pub(crate) index: usize,
    pub(crate) length: usize,
}

pub fn extract_params_from_raw_route(raw_route: &str) -> Vec<ParameterDef> {
    let mut params = Vec::new();
    let mut start = 0;

    while let Some(bracket_pos) = raw_route[start..].find('[') {
        let abs_pos = start + bracket_pos;

        // Check if escaped by counting preceding backslashes
        let backslash_count = raw_route[..abs_pos]
            .chars()
            .rev()
            .take_while(|&c| c == '\\')
            .count();

        if backslash_count % 2 == 1 {
            start = abs_pos + 1;
            continue;
        }

        if let Some(end_bracket) = raw_route[abs_pos + 1..].find(']') {
            let end_pos = abs_pos + 1 + end_bracket;
            let key = raw_route[abs_pos + 1..end_pos].to_string();

            params.push(ParameterDef {
                key,
                index: abs_pos,
                length: end_pos - abs_pos + 1,
            });

            start = end_pos + 1;
        } else {
            break;
        }
    }

    params
}

/// Strips the query string and fragment of a path, and normalizes its slashes.
///
/// `"blog/post/?page=2#top"` becomes `"/blog/post"`, an empty path becomes `"/"`.
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_matches('/');

    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Static(String),
    Param,
    CatchAll,
}

#[derive(Debug)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Self {
        let segments = normalize_path(raw)
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(parse_segment)
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_dynamic(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| !matches!(segment, Segment::Static(_)))
    }

    pub fn matches(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        let parts: Vec<&str> = normalized
            .split('/')
            .filter(|part| !part.is_empty())
            .collect();

        match_segments(&self.segments, &parts)
    }

    fn specificity(&self) -> (usize, Reverse<usize>) {
        let static_count = self
            .segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Static(_)))
            .count();
        let catch_all_count = self
            .segments
            .iter()
            .filter(|segment| **segment == Segment::CatchAll)
            .count();

        (static_count, Reverse(catch_all_count))
    }
}

fn parse_segment(segment: &str) -> Segment {
    if segment == "*" {
        return Segment::CatchAll;
    }

    if segment.starts_with(':') {
        return Segment::Param;
    }

    let params = extract_params_from_raw_route(segment);
    if let [param] = params.as_slice()
        && param.index == 0
        && param.length == segment.len()
    {
        return if param.key.starts_with("...") {
            Segment::CatchAll
        } else {
            Segment::Param
        };
    }

    Segment::Static(segment.replace("\\[", "[").replace("\\]", "]"))
}

/// Whether `segments` match all of `parts`.
///
/// Computed from the last segment backwards, `matched[j]` telling whether the segments seen so far match `parts[j..]`. Catch-alls
/// consume one part or more, so runs of them stay linear in the number of parts.
fn match_segments(segments: &[Segment], parts: &[&str]) -> bool {
    let mut matched = vec![false; parts.len() + 1];
    matched[parts.len()] = true;

    for segment in segments.iter().rev() {
        let mut next = vec![false; parts.len() + 1];

        match segment {
            Segment::CatchAll => {
                // Whether any `matched[k]` with k > j holds
                let mut any_after = false;
                for j in (0..parts.len()).rev() {
                    any_after |= matched[j + 1];
                    next[j] = any_after;
                }
            }
            Segment::Param => {
                for j in 0..parts.len() {
                    next[j] = matched[j + 1];
                }
            }
            Segment::Static(expected) => {
                for (j, part) in parts.iter().enumerate() {
                    next[j] = *part == expected.as_str() && matched[j + 1];
                }
            }
        }

        matched = next;
    }

    matched[0]
}

/// Maps concrete paths, as reported by analytics, to the route pattern they were served by.
///
/// When several patterns match, the one with the most static segments wins, then the one with the fewest catch-alls, then the lexically smallest.
#[derive(Debug)]
pub struct RouteMatcher {
    patterns: Vec<RoutePattern>,
}

impl RouteMatcher {
    pub fn new<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut patterns: Vec<RoutePattern> = paths.into_iter().map(RoutePattern::parse).collect();

        patterns.sort_by(|a, b| {
            b.specificity()
                .cmp(&a.specificity())
                .then_with(|| a.raw.cmp(&b.raw))
        });
        patterns.dedup_by(|a, b| a.raw == b.raw);

        Self { patterns }
    }

    pub fn find(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(path))
            .map(RoutePattern::raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_params() {
        let input = "/articles/[article]";
        let expected = vec![ParameterDef {
            key: "article".to_string(),
            index: 10,
            length: 9,
        }];

        assert_eq!(extract_params_from_raw_route(input), expected);
    }

    #[test]
    fn test_extract_params_multiple() {
        let input = "/articles/[article]/[id]";
        let expected = vec![
            ParameterDef {
                key: "article".to_string(),
                index: 10,
                length: 9,
            },
            ParameterDef {
                key: "id".to_string(),
                index: 20,
                length: 4,
            },
        ];

        assert_eq!(extract_params_from_raw_route(input), expected);
    }

    #[test]
    fn test_extract_params_escaped_brackets_with_params() {
        let input = "/articles/\\[article\\]/[id]";
        let expected = vec![ParameterDef {
            key: "id".to_string(),
            index: 22,
            length: 4,
        }];

        assert_eq!(extract_params_from_raw_route(input), expected);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/blog/"), "/blog");
        assert_eq!(normalize_path("blog/post?page=2#top"), "/blog/post");
        assert_eq!(normalize_path("/?utm_source=mail"), "/");
    }

    #[test]
    fn test_pattern_static() {
        let pattern = RoutePattern::parse("/about");

        assert!(!pattern.is_dynamic());
        assert!(pattern.matches("/about"));
        assert!(pattern.matches("/about/?ref=nav"));
        assert!(!pattern.matches("/about/team"));
    }

    #[test]
    fn test_pattern_params() {
        let bracket = RoutePattern::parse("/articles/[article]");
        let colon = RoutePattern::parse("/articles/:article");

        for pattern in [bracket, colon] {
            assert!(pattern.is_dynamic());
            assert!(pattern.matches("/articles/hello-world"));
            assert!(!pattern.matches("/articles"));
            assert!(!pattern.matches("/articles/a/b"));
        }
    }

    #[test]
    fn test_pattern_catch_all() {
        let pattern = RoutePattern::parse("/docs/[...slug]");

        assert!(pattern.matches("/docs/intro"));
        assert!(pattern.matches("/docs/guide/install"));
        assert!(!pattern.matches("/docs"));
    }

    #[test]
    fn test_pattern_several_catch_alls() {
        let pattern = RoutePattern::parse("/[...a]/x/[...b]/y/[...c]/z/[...d]");

        assert!(pattern.matches("/1/x/2/3/y/4/z/5"));
        assert!(!pattern.matches("/1/x/y/4/z/5"));

        // Every split of this path has to be ruled out
        let long_path = format!("/{}", vec!["x"; 60].join("/"));
        let start = std::time::Instant::now();
        assert!(!pattern.matches(&long_path));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));

        let matching = format!("{}/y/q/z/end", long_path);
        assert!(pattern.matches(&matching));
    }

    #[test]
    fn test_pattern_escaped_brackets_are_static() {
        let pattern = RoutePattern::parse("/articles/\\[article\\]");

        assert!(!pattern.is_dynamic());
        assert!(pattern.matches("/articles/[article]"));
        assert!(!pattern.matches("/articles/hello"));
    }

    #[test]
    fn test_matcher_prefers_specific_routes() {
        let matcher = RouteMatcher::new(["/blog/[...rest]", "/blog/[slug]", "/blog/new", "/"]);

        assert_eq!(matcher.find("/blog/new"), Some("/blog/new"));
        assert_eq!(matcher.find("/blog/hello"), Some("/blog/[slug]"));
        assert_eq!(matcher.find("/blog/2024/hello"), Some("/blog/[...rest]"));
        assert_eq!(matcher.find("/"), Some("/"));
        assert_eq!(matcher.find("/contact"), None);
    }
}
