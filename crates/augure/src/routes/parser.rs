//! Static route extraction from a project's source tree.
use std::path::{Component, Path, PathBuf};

use log::{debug, trace};

use crate::{errors::RouteResolutionError, options::ProjectLayout, routing::RoutingModule};

pub const DEFAULT_PAGE_EXTENSIONS: [&str; 7] = ["js", "jsx", "ts", "tsx", "mjs", "vue", "svelte"];

/// Extracts the routes of a project from its source.
pub trait RouteParser: Send + Sync {
    fn parse(&self, root: &Path) -> Result<Vec<RoutingModule>, RouteResolutionError>;
}

/// Extracts routes from a file-based router: every page file is a route, and its own chunk.
///
/// The pages directory is the first of `candidates` that exists under the project root.
#[derive(Debug, Clone)]
pub struct FileSystemRouteParser {
    pub candidates: Vec<PathBuf>,
    pub extensions: Vec<String>,
}

impl Default for FileSystemRouteParser {
    fn default() -> Self {
        Self {
            candidates: ["src/pages", "pages", "src/routes", "routes"]
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            extensions: DEFAULT_PAGE_EXTENSIONS
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl FileSystemRouteParser {
    /// A parser looking only at `layout.pages_dir` when it is set, and at the default candidates otherwise.
    pub fn for_layout(layout: &ProjectLayout) -> Self {
        match &layout.pages_dir {
            Some(pages_dir) => Self {
                candidates: vec![pages_dir.clone()],
                ..Default::default()
            },
            None => Self::default(),
        }
    }

    pub fn detect_pages_dir(&self, root: &Path) -> Option<PathBuf> {
        self.candidates
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|dir| dir.is_dir())
    }
}

impl RouteParser for FileSystemRouteParser {
    fn parse(&self, root: &Path) -> Result<Vec<RoutingModule>, RouteResolutionError> {
        let pages_dir =
            self.detect_pages_dir(root)
                .ok_or_else(|| RouteResolutionError::NoLayoutDetected {
                    root: root.to_path_buf(),
                })?;

        debug!(target: "routes", "Using pages directory {}", pages_dir.display());

        let extensions: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        routes_from_pages_dir(&pages_dir, &extensions)
    }
}

/// Maps every page file under `pages_dir` to a route.
///
/// `blog/[slug].tsx` becomes the route `/blog/[slug]` owned by the module `blog/[slug]`, and `index` files map to their directory.
/// Files and directories starting with `_` (layouts, documents, ...) and files with a secondary extension (`page.test.tsx`) are skipped.
pub fn routes_from_pages_dir(
    pages_dir: &Path,
    extensions: &[&str],
) -> Result<Vec<RoutingModule>, RouteResolutionError> {
    if !pages_dir.is_dir() {
        return Err(RouteResolutionError::NoLayoutDetected {
            root: pages_dir.to_path_buf(),
        });
    }

    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&pages_dir.to_string_lossy())
    );
    let entries = glob::glob(&pattern).map_err(|source| RouteResolutionError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut routes = Vec::new();
    for entry in entries {
        let file = entry.map_err(|err| RouteResolutionError::Io {
            path: err.path().to_path_buf(),
            source: err.into(),
        })?;

        if !file.is_file() {
            continue;
        }

        let Ok(relative) = file.strip_prefix(pages_dir) else {
            continue;
        };

        match route_for_page(relative, extensions) {
            Some(route) => routes.push(route),
            None => trace!(target: "routes", "Skipping {}", relative.display()),
        }
    }

    routes.sort_by(|a, b| a.module.cmp(&b.module));

    Ok(routes)
}

fn route_for_page(relative: &Path, extensions: &[&str]) -> Option<RoutingModule> {
    let extension = relative.extension()?.to_str()?;
    if !extensions.contains(&extension) {
        return None;
    }

    let stem = relative.file_stem()?.to_str()?;
    if stem.contains('.') {
        return None;
    }

    let mut segments = Vec::new();
    for component in relative.parent()?.components() {
        let Component::Normal(name) = component else {
            return None;
        };
        segments.push(name.to_str()?);
    }
    segments.push(stem);

    if segments.iter().any(|segment| segment.starts_with('_')) {
        return None;
    }

    let module = segments.join("/");
    if stem == "index" {
        segments.pop();
    }

    Some(RoutingModule::new(format!("/{}", segments.join("/")), module).lazy())
}
