//! Route extraction following the conventions of known project layouts.
use std::{fs, path::Path};

use crate::{
    errors::RouteResolutionError,
    options::{Mode, ProjectLayout},
    routes::parser::{
        DEFAULT_PAGE_EXTENSIONS, FileSystemRouteParser, RouteParser, routes_from_pages_dir,
    },
    routing::RoutingModule,
};

pub fn convention_routes(
    mode: Mode,
    layout: &ProjectLayout,
    root: &Path,
) -> Result<Vec<RoutingModule>, RouteResolutionError> {
    let pages_override = layout.pages_dir.as_ref().map(|dir| root.join(dir));

    match mode {
        Mode::Auto => FileSystemRouteParser::for_layout(layout).parse(root),
        Mode::Gatsby => {
            let pages_dir = pages_override.unwrap_or_else(|| root.join("src/pages"));
            routes_from_pages_dir(&pages_dir, &DEFAULT_PAGE_EXTENSIONS)
        }
        Mode::NextJs => {
            let pages_dir = match pages_override {
                Some(pages_dir) => pages_dir,
                None => FileSystemRouteParser {
                    candidates: vec!["pages".into(), "src/pages".into()],
                    ..Default::default()
                }
                .detect_pages_dir(root)
                .ok_or_else(|| RouteResolutionError::NoLayoutDetected {
                    root: root.to_path_buf(),
                })?,
            };
            routes_from_pages_dir(&pages_dir, &DEFAULT_PAGE_EXTENSIONS)
        }
        Mode::Manifest => {
            let manifest = layout
                .manifest
                .as_ref()
                .ok_or(RouteResolutionError::MissingManifest)?;
            read_manifest(&root.join(manifest))
        }
    }
}

/// Reads a list of routes from a JSON file, or a YAML one if its extension is `.yaml` or `.yml`.
pub fn read_manifest(path: &Path) -> Result<Vec<RoutingModule>, RouteResolutionError> {
    let content = fs::read_to_string(path).map_err(|source| RouteResolutionError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| matches!(extension, "yaml" | "yml"));

    let parsed: Result<Vec<RoutingModule>, String> = if is_yaml {
        serde_yaml::from_str(&content).map_err(|err| err.to_string())
    } else {
        serde_json::from_str(&content).map_err(|err| err.to_string())
    };

    parsed.map_err(|message| RouteResolutionError::Manifest {
        path: path.to_path_buf(),
        message,
    })
}
