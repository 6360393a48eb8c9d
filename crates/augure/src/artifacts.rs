//! The files emitted by a build, as seen by Augure.
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Script,
    Html,
    Other,
}

impl ArtifactKind {
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default();

        match extension {
            "js" | "mjs" | "cjs" => ArtifactKind::Script,
            "html" | "htm" => ArtifactKind::Html,
            _ => ArtifactKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contents: Vec<u8>,
    /// Chunk this file was emitted for, if it is a chunk.
    pub chunk: Option<String>,
    /// Route this file is the page of, if it is a page.
    pub route: Option<String>,
}

impl Artifact {
    pub fn chunk(chunk: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into(),
            chunk: Some(chunk.into()),
            route: None,
        }
    }

    pub fn page(route: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into(),
            chunk: None,
            route: Some(route.into()),
        }
    }

    pub fn asset(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into(),
            chunk: None,
            route: None,
        }
    }
}

/// Files emitted by a build, keyed by their path relative to the output directory (always using `/`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, artifact: Artifact) {
        self.artifacts.insert(file_name.into(), artifact);
    }

    pub fn get(&self, file_name: &str) -> Option<&Artifact> {
        self.artifacts.get(file_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Artifact)> {
        self.artifacts
            .iter()
            .map(|(file_name, artifact)| (file_name.as_str(), artifact))
    }

    pub(crate) fn par_iter_mut(
        &mut self,
    ) -> impl ParallelIterator<Item = (&String, &mut Artifact)> {
        self.artifacts.par_iter_mut()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Script files emitted for `chunk`, in file order.
    pub fn scripts_for_chunk<'a>(&'a self, chunk: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter().filter_map(move |(file_name, artifact)| {
            (ArtifactKind::from_file_name(file_name) == ArtifactKind::Script
                && artifact.chunk.as_deref() == Some(chunk))
            .then_some(file_name)
        })
    }

    /// HTML pages emitted for `route`, in file order.
    pub fn pages_for_route<'a>(&'a self, route: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter().filter_map(move |(file_name, artifact)| {
            (ArtifactKind::from_file_name(file_name) == ArtifactKind::Html
                && artifact.route.as_deref() == Some(route))
            .then_some(file_name)
        })
    }

    /// Reads every file of an output directory.
    ///
    /// Scripts are attributed to the chunk named by their path, with everything after the first `.` of the file name stripped
    /// (`docs/intro.3fa2c.js` is the `docs/intro` chunk). HTML files are attributed to the route they are served at (`blog/index.html` and
    /// `blog.html` are both `/blog`).
    pub fn read_dir(dir: &Path) -> io::Result<Self> {
        let mut set = ArtifactSet::new();
        read_recursively(dir, dir, &mut set)?;
        Ok(set)
    }

    /// Writes every artifact to `dir`, creating directories as needed.
    pub fn write_dir(&self, dir: &Path) -> io::Result<()> {
        for (file_name, artifact) in &self.artifacts {
            write_artifact(&artifact.contents, &dir.join(file_name))?;
        }

        Ok(())
    }
}

fn read_recursively(root: &Path, dir: &Path, set: &mut ArtifactSet) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_dir() {
            read_recursively(root, &path, set)?;
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let file_name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let contents = fs::read(&path)?;
        let artifact = match ArtifactKind::from_file_name(&file_name) {
            ArtifactKind::Script => Artifact::chunk(chunk_name(relative), contents),
            ArtifactKind::Html => Artifact::page(route_for_html(relative), contents),
            ArtifactKind::Other => Artifact::asset(contents),
        };

        set.insert(file_name, artifact);
    }

    Ok(())
}

fn chunk_name(relative: &Path) -> String {
    let mut segments: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect();

    if let Some(file_name) = segments.last_mut() {
        file_name.truncate(file_name.find('.').unwrap_or(file_name.len()));
    }

    segments.join("/")
}

fn route_for_html(relative: &Path) -> String {
    let without_extension: PathBuf = relative.with_extension("");
    let mut segments: Vec<String> = without_extension
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect();

    if segments.last().is_some_and(|last| last == "index") {
        segments.pop();
    }

    format!("/{}", segments.join("/"))
}

fn write_artifact(content: &[u8], file_path: &Path) -> Result<(), io::Error> {
    // Create the parent directories if it doesn't exist
    if let Some(parent_dir) = file_path.parent() {
        fs::create_dir_all(parent_dir)?
    }

    fs::write(file_path, content)?;

    Ok(())
}
