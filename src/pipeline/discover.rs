//! Artifact discovery: find the page files that belong to one document.
//!
//! The renderer writes one file per page named
//! `{identifier}{separator}{page}.{ext}`. Discovery lists a directory, keeps
//! the files whose names match the identifier (or its alias), extracts the
//! page number and returns them in document order.
//!
//! A file whose page segment does not parse is kept with
//! [`UNPARSED_PAGE`] so it sorts last; it is logged, never dropped.
//!
//! Page numbers are unique in the result. When one page exists in two forms
//! (`doc-page-1.png` next to `doc-page-1.txt`, as left by running both the
//! renderer and the text extractor into one directory) the image wins and
//! the other file is skipped with a warning.

use crate::config::NamingConvention;
use crate::error::PipelineError;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Page number assigned to artifacts whose page segment does not parse.
pub const UNPARSED_PAGE: u32 = u32::MAX;

/// Output key of an unparsed artifact with an empty page segment.
pub const EMPTY_LABEL_KEY: &str = "unnumbered";

/// What a page artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Rendered page image (png / jpg).
    Image,
    /// Raw text extracted from the PDF.
    Text,
}

impl ArtifactKind {
    /// Kind implied by a (lowercase) extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "txt" | "text" | "md" => ArtifactKind::Text,
            _ => ArtifactKind::Image,
        }
    }
}

/// One page's rendered form on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtifact {
    pub path: PathBuf,
    /// 1-based page number, or [`UNPARSED_PAGE`].
    pub page: u32,
    /// The page segment exactly as it appeared in the file name.
    pub label: String,
    pub kind: ArtifactKind,
}

impl PageArtifact {
    pub fn is_unparsed(&self) -> bool {
        self.page == UNPARSED_PAGE
    }

    /// Key used in output file names: the page number, or the raw label for
    /// unparsed artifacts so two of them never share an output path.
    pub fn output_key(&self) -> String {
        if self.is_unparsed() {
            if self.label.is_empty() {
                EMPTY_LABEL_KEY.to_string()
            } else {
                self.label.clone()
            }
        } else {
            self.page.to_string()
        }
    }
}

/// List `dir` and return the artifacts of `identifier` (and `alias`),
/// sorted ascending by page number, one artifact per output key.
///
/// A missing directory yields an empty list; the caller decides whether
/// zero pages is an error.
pub fn discover(
    dir: &Path,
    identifier: &str,
    alias: Option<&str>,
    naming: &NamingConvention,
) -> Result<Vec<PageArtifact>, PipelineError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Artifact directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(PipelineError::DiscoveryFailed {
                dir: dir.to_path_buf(),
                source,
            })
        }
    };

    let pattern = build_pattern(identifier, alias, naming)?;
    let mut artifacts = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::DiscoveryFailed {
            dir: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(caps) = pattern.captures(name) else {
            continue;
        };

        let ext = caps["ext"].to_ascii_lowercase();
        if !naming.extensions.iter().any(|e| e == &ext) {
            continue;
        }

        let label = caps["page"].to_string();
        let page = match parse_page_number(&label) {
            Some(p) => p,
            None => {
                warn!(
                    "Could not extract a page number from '{}'; it will be processed last",
                    name
                );
                UNPARSED_PAGE
            }
        };

        artifacts.push(PageArtifact {
            path: entry.path(),
            page,
            label,
            kind: ArtifactKind::from_extension(&ext),
        });
    }

    // Stable: equal page numbers keep enumeration order.
    artifacts.sort_by_key(|a| a.page);
    let artifacts = drop_duplicate_pages(artifacts);
    debug!(
        "Discovered {} artifact(s) for '{}' in {}",
        artifacts.len(),
        identifier,
        dir.display()
    );
    Ok(artifacts)
}

/// Keep one artifact per output key, preferring images over text.
///
/// Input must be sorted by page; the relative order of what is kept is
/// preserved.
fn drop_duplicate_pages(artifacts: Vec<PageArtifact>) -> Vec<PageArtifact> {
    let preferred: HashSet<String> = artifacts
        .iter()
        .filter(|a| a.kind == ArtifactKind::Image)
        .map(PageArtifact::output_key)
        .collect();

    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let key = artifact.output_key();
        let shadowed = artifact.kind == ArtifactKind::Text && preferred.contains(&key);
        if shadowed || !seen.insert(key.clone()) {
            warn!(
                "Skipping '{}': page {} already has an artifact",
                artifact.path.display(),
                key
            );
            continue;
        }
        kept.push(artifact);
    }
    kept
}

/// Parse a page segment into a 1-based page number.
pub fn parse_page_number(segment: &str) -> Option<u32> {
    match segment.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(n) if n == UNPARSED_PAGE => None,
        Ok(n) => Some(n),
    }
}

/// `^(?:id|alias)(?:sep1|sep2)(?P<page>.*)\.(?P<ext>[^.]+)$`
fn build_pattern(
    identifier: &str,
    alias: Option<&str>,
    naming: &NamingConvention,
) -> Result<Regex, PipelineError> {
    let mut ids = vec![regex::escape(identifier)];
    if let Some(alias) = alias.filter(|a| !a.is_empty() && *a != identifier) {
        ids.push(regex::escape(alias));
    }
    let seps: Vec<String> = naming
        .separators
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| regex::escape(s))
        .collect();

    let pattern = format!(
        r"^(?:{})(?:{})(?P<page>.*)\.(?P<ext>[^.]+)$",
        ids.join("|"),
        seps.join("|")
    );
    Regex::new(&pattern)
        .map_err(|e| PipelineError::Internal(format!("artifact pattern '{pattern}': {e}")))
}
