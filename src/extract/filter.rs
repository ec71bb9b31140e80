//! Which remote files an extraction copies.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

/// Tag values meaning "every inspection result".
const ALL_TAG_SENTINELS: &[&str] = &["all", "all inspections", "todas las inspecciones"];

/// Extension set plus optional inspection-result tag, shared read-only by
/// every target in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionFilter {
    extensions: BTreeSet<String>,
    inspection_tag: Option<String>,
}

impl ExtractionFilter {
    /// Build a filter. Extensions may be given with or without the dot and
    /// in any case; an empty or "all" tag disables tag filtering.
    pub fn new<I, S>(extensions: I, inspection_tag: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Self {
            extensions,
            inspection_tag: normalize_tag(inspection_tag),
        }
    }

    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    pub fn inspection_tag(&self) -> Option<&str> {
        self.inspection_tag.as_deref()
    }

    pub fn has_extensions(&self) -> bool {
        !self.extensions.is_empty()
    }

    /// Whether a file at `path` should be copied.
    pub fn matches(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };

        let extension_ok = path
            .extension()
            .map(|e| self.extensions.contains(&e.to_string_lossy().to_lowercase()))
            .unwrap_or(false);

        extension_ok && self.inspection_tag.as_ref().map_or(true, |tag| name.contains(tag))
    }
}

fn normalize_tag(tag: Option<&str>) -> Option<String> {
    let tag = tag?.trim().to_lowercase();
    if tag.is_empty() || ALL_TAG_SENTINELS.contains(&tag.as_str()) {
        None
    } else {
        Some(tag)
    }
}
