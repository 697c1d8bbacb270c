//! Configured search areas and their containment relation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchArea {
    pub path: PathBuf,
    pub include_subdirectories: bool,
}

impl SearchArea {
    pub fn new(path: impl Into<PathBuf>, include_subdirectories: bool) -> Self {
        Self {
            path: path.into(),
            include_subdirectories,
        }
    }

    pub fn recursive(path: impl Into<PathBuf>) -> Self {
        Self::new(path, true)
    }

    pub fn shallow(path: impl Into<PathBuf>) -> Self {
        Self::new(path, false)
    }

    /// True if `other` is already covered by this area.
    ///
    /// Equal paths always contain each other. A strictly deeper path is
    /// contained only when this area recurses. Prefixes are compared per
    /// path component, so `/data` does not contain `/database`.
    pub fn contains(&self, other: &SearchArea) -> bool {
        if self.path == other.path {
            return true;
        }
        self.include_subdirectories && other.path.starts_with(&self.path)
    }

    /// True if `path` lies inside what this area indexes.
    pub fn covers_path(&self, path: &Path) -> bool {
        if path == self.path {
            return true;
        }
        match path.strip_prefix(&self.path) {
            Ok(rest) => self.include_subdirectories || rest.components().count() == 1,
            Err(_) => false,
        }
    }

    /// True if `other` names a directory directly below this area's root.
    pub fn is_parent_of(&self, other: &SearchArea) -> bool {
        other.path.parent() == Some(self.path.as_path())
    }
}

/// Collapses a configured area list into the set of independent roots.
///
/// Duplicate paths are merged with their recursion flags OR-ed together,
/// then every area strictly inside a recursive ancestor is dropped. The
/// first-seen order of the survivors is preserved.
pub fn dedup_areas(areas: &[SearchArea]) -> Vec<SearchArea> {
    let mut merged: Vec<SearchArea> = Vec::with_capacity(areas.len());
    for area in areas {
        match merged.iter_mut().find(|m| m.path == area.path) {
            Some(existing) => existing.include_subdirectories |= area.include_subdirectories,
            None => merged.push(area.clone()),
        }
    }

    merged
        .iter()
        .filter(|area| {
            !merged
                .iter()
                .any(|other| other.path != area.path && other.contains(area))
        })
        .cloned()
        .collect()
}
