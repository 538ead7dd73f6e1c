use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::tree::{display_name, ProjectEntry, ProjectStructure};

/// Default walk depth: the root folder and its direct children.
pub const DEFAULT_SCAN_DEPTH: usize = 1;

/// Fingerprint of a path string (`DefaultHasher`, decimal).
/// 以 `DefaultHasher` 計算路徑字串的指紋（十進位）。
pub fn hash_path(path: &str) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish().to_string()
}

/// Errors emitted while scanning a project directory.
/// 掃描專案資料夾時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("project root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to walk project root: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Walks a directory and produces a flat [`ProjectStructure`].
/// 走訪資料夾並產生扁平的 [`ProjectStructure`]。
#[derive(Debug, Clone)]
pub struct ProjectScanner {
    max_depth: usize,
    include_hidden: bool,
}

impl Default for ProjectScanner {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_DEPTH)
    }
}

impl ProjectScanner {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
            include_hidden: true,
        }
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Scans `root`; unreadable children are skipped, not fatal.
    /// 掃描 `root`；無法讀取的子項目會略過而不中止。
    pub fn scan(&self, root: impl AsRef<Path>) -> Result<ProjectStructure, ScanError> {
        // Parent hashes come from `Path::parent`, which has no trailing separator.
        let root: PathBuf = root.as_ref().components().collect();
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root));
        }

        let include_hidden = self.include_hidden;
        let mut walker = WalkDir::new(&root)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(move |entry| {
                entry.depth() == 0 || include_hidden || !is_hidden(entry)
            });

        let root_entry = match walker.next() {
            Some(Ok(entry)) => entry,
            Some(Err(err)) => return Err(ScanError::Walk(err)),
            None => return Ok(ProjectStructure::default()),
        };

        let mut files = Vec::new();
        for item in walker {
            match item {
                Ok(entry) => files.push(entry_from_walkdir(&entry)),
                Err(err) => warn!(error = %err, "skipping unreadable project entry"),
            }
        }

        let root_path = path_string(root_entry.path());
        debug!(root = %root_path, entries = files.len(), "project scan finished");
        Ok(ProjectStructure {
            name: display_name(&root_path),
            root_hash: hash_path(&root_path),
            root_path,
            files,
        })
    }
}

fn entry_from_walkdir(entry: &DirEntry) -> ProjectEntry {
    let path = path_string(entry.path());
    let parent = entry.path().parent().map(path_string).unwrap_or_default();
    ProjectEntry::new(
        display_name(&path),
        path.clone(),
        hash_path(&path),
        hash_path(&parent),
        entry.file_type().is_file(),
    )
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
