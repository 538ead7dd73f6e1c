use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One node of the project tree; files and folders share this shape.
/// 專案樹中的單一節點；檔案與資料夾共用相同結構。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProjectEntry {
    pub name: String,
    pub path: String,
    pub hash: String,
    pub parent_hash: String,
    pub is_file: bool,
    /// Transient UI hint only; the session manager never reads it.
    /// 僅供介面使用的暫態提示，工作階段管理器不會讀取。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened: Option<bool>,
}

impl ProjectEntry {
    /// Creates an entry from its identifying fields.
    /// 以識別欄位建立節點。
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        hash: impl Into<String>,
        parent_hash: impl Into<String>,
        is_file: bool,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            hash: hash.into(),
            parent_hash: parent_hash.into(),
            is_file,
            opened: None,
        }
    }

    /// Synthetic file entry with every identifying field empty.
    /// 所有識別欄位皆為空的合成檔案節點。
    pub fn placeholder() -> Self {
        Self {
            is_file: true,
            ..Self::default()
        }
    }

    /// Returns `true` when both entries point at the same path.
    /// 兩個節點指向相同路徑時回傳 `true`。
    pub fn same_path(&self, other: &ProjectEntry) -> bool {
        self.path == other.path
    }

    pub fn is_placeholder(&self) -> bool {
        self.path.is_empty() && self.hash.is_empty() && self.name.is_empty()
    }
}

/// Snapshot of a scanned project. `files` keeps scan order, not tree order.
/// 專案掃描快照；`files` 依掃描順序排列，而非樹狀順序。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProjectStructure {
    pub name: String,
    pub root_path: String,
    pub root_hash: String,
    #[serde(default)]
    pub files: Vec<ProjectEntry>,
}

impl ProjectStructure {
    /// Default snapshot shown before any project is scanned.
    /// 尚未掃描任何專案時顯示的預設快照。
    pub fn unloaded() -> Self {
        Self {
            name: "Project".to_string(),
            root_path: std::path::MAIN_SEPARATOR.to_string(),
            root_hash: String::new(),
            files: Vec::new(),
        }
    }

    /// Builds an unscanned structure named after the last path component.
    /// 建立尚未掃描、以路徑最後一段命名的結構。
    pub fn from_root_path(path: impl Into<String>) -> Self {
        let root_path = path.into();
        Self {
            name: display_name(&root_path),
            root_path,
            root_hash: String::new(),
            files: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Entries whose parent is the tree root, in scan order.
    /// 父節點為樹根的項目，依掃描順序回傳。
    pub fn roots(&self) -> impl Iterator<Item = &ProjectEntry> {
        self.children(&self.root_hash)
    }

    /// Entries directly under `parent_hash`, in scan order.
    /// 直接位於 `parent_hash` 之下的項目。
    pub fn children<'a>(
        &'a self,
        parent_hash: &'a str,
    ) -> impl Iterator<Item = &'a ProjectEntry> + 'a {
        self.files
            .iter()
            .filter(move |entry| entry.parent_hash == parent_hash)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&ProjectEntry> {
        self.files.iter().find(|entry| entry.path == path)
    }

    pub fn find_by_hash(&self, hash: &str) -> Option<&ProjectEntry> {
        self.files.iter().find(|entry| entry.hash == hash)
    }

    /// Checks path/hash uniqueness and that every parent resolves.
    /// 檢查路徑與雜湊唯一性，以及每個父節點皆可解析。
    pub fn validate(&self) -> Result<(), ProjectTreeError> {
        let mut paths = HashSet::with_capacity(self.files.len());
        let mut hashes = HashSet::with_capacity(self.files.len());
        for entry in &self.files {
            if !paths.insert(entry.path.as_str()) {
                return Err(ProjectTreeError::DuplicatePath(entry.path.clone()));
            }
            if !hashes.insert(entry.hash.as_str()) {
                return Err(ProjectTreeError::DuplicateHash(entry.hash.clone()));
            }
        }
        for entry in &self.files {
            let parent = entry.parent_hash.as_str();
            if parent != self.root_hash && !hashes.contains(parent) {
                return Err(ProjectTreeError::DanglingParent {
                    path: entry.path.clone(),
                    parent_hash: entry.parent_hash.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Last component of a path string, or the string itself when it has none.
pub(crate) fn display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Invariant violations detected in a [`ProjectStructure`].
/// [`ProjectStructure`] 中偵測到的不變式違反。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectTreeError {
    #[error("path {0} appears more than once")]
    DuplicatePath(String),
    #[error("hash {0} appears more than once")]
    DuplicateHash(String),
    #[error("entry {path} has unknown parent {parent_hash}")]
    DanglingParent { path: String, parent_hash: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProjectStructure {
        ProjectStructure {
            name: "demo".into(),
            root_path: "/demo".into(),
            root_hash: "r".into(),
            files: vec![
                ProjectEntry::new("main.rs", "/demo/src/main.rs", "m", "s", true),
                ProjectEntry::new("README.md", "/demo/README.md", "rd", "r", true),
                ProjectEntry::new("src", "/demo/src", "s", "r", false),
            ],
        }
    }

    #[test]
    fn children_follow_parent_hash_in_scan_order() {
        let tree = sample();
        let roots: Vec<_> = tree.roots().map(|entry| entry.name.as_str()).collect();
        assert_eq!(roots, vec!["README.md", "src"]);
        let nested: Vec<_> = tree.children("s").map(|entry| entry.name.as_str()).collect();
        assert_eq!(nested, vec!["main.rs"]);
    }

    #[test]
    fn validate_accepts_consistent_tree() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_duplicates_and_dangling_parents() {
        let mut tree = sample();
        tree.files.push(ProjectEntry::new("x", "/demo/README.md", "x", "r", true));
        assert_eq!(
            tree.validate(),
            Err(ProjectTreeError::DuplicatePath("/demo/README.md".into()))
        );

        let mut tree = sample();
        tree.files.push(ProjectEntry::new("y", "/demo/y", "m", "r", true));
        assert_eq!(tree.validate(), Err(ProjectTreeError::DuplicateHash("m".into())));

        let mut tree = sample();
        tree.files.push(ProjectEntry::new("z", "/demo/z", "z", "nowhere", true));
        assert!(matches!(
            tree.validate(),
            Err(ProjectTreeError::DanglingParent { .. })
        ));
    }

    #[test]
    fn placeholder_is_an_empty_file() {
        let entry = ProjectEntry::placeholder();
        assert!(entry.is_file);
        assert!(entry.is_placeholder());
        assert!(entry.path.is_empty());
    }

    #[test]
    fn same_path_ignores_other_fields() {
        let a = ProjectEntry::new("a", "/p/a.txt", "h1", "r", true);
        let mut b = a.clone();
        b.hash = "other".into();
        b.opened = Some(true);
        assert!(a.same_path(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn from_root_path_uses_last_component() {
        let tree = ProjectStructure::from_root_path("/home/user/project");
        assert_eq!(tree.name, "project");
        assert!(tree.is_empty());
    }

    #[test]
    fn opened_hint_is_optional_in_json() {
        let json = r#"{"name":"a","path":"/a","hash":"1","parent_hash":"0","is_file":true}"#;
        let entry: ProjectEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.opened, None);
        let back = serde_json::to_string(&entry).unwrap();
        assert!(!back.contains("opened"));
    }
}
