//! Project tree model and directory scanning for TabShell.
//! TabShell 的專案樹模型與資料夾掃描模組。

pub mod scan;
pub mod tree;

pub use scan::{hash_path, ProjectScanner, ScanError, DEFAULT_SCAN_DEPTH};
pub use tree::{ProjectEntry, ProjectStructure, ProjectTreeError};
