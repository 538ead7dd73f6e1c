use std::path::PathBuf;
use std::sync::Arc;

use tabshell_project::{ProjectEntry, ProjectScanner, ProjectStructure, ScanError};
use tabshell_settings::{ShellConfig, ShellConfigError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use crate::content::{ContentProvider, FsContentProvider};
use crate::observable::Observable;
use crate::session::DocumentSession;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Config(#[from] ShellConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("project scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Process-wide state: the current project tree plus the document session.
/// 行程層級的狀態：目前的專案樹與文件工作階段。
#[derive(Debug)]
pub struct ShellState {
    project: Observable<ProjectStructure>,
    session: DocumentSession,
    scanner: ProjectScanner,
}

impl ShellState {
    /// Builds the state with an explicit content provider.
    pub fn new(
        config: &ShellConfig,
        provider: Arc<dyn ContentProvider>,
    ) -> Result<Self, ShellError> {
        let fallback = config.resolve_fallback()?;
        let scanner = ProjectScanner::new(config.scan.max_depth)
            .include_hidden(config.scan.include_hidden);
        Ok(Self {
            project: Observable::new(ProjectStructure::unloaded()),
            session: DocumentSession::new(provider, fallback, config.session.resolution),
            scanner,
        })
    }

    /// Builds the state backed by the local filesystem.
    /// 以本機檔案系統作為內容來源建立狀態。
    pub fn from_config(config: &ShellConfig) -> Result<Self, ShellError> {
        let provider = FsContentProvider::new(config.session.decode);
        Self::new(config, Arc::new(provider))
    }

    /// Publishes the fallback document as the initial view.
    pub fn start(&self) {
        self.session.open_undefined();
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    pub fn project(&self) -> ProjectStructure {
        self.project.get()
    }

    pub fn subscribe_project(&self) -> watch::Receiver<ProjectStructure> {
        self.project.subscribe()
    }

    /// Looks up an entry of the current project by path.
    pub fn entry(&self, path: &str) -> Option<ProjectEntry> {
        self.project
            .with(|project| project.find_by_path(path).cloned())
    }

    /// Scans `root` on the blocking pool and replaces the project tree.
    /// 在阻塞執行緒池掃描 `root`，並整體取代專案樹。
    pub async fn load_project(
        &self,
        root: impl Into<PathBuf>,
    ) -> Result<ProjectStructure, ShellError> {
        let root = root.into();
        let scanner = self.scanner.clone();
        let structure = tokio::task::spawn_blocking(move || scanner.scan(root)).await??;
        info!(
            project = %structure.name,
            entries = structure.files.len(),
            "project loaded"
        );
        self.project.set(structure.clone());
        Ok(structure)
    }
}
