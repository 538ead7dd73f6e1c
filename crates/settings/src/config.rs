use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_VERSION: u32 = 1;
const MAX_SCAN_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ShellConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which content resolution may publish the active document.
/// 決定哪一次內容回應可以發佈為目前文件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Every successful fetch publishes, whatever its issue order.
    LastResolved,
    /// Fetches overtaken by a newer request are discarded.
    #[default]
    LatestRequest,
}

/// How raw file bytes become text.
/// 原始位元組轉換為文字的方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// UTF-8 only; anything else is an error.
    #[default]
    Strict,
    /// BOM sniffing, then charset detection for non-UTF-8 input.
    Detect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_fallback_content")]
    pub fallback_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_path: Option<PathBuf>,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_fallback_content() -> String {
    "No file is open. Pick a file from the project tree to view it.".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            fallback_content: default_fallback_content(),
            fallback_path: None,
            scan: ScanConfig::default(),
            session: SessionConfig::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl ShellConfig {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        if self.log_filter.trim().is_empty() {
            self.log_filter = default_log_filter();
        }
        self.scan.sanitize();
    }

    /// Resolves the "nothing open" text, preferring `fallback_path` when set.
    /// 取得「未開啟檔案」時顯示的文字；若設定 `fallback_path` 則優先使用。
    pub fn resolve_fallback(&self) -> Result<String, ShellConfigError> {
        match &self.fallback_path {
            Some(path) => fs::read_to_string(path).map_err(|source| ShellConfigError::Read {
                path: path.clone(),
                source,
            }),
            None => Ok(self.fallback_content.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_true")]
    pub include_hidden: bool,
}

fn default_max_depth() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            include_hidden: true,
        }
    }
}

impl ScanConfig {
    fn sanitize(&mut self) {
        self.max_depth = self.max_depth.clamp(1, MAX_SCAN_DEPTH);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub resolution: ResolutionPolicy,
    #[serde(default)]
    pub decode: DecodePolicy,
}

#[derive(Debug)]
pub struct ShellConfigStore {
    path: PathBuf,
    data: ShellConfig,
}

impl ShellConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: ShellConfig) -> Self {
        Self {
            path: path.into(),
            data: config,
        }
    }

    /// Loads the config file; a missing file yields sanitized defaults.
    /// 載入設定檔；檔案不存在時回傳預設值。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ShellConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let mut data = ShellConfig::default();
            data.sanitize();
            return Ok(Self { path, data });
        }

        let contents = fs::read_to_string(&path).map_err(|source| ShellConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: ShellConfig =
            serde_json::from_str(&contents).map_err(|source| ShellConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn config(&self) -> &ShellConfig {
        &self.data
    }

    pub fn into_config(self) -> ShellConfig {
        self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), ShellConfigError>
    where
        F: FnMut(&mut ShellConfig),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), ShellConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ShellConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload = serde_json::to_string_pretty(&self.data).map_err(|source| {
            ShellConfigError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload.as_bytes()).map_err(|source| ShellConfigError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| ShellConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
