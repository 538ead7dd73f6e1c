use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tabshell_core::{
    ContentProvider, FsContentProvider, ProjectEntry, ProjectStructure, SessionError, ShellState,
};
use tabshell_settings::{DecodePolicy, ResolutionPolicy, ShellConfig, ShellConfigStore};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "tabshell-cli",
    about = "Inspect project trees and replay tab sessions",
    author,
    version
)]
struct Cli {
    /// 設定檔路徑；未指定時使用預設值。 / Config file (defaults are used when omitted).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// 記錄層級；`RUST_LOG` 優先。 / Log filter (`RUST_LOG` takes precedence).
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 掃描並列出專案樹。 / Scan a directory and print its project tree.
    Tree(TreeArgs),
    /// 透過內容來源讀取檔案。 / Print a file through the content provider.
    Read(ReadArgs),
    /// 重播開啟/關閉分頁的動作。 / Replay open/close actions against a project.
    Session(SessionArgs),
    /// 建立、檢視或修改設定檔（需 `--config`）。 / Create, show or edit the config file (needs `--config`).
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// 寫入預設設定。 / Write a config file with default values.
    Init {
        /// 覆寫既有檔案。 / Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// 以 JSON 顯示生效中的設定。 / Print the effective config as JSON.
    Show,
    /// 修改單一設定值。 / Change one setting, e.g. `session.resolution last_resolved`.
    Set {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
}

#[derive(Args)]
struct TreeArgs {
    /// 專案根目錄。 / Project root directory.
    #[arg(value_name = "ROOT")]
    root: PathBuf,
    /// 以 JSON 輸出快照。 / Emit the snapshot as JSON.
    #[arg(long)]
    json: bool,
    /// 覆寫掃描深度。 / Override the scan depth.
    #[arg(long, value_name = "N")]
    depth: Option<usize>,
}

#[derive(Args)]
struct ReadArgs {
    /// 要讀取的檔案。 / File to read.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Args)]
struct SessionArgs {
    /// 專案根目錄。 / Project root directory.
    #[arg(long, value_name = "ROOT")]
    root: PathBuf,
    /// 覆寫掃描深度。 / Override the scan depth.
    #[arg(long, value_name = "N")]
    depth: Option<usize>,
    /// 依序執行的動作，例如 `open:src/main.rs` 或 `close:README.md`。 / Actions such as `open:src/main.rs` or `close:README.md`.
    #[arg(value_name = "ACTION", required = true)]
    actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Open(String),
    Close(String),
}

impl Action {
    fn parse(raw: &str) -> Result<Self> {
        match raw.split_once(':') {
            Some(("open", rel)) if !rel.is_empty() => Ok(Action::Open(rel.to_string())),
            Some(("close", rel)) if !rel.is_empty() => Ok(Action::Close(rel.to_string())),
            _ => bail!("invalid action `{raw}`; expected open:<path> or close:<path>"),
        }
    }
}

/// A single `config set` change, validated before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Setting {
    FallbackContent(String),
    FallbackPath(Option<PathBuf>),
    MaxDepth(usize),
    IncludeHidden(bool),
    Resolution(ResolutionPolicy),
    Decode(DecodePolicy),
    LogFilter(String),
}

impl Setting {
    fn parse(key: &str, value: &str) -> Result<Self> {
        let setting = match key {
            "fallback_content" => Setting::FallbackContent(value.to_string()),
            "fallback_path" if value.is_empty() => Setting::FallbackPath(None),
            "fallback_path" => Setting::FallbackPath(Some(PathBuf::from(value))),
            "scan.max_depth" => Setting::MaxDepth(
                value
                    .parse()
                    .with_context(|| format!("`{value}` is not a depth"))?,
            ),
            "scan.include_hidden" => Setting::IncludeHidden(
                value
                    .parse()
                    .with_context(|| format!("`{value}` is not true or false"))?,
            ),
            "session.resolution" => Setting::Resolution(policy_from_name(value)?),
            "session.decode" => Setting::Decode(policy_from_name(value)?),
            "log_filter" => Setting::LogFilter(value.to_string()),
            _ => bail!("unknown config key `{key}`"),
        };
        Ok(setting)
    }

    fn apply(&self, config: &mut ShellConfig) {
        match self {
            Setting::FallbackContent(text) => config.fallback_content = text.clone(),
            Setting::FallbackPath(path) => config.fallback_path = path.clone(),
            Setting::MaxDepth(depth) => config.scan.max_depth = *depth,
            Setting::IncludeHidden(include) => config.scan.include_hidden = *include,
            Setting::Resolution(policy) => config.session.resolution = *policy,
            Setting::Decode(policy) => config.session.decode = *policy,
            Setting::LogFilter(filter) => config.log_filter = filter.clone(),
        }
    }
}

/// Parses a policy by its config-file name (`last_resolved`, `detect`, ...).
fn policy_from_name<T: serde::de::DeserializeOwned>(name: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .with_context(|| format!("unknown policy `{name}`"))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let Cli {
        config,
        log_level,
        command,
    } = Cli::parse();
    let config_path = config.as_deref();
    let log_level = log_level.as_deref();

    match command {
        Commands::Config(action) => {
            init_logging(log_level, "info");
            execute_config(config_path, action)
        }
        Commands::Tree(args) => {
            let config = prepare(config_path, log_level, args.depth)?;
            execute_tree(&config, &args.root, args.json).await
        }
        Commands::Read(args) => {
            let config = prepare(config_path, log_level, None)?;
            execute_read(&config, &args.file).await
        }
        Commands::Session(args) => {
            let config = prepare(config_path, log_level, args.depth)?;
            execute_session(&config, &args.root, &args.actions).await
        }
    }
}

/// Loads the config, starts logging and applies a depth override.
fn prepare(
    path: Option<&Path>,
    log_level: Option<&str>,
    depth: Option<usize>,
) -> Result<ShellConfig> {
    let mut config = load_config(path)?;
    init_logging(log_level, &config.log_filter);
    if let Some(depth) = depth {
        config.scan.max_depth = depth;
        config.sanitize();
    }
    Ok(config)
}

fn load_config(path: Option<&Path>) -> Result<ShellConfig> {
    match path {
        Some(path) => Ok(ShellConfigStore::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?
            .into_config()),
        None => {
            let mut config = ShellConfig::default();
            config.sanitize();
            Ok(config)
        }
    }
}

fn execute_config(path: Option<&Path>, action: ConfigCommand) -> Result<()> {
    let path = path.context("config commands need --config <PATH>")?;
    match action {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite it",
                    path.display()
                );
            }
            let store = ShellConfigStore::new(path, ShellConfig::default());
            store.save()?;
            println!("Wrote {}", store.path().display());
        }
        ConfigCommand::Show => {
            let store = ShellConfigStore::load(path)?;
            println!("{}", serde_json::to_string_pretty(store.config())?);
        }
        ConfigCommand::Set { key, value } => {
            let setting = Setting::parse(&key, &value)?;
            let mut store = ShellConfigStore::load(path)?;
            store.update(|config| setting.apply(config))?;
            debug!(?setting, path = %store.path().display(), "config updated");
            println!("Updated {key} in {}", store.path().display());
        }
    }
    Ok(())
}

fn init_logging(cli_filter: Option<&str>, config_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cli_filter.unwrap_or(config_filter)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn execute_tree(config: &ShellConfig, root: &Path, json: bool) -> Result<()> {
    let shell = ShellState::from_config(config)?;
    let structure = shell
        .load_project(root)
        .await
        .with_context(|| format!("failed to scan {}", root.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&structure)?);
        return Ok(());
    }

    println!("{}/", structure.name);
    print_children(&structure, &structure.root_hash, 1);
    Ok(())
}

fn print_children(structure: &ProjectStructure, parent_hash: &str, level: usize) {
    let mut children: Vec<&ProjectEntry> = structure.children(parent_hash).collect();
    // Folders first, then files, each alphabetical.
    children.sort_by(|a, b| a.is_file.cmp(&b.is_file).then_with(|| a.name.cmp(&b.name)));
    for child in children {
        let indent = "  ".repeat(level);
        if child.is_file {
            println!("{indent}{}", child.name);
        } else {
            println!("{indent}{}/", child.name);
            print_children(structure, &child.hash, level + 1);
        }
    }
}

async fn execute_read(config: &ShellConfig, file: &Path) -> Result<()> {
    let provider = FsContentProvider::new(config.session.decode);
    let path = file.to_string_lossy();
    let content = provider.read(&path).await?;
    print!("{content}");
    Ok(())
}

async fn execute_session(config: &ShellConfig, root: &Path, raw_actions: &[String]) -> Result<()> {
    let actions = raw_actions
        .iter()
        .map(|raw| Action::parse(raw))
        .collect::<Result<Vec<_>>>()?;

    let shell = ShellState::from_config(config)?;
    shell
        .load_project(root)
        .await
        .with_context(|| format!("failed to scan {}", root.display()))?;
    shell.start();

    for action in actions {
        debug!(?action, "replaying");
        match action {
            Action::Open(rel) => {
                let entry = lookup(&shell, root, &rel)?;
                if !entry.is_file {
                    bail!("{rel} is a directory and cannot be opened");
                }
                if let Err(err) = shell.session().open(entry).await {
                    report_unavailable(&err);
                }
            }
            Action::Close(rel) => {
                let entry = lookup(&shell, root, &rel)?;
                if let Err(err) = shell.session().close(&entry).settle().await {
                    report_unavailable(&err);
                }
            }
        }
    }

    print_session(&shell);
    Ok(())
}

fn lookup(shell: &ShellState, root: &Path, rel: &str) -> Result<ProjectEntry> {
    let path = root.join(rel);
    let key = path.to_string_lossy();
    shell
        .entry(&key)
        .with_context(|| format!("{rel} is not part of the scanned project"))
}

fn report_unavailable(err: &SessionError) {
    warn!(error = %err, "document could not be shown");
    eprintln!("Warning: {err}");
}

fn print_session(shell: &ShellState) {
    let session = shell.session();
    let current = session.current();
    let active_path = current
        .as_ref()
        .filter(|doc| !doc.is_fallback())
        .map(|doc| doc.file.path.clone());

    let tabs = session.opened_files();
    println!("Tabs ({}):", tabs.len());
    for tab in &tabs {
        let marker = if active_path.as_deref() == Some(tab.path.as_str()) {
            '*'
        } else {
            ' '
        };
        println!("{marker} {}", tab.name);
    }

    match current {
        Some(doc) if !doc.is_fallback() => {
            println!("Active: {}", doc.file.name);
            println!("{}", doc.content.lines().next().unwrap_or_default());
        }
        Some(doc) => {
            println!("Active: (none)");
            println!("{}", doc.content.lines().next().unwrap_or_default());
        }
        None => println!("Active: (none)"),
    }
}
