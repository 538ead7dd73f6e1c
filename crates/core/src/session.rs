use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tabshell_project::ProjectEntry;
use tabshell_settings::ResolutionPolicy;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::content::{ContentError, ContentProvider};
use crate::observable::Observable;

/// The active tab's entry paired with its materialised text.
/// 目前分頁的節點與其已載入的文字內容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub file: ProjectEntry,
    pub content: String,
}

impl OpenDocument {
    /// Returns `true` when this is the "nothing open" document.
    pub fn is_fallback(&self) -> bool {
        self.file.is_placeholder()
    }
}

/// Load state tracked for each open tab.
/// 每個已開啟分頁的載入狀態。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabStatus {
    Loading,
    Ready,
    /// The last fetch failed; re-opening the tab retries it.
    Unavailable { reason: String },
}

/// View of the active-document slot.
/// 目前文件欄位的狀態機視圖。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveSlot {
    Empty,
    Loading(ProjectEntry),
    Showing(OpenDocument),
}

/// Result of a successful [`DocumentSession::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Content arrived and was published as the active document.
    Opened,
    /// The entry was already open and showing; nothing was fetched.
    AlreadyActive,
    /// Content arrived after a newer request and was not published.
    Superseded,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot open an entry with an empty path")]
    EmptyPath,
    #[error("content for {path} is unavailable: {source}")]
    ContentUnavailable {
        path: String,
        #[source]
        source: ContentError,
    },
    #[error("reselection task stopped: {0}")]
    Interrupted(#[from] JoinError),
}

/// What [`DocumentSession::close`] did to the active document.
/// [`DocumentSession::close`] 對目前文件造成的影響。
#[derive(Debug)]
pub enum CloseOutcome {
    /// A background tab closed; the active document is unchanged.
    Background,
    /// The last tab closed and the fallback document is showing.
    Fallback,
    /// The active tab closed and a neighbour is loading in its place.
    Reselect(Reselection),
}

impl CloseOutcome {
    /// Waits for any pending reselection and reports how it ended.
    /// 等待重新選取完成（若有）並回報結果。
    pub async fn settle(self) -> Result<Option<OpenOutcome>, SessionError> {
        match self {
            CloseOutcome::Reselect(reselection) => reselection.load().await.map(Some),
            CloseOutcome::Background | CloseOutcome::Fallback => Ok(None),
        }
    }
}

/// Neighbour tab chosen after the active tab closed. The neighbour is
/// already marked as loading; dropping this handle does not cancel the fetch
/// when a Tokio runtime was available to run it.
#[derive(Debug)]
pub struct Reselection {
    next: ProjectEntry,
    pending: PendingLoad,
}

#[derive(Debug)]
enum PendingLoad {
    Spawned(JoinHandle<Result<OpenOutcome, SessionError>>),
    /// No runtime was current at close time; `load` runs the fetch.
    Deferred {
        session: DocumentSession,
        ticket: u64,
    },
}

impl Reselection {
    pub fn next(&self) -> &ProjectEntry {
        &self.next
    }

    /// Waits for the neighbour's content and reports the result.
    pub async fn load(self) -> Result<OpenOutcome, SessionError> {
        match self.pending {
            PendingLoad::Spawned(task) => task.await?,
            PendingLoad::Deferred { session, ticket } => session.fetch(ticket, self.next).await,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    ticket: u64,
    entry: ProjectEntry,
}

#[derive(Debug, Default)]
struct SessionState {
    statuses: HashMap<String, TabStatus>,
    issued: u64,
    in_flight: Option<InFlight>,
}

struct SessionInner {
    provider: Arc<dyn ContentProvider>,
    policy: ResolutionPolicy,
    fallback: String,
    opened: Observable<Vec<ProjectEntry>>,
    current: Observable<Option<OpenDocument>>,
    state: Mutex<SessionState>,
}

/// Owns the open tabs, the active document and the fallback text.
/// Cloning yields another handle to the same session.
///
/// 管理已開啟的分頁、目前文件與預設內容；複製後仍指向同一個工作階段。
#[derive(Clone)]
pub struct DocumentSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("policy", &self.inner.policy)
            .field("opened", &self.inner.opened.with(Vec::len))
            .finish()
    }
}

impl DocumentSession {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        fallback: impl Into<String>,
        policy: ResolutionPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                provider,
                policy,
                fallback: fallback.into(),
                opened: Observable::new(Vec::new()),
                current: Observable::new(None),
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.inner.policy
    }

    pub fn fallback(&self) -> &str {
        &self.inner.fallback
    }

    /// Open tabs in display order.
    pub fn opened_files(&self) -> Vec<ProjectEntry> {
        self.inner.opened.get()
    }

    pub fn current(&self) -> Option<OpenDocument> {
        self.inner.current.get()
    }

    pub fn tab_status(&self, path: &str) -> Option<TabStatus> {
        self.lock().statuses.get(path).cloned()
    }

    pub fn subscribe_opened(&self) -> watch::Receiver<Vec<ProjectEntry>> {
        self.inner.opened.subscribe()
    }

    pub fn subscribe_current(&self) -> watch::Receiver<Option<OpenDocument>> {
        self.inner.current.subscribe()
    }

    /// Current state of the active-document slot.
    /// 目前文件欄位的狀態。
    pub fn active_slot(&self) -> ActiveSlot {
        let state = self.lock();
        if let Some(in_flight) = &state.in_flight {
            return ActiveSlot::Loading(in_flight.entry.clone());
        }
        match self.inner.current.get() {
            Some(doc) if !doc.is_fallback() => ActiveSlot::Showing(doc),
            _ => ActiveSlot::Empty,
        }
    }

    /// Registers `entry` as a tab (appending when new) and makes it active.
    ///
    /// Re-opening the tab that is already showing is a no-op. Otherwise the
    /// content is fetched and published once it resolves. A failed fetch
    /// leaves the tab registered with [`TabStatus::Unavailable`].
    ///
    /// 將 `entry` 加入分頁（若為新分頁則附加於尾端）並設為目前文件。
    pub async fn open(&self, entry: ProjectEntry) -> Result<OpenOutcome, SessionError> {
        if entry.path.is_empty() {
            return Err(SessionError::EmptyPath);
        }

        let ticket = {
            let mut state = self.lock();
            let already_opened = self.is_open(&entry);
            if !already_opened {
                debug!(path = %entry.path, "appending tab");
                self.inner.opened.update(|files| files.push(entry.clone()));
            } else if self.is_active(&entry) {
                return Ok(OpenOutcome::AlreadyActive);
            }

            self.begin_load(&mut state, &entry)
        };

        self.fetch(ticket, entry).await
    }

    /// Removes `entry` from the tabs. When it was the active document the
    /// right-hand neighbour takes over, then the left-hand one, and the
    /// fallback document once no tab remains.
    ///
    /// The neighbour is marked as loading before this returns and its fetch
    /// runs on the current Tokio runtime, so the returned outcome only needs
    /// to be awaited to learn how the reload ended.
    ///
    /// 關閉分頁；若關閉的是目前文件，優先選取右側分頁，其次左側，皆無則顯示預設內容。
    pub fn close(&self, entry: &ProjectEntry) -> CloseOutcome {
        let mut state = self.lock();
        let was_active = self.is_active(entry);
        let index = self
            .inner
            .opened
            .with(|files| files.iter().position(|file| file.same_path(entry)));

        if index.is_some() {
            self.inner
                .opened
                .update(|files| files.retain(|file| !file.same_path(entry)));
        }
        state.statuses.remove(&entry.path);
        if matches!(&state.in_flight, Some(in_flight) if in_flight.entry.same_path(entry)) {
            state.in_flight = None;
        }

        if !was_active {
            debug!(path = %entry.path, "closed background tab");
            return CloseOutcome::Background;
        }

        let candidate = index.and_then(|index| {
            self.inner.opened.with(|files| {
                files
                    .get(index)
                    .or_else(|| index.checked_sub(1).and_then(|left| files.get(left)))
                    .cloned()
            })
        });

        match candidate {
            Some(next) => {
                debug!(closed = %entry.path, next = %next.path, "reselecting neighbour tab");
                let ticket = self.begin_load(&mut state, &next);
                drop(state);
                let pending = match Handle::try_current() {
                    Ok(runtime) => {
                        let session = self.clone();
                        let entry = next.clone();
                        PendingLoad::Spawned(
                            runtime.spawn(async move { session.fetch(ticket, entry).await }),
                        )
                    }
                    Err(_) => PendingLoad::Deferred {
                        session: self.clone(),
                        ticket,
                    },
                };
                CloseOutcome::Reselect(Reselection { next, pending })
            }
            None => {
                self.publish_fallback(&mut state);
                CloseOutcome::Fallback
            }
        }
    }

    /// Shows the fallback document without touching the open tabs.
    /// 顯示預設內容，不影響已開啟的分頁。
    pub fn open_undefined(&self) {
        let mut state = self.lock();
        self.publish_fallback(&mut state);
    }

    /// Issues a ticket and marks `entry` as the tab being loaded.
    fn begin_load(&self, state: &mut SessionState, entry: &ProjectEntry) -> u64 {
        state.issued += 1;
        let ticket = state.issued;
        state
            .statuses
            .insert(entry.path.clone(), TabStatus::Loading);
        state.in_flight = Some(InFlight {
            ticket,
            entry: entry.clone(),
        });
        ticket
    }

    async fn fetch(&self, ticket: u64, entry: ProjectEntry) -> Result<OpenOutcome, SessionError> {
        match self.inner.provider.read(&entry.path).await {
            Ok(content) => Ok(self.resolve(ticket, entry, content)),
            Err(source) => {
                self.fail(ticket, &entry, &source);
                Err(SessionError::ContentUnavailable {
                    path: entry.path,
                    source,
                })
            }
        }
    }

    fn publish_fallback(&self, state: &mut SessionState) {
        // Retire every outstanding ticket so a late fetch cannot replace the fallback.
        state.issued += 1;
        state.in_flight = None;
        debug!("showing fallback document");
        self.inner.current.set(Some(OpenDocument {
            file: ProjectEntry::placeholder(),
            content: self.inner.fallback.clone(),
        }));
    }

    fn resolve(&self, ticket: u64, entry: ProjectEntry, content: String) -> OpenOutcome {
        let mut state = self.lock();
        let still_open = self.is_open(&entry);
        if still_open {
            state.statuses.insert(entry.path.clone(), TabStatus::Ready);
        }
        if matches!(&state.in_flight, Some(in_flight) if in_flight.ticket == ticket) {
            state.in_flight = None;
        }

        let publish = match self.inner.policy {
            ResolutionPolicy::LastResolved => true,
            ResolutionPolicy::LatestRequest => still_open && ticket == state.issued,
        };
        if !publish {
            warn!(path = %entry.path, ticket, latest = state.issued, "discarding stale content");
            return OpenOutcome::Superseded;
        }

        debug!(path = %entry.path, bytes = content.len(), "publishing document");
        self.inner
            .current
            .set(Some(OpenDocument { file: entry, content }));
        OpenOutcome::Opened
    }

    fn fail(&self, ticket: u64, entry: &ProjectEntry, source: &ContentError) {
        let mut state = self.lock();
        warn!(path = %entry.path, error = %source, "content unavailable");
        if self.is_open(entry) {
            state.statuses.insert(
                entry.path.clone(),
                TabStatus::Unavailable {
                    reason: source.to_string(),
                },
            );
        }
        if matches!(&state.in_flight, Some(in_flight) if in_flight.ticket == ticket) {
            state.in_flight = None;
        }
    }

    fn is_open(&self, entry: &ProjectEntry) -> bool {
        self.inner
            .opened
            .with(|files| files.iter().any(|file| file.same_path(entry)))
    }

    fn is_active(&self, entry: &ProjectEntry) -> bool {
        self.inner.current.with(|current| {
            current
                .as_ref()
                .map(|doc| doc.file.same_path(entry))
                .unwrap_or(false)
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContentProvider;

    fn entry(name: &str) -> ProjectEntry {
        ProjectEntry::new(name, format!("/p/{name}"), name, "root", true)
    }

    fn session() -> DocumentSession {
        let provider = MemoryContentProvider::new()
            .with_file("/p/a", "alpha")
            .with_file("/p/b", "bravo")
            .with_file("/p/c", "charlie");
        DocumentSession::new(Arc::new(provider), "nothing open", ResolutionPolicy::default())
    }

    fn paths(session: &DocumentSession) -> Vec<String> {
        session
            .opened_files()
            .into_iter()
            .map(|file| file.path)
            .collect()
    }

    #[tokio::test]
    async fn open_appends_and_publishes() {
        let session = session();
        let outcome = session.open(entry("a")).await.unwrap();
        assert_eq!(outcome, OpenOutcome::Opened);
        assert_eq!(paths(&session), vec!["/p/a"]);
        let doc = session.current().unwrap();
        assert_eq!(doc.file.path, "/p/a");
        assert_eq!(doc.content, "alpha");
        assert_eq!(session.tab_status("/p/a"), Some(TabStatus::Ready));
        assert_eq!(session.active_slot(), ActiveSlot::Showing(doc));
    }

    #[tokio::test]
    async fn reopening_active_tab_is_noop() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        let outcome = session.open(entry("a")).await.unwrap();
        assert_eq!(outcome, OpenOutcome::AlreadyActive);
        assert_eq!(paths(&session), vec!["/p/a"]);
    }

    #[tokio::test]
    async fn reopening_background_tab_reactivates_without_duplicate() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        session.open(entry("b")).await.unwrap();
        session.open(entry("a")).await.unwrap();
        assert_eq!(paths(&session), vec!["/p/a", "/p/b"]);
        assert_eq!(session.current().unwrap().content, "alpha");
    }

    #[tokio::test]
    async fn membership_is_by_path_not_by_identity() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        let mut rescanned = entry("a");
        rescanned.hash = "fresh-hash".into();
        rescanned.opened = Some(true);
        session.open(rescanned).await.unwrap();
        assert_eq!(paths(&session), vec!["/p/a"]);
    }

    #[tokio::test]
    async fn empty_path_is_rejected_before_mutation() {
        let session = session();
        let err = session.open(ProjectEntry::placeholder()).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyPath));
        assert!(session.opened_files().is_empty());
    }

    #[tokio::test]
    async fn close_background_tab_keeps_active_document() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        session.open(entry("b")).await.unwrap();
        let outcome = session.close(&entry("a"));
        assert!(matches!(outcome, CloseOutcome::Background));
        assert_eq!(paths(&session), vec!["/p/b"]);
        assert_eq!(session.current().unwrap().file.path, "/p/b");
    }

    #[tokio::test]
    async fn close_only_tab_shows_fallback_synchronously() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        let outcome = session.close(&entry("a"));
        assert!(matches!(outcome, CloseOutcome::Fallback));
        assert!(session.opened_files().is_empty());
        let doc = session.current().unwrap();
        assert!(doc.is_fallback());
        assert!(doc.file.is_file);
        assert_eq!(doc.content, "nothing open");
        assert_eq!(session.active_slot(), ActiveSlot::Empty);
        assert_eq!(session.tab_status("/p/a"), None);
    }

    #[tokio::test]
    async fn close_active_prefers_right_neighbour() {
        let session = session();
        for name in ["a", "b", "c"] {
            session.open(entry(name)).await.unwrap();
        }
        session.open(entry("b")).await.unwrap();

        let outcome = session.close(&entry("b"));
        let next = match &outcome {
            CloseOutcome::Reselect(reselection) => reselection.next().path.clone(),
            other => panic!("expected reselection, got {other:?}"),
        };
        assert_eq!(next, "/p/c");
        assert_eq!(outcome.settle().await.unwrap(), Some(OpenOutcome::Opened));
        assert_eq!(paths(&session), vec!["/p/a", "/p/c"]);
        assert_eq!(session.current().unwrap().content, "charlie");
    }

    #[tokio::test]
    async fn close_last_active_falls_back_left() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        session.open(entry("b")).await.unwrap();

        let outcome = session.close(&entry("b"));
        outcome.settle().await.unwrap();
        assert_eq!(paths(&session), vec!["/p/a"]);
        assert_eq!(session.current().unwrap().file.path, "/p/a");
    }

    #[tokio::test]
    async fn closing_unknown_entry_leaves_tabs_alone() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        let outcome = session.close(&entry("zzz"));
        assert!(matches!(outcome, CloseOutcome::Background));
        assert_eq!(paths(&session), vec!["/p/a"]);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_tab_with_unavailable_status() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        let err = session.open(entry("missing")).await.unwrap_err();
        assert!(matches!(err, SessionError::ContentUnavailable { .. }));
        assert_eq!(paths(&session), vec!["/p/a", "/p/missing"]);
        assert!(matches!(
            session.tab_status("/p/missing"),
            Some(TabStatus::Unavailable { .. })
        ));
        assert_eq!(session.current().unwrap().file.path, "/p/a");
    }

    #[tokio::test]
    async fn closing_placeholder_while_fallback_shows_keeps_tabs() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        session.open_undefined();

        let outcome = session.close(&ProjectEntry::placeholder());
        assert!(matches!(outcome, CloseOutcome::Fallback));
        assert_eq!(paths(&session), vec!["/p/a"]);
        assert!(session.current().unwrap().is_fallback());
        assert_eq!(session.tab_status("/p/a"), Some(TabStatus::Ready));
    }

    #[test]
    fn reselection_without_runtime_loads_on_demand() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let session = session();
        runtime.block_on(async {
            session.open(entry("a")).await.unwrap();
            session.open(entry("b")).await.unwrap();
        });

        let outcome = session.close(&entry("b"));
        assert_eq!(session.active_slot(), ActiveSlot::Loading(entry("a")));
        assert_eq!(
            runtime.block_on(outcome.settle()).unwrap(),
            Some(OpenOutcome::Opened)
        );
        assert_eq!(session.current().unwrap().content, "alpha");
    }

    #[tokio::test]
    async fn open_undefined_does_not_touch_tabs() {
        let session = session();
        session.open(entry("a")).await.unwrap();
        session.open_undefined();
        assert_eq!(paths(&session), vec!["/p/a"]);
        assert!(session.current().unwrap().is_fallback());
    }
}
