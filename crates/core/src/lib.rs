//! Document/tab state layer for TabShell.
//! TabShell 的文件與分頁狀態層。

pub mod content;
pub mod decode;
pub mod observable;
pub mod session;
pub mod shell;

pub use content::{ContentError, ContentProvider, FsContentProvider, MemoryContentProvider};
pub use decode::{decode_text, DecodedText};
pub use observable::Observable;
pub use session::{
    ActiveSlot, CloseOutcome, DocumentSession, OpenDocument, OpenOutcome, Reselection,
    SessionError, TabStatus,
};
pub use shell::{ShellError, ShellState};
pub use tabshell_project::{ProjectEntry, ProjectStructure};
pub use tabshell_settings::{DecodePolicy, ResolutionPolicy};
