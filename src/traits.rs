//! Core traits that decouple the controller from any specific windowing
//! system or transport mechanism.
//!
//! Every concrete backend (X11, Win32, macOS, a test harness, …) implements
//! [`PlatformBackend`]; every inbound transport implements
//! [`CommandSource`].  The [`Controller`](crate::controller::Controller) only
//! depends on these abstractions and talks to the presentation layer through
//! [`DisplayState`] snapshots.

use crate::backend::BackendError;
use crate::collection::ListingEntry;
use crate::command::Command;
use crate::geometry::{Corner, Rect};
use crate::model::{IconImage, Wid, WindowInfo, Workspace, WorkspaceId};
use serde::Serialize;
use std::fmt;
use std::sync::{mpsc, Arc};

/// Abstraction over a native windowing system.
///
/// All calls are synchronous.  Query methods never fail: on error they
/// return an empty list, `None` or a placeholder.  Mutating methods return a
/// [`BackendError`] that the caller classifies with
/// [`is_transient`](BackendError::is_transient).
pub trait PlatformBackend {
    /// Opaque native window reference produced by enumeration.
    type Handle: Clone + fmt::Debug;

    /// Top-level windows in stacking order, topmost first.
    fn enumerate_windows(&self) -> Vec<Self::Handle>;

    /// Whether the window is one the user would switch to: applicable type
    /// and a valid state.
    fn is_eligible(&self, handle: &Self::Handle) -> bool;

    /// Capture the window's attributes, or `None` to reject it.
    fn inspect(&self, handle: &Self::Handle) -> Option<WindowInfo>;

    fn workspace_for_window(&self, handle: &Self::Handle) -> WorkspaceId;

    /// Monitor rectangles in virtual-screen coordinates.
    fn enumerate_monitors(&self) -> Vec<Rect>;

    fn enumerate_workspaces(&self) -> Vec<Workspace>;

    /// `false` on systems without virtual desktops.  Workspace changes are
    /// not committed there.
    fn supports_workspaces(&self) -> bool {
        true
    }

    /// Move without resizing.
    fn move_window(&self, wid: Wid, rect: Rect) -> Result<(), BackendError>;

    fn move_and_resize(&self, wid: Wid, rect: Rect) -> Result<(), BackendError>;

    fn move_to_workspace(&self, wid: Wid, workspace: WorkspaceId) -> Result<(), BackendError>;

    fn minimize(&self, wid: Wid) -> Result<(), BackendError>;

    /// Raise and focus.  Best effort.
    fn activate(&self, wid: Wid);

    /// Warp the pointer to `(x, y)`.  Best effort.
    fn move_cursor(&self, x: i32, y: i32);

    /// Current contents of the window, or a placeholder on failure.
    fn grab_window_screenshot(&self, wid: Wid) -> Arc<IconImage>;

    /// Drop per-session caches.
    fn end_session(&self) {}
}

//  Display state

/// Interaction phase for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The pointer places the given corner of the window.
    Locate(Corner),
    /// The opposite corner is pinned; the pointer drags the given one.
    Resize(Corner),
    /// The mouse is released to the desktop.
    Other,
}

impl Phase {
    /// Corner the pointer currently drives, if any.
    pub fn corner(self) -> Option<Corner> {
        match self {
            Phase::Locate(c) | Phase::Resize(c) => Some(c),
            Phase::Other => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Locate(c) => write!(f, "locate({})", c),
            Phase::Resize(c) => write!(f, "resize({})", c),
            Phase::Other => write!(f, "other"),
        }
    }
}

/// Outcome of the last event, for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Status {
    Ok,
    /// A resize click was not south-east of the pinned corner.
    InvalidResize,
    /// The backend refused a commit.
    BackendError(String),
    /// No windows left.
    Finished,
}

/// Snapshot published after every accepted event.
///
/// The presentation layer renders the ghost from this; pixel payloads are
/// shared, not copied.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayState {
    pub phase: Phase,
    pub wid: Option<Wid>,
    pub ghost: Option<Rect>,
    pub screenshot: Option<Arc<IconImage>>,
    pub title: String,
    pub application: String,
    pub icon: Option<Arc<IconImage>>,
    pub workspace: Option<WorkspaceId>,
    pub remaining: Vec<ListingEntry>,
    pub status: Status,
}

impl DisplayState {
    /// Terminal snapshot once the session is over.
    pub fn finished() -> Self {
        Self {
            phase: Phase::Other,
            wid: None,
            ghost: None,
            screenshot: None,
            title: String::new(),
            application: String::new(),
            icon: None,
            workspace: None,
            remaining: Vec::new(),
            status: Status::Finished,
        }
    }
}

//  Command Source

/// A source of [`Command`]s.
///
/// Implementations listen on some transport (a Unix socket, stdin, an
/// in-memory channel, …) and forward parsed commands into the provided
/// [`mpsc::Sender`].
///
/// # Contract
///
/// * [`run`](CommandSource::run) **blocks** until the source is exhausted or
///   an unrecoverable error occurs.
/// * Each received command must be sent through `sink` exactly once.
/// * Implementations must be [`Send`] so they can run on a dedicated thread.
pub trait CommandSource: Send {
    /// The error type produced by this source.
    type Error: std::error::Error + Send + 'static;

    /// Start listening and forward every incoming [`Command`] into `sink`.
    fn run(&mut self, sink: mpsc::Sender<Command>) -> Result<(), Self::Error>;
}

/// Where the controller publishes [`DisplayState`] snapshots.
pub type Presenter = mpsc::Sender<DisplayState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Key;

    #[derive(Debug, thiserror::Error)]
    #[error("mock error")]
    struct MockError;

    /// A test double that emits a fixed sequence of commands.
    struct MockSource {
        commands: Vec<Command>,
    }

    impl CommandSource for MockSource {
        type Error = MockError;

        fn run(&mut self, sink: mpsc::Sender<Command>) -> Result<(), MockError> {
            for cmd in self.commands.drain(..) {
                let _ = sink.send(cmd);
            }
            Ok(())
        }
    }

    #[test]
    fn mock_source_emits_commands() {
        let mut src = MockSource {
            commands: vec![
                Command::PointerMove { x: 10, y: 20 },
                Command::Key(Key::Escape),
            ],
        };
        let (tx, rx) = mpsc::channel();
        src.run(tx).unwrap();
        let cmds: Vec<Command> = rx.try_iter().collect();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0], Command::PointerMove { x: 10, y: 20 });
        assert_eq!(cmds[1], Command::Key(Key::Escape));
    }

    #[test]
    fn phase_exposes_corner() {
        assert_eq!(Phase::Locate(Corner::TopRight).corner(), Some(Corner::TopRight));
        assert_eq!(Phase::Other.corner(), None);
        assert_eq!(Phase::Resize(Corner::BottomRight).to_string(), "resize(bottom-right)");
    }

    #[test]
    fn status_serialises_with_kind() {
        let json = serde_json::to_value(Status::BackendError("gone".into())).unwrap();
        assert_eq!(json["kind"], "backend_error");
        assert_eq!(json["message"], "gone");
        let json = serde_json::to_value(DisplayState::finished()).unwrap();
        assert_eq!(json["status"]["kind"], "finished");
        assert_eq!(json["phase"], "other");
    }
}
