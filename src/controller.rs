//! The interaction state machine.
//!
//! [`Controller`] walks the [`WindowsCollection`] one window at a time.  For
//! each window it tracks a [`Phase`]:
//!
//! * `Locate(corner)`: the pointer says where `corner` of the window goes.
//!   A left click places it; resizable windows then enter `Resize`.
//! * `Resize(corner)`: the corner placed while locating stays pinned and the
//!   pointer drags the opposite one.  A left click commits.
//! * `Other`: the mouse is released to the desktop.
//!
//! Pointer coordinates are mapped to the tracked corner with a fixed offset
//! of `pointer.shift_cursor` pixels on both axes, so the cursor sits just
//! inside the ghost instead of on its border.
//!
//! Backend failures never leave the controller: they are logged, turned into
//! a [`Status`] on the published [`DisplayState`] and into a transition.

use crate::backend::BackendError;
use crate::collection::{CollectionCursor, WindowsCollection};
use crate::command::{Command, Key};
use crate::config::Config;
use crate::geometry::{Corner, Rect};
use crate::model::{Change, IconImage, Wid, WindowModel, WorkspaceId};
use crate::snapping::{
    settle, snapping_sources, sources_for_corner, SnapOffset, SnappingIndex, SnappingSource,
};
use crate::traits::{DisplayState, Phase, PlatformBackend, Presenter, Status};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// What the event loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The session is over.  `save` asks the caller to persist
    /// [`WindowsCollection::export`].
    Shutdown { save: bool },
}

/// Commit steps that already reached the backend for the current window.
#[derive(Debug, Clone, Copy, Default)]
struct Applied {
    workspace: Option<WorkspaceId>,
    geometry: Option<Rect>,
}

/// Drives one arrangement session.
///
/// The controller is generic over any [`PlatformBackend`], so the whole
/// state machine runs against a recording mock in tests.
pub struct Controller<B: PlatformBackend> {
    backend: B,
    collection: WindowsCollection,
    cursor: CollectionCursor,
    config: Config,
    monitors: Vec<Rect>,
    index: SnappingIndex,
    phase: Phase,
    /// Where the current window would go if committed now.
    ghost: Option<Rect>,
    /// Pinned corner while resizing.
    anchor: Option<(i32, i32)>,
    /// Ghost at the moment the window was placed, before resizing.
    placed: Option<Rect>,
    screenshot: Option<Arc<IconImage>>,
    /// Survives a fatal failure so a retry does not repeat backend calls.
    applied: Applied,
    status: Status,
    presenter: Option<Presenter>,
    done: bool,
}

impl<B: PlatformBackend> Controller<B> {
    /// Create a controller over `collection`.  Nothing happens until
    /// [`start`](Self::start).
    pub fn new(backend: B, collection: WindowsCollection, config: Config) -> Self {
        let monitors = backend.enumerate_monitors();
        let index = SnappingIndex::build(&collection, &monitors, config.snapping.pixels);
        let cursor = collection.cursor();
        Self {
            backend,
            collection,
            cursor,
            config,
            monitors,
            index,
            phase: Phase::Other,
            ghost: None,
            anchor: None,
            placed: None,
            screenshot: None,
            applied: Applied::default(),
            status: Status::Ok,
            presenter: None,
            done: false,
        }
    }

    /// Attach the channel that receives a [`DisplayState`] after every
    /// accepted command.
    pub fn set_presenter(&mut self, tx: Presenter) {
        self.presenter = Some(tx);
    }

    pub fn collection(&self) -> &WindowsCollection {
        &self.collection
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ghost(&self) -> Option<Rect> {
        self.ghost
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Window currently being arranged.
    pub fn current(&self) -> Option<&WindowModel> {
        if self.done {
            return None;
        }
        self.cursor.current(&self.collection)
    }

    /// Enter the first window.
    pub fn start(&mut self) -> Flow {
        info!("arranging {} windows", self.collection.size());
        let flow = self.advance();
        self.publish();
        flow
    }

    /// Process one [`Command`].
    pub fn handle(&mut self, cmd: Command) -> Flow {
        let Some(wid) = self.current().map(WindowModel::wid) else {
            debug!("ignoring {:?}: session is over", cmd);
            return Flow::Shutdown { save: false };
        };
        self.status = Status::Ok;

        let flow = match cmd {
            Command::PointerMove { x, y } => {
                self.track(x, y);
                Flow::Continue
            }
            Command::ClickLeft { x, y } => self.click_left(x, y),
            Command::ClickMiddle { x, y } => self.click_middle(x, y),
            Command::ClickRight { .. } => {
                info!("skipping {}", wid);
                self.advance()
            }
            Command::Scroll { dx, dy } => {
                self.scroll(dx, dy);
                Flow::Continue
            }
            Command::Key(Key::Escape) => {
                info!("aborted, discarding pending change of {}", wid);
                self.collection.set_changed(wid, Change::Reset);
                self.finish(false)
            }
            Command::Key(Key::Space) => {
                if self.phase == Phase::Other {
                    self.recapture();
                } else {
                    debug!("releasing the mouse");
                    self.release();
                }
                Flow::Continue
            }
            Command::Key(key @ Key::Digit(_)) => {
                let workspace = key
                    .workspace_slot()
                    .and_then(|slot| self.backend.enumerate_workspaces().get(slot).map(|w| w.id));
                match workspace {
                    Some(ws) => self.select_workspace(wid, ws),
                    None => debug!("no workspace for key {}", key),
                }
                Flow::Continue
            }
            Command::WorkspaceActivated(ws) => {
                self.select_workspace(wid, ws);
                Flow::Continue
            }
            Command::ListedWindowActivated(target) => self.jump_to(target),
        };

        self.publish();
        flow
    }

    //  Pointer handling

    fn point(&self, x: i32, y: i32) -> (i32, i32) {
        let shift = self.config.pointer.shift_cursor;
        (x.saturating_sub(shift), y.saturating_sub(shift))
    }

    /// Put the cursor at `shift_cursor` from `corner`.
    fn teleport(&self, corner: (i32, i32)) {
        let shift = self.config.pointer.shift_cursor;
        self.backend
            .move_cursor(corner.0.saturating_add(shift), corner.1.saturating_add(shift));
    }

    fn track(&mut self, x: i32, y: i32) {
        let point = self.point(x, y);
        match self.phase {
            Phase::Locate(corner) => {
                self.locate(corner, point);
            }
            Phase::Resize(corner) => {
                self.drag(corner, point);
            }
            Phase::Other => {}
        }
    }

    /// Settled nudge against the current workspace.  `candidates(px, dx, dy)`
    /// returns the ghost's bands after moving it by `(dx, dy)`.
    fn snap<F>(&self, candidates: F) -> SnapOffset
    where
        F: Fn(i32, i32, i32) -> Vec<SnappingSource>,
    {
        let (Some(px), Some(model)) = (self.config.snap_pixels(), self.current()) else {
            return SnapOffset::default();
        };
        let exclude = (!self.config.snapping.include_self).then_some(model.wid());
        let targets = self.index.targets(model.target_workspace(), exclude);
        settle(&targets, px, |dx, dy| candidates(px, dx, dy))
    }

    /// Move the ghost so `corner` sits at `point`, then snap it.
    ///
    /// A snap that latches two edges around another corner makes that the
    /// tracked corner.  The cursor follows whenever the snap moved it.
    fn locate(&mut self, corner: Corner, point: (i32, i32)) -> Rect {
        let (w, h) = self.ghost.map_or((0, 0), |g| g.size());
        let rect = Rect::with_corner_at(w, h, corner, point);
        let snap = self.snap(|px, dx, dy| {
            snapping_sources(&rect.translated(dx, dy), px, None).to_vec()
        });
        let rect = rect.translated(snap.dx, snap.dy);
        let tracked = snap.corner.unwrap_or(corner);
        if tracked != corner {
            debug!("corner snap: now tracking {}", tracked);
        }
        self.phase = Phase::Locate(tracked);
        self.ghost = Some(rect);
        if !snap.is_zero() || tracked != corner {
            self.teleport(rect.corner(tracked));
        }
        rect
    }

    /// Stretch the ghost from the anchor to `point`, snapping the dragged
    /// corner.  `None` if `point` is on the wrong side of the anchor.
    fn drag(&mut self, tracked: Corner, point: (i32, i32)) -> Option<Rect> {
        let anchor = self.anchor?;
        let rect = Rect::from_corners(anchor, tracked, point)?;
        let snap = self.snap(|px, dx, dy| {
            let moved = (point.0.saturating_add(dx), point.1.saturating_add(dy));
            Rect::from_corners(anchor, tracked, moved)
                .map_or_else(Vec::new, |r| sources_for_corner(&r, tracked, px))
        });
        let snapped = (point.0.saturating_add(snap.dx), point.1.saturating_add(snap.dy));
        let (rect, point_used) = match Rect::from_corners(anchor, tracked, snapped) {
            Some(r) => (r, snapped),
            None => (rect, point),
        };
        self.ghost = Some(rect);
        if point_used != point {
            self.teleport(point_used);
        }
        Some(rect)
    }

    fn click_left(&mut self, x: i32, y: i32) -> Flow {
        let point = self.point(x, y);
        match self.phase {
            Phase::Locate(corner) => {
                let ghost = self.locate(corner, point);
                let (wid, resizable) = match self.current() {
                    Some(m) => (m.wid(), m.resizable()),
                    None => return Flow::Continue,
                };
                if !resizable {
                    return self.commit(ghost);
                }
                let pinned = self.phase.corner().unwrap_or(corner);
                let tracked = pinned.opposite();
                self.anchor = Some(ghost.corner(pinned));
                self.placed = Some(ghost);
                self.phase = Phase::Resize(tracked);
                self.screenshot = Some(self.backend.grab_window_screenshot(wid));
                self.teleport(ghost.corner(tracked));
                debug!("{} placed at {}, resizing from {}", wid, ghost, pinned);
                Flow::Continue
            }
            Phase::Resize(tracked) => match self.drag(tracked, point) {
                Some(rect) => self.commit_resize(tracked, rect.corner(tracked)),
                None => {
                    debug!("resize to {:?} is not past the pinned corner", point);
                    self.status = Status::InvalidResize;
                    Flow::Continue
                }
            },
            Phase::Other => Flow::Continue,
        }
    }

    /// Place without resizing.
    fn click_middle(&mut self, x: i32, y: i32) -> Flow {
        match self.phase {
            Phase::Locate(corner) => {
                let ghost = self.locate(corner, self.point(x, y));
                self.commit(ghost)
            }
            Phase::Resize(_) => match self.placed {
                Some(placed) => self.commit(placed),
                None => Flow::Continue,
            },
            Phase::Other => Flow::Continue,
        }
    }

    /// Size the window from its placed rectangle to `end` and commit.
    fn commit_resize(&mut self, tracked: Corner, end: (i32, i32)) -> Flow {
        let (Some(wid), Some(placed)) = (self.current().map(WindowModel::wid), self.placed) else {
            return Flow::Continue;
        };
        self.collection.set_changed(wid, Change::Rect(placed));
        let sized = self
            .collection
            .lookup(wid)
            .and_then(|m| m.rect_from_ending_xy(tracked.opposite(), end.0, end.1));
        match sized {
            Some(rect) => {
                let rect = self.grow_to_minimum(rect, tracked);
                self.commit(rect)
            }
            None => {
                self.collection.set_changed(wid, Change::ClearRect);
                self.status = Status::InvalidResize;
                Flow::Continue
            }
        }
    }

    /// Enlarge `rect` to the minimum size, keeping the pinned corner.
    fn grow_to_minimum(&self, rect: Rect, tracked: Corner) -> Rect {
        let limits = self.collection.limits();
        let w = rect.w.max(limits.min_width);
        let h = rect.h.max(limits.min_height);
        if (w, h) == rect.size() {
            return rect;
        }
        let pinned = tracked.opposite();
        Rect::with_corner_at(w, h, pinned, rect.corner(pinned))
    }

    fn scroll(&mut self, dx: i32, dy: i32) {
        let Phase::Locate(corner) = self.phase else {
            return;
        };
        let step = if dy != 0 { dy } else { dx };
        let next = match step.signum() {
            1 => corner.next(),
            -1 => corner.previous(),
            _ => return,
        };
        self.phase = Phase::Locate(next);
        if let Some(ghost) = self.ghost {
            self.teleport(ghost.corner(next));
        }
    }

    //  Phase changes

    fn release(&mut self) {
        self.phase = Phase::Other;
        self.anchor = None;
        self.placed = None;
        self.screenshot = None;
    }

    /// Take the mouse back: locate the top-left corner of the ghost.
    fn recapture(&mut self) {
        self.release();
        self.phase = Phase::Locate(Corner::TopLeft);
        if let Some(ghost) = self.ghost {
            self.teleport(ghost.corner(Corner::TopLeft));
        }
    }

    fn select_workspace(&mut self, wid: Wid, workspace: WorkspaceId) {
        info!("{} goes to workspace {}", wid, workspace);
        self.collection.set_changed(wid, Change::Workspace(workspace));
        if self.phase == Phase::Other {
            self.recapture();
        }
    }

    fn jump_to(&mut self, target: Wid) -> Flow {
        if !self.cursor.repoint(&self.collection, target) {
            debug!("{} is not waiting to be arranged", target);
            return Flow::Continue;
        }
        info!("jumping to {}", target);
        self.backend.activate(target);
        self.advance()
    }

    /// Move on to the next window, or finish.
    fn advance(&mut self) -> Flow {
        self.release();
        self.applied = Applied::default();
        let next = self
            .cursor
            .advance(&self.collection)
            .map(|m| (m.wid(), m.target_rect()));
        match next {
            Some((wid, rect)) => {
                debug!("arranging {} at {}", wid, rect);
                self.phase = Phase::Locate(Corner::TopLeft);
                self.ghost = Some(rect);
                self.teleport(rect.corner(Corner::TopLeft));
                Flow::Continue
            }
            None => self.finish(self.collection.has_changes()),
        }
    }

    fn finish(&mut self, save: bool) -> Flow {
        self.release();
        self.ghost = None;
        self.done = true;
        info!(
            "session finished, {} windows changed",
            self.collection.export().len()
        );
        Flow::Shutdown { save }
    }

    //  Commit

    /// Record `rect` as the pending rectangle of the current window and
    /// apply everything pending to the backend.
    fn commit(&mut self, rect: Rect) -> Flow {
        let Some(wid) = self.current().map(WindowModel::wid) else {
            return Flow::Continue;
        };
        if !self.collection.set_changed(wid, Change::Rect(rect)) {
            warn!("{} rejected {}", wid, rect);
        }
        match self.apply(wid) {
            Ok(()) => {
                info!("committed {}", wid);
                self.rebuild_index();
                self.advance()
            }
            Err(e) if e.is_transient() => {
                warn!("could not commit {}: {}", wid, e);
                // Keep whatever the backend already carried out.
                let undo = match (self.applied.workspace, self.applied.geometry) {
                    (_, Some(_)) => None,
                    (Some(_), None) => Some(Change::ClearRect),
                    (None, None) => Some(Change::Reset),
                };
                if let Some(change) = undo {
                    self.collection.set_changed(wid, change);
                }
                self.status = Status::BackendError(e.to_string());
                self.rebuild_index();
                self.advance()
            }
            Err(e) => {
                error!("backend failure while committing {}: {}", wid, e);
                self.status = Status::BackendError(e.to_string());
                self.recapture();
                Flow::Continue
            }
        }
    }

    /// Backend calls for one window: workspace, then geometry, then
    /// minimize if the window started out minimized.  Steps recorded in
    /// `applied` are not repeated.
    fn apply(&mut self, wid: Wid) -> Result<(), BackendError> {
        let model = self
            .collection
            .lookup(wid)
            .ok_or(BackendError::WindowGone(wid))?;
        let workspace = model.changed_ws().filter(|ws| *ws != model.workspace());
        let geometry = model.changed();
        let resized = model.is_resized();
        let restored = model.restored();

        if let Some(ws) = workspace.filter(|ws| self.applied.workspace != Some(*ws)) {
            if self.backend.supports_workspaces() {
                self.backend.move_to_workspace(wid, ws)?;
                self.applied.workspace = Some(ws);
            } else {
                debug!("no workspaces here, {} stays where it is", wid);
            }
        }
        if let Some(rect) = geometry.filter(|r| self.applied.geometry != Some(*r)) {
            if resized {
                self.backend.move_and_resize(wid, rect)?;
            } else {
                self.backend.move_window(wid, rect)?;
            }
            self.applied.geometry = Some(rect);
        }
        if !restored {
            self.backend.minimize(wid)?;
        }
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.index =
            SnappingIndex::build(&self.collection, &self.monitors, self.config.snapping.pixels);
    }

    //  Presentation

    fn publish(&self) {
        let Some(tx) = &self.presenter else {
            return;
        };
        let state = match self.current() {
            None => DisplayState::finished(),
            Some(model) => DisplayState {
                phase: self.phase,
                wid: Some(model.wid()),
                ghost: self.ghost,
                screenshot: self.screenshot.clone(),
                title: model.title().to_string(),
                application: model.name().to_string(),
                icon: model.icon().cloned(),
                workspace: Some(model.target_workspace()),
                remaining: self.cursor.remaining(&self.collection),
                status: self.status.clone(),
            },
        };
        if tx.send(state).is_err() {
            debug!("presenter is gone");
        }
    }
}

//  Tests
