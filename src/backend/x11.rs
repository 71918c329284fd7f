//! [`PlatformBackend`] for X11 desktops with an EWMH-compliant window
//! manager.
//!
//! Windows are listed from `_NET_CLIENT_LIST_STACKING`; geometry changes,
//! workspace moves and activation are requested from the window manager with
//! client messages sent to the root window, the way pagers do it.
//! Rectangles include the frame reported in `_NET_FRAME_EXTENTS`.

use super::BackendError;
use crate::eligibility::{WindowKind, WindowTraits};
use crate::geometry::Rect;
use crate::model::{IconImage, Wid, WindowInfo, Workspace, WorkspaceId};
use crate::traits::PlatformBackend;
use log::{debug, info};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use x11rb::atom_manager;
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ClientMessageEvent, ConnectionExt as _, EventMask, GetPropertyReply, ImageFormat,
    MapState, Window,
};
use x11rb::protocol::ErrorKind;
use x11rb::rust_connection::RustConnection;

atom_manager! {
    Atoms: AtomsCookie {
        UTF8_STRING,
        WM_CHANGE_STATE,
        _NET_CLIENT_LIST,
        _NET_CLIENT_LIST_STACKING,
        _NET_NUMBER_OF_DESKTOPS,
        _NET_DESKTOP_NAMES,
        _NET_ACTIVE_WINDOW,
        _NET_MOVERESIZE_WINDOW,
        _NET_FRAME_EXTENTS,
        _NET_WM_NAME,
        _NET_WM_ICON,
        _NET_WM_DESKTOP,
        _NET_WM_ALLOWED_ACTIONS,
        _NET_WM_ACTION_RESIZE,
        _NET_WM_STATE,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_FULLSCREEN,
        _NET_WM_STATE_SKIP_TASKBAR,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NORMAL,
        _NET_WM_WINDOW_TYPE_DIALOG,
        _NET_WM_WINDOW_TYPE_UTILITY,
        _NET_WM_WINDOW_TYPE_DESKTOP,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_WINDOW_TYPE_TOOLBAR,
        _NET_WM_WINDOW_TYPE_MENU,
        _NET_WM_WINDOW_TYPE_SPLASH,
        _NET_WM_WINDOW_TYPE_TOOLTIP,
        _NET_WM_WINDOW_TYPE_POPUP_MENU,
        _NET_WM_WINDOW_TYPE_DROPDOWN_MENU,
        _NET_WM_WINDOW_TYPE_COMBO,
        _NET_WM_WINDOW_TYPE_DND,
        _NET_WM_WINDOW_TYPE_NOTIFICATION,
    }
}

/// `_NET_WM_DESKTOP` value of windows shown on every desktop.
const ALL_DESKTOPS: u32 = 0xFFFF_FFFF;
/// Source indication for client messages: "pager".
const SOURCE_PAGER: u32 = 2;
/// `NorthWestGravity`: x/y place the outer frame.
const GRAVITY_NORTH_WEST: u32 = 1;
/// `IconicState` for `WM_CHANGE_STATE`.
const ICONIC_STATE: u32 = 3;
/// Icons are picked as close as possible to this edge length.
const ICON_SIZE: u32 = 32;

/// Frame widths `(left, right, top, bottom)`.
type Extents = (i32, i32, i32, i32);

/// X11 backend.
pub struct X11Backend {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
    atoms: Atoms,
    /// Icons by `WM_CLASS`, dropped at session end.
    icons: RefCell<HashMap<String, Option<Arc<IconImage>>>>,
}

fn connection_lost(e: ConnectionError) -> BackendError {
    BackendError::ConnectionLost(e.to_string())
}

fn reply_error(wid: Wid, e: ReplyError) -> BackendError {
    match e {
        ReplyError::ConnectionError(e) => connection_lost(e),
        ReplyError::X11Error(e)
            if matches!(e.error_kind, ErrorKind::Window | ErrorKind::Drawable) =>
        {
            BackendError::WindowGone(wid)
        }
        ReplyError::X11Error(e) => BackendError::Native(format!("{:?}", e.error_kind)),
    }
}

fn window_of(wid: Wid) -> Result<Window, BackendError> {
    Window::try_from(wid.0).map_err(|_| BackendError::WindowGone(wid))
}

/// Split a list of NUL-terminated strings.
fn nul_separated(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

/// Pick the icon closest to [`ICON_SIZE`] out of a `_NET_WM_ICON` value:
/// a sequence of `width, height, width * height ARGB words`.
fn pick_icon(words: &[u32]) -> Option<IconImage> {
    let mut best: Option<(u32, u32, &[u32])> = None;
    let mut rest = words;
    while let [w, h, tail @ ..] = rest {
        let len = (*w as usize).checked_mul(*h as usize)?;
        if *w == 0 || *h == 0 || tail.len() < len {
            break;
        }
        let (pixels, next) = tail.split_at(len);
        let closer = best.map_or(true, |(bw, _, _)| w.abs_diff(ICON_SIZE) < bw.abs_diff(ICON_SIZE));
        if closer {
            best = Some((*w, *h, pixels));
        }
        rest = next;
    }
    best.map(|(w, h, pixels)| IconImage::from_argb(w, h, pixels.iter().copied()))
}

impl X11Backend {
    /// Connect to `$DISPLAY` and intern the atoms the backend needs.
    pub fn connect() -> Result<Self, BackendError> {
        let (conn, screen_num) =
            RustConnection::connect(None).map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|s| s.root)
            .ok_or_else(|| BackendError::Unavailable(format!("no screen {}", screen_num)))?;
        let atoms = Atoms::new(&conn)
            .map_err(connection_lost)?
            .reply()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        info!("connected to X11 screen {}", screen_num);
        Ok(Self {
            conn,
            screen_num,
            root,
            atoms,
            icons: RefCell::new(HashMap::new()),
        })
    }

    fn property(
        &self,
        win: Window,
        property: u32,
        type_: impl Into<u32>,
    ) -> Option<GetPropertyReply> {
        self.conn
            .get_property(false, win, property, type_, 0, u32::MAX)
            .ok()?
            .reply()
            .ok()
            .filter(|r| !r.value.is_empty())
    }

    fn cardinals(&self, win: Window, property: u32) -> Vec<u32> {
        self.property(win, property, AtomEnum::CARDINAL)
            .and_then(|r| r.value32().map(|v| v.collect()))
            .unwrap_or_default()
    }

    fn atom_list(&self, win: Window, property: u32) -> Vec<u32> {
        self.property(win, property, AtomEnum::ATOM)
            .and_then(|r| r.value32().map(|v| v.collect()))
            .unwrap_or_default()
    }

    fn window_list(&self, property: u32) -> Vec<Window> {
        self.property(self.root, property, AtomEnum::WINDOW)
            .and_then(|r| r.value32().map(|v| v.collect()))
            .unwrap_or_default()
    }

    fn extents(&self, win: Window) -> Extents {
        match self.cardinals(win, self.atoms._NET_FRAME_EXTENTS)[..] {
            [l, r, t, b] => (l as i32, r as i32, t as i32, b as i32),
            _ => (0, 0, 0, 0),
        }
    }

    /// Client geometry in root coordinates.
    fn client_rect(&self, win: Window) -> Result<Rect, BackendError> {
        let wid = Wid(u64::from(win));
        let geometry = self
            .conn
            .get_geometry(win)
            .map_err(connection_lost)?
            .reply()
            .map_err(|e| reply_error(wid, e))?;
        let origin = self
            .conn
            .translate_coordinates(win, self.root, 0, 0)
            .map_err(connection_lost)?
            .reply()
            .map_err(|e| reply_error(wid, e))?;
        Ok(Rect::new(
            i32::from(origin.dst_x),
            i32::from(origin.dst_y),
            i32::from(geometry.width),
            i32::from(geometry.height),
        ))
    }

    /// Frame rectangle in root coordinates.
    fn frame_rect(&self, win: Window) -> Result<Rect, BackendError> {
        let client = self.client_rect(win)?;
        let (l, r, t, b) = self.extents(win);
        Ok(Rect::new(client.x - l, client.y - t, client.w + l + r, client.h + t + b))
    }

    fn title(&self, win: Window) -> String {
        self.property(win, self.atoms._NET_WM_NAME, self.atoms.UTF8_STRING)
            .or_else(|| self.property(win, AtomEnum::WM_NAME.into(), AtomEnum::STRING))
            .map(|r| String::from_utf8_lossy(&r.value).into_owned())
            .unwrap_or_default()
    }

    /// Class part of `WM_CLASS`.
    fn application(&self, win: Window) -> String {
        self.property(win, AtomEnum::WM_CLASS.into(), AtomEnum::STRING)
            .map(|r| nul_separated(&r.value))
            .and_then(|parts| parts.last().cloned())
            .unwrap_or_default()
    }

    fn icon(&self, win: Window, application: &str) -> Option<Arc<IconImage>> {
        if let Some(cached) = self.icons.borrow().get(application) {
            return cached.clone();
        }
        let icon = pick_icon(&self.cardinals(win, self.atoms._NET_WM_ICON)).map(Arc::new);
        if !application.is_empty() {
            self.icons
                .borrow_mut()
                .insert(application.to_string(), icon.clone());
        }
        icon
    }

    fn window_kind(&self, win: Window) -> WindowKind {
        let a = &self.atoms;
        let table = [
            (a._NET_WM_WINDOW_TYPE_NORMAL, WindowKind::Normal),
            (a._NET_WM_WINDOW_TYPE_DIALOG, WindowKind::Dialog),
            (a._NET_WM_WINDOW_TYPE_UTILITY, WindowKind::Utility),
            (a._NET_WM_WINDOW_TYPE_DESKTOP, WindowKind::Desktop),
            (a._NET_WM_WINDOW_TYPE_DOCK, WindowKind::Dock),
            (a._NET_WM_WINDOW_TYPE_TOOLBAR, WindowKind::Toolbar),
            (a._NET_WM_WINDOW_TYPE_MENU, WindowKind::Menu),
            (a._NET_WM_WINDOW_TYPE_SPLASH, WindowKind::Splash),
            (a._NET_WM_WINDOW_TYPE_TOOLTIP, WindowKind::Tooltip),
            (a._NET_WM_WINDOW_TYPE_POPUP_MENU, WindowKind::PopupMenu),
            (a._NET_WM_WINDOW_TYPE_DROPDOWN_MENU, WindowKind::DropdownMenu),
            (a._NET_WM_WINDOW_TYPE_COMBO, WindowKind::Combo),
            (a._NET_WM_WINDOW_TYPE_DND, WindowKind::Dnd),
            (a._NET_WM_WINDOW_TYPE_NOTIFICATION, WindowKind::Notification),
        ];
        // The first type the window manager understands wins.
        self.atom_list(win, a._NET_WM_WINDOW_TYPE)
            .into_iter()
            .find_map(|atom| table.iter().find(|(t, _)| *t == atom).map(|(_, k)| *k))
            .unwrap_or(WindowKind::Normal)
    }

    fn is_minimized(&self, win: Window) -> bool {
        self.atom_list(win, self.atoms._NET_WM_STATE)
            .contains(&self.atoms._NET_WM_STATE_HIDDEN)
    }

    fn traits(&self, win: Window) -> Option<WindowTraits> {
        let attributes = self.conn.get_window_attributes(win).ok()?.reply().ok()?;
        if attributes.override_redirect {
            return None;
        }
        let state = self.atom_list(win, self.atoms._NET_WM_STATE);
        Some(WindowTraits {
            kind: self.window_kind(win),
            fullscreen: state.contains(&self.atoms._NET_WM_STATE_FULLSCREEN),
            skip_taskbar: state.contains(&self.atoms._NET_WM_STATE_SKIP_TASKBAR),
            hidden: attributes.map_state != MapState::VIEWABLE,
            minimized: state.contains(&self.atoms._NET_WM_STATE_HIDDEN),
            ..WindowTraits::normal()
        })
    }

    fn is_resizable(&self, win: Window) -> bool {
        let actions = self.atom_list(win, self.atoms._NET_WM_ALLOWED_ACTIONS);
        actions.is_empty() || actions.contains(&self.atoms._NET_WM_ACTION_RESIZE)
    }

    fn desktop_count(&self) -> u32 {
        self.cardinals(self.root, self.atoms._NET_NUMBER_OF_DESKTOPS)
            .first()
            .copied()
            .unwrap_or(0)
    }

    fn screen(&self) -> u32 {
        u32::try_from(self.screen_num).unwrap_or(0) + 1
    }

    fn workspace_id(&self, desktop: u32) -> WorkspaceId {
        if desktop == ALL_DESKTOPS {
            WorkspaceId::new(self.screen(), 0)
        } else {
            WorkspaceId::new(self.screen(), desktop + 1)
        }
    }

    /// Send an EWMH client message about `win` to the root window.
    fn client_message(&self, win: Window, type_: u32, data: [u32; 5]) -> Result<(), BackendError> {
        let event = ClientMessageEvent::new(32, win, type_, data);
        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                event,
            )
            .map_err(connection_lost)?;
        self.conn.flush().map_err(connection_lost)
    }

    fn move_resize(&self, wid: Wid, rect: Rect, resize: bool) -> Result<(), BackendError> {
        let win = window_of(wid)?;
        // Fails with WindowGone for stale handles.
        self.client_rect(win)?;
        let (l, r, t, b) = self.extents(win);
        let mut flags = GRAVITY_NORTH_WEST | 1 << 8 | 1 << 9 | SOURCE_PAGER << 12;
        if resize {
            flags |= 1 << 10 | 1 << 11;
        }
        let w = (rect.w - l - r).max(1);
        let h = (rect.h - t - b).max(1);
        debug!("_NET_MOVERESIZE_WINDOW {} -> {}", wid, rect);
        self.client_message(
            win,
            self.atoms._NET_MOVERESIZE_WINDOW,
            [flags, rect.x as u32, rect.y as u32, w as u32, h as u32],
        )
    }

    fn capture(&self, win: Window) -> Option<IconImage> {
        let geometry = self.conn.get_geometry(win).ok()?.reply().ok()?;
        let image = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, win, 0, 0, geometry.width, geometry.height, !0)
            .ok()?
            .reply()
            .ok()?;
        if !matches!(image.depth, 24 | 32) {
            return None;
        }
        let (w, h) = (u32::from(geometry.width), u32::from(geometry.height));
        // Z-pixmaps of depth 24/32 are BGRX words.
        let pixels = image
            .data
            .chunks_exact(4)
            .map(|px| 0xff00_0000 | u32::from_le_bytes([px[0], px[1], px[2], 0]));
        Some(IconImage::from_argb(w, h, pixels))
    }
}

impl PlatformBackend for X11Backend {
    type Handle = Window;

    fn enumerate_windows(&self) -> Vec<Window> {
        let mut windows = self.window_list(self.atoms._NET_CLIENT_LIST_STACKING);
        if windows.is_empty() {
            windows = self.window_list(self.atoms._NET_CLIENT_LIST);
        }
        // Stacking order is bottom-to-top.
        windows.reverse();
        windows
    }

    fn is_eligible(&self, win: &Window) -> bool {
        match self.traits(*win).map(|t| t.rejection()) {
            Some(None) => true,
            Some(Some(reason)) => {
                debug!("skipping {:#x}: {}", win, reason);
                false
            }
            None => false,
        }
    }

    fn inspect(&self, win: &Window) -> Option<WindowInfo> {
        let win = *win;
        let rect = self.frame_rect(win).ok()?;
        let name = self.application(win);
        Some(WindowInfo {
            wid: Wid(u64::from(win)),
            rect,
            resizable: self.is_resizable(win),
            restored: !self.is_minimized(win),
            title: self.title(win),
            icon: self.icon(win, &name),
            name,
            workspace: self.workspace_for_window(&win),
        })
    }

    fn workspace_for_window(&self, win: &Window) -> WorkspaceId {
        match self.cardinals(*win, self.atoms._NET_WM_DESKTOP).first() {
            Some(&desktop) => self.workspace_id(desktop),
            None => WorkspaceId::new(self.screen(), 1),
        }
    }

    fn enumerate_monitors(&self) -> Vec<Rect> {
        let monitors = self
            .conn
            .randr_get_monitors(self.root, true)
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|r| r.monitors)
            .unwrap_or_default();
        if monitors.is_empty() {
            // No RandR: the whole screen is one monitor.
            return self
                .conn
                .setup()
                .roots
                .get(self.screen_num)
                .map(|s| {
                    vec![Rect::new(
                        0,
                        0,
                        i32::from(s.width_in_pixels),
                        i32::from(s.height_in_pixels),
                    )]
                })
                .unwrap_or_default();
        }
        monitors
            .iter()
            .map(|m| {
                Rect::new(
                    i32::from(m.x),
                    i32::from(m.y),
                    i32::from(m.width),
                    i32::from(m.height),
                )
            })
            .collect()
    }

    fn enumerate_workspaces(&self) -> Vec<Workspace> {
        let names = self
            .property(self.root, self.atoms._NET_DESKTOP_NAMES, self.atoms.UTF8_STRING)
            .map(|r| nul_separated(&r.value))
            .unwrap_or_default();
        (0..self.desktop_count())
            .map(|desktop| Workspace {
                id: self.workspace_id(desktop),
                label: names
                    .get(desktop as usize)
                    .cloned()
                    .unwrap_or_else(|| format!("Workspace {}", desktop + 1)),
            })
            .collect()
    }

    fn supports_workspaces(&self) -> bool {
        self.desktop_count() > 1
    }

    fn move_window(&self, wid: Wid, rect: Rect) -> Result<(), BackendError> {
        self.move_resize(wid, rect, false)
    }

    fn move_and_resize(&self, wid: Wid, rect: Rect) -> Result<(), BackendError> {
        self.move_resize(wid, rect, true)
    }

    fn move_to_workspace(&self, wid: Wid, workspace: WorkspaceId) -> Result<(), BackendError> {
        let win = window_of(wid)?;
        let ordinal = workspace.ordinal();
        if workspace.screen() != self.screen() || ordinal == 0 || ordinal > self.desktop_count() {
            return Err(BackendError::UnknownWorkspace(workspace));
        }
        self.client_rect(win)?;
        self.client_message(win, self.atoms._NET_WM_DESKTOP, [ordinal - 1, SOURCE_PAGER, 0, 0, 0])
    }

    fn minimize(&self, wid: Wid) -> Result<(), BackendError> {
        let win = window_of(wid)?;
        self.client_rect(win)?;
        self.client_message(win, self.atoms.WM_CHANGE_STATE, [ICONIC_STATE, 0, 0, 0, 0])
    }

    fn activate(&self, wid: Wid) {
        let Ok(win) = window_of(wid) else { return };
        let data = [SOURCE_PAGER, x11rb::CURRENT_TIME, 0, 0, 0];
        if let Err(e) = self.client_message(win, self.atoms._NET_ACTIVE_WINDOW, data) {
            debug!("activate {}: {}", wid, e);
        }
    }

    fn move_cursor(&self, x: i32, y: i32) {
        let clamp = |v: i32| v.clamp(i16::MIN.into(), i16::MAX.into());
        let (x, y) = (clamp(x), clamp(y));
        let warped = self
            .conn
            .warp_pointer(x11rb::NONE, self.root, 0, 0, 0, 0, x as i16, y as i16)
            .map(|_| ())
            .and_then(|_| self.conn.flush());
        if let Err(e) = warped {
            debug!("warp pointer: {}", e);
        }
    }

    fn grab_window_screenshot(&self, wid: Wid) -> Arc<IconImage> {
        let captured = window_of(wid).ok().and_then(|win| self.capture(win));
        Arc::new(captured.unwrap_or_else(|| IconImage::placeholder(1, 1)))
    }

    fn end_session(&self) {
        self.icons.borrow_mut().clear();
    }
}
