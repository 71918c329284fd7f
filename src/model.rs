//! Per-window records and the identifiers they carry.
//!
//! A [`WindowModel`] is captured once from the platform backend and never
//! changes its identity or captured attributes afterwards.  The only mutable
//! part is the *pending change*: a replacement rectangle (`changed`) and a
//! replacement workspace (`changed_ws`), both written exclusively through
//! [`WindowModel::set_changed`].

use crate::geometry::{Corner, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Platform-opaque window handle, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wid(pub u64);

impl fmt::Display for Wid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Workspace identifier, `1000 * screen + ordinal`.
///
/// Platforms without virtual desktops always report `WorkspaceId(0)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub u32);

impl WorkspaceId {
    const SCREEN_FACTOR: u32 = 1000;

    pub fn new(screen: u32, ordinal: u32) -> Self {
        Self(screen * Self::SCREEN_FACTOR + ordinal)
    }

    pub fn screen(self) -> u32 {
        self.0 / Self::SCREEN_FACTOR
    }

    pub fn ordinal(self) -> u32 {
        self.0 % Self::SCREEN_FACTOR
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A workspace as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub label: String,
}

/// An RGBA bitmap: window icons and window screenshots.
///
/// Shared through [`Arc`] so the presentation layer receives a reference to
/// the bitmap owned by the model rather than a copy.  Only the dimensions
/// are serialised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IconImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, `width * height * 4` bytes.
    #[serde(skip)]
    pub pixels: Vec<u8>,
}

impl IconImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Uniform mid-grey bitmap returned when a real capture fails.
    pub fn placeholder(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        let pixels = [0x80, 0x80, 0x80, 0xff].repeat(len);
        Self::new(width, height, pixels)
    }

    /// Convert a buffer of `0xAARRGGBB` words (as used by `_NET_WM_ICON` and
    /// 32-bit DIBs) into RGBA bytes.
    pub fn from_argb(width: u32, height: u32, argb: impl IntoIterator<Item = u32>) -> Self {
        let pixels = argb
            .into_iter()
            .flat_map(|px| {
                let [a, r, g, b] = px.to_be_bytes();
                [r, g, b, a]
            })
            .collect();
        Self::new(width, height, pixels)
    }
}

/// Everything the backend reports about one eligible window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub wid: Wid,
    pub rect: Rect,
    pub resizable: bool,
    /// `false` when the window is minimized.
    pub restored: bool,
    pub title: String,
    pub name: String,
    pub icon: Option<Arc<IconImage>>,
    pub workspace: WorkspaceId,
}

/// Smallest size a pending change may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    pub min_width: i32,
    pub min_height: i32,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            min_width: 100,
            min_height: 80,
        }
    }
}

impl SizeLimits {
    /// Whether `rect` is at least the minimum size.
    pub fn admits(&self, rect: &Rect) -> bool {
        rect.w >= self.min_width && rect.h >= self.min_height
    }
}

/// One request to [`WindowModel::set_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Move the window to another workspace.
    Workspace(WorkspaceId),
    /// Replace the pending rectangle wholesale.
    Rect(Rect),
    /// Merge individual components into the pending rectangle (or into the
    /// captured one when nothing is pending yet).
    Components {
        x: Option<i32>,
        y: Option<i32>,
        w: Option<i32>,
        h: Option<i32>,
    },
    /// Drop the pending rectangle, keep the pending workspace.
    ClearRect,
    /// Drop every pending change.
    Reset,
}

impl Change {
    /// Position-only change.
    pub fn position(x: i32, y: i32) -> Self {
        Change::Components {
            x: Some(x),
            y: Some(y),
            w: None,
            h: None,
        }
    }
}

/// Why a dynamically typed change request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeError {
    #[error("change request must be a JSON object")]
    NotAnObject,
    #[error("change request is empty")]
    Empty,
    #[error("`{0}` must be an integer")]
    NotAnInteger(String),
    #[error("`rect` must be an array of four integers")]
    BadRect,
    #[error("unknown change key `{0}`")]
    UnknownKey(String),
    #[error("`{0}` cannot be combined with other keys")]
    Exclusive(&'static str),
}

fn integer(value: &Value, key: &str) -> Result<i32, ChangeError> {
    value
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| ChangeError::NotAnInteger(key.to_string()))
}

impl TryFrom<&Value> for Change {
    type Error = ChangeError;

    /// Parse the keyword forms `{"ws": n}`, `{"rect": [x, y, w, h]}` and any
    /// combination of `{"x", "y", "w", "h"}`.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let map = value.as_object().ok_or(ChangeError::NotAnObject)?;
        if map.is_empty() {
            return Err(ChangeError::Empty);
        }

        if let Some(ws) = map.get("ws") {
            if map.len() != 1 {
                return Err(ChangeError::Exclusive("ws"));
            }
            let ws = ws
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| ChangeError::NotAnInteger("ws".into()))?;
            return Ok(Change::Workspace(WorkspaceId(ws)));
        }

        if let Some(rect) = map.get("rect") {
            if map.len() != 1 {
                return Err(ChangeError::Exclusive("rect"));
            }
            let parts = rect.as_array().ok_or(ChangeError::BadRect)?;
            if parts.len() != 4 {
                return Err(ChangeError::BadRect);
            }
            let mut xywh = [0i32; 4];
            for (slot, part) in xywh.iter_mut().zip(parts) {
                *slot = integer(part, "rect").map_err(|_| ChangeError::BadRect)?;
            }
            let [x, y, w, h] = xywh;
            return Ok(Change::Rect(Rect::new(x, y, w, h)));
        }

        let (mut x, mut y, mut w, mut h) = (None, None, None, None);
        for (key, value) in map {
            let slot = match key.as_str() {
                "x" => &mut x,
                "y" => &mut y,
                "w" => &mut w,
                "h" => &mut h,
                other => return Err(ChangeError::UnknownKey(other.to_string())),
            };
            *slot = Some(integer(value, key)?);
        }
        Ok(Change::Components { x, y, w, h })
    }
}

/// One managed window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowModel {
    wid: Wid,
    rect: Rect,
    resizable: bool,
    restored: bool,
    title: String,
    name: String,
    icon: Option<Arc<IconImage>>,
    workspace: WorkspaceId,
    changed: Option<Rect>,
    changed_ws: Option<WorkspaceId>,
}

impl From<WindowInfo> for WindowModel {
    fn from(info: WindowInfo) -> Self {
        Self {
            wid: info.wid,
            rect: Rect::new(info.rect.x, info.rect.y, info.rect.w.max(0), info.rect.h.max(0)),
            resizable: info.resizable,
            restored: info.restored,
            title: info.title,
            name: info.name,
            icon: info.icon,
            workspace: info.workspace,
            changed: None,
            changed_ws: None,
        }
    }
}

impl WindowModel {
    pub fn wid(&self) -> Wid {
        self.wid
    }

    /// Rectangle captured at collection time.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn resizable(&self) -> bool {
        self.resizable
    }

    /// `false` if the window was minimized when captured.
    pub fn restored(&self) -> bool {
        self.restored
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn icon(&self) -> Option<&Arc<IconImage>> {
        self.icon.as_ref()
    }

    /// Workspace captured at collection time.
    pub fn workspace(&self) -> WorkspaceId {
        self.workspace
    }

    /// Pending rectangle, if any.
    pub fn changed(&self) -> Option<Rect> {
        self.changed
    }

    /// Pending workspace, if any.
    pub fn changed_ws(&self) -> Option<WorkspaceId> {
        self.changed_ws
    }

    pub fn is_changed(&self) -> bool {
        self.changed.is_some() || self.changed_ws.is_some()
    }

    pub fn is_ws_changed(&self) -> bool {
        self.changed_ws.is_some()
    }

    /// Whether the pending rectangle differs in size from the captured one.
    pub fn is_resized(&self) -> bool {
        self.changed.is_some_and(|c| c.size() != self.rect.size())
    }

    /// Where the window is (or will be, once committed).
    pub fn target_rect(&self) -> Rect {
        self.changed.unwrap_or(self.rect)
    }

    /// Workspace the window is (or will be) on.
    pub fn target_workspace(&self) -> WorkspaceId {
        self.changed_ws.unwrap_or(self.workspace)
    }

    /// Apply `change` to the pending state.
    ///
    /// Rectangle changes are all-or-nothing: if the merged result is smaller
    /// than `limits`, or alters the size of a non-resizable window, the
    /// pending rectangle is reset to empty instead.  Returns whether the
    /// change was accepted.
    pub fn set_changed(&mut self, change: Change, limits: &SizeLimits) -> bool {
        let candidate = match change {
            Change::Workspace(ws) => {
                self.changed_ws = Some(ws);
                return true;
            }
            Change::ClearRect => {
                self.changed = None;
                return true;
            }
            Change::Reset => {
                self.changed = None;
                self.changed_ws = None;
                return true;
            }
            Change::Rect(rect) => rect,
            Change::Components { x, y, w, h } => {
                let base = self.changed.unwrap_or(self.rect);
                Rect::new(
                    x.unwrap_or(base.x),
                    y.unwrap_or(base.y),
                    w.unwrap_or(base.w),
                    h.unwrap_or(base.h),
                )
            }
        };

        let size_ok = self.resizable || candidate.size() == self.rect.size();
        if size_ok && limits.admits(&candidate) {
            self.changed = Some(candidate);
            true
        } else {
            self.changed = None;
            false
        }
    }

    /// Apply a dynamically typed change request.
    ///
    /// Any ill-typed request resets both pending fields.
    pub fn set_changed_raw(
        &mut self,
        request: &Value,
        limits: &SizeLimits,
    ) -> Result<(), ChangeError> {
        match Change::try_from(request) {
            Ok(change) => {
                self.set_changed(change, limits);
                Ok(())
            }
            Err(e) => {
                self.set_changed(Change::Reset, limits);
                Err(e)
            }
        }
    }

    /// Size implied by a lower-right corner at `(x, y)`, measured from the
    /// upper-left corner already stored in `changed`.
    ///
    /// `None` when nothing is pending or `(x, y)` is not strictly south-east
    /// of that corner.
    pub fn wh_from_ending_xy(&self, x: i32, y: i32) -> Option<(i32, i32)> {
        self.rect_from_ending_xy(Corner::TopLeft, x, y).map(|r| r.size())
    }

    /// Rectangle spanned by the `pinned` corner of `changed` and the
    /// opposite corner dragged to `(x, y)`.
    ///
    /// `None` when nothing is pending or the drag collapses or inverts the
    /// rectangle.
    pub fn rect_from_ending_xy(&self, pinned: Corner, x: i32, y: i32) -> Option<Rect> {
        let anchor = self.changed?.corner(pinned);
        Rect::from_corners(anchor, pinned.opposite(), (x, y))
    }
}

//  Tests

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn info(wid: u64, rect: Rect, resizable: bool) -> WindowInfo {
        WindowInfo {
            wid: Wid(wid),
            rect,
            resizable,
            restored: true,
            title: format!("window {}", wid),
            name: "app".into(),
            icon: None,
            workspace: WorkspaceId(0),
        }
    }

    fn limits() -> SizeLimits {
        SizeLimits {
            min_width: 50,
            min_height: 40,
        }
    }

    fn model(resizable: bool) -> WindowModel {
        WindowModel::from(info(1, Rect::new(100, 100, 400, 300), resizable))
    }

    #[test]
    fn workspace_id_encoding() {
        let ws = WorkspaceId::new(1, 2);
        assert_eq!(ws, WorkspaceId(1002));
        assert_eq!(ws.screen(), 1);
        assert_eq!(ws.ordinal(), 2);
    }

    #[test]
    fn placeholder_is_opaque_grey() {
        let img = IconImage::placeholder(1, 1);
        assert_eq!((img.width, img.height), (1, 1));
        assert_eq!(img.pixels, vec![0x80, 0x80, 0x80, 0xff]);
        assert_eq!(IconImage::placeholder(3, 2).pixels.len(), 24);
    }

    #[test]
    fn fresh_model_has_no_changes() {
        let m = model(true);
        assert!(!m.is_changed());
        assert!(!m.is_ws_changed());
        assert_eq!(m.target_rect(), Rect::new(100, 100, 400, 300));
    }

    #[test]
    fn partial_merge_falls_back_to_rect() {
        let mut m = model(true);
        assert!(m.set_changed(Change::position(10, 20), &limits()));
        assert_eq!(m.changed(), Some(Rect::new(10, 20, 400, 300)));
        assert!(m.set_changed(
            Change::Components {
                x: None,
                y: None,
                w: Some(200),
                h: None
            },
            &limits()
        ));
        assert_eq!(m.changed(), Some(Rect::new(10, 20, 200, 300)));
        assert!(m.is_resized());
    }

    #[test]
    fn rect_replaces_wholesale() {
        let mut m = model(true);
        m.set_changed(Change::position(10, 20), &limits());
        m.set_changed(Change::Rect(Rect::new(1, 2, 300, 200)), &limits());
        assert_eq!(m.changed(), Some(Rect::new(1, 2, 300, 200)));
    }

    #[test]
    fn too_small_resets_changed() {
        let mut m = model(true);
        m.set_changed(Change::position(10, 20), &limits());
        assert!(!m.set_changed(Change::Rect(Rect::new(0, 0, 10, 10)), &limits()));
        assert_eq!(m.changed(), None);
    }

    #[test]
    fn non_resizable_keeps_size() {
        let mut m = model(false);
        assert!(m.set_changed(Change::position(5, 5), &limits()));
        assert_eq!(m.changed(), Some(Rect::new(5, 5, 400, 300)));
        assert!(!m.set_changed(Change::Rect(Rect::new(5, 5, 200, 300)), &limits()));
        assert_eq!(m.changed(), None);
    }

    #[test]
    fn workspace_change_leaves_rect_alone() {
        let mut m = model(true);
        m.set_changed(Change::position(5, 5), &limits());
        m.set_changed(Change::Workspace(WorkspaceId(1002)), &limits());
        assert_eq!(m.changed_ws(), Some(WorkspaceId(1002)));
        assert_eq!(m.changed(), Some(Rect::new(5, 5, 400, 300)));
        assert!(m.is_ws_changed());
    }

    #[test]
    fn raw_forms_are_parsed() {
        let mut m = model(true);
        m.set_changed_raw(&json!({"x": 7, "h": 120}), &limits()).unwrap();
        assert_eq!(m.changed(), Some(Rect::new(7, 100, 400, 120)));
        m.set_changed_raw(&json!({"rect": [1, 2, 300, 200]}), &limits()).unwrap();
        assert_eq!(m.changed(), Some(Rect::new(1, 2, 300, 200)));
        m.set_changed_raw(&json!({"ws": 1001}), &limits()).unwrap();
        assert_eq!(m.changed_ws(), Some(WorkspaceId(1001)));
    }

    #[test]
    fn ill_typed_raw_request_resets_everything() {
        let bad = [
            json!({"x": "ten"}),
            json!({"x": 1.5}),
            json!({"rect": [1, 2, 3]}),
            json!({"rect": [1, 2, 3, "4"]}),
            json!({"ws": -1}),
            json!({"z": 4}),
            json!({"rect": [1, 2, 300, 200], "x": 3}),
            json!([1, 2, 3, 4]),
            json!({}),
        ];
        for request in bad {
            let mut m = model(true);
            m.set_changed(Change::position(10, 20), &limits());
            m.set_changed(Change::Workspace(WorkspaceId(3)), &limits());
            assert!(m.set_changed_raw(&request, &limits()).is_err(), "{request}");
            assert_eq!(m.changed(), None, "{request}");
            assert_eq!(m.changed_ws(), None, "{request}");
        }
    }

    #[test]
    fn wh_from_ending_xy_needs_south_east_point() {
        let mut m = model(true);
        assert_eq!(m.wh_from_ending_xy(900, 900), None);
        m.set_changed(Change::position(300, 300), &limits());
        assert_eq!(m.wh_from_ending_xy(400, 500), Some((100, 200)));
        assert_eq!(m.wh_from_ending_xy(300, 500), None);
        assert_eq!(m.wh_from_ending_xy(400, 300), None);
        assert_eq!(m.wh_from_ending_xy(250, 400), None);
    }

    #[test]
    fn rect_from_ending_xy_pins_any_corner() {
        let mut m = model(true);
        assert_eq!(m.rect_from_ending_xy(Corner::TopLeft, 900, 900), None);
        m.set_changed(Change::Rect(Rect::new(300, 300, 200, 100)), &limits());
        assert_eq!(
            m.rect_from_ending_xy(Corner::TopLeft, 400, 500),
            Some(Rect::new(300, 300, 100, 200))
        );
        // Pinned bottom-right at (500, 400).
        assert_eq!(
            m.rect_from_ending_xy(Corner::BottomRight, 420, 350),
            Some(Rect::new(420, 350, 80, 50))
        );
        assert_eq!(m.rect_from_ending_xy(Corner::BottomRight, 520, 350), None);
        // Pinned top-right at (500, 300).
        assert_eq!(
            m.rect_from_ending_xy(Corner::TopRight, 450, 360),
            Some(Rect::new(450, 300, 50, 60))
        );
    }

    #[test]
    fn clear_rect_keeps_workspace() {
        let mut m = model(true);
        m.set_changed(Change::position(5, 5), &limits());
        m.set_changed(Change::Workspace(WorkspaceId(1002)), &limits());
        m.set_changed(Change::ClearRect, &limits());
        assert_eq!(m.changed(), None);
        assert_eq!(m.changed_ws(), Some(WorkspaceId(1002)));
    }

    #[test]
    fn argb_conversion() {
        let img = IconImage::from_argb(1, 1, [0x80ff0010]);
        assert_eq!(img.pixels, vec![0xff, 0x00, 0x10, 0x80]);
    }
}
