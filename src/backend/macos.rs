//! [`PlatformBackend`] for macOS.
//!
//! The window list comes from `CGWindowListCopyWindowInfo`, which reports
//! on-screen windows front to back.  Everything that changes a window goes
//! through the Accessibility API, so the process needs the Accessibility
//! permission; titles additionally need Screen Recording.
//!
//! macOS Spaces are not scriptable through public API: every window reports
//! `WorkspaceId(0)` and workspace changes are never committed.

use super::BackendError;
use crate::eligibility::{WindowKind, WindowTraits};
use crate::geometry::Rect;
use crate::model::{IconImage, Wid, WindowInfo, Workspace, WorkspaceId};
use crate::traits::PlatformBackend;
use log::{debug, info, warn};
use objc2_application_services::{AXError, AXIsProcessTrusted, AXUIElement, AXValue, AXValueType};
use objc2_core_foundation::{
    CFArray, CFBoolean, CFDictionary, CFNumber, CFRetained, CFString, CFType, CGPoint, CGSize,
};
use objc2_core_graphics::{
    kCGNullWindowID, kCGWindowBounds, kCGWindowLayer, kCGWindowName, kCGWindowNumber,
    kCGWindowOwnerName, kCGWindowOwnerPID, CGDirectDisplayID, CGDisplayBounds, CGError,
    CGGetActiveDisplayList, CGWindowID, CGWindowListCopyWindowInfo, CGWindowListOption,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::Arc;

unsafe extern "C" {
    fn _AXUIElementGetWindow(elem: NonNull<AXUIElement>, wid: *mut CGWindowID) -> AXError;
    fn CGWarpMouseCursorPosition(point: CGPoint) -> CGError;
}

/// Normal application windows live on layer 0.
const NORMAL_LAYER: i64 = 0;
const MAX_DISPLAYS: usize = 16;

/// One entry of the window server's list.
#[derive(Debug, Clone)]
pub struct MacWindow {
    pub id: CGWindowID,
    pub pid: i32,
    pub frame: Rect,
    pub title: String,
    pub owner: String,
}

fn ax_error(what: &str, err: AXError) -> BackendError {
    match err {
        AXError::APIDisabled | AXError::NotImplemented => {
            BackendError::Unavailable(format!("{}: accessibility error {:?}", what, err))
        }
        AXError::InvalidUIElement => BackendError::Native(format!("{}: window closed", what)),
        _ => BackendError::Native(format!("{}: accessibility error {:?}", what, err)),
    }
}

fn number(dict: &CFDictionary<CFString, CFType>, key: &CFString) -> Option<f64> {
    dict.get(key)?.downcast::<CFNumber>().ok()?.as_f64()
}

fn string(dict: &CFDictionary<CFString, CFType>, key: &CFString) -> Option<String> {
    Some(dict.get(key)?.downcast::<CFString>().ok()?.to_string())
}

/// `kCGWindowBounds` is itself a dictionary of `X`, `Y`, `Width`, `Height`.
fn bounds(dict: &CFDictionary<CFString, CFType>) -> Option<Rect> {
    let raw = dict.get(unsafe { kCGWindowBounds })?.downcast::<CFDictionary>().ok()?;
    let b = unsafe { CFRetained::cast_unchecked::<CFDictionary<CFString, CFType>>(raw) };
    let get = |name: &'static str| {
        number(&b, &CFString::from_static_str(name)).map(|v| v.round() as i32)
    };
    Some(Rect::new(get("X")?, get("Y")?, get("Width")?, get("Height")?))
}

fn parse_window(dict: &CFDictionary<CFString, CFType>) -> Option<MacWindow> {
    let layer = number(dict, unsafe { kCGWindowLayer })? as i64;
    if layer != NORMAL_LAYER {
        return None;
    }
    Some(MacWindow {
        id: number(dict, unsafe { kCGWindowNumber })? as CGWindowID,
        pid: number(dict, unsafe { kCGWindowOwnerPID })? as i32,
        frame: bounds(dict)?,
        title: string(dict, unsafe { kCGWindowName }).unwrap_or_default(),
        owner: string(dict, unsafe { kCGWindowOwnerName }).unwrap_or_default(),
    })
}

//  Accessibility helpers

fn copy_attribute(
    element: &AXUIElement,
    name: &'static str,
) -> Result<Option<CFRetained<CFType>>, AXError> {
    let attr = CFString::from_static_str(name);
    let mut value: *const CFType = ptr::null();
    let status = unsafe { element.copy_attribute_value(&attr, NonNull::from(&mut value)) };
    match status {
        AXError::Success => {
            Ok(NonNull::new(value.cast_mut()).map(|p| unsafe { CFRetained::from_raw(p) }))
        }
        AXError::NoValue | AXError::AttributeUnsupported => Ok(None),
        err => Err(err),
    }
}

fn string_attribute(element: &AXUIElement, name: &'static str) -> Option<String> {
    let value = copy_attribute(element, name).ok()??;
    Some(value.downcast::<CFString>().ok()?.to_string())
}

fn bool_attribute(element: &AXUIElement, name: &'static str) -> bool {
    copy_attribute(element, name)
        .ok()
        .flatten()
        .and_then(|v| v.downcast::<CFBoolean>().ok())
        .is_some_and(|b| b.value())
}

fn set_attribute(element: &AXUIElement, name: &'static str, value: &CFType) -> Result<(), AXError> {
    let attr = CFString::from_static_str(name);
    match unsafe { element.set_attribute_value(&attr, value) } {
        AXError::Success => Ok(()),
        err => Err(err),
    }
}

fn ax_value<T>(kind: AXValueType, value: &mut T) -> Result<CFRetained<AXValue>, AXError> {
    let ptr = NonNull::from(value).cast::<c_void>();
    unsafe { AXValue::new(kind, ptr) }.ok_or(AXError::Failure)
}

fn is_settable(element: &AXUIElement, name: &'static str) -> bool {
    let attr = CFString::from_static_str(name);
    let mut settable = 0u8;
    let status = unsafe { element.is_attribute_settable(&attr, NonNull::from(&mut settable)) };
    status == AXError::Success && settable != 0
}

fn window_number(element: &AXUIElement) -> Option<CGWindowID> {
    let mut id: CGWindowID = 0;
    let status = unsafe { _AXUIElementGetWindow(NonNull::from(element), &mut id) };
    (status == AXError::Success && id != 0).then_some(id)
}

fn kind_of(subrole: Option<&str>) -> WindowKind {
    match subrole {
        Some("AXDialog") | Some("AXSystemDialog") => WindowKind::Dialog,
        Some("AXFloatingWindow") | Some("AXSystemFloatingWindow") => WindowKind::Utility,
        Some("AXStandardWindow") | None => WindowKind::Normal,
        Some(_) => WindowKind::Splash,
    }
}

/// macOS backend.
pub struct MacBackend {
    /// Owner of every window seen during enumeration; dropped at session end.
    owners: RefCell<HashMap<Wid, i32>>,
}

impl MacBackend {
    pub fn connect() -> Result<Self, BackendError> {
        if !unsafe { AXIsProcessTrusted() } {
            return Err(BackendError::Unavailable(
                "accessibility permission not granted".into(),
            ));
        }
        info!("using macOS backend");
        Ok(Self {
            owners: RefCell::new(HashMap::new()),
        })
    }

    fn window_list() -> Vec<MacWindow> {
        let option =
            CGWindowListOption::OptionOnScreenOnly | CGWindowListOption::ExcludeDesktopElements;
        let Some(list) = (unsafe { CGWindowListCopyWindowInfo(option, kCGNullWindowID) }) else {
            warn!("CGWindowListCopyWindowInfo returned nothing");
            return Vec::new();
        };
        let list =
            unsafe { CFRetained::cast_unchecked::<CFArray<CFDictionary<CFString, CFType>>>(list) };
        list.iter().filter_map(|dict| parse_window(&dict)).collect()
    }

    /// The Accessibility element of window `id` owned by `pid`.
    fn element(pid: i32, id: CGWindowID) -> Option<CFRetained<AXUIElement>> {
        let app = unsafe { AXUIElement::new_application(pid) };
        let windows = copy_attribute(&app, "AXWindows").ok()??;
        let windows = windows.downcast::<CFArray>().ok()?;
        let windows = unsafe { CFRetained::cast_unchecked::<CFArray<CFType>>(windows) };
        windows
            .iter()
            .filter_map(|w| w.downcast::<AXUIElement>().ok())
            .find(|w| window_number(w) == Some(id))
    }

    fn element_for(&self, wid: Wid) -> Result<CFRetained<AXUIElement>, BackendError> {
        let pid = *self
            .owners
            .borrow()
            .get(&wid)
            .ok_or(BackendError::WindowGone(wid))?;
        Self::element(pid, wid.0 as CGWindowID).ok_or(BackendError::WindowGone(wid))
    }

    fn set_position(element: &AXUIElement, rect: Rect) -> Result<(), BackendError> {
        let mut point = CGPoint::new(rect.x as f64, rect.y as f64);
        let value = ax_value(AXValueType::CGPoint, &mut point).map_err(|e| ax_error("AXValue", e))?;
        set_attribute(element, "AXPosition", &value).map_err(|e| ax_error("AXPosition", e))
    }

    fn set_size(element: &AXUIElement, rect: Rect) -> Result<(), BackendError> {
        let mut size = CGSize::new(rect.w as f64, rect.h as f64);
        let value = ax_value(AXValueType::CGSize, &mut size).map_err(|e| ax_error("AXValue", e))?;
        set_attribute(element, "AXSize", &value).map_err(|e| ax_error("AXSize", e))
    }
}

impl PlatformBackend for MacBackend {
    type Handle = MacWindow;

    fn enumerate_windows(&self) -> Vec<MacWindow> {
        let windows = Self::window_list();
        let mut owners = self.owners.borrow_mut();
        for w in &windows {
            owners.insert(Wid(w.id as u64), w.pid);
        }
        windows
    }

    fn is_eligible(&self, window: &MacWindow) -> bool {
        let Some(element) = Self::element(window.pid, window.id) else {
            debug!("skipping {:#x}: no accessibility element", window.id);
            return false;
        };
        let subrole = string_attribute(&element, "AXSubrole");
        let traits = WindowTraits {
            kind: kind_of(subrole.as_deref()),
            fullscreen: bool_attribute(&element, "AXFullScreen"),
            minimized: bool_attribute(&element, "AXMinimized"),
            ..WindowTraits::normal()
        };
        match traits.rejection() {
            None => true,
            Some(reason) => {
                debug!("skipping {:#x}: {}", window.id, reason);
                false
            }
        }
    }

    fn inspect(&self, window: &MacWindow) -> Option<WindowInfo> {
        let element = Self::element(window.pid, window.id)?;
        let title = if window.title.is_empty() {
            string_attribute(&element, "AXTitle").unwrap_or_default()
        } else {
            window.title.clone()
        };
        Some(WindowInfo {
            wid: Wid(window.id as u64),
            rect: window.frame,
            resizable: is_settable(&element, "AXSize"),
            restored: !bool_attribute(&element, "AXMinimized"),
            title,
            name: window.owner.clone(),
            // Bundle icons need AppKit; macOS snapshots carry no icon.
            icon: None,
            workspace: self.workspace_for_window(window),
        })
    }

    fn workspace_for_window(&self, _window: &MacWindow) -> WorkspaceId {
        WorkspaceId(0)
    }

    fn enumerate_monitors(&self) -> Vec<Rect> {
        let mut ids: [CGDirectDisplayID; MAX_DISPLAYS] = [0; MAX_DISPLAYS];
        let mut count = 0u32;
        let err =
            unsafe { CGGetActiveDisplayList(MAX_DISPLAYS as u32, ids.as_mut_ptr(), &mut count) };
        if err != CGError::Success {
            warn!("CGGetActiveDisplayList: {:?}", err);
            return Vec::new();
        }
        ids[..count as usize]
            .iter()
            .map(|&id| {
                let b = unsafe { CGDisplayBounds(id) };
                Rect::new(
                    b.origin.x as i32,
                    b.origin.y as i32,
                    b.size.width as i32,
                    b.size.height as i32,
                )
            })
            .collect()
    }

    fn enumerate_workspaces(&self) -> Vec<Workspace> {
        Vec::new()
    }

    fn supports_workspaces(&self) -> bool {
        false
    }

    fn move_window(&self, wid: Wid, rect: Rect) -> Result<(), BackendError> {
        let element = self.element_for(wid)?;
        Self::set_position(&element, rect)
    }

    fn move_and_resize(&self, wid: Wid, rect: Rect) -> Result<(), BackendError> {
        let element = self.element_for(wid)?;
        // Position first: a window may refuse a size that does not fit where
        // it currently is.
        Self::set_position(&element, rect)?;
        Self::set_size(&element, rect)?;
        Self::set_position(&element, rect)
    }

    fn move_to_workspace(&self, _wid: Wid, workspace: WorkspaceId) -> Result<(), BackendError> {
        Err(BackendError::UnknownWorkspace(workspace))
    }

    fn minimize(&self, wid: Wid) -> Result<(), BackendError> {
        let element = self.element_for(wid)?;
        set_attribute(&element, "AXMinimized", CFBoolean::new(true).as_ref())
            .map_err(|e| ax_error("AXMinimized", e))
    }

    fn activate(&self, wid: Wid) {
        let Some(&pid) = self.owners.borrow().get(&wid) else {
            return;
        };
        let app = unsafe { AXUIElement::new_application(pid) };
        if let Err(e) = set_attribute(&app, "AXFrontmost", CFBoolean::new(true).as_ref()) {
            debug!("AXFrontmost {}: {:?}", wid, e);
        }
        if let Some(element) = Self::element(pid, wid.0 as CGWindowID) {
            let action = CFString::from_static_str("AXRaise");
            let status = unsafe { element.perform_action(&action) };
            if status != AXError::Success {
                debug!("AXRaise {}: {:?}", wid, status);
            }
        }
    }

    fn move_cursor(&self, x: i32, y: i32) {
        let err = unsafe { CGWarpMouseCursorPosition(CGPoint::new(x as f64, y as f64)) };
        if err != CGError::Success {
            debug!("CGWarpMouseCursorPosition: {:?}", err);
        }
    }

    /// Window capture needs ScreenCaptureKit, which this backend does not link.
    /// Always returns the grey 1x1 placeholder.
    fn grab_window_screenshot(&self, _wid: Wid) -> Arc<IconImage> {
        Arc::new(IconImage::placeholder(1, 1))
    }

    fn end_session(&self) {
        self.owners.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subroles_map_to_kinds() {
        assert_eq!(kind_of(Some("AXStandardWindow")), WindowKind::Normal);
        assert_eq!(kind_of(None), WindowKind::Normal);
        assert_eq!(kind_of(Some("AXDialog")), WindowKind::Dialog);
        assert_eq!(kind_of(Some("AXFloatingWindow")), WindowKind::Utility);
        assert!(!kind_of(Some("AXUnknown")).is_applicable());
    }

    #[test]
    fn accessibility_errors_are_classified() {
        assert!(!ax_error("AXPosition", AXError::APIDisabled).is_transient());
        assert!(ax_error("AXPosition", AXError::CannotComplete).is_transient());
    }
}
