//! [`PlatformBackend`] for Windows.
//!
//! Top-level windows come from `EnumWindows` (which reports them in Z
//! order, topmost first) and are filtered with the alt-tab rules: DWM
//! cloaking, tool windows, invisible title bars and owned popups.
//! Workspaces are Windows virtual desktops, reached through
//! [`VirtualDesktopsClient`].

use super::virtual_desktops::VirtualDesktopsClient;
use super::BackendError;
use crate::eligibility::{is_alt_tab_terminus, WindowKind, WindowTraits};
use crate::geometry::Rect;
use crate::model::{IconImage, Wid, WindowInfo, Workspace, WorkspaceId};
use crate::traits::PlatformBackend;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, FALSE, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Dwm::{
    DwmGetWindowAttribute, DWMWA_CLOAKED, DWMWA_EXTENDED_FRAME_BOUNDS,
};
use windows::Win32::Graphics::Gdi::{
    CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, EnumDisplayMonitors,
    GetDC, GetDIBits, GetMonitorInfoW, GetObjectW, MonitorFromWindow, ReleaseDC, SelectObject,
    BITMAP, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ, HMONITOR,
    MONITORINFO, MONITOR_DEFAULTTONULL,
};
use windows::Win32::Storage::Xps::{PrintWindow, PRINT_WINDOW_FLAGS};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetClassLongPtrW, GetIconInfo, GetLastActivePopup, GetTitleBarInfo,
    GetWindowLongPtrW, GetWindowRect, GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindow,
    IsWindowVisible, SetCursorPos, SetForegroundWindow, SetWindowPos, ShowWindow, GA_ROOTOWNER,
    GCLP_HICON, GWL_EXSTYLE, GWL_STYLE, HICON, ICONINFO, SWP_NOACTIVATE, SWP_NOSIZE, SWP_NOZORDER,
    SW_MINIMIZE, TITLEBARINFO, WS_CAPTION, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_THICKFRAME,
};

/// `STATE_SYSTEM_INVISIBLE` in `TITLEBARINFO::rgstate`.
const STATE_SYSTEM_INVISIBLE: u32 = 0x0000_8000;
/// `PW_RENDERFULLCONTENT`: capture DirectComposition content too.
const PW_RENDERFULLCONTENT: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(2);
/// Virtual desktops are global to the session.
const SCREEN: u32 = 1;

fn hwnd_of(wid: Wid) -> HWND {
    HWND(wid.0 as usize as *mut c_void)
}

fn wid_of(hwnd: HWND) -> Wid {
    Wid(hwnd.0 as usize as u64)
}

fn rect_of(r: &RECT) -> Rect {
    Rect::new(r.left, r.top, r.right - r.left, r.bottom - r.top)
}

/// Per-executable metadata, shared by every window of one application.
#[derive(Debug, Clone)]
struct AppEntry {
    name: String,
    icon: Option<Arc<IconImage>>,
}

/// Win32 backend.
pub struct Win32Backend {
    desktops: Option<VirtualDesktopsClient>,
    /// Keyed by executable path; dropped at session end.
    apps: RefCell<HashMap<String, AppEntry>>,
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = unsafe { &mut *(lparam.0 as *mut Vec<HWND>) };
    windows.push(hwnd);
    TRUE
}

unsafe extern "system" fn collect_monitor(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    unsafe {
        let monitors = &mut *(lparam.0 as *mut Vec<Rect>);
        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        // Keep enumerating past monitors that do not answer.
        if GetMonitorInfoW(hmonitor, &mut info).as_bool() {
            monitors.push(rect_of(&info.rcMonitor));
        }
    }
    TRUE
}

/// 32-bit top-down pixels of `bitmap`, as `0x00RRGGBB` words.
unsafe fn dib_pixels(hdc: HDC, bitmap: HBITMAP, width: i32, height: i32) -> Option<Vec<u32>> {
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut pixels = vec![0u32; (width as usize) * (height as usize)];
    let lines = unsafe {
        GetDIBits(
            hdc,
            bitmap,
            0,
            height as u32,
            Some(pixels.as_mut_ptr() as *mut c_void),
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    (lines == height).then_some(pixels)
}

/// `frame` expressed in the coordinates `SetWindowPos` expects, given the
/// window's current outer rectangle and visible frame.
///
/// Since Windows 10 the outer rectangle includes invisible resize borders.
fn outer_rect(frame: Rect, visible: Rect, outer: Rect) -> Rect {
    let left = visible.x - outer.x;
    let top = visible.y - outer.y;
    let right = outer.right() - visible.right();
    let bottom = outer.bottom() - visible.bottom();
    Rect::new(
        frame.x.saturating_sub(left),
        frame.y.saturating_sub(top),
        frame.w.saturating_add(left + right),
        frame.h.saturating_add(top + bottom),
    )
}

impl Win32Backend {
    pub fn connect() -> Result<Self, BackendError> {
        let desktops = match VirtualDesktopsClient::new() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("virtual desktops unavailable: {}", e);
                None
            }
        };
        info!("using Win32 backend");
        Ok(Self {
            desktops,
            apps: RefCell::new(HashMap::new()),
        })
    }

    fn window_rect(hwnd: HWND) -> Option<Rect> {
        let mut r = RECT::default();
        unsafe { GetWindowRect(hwnd, &mut r) }.ok()?;
        Some(rect_of(&r))
    }

    /// Visible frame without the drop-shadow borders.  Falls back to the
    /// window rectangle when DWM has no answer.
    fn frame_rect(hwnd: HWND) -> Option<Rect> {
        let mut r = RECT::default();
        let ok = unsafe {
            DwmGetWindowAttribute(
                hwnd,
                DWMWA_EXTENDED_FRAME_BOUNDS,
                &mut r as *mut RECT as *mut c_void,
                std::mem::size_of::<RECT>() as u32,
            )
        }
        .is_ok();
        if ok {
            Some(rect_of(&r))
        } else {
            Self::window_rect(hwnd)
        }
    }

    /// Translate a frame rectangle into window coordinates for `hwnd`.
    fn to_outer(hwnd: HWND, frame: Rect) -> Rect {
        match (Self::frame_rect(hwnd), Self::window_rect(hwnd)) {
            (Some(visible), Some(outer)) => outer_rect(frame, visible, outer),
            _ => frame,
        }
    }

    fn title(hwnd: HWND) -> String {
        let mut buf = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd, &mut buf) };
        String::from_utf16_lossy(&buf[..len.max(0) as usize])
    }

    fn style(hwnd: HWND) -> u32 {
        unsafe { GetWindowLongPtrW(hwnd, GWL_STYLE) as u32 }
    }

    fn ex_style(hwnd: HWND) -> u32 {
        unsafe { GetWindowLongPtrW(hwnd, GWL_EXSTYLE) as u32 }
    }

    fn is_cloaked(hwnd: HWND) -> bool {
        let mut cloaked = 0u32;
        unsafe {
            DwmGetWindowAttribute(
                hwnd,
                DWMWA_CLOAKED,
                &mut cloaked as *mut u32 as *mut c_void,
                std::mem::size_of::<u32>() as u32,
            )
        }
        .is_ok()
            && cloaked != 0
    }

    fn titlebar_invisible(hwnd: HWND) -> bool {
        let mut info = TITLEBARINFO {
            cbSize: std::mem::size_of::<TITLEBARINFO>() as u32,
            ..Default::default()
        };
        unsafe { GetTitleBarInfo(hwnd, &mut info) }.is_ok()
            && info.rgstate[0] & STATE_SYSTEM_INVISIBLE != 0
    }

    /// Covers its whole monitor without a caption.
    fn is_fullscreen(hwnd: HWND) -> bool {
        if Self::style(hwnd) & WS_CAPTION.0 == WS_CAPTION.0 {
            return false;
        }
        let monitor = unsafe { MonitorFromWindow(hwnd, MONITOR_DEFAULTTONULL) };
        if monitor.is_invalid() {
            return false;
        }
        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        if !unsafe { GetMonitorInfoW(monitor, &mut info) }.as_bool() {
            return false;
        }
        Self::window_rect(hwnd) == Some(rect_of(&info.rcMonitor))
    }

    fn traits(hwnd: HWND) -> WindowTraits {
        let ex_style = Self::ex_style(hwnd);
        WindowTraits {
            kind: WindowKind::Normal,
            fullscreen: Self::is_fullscreen(hwnd),
            hidden: !unsafe { IsWindowVisible(hwnd) }.as_bool(),
            minimized: unsafe { IsIconic(hwnd) }.as_bool(),
            cloaked: Self::is_cloaked(hwnd),
            titlebar_invisible: Self::titlebar_invisible(hwnd),
            tool_window: ex_style & WS_EX_TOOLWINDOW.0 != 0,
            no_activate: ex_style & WS_EX_NOACTIVATE.0 != 0,
            ..WindowTraits::normal()
        }
    }

    fn executable(hwnd: HWND) -> Option<String> {
        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
        if pid == 0 {
            return None;
        }
        unsafe {
            let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid).ok()?;
            let mut buf = [0u16; 1024];
            let mut len = buf.len() as u32;
            let queried = QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(buf.as_mut_ptr()),
                &mut len,
            );
            let _ = CloseHandle(process);
            queried.ok()?;
            Some(String::from_utf16_lossy(&buf[..len as usize]))
        }
    }

    fn class_icon(hwnd: HWND) -> Option<IconImage> {
        unsafe {
            let hicon = HICON(GetClassLongPtrW(hwnd, GCLP_HICON) as *mut c_void);
            if hicon.is_invalid() {
                return None;
            }
            let mut icon = ICONINFO::default();
            GetIconInfo(hicon, &mut icon).ok()?;
            let mut bitmap = BITMAP::default();
            let color = icon.hbmColor;
            let described = GetObjectW(
                HGDIOBJ(color.0),
                std::mem::size_of::<BITMAP>() as i32,
                Some(&mut bitmap as *mut BITMAP as *mut c_void),
            ) != 0;
            let screen = GetDC(HWND::default());
            let pixels = described
                .then(|| dib_pixels(screen, color, bitmap.bmWidth, bitmap.bmHeight))
                .flatten();
            ReleaseDC(HWND::default(), screen);
            let _ = DeleteObject(HGDIOBJ(icon.hbmColor.0));
            let _ = DeleteObject(HGDIOBJ(icon.hbmMask.0));
            pixels.map(|px| {
                IconImage::from_argb(bitmap.bmWidth as u32, bitmap.bmHeight as u32, px)
            })
        }
    }

    /// Application metadata of `hwnd`, cached per executable.
    fn app(&self, hwnd: HWND) -> AppEntry {
        let Some(exe) = Self::executable(hwnd) else {
            return AppEntry {
                name: String::new(),
                icon: Self::class_icon(hwnd).map(Arc::new),
            };
        };
        if let Some(entry) = self.apps.borrow().get(&exe) {
            return entry.clone();
        }
        let entry = AppEntry {
            name: Path::new(&exe)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            icon: Self::class_icon(hwnd).map(Arc::new),
        };
        self.apps.borrow_mut().insert(exe, entry.clone());
        entry
    }

    fn check_alive(wid: Wid) -> Result<HWND, BackendError> {
        let hwnd = hwnd_of(wid);
        if unsafe { IsWindow(hwnd) }.as_bool() {
            Ok(hwnd)
        } else {
            Err(BackendError::WindowGone(wid))
        }
    }

    fn capture(hwnd: HWND) -> Option<IconImage> {
        let rect = Self::window_rect(hwnd)?;
        if rect.w <= 0 || rect.h <= 0 {
            return None;
        }
        unsafe {
            let screen = GetDC(HWND::default());
            let memory = CreateCompatibleDC(screen);
            let bitmap = CreateCompatibleBitmap(screen, rect.w, rect.h);
            let previous = SelectObject(memory, HGDIOBJ(bitmap.0));
            let printed = PrintWindow(hwnd, memory, PW_RENDERFULLCONTENT).as_bool();
            SelectObject(memory, previous);
            let pixels = printed
                .then(|| dib_pixels(memory, bitmap, rect.w, rect.h))
                .flatten();
            let _ = DeleteObject(HGDIOBJ(bitmap.0));
            let _ = DeleteDC(memory);
            ReleaseDC(HWND::default(), screen);
            pixels.map(|px| {
                let opaque = px.into_iter().map(|p| p | 0xff00_0000);
                IconImage::from_argb(rect.w as u32, rect.h as u32, opaque)
            })
        }
    }
}

impl PlatformBackend for Win32Backend {
    type Handle = HWND;

    fn enumerate_windows(&self) -> Vec<HWND> {
        let mut windows: Vec<HWND> = Vec::new();
        let lparam = LPARAM(&mut windows as *mut Vec<HWND> as isize);
        if let Err(e) = unsafe { EnumWindows(Some(collect_window), lparam) } {
            warn!("EnumWindows: {}", e);
            return Vec::new();
        }
        windows
    }

    fn is_eligible(&self, hwnd: &HWND) -> bool {
        let hwnd = *hwnd;
        let rejection = Self::traits(hwnd).rejection().or_else(|| {
            let terminus = is_alt_tab_terminus(
                hwnd,
                |h| unsafe { GetAncestor(h, GA_ROOTOWNER) },
                |h| unsafe { GetLastActivePopup(h) },
                |h| unsafe { IsWindowVisible(h) }.as_bool(),
            );
            (!terminus).then_some(crate::eligibility::Rejection::NotAltTabTerminus)
        });
        match rejection {
            None => true,
            Some(reason) => {
                debug!("skipping {:?}: {}", hwnd.0, reason);
                false
            }
        }
    }

    fn inspect(&self, hwnd: &HWND) -> Option<WindowInfo> {
        let hwnd = *hwnd;
        let rect = Self::frame_rect(hwnd)?;
        let app = self.app(hwnd);
        Some(WindowInfo {
            wid: wid_of(hwnd),
            rect,
            resizable: Self::style(hwnd) & WS_THICKFRAME.0 != 0,
            restored: !unsafe { IsIconic(hwnd) }.as_bool(),
            title: Self::title(hwnd),
            name: app.name,
            icon: app.icon,
            workspace: self.workspace_for_window(&hwnd),
        })
    }

    fn workspace_for_window(&self, hwnd: &HWND) -> WorkspaceId {
        self.desktops
            .as_ref()
            .and_then(|d| d.get_window_desktop(*hwnd))
            .map_or(WorkspaceId(0), |ordinal| WorkspaceId::new(SCREEN, ordinal + 1))
    }

    fn enumerate_monitors(&self) -> Vec<Rect> {
        let mut monitors: Vec<Rect> = Vec::new();
        let lparam = LPARAM(&mut monitors as *mut Vec<Rect> as isize);
        unsafe { EnumDisplayMonitors(HDC::default(), None, Some(collect_monitor), lparam) };
        monitors
    }

    fn enumerate_workspaces(&self) -> Vec<Workspace> {
        self.desktops
            .as_ref()
            .map(|d| {
                d.get_desktops()
                    .into_iter()
                    .map(|desktop| Workspace {
                        id: WorkspaceId::new(SCREEN, desktop.ordinal + 1),
                        label: desktop.name,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn supports_workspaces(&self) -> bool {
        self.desktops.is_some()
    }

    fn move_window(&self, wid: Wid, rect: Rect) -> Result<(), BackendError> {
        let hwnd = Self::check_alive(wid)?;
        let rect = Self::to_outer(hwnd, rect);
        unsafe {
            SetWindowPos(
                hwnd,
                HWND::default(),
                rect.x,
                rect.y,
                0,
                0,
                SWP_NOACTIVATE | SWP_NOZORDER | SWP_NOSIZE,
            )
        }
        .map_err(|e| BackendError::Native(format!("SetWindowPos: {}", e)))
    }

    fn move_and_resize(&self, wid: Wid, rect: Rect) -> Result<(), BackendError> {
        let hwnd = Self::check_alive(wid)?;
        let rect = Self::to_outer(hwnd, rect);
        unsafe {
            SetWindowPos(
                hwnd,
                HWND::default(),
                rect.x,
                rect.y,
                rect.w,
                rect.h,
                SWP_NOACTIVATE | SWP_NOZORDER,
            )
        }
        .map_err(|e| BackendError::Native(format!("SetWindowPos: {}", e)))
    }

    fn move_to_workspace(&self, wid: Wid, workspace: WorkspaceId) -> Result<(), BackendError> {
        let hwnd = Self::check_alive(wid)?;
        let desktops = self
            .desktops
            .as_ref()
            .ok_or(BackendError::UnknownWorkspace(workspace))?;
        if workspace.screen() != SCREEN || workspace.ordinal() == 0 {
            return Err(BackendError::UnknownWorkspace(workspace));
        }
        desktops.move_window_to_desktop(hwnd, workspace.ordinal() - 1)
    }

    fn minimize(&self, wid: Wid) -> Result<(), BackendError> {
        let hwnd = Self::check_alive(wid)?;
        // The return value is the previous visibility, not success.
        let _ = unsafe { ShowWindow(hwnd, SW_MINIMIZE) };
        Ok(())
    }

    fn activate(&self, wid: Wid) {
        if !unsafe { SetForegroundWindow(hwnd_of(wid)) }.as_bool() {
            debug!("SetForegroundWindow {} refused", wid);
        }
    }

    fn move_cursor(&self, x: i32, y: i32) {
        if let Err(e) = unsafe { SetCursorPos(x, y) } {
            debug!("SetCursorPos: {}", e);
        }
    }

    fn grab_window_screenshot(&self, wid: Wid) -> Arc<IconImage> {
        Arc::new(Self::capture(hwnd_of(wid)).unwrap_or_else(|| IconImage::placeholder(1, 1)))
    }

    fn end_session(&self) {
        self.apps.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_round_trip() {
        let wid = Wid(0x0004_0a2c);
        assert_eq!(wid_of(hwnd_of(wid)), wid);
    }

    #[test]
    fn rect_from_win32_rect() {
        let r = RECT {
            left: -8,
            top: 10,
            right: 1920,
            bottom: 1050,
        };
        assert_eq!(rect_of(&r), Rect::new(-8, 10, 1928, 1040));
    }

    #[test]
    fn frame_is_widened_by_invisible_borders() {
        let outer = Rect::new(93, 100, 414, 307);
        let visible = Rect::new(100, 100, 400, 300);
        assert_eq!(
            outer_rect(Rect::new(0, 0, 800, 600), visible, outer),
            Rect::new(-7, 0, 814, 607)
        );
        // Borderless windows are placed as they are.
        assert_eq!(
            outer_rect(Rect::new(5, 5, 50, 50), visible, visible),
            Rect::new(5, 5, 50, 50)
        );
    }
}
