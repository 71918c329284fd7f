//! Which native windows take part in a session.
//!
//! The policy is shared by every backend: each one translates its native
//! window attributes into a [`WindowTraits`] and asks
//! [`WindowTraits::rejection`].  Windows whose type is not applicable, or
//! whose state makes them unreachable for the user, are skipped.

use std::fmt;

/// Window type, as classified by EWMH (`_NET_WM_WINDOW_TYPE_*`) or the
/// closest native equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Normal,
    Dialog,
    Utility,
    Desktop,
    Dock,
    Toolbar,
    Menu,
    Splash,
    Tooltip,
    PopupMenu,
    DropdownMenu,
    Combo,
    Dnd,
    Notification,
}

impl WindowKind {
    /// Types the user arranges: normal top-levels, dialogs and utilities.
    pub fn is_applicable(self) -> bool {
        matches!(self, WindowKind::Normal | WindowKind::Dialog | WindowKind::Utility)
    }

    /// Classify an EWMH window-type atom name, with or without the
    /// `_NET_WM_WINDOW_TYPE_` prefix.
    pub fn from_ewmh(name: &str) -> Option<WindowKind> {
        let suffix = name.strip_prefix("_NET_WM_WINDOW_TYPE_").unwrap_or(name);
        Some(match suffix {
            "NORMAL" => WindowKind::Normal,
            "DIALOG" => WindowKind::Dialog,
            "UTILITY" => WindowKind::Utility,
            "DESKTOP" => WindowKind::Desktop,
            "DOCK" => WindowKind::Dock,
            "TOOLBAR" => WindowKind::Toolbar,
            "MENU" => WindowKind::Menu,
            "SPLASH" => WindowKind::Splash,
            "TOOLTIP" => WindowKind::Tooltip,
            "POPUP_MENU" => WindowKind::PopupMenu,
            "DROPDOWN_MENU" => WindowKind::DropdownMenu,
            "COMBO" => WindowKind::Combo,
            "DND" => WindowKind::Dnd,
            "NOTIFICATION" => WindowKind::Notification,
            _ => return None,
        })
    }
}

/// Platform-neutral snapshot of the attributes the policy looks at.
///
/// Fields a platform has no notion of stay `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTraits {
    pub kind: WindowKind,
    pub fullscreen: bool,
    /// Asked to be left out of task lists.
    pub skip_taskbar: bool,
    /// Not mapped / not visible.
    pub hidden: bool,
    pub minimized: bool,
    /// Present but hidden by the compositor (DWM cloaking).
    pub cloaked: bool,
    /// Title bar reports `STATE_SYSTEM_INVISIBLE`.
    pub titlebar_invisible: bool,
    /// `WS_EX_TOOLWINDOW`.
    pub tool_window: bool,
    /// `WS_EX_NOACTIVATE`.
    pub no_activate: bool,
}

impl WindowTraits {
    /// A visible normal window with nothing special about it.
    pub fn normal() -> Self {
        Self {
            kind: WindowKind::Normal,
            fullscreen: false,
            skip_taskbar: false,
            hidden: false,
            minimized: false,
            cloaked: false,
            titlebar_invisible: false,
            tool_window: false,
            no_activate: false,
        }
    }

    /// Why the window is skipped, or `None` if it is eligible.
    pub fn rejection(&self) -> Option<Rejection> {
        if !self.kind.is_applicable() {
            return Some(Rejection::Kind(self.kind));
        }
        if self.fullscreen {
            return Some(Rejection::Fullscreen);
        }
        if self.kind == WindowKind::Dialog && self.skip_taskbar {
            return Some(Rejection::SkipTaskbar);
        }
        if self.hidden && !self.minimized {
            return Some(Rejection::Hidden);
        }
        if self.cloaked {
            return Some(Rejection::Cloaked);
        }
        if self.titlebar_invisible {
            return Some(Rejection::TitlebarInvisible);
        }
        if self.tool_window {
            return Some(Rejection::ToolWindow);
        }
        if self.no_activate {
            return Some(Rejection::NoActivate);
        }
        None
    }

    pub fn is_eligible(&self) -> bool {
        self.rejection().is_none()
    }
}

/// Reason a window was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Kind(WindowKind),
    Fullscreen,
    SkipTaskbar,
    Hidden,
    Cloaked,
    TitlebarInvisible,
    ToolWindow,
    NoActivate,
    /// Not the window alt-tab would show for its owner chain.
    NotAltTabTerminus,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Kind(kind) => write!(f, "window type {:?}", kind),
            Rejection::Fullscreen => write!(f, "fullscreen"),
            Rejection::SkipTaskbar => write!(f, "dialog skips the task list"),
            Rejection::Hidden => write!(f, "hidden"),
            Rejection::Cloaked => write!(f, "cloaked"),
            Rejection::TitlebarInvisible => write!(f, "invisible title bar"),
            Rejection::ToolWindow => write!(f, "tool window"),
            Rejection::NoActivate => write!(f, "cannot be activated"),
            Rejection::NotAltTabTerminus => write!(f, "owned popup"),
        }
    }
}

/// Longest owner chain followed before giving up.
const MAX_POPUP_WALK: usize = 64;

/// Whether `window` is the one alt-tab shows for its owner chain.
///
/// Starting from the root owner, follow the last active popup until it is
/// the window itself or a visible one; `window` must be where the walk
/// stops.
pub fn is_alt_tab_terminus<H, R, P, V>(
    window: H,
    root_owner: R,
    last_active_popup: P,
    is_visible: V,
) -> bool
where
    H: Copy + PartialEq,
    R: Fn(H) -> H,
    P: Fn(H) -> H,
    V: Fn(H) -> bool,
{
    let mut candidate = root_owner(window);
    let mut walk = None;
    for _ in 0..MAX_POPUP_WALK {
        if walk == Some(candidate) {
            break;
        }
        walk = Some(candidate);
        candidate = last_active_popup(candidate);
        if is_visible(candidate) {
            break;
        }
    }
    walk == Some(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn applicable_kinds() {
        for kind in [WindowKind::Normal, WindowKind::Dialog, WindowKind::Utility] {
            assert!(kind.is_applicable(), "{kind:?}");
        }
        for kind in [
            WindowKind::Desktop,
            WindowKind::Dock,
            WindowKind::Toolbar,
            WindowKind::Menu,
            WindowKind::Splash,
            WindowKind::Tooltip,
            WindowKind::PopupMenu,
            WindowKind::Combo,
            WindowKind::Dnd,
            WindowKind::Notification,
        ] {
            assert!(!kind.is_applicable(), "{kind:?}");
        }
    }

    #[test]
    fn ewmh_names() {
        assert_eq!(WindowKind::from_ewmh("_NET_WM_WINDOW_TYPE_DIALOG"), Some(WindowKind::Dialog));
        assert_eq!(WindowKind::from_ewmh("POPUP_MENU"), Some(WindowKind::PopupMenu));
        assert_eq!(WindowKind::from_ewmh("_NET_WM_WINDOW_TYPE_BOGUS"), None);
    }

    #[test]
    fn state_rejections() {
        let normal = WindowTraits::normal();
        assert!(normal.is_eligible());

        let fullscreen = WindowTraits { fullscreen: true, ..normal };
        assert_eq!(fullscreen.rejection(), Some(Rejection::Fullscreen));

        // Skip-taskbar only matters for dialogs.
        let skipping = WindowTraits { skip_taskbar: true, ..normal };
        assert!(skipping.is_eligible());
        let skipping_dialog = WindowTraits { kind: WindowKind::Dialog, ..skipping };
        assert_eq!(skipping_dialog.rejection(), Some(Rejection::SkipTaskbar));

        let hidden = WindowTraits { hidden: true, ..normal };
        assert_eq!(hidden.rejection(), Some(Rejection::Hidden));
        let minimized = WindowTraits { minimized: true, ..hidden };
        assert!(minimized.is_eligible());

        assert!(!WindowTraits { cloaked: true, ..normal }.is_eligible());
        assert!(!WindowTraits { titlebar_invisible: true, ..normal }.is_eligible());
        assert!(!WindowTraits { tool_window: true, ..normal }.is_eligible());
        assert!(!WindowTraits { no_activate: true, ..normal }.is_eligible());

        let dock = WindowTraits { kind: WindowKind::Dock, ..normal };
        assert_eq!(dock.rejection(), Some(Rejection::Kind(WindowKind::Dock)));
    }

    /// Owner table: window -> (root owner, last active popup, visible).
    fn walk(table: &HashMap<u32, (u32, u32, bool)>, window: u32) -> bool {
        is_alt_tab_terminus(
            window,
            |h| table[&h].0,
            |h| table[&h].1,
            |h| table[&h].2,
        )
    }

    #[test]
    fn plain_top_level_is_terminus() {
        let table = HashMap::from([(1, (1, 1, true))]);
        assert!(walk(&table, 1));
    }

    #[test]
    fn visible_owned_popup_belongs_to_owner() {
        // 1 owns popup 2, which is visible.
        let table = HashMap::from([(1, (1, 2, true)), (2, (1, 2, true))]);
        assert!(walk(&table, 1));
        assert!(!walk(&table, 2));
    }

    #[test]
    fn hidden_owner_hands_over_to_popup() {
        // Hidden owner 1 whose last popup 2 is hidden, 2's own last popup is
        // itself: the walk ends on 2.
        let table = HashMap::from([(1, (1, 2, false)), (2, (1, 2, false))]);
        assert!(!walk(&table, 1));
        assert!(walk(&table, 2));
    }

    #[test]
    fn cyclic_popups_terminate() {
        let table = HashMap::from([(1, (1, 2, false)), (2, (1, 1, false))]);
        // The walk must stop; the answer itself is unimportant.
        let _ = walk(&table, 1);
    }
}
