//! Inbound vocabulary of the controller.
//!
//! [`Command`] covers the pointer-event stream (absolute virtual-screen
//! coordinates), the handful of keys the controller reacts to, and the
//! commands the presentation layer sends back (workspace and listing
//! clicks).
//!
//! # Wire format
//!
//! Serde's externally tagged representation, one JSON value per line:
//!
//! ```json
//! {"PointerMove":{"x":500,"y":500}}
//! {"ClickLeft":{"x":520,"y":530}}
//! {"Scroll":{"dx":0,"dy":1}}
//! {"Key":"escape"}
//! {"Key":"3"}
//! {"WorkspaceActivated":1002}
//! {"ListedWindowActivated":6291462}
//! ```

use crate::model::{Wid, WorkspaceId};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Keys the controller binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Discard the current window's pending change and end the session.
    Escape,
    /// Release or re-capture the mouse.
    Space,
    /// Workspace shortcut, `0..=9`.
    Digit(u8),
}

impl Key {
    /// Zero-based workspace slot selected by a digit key: `1` is the first
    /// workspace, `0` the tenth.
    pub fn workspace_slot(self) -> Option<usize> {
        match self {
            Key::Digit(0) => Some(9),
            Key::Digit(d) if d <= 9 => Some(usize::from(d) - 1),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Escape => write!(f, "escape"),
            Key::Space => write!(f, "space"),
            Key::Digit(d) => write!(f, "{}", d),
        }
    }
}

/// Parse a key name (case-insensitive; accepts "Escape", "esc", "space", "7", …).
fn parse_key(s: &str) -> Option<Key> {
    let normalized: String = s.trim().chars().flat_map(|c| c.to_lowercase()).collect();
    match normalized.as_str() {
        "escape" | "esc" => Some(Key::Escape),
        "space" | " " => Some(Key::Space),
        digit if digit.len() == 1 => digit
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .and_then(|d| u8::try_from(d).ok())
            .map(Key::Digit),
        _ => None,
    }
}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_key(&s).ok_or_else(|| DeError::custom(format!("invalid key: {:?}", s)))
    }
}

/// Every event the controller consumes.
///
/// Commands are produced by [`CommandSource`](crate::traits::CommandSource)
/// implementations and consumed by the
/// [`Controller`](crate::controller::Controller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// The pointer moved to `(x, y)`.
    PointerMove { x: i32, y: i32 },

    /// Left button: place the window, or finish resizing it.
    ClickLeft { x: i32, y: i32 },

    /// Middle button: place the window without resizing it.
    ClickMiddle { x: i32, y: i32 },

    /// Right button: skip the current window.
    ClickRight { x: i32, y: i32 },

    /// Wheel.  Cycles the tracked corner while locating.
    Scroll { dx: i32, dy: i32 },

    Key(Key),

    /// The presentation layer's workspace list was clicked.
    WorkspaceActivated(WorkspaceId),

    /// The presentation layer's "remaining windows" list was clicked.
    ListedWindowActivated(Wid),
}

impl Command {
    /// Pointer position carried by the command, if any.
    pub fn position(&self) -> Option<(i32, i32)> {
        match *self {
            Command::PointerMove { x, y }
            | Command::ClickLeft { x, y }
            | Command::ClickMiddle { x, y }
            | Command::ClickRight { x, y } => Some((x, y)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        assert_eq!(Key::Escape.to_string(), "escape");
        assert_eq!(Key::Space.to_string(), "space");
        assert_eq!(Key::Digit(4).to_string(), "4");
    }

    #[test]
    fn key_parsing_is_lenient() {
        assert_eq!(parse_key("Escape"), Some(Key::Escape));
        assert_eq!(parse_key(" esc "), Some(Key::Escape));
        assert_eq!(parse_key("SPACE"), Some(Key::Space));
        assert_eq!(parse_key("0"), Some(Key::Digit(0)));
        assert_eq!(parse_key("x"), None);
        assert_eq!(parse_key("12"), None);
    }

    #[test]
    fn digit_slots() {
        assert_eq!(Key::Digit(1).workspace_slot(), Some(0));
        assert_eq!(Key::Digit(9).workspace_slot(), Some(8));
        assert_eq!(Key::Digit(0).workspace_slot(), Some(9));
        assert_eq!(Key::Space.workspace_slot(), None);
    }

    #[test]
    fn deserialize_wire_format() {
        let cases = [
            (r#"{"PointerMove":{"x":500,"y":-20}}"#, Command::PointerMove { x: 500, y: -20 }),
            (r#"{"ClickLeft":{"x":1,"y":2}}"#, Command::ClickLeft { x: 1, y: 2 }),
            (r#"{"Scroll":{"dx":0,"dy":-1}}"#, Command::Scroll { dx: 0, dy: -1 }),
            (r#"{"Key":"escape"}"#, Command::Key(Key::Escape)),
            (r#"{"Key":"7"}"#, Command::Key(Key::Digit(7))),
            (r#"{"WorkspaceActivated":1002}"#, Command::WorkspaceActivated(WorkspaceId(1002))),
            (r#"{"ListedWindowActivated":42}"#, Command::ListedWindowActivated(Wid(42))),
        ];
        for (json, expected) in cases {
            let cmd: Command = serde_json::from_str(json).unwrap();
            assert_eq!(cmd, expected, "{json}");
        }
    }

    #[test]
    fn bad_key_is_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"Key":"enter"}"#).is_err());
    }

    #[test]
    fn key_serializes_as_string() {
        let json = serde_json::to_string(&Command::Key(Key::Space)).unwrap();
        assert_eq!(json, r#"{"Key":"space"}"#);
    }

    #[test]
    fn position_of_pointer_commands() {
        assert_eq!(Command::ClickRight { x: 3, y: 4 }.position(), Some((3, 4)));
        assert_eq!(Command::Key(Key::Escape).position(), None);
    }
}
