//! Plain geometry shared by the model, the snapping engine and the
//! controller.
//!
//! Two rectangle shapes coexist:
//!
//! * [`Rect`] is the window-manager view: origin plus size (`x, y, w, h`).
//! * [`Area`] is the edge view: two corners (`x0, y0, x1, y1`).  The
//!   snapping engine works exclusively with areas because overlap tests are
//!   simpler on closed intervals.
//!
//! All coordinates are absolute virtual-screen pixels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four corners of a window, numbered clockwise from the
/// top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Corner {
    TopLeft = 0,
    TopRight = 1,
    BottomRight = 2,
    BottomLeft = 3,
}

impl Corner {
    /// All corners in clockwise order.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    /// Corner index `0..=3`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Build a corner from its index; `None` outside `0..=3`.
    pub fn from_index(index: usize) -> Option<Corner> {
        Self::ALL.get(index).copied()
    }

    /// The diagonally opposite corner.
    pub fn opposite(self) -> Corner {
        Self::ALL[(self.index() + 2) % 4]
    }

    /// The next corner going clockwise.
    pub fn next(self) -> Corner {
        Self::ALL[(self.index() + 1) % 4]
    }

    /// The next corner going counter-clockwise.
    pub fn previous(self) -> Corner {
        Self::ALL[(self.index() + 3) % 4]
    }

    /// Whether the corner lies on the right-hand edge.
    pub fn is_right(self) -> bool {
        matches!(self, Corner::TopRight | Corner::BottomRight)
    }

    /// Whether the corner lies on the bottom edge.
    pub fn is_bottom(self) -> bool {
        matches!(self, Corner::BottomRight | Corner::BottomLeft)
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corner::TopLeft => write!(f, "top-left"),
            Corner::TopRight => write!(f, "top-right"),
            Corner::BottomRight => write!(f, "bottom-right"),
            Corner::BottomLeft => write!(f, "bottom-left"),
        }
    }
}

/// A window rectangle: origin plus size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// First column to the right of the rectangle.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }

    /// First row below the rectangle.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }

    /// Size as `(w, h)`.
    pub fn size(&self) -> (i32, i32) {
        (self.w, self.h)
    }

    /// Edge view of the rectangle.
    pub fn area(&self) -> Area {
        Area::new(self.x, self.y, self.right(), self.bottom())
    }

    /// Coordinates of `corner`.
    pub fn corner(&self, corner: Corner) -> (i32, i32) {
        let x = if corner.is_right() { self.right() } else { self.x };
        let y = if corner.is_bottom() { self.bottom() } else { self.y };
        (x, y)
    }

    /// Rectangle of size `(w, h)` whose `corner` sits at `point`.
    pub fn with_corner_at(w: i32, h: i32, corner: Corner, point: (i32, i32)) -> Rect {
        let x = if corner.is_right() { point.0.saturating_sub(w) } else { point.0 };
        let y = if corner.is_bottom() { point.1.saturating_sub(h) } else { point.1 };
        Rect::new(x, y, w, h)
    }

    /// Rectangle spanned by a pinned `anchor` and the `tracked` corner placed
    /// at `point`.
    ///
    /// The anchor is the corner opposite to `tracked`.  Returns `None` unless
    /// `point` lies strictly on the `tracked` side of the anchor on both
    /// axes, i.e. the drag did not collapse or invert the rectangle.
    pub fn from_corners(anchor: (i32, i32), tracked: Corner, point: (i32, i32)) -> Option<Rect> {
        let dx = point.0.saturating_sub(anchor.0);
        let dy = point.1.saturating_sub(anchor.1);
        let x_ok = if tracked.is_right() { dx > 0 } else { dx < 0 };
        let y_ok = if tracked.is_bottom() { dy > 0 } else { dy < 0 };
        if !(x_ok && y_ok) {
            return None;
        }
        Some(Rect::new(
            anchor.0.min(point.0),
            anchor.1.min(point.1),
            dx.saturating_abs(),
            dy.saturating_abs(),
        ))
    }

    /// Same rectangle moved by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.w, self.h)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.w, self.h, self.x, self.y)
    }
}

/// A rectangle described by two corners, `(x0, y0)` inclusive and
/// `(x1, y1)` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Area {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Area {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Overlapping part of two areas, or `None` when they merely touch or are
    /// disjoint.
    pub fn intersection(&self, other: &Area) -> Option<Area> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        (x0 < x1 && y0 < y1).then_some(Area::new(x0, y0, x1, y1))
    }

    /// Same area moved by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Area {
        Area::new(
            self.x0.saturating_add(dx),
            self.y0.saturating_add(dy),
            self.x1.saturating_add(dx),
            self.y1.saturating_add(dy),
        )
    }
}

//  Tests
