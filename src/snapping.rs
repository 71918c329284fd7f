//! Edge snapping.
//!
//! Every window and monitor contributes four *snapping sources*: thin bands
//! of thickness `2 * snap_px` centred on each of its edges.  While the user
//! drags a ghost, the ghost's own bands (the *candidates*) are intersected
//! with the bands of everything else on the same workspace (the *targets*).
//! From the intersections, [`offset_for_intersections`] picks the nudge that
//! makes the ghost's edge coincide with the nearest target edge.
//!
//! Everything here is pure: no I/O, no clock, no backend.

use crate::collection::WindowsCollection;
use crate::geometry::{Area, Corner, Rect};
use crate::model::{Wid, WorkspaceId};
use std::collections::HashMap;

/// The axis along which a snap moves the ghost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// One side of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Top, Edge::Right, Edge::Bottom, Edge::Left];

    /// Vertical edges snap horizontally and vice versa.
    pub fn axis(self) -> Axis {
        match self {
            Edge::Left | Edge::Right => Axis::X,
            Edge::Top | Edge::Bottom => Axis::Y,
        }
    }

    /// The two corners this edge terminates in.
    pub fn corners(self) -> [Corner; 2] {
        match self {
            Edge::Top => [Corner::TopLeft, Corner::TopRight],
            Edge::Right => [Corner::TopRight, Corner::BottomRight],
            Edge::Bottom => [Corner::BottomRight, Corner::BottomLeft],
            Edge::Left => [Corner::BottomLeft, Corner::TopLeft],
        }
    }

    pub fn touches(self, corner: Corner) -> bool {
        self.corners().contains(&corner)
    }
}

/// A band around one edge of a window or monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnappingSource {
    /// The band itself.
    pub area: Area,
    pub edge: Edge,
    /// Coordinate of the real edge (`x` for vertical edges, `y` otherwise).
    pub position: i32,
    /// Window that contributed the band; `None` for monitors.
    pub owner: Option<Wid>,
}

impl SnappingSource {
    fn new(rect: &Rect, edge: Edge, snap_px: i32, owner: Option<Wid>) -> Self {
        let lo = |v: i32| v.saturating_sub(snap_px);
        let hi = |v: i32| v.saturating_add(snap_px);
        let (position, area) = match edge {
            Edge::Top => (rect.y, Area::new(lo(rect.x), lo(rect.y), hi(rect.right()), hi(rect.y))),
            Edge::Bottom => (
                rect.bottom(),
                Area::new(lo(rect.x), lo(rect.bottom()), hi(rect.right()), hi(rect.bottom())),
            ),
            Edge::Left => (
                rect.x,
                Area::new(lo(rect.x), lo(rect.y), hi(rect.x), hi(rect.bottom())),
            ),
            Edge::Right => (
                rect.right(),
                Area::new(lo(rect.right()), lo(rect.y), hi(rect.right()), hi(rect.bottom())),
            ),
        };
        Self {
            area,
            edge,
            position,
            owner,
        }
    }

    pub fn corners(&self) -> [Corner; 2] {
        self.edge.corners()
    }
}

/// The four bands of `rect`.
pub fn snapping_sources(rect: &Rect, snap_px: i32, owner: Option<Wid>) -> [SnappingSource; 4] {
    Edge::ALL.map(|edge| SnappingSource::new(rect, edge, snap_px, owner))
}

/// The two bands of `rect` that meet in `corner`.
pub fn sources_for_corner(rect: &Rect, corner: Corner, snap_px: i32) -> Vec<SnappingSource> {
    Edge::ALL
        .into_iter()
        .filter(|edge| edge.touches(corner))
        .map(|edge| SnappingSource::new(rect, edge, snap_px, None))
        .collect()
}

/// A candidate band overlapping a parallel target band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Intersection {
    pub source: SnappingSource,
    pub target: SnappingSource,
    pub overlap: Area,
}

impl Intersection {
    pub fn axis(&self) -> Axis {
        self.source.edge.axis()
    }

    /// Signed distance from the candidate edge to the target edge.
    pub fn offset(&self) -> i32 {
        self.target.position.saturating_sub(self.source.position)
    }

    /// Corners of the candidate this intersection pulls on.
    pub fn corners(&self) -> [Corner; 2] {
        self.source.corners()
    }

    fn rank(&self) -> (u32, i32, Edge, Area) {
        (self.offset().unsigned_abs(), self.offset(), self.source.edge, self.target.area)
    }
}

/// Every overlap between a candidate band and a parallel target band.
pub fn check_intersections(
    candidates: &[SnappingSource],
    targets: &[SnappingSource],
) -> Vec<Intersection> {
    let mut out = Vec::new();
    for source in candidates {
        for target in targets {
            if source.edge.axis() != target.edge.axis() {
                continue;
            }
            if let Some(overlap) = source.area.intersection(&target.area) {
                out.push(Intersection {
                    source: *source,
                    target: *target,
                    overlap,
                });
            }
        }
    }
    out
}

/// Nudge derived from a set of intersections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapOffset {
    pub dx: i32,
    pub dy: i32,
    /// Set when both axes latched onto edges meeting in the same candidate
    /// corner.
    pub corner: Option<Corner>,
}

impl SnapOffset {
    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Pick the nudge for `intersections`.
///
/// Each axis independently snaps to its nearest target edge.  If both axes
/// snap and the two chosen candidate edges share a corner, that corner is
/// reported as well.
pub fn offset_for_intersections(intersections: &[Intersection], snap_px: i32) -> SnapOffset {
    let reach = snap_px.saturating_mul(2).unsigned_abs();
    let best = |axis: Axis| {
        intersections
            .iter()
            .filter(|i| i.axis() == axis && i.offset().unsigned_abs() < reach)
            .min_by_key(|i| i.rank())
    };

    let bx = best(Axis::X);
    let by = best(Axis::Y);
    let corner = match (bx, by) {
        (Some(x), Some(y)) => {
            let ys = y.corners();
            x.corners().into_iter().find(|c| ys.contains(c))
        }
        _ => None,
    };

    SnapOffset {
        dx: bx.map_or(0, Intersection::offset),
        dy: by.map_or(0, Intersection::offset),
        corner,
    }
}

/// Snap repeatedly until the nudge settles.
///
/// `candidates(dx, dy)` yields the candidate bands of the ghost moved by the
/// offset accumulated so far.  A nudge on one axis can bring a new edge into
/// reach on the other, so the returned offset is the sum of every pass and
/// its corner is the one reported by the final, zero-offset pass.  Gives up
/// after a few passes.
pub fn settle<F>(targets: &[SnappingSource], snap_px: i32, candidates: F) -> SnapOffset
where
    F: Fn(i32, i32) -> Vec<SnappingSource>,
{
    const MAX_PASSES: usize = 8;

    let mut total = SnapOffset::default();
    for _ in 0..MAX_PASSES {
        let step = offset_for_intersections(
            &check_intersections(&candidates(total.dx, total.dy), targets),
            snap_px,
        );
        total.corner = step.corner;
        if step.is_zero() {
            break;
        }
        total.dx = total.dx.saturating_add(step.dx);
        total.dy = total.dy.saturating_add(step.dy);
    }
    total
}

/// Snapping targets of a session, grouped by workspace.
///
/// Monitor bands apply to every workspace.  Minimized windows contribute
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct SnappingIndex {
    windows: HashMap<WorkspaceId, Vec<SnappingSource>>,
    monitors: Vec<SnappingSource>,
}

impl SnappingIndex {
    /// Index the current (pending-aware) geometry of every window in
    /// `collection` plus `monitors`.
    pub fn build(collection: &WindowsCollection, monitors: &[Rect], snap_px: i32) -> Self {
        let mut windows: HashMap<WorkspaceId, Vec<SnappingSource>> = HashMap::new();
        for model in collection.iter().filter(|m| m.restored()) {
            windows
                .entry(model.target_workspace())
                .or_default()
                .extend(snapping_sources(&model.target_rect(), snap_px, Some(model.wid())));
        }
        let monitors = monitors
            .iter()
            .flat_map(|m| snapping_sources(m, snap_px, None))
            .collect();
        Self { windows, monitors }
    }

    /// Targets on `workspace`, without those contributed by `exclude`.
    pub fn targets(&self, workspace: WorkspaceId, exclude: Option<Wid>) -> Vec<SnappingSource> {
        let windows = self.windows.get(&workspace).into_iter().flatten();
        self.monitors
            .iter()
            .chain(windows)
            .filter(|s| exclude.is_none() || s.owner != exclude)
            .copied()
            .collect()
    }
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::info;
    use crate::model::{SizeLimits, WindowModel};

    const SNAP: i32 = 10;

    fn sorted(mut v: Vec<Intersection>) -> Vec<(i32, Edge, Area, Area)> {
        let mut keys: Vec<_> = v
            .drain(..)
            .map(|i| (i.offset(), i.source.edge, i.target.area, i.overlap))
            .collect();
        keys.sort();
        keys
    }

    #[test]
    fn bands_are_centred_on_edges() {
        let [top, right, bottom, left] = snapping_sources(&Rect::new(100, 200, 50, 40), SNAP, None);
        assert_eq!(top.area, Area::new(90, 190, 160, 210));
        assert_eq!(right.position, 150);
        assert_eq!(right.area, Area::new(140, 190, 160, 250));
        assert_eq!(bottom.position, 240);
        assert_eq!(left.area, Area::new(90, 190, 110, 250));
    }

    #[test]
    fn corner_sources_touch_the_corner() {
        let sources = sources_for_corner(&Rect::new(0, 0, 100, 100), Corner::BottomRight, SNAP);
        let edges: Vec<Edge> = sources.iter().map(|s| s.edge).collect();
        assert_eq!(edges, vec![Edge::Right, Edge::Bottom]);
    }

    #[test]
    fn no_intersections_no_offset() {
        assert_eq!(offset_for_intersections(&[], SNAP), SnapOffset::default());
    }

    #[test]
    fn single_axis_snap() {
        let candidate = snapping_sources(&Rect::new(783, 110, 200, 150), SNAP, None);
        let target = snapping_sources(&Rect::new(800, 0, 400, 300), SNAP, Some(Wid(2)));
        let hits = check_intersections(&candidate, &target);
        let off = offset_for_intersections(&hits, SNAP);
        assert_eq!(off, SnapOffset { dx: 17, dy: 0, corner: None });
    }

    #[test]
    fn perpendicular_bands_never_intersect() {
        let candidate = snapping_sources(&Rect::new(0, 0, 100, 100), SNAP, None);
        let hits = check_intersections(&candidate, &candidate);
        assert!(hits.iter().all(|i| i.source.edge.axis() == i.target.edge.axis()));
    }

    #[test]
    fn corner_snap_reports_shared_corner() {
        // Ghost whose bottom-right corner sits just off the top-left corner
        // of a target window.
        let ghost = Rect::new(0, 0, 295, 196);
        let candidate = snapping_sources(&ghost, SNAP, None);
        let target = snapping_sources(&Rect::new(300, 200, 100, 100), SNAP, None);
        let off = offset_for_intersections(&check_intersections(&candidate, &target), SNAP);
        assert_eq!(off.dx, 5);
        assert_eq!(off.dy, 4);
        assert_eq!(off.corner, Some(Corner::BottomRight));
    }

    #[test]
    fn nearest_target_wins() {
        let candidate = sources_for_corner(&Rect::new(100, 500, 200, 100), Corner::TopLeft, SNAP);
        let near = snapping_sources(&Rect::new(0, 0, 103, 1000), SNAP, None);
        let far = snapping_sources(&Rect::new(0, 0, 88, 1000), SNAP, None);
        let targets: Vec<_> = near.iter().chain(far.iter()).copied().collect();
        let off = offset_for_intersections(&check_intersections(&candidate, &targets), SNAP);
        assert_eq!(off.dx, 3);
    }

    #[test]
    fn intersections_ignore_target_order() {
        let candidate = snapping_sources(&Rect::new(195, 95, 300, 200), SNAP, None);
        let mut targets: Vec<SnappingSource> = [
            Rect::new(0, 0, 200, 100),
            Rect::new(500, 0, 100, 300),
            Rect::new(190, 290, 300, 100),
            Rect::new(0, 0, 1920, 1080),
        ]
        .iter()
        .flat_map(|r| snapping_sources(r, SNAP, None))
        .collect();

        let forward = sorted(check_intersections(&candidate, &targets));
        targets.reverse();
        let backward = sorted(check_intersections(&candidate, &targets));
        targets.rotate_left(5);
        let rotated = sorted(check_intersections(&candidate, &targets));
        assert!(!forward.is_empty());
        assert_eq!(forward, backward);
        assert_eq!(forward, rotated);

        let a = offset_for_intersections(&check_intersections(&candidate, &targets), SNAP);
        targets.reverse();
        let b = offset_for_intersections(&check_intersections(&candidate, &targets), SNAP);
        assert_eq!(a, b);
    }

    fn bands(rects: &[Rect]) -> Vec<SnappingSource> {
        rects.iter().flat_map(|r| snapping_sources(r, SNAP, None)).collect()
    }

    #[test]
    fn applying_offset_locks_the_snap() {
        let neighbour_on_monitor =
            bands(&[Rect::new(800, 0, 400, 300), Rect::new(0, 0, 1920, 1080)]);
        // Moving right onto the monitor edge brings the window's bottom
        // edge into reach of the ghost's top edge.
        let window_past_monitor =
            bands(&[Rect::new(0, 0, 985, 1080), Rect::new(1000, 0, 100, 300)]);
        let fixtures = [
            (&neighbour_on_monitor, Rect::new(783, 110, 200, 150)),
            (&neighbour_on_monitor, Rect::new(795, 305, 200, 150)),
            (&neighbour_on_monitor, Rect::new(1190, 20, 300, 200)),
            (&neighbour_on_monitor, Rect::new(7, 1075, 100, 100)),
            (&window_past_monitor, Rect::new(770, 305, 200, 150)),
        ];
        for (targets, ghost) in fixtures {
            let off = settle(targets, SNAP, |dx, dy| {
                snapping_sources(&ghost.translated(dx, dy), SNAP, None).to_vec()
            });
            let locked = ghost.translated(off.dx, off.dy);
            let again = offset_for_intersections(
                &check_intersections(&snapping_sources(&locked, SNAP, None), targets),
                SNAP,
            );
            assert!(again.is_zero(), "{ghost:?} -> {locked:?}: {again:?}");
        }
    }

    #[test]
    fn settling_follows_newly_reached_edges() {
        let targets = bands(&[Rect::new(0, 0, 985, 1080), Rect::new(1000, 0, 100, 300)]);
        let ghost = Rect::new(770, 305, 200, 150);
        let once = offset_for_intersections(
            &check_intersections(&snapping_sources(&ghost, SNAP, None), &targets),
            SNAP,
        );
        assert_eq!(once, SnapOffset { dx: 15, dy: 0, corner: None });

        let off = settle(&targets, SNAP, |dx, dy| {
            snapping_sources(&ghost.translated(dx, dy), SNAP, None).to_vec()
        });
        assert_eq!(off, SnapOffset { dx: 15, dy: -5, corner: Some(Corner::TopRight) });
    }

    #[test]
    fn settling_without_targets_is_a_no_op() {
        let off = settle(&[], SNAP, |dx, dy| {
            snapping_sources(&Rect::new(dx, dy, 100, 100), SNAP, None).to_vec()
        });
        assert_eq!(off, SnapOffset::default());
    }

    #[test]
    fn extreme_rectangles_do_not_overflow() {
        let ghost = Rect::new(i32::MAX - 5, i32::MIN, 400, 300);
        let targets = bands(&[Rect::new(i32::MAX - 10, i32::MIN, 10, 10)]);
        let hits = check_intersections(&snapping_sources(&ghost, SNAP, None), &targets);
        assert!(!hits.is_empty());
        // Both right edges sit at the saturated limit.
        assert!(offset_for_intersections(&hits, SNAP).is_zero());
    }

    #[test]
    fn index_groups_by_workspace_and_excludes_owner() {
        let mut c = WindowsCollection::new(SizeLimits::default());
        let mut second = info(2, Rect::new(800, 0, 400, 300), true);
        second.workspace = WorkspaceId(1);
        c.add(WindowModel::from(info(1, Rect::new(0, 0, 400, 300), true))).unwrap();
        c.add(WindowModel::from(second)).unwrap();

        let index = SnappingIndex::build(&c, &[Rect::new(0, 0, 1920, 1080)], SNAP);
        assert_eq!(index.targets(WorkspaceId(0), None).len(), 8);
        assert_eq!(index.targets(WorkspaceId(0), Some(Wid(1))).len(), 4);
        assert_eq!(index.targets(WorkspaceId(1), None).len(), 8);
        assert_eq!(index.targets(WorkspaceId(7), None).len(), 4);
    }
}
