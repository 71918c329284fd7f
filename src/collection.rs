//! The ordered set of windows handled in one session.
//!
//! [`WindowsCollection`] owns the [`WindowModel`]s in the backend's stacking
//! order.  Walking through them is done with a separate
//! [`CollectionCursor`], so the controller can hold the cursor and mutate
//! models in the collection at the same time.

use crate::geometry::Rect;
use crate::model::{Change, IconImage, SizeLimits, Wid, WindowModel, WorkspaceId};
use crate::traits::PlatformBackend;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Errors from mutating the collection.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("window {0} is already in the collection")]
    Duplicate(Wid),
}

/// `(wid, title, icon)` triple for the presentation's "remaining" list.
#[derive(Debug, Clone, Serialize)]
pub struct ListingEntry {
    pub wid: Wid,
    pub title: String,
    pub icon: Option<Arc<IconImage>>,
}

/// Persisted form of one changed window.
///
/// A missing `changed` means "position unchanged"; a missing `changed_ws`
/// means "workspace unchanged".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub wid: Wid,
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_ws: Option<WorkspaceId>,
    pub resizable: bool,
    pub restored: bool,
    pub title: String,
    pub application: String,
    pub workspace: WorkspaceId,
}

impl From<&WindowModel> for ExportRecord {
    fn from(model: &WindowModel) -> Self {
        Self {
            wid: model.wid(),
            rect: model.rect(),
            changed: model.changed(),
            changed_ws: model.changed_ws(),
            resizable: model.resizable(),
            restored: model.restored(),
            title: model.title().to_string(),
            application: model.name().to_string(),
            workspace: model.workspace(),
        }
    }
}

/// Ordered sequence of [`WindowModel`]s.
#[derive(Debug, Default)]
pub struct WindowsCollection {
    models: Vec<WindowModel>,
    limits: SizeLimits,
    /// Bumped by [`clear`](Self::clear) so stale cursors stop yielding.
    generation: u64,
}

impl WindowsCollection {
    pub fn new(limits: SizeLimits) -> Self {
        Self {
            models: Vec::new(),
            limits,
            generation: 0,
        }
    }

    /// Build the collection from everything `backend` enumerates.
    ///
    /// Each native window goes through
    /// [`is_eligible`](PlatformBackend::is_eligible), then
    /// [`inspect`](PlatformBackend::inspect).  Windows smaller than the
    /// minimum size are left out as well.
    pub fn from_backend<B: PlatformBackend>(backend: &B, limits: SizeLimits) -> Self {
        let mut collection = Self::new(limits);
        for handle in backend.enumerate_windows() {
            if !backend.is_eligible(&handle) {
                continue;
            }
            let Some(info) = backend.inspect(&handle) else {
                continue;
            };
            if !limits.admits(&info.rect) {
                debug!("skipping {} ({}): smaller than minimum size", info.wid, info.rect);
                continue;
            }
            if let Err(e) = collection.add(WindowModel::from(info)) {
                debug!("{}", e);
            }
        }
        collection
    }

    /// Append `model`.
    pub fn add(&mut self, model: WindowModel) -> Result<(), CollectionError> {
        if self.lookup(model.wid()).is_some() {
            return Err(CollectionError::Duplicate(model.wid()));
        }
        self.models.push(model);
        Ok(())
    }

    /// Drop every model and invalidate outstanding cursors.
    pub fn clear(&mut self) {
        self.models.clear();
        self.generation += 1;
    }

    pub fn size(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn limits(&self) -> &SizeLimits {
        &self.limits
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowModel> {
        self.models.iter()
    }

    pub fn lookup(&self, wid: Wid) -> Option<&WindowModel> {
        self.models.iter().find(|m| m.wid() == wid)
    }

    fn position(&self, wid: Wid) -> Option<usize> {
        self.models.iter().position(|m| m.wid() == wid)
    }

    /// Apply `change` to the model with `wid`, using the collection's size
    /// limits.  Returns `false` if the window is unknown or the change was
    /// rejected.
    pub fn set_changed(&mut self, wid: Wid, change: Change) -> bool {
        let limits = self.limits;
        match self.models.iter_mut().find(|m| m.wid() == wid) {
            Some(model) => model.set_changed(change, &limits),
            None => false,
        }
    }

    /// Whether any model carries a pending change.
    pub fn has_changes(&self) -> bool {
        self.models.iter().any(WindowModel::is_changed)
    }

    /// Listing of every model in order, optionally without the first one.
    pub fn listing(&self, skip_first: bool) -> Vec<ListingEntry> {
        self.models
            .iter()
            .skip(usize::from(skip_first))
            .map(listing_entry)
            .collect()
    }

    /// Records for every changed window, in collection order.
    pub fn export(&self) -> Vec<ExportRecord> {
        self.models
            .iter()
            .filter(|m| m.is_changed())
            .map(ExportRecord::from)
            .collect()
    }

    /// Cursor over the whole collection, from the start.
    pub fn cursor(&self) -> CollectionCursor {
        CollectionCursor {
            generation: self.generation,
            pending: (0..self.models.len()).collect(),
            current: None,
        }
    }
}

fn listing_entry(model: &WindowModel) -> ListingEntry {
    ListingEntry {
        wid: model.wid(),
        title: model.title().to_string(),
        icon: model.icon().cloned(),
    }
}

/// Explicit iterator over a [`WindowsCollection`].
///
/// Every model is yielded at most once.  The cursor holds indices only; it
/// stops yielding once the collection it was created from is
/// [`clear`](WindowsCollection::clear)ed.
#[derive(Debug, Clone)]
pub struct CollectionCursor {
    generation: u64,
    pending: VecDeque<usize>,
    current: Option<usize>,
}

impl CollectionCursor {
    /// Move to the next model.  `None` once exhausted.
    pub fn advance<'a>(&mut self, collection: &'a WindowsCollection) -> Option<&'a WindowModel> {
        if self.generation != collection.generation {
            self.pending.clear();
            self.current = None;
            return None;
        }
        self.current = self.pending.pop_front();
        self.current.and_then(|idx| collection.models.get(idx))
    }

    /// Model the cursor currently rests on.
    pub fn current<'a>(&self, collection: &'a WindowsCollection) -> Option<&'a WindowModel> {
        if self.generation != collection.generation {
            return None;
        }
        self.current.and_then(|idx| collection.models.get(idx))
    }

    /// Re-point the cursor so the next [`advance`](Self::advance) yields
    /// `wid`.
    ///
    /// Not-yet-visited models that came before `wid` are moved behind it,
    /// so each is still yielded once.  Re-pointing to the current model
    /// queues it again.  Returns `false` if `wid` is neither pending nor
    /// current.
    pub fn repoint(&mut self, collection: &WindowsCollection, wid: Wid) -> bool {
        if self.generation != collection.generation {
            return false;
        }
        let Some(idx) = collection.position(wid) else {
            return false;
        };
        if self.current == Some(idx) {
            self.pending.push_front(idx);
            self.current = None;
            return true;
        }
        match self.pending.iter().position(|&p| p == idx) {
            Some(at) => {
                self.pending.rotate_left(at);
                true
            }
            None => false,
        }
    }

    /// Whether nothing is left to yield.
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    /// Listing of the models still to come, excluding the current one.
    pub fn remaining(&self, collection: &WindowsCollection) -> Vec<ListingEntry> {
        if self.generation != collection.generation {
            return Vec::new();
        }
        self.pending
            .iter()
            .filter_map(|&idx| collection.models.get(idx))
            .map(listing_entry)
            .collect()
    }
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::info;

    fn collection(n: u64) -> WindowsCollection {
        let mut c = WindowsCollection::new(SizeLimits::default());
        for wid in 1..=n {
            c.add(WindowModel::from(info(wid, Rect::new(0, 0, 400, 300), true)))
                .unwrap();
        }
        c
    }

    fn drain(cursor: &mut CollectionCursor, c: &WindowsCollection) -> Vec<u64> {
        let mut out = Vec::new();
        while let Some(m) = cursor.advance(c) {
            out.push(m.wid().0);
        }
        out
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut c = collection(2);
        let dup = WindowModel::from(info(2, Rect::new(0, 0, 400, 300), true));
        assert!(c.add(dup).is_err());
        assert_eq!(c.size(), 2);
    }

    #[test]
    fn cursor_yields_each_model_once() {
        let c = collection(4);
        let mut cursor = c.cursor();
        assert_eq!(drain(&mut cursor, &c), vec![1, 2, 3, 4]);
        assert!(cursor.advance(&c).is_none());
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn clear_invalidates_cursor() {
        let mut c = collection(3);
        let mut cursor = c.cursor();
        cursor.advance(&c);
        c.clear();
        assert_eq!(c.size(), 0);
        assert!(cursor.advance(&c).is_none());
    }

    #[test]
    fn repoint_moves_skipped_models_behind() {
        let c = collection(5);
        let mut cursor = c.cursor();
        assert_eq!(cursor.advance(&c).map(|m| m.wid().0), Some(1));
        assert!(cursor.repoint(&c, Wid(4)));
        assert_eq!(drain(&mut cursor, &c), vec![4, 5, 2, 3]);
    }

    #[test]
    fn repoint_current_restarts_it() {
        let c = collection(3);
        let mut cursor = c.cursor();
        cursor.advance(&c);
        cursor.advance(&c);
        assert!(cursor.repoint(&c, Wid(2)));
        assert_eq!(drain(&mut cursor, &c), vec![2, 3]);
    }

    #[test]
    fn repoint_to_visited_or_unknown_fails() {
        let c = collection(3);
        let mut cursor = c.cursor();
        cursor.advance(&c);
        cursor.advance(&c);
        assert!(!cursor.repoint(&c, Wid(1)));
        assert!(!cursor.repoint(&c, Wid(99)));
    }

    #[test]
    fn remaining_excludes_current() {
        let c = collection(3);
        let mut cursor = c.cursor();
        cursor.advance(&c);
        let wids: Vec<u64> = cursor.remaining(&c).iter().map(|e| e.wid.0).collect();
        assert_eq!(wids, vec![2, 3]);
        let all: Vec<u64> = c.listing(true).iter().map(|e| e.wid.0).collect();
        assert_eq!(all, vec![2, 3]);
    }

    #[test]
    fn export_only_changed_models() {
        let mut c = collection(3);
        assert!(!c.has_changes());
        assert!(c.set_changed(Wid(2), Change::position(10, 10)));
        assert!(c.set_changed(Wid(3), Change::Workspace(WorkspaceId(1001))));
        let records = c.export();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].wid, Wid(2));
        assert_eq!(records[0].changed, Some(Rect::new(10, 10, 400, 300)));
        assert_eq!(records[0].changed_ws, None);
        assert_eq!(records[1].changed, None);
        assert_eq!(records[1].changed_ws, Some(WorkspaceId(1001)));

        let json = serde_json::to_value(&records[1]).unwrap();
        assert!(json.get("changed").is_none());
        assert_eq!(json["changed_ws"], 1001);
    }
}
