//! Surface Reconciler.
//!
//! Folds [`SyncEvent`]s plus the passage of time into a [`DisplaySet`].
//! Time is passed in explicitly so the logic stays synchronous and
//! deterministic; [`crate::CanvasSession`] owns the single timer that
//! calls [`Reconciler::expire`].
//!
//! Every ghost carries its own expiry instant. A snapshot that removes
//! surfaces gives all of its new ghosts one shared deadline; a `remove`
//! event gives its ghost a fresh one. On expiry the set is re-derived from
//! the latest live state, so a surface that came back in the meantime is
//! never dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use surface_sync_core::types::{Surface, SyncEvent};

/// One entry of the display set.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySurface {
    pub surface: Surface,
    /// Removed by the server and animating out.
    pub exiting: bool,
}

impl DisplaySurface {
    pub fn id(&self) -> &str {
        &self.surface.id
    }
}

/// Ordered render list: present entries first, then ghosts in removal order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplaySet {
    entries: Vec<DisplaySurface>,
}

impl DisplaySet {
    pub fn entries(&self) -> &[DisplaySurface] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DisplaySurface> {
        self.entries.iter().find(|e| e.surface.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DisplaySurface> {
        self.entries.iter()
    }

    pub fn present(&self) -> impl Iterator<Item = &DisplaySurface> {
        self.entries.iter().filter(|e| !e.exiting)
    }

    pub fn exiting(&self) -> impl Iterator<Item = &DisplaySurface> {
        self.entries.iter().filter(|e| e.exiting)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.surface.id.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a DisplaySet {
    type Item = &'a DisplaySurface;
    type IntoIter = std::slice::Iter<'a, DisplaySurface>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Clone)]
struct Ghost {
    surface: Surface,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct Reconciler {
    exit_duration: Duration,
    /// Latest known live set, in first-sight order.
    live: Vec<Surface>,
    ghosts: Vec<Ghost>,
    display: Arc<DisplaySet>,
}

impl Reconciler {
    pub fn new(exit_duration: Duration) -> Self {
        Self {
            exit_duration,
            live: Vec::new(),
            ghosts: Vec::new(),
            display: Arc::new(DisplaySet::default()),
        }
    }

    /// Current display set. Each recomputation swaps in a new `Arc`.
    pub fn display(&self) -> Arc<DisplaySet> {
        self.display.clone()
    }

    /// Latest live surfaces, without ghosts.
    pub fn live(&self) -> &[Surface] {
        &self.live
    }

    /// Apply one event. Returns whether the display set changed.
    pub fn apply(&mut self, event: SyncEvent, now: Instant) -> bool {
        match event {
            SyncEvent::Snapshot(surfaces) => self.apply_snapshot(surfaces, now),
            SyncEvent::Upsert(surface) => self.apply_upsert(surface),
            SyncEvent::Remove(id) => self.apply_remove(&id, now),
        }
        self.rebuild()
    }

    /// Drop ghosts whose exit time has passed. Returns whether the display set changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let live = &self.live;
        self.ghosts
            .retain(|g| g.expires_at > now && !live.iter().any(|s| s.id == g.surface.id));
        self.rebuild()
    }

    /// When the next ghost is due to be dropped.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.ghosts.iter().map(|g| g.expires_at).min()
    }

    fn apply_snapshot(&mut self, surfaces: Vec<Surface>, now: Instant) {
        let mut next: Vec<Surface> = Vec::with_capacity(surfaces.len());
        for surface in surfaces {
            match next.iter_mut().find(|s| s.id == surface.id) {
                Some(existing) => *existing = surface,
                None => next.push(surface),
            }
        }

        let removed: Vec<Surface> = self
            .live
            .iter()
            .filter(|s| !next.iter().any(|n| n.id == s.id))
            .cloned()
            .collect();

        self.live = next;

        if removed.is_empty() {
            self.ghosts.clear();
        } else {
            debug!(removed = removed.len(), "Snapshot removed surfaces");
            let expires_at = now + self.exit_duration;
            self.ghosts = removed
                .into_iter()
                .map(|surface| Ghost { surface, expires_at })
                .collect();
        }
    }

    fn apply_upsert(&mut self, surface: Surface) {
        if let Some(pos) = self.ghosts.iter().position(|g| g.surface.id == surface.id) {
            // Back from the dead: present again, at the end
            self.ghosts.remove(pos);
            self.live.push(surface);
            return;
        }

        match self.live.iter_mut().find(|s| s.id == surface.id) {
            Some(existing) => *existing = surface,
            None => self.live.push(surface),
        }
    }

    fn apply_remove(&mut self, id: &str, now: Instant) {
        let Some(pos) = self.live.iter().position(|s| s.id == id) else {
            return;
        };
        let surface = self.live.remove(pos);
        self.ghosts.push(Ghost {
            surface,
            expires_at: now + self.exit_duration,
        });
    }

    fn rebuild(&mut self) -> bool {
        let entries = self
            .live
            .iter()
            .map(|s| DisplaySurface {
                surface: s.clone(),
                exiting: false,
            })
            .chain(self.ghosts.iter().map(|g| DisplaySurface {
                surface: g.surface.clone(),
                exiting: true,
            }))
            .collect();
        let next = DisplaySet { entries };

        if next == *self.display {
            return false;
        }
        self.display = Arc::new(next);
        true
    }
}
