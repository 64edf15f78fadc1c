//! The gallery's state machine: discovered photo sources, the current selection, gestures and
//! the fullscreen flag.
//!
//! The machine starts `empty` and becomes `populated` with the first discovered photo; it never
//! reaches a terminal state. Every operation is defensive: out-of-range selections and empty
//! galleries degrade to "nothing shown", never an error.

use std::path::{Path, PathBuf};

/// The least horizontal drag that counts as a swipe in the main view.
pub const MAIN_SWIPE_THRESHOLD: f32 = 50.0;

/// The least horizontal drag that counts as a swipe in the fullscreen viewer.
pub const FULLSCREEN_SWIPE_THRESHOLD: f32 = 60.0;

/// The outcome of a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The photo at the contained index is now current.
    Shown(usize),
    /// The target didn't exist; the main image is hidden and the fallback shown. The current
    /// index is left untouched.
    Hidden,
}

/// The single record of everything the gallery knows.
#[derive(Debug, Default, Clone)]
pub struct GalleryState {
    /// Discovered photo sources, in discovery order.
    sources: Vec<PathBuf>,
    /// Index of the current photo. `None` until the first discovery.
    current: Option<usize>,
    /// Whether the fullscreen viewer is open.
    fullscreen: bool,
}

impl GalleryState {
    /// How many photos have been discovered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the machine is still in its `empty` state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// All discovered sources, in discovery order.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// The current index, if any photo is selected.
    #[must_use]
    pub const fn current(&self) -> Option<usize> {
        self.current
    }

    /// The current photo's source, if any.
    #[must_use]
    pub fn current_source(&self) -> Option<&Path> {
        self.sources.get(self.current?).map(PathBuf::as_path)
    }

    /// Whether the fullscreen viewer is open.
    #[must_use]
    pub const fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Append a discovered source, skipping duplicates. The first discovery immediately becomes
    /// the current photo. Returns the new source's index, or `None` for a duplicate.
    pub fn add_source(&mut self, source: PathBuf) -> Option<usize> {
        if self.sources.contains(&source) {
            tracing::debug!("Skipping duplicate photo source: {source:?}");
            return None;
        }
        let index = self.sources.len();
        self.sources.push(source);
        if self.current.is_none() {
            self.current = Some(index);
        }
        Some(index)
    }

    /// Make the photo at `index` current. A target that doesn't exist hides the main image and
    /// leaves the rest of the state untouched.
    pub fn select(&mut self, index: usize) -> Selection {
        if index >= self.sources.len() {
            return Selection::Hidden;
        }
        self.current = Some(index);
        Selection::Shown(index)
    }

    /// Move the selection by `delta` with wraparound. Does nothing while the gallery is empty.
    pub fn step(&mut self, delta: i64) -> Option<usize> {
        let length = i64::try_from(self.sources.len()).ok()?;
        if length == 0 {
            return None;
        }
        let current = i64::try_from(self.current.unwrap_or(0)).ok()?;
        let next = (current + delta).rem_euclid(length);
        let next = usize::try_from(next).ok()?;
        self.current = Some(next);
        Some(next)
    }

    /// Interpret a horizontal drag. Swipes need at least one photo to move away from, a drag
    /// below the view's threshold is not a gesture at all, and a leftward drag (positive
    /// distance) advances.
    pub fn swipe(&mut self, start_x: f32, end_x: f32) -> Option<usize> {
        if self.sources.len() <= 1 {
            return None;
        }
        let distance = start_x - end_x;
        let threshold = if self.fullscreen {
            FULLSCREEN_SWIPE_THRESHOLD
        } else {
            MAIN_SWIPE_THRESHOLD
        };
        if distance.abs() < threshold {
            return None;
        }
        self.step(if distance > 0.0 { 1 } else { -1 })
    }

    /// Advance on the autoplay timer. Only fires when there is more than one photo; fires
    /// regardless of user activity or the fullscreen state.
    pub fn autoplay_tick(&mut self) -> Option<usize> {
        if self.sources.len() <= 1 {
            return None;
        }
        self.step(1)
    }

    /// Open the fullscreen viewer over the current photo. There is nothing to go fullscreen
    /// with until a photo is shown.
    pub fn open_fullscreen(&mut self) -> Option<&Path> {
        if self.current_source().is_none() {
            return None;
        }
        self.fullscreen = true;
        self.current_source()
    }

    /// Close the fullscreen viewer.
    pub fn close_fullscreen(&mut self) {
        self.fullscreen = false;
    }
}
