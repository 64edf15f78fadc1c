//! The stage: a shared arena of short-lived decorative elements.
//!
//! Emitters insert elements and immediately forget about them. Each element is removed either by
//! its own expiry task or in bulk by a tag query; nothing else tracks them. The stage itself
//! knows nothing about how elements are drawn, it just holds their custom style properties for
//! the display layer to interpret.

use std::sync::Arc;

/// The tag class for floating cake decorations.
pub const FLOATING_CAKE_TAG: &str = "floating-cake";

/// The colour scheme of one decorative element.
#[derive(Clone, Copy, Debug)]
#[expect(clippy::exhaustive_structs, reason = "It's a plain bag of three colours")]
pub struct Palette {
    /// The body colour.
    pub fill: crate::canvas::Colour,
    /// The icing colour.
    pub icing: crate::canvas::Colour,
    /// The cherry/candle accent colour.
    pub cherry: crate::canvas::Colour,
}

/// A short-lived decorative element and its custom style properties. Sizes and drifts are in
/// the card's design units; the display layer maps those to terminal pixels however it likes.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Element {
    /// Identity, for targeted removal. Assigned by [`Stage::insert`].
    pub id: u64,
    /// The element's tag class, for bulk removal.
    pub tag: &'static str,
    /// When the element appeared.
    pub spawned_at: tokio::time::Instant,
    /// How long the element's animation runs.
    pub duration: std::time::Duration,
    /// Horizontal position as a percentage of the viewport width.
    pub left_percent: f32,
    /// Vertical position as a percentage of the viewport height.
    pub top_percent: f32,
    /// Icon size in design units.
    pub size: f32,
    /// The soft background accent's size in design units.
    pub accent_size: f32,
    /// Start rotation in degrees.
    pub rotation: f32,
    /// Rotation change over the animation in degrees.
    pub rotation_delta: f32,
    /// Horizontal drift at the start of the animation, in design units.
    pub drift_start: f32,
    /// Horizontal drift at the end of the animation, in design units.
    pub drift_end: f32,
    /// Colour scheme.
    pub palette: Palette,
    /// Which icon variant to draw.
    pub icon: usize,
}

impl Element {
    /// Progress through the animation, clamped to `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        let duration = self.duration.as_secs_f32();
        if duration <= f32::EPSILON {
            return 1.0;
        }
        (self.spawned_at.elapsed().as_secs_f32() / duration).clamp(0.0, 1.0)
    }
}

/// The arena of live decorative elements.
#[derive(Default)]
pub struct Stage {
    /// The id handed to the next insert.
    next_id: u64,
    /// Live elements, in insertion order.
    elements: Vec<Element>,
}

impl Stage {
    /// Add an element, returning the id that can later remove it.
    pub fn insert(&mut self, mut element: Element) -> u64 {
        self.next_id += 1;
        element.id = self.next_id;
        self.elements.push(element);
        self.next_id
    }

    /// Remove a single element. Removing an id that has already gone is fine: bulk removal and
    /// expiry race each other by design.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.elements.len();
        self.elements.retain(|element| element.id != id);
        self.elements.len() != before
    }

    /// Remove every element carrying the tag, returning how many went.
    pub fn remove_by_tag(&mut self, tag: &str) -> usize {
        let before = self.elements.len();
        self.elements.retain(|element| element.tag != tag);
        before - self.elements.len()
    }

    /// All live elements, in insertion order.
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// How many live elements carry the tag.
    #[must_use]
    pub fn count_by_tag(&self, tag: &str) -> usize {
        self.elements
            .iter()
            .filter(|element| element.tag == tag)
            .count()
    }
}

/// The stage shared between an emitter and the display layer.
pub type SharedStage = Arc<tokio::sync::RwLock<Stage>>;

#[cfg(test)]
mod test {
    use super::*;

    fn element(tag: &'static str) -> Element {
        Element {
            id: 0,
            tag,
            spawned_at: tokio::time::Instant::now(),
            duration: std::time::Duration::from_secs(5),
            left_percent: 50.0,
            top_percent: 50.0,
            size: 20.0,
            accent_size: 22.0,
            rotation: 0.0,
            rotation_delta: 0.0,
            drift_start: 0.0,
            drift_end: 0.0,
            palette: Palette {
                fill: crate::canvas::WHITE,
                icing: crate::canvas::WHITE,
                cherry: crate::canvas::WHITE,
            },
            icon: 0,
        }
    }

    #[tokio::test]
    async fn inserted_elements_get_unique_ids() {
        let mut stage = Stage::default();
        let first = stage.insert(element(FLOATING_CAKE_TAG));
        let second = stage.insert(element(FLOATING_CAKE_TAG));
        assert_ne!(first, second);
        assert_eq!(stage.elements().len(), 2);
    }

    #[tokio::test]
    async fn removing_a_gone_id_is_a_no_op() {
        let mut stage = Stage::default();
        let id = stage.insert(element(FLOATING_CAKE_TAG));
        assert!(stage.remove(id));
        assert!(!stage.remove(id));
    }

    #[tokio::test]
    async fn bulk_removal_only_takes_the_tagged() {
        let mut stage = Stage::default();
        stage.insert(element(FLOATING_CAKE_TAG));
        stage.insert(element(FLOATING_CAKE_TAG));
        stage.insert(element("bunting"));
        assert_eq!(stage.remove_by_tag(FLOATING_CAKE_TAG), 2);
        assert_eq!(stage.count_by_tag(FLOATING_CAKE_TAG), 0);
        assert_eq!(stage.count_by_tag("bunting"), 1);
    }
}
