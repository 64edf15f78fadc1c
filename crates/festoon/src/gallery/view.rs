//! The gallery's display: the main photo, the thumb strip, the fallback glyph and the
//! fullscreen viewer, plus the wiring between gestures, autoplay and the state machine.
//!
//! Selection follows the classic fade choreography: the old photo's opacity drops to zero, the
//! source is swapped a fixed beat later, and the new photo fades in once it has decoded. A
//! source that can't be decoded hides the main image and shows the fallback instead; nothing
//! in here is allowed to take the card down.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::Result;

use super::state::{GalleryState, Selection};
use crate::effects::driver::Driver;
use crate::input::Action;
use crate::utils::smoothstep;

/// User-configurable settings for the gallery.
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// How often autoplay advances, in milliseconds.
    pub autoplay_interval_ms: u64,
    /// Insert photos in numeric order instead of the order their probes resolve in.
    pub ordered: bool,
    /// The highest photo number probed for.
    pub max_photos: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            autoplay_interval_ms: 2000,
            ordered: false,
            max_photos: 20,
        }
    }
}

/// The beat between fading the old photo out and swapping the source.
const SWAP_DELAY: std::time::Duration = std::time::Duration::from_millis(120);

/// How long the fade-in runs once the new photo has decoded.
const FADE_IN: std::time::Duration = std::time::Duration::from_millis(200);

/// Shown whenever the main image can't be.
const FALLBACK_GLYPH: &str = "🎂";

/// Each thumb control occupies this many columns.
const THUMB_CELL_WIDTH: usize = 4;

/// A photo swap that has been ordered but not executed yet.
struct PendingSwap {
    /// The index to put on display.
    index: usize,
    /// When the swap is due.
    due: tokio::time::Instant,
}

/// The gallery effect.
pub struct Gallery {
    /// The base effect struct, owning the main view's canvas.
    driver: Driver,
    /// The state machine itself.
    machine: GalleryState,
    /// Decoded photos, keyed by source path.
    decoded: HashMap<PathBuf, image::RgbaImage>,
    /// Photos scaled for a particular box, so a steady frame costs no resampling.
    scaled: HashMap<(PathBuf, u32, u32), image::RgbaImage>,
    /// Sources that failed to decode. They hide the main image rather than erroring.
    broken: HashSet<PathBuf>,
    /// The index actually on display. Trails the machine's current index by the swap delay.
    displayed: Option<usize>,
    /// The swap ordered by the last selection.
    pending_swap: Option<PendingSwap>,
    /// When the current fade-in started.
    fade_in_started: Option<tokio::time::Instant>,
    /// The main image's opacity.
    opacity: f32,
    /// Where the pointer went down, for swipe detection.
    pointer_down: Option<(u16, u16)>,
}

impl Gallery {
    /// The photo sits over the card text but under the decorations.
    const LAYER: i16 = 10;

    /// The fullscreen viewer covers absolutely everything.
    const FULLSCREEN_LAYER: i16 = 100;

    /// Our main entrypoint.
    pub async fn start(
        state: Arc<crate::shared_state::SharedState>,
        output: tokio::sync::mpsc::Sender<crate::run::FrameUpdate>,
    ) -> Result<()> {
        let mut gallery = Self {
            driver: Driver::new("gallery".to_owned(), Self::LAYER, output),
            machine: GalleryState::default(),
            decoded: HashMap::new(),
            scaled: HashMap::new(),
            broken: HashSet::new(),
            displayed: None,
            pending_swap: None,
            fade_in_started: None,
            opacity: 1.0,
            pointer_down: None,
        };
        let config = state.config.read().await.clone();
        gallery.driver.frame_rate = config.frame_rate;
        let tty_size = state.get_tty_size().await;
        gallery.driver.set_tty_size(tty_size.width, tty_size.height);

        let mut protocol = state.protocol_tx.subscribe();
        // The probes announce their hits over the protocol; the handle can look after itself.
        let _discovery_probes = super::discovery::start(Arc::clone(&state));

        let mut autoplay = tokio::time::interval(std::time::Duration::from_millis(
            config.gallery.autoplay_interval_ms.max(1),
        ));
        autoplay.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        #[expect(
            clippy::integer_division_remainder_used,
            reason = "This is caused by the `tokio::select!`"
        )]
        loop {
            tokio::select! {
                () = gallery.driver.sleep_until_next_frame_tick() => {
                    gallery.render().await?;
                },
                _ = autoplay.tick() => {
                    if let Some(next) = gallery.machine.autoplay_tick() {
                        gallery.show(next);
                    }
                },
                result = protocol.recv() => {
                    match result {
                        Ok(crate::run::Protocol::End) => break,
                        Ok(crate::run::Protocol::PhotoDiscovered(path)) => {
                            gallery.on_discovered(path);
                        }
                        Ok(crate::run::Protocol::Action(action)) => gallery.on_action(action),
                        Ok(message) => gallery.driver.handle_common_protocol_messages(&message),
                        Err(error) => tracing::error!("Receiving protocol message: {error:?}"),
                    }
                }
            }
        }

        Ok(())
    }

    /// A probe resolved. The first photo goes straight on display.
    fn on_discovered(&mut self, path: PathBuf) {
        let was_empty = self.machine.is_empty();
        if self.machine.add_source(path).is_some() && was_empty {
            self.show(0);
        }
    }

    /// The `showPhoto` choreography: start the fade-out now, swap the source a beat later.
    fn show(&mut self, index: usize) {
        match self.machine.select(index) {
            Selection::Shown(index) => {
                self.opacity = 0.0;
                self.fade_in_started = None;
                self.pending_swap = Some(PendingSwap {
                    index,
                    due: tokio::time::Instant::now() + SWAP_DELAY,
                });
            }
            Selection::Hidden => {
                self.displayed = None;
                self.pending_swap = None;
            }
        }
    }

    /// Route a user action into the state machine.
    fn on_action(&mut self, action: Action) {
        #[expect(
            clippy::wildcard_enum_match_arm,
            reason = "The reveal action belongs to the card"
        )]
        match action {
            Action::NextPhoto => self.step(1),
            Action::PreviousPhoto => self.step(-1),
            Action::ToggleFullscreen => {
                if self.machine.is_fullscreen() {
                    self.machine.close_fullscreen();
                } else {
                    self.machine.open_fullscreen();
                }
            }
            Action::CloseOverlay => self.machine.close_fullscreen(),
            Action::PointerDown { x, y } => self.pointer_down = Some((x, y)),
            Action::PointerUp { x, y } => self.on_pointer_up(x, y),
            _ => (),
        }
    }

    /// Keyboard navigation skips the gesture threshold but reuses the selection choreography.
    fn step(&mut self, delta: i64) {
        if let Some(next) = self.machine.step(delta) {
            self.show(next);
        }
    }

    /// The end of a drag: a long enough one is a swipe, anything shorter is a click. A click on
    /// the photo opens the fullscreen viewer; a click while fullscreen closes it.
    fn on_pointer_up(&mut self, x: u16, y: u16) {
        let Some((down_x, down_y)) = self.pointer_down.take() else {
            return;
        };

        let swiped = self.machine.swipe(f32::from(down_x), f32::from(x));
        if let Some(next) = swiped {
            self.show(next);
            return;
        }

        if self.machine.is_fullscreen() {
            self.machine.close_fullscreen();
        } else if let Some(index) = self.thumb_at(down_x, down_y) {
            self.show(index);
        } else if self.displayed.is_some() && self.is_over_photo(down_x, down_y) {
            self.machine.open_fullscreen();
        }
    }

    /// Which thumb control, if any, sits under a cell coordinate. Mirrors the strip geometry in
    /// [`Self::paint_thumbs`].
    fn thumb_at(&self, x: u16, y: u16) -> Option<usize> {
        let columns = usize::from(self.driver.width);
        let rows = usize::from(self.driver.height);
        let count = self.machine.len();
        if count == 0 || rows < 5 || usize::from(y) != rows - 3 {
            return None;
        }
        let start = columns.saturating_sub(count * THUMB_CELL_WIDTH) / 2;
        let offset = usize::from(x).checked_sub(start)?;
        let index = offset / THUMB_CELL_WIDTH;
        (index < count).then_some(index)
    }

    /// Whether a cell coordinate lands inside the photo box.
    fn is_over_photo(&self, x: u16, y: u16) -> bool {
        let (left, top, width, height) =
            photo_rect(self.driver.width.into(), self.driver.height.into());
        let (x, y) = (usize::from(x), usize::from(y));
        x >= left && x < left + width && y >= top && y < top + height
    }

    /// Execute a due swap: put the new source on display and start its fade-in, or fall back to
    /// the hidden state if the photo won't decode.
    fn process_pending_swap(&mut self) {
        let is_due = self
            .pending_swap
            .as_ref()
            .is_some_and(|swap| tokio::time::Instant::now() >= swap.due);
        if !is_due {
            return;
        }
        let Some(swap) = self.pending_swap.take() else {
            return;
        };

        let Some(source) = self.machine.sources().get(swap.index).cloned() else {
            self.displayed = None;
            return;
        };
        if self.decode(&source) {
            self.displayed = Some(swap.index);
            self.fade_in_started = Some(tokio::time::Instant::now());
        } else {
            self.displayed = None;
        }
    }

    /// Decode and cache a source, remembering failures so they're not retried every frame.
    fn decode(&mut self, source: &PathBuf) -> bool {
        if self.broken.contains(source) {
            return false;
        }
        if self.decoded.contains_key(source) {
            return true;
        }
        match image::open(source) {
            Ok(decoded) => {
                self.decoded.insert(source.clone(), decoded.to_rgba8());
                true
            }
            Err(error) => {
                tracing::debug!("Couldn't decode photo {source:?}: {error:?}");
                self.broken.insert(source.clone());
                false
            }
        }
    }

    /// Advance the fade-in.
    fn update_opacity(&mut self) {
        if let Some(started) = self.fade_in_started {
            let elapsed = started.elapsed().as_secs_f32();
            self.opacity = smoothstep(0.0, FADE_IN.as_secs_f32(), elapsed);
            if elapsed >= FADE_IN.as_secs_f32() {
                self.fade_in_started = None;
                self.opacity = 1.0;
            }
        }
    }

    /// One frame: the main view canvas, then the fullscreen overlay canvas.
    async fn render(&mut self) -> Result<()> {
        if !self.driver.is_ready() {
            return Ok(());
        }

        self.process_pending_swap();
        self.update_opacity();

        self.driver.initialise_canvas();
        self.paint_main_view();
        self.driver.send_output().await?;

        let fullscreen = self.paint_fullscreen();
        self.driver
            .output_channel
            .send(crate::run::FrameUpdate::Layer(fullscreen))
            .await?;
        Ok(())
    }

    /// The photo box, the fallback glyph and the thumb strip.
    fn paint_main_view(&mut self) {
        let columns = usize::from(self.driver.width);
        let rows = usize::from(self.driver.height);
        let (left, top, width, height) = photo_rect(columns, rows);

        let displayed_source = self
            .displayed
            .and_then(|index| self.machine.sources().get(index).cloned());
        match displayed_source {
            Some(source) => {
                let opacity = self.opacity;
                self.paint_photo_into(&source, left, top * 2, width, height * 2, opacity);
            }
            None => {
                let fallback_row = top + height / 2;
                let column = left + width.saturating_sub(2) / 2;
                self.driver.canvas.paint_text(
                    column,
                    fallback_row,
                    FALLBACK_GLYPH.to_owned(),
                    None,
                    None,
                );
            }
        }

        self.paint_thumbs(columns, rows);
    }

    /// One selectable control per photo, with the pressed indicator on the current one.
    fn paint_thumbs(&mut self, columns: usize, rows: usize) {
        let count = self.machine.len();
        if count == 0 || rows < 5 {
            return;
        }
        let row = rows - 3;
        let start = columns.saturating_sub(count * THUMB_CELL_WIDTH) / 2;
        for index in 0..count {
            let is_pressed = self.machine.current() == Some(index);
            let label = format!(" {} ", index + 1);
            let (fg, bg) = if is_pressed {
                (Some(crate::canvas::BLACK), Some((1.0, 0.84, 0.88, 1.0)))
            } else {
                (Some((0.55, 0.58, 0.7, 1.0)), None)
            };
            self.driver
                .canvas
                .paint_text(start + index * THUMB_CELL_WIDTH, row, label, bg, fg);
        }
    }

    /// The fullscreen overlay: a near-black curtain that suppresses the whole background, the
    /// current photo scaled up, and a hint line.
    fn paint_fullscreen(&mut self) -> crate::canvas::Canvas {
        let columns = usize::from(self.driver.width);
        let rows = usize::from(self.driver.height);
        let mut canvas = crate::canvas::Canvas::new(
            "gallery-fullscreen".to_owned(),
            columns,
            rows,
            Self::FULLSCREEN_LAYER,
        );

        if !self.machine.is_fullscreen() {
            // A blank canvas clears whatever the overlay showed last frame.
            return canvas;
        }

        canvas.fill((0.01, 0.01, 0.02, 1.0));
        // The overlay always copies the current source directly; it doesn't share the main
        // view's fade. Painting happens through the driver's canvas slot, so swap the overlay
        // in and back out.
        let source = self.machine.current_source().map(std::path::Path::to_path_buf);
        if let Some(source) = source {
            std::mem::swap(&mut self.driver.canvas, &mut canvas);
            self.paint_photo_into(
                &source,
                1,
                2,
                columns.saturating_sub(2),
                rows.saturating_sub(2) * 2,
                1.0,
            );
            std::mem::swap(&mut self.driver.canvas, &mut canvas);
        }

        let hint = "swipe or ←/→ · click or esc to close";
        let column = columns.saturating_sub(hint.chars().count()) / 2;
        canvas.paint_text(
            column,
            rows.saturating_sub(1),
            hint.to_owned(),
            None,
            Some((0.55, 0.58, 0.7, 1.0)),
        );
        canvas
    }

    /// Scale a photo to fit a pixel box and paint it centred inside, through the scaled cache.
    fn paint_photo_into(
        &mut self,
        source: &PathBuf,
        left: usize,
        top: usize,
        width: usize,
        height: usize,
        opacity: f32,
    ) {
        if !self.decode(source) {
            return;
        }
        let Some(original) = self.decoded.get(source) else {
            return;
        };

        let Ok(box_width) = u32::try_from(width) else {
            return;
        };
        let Ok(box_height) = u32::try_from(height) else {
            return;
        };
        let (target_width, target_height) =
            fit_within(original.width(), original.height(), box_width, box_height);
        if target_width == 0 || target_height == 0 {
            return;
        }

        let key = (source.clone(), target_width, target_height);
        if !self.scaled.contains_key(&key) {
            let resized = image::imageops::resize(
                original,
                target_width,
                target_height,
                image::imageops::FilterType::Triangle,
            );
            self.scaled.insert(key.clone(), resized);
        }
        let Some(photo) = self.scaled.get(&key) else {
            return;
        };

        let origin_x = left + (width.saturating_sub(target_width as usize)) / 2;
        let origin_y = top + (height.saturating_sub(target_height as usize)) / 2;
        for (x, y, pixel) in photo.enumerate_pixels() {
            let colour = (
                f32::from(pixel.0[0]) / 255.0,
                f32::from(pixel.0[1]) / 255.0,
                f32::from(pixel.0[2]) / 255.0,
                f32::from(pixel.0[3]) / 255.0 * opacity,
            );
            #[expect(
                clippy::cast_possible_wrap,
                reason = "Pixel coordinates are well within isize"
            )]
            self.driver.canvas.paint_pixel(
                (origin_x + x as usize) as isize,
                (origin_y + y as usize) as isize,
                colour,
            );
        }
    }
}

/// The main view's photo box, in cell coordinates: (left, top, width, height).
#[must_use]
pub fn photo_rect(columns: usize, rows: usize) -> (usize, usize, usize, usize) {
    let margin_x = columns / 8 + 2;
    let top = 4;
    let bottom = rows.saturating_sub(5);
    let width = columns.saturating_sub(margin_x * 2).max(4);
    let height = bottom.saturating_sub(top).max(2);
    (margin_x, top, width, height)
}

/// Scale image dimensions to fit a box, preserving the aspect ratio.
#[must_use]
pub fn fit_within(
    image_width: u32,
    image_height: u32,
    box_width: u32,
    box_height: u32,
) -> (u32, u32) {
    if image_width == 0 || image_height == 0 || box_width == 0 || box_height == 0 {
        return (0, 0);
    }
    #[expect(clippy::cast_precision_loss, reason = "Image dimensions fit in f64 mantissa")]
    let scale = f64::min(
        f64::from(box_width) / f64::from(image_width),
        f64::from(box_height) / f64::from(image_height),
    );
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "The scaled dimensions have just been bounded by the box"
    )]
    let scaled = (
        ((f64::from(image_width) * scale) as u32).max(1),
        ((f64::from(image_height) * scale) as u32).max(1),
    );
    scaled
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wide_images_are_constrained_by_width() {
        assert_eq!(fit_within(200, 100, 50, 100), (50, 25));
    }

    #[test]
    fn tall_images_are_constrained_by_height() {
        assert_eq!(fit_within(100, 200, 100, 50), (25, 50));
    }

    #[test]
    fn degenerate_dimensions_fit_nowhere() {
        assert_eq!(fit_within(0, 100, 50, 50), (0, 0));
        assert_eq!(fit_within(100, 100, 0, 50), (0, 0));
    }

    #[test]
    fn small_images_still_paint_at_least_a_pixel() {
        assert_ne!(fit_within(10_000, 1, 50, 50), (0, 0));
    }

    #[test]
    fn the_photo_box_stays_inside_the_viewport() {
        for (columns, rows) in [(80, 24), (20, 10), (200, 60), (4, 4)] {
            let (left, top, width, height) = photo_rect(columns, rows);
            assert!(left + width <= columns.max(8));
            assert!(top + height <= rows.max(8));
        }
    }

    #[test]
    fn config_defaults_match_the_product() {
        let config = Config::default();
        assert_eq!(config.autoplay_interval_ms, 2000);
        assert_eq!(config.max_photos, 20);
        assert!(!config.ordered);
    }
}
