//! A gentle snowfall over the card, triggered by revealing the message.
//!
//! Each reveal spawns one time-bounded batch of flakes. The batch owns the snow canvas for its
//! whole life: a second reveal while flakes are still falling is rejected rather than doubling
//! up on the same pixels. There is no stop API, the batch simply expires.

use color_eyre::eyre::Result;
use rand::Rng as _;

use super::driver::Driver;
use super::sprites::SpriteCache;

/// User-configurable settings for the snowfall.
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Enable/disable the snowfall at reveal.
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// The most flakes a single batch will ever hold, however wide the viewport.
pub const MAX_FLAKES: f32 = 160.0;

/// One flake per this many pixels of viewport width.
pub const WIDTH_PER_FLAKE: f32 = 6.0;

/// How long a batch falls for, measured from its first frame.
pub const BATCH_DURATION: tokio::time::Duration = tokio::time::Duration::from_millis(6000);

/// Flakes wrap to the opposite edge, rather than bounce, at this margin beyond the viewport.
pub const WRAP_MARGIN: f32 = 20.0;

/// The translucent whites used when a flake is drawn as a plain circle.
const COLOURS: [crate::canvas::Colour; 3] = [
    (1.0, 1.0, 1.0, 0.95),
    (0.96, 0.98, 1.0, 0.9),
    (0.86, 0.92, 1.0, 0.85),
];

/// How many flakes a viewport of the given pixel width gets.
#[must_use]
pub fn flake_count(width: f32) -> usize {
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "The count has just been clamped to [0, 160]"
    )]
    let count = (width / WIDTH_PER_FLAKE).min(MAX_FLAKES).max(0.0).floor() as usize;
    count
}

/// Wrap a horizontal position to the opposite edge once it leaves the margin.
#[must_use]
pub fn wrap_x(x: f32, width: f32) -> f32 {
    if x > width + WRAP_MARGIN {
        return -WRAP_MARGIN;
    }
    if x < -WRAP_MARGIN {
        return width + WRAP_MARGIN;
    }
    x
}

/// One simulated snowflake.
#[derive(Clone, Debug)]
pub struct Flake {
    /// Horizontal position in pixels.
    pub x: f32,
    /// Vertical position in pixels. Spawns above the viewport, so starts negative.
    pub y: f32,
    /// Radius in pixels.
    pub radius: f32,
    /// Velocity in pixels per frame.
    pub velocity: (f32, f32),
    /// The sway accumulator.
    pub angle: f32,
    /// Sway amplitude.
    pub swing: f32,
    /// Colour used for the circle fallback.
    pub colour: crate::canvas::Colour,
    /// Index into the sprite cache, fixed at spawn time.
    pub sprite_index: usize,
}

impl Flake {
    /// Spawn a flake somewhere above the viewport so it falls in from the top.
    #[must_use]
    pub fn spawn(width: f32, height: f32, sprite_count: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            x: rng.gen_range(0.0..width.max(1.0)),
            y: -rng.gen_range(0.0..height.max(1.0)),
            radius: rng.gen_range(1.5..4.5),
            velocity: (rng.gen_range(-0.3..0.3), rng.gen_range(0.6..1.4)),
            angle: rng.gen_range(0.0..std::f32::consts::TAU),
            swing: rng.gen_range(0.6..1.4),
            colour: COLOURS[rng.gen_range(0..COLOURS.len())],
            sprite_index: rng.gen_range(0..sprite_count.max(1)),
        }
    }

    /// One frame of movement: advance the sway (bigger flakes sway slightly faster), drift,
    /// fall, and wrap at the edges.
    pub fn advance(&mut self, width: f32) {
        self.angle += (self.radius / 10.0).mul_add(0.002, 0.002);
        self.x += self.angle.sin().mul_add(self.swing, self.velocity.0);
        self.y += self.velocity.1;
        self.x = wrap_x(self.x, width);
    }

    /// The size the flake's sprite is drawn at.
    #[must_use]
    pub fn sprite_size(&self) -> f32 {
        (self.radius * 4.0).max(6.0)
    }
}

/// One reveal's worth of falling snow. The whole batch lives and dies together.
pub struct Batch {
    /// The flakes.
    pub flakes: Vec<Flake>,
    /// When the first frame ran. The expiry clock starts there, not at spawn.
    started: Option<tokio::time::Instant>,
}

impl Batch {
    /// Fill the viewport with freshly spawned flakes.
    #[must_use]
    pub fn spawn(width: f32, height: f32, sprite_count: usize) -> Self {
        let flakes = (0..flake_count(width))
            .map(|_| Flake::spawn(width, height, sprite_count))
            .collect();
        Self {
            flakes,
            started: None,
        }
    }

    /// Whether the batch's fixed lifetime has elapsed. The first call starts the clock.
    pub fn is_expired(&mut self) -> bool {
        let started = *self
            .started
            .get_or_insert_with(tokio::time::Instant::now);
        started.elapsed() >= BATCH_DURATION
    }
}

/// The snowfall effect.
pub struct Snow {
    /// The base effect struct.
    driver: Driver,
    /// The shared, asynchronously populated sprite list.
    sprites: SpriteCache,
    /// The single active batch. Holding this is what owns the snow canvas.
    batch: Option<Batch>,
    /// From config.
    enabled: bool,
}

impl Snow {
    /// The snow falls over the card and the cakes, under the fullscreen viewer.
    const LAYER: i16 = 50;

    /// Instantiate.
    fn new(
        output_channel: tokio::sync::mpsc::Sender<crate::run::FrameUpdate>,
        sprites: SpriteCache,
    ) -> Self {
        Self {
            driver: Driver::new("snow".to_owned(), Self::LAYER, output_channel),
            sprites,
            batch: None,
            enabled: true,
        }
    }

    /// Our main entrypoint.
    pub async fn start(
        state: std::sync::Arc<crate::shared_state::SharedState>,
        output: tokio::sync::mpsc::Sender<crate::run::FrameUpdate>,
        sprites: SpriteCache,
    ) -> Result<()> {
        let mut snow = Self::new(output, sprites);
        let config = state.config.read().await.clone();
        snow.enabled = config.snow.enabled;
        snow.driver.frame_rate = config.frame_rate;
        let tty_size = state.get_tty_size().await;
        snow.driver.set_tty_size(tty_size.width, tty_size.height);

        let mut protocol = state.protocol_tx.subscribe();

        #[expect(
            clippy::integer_division_remainder_used,
            reason = "This is caused by the `tokio::select!`"
        )]
        loop {
            tokio::select! {
                () = snow.driver.sleep_until_next_frame_tick(), if snow.batch.is_some() => {
                    snow.render().await?;
                },
                result = protocol.recv() => {
                    match result {
                        Ok(crate::run::Protocol::End) => break,
                        Ok(crate::run::Protocol::Reveal(true)) => snow.begin_batch().await,
                        Ok(message) => {
                            if let crate::run::Protocol::Config(config) = &message {
                                snow.enabled = config.snow.enabled;
                            }
                            snow.driver.handle_common_protocol_messages(&message);
                        }
                        Err(error) => tracing::error!("Receiving protocol message: {error:?}"),
                    }
                }
            }
        }

        Ok(())
    }

    /// Claim the canvas for a new batch. The canvas takes the viewport's dimensions now; a
    /// resize mid-batch doesn't re-measure. A reveal while a batch is active is rejected.
    async fn begin_batch(&mut self) {
        if !self.enabled || !self.driver.is_ready() {
            return;
        }
        if self.batch.is_some() {
            tracing::debug!("Snow is already falling, ignoring the new reveal");
            return;
        }

        self.driver.initialise_canvas();
        #[expect(clippy::cast_precision_loss, reason = "Terminal dimensions are small")]
        let (width, height) = (
            self.driver.canvas.width() as f32,
            self.driver.canvas.height() as f32,
        );
        let sprite_count = self.sprites.len().await;
        let batch = Batch::spawn(width, height, sprite_count);
        tracing::debug!("Starting snow: {} flakes", batch.flakes.len());
        self.batch = Some(batch);
    }

    /// One frame of the snowfall.
    async fn render(&mut self) -> Result<()> {
        let is_expired = self.batch.as_mut().is_some_and(Batch::is_expired);
        if is_expired {
            tracing::debug!("Snow batch finished, clearing the canvas");
            self.batch = None;
            return self.driver.send_blank_output().await;
        }

        let Some(batch) = self.batch.as_mut() else {
            return Ok(());
        };

        #[expect(clippy::cast_precision_loss, reason = "Terminal dimensions are small")]
        let width = self.driver.canvas.width() as f32;
        let sprites = self.sprites.snapshot().await;
        self.driver.canvas.clear();

        for flake in &mut batch.flakes {
            flake.advance(width);

            // The sprite list may still be empty or part-loaded; anything undrawable falls
            // back to a soft circle.
            let mut is_drawn = false;
            if !sprites.is_empty() {
                let sprite = &sprites[flake.sprite_index % sprites.len()];
                if sprite.is_ready() {
                    match self.driver.canvas.paint_sprite(
                        sprite,
                        flake.x,
                        flake.y,
                        flake.sprite_size(),
                    ) {
                        Ok(()) => is_drawn = true,
                        Err(error) => tracing::trace!("Drawing flake sprite: {error:?}"),
                    }
                }
            }
            if !is_drawn {
                self.driver
                    .canvas
                    .paint_circle(flake.x, flake.y, flake.radius, flake.colour);
            }
        }

        self.driver.send_output().await
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;

    #[test]
    fn flake_count_is_capped_at_160() {
        assert_eq!(flake_count(960.0), 160);
        assert_eq!(flake_count(10_000.0), 160);
    }

    #[test]
    fn flake_count_tracks_narrow_viewports() {
        assert_eq!(flake_count(300.0), 50);
        assert_eq!(flake_count(0.0), 0);
    }

    #[test]
    fn wrapping_is_screen_wrap_not_bounce() {
        let width = 100.0;
        assert!((wrap_x(width + 25.0, width) - -WRAP_MARGIN).abs() < f32::EPSILON);
        assert!((wrap_x(-25.0, width) - (width + WRAP_MARGIN)).abs() < f32::EPSILON);
        assert!((wrap_x(50.0, width) - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn spawned_flakes_are_within_their_documented_ranges() {
        for _ in 0..200 {
            let flake = Flake::spawn(200.0, 100.0, 0);
            assert!((0.0..200.0).contains(&flake.x));
            assert!(flake.y <= 0.0 && flake.y > -100.0);
            assert!((1.5..4.5).contains(&flake.radius));
            assert!((-0.3..0.3).contains(&flake.velocity.0));
            assert!((0.6..1.4).contains(&flake.velocity.1));
            assert!((0.6..1.4).contains(&flake.swing));
            assert_eq!(flake.sprite_index, 0, "No sprites means index 0");
        }
    }

    #[test]
    fn flakes_fall_downwards() {
        let mut flake = Flake::spawn(100.0, 50.0, 3);
        let before = flake.y;
        flake.advance(100.0);
        assert!(flake.y > before);
    }

    #[test]
    fn sprite_size_has_a_floor() {
        let mut flake = Flake::spawn(100.0, 50.0, 1);
        flake.radius = 1.0;
        assert!((flake.sprite_size() - 6.0).abs() < f32::EPSILON);
        flake.radius = 4.0;
        assert!((flake.sprite_size() - 16.0).abs() < f32::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn a_batch_expires_after_six_seconds() {
        let mut batch = Batch::spawn(960.0, 480.0, 0);
        assert_eq!(batch.flakes.len(), 160);
        assert!(!batch.is_expired(), "The first frame starts the clock");
        tokio::time::advance(std::time::Duration::from_millis(5999)).await;
        assert!(!batch.is_expired());
        tokio::time::advance(std::time::Duration::from_millis(2)).await;
        assert!(batch.is_expired());
    }

    #[tokio::test]
    async fn a_second_reveal_does_not_replace_the_falling_batch() {
        let (frames_tx, _frames_rx) = tokio::sync::mpsc::channel(8);
        let mut snow = Snow::new(frames_tx, SpriteCache::new());
        snow.driver.set_tty_size(120, 40);

        snow.begin_batch().await;
        let original_count = snow.batch.as_ref().unwrap().flakes.len();
        assert!(original_count > 0);

        snow.begin_batch().await;
        assert_eq!(
            snow.batch.as_ref().unwrap().flakes.len(),
            original_count,
            "The active batch keeps ownership of the canvas"
        );
    }
}
