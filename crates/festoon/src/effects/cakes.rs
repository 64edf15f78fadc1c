//! Floating cake decorations, spawned on a randomised schedule from the moment the card loads.
//!
//! The emitter is a self-rescheduling timer chain rather than a fixed-interval timer: each tick
//! sleeps a fresh random delay, spawns, then schedules the next tick, so ticks can never pile
//! up. Every emission is fully self-contained: it carries its own style properties and arranges
//! its own removal. The emitter deliberately keeps no list of live emissions, so stopping has to
//! sweep the stage by tag instead.

use std::sync::Arc;

use color_eyre::eyre::Result;
use rand::Rng as _;

use super::driver::Driver;
use super::stage::{Element, Palette, SharedStage, Stage, FLOATING_CAKE_TAG};
use crate::utils::{lerp, smoothstep};

/// User-configurable settings for the cake decorations.
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Enable/disable the floating cakes.
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// The shortest wait between emitter ticks, in milliseconds.
pub const MIN_TICK_DELAY_MS: u64 = 300;

/// The longest wait between emitter ticks, exclusive, in milliseconds.
pub const MAX_TICK_DELAY_MS: u64 = 900;

/// The chance that a tick emits a short burst instead of a single cake.
pub const BURST_PROBABILITY: f64 = 0.22;

/// The gap between the emissions of a burst.
pub const BURST_STAGGER: std::time::Duration = std::time::Duration::from_millis(140);

/// How long an emission outlives its animation before removing itself.
pub const REMOVAL_GRACE: std::time::Duration = std::time::Duration::from_millis(1200);

/// Soft body colours.
const FILL_PALETTE: [crate::canvas::Colour; 5] = [
    (1.0, 0.965, 0.973, 1.0),
    (1.0, 0.969, 0.918, 1.0),
    (0.953, 0.984, 1.0, 1.0),
    (0.98, 0.949, 1.0, 1.0),
    (0.965, 1.0, 0.969, 1.0),
];

/// Pastel icing colours.
const ICING_PALETTE: [crate::canvas::Colour; 5] = [
    (1.0, 0.835, 0.878, 1.0),
    (1.0, 0.906, 0.788, 1.0),
    (0.812, 0.91, 1.0, 1.0),
    (0.914, 0.839, 1.0, 1.0),
    (0.875, 1.0, 0.91, 1.0),
];

/// Cherry/candle accents.
const CHERRY_PALETTE: [crate::canvas::Colour; 3] = [
    (0.886, 0.239, 0.42, 1.0),
    (0.847, 0.306, 0.42, 1.0),
    (0.761, 0.227, 0.337, 1.0),
];

/// The icon variants: a candled cake, a cupcake, a slice and a layered cake with a cherry.
/// `f` is the body, `i` the icing, `c` the cherry/candle.
const CAKE_ICONS: [&[&str]; 4] = [
    &[
        "...c....",
        "...c....",
        "........",
        "iiiiiiii",
        "ffffffff",
        "ffffffff",
        "ffffffff",
        "........",
    ],
    &[
        "..iiii..",
        ".iiiiii.",
        "iiiiiiii",
        ".ffffff.",
        ".ffffff.",
        "..ffff..",
        "........",
        "........",
    ],
    &[
        "......f.",
        ".....ff.",
        "....iff.",
        "...iiff.",
        "..fffff.",
        ".ffffff.",
        "ffffffff",
        "........",
    ],
    &[
        "....c...",
        "iiiiiiii",
        "ffffffff",
        "........",
        "iiiiiiii",
        "ffffffff",
        "ffffffff",
        "........",
    ],
];

/// The stage maps this many design units to one terminal pixel.
const DESIGN_UNITS_PER_PIXEL: f32 = 4.0;

/// How far an emission floats upwards over its animation, as a share of the viewport height.
const RISE_SHARE: f32 = 0.18;

/// The wait before the next emitter tick.
pub fn next_tick_delay(rng: &mut impl rand::Rng) -> std::time::Duration {
    std::time::Duration::from_millis(rng.gen_range(MIN_TICK_DELAY_MS..MAX_TICK_DELAY_MS))
}

/// How many emissions this tick spawns.
pub fn burst_size(rng: &mut impl rand::Rng) -> usize {
    if rng.gen_bool(BURST_PROBABILITY) {
        2
    } else {
        1
    }
}

/// Roll the dice for one fresh emission.
#[must_use]
pub fn random_emission() -> Element {
    let mut rng = rand::thread_rng();
    #[expect(clippy::cast_precision_loss, reason = "Sizes are tiny integers")]
    let size = rng.gen_range(20_u32..42) as f32;
    Element {
        id: 0,
        tag: FLOATING_CAKE_TAG,
        spawned_at: tokio::time::Instant::now(),
        duration: std::time::Duration::from_secs_f32(rng.gen_range(4.0..8.0)),
        left_percent: 6.0 + rng.gen_range(0.0..88.0),
        top_percent: 6.0 + rng.gen_range(0.0..80.0),
        size,
        accent_size: (size * 1.12).round().max(18.0),
        rotation: rng.gen_range(-30.0..30.0),
        rotation_delta: rng.gen_range(-40.0..40.0),
        drift_start: rng.gen_range(-40.0..40.0),
        drift_end: rng.gen_range(-70.0..70.0),
        palette: Palette {
            fill: FILL_PALETTE[rng.gen_range(0..FILL_PALETTE.len())],
            icing: ICING_PALETTE[rng.gen_range(0..ICING_PALETTE.len())],
            cherry: CHERRY_PALETTE[rng.gen_range(0..CHERRY_PALETTE.len())],
        },
        icon: rng.gen_range(0..CAKE_ICONS.len()),
    }
}

/// The self-rescheduling emitter half of the cakes effect.
pub struct Emitter {
    /// Where emissions land.
    stage: SharedStage,
    /// The handle of the active timer chain, if any.
    timer: Option<tokio::task::JoinHandle<()>>,
}

impl Emitter {
    /// Instantiate, stopped.
    #[must_use]
    pub const fn new(stage: SharedStage) -> Self {
        Self { stage, timer: None }
    }

    /// Whether a timer chain is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Begin the timer chain. Returns whether a new chain was actually started: a second call
    /// while one is running is a no-op.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            tracing::debug!("Cake emitter already running, start ignored");
            return false;
        }

        let stage = Arc::clone(&self.stage);
        self.timer = Some(tokio::spawn(async move {
            loop {
                let delay = next_tick_delay(&mut rand::thread_rng());
                tokio::time::sleep(delay).await;
                let burst = burst_size(&mut rand::thread_rng());
                for index in 0..burst {
                    if index > 0 {
                        tokio::time::sleep(BURST_STAGGER).await;
                    }
                    spawn_emission(&stage).await;
                }
            }
        }));
        true
    }

    /// Cancel the pending tick and immediately remove every live emission from the display.
    pub async fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            // Wait for the cancellation to land, so a tick that was mid-spawn can't put a cake
            // on the stage after the sweep below.
            if let Err(error) = timer.await {
                if !error.is_cancelled() {
                    tracing::error!("Joining the cake timer chain: {error:?}");
                }
            }
        }
        let removed = self.stage.write().await.remove_by_tag(FLOATING_CAKE_TAG);
        if removed > 0 {
            tracing::debug!("Swept {removed} live cakes off the stage");
        }
    }
}

/// Insert one emission and schedule its own removal at `duration + grace`. Nothing else holds a
/// reference to it afterwards.
async fn spawn_emission(stage: &SharedStage) {
    let element = random_emission();
    let lifetime = element.duration + REMOVAL_GRACE;
    let id = stage.write().await.insert(element);

    let stage_for_removal = Arc::clone(stage);
    tokio::spawn(async move {
        tokio::time::sleep(lifetime).await;
        stage_for_removal.write().await.remove(id);
    });
}

/// The display half: draws whatever is currently on the stage.
pub struct Cakes {
    /// The base effect struct.
    driver: Driver,
    /// The arena of live emissions.
    stage: SharedStage,
    /// The timer chain.
    emitter: Emitter,
    /// From config.
    enabled: bool,
}

impl Cakes {
    /// Cakes float above the card but under the snow.
    const LAYER: i16 = 40;

    /// Our main entrypoint.
    pub async fn start(
        state: std::sync::Arc<crate::shared_state::SharedState>,
        output: tokio::sync::mpsc::Sender<crate::run::FrameUpdate>,
    ) -> Result<()> {
        let stage: SharedStage = Arc::new(tokio::sync::RwLock::new(Stage::default()));
        let config = state.config.read().await.clone();
        let mut cakes = Self {
            driver: Driver::new("cakes".to_owned(), Self::LAYER, output),
            stage: Arc::clone(&stage),
            emitter: Emitter::new(stage),
            enabled: config.cakes.enabled,
        };
        cakes.driver.frame_rate = config.frame_rate;
        let tty_size = state.get_tty_size().await;
        cakes.driver.set_tty_size(tty_size.width, tty_size.height);

        // The cakes are independent of the reveal: they start with the card itself.
        if cakes.enabled {
            cakes.emitter.start();
        }

        let mut protocol = state.protocol_tx.subscribe();

        #[expect(
            clippy::integer_division_remainder_used,
            reason = "This is caused by the `tokio::select!`"
        )]
        loop {
            tokio::select! {
                () = cakes.driver.sleep_until_next_frame_tick(), if cakes.emitter.is_running() => {
                    cakes.render().await?;
                },
                result = protocol.recv() => {
                    match result {
                        Ok(crate::run::Protocol::End) => {
                            cakes.emitter.stop().await;
                            break;
                        }
                        Ok(message) => {
                            if let crate::run::Protocol::Config(config) = &message {
                                cakes.apply_config(config.cakes.enabled).await;
                            }
                            cakes.driver.handle_common_protocol_messages(&message);
                        }
                        Err(error) => tracing::error!("Receiving protocol message: {error:?}"),
                    }
                }
            }
        }

        Ok(())
    }

    /// Start or stop the emitter to follow the config.
    async fn apply_config(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.emitter.start();
        } else {
            self.emitter.stop().await;
            if let Err(error) = self.driver.send_blank_output().await {
                tracing::error!("Clearing the cakes layer: {error:?}");
            }
        }
    }

    /// One frame: draw every live emission at its current animation progress.
    async fn render(&mut self) -> Result<()> {
        if !self.driver.is_ready() {
            return Ok(());
        }

        self.driver.initialise_canvas();
        let elements = self.stage.read().await.elements().to_vec();
        for element in &elements {
            if element.tag == FLOATING_CAKE_TAG {
                draw_emission(&mut self.driver.canvas, element);
            }
        }
        self.driver.send_output().await
    }
}

/// Map an emission's style properties onto terminal pixels and draw it: a soft accent disc
/// behind a pixel-art icon, floating upwards with an eased drift and a little rotation wobble.
fn draw_emission(canvas: &mut crate::canvas::Canvas, element: &Element) {
    #[expect(clippy::cast_precision_loss, reason = "Terminal dimensions are small")]
    let (width, height) = (canvas.width() as f32, canvas.height() as f32);
    let progress = element.progress();
    let eased = progress * progress;

    let drift = lerp(element.drift_start, element.drift_end, eased) / DESIGN_UNITS_PER_PIXEL;
    let wobble = element
        .rotation_delta
        .mul_add(eased, element.rotation)
        .to_radians()
        .sin()
        * 1.5;
    let x = (element.left_percent / 100.0).mul_add(width, drift + wobble);
    let y = (element.top_percent / 100.0).mul_add(height, -(eased * RISE_SHARE * height));

    let opacity = smoothstep(0.0, 0.08, progress) * smoothstep(1.0, 0.75, progress);
    if opacity <= f32::EPSILON {
        return;
    }

    let accent_radius = element.accent_size / DESIGN_UNITS_PER_PIXEL / 2.0;
    let mut accent = element.palette.fill;
    accent.3 = 0.35 * opacity;
    canvas.paint_circle(x, y, accent_radius, accent);

    paint_icon(canvas, element, x, y, opacity);
}

/// Scale the emission's icon bitmap to its design size and paint it centred on the given point.
fn paint_icon(
    canvas: &mut crate::canvas::Canvas,
    element: &Element,
    centre_x: f32,
    centre_y: f32,
    opacity: f32,
) {
    let Some(icon) = CAKE_ICONS.get(element.icon) else {
        return;
    };
    let art_size = icon.len();
    let icon_pixels = (element.size / DESIGN_UNITS_PER_PIXEL).max(2.0);
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "A small positive pixel count"
    )]
    let span = icon_pixels.round() as usize;
    let origin_x = centre_x - icon_pixels / 2.0;
    let origin_y = centre_y - icon_pixels / 2.0;

    for step_y in 0..span {
        for step_x in 0..span {
            let art_x = step_x * art_size / span;
            let art_y = step_y * art_size / span;
            let character = icon
                .get(art_y)
                .and_then(|row| row.as_bytes().get(art_x))
                .copied()
                .unwrap_or(b'.');
            let mut colour = match character {
                b'f' => element.palette.fill,
                b'i' => element.palette.icing,
                b'c' => element.palette.cherry,
                _ => continue,
            };
            colour.3 *= opacity;
            #[expect(
                clippy::cast_possible_truncation,
                clippy::cast_precision_loss,
                reason = "Pixel coordinates are well within isize"
            )]
            canvas.paint_pixel(
                (origin_x + step_x as f32) as isize,
                (origin_y + step_y as f32) as isize,
                colour,
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tick_delays_stay_within_their_window() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let delay = next_tick_delay(&mut rng);
            assert!(delay >= std::time::Duration::from_millis(MIN_TICK_DELAY_MS));
            assert!(delay < std::time::Duration::from_millis(MAX_TICK_DELAY_MS));
        }
    }

    #[test]
    fn bursts_are_never_bigger_than_two() {
        let mut rng = rand::thread_rng();
        let mut saw_burst = false;
        for _ in 0..2000 {
            let size = burst_size(&mut rng);
            assert!(size == 1 || size == 2);
            saw_burst |= size == 2;
        }
        assert!(saw_burst, "0.22 probability should show up in 2000 rolls");
    }

    #[tokio::test]
    async fn emissions_roll_within_their_documented_ranges() {
        for _ in 0..200 {
            let emission = random_emission();
            assert!((20.0..42.0).contains(&emission.size));
            assert!(emission.accent_size >= 18.0);
            assert!((emission.accent_size - (emission.size * 1.12).round().max(18.0)).abs() < 0.01);
            assert!((6.0..94.0).contains(&emission.left_percent));
            assert!((6.0..86.0).contains(&emission.top_percent));
            assert!(emission.duration >= std::time::Duration::from_secs(4));
            assert!(emission.duration < std::time::Duration::from_secs(8));
            assert!((-30.0..30.0).contains(&emission.rotation));
            assert!((-40.0..40.0).contains(&emission.rotation_delta));
            assert!((-40.0..40.0).contains(&emission.drift_start));
            assert!((-70.0..70.0).contains(&emission.drift_end));
            assert!(emission.icon < CAKE_ICONS.len());
        }
    }

    #[tokio::test]
    async fn starting_twice_keeps_a_single_timer_chain() {
        let stage: SharedStage = Arc::default();
        let mut emitter = Emitter::new(Arc::clone(&stage));
        assert!(emitter.start());
        assert!(!emitter.start(), "The second start must be a no-op");
        assert!(emitter.is_running());
        emitter.stop().await;
        assert!(!emitter.is_running());
        assert!(emitter.start(), "A stopped emitter can be started again");
        emitter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_sweeps_all_live_emissions_and_cancels_the_timer() {
        let stage: SharedStage = Arc::default();
        for _ in 0..3 {
            spawn_emission(&stage).await;
        }
        assert_eq!(stage.read().await.count_by_tag(FLOATING_CAKE_TAG), 3);

        let mut emitter = Emitter::new(Arc::clone(&stage));
        emitter.start();
        emitter.stop().await;
        assert_eq!(stage.read().await.count_by_tag(FLOATING_CAKE_TAG), 0);

        // With the chain cancelled, no new emission can appear however long we wait.
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stage.read().await.count_by_tag(FLOATING_CAKE_TAG), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn an_emission_removes_itself_after_its_grace_period() {
        let stage: SharedStage = Arc::default();
        spawn_emission(&stage).await;
        let duration = stage.read().await.elements()[0].duration;

        tokio::time::advance(duration + REMOVAL_GRACE - std::time::Duration::from_millis(10))
            .await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stage.read().await.count_by_tag(FLOATING_CAKE_TAG), 1);

        tokio::time::advance(std::time::Duration::from_millis(20)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stage.read().await.count_by_tag(FLOATING_CAKE_TAG), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn a_running_chain_keeps_emitting() {
        let stage: SharedStage = Arc::default();
        let mut emitter = Emitter::new(Arc::clone(&stage));
        emitter.start();

        // Each tick waits at most 900ms plus a 140ms stagger, so three seconds of virtual
        // time guarantees at least one emission.
        for _ in 0..30 {
            tokio::time::advance(std::time::Duration::from_millis(100)).await;
            tokio::task::yield_now().await;
        }
        assert!(stage.read().await.count_by_tag(FLOATING_CAKE_TAG) > 0);
        emitter.stop().await;
    }
}
