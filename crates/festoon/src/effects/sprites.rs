//! Drawable snowflake sprites for the snow simulation.
//!
//! Sprites are loaded from the assets directory in the background. A loaded bitmap is
//! "sanitized": its native colours are stripped and replaced with the card's single snowflake
//! tint, keeping only the alpha channel as the flake's silhouette. If sanitizing fails the raw
//! bitmap is used as-is, native colours and all. A couple of built-in flake shapes are always
//! added so the simulation has something to draw even with an empty assets directory.
//!
//! Because population is asynchronous, consumers must tolerate the list being empty or partially
//! filled, and must never assume an entry's index relates to the candidate file order.

use std::sync::Arc;

use color_eyre::eyre::Result;

/// The single tint applied to every sanitized sprite. A pale ice blue.
pub const TINT: crate::canvas::Colour = (0.561, 0.776, 1.0, 1.0);

/// File names probed for under the assets directory.
const CANDIDATE_FILES: [&str; 2] = ["snowflake.png", "snowflake_alt.png"];

/// Built-in snowflake silhouettes. `#` is an opaque pixel, `+` a half-opaque one.
const BUILTIN_FLAKES: [&[&str]; 2] = [
    &[
        "...##...",
        ".#.##.#.",
        "..+##+..",
        "########",
        "########",
        "..+##+..",
        ".#.##.#.",
        "...##...",
    ],
    &[
        "#..##..#",
        ".#.##.#.",
        "..####..",
        "###++###",
        "###++###",
        "..####..",
        ".#.##.#.",
        "#..##..#",
    ],
];

/// A drawable image handle for one snowflake shape.
#[derive(Clone, Debug)]
pub struct Sprite {
    /// Where the sprite came from. Only used for logging.
    source: String,
    /// The bitmap itself.
    image: image::RgbaImage,
}

impl Sprite {
    /// Whether the sprite has an actual bitmap to draw. Anything not ready gets substituted with
    /// a plain filled circle by the particle painter.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.image.width() > 0 && self.image.height() > 0
    }

    /// Where the sprite came from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Nearest-neighbour sample at normalised coordinates in `[0, 1)`.
    #[must_use]
    pub fn sample(&self, u: f32, v: f32) -> crate::canvas::Colour {
        if !self.is_ready() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss,
            reason = "Normalised coordinates into a small bitmap"
        )]
        let x = ((u.clamp(0.0, 1.0) * self.image.width() as f32) as u32)
            .min(self.image.width() - 1);
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss,
            reason = "Normalised coordinates into a small bitmap"
        )]
        let y = ((v.clamp(0.0, 1.0) * self.image.height() as f32) as u32)
            .min(self.image.height() - 1);

        let pixel = self.image.get_pixel(x, y).0;
        (
            f32::from(pixel[0]) / 255.0,
            f32::from(pixel[1]) / 255.0,
            f32::from(pixel[2]) / 255.0,
            f32::from(pixel[3]) / 255.0,
        )
    }

    /// A sprite drawn with its native colours.
    fn from_image(source: String, image: image::RgbaImage) -> Self {
        Self { source, image }
    }

    /// Sanitize a bitmap: throw away its colours and inject the single snowflake tint,
    /// keeping the alpha channel as the silhouette.
    fn tinted(source: String, mut image: image::RgbaImage) -> Self {
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "Tint channels are in [0, 1]"
        )]
        let tint = [
            (TINT.0 * 255.0) as u8,
            (TINT.1 * 255.0) as u8,
            (TINT.2 * 255.0) as u8,
        ];
        for pixel in image.pixels_mut() {
            pixel.0[0] = tint[0];
            pixel.0[1] = tint[1];
            pixel.0[2] = tint[2];
        }
        Self { source, image }
    }

    /// Build one of the built-in silhouettes, tinted like everything else.
    fn from_pattern(name: &str, rows: &[&str]) -> Self {
        let height = u32::try_from(rows.len()).unwrap_or(0);
        let width = rows
            .first()
            .map_or(0, |row| u32::try_from(row.len()).unwrap_or(0));
        let image = image::RgbaImage::from_fn(width, height, |x, y| {
            let character = rows
                .get(y as usize)
                .and_then(|row| row.as_bytes().get(x as usize))
                .copied()
                .unwrap_or(b'.');
            let alpha = match character {
                b'#' => 255,
                b'+' => 128,
                _ => 0,
            };
            image::Rgba([255, 255, 255, alpha])
        });
        Self::tinted(format!("builtin:{name}"), image)
    }
}

/// An ordered list of drawable sprites, populated asynchronously and shared with every particle
/// draw call.
#[derive(Clone, Default)]
pub struct SpriteCache {
    /// The sprites that have resolved so far.
    sprites: Arc<tokio::sync::RwLock<Vec<Sprite>>>,
}

impl SpriteCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start populating the cache from the assets directory. The built-in fallbacks are
    /// available immediately; file candidates land whenever their loads resolve. Failures are
    /// logged and otherwise invisible: the snow just has fewer shapes to pick from.
    ///
    /// The returned handles are only interesting to tests that want to await quiescence.
    pub async fn prepare(&self, assets_dir: &std::path::Path) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        for name in CANDIDATE_FILES {
            let path = assets_dir.join(name);
            let cache = self.clone();
            handles.push(tokio::spawn(async move {
                cache.load_candidate(&path).await;
            }));
        }

        let mut sprites = self.sprites.write().await;
        for (index, rows) in BUILTIN_FLAKES.iter().enumerate() {
            sprites.push(Sprite::from_pattern(&format!("flake{index}"), rows));
        }
        drop(sprites);

        handles
    }

    /// Attempt the tint pipeline, then the raw file, then give up quietly.
    async fn load_candidate(&self, path: &std::path::Path) {
        match load_tinted(path).await {
            Ok(sprite) => self.push(sprite).await,
            Err(tint_error) => {
                tracing::debug!("Sanitizing sprite {path:?}: {tint_error:?}");
                match load_raw(path).await {
                    Ok(sprite) => self.push(sprite).await,
                    Err(load_error) => {
                        tracing::debug!("Loading sprite {path:?}: {load_error:?}");
                    }
                }
            }
        }
    }

    /// Append a resolved sprite.
    async fn push(&self, sprite: Sprite) {
        tracing::debug!("Snow sprite ready: {}", sprite.source());
        self.sprites.write().await.push(sprite);
    }

    /// How many sprites have resolved so far.
    pub async fn len(&self) -> usize {
        self.sprites.read().await.len()
    }

    /// Whether any sprites have resolved yet.
    pub async fn is_empty(&self) -> bool {
        self.sprites.read().await.is_empty()
    }

    /// A snapshot of the current sprites, for one frame's drawing.
    pub async fn snapshot(&self) -> Vec<Sprite> {
        self.sprites.read().await.clone()
    }
}

/// Load a candidate file and run it through the sanitizer.
async fn load_tinted(path: &std::path::Path) -> Result<Sprite> {
    let image = decode(path).await?;
    Ok(Sprite::tinted(path.display().to_string(), image))
}

/// Load a candidate file with whatever native styling it has.
async fn load_raw(path: &std::path::Path) -> Result<Sprite> {
    let image = decode(path).await?;
    Ok(Sprite::from_image(path.display().to_string(), image))
}

/// Read and decode an image file.
async fn decode(path: &std::path::Path) -> Result<image::RgbaImage> {
    let bytes = tokio::fs::read(path).await?;
    let image = image::load_from_memory(&bytes)?.to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        color_eyre::eyre::bail!("Image {path:?} has no pixels");
    }
    Ok(image)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_patterns_are_ready_and_tinted() {
        for (index, rows) in BUILTIN_FLAKES.iter().enumerate() {
            let sprite = Sprite::from_pattern(&format!("flake{index}"), rows);
            assert!(sprite.is_ready());
            let centre = sprite.sample(0.5, 0.5);
            assert!(centre.3 > 0.0, "Flake {index} centre should be opaque");
            assert!((centre.0 - TINT.0).abs() < 0.01);
            assert!((centre.2 - TINT.2).abs() < 0.01);
        }
    }

    #[test]
    fn tinting_preserves_dimensions_and_alpha() {
        let image = image::RgbaImage::from_pixel(3, 5, image::Rgba([200, 10, 10, 77]));
        let sprite = Sprite::tinted("test".into(), image);
        assert!(sprite.is_ready());
        let sample = sprite.sample(0.5, 0.5);
        assert!((sample.3 - 77.0 / 255.0).abs() < 0.01);
        assert!((sample.0 - TINT.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn missing_candidates_degrade_to_builtins_only() {
        let assets = tempfile::tempdir().unwrap();
        let cache = SpriteCache::new();
        let handles = cache.prepare(assets.path()).await;
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len().await, BUILTIN_FLAKES.len());
    }

    #[tokio::test]
    async fn candidate_files_are_loaded_and_tinted() {
        let assets = tempfile::tempdir().unwrap();
        let bitmap = image::RgbaImage::from_pixel(4, 4, image::Rgba([9, 200, 40, 128]));
        bitmap.save(assets.path().join("snowflake.png")).unwrap();

        let cache = SpriteCache::new();
        let handles = cache.prepare(assets.path()).await;
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, BUILTIN_FLAKES.len() + 1);
        let loaded = cache
            .snapshot()
            .await
            .into_iter()
            .find(|sprite| sprite.source().ends_with("snowflake.png"))
            .unwrap();
        let sample = loaded.sample(0.5, 0.5);
        assert!((sample.0 - TINT.0).abs() < 0.01, "Native red was stripped");
        assert!((sample.3 - 0.5).abs() < 0.01, "Alpha channel preserved");
    }
}
