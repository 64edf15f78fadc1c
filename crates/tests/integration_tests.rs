//! End to end tests: drive the card's systems over the real protocol and watch the frames they
//! send to the renderer.

#[cfg(test)]
mod e2e {
    use std::sync::Arc;

    use festoon::canvas::Canvas;
    use festoon::run::{FrameUpdate, Protocol};
    use festoon::shared_state::SharedState;

    /// A five second ceiling keeps a wedged system from hanging the whole suite.
    const PATIENCE: std::time::Duration = std::time::Duration::from_secs(5);

    async fn setup_state(assets_dir: &std::path::Path) -> Arc<SharedState> {
        let state = SharedState::init(120, 36);
        // The tests drive their own timing, so autoplay is pushed out of the way.
        let mut config = state.config.write().await;
        config.assets_dir = assets_dir.to_path_buf();
        config.gallery.autoplay_interval_ms = 3_600_000;
        drop(config);
        state
    }

    fn save_photo(path: &std::path::Path) {
        let photo = image::RgbaImage::from_pixel(6, 4, image::Rgba([200, 30, 60, 255]));
        photo.save(path).unwrap();
    }

    fn has_any_pixel(canvas: &Canvas) -> bool {
        (0..canvas.height()).any(|y| (0..canvas.width()).any(|x| canvas.pixel(x, y).is_some()))
    }

    /// Drain frames until one from `id` satisfies the predicate.
    async fn wait_for_canvas(
        frames_rx: &mut tokio::sync::mpsc::Receiver<FrameUpdate>,
        id: &str,
        predicate: impl Fn(&Canvas) -> bool,
    ) -> Canvas {
        let deadline = tokio::time::Instant::now() + PATIENCE;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .expect("Timed out waiting for a matching frame");
            let update = tokio::time::timeout(remaining, frames_rx.recv())
                .await
                .expect("Timed out waiting for a frame")
                .expect("Frame channel closed");
            let FrameUpdate::Layer(canvas) = update else {
                continue;
            };
            if canvas.id == id && predicate(&canvas) {
                return canvas;
            }
        }
    }

    /// Once a test is done, let everything wind down and prove that it does.
    async fn finish(
        state: &Arc<SharedState>,
        mut frames_rx: tokio::sync::mpsc::Receiver<FrameUpdate>,
        handle: tokio::task::JoinHandle<color_eyre::eyre::Result<()>>,
    ) {
        state.protocol_tx.send(Protocol::End).unwrap();
        let drain = tokio::spawn(async move { while frames_rx.recv().await.is_some() {} });
        tokio::time::timeout(PATIENCE, handle)
            .await
            .expect("System didn't stop on End")
            .unwrap()
            .unwrap();
        drain.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn the_card_renders_its_greeting() {
        let assets = tempfile::tempdir().unwrap();
        let state = setup_state(assets.path()).await;
        let (frames_tx, mut frames_rx) = tokio::sync::mpsc::channel(256);

        let title = state.config.read().await.greeting.title.clone();
        let handle = tokio::spawn(festoon::effects::card::Card::start(
            Arc::clone(&state),
            frames_tx,
        ));

        let canvas = wait_for_canvas(&mut frames_rx, "card", |canvas| {
            canvas.texts().iter().any(|span| span.text == title)
        })
        .await;
        assert!(
            canvas
                .texts()
                .iter()
                .any(|span| span.text.contains("press s to open")),
            "An unrevealed card shows the reveal hint"
        );

        finish(&state, frames_rx, handle).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn the_gallery_discovers_and_displays_a_photo() {
        let assets = tempfile::tempdir().unwrap();
        save_photo(&assets.path().join("photo1.png"));
        let state = setup_state(assets.path()).await;
        let (frames_tx, mut frames_rx) = tokio::sync::mpsc::channel(256);

        let handle = tokio::spawn(festoon::gallery::view::Gallery::start(
            Arc::clone(&state),
            frames_tx,
        ));

        let canvas = wait_for_canvas(&mut frames_rx, "gallery", has_any_pixel).await;
        assert!(
            canvas.texts().iter().any(|span| span.text == " 1 "),
            "The discovered photo gets a thumb control"
        );

        finish(&state, frames_rx, handle).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_swipe_moves_the_pressed_indicator() {
        let assets = tempfile::tempdir().unwrap();
        save_photo(&assets.path().join("photo1.png"));
        save_photo(&assets.path().join("photo2.png"));
        let state = setup_state(assets.path()).await;
        let (frames_tx, mut frames_rx) = tokio::sync::mpsc::channel(256);

        let handle = tokio::spawn(festoon::gallery::view::Gallery::start(
            Arc::clone(&state),
            frames_tx,
        ));

        // Both photos need to be on the thumb strip before the gesture means anything.
        wait_for_canvas(&mut frames_rx, "gallery", |canvas| {
            canvas.texts().iter().any(|span| span.text == " 2 ")
        })
        .await;

        // A long leftward drag: next photo.
        state
            .protocol_tx
            .send(Protocol::Action(festoon::input::Action::PointerDown {
                x: 100,
                y: 12,
            }))
            .unwrap();
        state
            .protocol_tx
            .send(Protocol::Action(festoon::input::Action::PointerUp {
                x: 10,
                y: 12,
            }))
            .unwrap();

        wait_for_canvas(&mut frames_rx, "gallery", |canvas| {
            canvas
                .texts()
                .iter()
                .any(|span| span.text == " 2 " && span.background.is_some())
        })
        .await;

        finish(&state, frames_rx, handle).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn revealing_the_card_starts_the_snow() {
        let assets = tempfile::tempdir().unwrap();
        let state = setup_state(assets.path()).await;
        let (frames_tx, mut frames_rx) = tokio::sync::mpsc::channel(256);

        let sprites = festoon::effects::sprites::SpriteCache::new();
        let handle = tokio::spawn(festoon::effects::snow::Snow::start(
            Arc::clone(&state),
            frames_tx,
            sprites,
        ));

        // Give the snow task a moment to subscribe before announcing the reveal.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        state.protocol_tx.send(Protocol::Reveal(true)).unwrap();

        wait_for_canvas(&mut frames_rx, "snow", has_any_pixel).await;

        finish(&state, frames_rx, handle).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cakes_float_without_any_user_action() {
        let assets = tempfile::tempdir().unwrap();
        let state = setup_state(assets.path()).await;
        let (frames_tx, mut frames_rx) = tokio::sync::mpsc::channel(256);

        let handle = tokio::spawn(festoon::effects::cakes::Cakes::start(
            Arc::clone(&state),
            frames_tx,
        ));

        wait_for_canvas(&mut frames_rx, "cakes", has_any_pixel).await;

        finish(&state, frames_rx, handle).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_system_stops_on_the_end_message() {
        let assets = tempfile::tempdir().unwrap();
        save_photo(&assets.path().join("photo1.png"));
        let state = setup_state(assets.path()).await;
        let (frames_tx, mut frames_rx) = tokio::sync::mpsc::channel(256);

        let handle = festoon::loader::start_effects(Arc::clone(&state), frames_tx);

        wait_for_canvas(&mut frames_rx, "card", |_| true).await;
        finish(&state, frames_rx, handle).await;
    }
}
