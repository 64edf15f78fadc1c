//! The manager of all the card's animated systems.

use std::sync::Arc;

use color_eyre::eyre::Result;

use crate::shared_state::SharedState;

/// Spawn every effect task. The returned handle resolves once they have all wound down.
pub fn start_effects(
    state: Arc<SharedState>,
    frames_tx: tokio::sync::mpsc::Sender<crate::run::FrameUpdate>,
) -> tokio::task::JoinHandle<Result<()>> {
    tokio::spawn(async move {
        // Kick the sprite loads off first so the snow has something to draw by reveal time.
        let assets_dir = state.config.read().await.assets_dir.clone();
        let sprites = crate::effects::sprites::SpriteCache::new();
        sprites.prepare(&assets_dir).await;

        let card = supervise(
            &state,
            crate::effects::card::Card::start(Arc::clone(&state), frames_tx.clone()),
        );
        let snow = supervise(
            &state,
            crate::effects::snow::Snow::start(Arc::clone(&state), frames_tx.clone(), sprites),
        );
        let cakes = supervise(
            &state,
            crate::effects::cakes::Cakes::start(Arc::clone(&state), frames_tx.clone()),
        );
        let gallery = supervise(
            &state,
            crate::gallery::view::Gallery::start(Arc::clone(&state), frames_tx),
        );

        let (card, snow, cakes, gallery) = tokio::try_join!(card, snow, cakes, gallery)?;
        card?;
        snow?;
        cakes?;
        gallery?;

        tracing::debug!("All effects finished");
        Ok(())
    })
}

/// Run one effect to completion, making sure the rest of the app winds down if it dies.
fn supervise(
    state: &Arc<SharedState>,
    effect: impl std::future::Future<Output = Result<()>> + Send + 'static,
) -> tokio::task::JoinHandle<Result<()>> {
    let protocol_tx = state.protocol_tx.clone();
    tokio::spawn(async move {
        let result = effect.await;
        if let Err(error) = &result {
            tracing::error!("Effect failed: {error:?}");
            crate::run::broadcast_protocol_end(&protocol_tx);
        }
        result
    })
}
