//! Concurrent existence probes for numbered photo assets.
//!
//! For every index up to the configured maximum, `photoN.jpg` is probed, then `photoN.png` as a
//! fallback. All indices are probed concurrently, so in the default mode the announcement order
//! reflects filesystem timing, not photo numbering. The `ordered` mode instead waits for every
//! probe and announces the hits sorted by index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::shared_state::SharedState;

/// Whether an asset exists and is a plain file. The probe is a black-box predicate: any I/O
/// error at all just means "no".
pub async fn probe(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

/// Probe one photo number: `.jpg` first, then `.png`.
async fn probe_index(assets_dir: &Path, index: u16) -> Option<PathBuf> {
    let jpg = assets_dir.join(format!("photo{index}.jpg"));
    if probe(&jpg).await {
        return Some(jpg);
    }
    let png = assets_dir.join(format!("photo{index}.png"));
    if probe(&png).await {
        return Some(png);
    }
    None
}

/// Launch the probes. Hits are announced as [`crate::run::Protocol::PhotoDiscovered`] messages.
pub fn start(state: Arc<SharedState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = state.config.read().await.clone();
        let assets_dir = config.assets_dir.clone();
        let max_photos = config.gallery.max_photos;
        tracing::debug!(
            "Probing for up to {max_photos} photos in {assets_dir:?} (ordered: {})",
            config.gallery.ordered
        );

        if config.gallery.ordered {
            discover_ordered(&state, &assets_dir, max_photos).await;
        } else {
            discover_as_resolved(&state, &assets_dir, max_photos);
        }
    })
}

/// Fire every probe as its own task; hits land in whatever order the filesystem answers.
fn discover_as_resolved(state: &Arc<SharedState>, assets_dir: &Path, max_photos: u16) {
    for index in 1..=max_photos {
        let state = Arc::clone(state);
        let assets_dir = assets_dir.to_path_buf();
        tokio::spawn(async move {
            if let Some(path) = probe_index(&assets_dir, index).await {
                announce(&state, path);
            }
        });
    }
}

/// Await every probe, then announce the hits by photo number.
async fn discover_ordered(state: &Arc<SharedState>, assets_dir: &Path, max_photos: u16) {
    let probes = (1..=max_photos).map(|index| probe_index(assets_dir, index));
    let results = futures_util::future::join_all(probes).await;
    for path in results.into_iter().flatten() {
        announce(state, path);
    }
}

/// Put one hit on the protocol.
fn announce(state: &Arc<SharedState>, path: PathBuf) {
    tracing::debug!("Discovered photo: {path:?}");
    if let Err(error) = state
        .protocol_tx
        .send(crate::run::Protocol::PhotoDiscovered(path))
    {
        tracing::trace!("Announcing photo discovery: {error:?}");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"not a real image, probes only check existence").unwrap();
    }

    #[tokio::test]
    async fn probing_a_missing_file_is_false() {
        let assets = tempfile::tempdir().unwrap();
        assert!(!probe(&assets.path().join("photo1.jpg")).await);
    }

    #[tokio::test]
    async fn probing_a_directory_is_false() {
        let assets = tempfile::tempdir().unwrap();
        std::fs::create_dir(assets.path().join("photo1.jpg")).unwrap();
        assert!(!probe(&assets.path().join("photo1.jpg")).await);
    }

    #[tokio::test]
    async fn jpg_beats_png_at_the_same_index() {
        let assets = tempfile::tempdir().unwrap();
        touch(&assets.path().join("photo2.jpg"));
        touch(&assets.path().join("photo2.png"));
        let hit = probe_index(assets.path(), 2).await.unwrap();
        assert_eq!(hit, assets.path().join("photo2.jpg"));
    }

    #[tokio::test]
    async fn png_is_the_fallback() {
        let assets = tempfile::tempdir().unwrap();
        touch(&assets.path().join("photo4.png"));
        let hit = probe_index(assets.path(), 4).await.unwrap();
        assert_eq!(hit, assets.path().join("photo4.png"));
    }

    async fn collect_discoveries(
        protocol: &mut tokio::sync::broadcast::Receiver<crate::run::Protocol>,
        expected: usize,
    ) -> Vec<std::path::PathBuf> {
        let mut found = Vec::new();
        while found.len() < expected {
            let message =
                tokio::time::timeout(std::time::Duration::from_secs(5), protocol.recv())
                    .await
                    .expect("Discovery went quiet")
                    .expect("Protocol channel closed");
            if let crate::run::Protocol::PhotoDiscovered(path) = message {
                found.push(path);
            }
        }
        found
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ordered_discovery_announces_by_photo_number() {
        let assets = tempfile::tempdir().unwrap();
        touch(&assets.path().join("photo10.jpg"));
        touch(&assets.path().join("photo1.jpg"));
        touch(&assets.path().join("photo3.png"));

        let state = SharedState::init(80, 24);
        {
            let mut config = state.config.write().await;
            config.assets_dir = assets.path().to_path_buf();
            config.gallery.ordered = true;
        }

        // Subscribe before launching so nothing is missed.
        let mut protocol = state.protocol_tx.subscribe();
        let handle = start(Arc::clone(&state));
        let found = collect_discoveries(&mut protocol, 3).await;
        handle.await.unwrap();

        assert_eq!(
            found,
            vec![
                assets.path().join("photo1.jpg"),
                assets.path().join("photo3.png"),
                assets.path().join("photo10.jpg"),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unordered_discovery_finds_everything() {
        let assets = tempfile::tempdir().unwrap();
        touch(&assets.path().join("photo5.jpg"));
        touch(&assets.path().join("photo7.png"));

        let state = SharedState::init(80, 24);
        state.config.write().await.assets_dir = assets.path().to_path_buf();

        let mut protocol = state.protocol_tx.subscribe();
        start(Arc::clone(&state)).await.unwrap();
        let mut found = collect_discoveries(&mut protocol, 2).await;

        found.sort();
        assert_eq!(
            found,
            vec![
                assets.path().join("photo5.jpg"),
                assets.path().join("photo7.png"),
            ]
        );
    }
}
