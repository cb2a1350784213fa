//! Playlist operations — load/seed, persistence, reorder, delete, add by
//! URL, import/export, reset.  All mutations run through the store's gated
//! mutator and persist to the shared medium afterwards, so a console
//! restart picks up exactly what the operator left.

use std::path::Path;

use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::{info, warn};

use onair_proto::envelope::PLAYLIST_KEY;
use onair_proto::store::SharedStore;
use onair_proto::track::{
    generate_id, normalize_track, parse_playlist, platform_for_url, Artist, RawTrack, Track,
    TrackSource,
};

use crate::state::{ConsoleStore, StatePatch};

/// Load the playlist at session init: shared store first, seed file as the
/// fallback (persisted back so the next boot is store-only).  Skipped while
/// something is on air — a reload must not yank the playlist out from under
/// a live track.
pub fn load(store: &mut ConsoleStore, shared: &dyn SharedStore, seed_path: &Path, now: i64) {
    if store.state().started_at.is_some() {
        return;
    }

    if let Some(raw) = shared.get(PLAYLIST_KEY) {
        let tracks = parse_playlist(&raw);
        if !tracks.is_empty() {
            info!("playlist: loaded {} tracks from store", tracks.len());
            replace(store, tracks, "playlist-load-local", now);
            return;
        }
    }

    match std::fs::read_to_string(seed_path) {
        Ok(raw) => {
            let tracks = parse_playlist(&raw);
            if tracks.is_empty() {
                warn!("playlist seed {} holds no usable tracks", seed_path.display());
                return;
            }
            info!(
                "playlist: seeded {} tracks from {}",
                tracks.len(),
                seed_path.display()
            );
            replace(store, tracks, "playlist-seed-official", now);
            save(store, shared);
        }
        Err(_) => {
            info!("playlist: no store entry and no seed file, starting empty");
        }
    }
}

/// Persist the playlist to the shared medium (best-effort).
pub fn save(store: &ConsoleStore, shared: &dyn SharedStore) {
    match serde_json::to_string(&store.state().playlist) {
        Ok(raw) => {
            if let Err(e) = shared.set(PLAYLIST_KEY, &raw) {
                warn!("playlist persist failed: {}", e);
            }
        }
        Err(e) => warn!("playlist encode failed: {}", e),
    }
}

fn replace(store: &mut ConsoleStore, tracks: Vec<Track>, reason: &str, now: i64) -> bool {
    store.apply(
        StatePatch {
            playlist: Some(tracks),
            ..StatePatch::default()
        },
        reason,
        now,
    )
}

fn editable(store: &ConsoleStore) -> bool {
    store.can_operate() && !store.state().finishing
}

pub fn shuffle(store: &mut ConsoleStore, now: i64) -> bool {
    if !editable(store) {
        return false;
    }
    let mut playlist = store.state().playlist.clone();
    if playlist.len() < 2 {
        return false;
    }
    playlist.shuffle(&mut rand::thread_rng());
    replace(store, playlist, "playlist-shuffle", now)
}

pub fn move_up(store: &mut ConsoleStore, index: usize, now: i64) -> bool {
    if !editable(store) || index == 0 || index >= store.state().playlist.len() {
        return false;
    }
    let mut playlist = store.state().playlist.clone();
    playlist.swap(index - 1, index);
    replace(store, playlist, "playlist-move-up", now)
}

pub fn move_down(store: &mut ConsoleStore, index: usize, now: i64) -> bool {
    if !editable(store) || index + 1 >= store.state().playlist.len() {
        return false;
    }
    let mut playlist = store.state().playlist.clone();
    playlist.swap(index, index + 1);
    replace(store, playlist, "playlist-move-down", now)
}

/// Remove a track.  Returns `(removed, was_live)`; when the live track was
/// deleted the engine decides what plays next.
pub fn delete(store: &mut ConsoleStore, index: usize, now: i64) -> (bool, bool) {
    if !editable(store) || index >= store.state().playlist.len() {
        return (false, false);
    }
    let mut playlist = store.state().playlist.clone();
    let removed = playlist.remove(index);
    let was_live = store.state().current_track_id.as_deref() == Some(removed.id.as_str());
    let ok = replace(store, playlist, "playlist-delete", now);
    (ok, ok && was_live)
}

// ── add by URL ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: Option<String>,
    author_name: Option<String>,
    thumbnail_url: Option<String>,
}

/// Resolve display metadata for a pasted URL.  SoundCloud URLs go through
/// the oEmbed endpoint; anything else (or any fetch failure) falls back to
/// placeholders.
async fn resolve_metadata(url: &str) -> (String, String, Option<String>) {
    if platform_for_url(url) == "soundcloud" {
        let request = reqwest::Client::new()
            .get("https://soundcloud.com/oembed")
            .query(&[("format", "json"), ("url", url)])
            .send()
            .await;
        if let Ok(response) = request {
            if let Ok(oembed) = response.json::<OEmbed>().await {
                return (
                    oembed.title.unwrap_or_else(|| "Untitled".to_string()),
                    oembed
                        .author_name
                        .unwrap_or_else(|| "Unknown Artist".to_string()),
                    oembed.thumbnail_url,
                );
            }
        }
        warn!("oembed lookup failed for {}, using placeholders", url);
    }
    ("Untitled".to_string(), "Unknown Artist".to_string(), None)
}

pub async fn add_from_url(store: &mut ConsoleStore, url: &str, now: i64) -> bool {
    if !editable(store) || url.is_empty() {
        return false;
    }
    if reqwest::Url::parse(url).is_err() {
        warn!("add rejected, not a URL: {}", url);
        return false;
    }
    let duplicate = store
        .state()
        .playlist
        .iter()
        .any(|t| t.playable_url() == Some(url));
    if duplicate {
        return false;
    }

    let (title, artist, artwork) = resolve_metadata(url).await;

    let track = Track {
        id: generate_id("manual"),
        title,
        artist: Artist { name: artist },
        contributor: None,
        artwork,
        source: Some(TrackSource {
            platform: platform_for_url(url).to_string(),
            url: url.to_string(),
        }),
        duration: None,
    };

    let mut playlist = store.state().playlist.clone();
    playlist.push(track);
    replace(store, playlist, "playlist-add-url", now)
}

// ── import / export / reset ───────────────────────────────────────────────────

/// Import a playlist JSON file, replacing the current list.  Entries are
/// normalized; missing ids are generated.
pub fn import(store: &mut ConsoleStore, path: &Path, now: i64) -> anyhow::Result<usize> {
    if !editable(store) {
        anyhow::bail!("console is not operable");
    }
    let raw = std::fs::read_to_string(path)?;
    let rows: Vec<RawTrack> = serde_json::from_str(&raw)?;
    let tracks: Vec<Track> = rows.into_iter().filter_map(normalize_track).collect();
    if tracks.is_empty() {
        anyhow::bail!("no usable tracks in {}", path.display());
    }
    let count = tracks.len();
    store.apply(
        StatePatch {
            playlist: Some(tracks),
            current_index: Some(None),
            current_track_id: Some(None),
            ..StatePatch::default()
        },
        "playlist-import-canonical",
        now,
    );
    Ok(count)
}

pub fn export(store: &ConsoleStore, path: &Path) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(&store.state().playlist)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Drop the working playlist and reseed from the canonical file.  Refused
/// while on air.
pub fn reset(store: &mut ConsoleStore, shared: &dyn SharedStore, seed_path: &Path, now: i64) -> bool {
    if !editable(store) || store.state().started_at.is_some() {
        return false;
    }
    let raw = match std::fs::read_to_string(seed_path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("reset: cannot read seed {}: {}", seed_path.display(), e);
            return false;
        }
    };
    let tracks = parse_playlist(&raw);
    if tracks.is_empty() {
        return false;
    }
    let ok = store.apply(
        StatePatch {
            playlist: Some(tracks),
            current_index: Some(None),
            current_track_id: Some(None),
            ..StatePatch::default()
        },
        "playlist-reset",
        now,
    );
    if ok {
        save(store, shared);
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use onair_proto::store::MemStore;

    fn booted_store_with(ids: &[&str]) -> ConsoleStore {
        let mut store = ConsoleStore::new();
        store.init_session("console-test", 1_000);
        let tracks: Vec<Track> = ids
            .iter()
            .map(|id| {
                normalize_track(RawTrack {
                    id: Some(id.to_string()),
                    title: Some(id.to_string()),
                    url: Some(format!("https://example.com/{}", id)),
                    ..RawTrack::default()
                })
                .unwrap()
            })
            .collect();
        replace(&mut store, tracks, "playlist-load-local", 1_500);
        store
    }

    #[test]
    fn move_and_delete_keep_bounds() {
        let mut store = booted_store_with(&["a", "b", "c"]);
        assert!(!move_up(&mut store, 0, 2_000));
        assert!(!move_down(&mut store, 2, 2_000));
        assert!(move_down(&mut store, 0, 2_000));
        assert_eq!(store.state().playlist[1].id, "a");

        let (removed, was_live) = delete(&mut store, 5, 2_100);
        assert!(!removed && !was_live);
        let (removed, was_live) = delete(&mut store, 0, 2_200);
        assert!(removed && !was_live);
        assert_eq!(store.state().playlist.len(), 2);
    }

    #[test]
    fn delete_reports_live_track() {
        let mut store = booted_store_with(&["a", "b"]);
        assert!(store.select_index(0));
        let (removed, was_live) = delete(&mut store, 0, 2_000);
        assert!(removed && was_live);
        // Index invariant: the deleted live id is gone, so both cleared.
        assert!(store.state().current_index.is_none());
        assert!(store.state().current_track_id.is_none());
    }

    #[test]
    fn edits_refused_mid_transition() {
        let mut store = booted_store_with(&["a", "b"]);
        assert!(store.begin("advance", 2_000));
        assert!(!shuffle(&mut store, 2_100));
        assert!(!move_up(&mut store, 1, 2_100));
        let (removed, _) = delete(&mut store, 0, 2_100);
        assert!(!removed);
        store.end("advance", 2_200);
    }

    #[tokio::test]
    async fn add_from_url_dedups_and_validates() {
        let mut store = booted_store_with(&["a"]);
        assert!(!add_from_url(&mut store, "not a url", 2_000).await);
        assert!(!add_from_url(&mut store, "https://example.com/a", 2_000).await);
        assert!(add_from_url(&mut store, "https://example.com/new", 2_000).await);
        assert_eq!(store.state().playlist.len(), 2);
        let added = &store.state().playlist[1];
        assert!(added.id.starts_with("manual-"));
        assert_eq!(added.source.as_ref().unwrap().platform, "url");
    }

    #[test]
    fn load_prefers_store_over_seed() {
        let shared = MemStore::new();
        shared
            .set(
                PLAYLIST_KEY,
                r#"[{"id":"stored","title":"S","url":"https://example.com/s"}]"#,
            )
            .unwrap();
        let mut store = ConsoleStore::new();
        store.init_session("console-test", 1_000);
        load(&mut store, &shared, Path::new("/nonexistent/seed.json"), 1_500);
        assert_eq!(store.state().playlist.len(), 1);
        assert_eq!(store.state().playlist[0].id, "stored");
    }

    #[test]
    fn export_then_import_round_trips() {
        let dir = std::env::temp_dir().join(format!("onair-pl-{}", generate_id("t")));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("playlist.json");

        let mut store = booted_store_with(&["a", "b"]);
        export(&store, &path).unwrap();

        let mut other = ConsoleStore::new();
        other.init_session("console-other", 1_000);
        let count = import(&mut other, &path, 2_000).unwrap();
        assert_eq!(count, 2);
        assert_eq!(other.state().playlist[0].id, "a");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
