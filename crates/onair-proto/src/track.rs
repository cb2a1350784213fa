use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::envelope::TrackMeta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSource {
    pub platform: String,
    pub url: String,
}

/// One playlist entry.  Owned exclusively by the console's playlist; the
/// envelope only ever carries a denormalized [`TrackMeta`] copy of the
/// playing track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: Artist,
    #[serde(default)]
    pub contributor: Option<Contributor>,
    #[serde(default)]
    pub artwork: Option<String>,
    #[serde(default)]
    pub source: Option<TrackSource>,
    /// Nominal length in seconds.  None / non-positive = unknown.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl Track {
    pub fn meta(&self) -> TrackMeta {
        TrackMeta {
            title: self.title.clone(),
            artist: self.artist.name.clone(),
            contributor: self.contributor.as_ref().map(|c| c.name.clone()),
            artwork: self.artwork.clone(),
        }
    }

    /// Duration in milliseconds when known and positive.
    pub fn duration_ms(&self) -> Option<i64> {
        match self.duration {
            Some(secs) if secs.is_finite() && secs > 0.0 => Some((secs * 1000.0) as i64),
            _ => None,
        }
    }

    pub fn playable_url(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.url.as_str())
    }
}

// ── normalization ─────────────────────────────────────────────────────────────

/// Artist / contributor fields arrive either as a bare string or as an
/// object with a `name`, depending on the source.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NameField {
    Plain(String),
    Named {
        #[serde(default)]
        name: Option<String>,
    },
}

impl NameField {
    fn into_name(self) -> Option<String> {
        let name = match self {
            NameField::Plain(s) => Some(s),
            NameField::Named { name } => name,
        };
        name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSource {
    #[serde(default)]
    pub platform: Option<String>,
    pub url: String,
}

/// Loose track shape accepted from seed files, imports and edits.  Every
/// track in the system goes through [`normalize_track`] so the stored shape
/// stays consistent no matter where it came from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrack {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<NameField>,
    #[serde(default)]
    pub contributor: Option<NameField>,
    #[serde(default)]
    pub artwork: Option<String>,
    /// Legacy seed-file alias for `artwork`.
    #[serde(default)]
    pub cover: Option<String>,
    /// Shorthand for `source.url`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<RawSource>,
    #[serde(default)]
    pub duration: Option<f64>,
}

pub fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{}-{}", prefix, suffix.to_lowercase())
}

pub fn platform_for_url(url: &str) -> &'static str {
    if url.to_ascii_lowercase().contains("soundcloud.com") {
        "soundcloud"
    } else {
        "url"
    }
}

/// Build a canonical [`Track`] from loose input.  Returns `None` when there
/// is no usable source URL — a track that cannot play has no place in the
/// playlist.
pub fn normalize_track(raw: RawTrack) -> Option<Track> {
    let source = match raw.source {
        Some(s) => Some(TrackSource {
            platform: s
                .platform
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| platform_for_url(&s.url).to_string()),
            url: s.url,
        }),
        None => raw.url.filter(|u| !u.trim().is_empty()).map(|u| TrackSource {
            platform: platform_for_url(&u).to_string(),
            url: u,
        }),
    };
    source.as_ref()?;

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let artist = raw
        .artist
        .and_then(NameField::into_name)
        .unwrap_or_else(|| "Unknown Artist".to_string());

    Some(Track {
        id: raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| generate_id("seed")),
        title,
        artist: Artist { name: artist },
        contributor: raw
            .contributor
            .and_then(NameField::into_name)
            .map(|name| Contributor { name }),
        artwork: raw.artwork.or(raw.cover).filter(|a| !a.trim().is_empty()),
        source,
        duration: raw.duration.filter(|d| d.is_finite() && *d > 0.0),
    })
}

/// Parse a playlist JSON array, normalizing each entry and skipping the
/// unusable ones.
pub fn parse_playlist(raw: &str) -> Vec<Track> {
    let rows: Vec<RawTrack> = match serde_json::from_str(raw) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("playlist payload unreadable: {}", e);
            return Vec::new();
        }
    };
    let total = rows.len();
    let tracks: Vec<Track> = rows.into_iter().filter_map(normalize_track).collect();
    if tracks.len() < total {
        warn!(
            "playlist: skipped {} entries without a playable source",
            total - tracks.len()
        );
    }
    tracks
}
