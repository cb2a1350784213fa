use serde::{Deserialize, Serialize};

/// Current broadcast protocol version.  Bump this when the envelope format
/// changes in a breaking way.  Listeners check this on every read and treat
/// a mismatched envelope as if no envelope existed.
pub const PROTOCOL_VERSION: u32 = 3;

// ── shared storage keys ───────────────────────────────────────────────────────

pub const BROADCAST_KEY: &str = "onair_broadcast_state_v3";
pub const SNAPSHOT_KEY: &str = "onair_broadcast_snapshot_v1";
pub const PLAYLIST_KEY: &str = "onair_playlist_v1";
pub const LEASE_KEY: &str = "onair_writer_lease_v1";
pub const CLIENT_ID_KEY: &str = "onair_client_id_v1";
pub const SESSIONS_KEY: &str = "onair_listener_sessions_v1";
pub const LISTENER_PING_PREFIX: &str = "onair_listener_ping_";

// ── protocol timing ───────────────────────────────────────────────────────────

/// How long a listener trusts the last valid envelope before assuming the
/// writer is gone.  The writer heartbeats every second, so this tolerates
/// ~30 missed writes.
pub const BROADCAST_TTL_MS: i64 = 30_000;

/// Writer lease duration.  A crashed console's lease expires naturally
/// within one window; a healthy one renews at half this.
pub const LEASE_MS: i64 = 30_000;

/// Display metadata denormalized into every live envelope so listeners never
/// need a second lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMeta {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub contributor: Option<String>,
    #[serde(default)]
    pub artwork: Option<String>,
}

/// Broadcast phase, tagged by the wire `status` field.  A live envelope
/// carries its transport fields inside the variant, so "status says live but
/// url is null" cannot be represented — such a record fails to parse and is
/// handled by the same path as a missing envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BroadcastStatus {
    #[serde(rename_all = "camelCase")]
    Live {
        track_id: String,
        url: String,
        /// Epoch-ms clock origin shared by every reader:
        /// `offset = now - startedAt`.
        started_at: i64,
        /// Nominal length in seconds.  None = unknown; readers fall back to
        /// a bounded visual-only heuristic.
        #[serde(default)]
        duration: Option<f64>,
        meta: TrackMeta,
    },
    Offair,
    Transition,
}

/// The versioned record written to shared storage by the console and read by
/// every listener.  Pure data; the console is the only writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u32,
    #[serde(flatten)]
    pub status: BroadcastStatus,
    /// Opaque writer identity, used for lease ownership and handoff
    /// detection.
    pub owner: String,
    /// Epoch-ms after which this envelope is stale even if otherwise
    /// well-formed.
    pub lease_until: i64,
    /// Epoch-ms of the last write; staleness signal independent of the
    /// lease.
    pub updated_at: i64,
}

impl Envelope {
    /// Safe parse.  Never panics, never errors: any malformed payload is
    /// `None` and must be treated exactly like a missing envelope.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// Absolute validity check (pure).  A listener reacts only to envelopes
    /// that pass this: exact version match and an unexpired lease.  The
    /// live-requires-transport rule is enforced structurally by
    /// [`BroadcastStatus`] at parse time.
    pub fn is_valid(&self, now_ms: i64) -> bool {
        self.version == PROTOCOL_VERSION && now_ms <= self.lease_until
    }

    pub fn is_live(&self) -> bool {
        matches!(self.status, BroadcastStatus::Live { .. })
    }

    /// `(url, startedAt)` — the identity of the playing track.  Two
    /// envelopes with the same identity describe the same logical playback.
    pub fn track_identity(&self) -> Option<(&str, i64)> {
        match &self.status {
            BroadcastStatus::Live {
                url, started_at, ..
            } => Some((url.as_str(), *started_at)),
            _ => None,
        }
    }

    pub fn live_meta(&self) -> Option<&TrackMeta> {
        match &self.status {
            BroadcastStatus::Live { meta, .. } => Some(meta),
            _ => None,
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match &self.status {
            BroadcastStatus::Live { duration, .. } => *duration,
            _ => None,
        }
    }
}

/// Advisory last-known-good envelope on its own key.  Written by the console
/// on every successful live publish, cleared on explicit stop, read once at
/// listener boot to pre-fill the display.  Never authoritative, never starts
/// audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub saved_at: i64,
    pub state: Envelope,
}

impl Snapshot {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_envelope(now: i64) -> Envelope {
        Envelope {
            version: PROTOCOL_VERSION,
            status: BroadcastStatus::Live {
                track_id: "t1".into(),
                url: "https://example.com/set1".into(),
                started_at: now - 5_000,
                duration: Some(3600.0),
                meta: TrackMeta {
                    title: "Night Set".into(),
                    artist: "Someone".into(),
                    contributor: None,
                    artwork: None,
                },
            },
            owner: "console-abc".into(),
            lease_until: now + LEASE_MS,
            updated_at: now,
        }
    }

    #[test]
    fn valid_live_envelope_passes() {
        let now = 1_700_000_000_000;
        assert!(live_envelope(now).is_valid(now));
    }

    #[test]
    fn version_mismatch_is_invalid() {
        let now = 1_700_000_000_000;
        let mut env = live_envelope(now);
        env.version = PROTOCOL_VERSION + 1;
        assert!(!env.is_valid(now));
    }

    #[test]
    fn expired_lease_is_invalid() {
        let now = 1_700_000_000_000;
        let mut env = live_envelope(now);
        env.lease_until = now - 1;
        assert!(!env.is_valid(now));
    }

    #[test]
    fn live_without_transport_fails_to_parse() {
        // status says live but the transport fields are missing — must be
        // indistinguishable from no envelope at all.
        let raw = r#"{"version":3,"status":"live","owner":"x","leaseUntil":99,"updatedAt":1}"#;
        assert!(Envelope::parse(raw).is_none());
    }

    #[test]
    fn garbage_and_wrong_shapes_parse_to_none() {
        assert!(Envelope::parse("").is_none());
        assert!(Envelope::parse("not json").is_none());
        assert!(Envelope::parse("[1,2,3]").is_none());
        assert!(Envelope::parse(r#"{"version":"three"}"#).is_none());
    }

    #[test]
    fn wire_format_matches_contract() {
        let now = 1_700_000_000_000;
        let json = serde_json::to_value(live_envelope(now)).unwrap();
        assert_eq!(json["status"], "live");
        assert_eq!(json["url"], "https://example.com/set1");
        assert_eq!(json["startedAt"], now - 5_000);
        assert_eq!(json["leaseUntil"], now + LEASE_MS);
        assert_eq!(json["meta"]["artist"], "Someone");

        let offair = Envelope {
            status: BroadcastStatus::Offair,
            ..live_envelope(now)
        };
        let json = serde_json::to_value(offair).unwrap();
        assert_eq!(json["status"], "offair");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn offair_envelope_is_valid_without_transport() {
        let now = 1_700_000_000_000;
        let raw = format!(
            r#"{{"version":3,"status":"offair","owner":"c","leaseUntil":{},"updatedAt":{}}}"#,
            now + 1000,
            now
        );
        let env = Envelope::parse(&raw).expect("offair parses");
        assert!(env.is_valid(now));
        assert!(!env.is_live());
        assert!(env.track_identity().is_none());
    }
}
