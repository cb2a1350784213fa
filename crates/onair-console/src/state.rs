//! ConsoleStore — single source of truth for the operator session.
//!
//! Every mutation goes through [`ConsoleStore::apply`], a reason-gated patch
//! mutator.  Multiple subsystems (operator commands, the playback engine,
//! the heartbeat) funnel through it, so fields that declare "something is on
//! air" are accepted only under an explicit allow-list of transition
//! reasons; a stray command patch cannot smuggle in a fake now-playing
//! state.

use std::collections::VecDeque;

use tokio::sync::broadcast;
use tracing::warn;

use onair_proto::track::Track;

/// Diagnostic event log cap — most-recent kept, oldest evicted.
pub const EVENT_LOG_LIMIT: usize = 300;

/// Unknown track lengths fall back to one hour so a runaway auto-advance
/// cannot sit forever on a zero-duration track.
pub const FALLBACK_DURATION_MS: i64 = 60 * 60 * 1000;

/// The designated init reason — the only one accepted before boot.
pub const INIT_REASON: &str = "admin-init";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    Idle,
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Idle,
    Ok,
    Degraded,
    Lost,
}

impl HealthStatus {
    /// Short label for the status line.
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Idle => "IDLE",
            HealthStatus::Ok => "OK",
            HealthStatus::Degraded => "DEGD",
            HealthStatus::Lost => "LOST",
        }
    }
}

/// Writer lease / liveness as observed on the shared medium.
#[derive(Debug, Clone, PartialEq)]
pub struct Health {
    pub owner: Option<String>,
    pub lease_until: Option<i64>,
    pub last_heartbeat_at: Option<i64>,
    pub status: HealthStatus,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            owner: None,
            lease_until: None,
            last_heartbeat_at: None,
            status: HealthStatus::Idle,
        }
    }
}

/// Denormalized copy of the playing track, captured at transition time.  The
/// envelope is built from this, never from a live playlist reference.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub contributor: Option<String>,
    pub artwork: Option<String>,
    pub source_url: String,
    /// Nominal length in seconds as stored on the track (wire value).
    pub duration_secs: Option<f64>,
    /// Normalized length in milliseconds, fallback applied.  Drives
    /// auto-advance.
    pub duration_ms: i64,
}

impl NowPlaying {
    pub fn from_track(track: &Track) -> Option<Self> {
        let url = track.playable_url()?.to_string();
        Some(Self {
            track_id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.name.clone(),
            contributor: track.contributor.as_ref().map(|c| c.name.clone()),
            artwork: track.artwork.clone(),
            source_url: url,
            duration_secs: track.duration.filter(|d| d.is_finite() && *d > 0.0),
            duration_ms: track.duration_ms().unwrap_or(FALLBACK_DURATION_MS),
        })
    }
}

#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub at: i64,
    pub reason: String,
    pub keys: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct ConsoleState {
    pub booted: bool,
    pub mode: ConsoleMode,
    pub console_id: Option<String>,
    pub session_started_at: Option<i64>,

    pub playlist: Vec<Track>,
    pub current_index: Option<usize>,
    pub current_track_id: Option<String>,
    pub random_mode: bool,

    pub started_at: Option<i64>,
    pub now_playing: Option<NowPlaying>,

    /// Transition lock — true exactly while a play/advance/stop is in
    /// flight.
    pub finishing: bool,

    pub manual_play_issued: bool,
    pub last_advance_reason: Option<String>,

    pub health: Health,

    /// Single-level snapshot taken before any non-transitional playlist
    /// mutation.
    pub playlist_undo: Option<Vec<Track>>,
    pub event_log: VecDeque<EventLogEntry>,
}

impl ConsoleState {
    fn initial() -> Self {
        Self {
            booted: false,
            mode: ConsoleMode::Idle,
            console_id: None,
            session_started_at: None,
            playlist: Vec::new(),
            current_index: None,
            current_track_id: None,
            random_mode: false,
            started_at: None,
            now_playing: None,
            finishing: false,
            manual_play_issued: false,
            last_advance_reason: None,
            health: Health::default(),
            playlist_undo: None,
            event_log: VecDeque::new(),
        }
    }
}

/// Partial update.  `Option<Option<T>>` fields distinguish "leave alone"
/// from "set to null".
#[derive(Debug, Default)]
pub struct StatePatch {
    pub booted: Option<bool>,
    pub mode: Option<ConsoleMode>,
    pub console_id: Option<Option<String>>,
    pub session_started_at: Option<Option<i64>>,
    pub playlist: Option<Vec<Track>>,
    pub current_index: Option<Option<usize>>,
    pub current_track_id: Option<Option<String>>,
    pub random_mode: Option<bool>,
    pub started_at: Option<Option<i64>>,
    pub now_playing: Option<Option<NowPlaying>>,
    pub finishing: Option<bool>,
    pub manual_play_issued: Option<bool>,
    pub last_advance_reason: Option<Option<String>>,
    pub health: Option<Health>,
}

impl StatePatch {
    /// True when the patch touches a field that asserts live/transition
    /// state.
    fn touches_live(&self) -> bool {
        self.started_at.is_some()
            || self.now_playing.is_some()
            || self.finishing.is_some()
            || self.mode.is_some()
    }
}

/// Reasons allowed to touch live/transition fields.
fn reason_may_touch_live(reason: &str) -> bool {
    matches!(
        reason,
        INIT_REASON | "play-start" | "advance-start" | "stop" | "rehydrate"
    ) || reason.starts_with("begin:")
        || reason.starts_with("end:")
}

/// Notification sent to subscribers after every accepted mutation.
#[derive(Debug, Clone)]
pub struct StateEvent {
    pub reason: String,
    pub keys: Vec<&'static str>,
}

pub struct ConsoleStore {
    state: ConsoleState,
    events: broadcast::Sender<StateEvent>,
}

impl ConsoleStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: ConsoleState::initial(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &ConsoleState {
        &self.state
    }

    /// Deep, independent copy — callers can never reach internal state
    /// through the returned value.
    pub fn snapshot(&self) -> ConsoleState {
        self.state.clone()
    }

    pub fn can_operate(&self) -> bool {
        self.state.booted && self.state.mode == ConsoleMode::Operator
    }

    pub fn can_advance(&self) -> bool {
        self.can_operate() && !self.state.finishing
    }

    /// Apply a partial update.  Returns false (and changes nothing) when the
    /// store is not yet initialized, or when the patch touches live fields
    /// under a reason outside the transition allow-list.
    pub fn apply(&mut self, patch: StatePatch, reason: &str, now: i64) -> bool {
        if !self.state.booted && reason != INIT_REASON {
            return false;
        }
        if patch.touches_live() && !reason_may_touch_live(reason) {
            warn!("patch rejected: reason {:?} may not touch live fields", reason);
            return false;
        }

        if patch.playlist.is_some() && !self.state.finishing {
            self.state.playlist_undo = Some(self.state.playlist.clone());
        }

        let mut keys: Vec<&'static str> = Vec::new();
        let playlist_changed = patch.playlist.is_some();

        if let Some(v) = patch.booted {
            self.state.booted = v;
            keys.push("booted");
        }
        if let Some(v) = patch.mode {
            self.state.mode = v;
            keys.push("mode");
        }
        if let Some(v) = patch.console_id {
            self.state.console_id = v;
            keys.push("consoleId");
        }
        if let Some(v) = patch.session_started_at {
            self.state.session_started_at = v;
            keys.push("sessionStartedAt");
        }
        if let Some(v) = patch.playlist {
            self.state.playlist = v;
            keys.push("playlist");
        }
        if let Some(v) = patch.current_index {
            self.state.current_index = v;
            keys.push("currentIndex");
        }
        if let Some(v) = patch.current_track_id {
            self.state.current_track_id = v;
            keys.push("currentTrackId");
        }
        if let Some(v) = patch.random_mode {
            self.state.random_mode = v;
            keys.push("randomMode");
        }
        if let Some(v) = patch.started_at {
            self.state.started_at = v;
            keys.push("startedAt");
        }
        if let Some(v) = patch.now_playing {
            self.state.now_playing = v;
            keys.push("nowPlaying");
        }
        if let Some(v) = patch.finishing {
            self.state.finishing = v;
            keys.push("finishing");
        }
        if let Some(v) = patch.manual_play_issued {
            self.state.manual_play_issued = v;
            keys.push("manualPlayIssued");
        }
        if let Some(v) = patch.last_advance_reason {
            self.state.last_advance_reason = v;
            keys.push("lastAdvanceReason");
        }
        if let Some(v) = patch.health {
            self.state.health = v;
            keys.push("health");
        }

        // The index must never point at the wrong track after a reorder or
        // delete: recompute it from the id, or clear both when the id is
        // gone.
        if playlist_changed {
            if let Some(id) = self.state.current_track_id.clone() {
                match self.state.playlist.iter().position(|t| t.id == id) {
                    Some(idx) => self.state.current_index = Some(idx),
                    None => {
                        self.state.current_index = None;
                        self.state.current_track_id = None;
                    }
                }
            }
        }

        self.log_event(reason, keys.clone(), now);
        let _ = self.events.send(StateEvent {
            reason: reason.to_string(),
            keys,
        });
        true
    }

    fn log_event(&mut self, reason: &str, keys: Vec<&'static str>, now: i64) {
        self.state.event_log.push_back(EventLogEntry {
            at: now,
            reason: reason.to_string(),
            keys,
        });
        while self.state.event_log.len() > EVENT_LOG_LIMIT {
            self.state.event_log.pop_front();
        }
    }

    // ── session ───────────────────────────────────────────────────────────────

    pub fn init_session(&mut self, console_id: &str, now: i64) {
        self.apply(
            StatePatch {
                booted: Some(true),
                mode: Some(ConsoleMode::Operator),
                console_id: Some(Some(console_id.to_string())),
                session_started_at: Some(Some(now)),
                finishing: Some(false),
                ..StatePatch::default()
            },
            INIT_REASON,
            now,
        );
    }

    // ── transition lock ───────────────────────────────────────────────────────

    /// Acquire the transition lock.  False when a transition is already in
    /// flight.
    pub fn begin(&mut self, what: &str, now: i64) -> bool {
        if self.state.finishing {
            return false;
        }
        self.apply(
            StatePatch {
                finishing: Some(true),
                ..StatePatch::default()
            },
            &format!("begin:{}", what),
            now,
        )
    }

    pub fn end(&mut self, what: &str, now: i64) {
        self.apply(
            StatePatch {
                finishing: Some(false),
                ..StatePatch::default()
            },
            &format!("end:{}", what),
            now,
        );
    }

    // ── selection (transition-internal) ───────────────────────────────────────

    /// Point the session at a playlist index, capturing the denormalized
    /// now-playing copy.  Direct mutation: only the engine calls this, from
    /// inside a held transition lock.
    pub fn select_index(&mut self, index: usize) -> bool {
        let Some(track) = self.state.playlist.get(index) else {
            return false;
        };
        let Some(now_playing) = NowPlaying::from_track(track) else {
            return false;
        };
        self.state.current_index = Some(index);
        self.state.current_track_id = Some(track.id.clone());
        self.state.now_playing = Some(now_playing);
        true
    }

    // ── undo ──────────────────────────────────────────────────────────────────

    /// Restore the playlist captured before the last mutation.  Exactly one
    /// level; consumed on use.
    pub fn undo_playlist(&mut self, now: i64) -> bool {
        if self.state.finishing {
            return false;
        }
        let Some(previous) = self.state.playlist_undo.take() else {
            return false;
        };
        let ok = self.apply(
            StatePatch {
                playlist: Some(previous),
                ..StatePatch::default()
            },
            "playlist-undo",
            now,
        );
        // The apply above captured the undone playlist as a new undo level;
        // undo is single-shot, so drop it.
        self.state.playlist_undo = None;
        ok
    }
}

impl Default for ConsoleStore {
    fn default() -> Self {
        Self::new()
    }
}
