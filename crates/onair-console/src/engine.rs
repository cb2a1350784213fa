//! ConsoleCore — single-owner event loop for the operator session.
//!
//! All inputs (operator commands, heartbeat ticks) funnel into this loop;
//! ConsoleCore owns the [`ConsoleStore`] and the writer lease exclusively.
//! Every authoritative change publishes the broadcast envelope to the
//! shared medium.
//!
//! Playback only moves forward two ways: an operator command, or the
//! duration timeout measured on the heartbeat tick.  There is deliberately
//! no writer-side stall watchdog — listeners run their own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use onair_proto::envelope::{
    BroadcastStatus, Envelope, Snapshot, TrackMeta, BROADCAST_KEY, LEASE_MS, PROTOCOL_VERSION,
    SNAPSHOT_KEY,
};
use onair_proto::platform::now_ms;
use onair_proto::store::{write_json, SharedStore};
use onair_proto::timer::TimerHandle;

use crate::lease::LeaseManager;
use crate::playlist;
use crate::state::{ConsoleStore, Health, HealthStatus, StatePatch};

/// Envelope refresh cadence while live.  The tick also drives duration-based
/// auto-advance; it makes no other playback decisions.
pub const HEARTBEAT_MS: u64 = 1_000;

/// Hard cooldown between advances — absorbs duplicate rapid triggers (a
/// double keypress and the duration timeout firing near-simultaneously).
pub const ADVANCE_COOLDOWN_MS: i64 = 1_500;

/// Operator commands, as forwarded by the input surface.
#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    PlayIndex(usize),
    Advance,
    Stop,
    KillSwitch,
    ToggleRandom,
    Shuffle,
    MoveUp(usize),
    MoveDown(usize),
    Delete(usize),
    AddUrl(String),
    Undo,
    Import(PathBuf),
    Export(PathBuf),
    Reset,
    List,
    Status,
}

/// All inputs into the ConsoleCore loop.
#[derive(Debug)]
pub enum ConsoleEvent {
    Command(ConsoleCommand),
    /// Heartbeat — refresh the envelope, renew the lease, check
    /// auto-advance.
    HeartbeatTick,
    Shutdown,
}

pub struct ConsoleCore {
    store: ConsoleStore,
    shared: Arc<dyn SharedStore>,
    lease: LeaseManager,
    seed_path: PathBuf,
    heartbeat: TimerHandle,
    event_tx: mpsc::Sender<ConsoleEvent>,
    /// Epoch-ms of the last successful advance; 0 = no pending cooldown.
    last_advance_at: i64,
}

impl ConsoleCore {
    pub fn new(
        shared: Arc<dyn SharedStore>,
        seed_path: PathBuf,
        event_tx: mpsc::Sender<ConsoleEvent>,
    ) -> Self {
        let lease = LeaseManager::new(shared.clone());
        Self {
            store: ConsoleStore::new(),
            shared,
            lease,
            seed_path,
            heartbeat: TimerHandle::new("console-heartbeat"),
            event_tx,
            last_advance_at: 0,
        }
    }

    pub fn store(&self) -> &ConsoleStore {
        &self.store
    }

    /// Boot the operator session: init state, claim the writer lease (with
    /// the reacquire failsafe), load the playlist, re-adopt any still-valid
    /// live broadcast.
    pub fn init_session(&mut self, now: i64) {
        self.store.init_session(self.lease.id(), now);

        if !self.lease.acquire(now) {
            warn!("another console holds the writer lease; publishing disabled until it lapses");
        } else if !self.lease.has_lease(now) {
            warn!("lease missing after acquire, forcing reacquire");
            self.lease.acquire(now);
        }

        playlist::load(&mut self.store, self.shared.as_ref(), &self.seed_path, now);
        self.rehydrate(now);
        self.sync_health(now);

        info!(
            "console session ready id={} playlist={} live={}",
            self.lease.id(),
            self.store.state().playlist.len(),
            self.store.state().started_at.is_some(),
        );
    }

    /// Run the core event loop.  Returns when a `Shutdown` event arrives or
    /// the event channel closes (input surface exited).
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<ConsoleEvent>) -> anyhow::Result<()> {
        info!("ConsoleCore: starting event loop");
        loop {
            match event_rx.recv().await {
                None => {
                    info!("ConsoleCore: event channel closed, shutting down");
                    break;
                }
                Some(ConsoleEvent::Shutdown) => {
                    info!("ConsoleCore: shutdown requested");
                    break;
                }
                Some(ConsoleEvent::Command(cmd)) => {
                    debug!("ConsoleCore: command {:?}", cmd);
                    if let Err(e) = self.handle_command(cmd).await {
                        error!("ConsoleCore: command error: {}", e);
                    }
                }
                Some(ConsoleEvent::HeartbeatTick) => {
                    self.heartbeat_tick(now_ms());
                }
            }
        }
        self.heartbeat.stop();
        // A live envelope is left in place on exit: listeners ride it out
        // until the lease/TTL lapses, exactly as they would after a crash.
        Ok(())
    }

    // ── command handling ──────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: ConsoleCommand) -> anyhow::Result<()> {
        let now = now_ms();
        match cmd {
            ConsoleCommand::PlayIndex(index) => {
                self.play_index(index, "manual", now);
            }
            ConsoleCommand::Advance => {
                self.safe_advance("manual", now);
            }
            ConsoleCommand::Stop => {
                self.emergency_stop("manual", now);
            }
            ConsoleCommand::KillSwitch => {
                self.kill_switch("kill-switch", now);
            }
            ConsoleCommand::ToggleRandom => {
                let next = !self.store.state().random_mode;
                self.store.apply(
                    StatePatch {
                        random_mode: Some(next),
                        ..StatePatch::default()
                    },
                    "random-toggle",
                    now,
                );
                info!("random mode {}", if next { "on" } else { "off" });
            }
            ConsoleCommand::Shuffle => {
                if playlist::shuffle(&mut self.store, now) {
                    playlist::save(&self.store, self.shared.as_ref());
                }
            }
            ConsoleCommand::MoveUp(index) => {
                if playlist::move_up(&mut self.store, index, now) {
                    playlist::save(&self.store, self.shared.as_ref());
                }
            }
            ConsoleCommand::MoveDown(index) => {
                if playlist::move_down(&mut self.store, index, now) {
                    playlist::save(&self.store, self.shared.as_ref());
                }
            }
            ConsoleCommand::Delete(index) => {
                let (removed, was_live) = playlist::delete(&mut self.store, index, now);
                if removed {
                    playlist::save(&self.store, self.shared.as_ref());
                }
                if was_live {
                    // The live track is gone; the engine decides what
                    // follows.
                    self.safe_advance("delete-live", now);
                }
            }
            ConsoleCommand::AddUrl(url) => {
                if playlist::add_from_url(&mut self.store, &url, now).await {
                    playlist::save(&self.store, self.shared.as_ref());
                    info!("added {}", url);
                }
            }
            ConsoleCommand::Undo => {
                if self.store.can_operate() && self.store.undo_playlist(now) {
                    playlist::save(&self.store, self.shared.as_ref());
                    info!("playlist restored");
                }
            }
            ConsoleCommand::Import(path) => match playlist::import(&mut self.store, &path, now) {
                Ok(count) => {
                    playlist::save(&self.store, self.shared.as_ref());
                    info!("imported {} tracks from {}", count, path.display());
                }
                Err(e) => warn!("import failed: {}", e),
            },
            ConsoleCommand::Export(path) => match playlist::export(&self.store, &path) {
                Ok(()) => info!("exported playlist to {}", path.display()),
                Err(e) => warn!("export failed: {}", e),
            },
            ConsoleCommand::Reset => {
                if playlist::reset(&mut self.store, self.shared.as_ref(), &self.seed_path, now) {
                    info!("playlist reset to canonical seed");
                }
            }
            ConsoleCommand::List => self.print_playlist(),
            ConsoleCommand::Status => {
                self.sync_health(now);
                self.print_status(now);
            }
        }
        Ok(())
    }

    // ── playback transitions ──────────────────────────────────────────────────

    /// Start a specific track.  The transition lock is released on every
    /// exit path.
    pub fn play_index(&mut self, index: usize, reason: &str, now: i64) -> bool {
        if !self.store.can_advance() {
            return false;
        }
        if !self.store.begin("play-index", now) {
            return false;
        }
        let ok = self.play_index_locked(index, reason, now);
        self.store.end("play-index", now);
        ok
    }

    fn play_index_locked(&mut self, index: usize, reason: &str, now: i64) -> bool {
        if !self.store.select_index(index) {
            return false;
        }
        self.store.apply(
            StatePatch {
                started_at: Some(Some(now)),
                manual_play_issued: Some(reason == "manual"),
                ..StatePatch::default()
            },
            "play-start",
            now,
        );
        self.last_advance_at = 0;
        self.publish_live(now);
        self.start_heartbeat();
        if let Some(np) = &self.store.state().now_playing {
            info!("on air: {} — {} ({})", np.artist, np.title, reason);
        }
        true
    }

    /// Move to the next track (sequential wrap or uniform random), guarded
    /// by the advance cooldown.
    pub fn safe_advance(&mut self, reason: &str, now: i64) -> bool {
        if !self.store.can_advance() {
            return false;
        }
        if self.store.state().playlist.is_empty() {
            return false;
        }
        if now - self.last_advance_at < ADVANCE_COOLDOWN_MS {
            debug!("advance {:?} suppressed by cooldown", reason);
            return false;
        }
        if !self.store.begin("advance", now) {
            return false;
        }
        let ok = self.advance_locked(reason, now);
        self.store.end("advance", now);
        ok
    }

    fn advance_locked(&mut self, reason: &str, now: i64) -> bool {
        let len = self.store.state().playlist.len();
        let next = if self.store.state().random_mode {
            rand::thread_rng().gen_range(0..len)
        } else {
            let candidate = match self.store.state().current_index {
                Some(i) => i + 1,
                None => 0,
            };
            if candidate >= len {
                0
            } else {
                candidate
            }
        };

        if !self.store.select_index(next) {
            return false;
        }
        self.store.apply(
            StatePatch {
                started_at: Some(Some(now)),
                manual_play_issued: Some(false),
                last_advance_reason: Some(Some(reason.to_string())),
                ..StatePatch::default()
            },
            "advance-start",
            now,
        );
        self.last_advance_at = now;
        self.publish_live(now);
        self.start_heartbeat();
        if let Some(np) = &self.store.state().now_playing {
            info!("advance → {} — {} ({})", np.artist, np.title, reason);
        }
        true
    }

    /// Take the broadcast off air.  Always succeeds once the transition lock
    /// is acquired; publishes an explicit off-air envelope so listeners get
    /// a positive signal instead of waiting out the TTL.
    pub fn emergency_stop(&mut self, reason: &str, now: i64) -> bool {
        if !self.store.begin("emergency", now) {
            return false;
        }
        self.store.apply(
            StatePatch {
                started_at: Some(None),
                now_playing: Some(None),
                current_index: Some(None),
                current_track_id: Some(None),
                manual_play_issued: Some(false),
                ..StatePatch::default()
            },
            "stop",
            now,
        );
        self.publish_offair(now);
        if let Err(e) = self.shared.remove(SNAPSHOT_KEY) {
            debug!("snapshot clear failed: {}", e);
        }
        self.heartbeat.stop();
        self.store.end("emergency", now);
        info!("off air ({})", reason);
        true
    }

    /// Operator kill switch — an emergency stop that refuses to interrupt an
    /// in-flight transition.
    pub fn kill_switch(&mut self, reason: &str, now: i64) -> bool {
        if !self.store.can_operate() || self.store.state().finishing {
            return false;
        }
        let ok = self.emergency_stop(reason, now);
        if ok {
            warn!("kill switch activated: {}", reason);
        }
        ok
    }

    // ── heartbeat ─────────────────────────────────────────────────────────────

    fn start_heartbeat(&mut self) {
        if self.store.state().started_at.is_none() {
            return;
        }
        let tx = self.event_tx.clone();
        self.heartbeat
            .start(Duration::from_millis(HEARTBEAT_MS), move || {
                !matches!(
                    tx.try_send(ConsoleEvent::HeartbeatTick),
                    Err(mpsc::error::TrySendError::Closed(_))
                )
            });
    }

    /// One heartbeat: keep `updatedAt`/`leaseUntil` fresh for listeners and
    /// fire duration-based auto-advance.  No other playback decisions live
    /// here.
    pub fn heartbeat_tick(&mut self, now: i64) {
        if !self.store.can_operate() || self.store.state().started_at.is_none() {
            self.heartbeat.stop();
            return;
        }

        if self.lease.due_for_renewal(now) {
            self.lease.renew(now);
        } else if self.lease.current().is_none() {
            self.lease.acquire(now);
        }
        self.sync_health(now);

        if self.store.state().finishing {
            return;
        }

        let elapsed_past_duration = match (&self.store.state().started_at, &self.store.state().now_playing) {
            (Some(started), Some(np)) => now - started >= np.duration_ms,
            _ => return,
        };

        if elapsed_past_duration {
            self.safe_advance("auto-end", now);
        } else {
            self.publish_live(now);
        }
    }

    // ── publication ───────────────────────────────────────────────────────────

    fn can_publish(&self, now: i64) -> bool {
        if self.lease.has_lease(now) || self.lease.acquire(now) {
            return true;
        }
        warn!("publish blocked: another console holds the writer lease");
        false
    }

    fn publish_live(&mut self, now: i64) {
        let state = self.store.state();
        let (Some(started_at), Some(np)) = (state.started_at, state.now_playing.as_ref()) else {
            return;
        };
        if !self.can_publish(now) {
            return;
        }
        let envelope = Envelope {
            version: PROTOCOL_VERSION,
            status: BroadcastStatus::Live {
                track_id: np.track_id.clone(),
                url: np.source_url.clone(),
                started_at,
                duration: np.duration_secs,
                meta: TrackMeta {
                    title: np.title.clone(),
                    artist: np.artist.clone(),
                    contributor: np.contributor.clone(),
                    artwork: np.artwork.clone(),
                },
            },
            owner: self.lease.id().to_string(),
            lease_until: now + LEASE_MS,
            updated_at: now,
        };
        write_json(self.shared.as_ref(), BROADCAST_KEY, &envelope);
        write_json(
            self.shared.as_ref(),
            SNAPSHOT_KEY,
            &Snapshot {
                saved_at: now,
                state: envelope,
            },
        );
    }

    fn publish_offair(&mut self, now: i64) {
        if !self.can_publish(now) {
            return;
        }
        let envelope = Envelope {
            version: PROTOCOL_VERSION,
            status: BroadcastStatus::Offair,
            owner: self.lease.id().to_string(),
            lease_until: now + LEASE_MS,
            updated_at: now,
        };
        write_json(self.shared.as_ref(), BROADCAST_KEY, &envelope);
    }

    // ── boot rehydration ──────────────────────────────────────────────────────

    /// Re-adopt a still-valid live broadcast after a console restart.  When
    /// the envelope's track has already run out, advance instead of resuming
    /// a finished track.
    fn rehydrate(&mut self, now: i64) {
        let Some(envelope) = self.shared.get(BROADCAST_KEY).as_deref().and_then(Envelope::parse)
        else {
            return;
        };
        if !envelope.is_valid(now) || !envelope.is_live() {
            return;
        }
        let BroadcastStatus::Live {
            track_id,
            started_at,
            ..
        } = &envelope.status
        else {
            return;
        };

        let Some(index) = self
            .store
            .state()
            .playlist
            .iter()
            .position(|t| &t.id == track_id)
        else {
            debug!("rehydrate: broadcast track {} not in playlist", track_id);
            return;
        };
        if !self.store.select_index(index) {
            return;
        }
        let started_at = *started_at;
        self.store.apply(
            StatePatch {
                started_at: Some(Some(started_at)),
                ..StatePatch::default()
            },
            "rehydrate",
            now,
        );
        info!("rehydrated live broadcast: track {}", track_id);

        let finished = self
            .store
            .state()
            .now_playing
            .as_ref()
            .is_some_and(|np| now - started_at >= np.duration_ms);
        if finished {
            self.safe_advance("rehydrate-catchup", now);
        } else {
            self.start_heartbeat();
        }
    }

    // ── health ────────────────────────────────────────────────────────────────

    fn sync_health(&mut self, now: i64) {
        let health = match self.lease.current() {
            None => Health {
                status: HealthStatus::Lost,
                ..Health::default()
            },
            Some(rec) => Health {
                status: if rec.lease_until < now {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Ok
                },
                owner: Some(rec.owner),
                lease_until: Some(rec.lease_until),
                last_heartbeat_at: Some(rec.heartbeat_at),
            },
        };
        if self.store.state().health != health {
            self.store.apply(
                StatePatch {
                    health: Some(health),
                    ..StatePatch::default()
                },
                "health-sync",
                now,
            );
        }
    }

    // ── status output (operator surface) ──────────────────────────────────────

    fn print_playlist(&self) {
        let state = self.store.state();
        if state.playlist.is_empty() {
            println!("(playlist empty)");
            return;
        }
        for (i, track) in state.playlist.iter().enumerate() {
            let live = state.current_index == Some(i);
            println!(
                "{} {:>3}  {} — {}",
                if live { "▶" } else { " " },
                i,
                track.artist.name,
                track.title,
            );
        }
    }

    fn print_status(&self, now: i64) {
        let state = self.store.state();
        let phase = if state.started_at.is_some() { "ON AIR" } else { "OFF AIR" };
        let elapsed = state
            .started_at
            .map(|s| (now - s) / 1000)
            .unwrap_or(0);
        println!(
            "{} | elapsed {}:{:02} | random {} | lease {} | health {}",
            phase,
            elapsed / 60,
            elapsed % 60,
            if state.random_mode { "on" } else { "off" },
            if self.lease.has_lease(now) { "held" } else { "—" },
            state.health.status.label(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onair_proto::store::MemStore;
    use onair_proto::track::{normalize_track, RawTrack};

    fn seeded_core(track_specs: &[(&str, Option<f64>)]) -> ConsoleCore {
        let shared: Arc<dyn SharedStore> = Arc::new(MemStore::new());
        let (tx, _rx) = mpsc::channel(16);
        let mut core = ConsoleCore::new(shared, PathBuf::from("/nonexistent/seed.json"), tx);
        core.store.init_session("console-test", 1_000);
        let tracks: Vec<_> = track_specs
            .iter()
            .map(|(id, duration)| {
                normalize_track(RawTrack {
                    id: Some(id.to_string()),
                    title: Some(id.to_string()),
                    url: Some(format!("https://example.com/{}", id)),
                    duration: *duration,
                    ..RawTrack::default()
                })
                .unwrap()
            })
            .collect();
        core.store.apply(
            StatePatch {
                playlist: Some(tracks),
                ..StatePatch::default()
            },
            "playlist-load-local",
            1_500,
        );
        core
    }

    fn published_envelope(core: &ConsoleCore) -> Option<Envelope> {
        core.shared
            .get(BROADCAST_KEY)
            .as_deref()
            .and_then(Envelope::parse)
    }

    #[tokio::test]
    async fn play_index_goes_live_and_publishes() {
        let mut core = seeded_core(&[("a", Some(120.0)), ("b", None)]);
        let now = 10_000;
        assert!(core.play_index(0, "manual", now));

        let state = core.store.state();
        assert_eq!(state.current_index, Some(0));
        assert_eq!(state.started_at, Some(now));
        assert!(state.manual_play_issued);
        assert!(!state.finishing, "lock released after transition");

        let envelope = published_envelope(&core).expect("envelope published");
        assert!(envelope.is_live());
        assert_eq!(envelope.track_identity().unwrap().1, now);
        assert_eq!(envelope.duration_secs(), Some(120.0));

        // Snapshot written alongside every live publish.
        assert!(core.shared.get(SNAPSHOT_KEY).is_some());
    }

    #[tokio::test]
    async fn unknown_duration_gets_one_hour_fallback() {
        let mut core = seeded_core(&[("a", None)]);
        assert!(core.play_index(0, "manual", 10_000));
        let np = core.store.state().now_playing.clone().unwrap();
        assert_eq!(np.duration_ms, crate::state::FALLBACK_DURATION_MS);
        // The wire duration stays unknown — the fallback is engine-internal.
        assert_eq!(published_envelope(&core).unwrap().duration_secs(), None);
    }

    #[tokio::test]
    async fn play_index_refused_while_finishing() {
        let mut core = seeded_core(&[("a", None), ("b", None)]);
        assert!(core.play_index(0, "manual", 10_000));
        let before = core.store.state().started_at;

        assert!(core.store.begin("advance", 11_000));
        assert!(!core.play_index(1, "manual", 11_100));
        assert_eq!(core.store.state().current_index, Some(0));
        assert_eq!(core.store.state().started_at, before);
        core.store.end("advance", 11_200);
    }

    #[tokio::test]
    async fn advance_wraps_sequentially() {
        let mut core = seeded_core(&[("a", None), ("b", None), ("c", None)]);
        let mut now = 10_000;
        assert!(core.play_index(2, "manual", now));
        now += 2_000;
        assert!(core.safe_advance("manual", now));
        assert_eq!(core.store.state().current_index, Some(0), "wraps past the end");
    }

    #[tokio::test]
    async fn advance_starts_at_zero_without_current() {
        let mut core = seeded_core(&[("a", None), ("b", None)]);
        assert!(core.safe_advance("manual", 10_000));
        assert_eq!(core.store.state().current_index, Some(0));
    }

    #[tokio::test]
    async fn advance_cooldown_suppresses_duplicates() {
        let mut core = seeded_core(&[("a", None), ("b", None), ("c", None)]);
        let now = 10_000;
        assert!(core.safe_advance("manual", now));
        let started = core.store.state().started_at;
        let envelope = published_envelope(&core);

        // Second trigger inside the window: no state change, no publish.
        assert!(!core.safe_advance("manual", now + 900));
        assert_eq!(core.store.state().started_at, started);
        assert_eq!(published_envelope(&core), envelope);

        // Past the window it works again.
        assert!(core.safe_advance("manual", now + ADVANCE_COOLDOWN_MS));
    }

    #[tokio::test]
    async fn random_mode_stays_in_bounds() {
        let mut core = seeded_core(&[("a", None), ("b", None), ("c", None)]);
        core.store.apply(
            StatePatch {
                random_mode: Some(true),
                ..StatePatch::default()
            },
            "random-toggle",
            9_000,
        );
        let mut now = 10_000;
        for _ in 0..20 {
            assert!(core.safe_advance("manual", now));
            let idx = core.store.state().current_index.unwrap();
            assert!(idx < 3);
            now += ADVANCE_COOLDOWN_MS + 100;
        }
    }

    #[tokio::test]
    async fn emergency_stop_is_idempotent() {
        let mut core = seeded_core(&[("a", None)]);
        assert!(core.play_index(0, "manual", 10_000));
        assert!(core.emergency_stop("manual", 12_000));

        let state_once = core.store.snapshot();
        assert!(state_once.started_at.is_none());
        assert!(state_once.current_index.is_none());
        assert!(state_once.now_playing.is_none());
        assert!(published_envelope(&core).unwrap().status == BroadcastStatus::Offair);
        assert!(core.shared.get(SNAPSHOT_KEY).is_none(), "snapshot cleared");

        assert!(core.emergency_stop("manual", 13_000));
        let state_twice = core.store.state();
        assert!(state_twice.started_at.is_none());
        assert!(state_twice.current_index.is_none());
        assert!(published_envelope(&core).unwrap().status == BroadcastStatus::Offair);
    }

    #[tokio::test]
    async fn heartbeat_auto_advances_past_duration() {
        let mut core = seeded_core(&[("a", Some(2.0)), ("b", Some(2.0))]);
        let now = 10_000;
        assert!(core.play_index(0, "manual", now));

        // Mid-track: tick refreshes the envelope, no advance.
        core.heartbeat_tick(now + 1_000);
        assert_eq!(core.store.state().current_index, Some(0));
        assert_eq!(published_envelope(&core).unwrap().updated_at, now + 1_000);

        // Past duration: tick advances.
        core.heartbeat_tick(now + 2_500);
        assert_eq!(core.store.state().current_index, Some(1));
        assert_eq!(core.store.state().last_advance_reason.as_deref(), Some("auto-end"));
    }

    #[tokio::test]
    async fn publish_blocked_without_lease() {
        let shared: Arc<dyn SharedStore> = Arc::new(MemStore::new());
        let foreign = LeaseManager::new(shared.clone());
        assert!(foreign.acquire(9_000));

        let (tx, _rx) = mpsc::channel(16);
        let mut core = ConsoleCore::new(shared.clone(), PathBuf::from("/nonexistent"), tx);
        core.store.init_session("console-test", 9_500);
        core.store.apply(
            StatePatch {
                playlist: Some(vec![normalize_track(RawTrack {
                    id: Some("a".into()),
                    url: Some("https://example.com/a".into()),
                    ..RawTrack::default()
                })
                .unwrap()]),
                ..StatePatch::default()
            },
            "playlist-load-local",
            9_600,
        );

        // Local state still transitions, but nothing reaches the wire while
        // the foreign lease is live.
        assert!(core.play_index(0, "manual", 10_000));
        assert!(shared.get(BROADCAST_KEY).is_none());

        // After the foreign lease lapses the next heartbeat reclaims and
        // publishes.
        let later = 10_000 + LEASE_MS + 1_000;
        core.heartbeat_tick(later);
        assert!(published_envelope(&core).is_some());
    }

    #[tokio::test]
    async fn rehydrate_adopts_valid_live_broadcast() {
        let mut first = seeded_core(&[("a", Some(300.0)), ("b", Some(300.0))]);
        assert!(first.play_index(1, "manual", 10_000));
        let playlist = first.store.state().playlist.clone();

        // Fresh console instance over the same medium, same playlist.
        let (tx, _rx) = mpsc::channel(16);
        let mut second = ConsoleCore::new(first.shared.clone(), PathBuf::from("/nonexistent"), tx);
        second.store.init_session("console-second", 11_000);
        second.store.apply(
            StatePatch {
                playlist: Some(playlist),
                ..StatePatch::default()
            },
            "playlist-load-local",
            11_100,
        );
        second.rehydrate(12_000);

        assert_eq!(second.store.state().current_index, Some(1));
        assert_eq!(second.store.state().started_at, Some(10_000));
    }
}
