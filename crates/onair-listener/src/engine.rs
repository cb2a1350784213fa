//! SyncEngine — reconstructs "what should be playing right now" from a
//! possibly-stale, possibly-absent, possibly-malformed shared record, with
//! zero ability to push corrections upstream.
//!
//! Single-owner event loop: sync polls, watchdog ticks, storage wakes,
//! widget lifecycle events and user intents all funnel through one channel.
//! The engine owns the channel state and the transport exclusively.
//!
//! Every failure path lands in `offair` or retries quietly in `syncing`;
//! there is no error phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use onair_proto::envelope::{
    BroadcastStatus, Envelope, Snapshot, BROADCAST_KEY, BROADCAST_TTL_MS, SNAPSHOT_KEY,
};
use onair_proto::platform::now_ms;
use onair_proto::store::SharedStore;
use onair_proto::timer::TimerHandle;

use crate::drift::{self, DriftAction};
use crate::presence::Presence;
use crate::widget::{AudioWidget, WidgetEvent};

// ── sync cadences ─────────────────────────────────────────────────────────────

/// Poll cadence right after boot or a storage wake.
pub const SYNC_FAST_MS: u64 = 700;
/// Poll cadence while live or syncing.
pub const SYNC_LIVE_MS: u64 = 1_000;
/// Poll cadence while off air.
pub const SYNC_IDLE_MS: u64 = 1_800;

// ── off-air / grace ───────────────────────────────────────────────────────────

/// Recent-audio window that keeps a live phase alive through noisy signals.
pub const LIVE_GRACE_MS: i64 = 5_000;
/// Anti-flap lock applied on every off-air entry.
pub const OFFAIR_LOCK_MS: i64 = 3_000;

// ── watchdog ──────────────────────────────────────────────────────────────────

pub const WATCHDOG_INTERVAL_MS: u64 = 15_000;
/// No audio progress for this long counts as a stall.
pub const WATCHDOG_STALL_MS: i64 = 20_000;
pub const WATCHDOG_MAX_RESTARTS: u32 = 3;
pub const WATCHDOG_BACKOFF_BASE_MS: i64 = 4_000;
pub const WATCHDOG_BACKOFF_MAX_MS: i64 = 30_000;

// ── phases ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerPhase {
    Offair,
    Syncing,
    Live,
}

impl ListenerPhase {
    pub fn label(&self) -> &'static str {
        match self {
            ListenerPhase::Offair => "OFF AIR",
            ListenerPhase::Syncing => "SYNCING",
            ListenerPhase::Live => "LIVE",
        }
    }
}

/// Widget mount sub-machine.  Readiness of the transport alone is not proof
/// of live audio — only a position sample that actually advances confirms
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Idle,
    Mounting,
    Confirming,
    Live,
}

// ── events / updates ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum UserIntent {
    ToggleMute,
    ConfirmGesture,
}

/// All inputs into the SyncEngine loop.
#[derive(Debug)]
pub enum ListenerEvent {
    SyncTick,
    WatchdogTick,
    /// A key changed on the shared medium (best-effort signal).
    StoreChanged(String),
    Widget(WidgetEvent),
    Intent(UserIntent),
    Shutdown,
}

/// Typed updates for the UI reflector.  Render-only; the reflector never
/// decides state.
#[derive(Debug, Clone)]
pub enum ListenerUpdate {
    Phase(ListenerPhase),
    NowPlaying {
        title: Option<String>,
        artist: Option<String>,
        contributor: Option<String>,
        artwork: Option<String>,
    },
    Notice(&'static str),
}

// ── channel state ─────────────────────────────────────────────────────────────

/// The listener's private reconstruction of distributed truth.  None of this
/// is shared.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub phase: ListenerPhase,

    pub url: Option<String>,
    pub started_at: Option<i64>,
    pub duration_secs: Option<f64>,

    pub title: Option<String>,
    pub artist: Option<String>,
    pub contributor: Option<String>,
    pub artwork: Option<String>,

    pub active_owner: Option<String>,

    pub last_broadcast_seen_at: i64,
    pub last_live_at: i64,
    pub last_audio_at: i64,

    pub watchdog_restarts: u32,
    pub watchdog_cooldown_until: i64,
    /// Track identity the watchdog gave up on; never remounted.
    pub watchdog_failed_identity: Option<(String, i64)>,

    pub user_intent_muted: bool,
    pub audio_muted: bool,
    pub awaiting_user_resume: bool,
    pub user_gesture_confirmed: bool,

    /// Anti-flap lockout: off-air logic is suppressed until this instant.
    pub force_off_air_until: i64,

    pub last_transition_reason: &'static str,
}

impl ChannelState {
    fn initial(gesture_confirmed: bool) -> Self {
        Self {
            phase: ListenerPhase::Offair,
            url: None,
            started_at: None,
            duration_secs: None,
            title: None,
            artist: None,
            contributor: None,
            artwork: None,
            active_owner: None,
            last_broadcast_seen_at: 0,
            last_live_at: 0,
            last_audio_at: 0,
            watchdog_restarts: 0,
            watchdog_cooldown_until: 0,
            watchdog_failed_identity: None,
            user_intent_muted: false,
            audio_muted: true,
            awaiting_user_resume: false,
            user_gesture_confirmed: gesture_confirmed,
            force_off_air_until: 0,
            last_transition_reason: "boot-offair",
        }
    }
}

// ── engine ────────────────────────────────────────────────────────────────────

pub struct SyncEngine {
    shared: Arc<dyn SharedStore>,
    widget: Box<dyn AudioWidget>,
    state: ChannelState,
    mount: MountState,
    presence: Presence,
    sync_timer: TimerHandle,
    watchdog_timer: TimerHandle,
    sync_cadence_ms: u64,
    event_tx: mpsc::Sender<ListenerEvent>,
    updates: broadcast::Sender<ListenerUpdate>,
    volume: f32,
}

impl SyncEngine {
    pub fn new(
        shared: Arc<dyn SharedStore>,
        widget: Box<dyn AudioWidget>,
        event_tx: mpsc::Sender<ListenerEvent>,
        volume: f32,
        assume_gesture: bool,
    ) -> Self {
        let presence = Presence::new(shared.clone());
        let (updates, _) = broadcast::channel(64);
        Self {
            shared,
            widget,
            state: ChannelState::initial(assume_gesture),
            mount: MountState::Idle,
            presence,
            sync_timer: TimerHandle::new("listener-sync"),
            watchdog_timer: TimerHandle::new("listener-watchdog"),
            sync_cadence_ms: 0,
            event_tx,
            updates,
            volume,
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn mount_state(&self) -> MountState {
        self.mount
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListenerUpdate> {
        self.updates.subscribe()
    }

    /// Cold boot: pre-fill the display from the advisory snapshot (never
    /// starts audio) and begin polling.
    pub fn boot(&mut self, now: i64) {
        self.prefill_from_snapshot();
        self.restart_sync(SYNC_FAST_MS);
        debug!("listener boot at {} (client {})", now, self.presence.client_id());
    }

    /// Run the engine event loop until shutdown.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<ListenerEvent>) -> anyhow::Result<()> {
        info!("SyncEngine: starting event loop");
        self.boot(now_ms());
        loop {
            match event_rx.recv().await {
                None => break,
                Some(ListenerEvent::Shutdown) => break,
                Some(ListenerEvent::SyncTick) => self.sync_tick(now_ms()),
                Some(ListenerEvent::WatchdogTick) => self.watchdog_tick(now_ms()),
                Some(ListenerEvent::StoreChanged(key)) => self.on_store_changed(&key, now_ms()),
                Some(ListenerEvent::Widget(event)) => self.on_widget_event(event, now_ms()),
                Some(ListenerEvent::Intent(UserIntent::ToggleMute)) => self.toggle_mute(now_ms()),
                Some(ListenerEvent::Intent(UserIntent::ConfirmGesture)) => {
                    self.confirm_gesture(now_ms())
                }
            }
        }
        info!("SyncEngine: shutting down");
        self.sync_timer.stop();
        self.watchdog_timer.stop();
        Ok(())
    }

    // ── sync tick ─────────────────────────────────────────────────────────────

    /// One level-triggered pass over the canonical envelope.  Decides the
    /// phase from what the key currently holds, never from individual
    /// writes.
    pub fn sync_tick(&mut self, now: i64) {
        let raw = self.shared.get(BROADCAST_KEY);
        let parsed = raw.as_deref().and_then(Envelope::parse);
        let envelope = parsed.as_ref().filter(|e| e.is_valid(now));

        if envelope.is_some_and(|e| e.is_live()) {
            self.state.last_broadcast_seen_at = now;
        }

        if self.state.phase == ListenerPhase::Live
            && now - self.state.last_audio_at < BROADCAST_TTL_MS
        {
            self.presence.tick(now);
        }

        let Some(envelope) = envelope else {
            // Live audio running: tolerate brief gaps in the medium (a
            // missed poll or a write race is not an outage).
            if self.mount != MountState::Idle
                && self.state.phase == ListenerPhase::Live
                && now - self.state.last_audio_at < BROADCAST_TTL_MS
                && now - self.state.last_broadcast_seen_at < BROADCAST_TTL_MS
            {
                return;
            }
            // Cold boot with a snapshot adopted moments ago: give the
            // canonical envelope a window to appear before declaring the
            // silence real.
            if self.mount == MountState::Idle
                && self
                    .state
                    .started_at
                    .is_some_and(|s| now - s < BROADCAST_TTL_MS)
            {
                return;
            }
            if self.state.phase == ListenerPhase::Offair {
                self.restart_sync(SYNC_IDLE_MS);
                return;
            }
            let reason = match parsed.as_ref() {
                Some(e) if now > e.lease_until => "lease-expired",
                Some(_) => "invalid-broadcast",
                None => "no-broadcast",
            };
            self.guarded_off_air(now, reason);
            return;
        };

        // Writer silence — independent of the lease.
        if now - envelope.updated_at > BROADCAST_TTL_MS * 2 {
            self.state.active_owner = None;
            self.guarded_off_air(now, "writer-silent");
            return;
        }

        // Writer handoff tracking.
        match &self.state.active_owner {
            None => self.state.active_owner = Some(envelope.owner.clone()),
            Some(current) if *current != envelope.owner => {
                info!("writer handoff {} → {}", current, envelope.owner);
                self.state.active_owner = Some(envelope.owner.clone());
            }
            _ => {}
        }

        match &envelope.status {
            BroadcastStatus::Offair => self.off_air_from_writer(now),
            BroadcastStatus::Transition => self.set_phase(ListenerPhase::Syncing, now),
            BroadcastStatus::Live {
                url, started_at, ..
            } => {
                let same_track = self.state.url.as_deref() == Some(url.as_str())
                    && self.state.started_at == Some(*started_at);
                if self.mount == MountState::Idle || !same_track {
                    self.load_track(envelope, now);
                    return;
                }
                if self.mount == MountState::Confirming {
                    self.confirm_audio(now);
                }
                self.refresh_metadata(envelope);
                self.check_drift(now);
            }
        }
    }

    fn on_store_changed(&mut self, key: &str, now: i64) {
        if key != BROADCAST_KEY {
            return;
        }
        self.state.last_broadcast_seen_at = now;
        if self.state.phase == ListenerPhase::Offair {
            // Immediate reaction to a writer publish, then fast polling
            // until the phase settles.
            self.restart_sync(SYNC_FAST_MS);
            self.sync_tick(now);
        }
    }

    // ── mounting ──────────────────────────────────────────────────────────────

    /// Mount the transport for a (new) live track.  No autoplay: audio
    /// starts only once the widget reports ready and the gesture rules
    /// allow it.
    fn load_track(&mut self, envelope: &Envelope, now: i64) {
        let BroadcastStatus::Live {
            url,
            started_at,
            duration,
            meta,
            ..
        } = &envelope.status
        else {
            return;
        };

        if now < self.state.force_off_air_until {
            return;
        }
        if self
            .state
            .watchdog_failed_identity
            .as_ref()
            .is_some_and(|(failed_url, failed_start)| {
                failed_url == url && *failed_start == *started_at
            })
        {
            // The watchdog already gave up on this exact track; wait for the
            // writer to move on.
            return;
        }

        self.watchdog_timer.stop();
        self.state.watchdog_restarts = 0;
        self.state.watchdog_cooldown_until = 0;
        self.state.last_audio_at = 0;

        self.mount = MountState::Mounting;
        self.state.url = Some(url.clone());
        self.state.started_at = Some(*started_at);
        self.state.duration_secs = *duration;
        self.state.title = Some(meta.title.clone());
        self.state.artist = Some(meta.artist.clone());
        self.state.contributor = meta.contributor.clone();
        self.state.artwork = meta.artwork.clone();
        self.state.last_transition_reason = "mount-track";

        self.set_phase(ListenerPhase::Syncing, now);
        self.emit_now_playing();
        let url = url.clone();
        self.widget.load(&url);
        self.restart_sync(SYNC_LIVE_MS);
    }

    pub fn on_widget_event(&mut self, event: WidgetEvent, now: i64) {
        match event {
            WidgetEvent::Ready => {
                if self.mount == MountState::Mounting {
                    self.mount = MountState::Confirming;
                }
                if self.state.user_intent_muted {
                    self.widget.set_volume(0.0);
                    return;
                }
                if self.state.user_gesture_confirmed {
                    self.widget.set_volume(self.volume);
                    self.widget.play();
                } else {
                    self.state.awaiting_user_resume = true;
                    let _ = self.updates.send(ListenerUpdate::Notice("tap to listen"));
                }
            }
            WidgetEvent::PlayStarted => {
                if let Some(started) = self.state.started_at {
                    let offset = drift::expected_position_ms(now, started);
                    self.widget.seek_to(offset);
                }
                let volume = if self.state.user_intent_muted { 0.0 } else { self.volume };
                self.widget.set_volume(volume);
                self.state.last_audio_at = now;
                self.state.awaiting_user_resume = false;
                self.confirm_audio(now);
            }
            WidgetEvent::Finished => {
                // Content running out is only a failure when the broadcast
                // is stale too; otherwise the writer is about to advance.
                if now - self.state.last_broadcast_seen_at > BROADCAST_TTL_MS {
                    self.finalize_off_air(now, "audio-ended-stale");
                }
            }
        }
    }

    /// Promote to live once there is proof of audio: a position sample that
    /// actually moved past zero.
    fn confirm_audio(&mut self, now: i64) {
        let Some(position) = self.widget.position_ms() else {
            return;
        };
        if position <= 0 {
            return;
        }
        self.state.last_audio_at = now;
        self.state.last_live_at = now;
        self.state.audio_muted = false;
        self.state.awaiting_user_resume = false;
        self.state.watchdog_restarts = 0;
        self.state.watchdog_cooldown_until = 0;
        self.state.watchdog_failed_identity = None;
        self.mount = MountState::Live;
        self.state.last_transition_reason = "audio-confirmed";
        self.set_phase(ListenerPhase::Live, now);
        self.start_watchdog();
        self.presence.on_audio_confirmed(now);
        self.restart_sync(SYNC_LIVE_MS);
    }

    // ── drift ─────────────────────────────────────────────────────────────────

    fn check_drift(&mut self, now: i64) {
        if self.mount != MountState::Live {
            return;
        }
        let Some(started) = self.state.started_at else {
            return;
        };
        let Some(position) = self.widget.position_ms() else {
            return;
        };
        let expected = drift::expected_position_ms(now, started);
        match drift::decide(expected, position) {
            DriftAction::InTolerance => {
                self.state.last_audio_at = now;
            }
            DriftAction::SoftNudge { to_ms } => {
                self.widget.seek_to(to_ms);
                self.state.last_audio_at = now;
                self.state.last_transition_reason = "soft-drift-correct";
            }
            DriftAction::HardSeek { to_ms } => {
                self.widget.seek_to(to_ms);
                self.state.last_audio_at = now;
                self.state.last_transition_reason = "hard-drift-correct";
            }
            DriftAction::ClockSkew => {
                warn!(
                    "clock skew: expected {}ms, transport at {}ms",
                    expected, position
                );
                self.state.last_transition_reason = "clock-skew";
                self.guarded_off_air(now, "clock-skew");
            }
        }
    }

    // ── watchdog ──────────────────────────────────────────────────────────────

    fn start_watchdog(&mut self) {
        let tx = self.event_tx.clone();
        self.watchdog_timer
            .start(Duration::from_millis(WATCHDOG_INTERVAL_MS), move || {
                !matches!(
                    tx.try_send(ListenerEvent::WatchdogTick),
                    Err(mpsc::error::TrySendError::Closed(_))
                )
            });
    }

    /// Stall detection with bounded, backed-off recovery.  Gives up
    /// deterministically after [`WATCHDOG_MAX_RESTARTS`] rather than looping
    /// forever.
    pub fn watchdog_tick(&mut self, now: i64) {
        if self.state.phase != ListenerPhase::Live {
            return;
        }
        if !self.state.user_gesture_confirmed || self.state.user_intent_muted {
            return;
        }
        if now < self.state.watchdog_cooldown_until {
            return;
        }

        let silence = now - self.state.last_audio_at;
        if silence <= WATCHDOG_STALL_MS || now - self.state.last_live_at < LIVE_GRACE_MS {
            return;
        }

        self.state.watchdog_restarts += 1;
        let backoff = (WATCHDOG_BACKOFF_BASE_MS * i64::from(self.state.watchdog_restarts))
            .min(WATCHDOG_BACKOFF_MAX_MS);
        self.state.watchdog_cooldown_until = now + backoff;

        warn!(
            "watchdog: stall #{} ({}ms silent), backoff {}ms",
            self.state.watchdog_restarts, silence, backoff
        );

        // Silence before deciding — no pause, the transport may still
        // recover underneath.
        self.widget.set_volume(0.0);
        self.state.audio_muted = true;

        if self.state.watchdog_restarts >= WATCHDOG_MAX_RESTARTS {
            self.state.watchdog_failed_identity =
                self.state.url.clone().zip(self.state.started_at);
            self.watchdog_timer.stop();
            self.state.last_transition_reason = "watchdog-stall-max";
            self.finalize_off_air(now, "watchdog-stall-max");
            return;
        }

        self.guarded_off_air(now, "watchdog-stall");
    }

    // ── off air ───────────────────────────────────────────────────────────────

    /// Layered short-circuits answering "is there a legitimate reason to
    /// believe we're still live despite this trigger?".  The underlying
    /// medium is noisy; a naive no-envelope-this-tick ⇒ off-air rule would
    /// flap constantly.
    pub fn guarded_off_air(&mut self, now: i64, reason: &'static str) {
        // Explicit user intent outranks inferred signal loss.
        if self.state.user_intent_muted {
            return;
        }
        // Anti-flap lock still active.
        if now < self.state.force_off_air_until {
            return;
        }
        // Re-read: a genuinely live signal plus recent audio.
        let live_now = self
            .shared
            .get(BROADCAST_KEY)
            .as_deref()
            .and_then(Envelope::parse)
            .is_some_and(|e| e.is_valid(now) && e.is_live());
        if live_now && now - self.state.last_audio_at < LIVE_GRACE_MS {
            return;
        }
        // Transport still mid-mount.
        if self.mount == MountState::Mounting {
            return;
        }
        // Already resyncing.
        if self.state.phase == ListenerPhase::Syncing {
            return;
        }
        // Grace window after the last confirmed-live instant.
        if self.state.phase == ListenerPhase::Live
            && self.mount == MountState::Live
            && now - self.state.last_live_at < LIVE_GRACE_MS
        {
            return;
        }
        // The user interacted but is muted or awaiting a resume gesture.
        if self.state.user_gesture_confirmed
            && (self.state.audio_muted || self.state.awaiting_user_resume)
        {
            return;
        }
        // Broadcast and audio both seen recently — a momentary absence.
        if now - self.state.last_broadcast_seen_at < BROADCAST_TTL_MS
            && now - self.state.last_audio_at < BROADCAST_TTL_MS
        {
            return;
        }

        self.finalize_off_air(now, reason);
    }

    /// Positive off-air signal from the writer.  Skips the liveness guards —
    /// the writer said so — but still honors the anti-flap lock.
    fn off_air_from_writer(&mut self, now: i64) {
        if self.state.phase == ListenerPhase::Offair {
            self.restart_sync(SYNC_IDLE_MS);
            return;
        }
        if now < self.state.force_off_air_until {
            return;
        }
        self.finalize_off_air(now, "admin-offair");
    }

    fn finalize_off_air(&mut self, now: i64, reason: &'static str) {
        if self.state.phase == ListenerPhase::Offair {
            return;
        }
        info!("off air: {}", reason);

        self.state.force_off_air_until = now + OFFAIR_LOCK_MS;
        self.watchdog_timer.stop();
        self.state.watchdog_restarts = 0;
        self.state.watchdog_cooldown_until = 0;

        self.widget.pause();
        self.widget.set_volume(0.0);
        self.mount = MountState::Idle;

        self.state.url = None;
        self.state.started_at = None;
        self.state.duration_secs = None;
        self.state.awaiting_user_resume = false;
        self.state.audio_muted = true;
        self.state.active_owner = None;
        self.state.last_transition_reason = reason;

        self.presence.on_off_air(now);
        self.set_phase(ListenerPhase::Offair, now);
        self.restart_sync(SYNC_IDLE_MS);
    }

    // ── user intent ───────────────────────────────────────────────────────────

    pub fn toggle_mute(&mut self, _now: i64) {
        self.state.user_intent_muted = !self.state.user_intent_muted;
        if self.state.user_intent_muted {
            self.widget.set_volume(0.0);
            self.state.audio_muted = true;
            let _ = self.updates.send(ListenerUpdate::Notice("muted"));
        } else {
            self.state.audio_muted = false;
            self.widget.set_volume(self.volume);
            if self.state.user_gesture_confirmed && self.mount != MountState::Idle {
                self.widget.play();
            }
            let _ = self.updates.send(ListenerUpdate::Notice("unmuted"));
        }
    }

    pub fn confirm_gesture(&mut self, _now: i64) {
        if self.state.user_gesture_confirmed {
            return;
        }
        self.state.user_gesture_confirmed = true;
        if self.mount != MountState::Idle && !self.state.user_intent_muted {
            self.widget.set_volume(self.volume);
            self.widget.play();
        }
    }

    // ── snapshot cold boot ────────────────────────────────────────────────────

    /// Pre-fill the display from the advisory snapshot.  Display-only: the
    /// transport stays unmounted until the canonical envelope is
    /// independently validated as live.
    fn prefill_from_snapshot(&mut self) {
        let Some(snapshot) = self
            .shared
            .get(SNAPSHOT_KEY)
            .as_deref()
            .and_then(Snapshot::parse)
        else {
            return;
        };
        let Some((url, started_at)) = snapshot
            .state
            .track_identity()
            .map(|(u, s)| (u.to_string(), s))
        else {
            return;
        };
        let Some(meta) = snapshot.state.live_meta() else {
            return;
        };
        self.state.url = Some(url);
        self.state.started_at = Some(started_at);
        self.state.title = Some(meta.title.clone());
        self.state.artist = Some(meta.artist.clone());
        self.state.contributor = meta.contributor.clone();
        self.state.artwork = meta.artwork.clone();
        self.state.last_transition_reason = "snapshot-prefill";
        self.emit_now_playing();
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    fn refresh_metadata(&mut self, envelope: &Envelope) {
        let Some(meta) = envelope.live_meta() else {
            return;
        };
        let same = self.state.title.as_deref() == Some(meta.title.as_str())
            && self.state.artist.as_deref() == Some(meta.artist.as_str())
            && self.state.contributor == meta.contributor
            && self.state.artwork == meta.artwork;
        if same {
            return;
        }
        self.state.title = Some(meta.title.clone());
        self.state.artist = Some(meta.artist.clone());
        self.state.contributor = meta.contributor.clone();
        self.state.artwork = meta.artwork.clone();
        self.emit_now_playing();
    }

    fn emit_now_playing(&self) {
        let _ = self.updates.send(ListenerUpdate::NowPlaying {
            title: self.state.title.clone(),
            artist: self.state.artist.clone(),
            contributor: self.state.contributor.clone(),
            artwork: self.state.artwork.clone(),
        });
    }

    fn set_phase(&mut self, phase: ListenerPhase, now: i64) {
        if self.state.phase == phase {
            return;
        }
        debug!("phase {:?} → {:?}", self.state.phase, phase);
        self.state.phase = phase;
        if phase == ListenerPhase::Live {
            self.state.last_live_at = now;
        }
        let _ = self.updates.send(ListenerUpdate::Phase(phase));
    }

    fn restart_sync(&mut self, period_ms: u64) {
        if self.sync_cadence_ms == period_ms && self.sync_timer.is_running() {
            return;
        }
        self.sync_cadence_ms = period_ms;
        self.sync_timer.stop();
        let tx = self.event_tx.clone();
        self.sync_timer
            .start(Duration::from_millis(period_ms), move || {
                !matches!(
                    tx.try_send(ListenerEvent::SyncTick),
                    Err(mpsc::error::TrySendError::Closed(_))
                )
            });
    }
}
