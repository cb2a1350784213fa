//! End-to-end: a console core and a sync engine coordinating through one
//! shared in-memory store, with synthetic clocks on both sides.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use onair_console::engine::ConsoleCore;
use onair_listener::engine::{ListenerPhase, SyncEngine, OFFAIR_LOCK_MS};
use onair_listener::widget::AudioWidget;
use onair_listener::widget::WidgetEvent;
use onair_proto::envelope::{BroadcastStatus, Envelope, BROADCAST_KEY};
use onair_proto::store::{write_json, MemStore, SharedStore};
use onair_proto::track::generate_id;

// ── scripted transport ────────────────────────────────────────────────────────

#[derive(Default)]
struct WidgetLog {
    loads: Vec<String>,
    seeks: Vec<i64>,
    position: Option<i64>,
}

#[derive(Clone)]
struct ScriptedWidget {
    log: Arc<Mutex<WidgetLog>>,
}

impl ScriptedWidget {
    fn new() -> (Self, Arc<Mutex<WidgetLog>>) {
        let log = Arc::new(Mutex::new(WidgetLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl AudioWidget for ScriptedWidget {
    fn load(&mut self, url: &str) {
        self.log.lock().unwrap().loads.push(url.to_string());
    }
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn seek_to(&mut self, position_ms: i64) {
        let mut log = self.log.lock().unwrap();
        log.seeks.push(position_ms);
        log.position = Some(position_ms);
    }
    fn set_volume(&mut self, _volume: f32) {}
    fn position_ms(&mut self) -> Option<i64> {
        self.log.lock().unwrap().position
    }
}

// ── fixtures ──────────────────────────────────────────────────────────────────

/// Seed file with two known tracks so both sides agree on the playlist.
fn write_seed() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("onair-e2e-{}", generate_id("t")));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("playlist.json");
    std::fs::write(
        &path,
        r#"[
          {"id":"t1","title":"First Set","artist":"A One",
           "url":"https://cdn.example/t1","duration":180},
          {"id":"t2","title":"Second Set","artist":"B Two",
           "url":"https://cdn.example/t2","duration":180}
        ]"#,
    )
    .unwrap();
    path
}

fn console_over(shared: Arc<MemStore>, boot_at: i64) -> ConsoleCore {
    let (tx, _rx) = mpsc::channel(64);
    let mut core = ConsoleCore::new(shared, write_seed(), tx);
    core.init_session(boot_at);
    core
}

fn listener_over(shared: Arc<MemStore>) -> (SyncEngine, Arc<Mutex<WidgetLog>>) {
    let (widget, log) = ScriptedWidget::new();
    let (tx, _rx) = mpsc::channel(64);
    (
        SyncEngine::new(shared, Box::new(widget), tx, 1.0, true),
        log,
    )
}

/// Ready → play → position sample, the listener's normal path to confirmed
/// audio.
fn confirm_playback(engine: &mut SyncEngine, log: &Arc<Mutex<WidgetLog>>, now: i64) {
    engine.on_widget_event(WidgetEvent::Ready, now);
    if log.lock().unwrap().position.is_none() {
        log.lock().unwrap().position = Some(1);
    }
    engine.on_widget_event(WidgetEvent::PlayStarted, now + 100);
}

// ── scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stale_broadcast_times_out_then_new_track_goes_live_once() {
    let shared = Arc::new(MemStore::new());
    let t0 = 1_000_000;

    // Console goes live with the first track.
    let mut console = console_over(shared.clone(), t0 - 5_000);
    assert_eq!(console.store().state().playlist.len(), 2);
    assert!(console.play_index(0, "manual", t0));

    // Listener picks it up and reaches live.
    let (mut listener, log) = listener_over(shared.clone());
    listener.boot(t0 + 500);
    listener.sync_tick(t0 + 1_000);
    assert_eq!(listener.state().phase, ListenerPhase::Syncing);
    confirm_playback(&mut listener, &log, t0 + 1_200);
    assert_eq!(listener.state().phase, ListenerPhase::Live);
    assert_eq!(log.lock().unwrap().loads, vec!["https://cdn.example/t1".to_string()]);

    // The console vanishes: no heartbeats.  Far past the track duration and
    // the 30 s TTL the envelope's lease has lapsed — the listener must land
    // off air.
    let stale_at = t0 + 200_000;
    listener.sync_tick(stale_at);
    assert_eq!(listener.state().phase, ListenerPhase::Offair);

    // The console comes back and puts the second track on air.
    let t1 = t0 + 201_000;
    assert!(console.safe_advance("manual", t1));
    let envelope = Envelope::parse(&shared.get(BROADCAST_KEY).unwrap()).unwrap();
    assert_eq!(envelope.track_identity().unwrap().0, "https://cdn.example/t2");

    // Listener: offair → syncing → live, with exactly one load("t2").
    let wake = stale_at + OFFAIR_LOCK_MS + 1_000;
    listener.sync_tick(wake);
    assert_eq!(listener.state().phase, ListenerPhase::Syncing);
    confirm_playback(&mut listener, &log, wake + 200);
    assert_eq!(listener.state().phase, ListenerPhase::Live);

    // Further ticks on the same broadcast never remount.
    console.heartbeat_tick(wake + 1_000);
    log.lock().unwrap().position = Some(wake + 1_500 - t1);
    listener.sync_tick(wake + 1_500);
    assert_eq!(listener.state().phase, ListenerPhase::Live);

    let loads = log.lock().unwrap().loads.clone();
    assert_eq!(
        loads,
        vec![
            "https://cdn.example/t1".to_string(),
            "https://cdn.example/t2".to_string(),
        ],
        "each track loaded exactly once"
    );
}

#[tokio::test]
async fn metadata_edit_mid_play_refreshes_without_remount() {
    let shared = Arc::new(MemStore::new());
    let t0 = 1_000_000;

    let mut console = console_over(shared.clone(), t0 - 5_000);
    assert!(console.play_index(0, "manual", t0));

    let (mut listener, log) = listener_over(shared.clone());
    listener.boot(t0 + 500);
    listener.sync_tick(t0 + 1_000);
    confirm_playback(&mut listener, &log, t0 + 1_200);
    assert_eq!(listener.state().phase, ListenerPhase::Live);
    assert_eq!(listener.state().title.as_deref(), Some("First Set"));

    let loads_before = log.lock().unwrap().loads.len();
    let seeks_before = log.lock().unwrap().seeks.len();

    // The operator edits the title mid-play: same identity, new meta.
    let mut envelope = Envelope::parse(&shared.get(BROADCAST_KEY).unwrap()).unwrap();
    if let BroadcastStatus::Live { meta, .. } = &mut envelope.status {
        meta.title = "First Set (extended)".to_string();
    }
    let edit_at = t0 + 5_000;
    envelope.updated_at = edit_at;
    write_json(shared.as_ref(), BROADCAST_KEY, &envelope);

    // Transport is on the shared clock, so drift stays in tolerance.
    log.lock().unwrap().position = Some(edit_at + 500 - t0);
    listener.sync_tick(edit_at + 500);

    assert_eq!(
        listener.state().title.as_deref(),
        Some("First Set (extended)"),
        "displayed metadata follows the edit"
    );
    assert_eq!(listener.state().phase, ListenerPhase::Live);
    let log = log.lock().unwrap();
    assert_eq!(log.loads.len(), loads_before, "no second load()");
    assert_eq!(log.seeks.len(), seeks_before, "position untouched");
}

#[tokio::test]
async fn explicit_stop_reaches_listeners_promptly() {
    let shared = Arc::new(MemStore::new());
    let t0 = 1_000_000;

    let mut console = console_over(shared.clone(), t0 - 5_000);
    assert!(console.play_index(1, "manual", t0));

    let (mut listener, log) = listener_over(shared.clone());
    listener.boot(t0 + 500);
    listener.sync_tick(t0 + 1_000);
    confirm_playback(&mut listener, &log, t0 + 1_200);
    assert_eq!(listener.state().phase, ListenerPhase::Live);

    // Operator stops: a positive off-air envelope, not a silent absence.
    let stop_at = t0 + 10_000;
    assert!(console.emergency_stop("manual", stop_at));
    let envelope = Envelope::parse(&shared.get(BROADCAST_KEY).unwrap()).unwrap();
    assert_eq!(envelope.status, BroadcastStatus::Offair);

    listener.sync_tick(stop_at + 1_000);
    assert_eq!(listener.state().phase, ListenerPhase::Offair);
    assert_eq!(listener.state().last_transition_reason, "admin-offair");
}
