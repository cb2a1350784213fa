//! Presence ping and local listening sessions.
//!
//! Pure observation, no authority: while audio is confirmed live the
//! listener refreshes a per-client ping key, and accumulates a local session
//! record that is appended to a capped history on off-air.  Nothing here is
//! read back by the console.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use onair_proto::envelope::{CLIENT_ID_KEY, LISTENER_PING_PREFIX, SESSIONS_KEY};
use onair_proto::store::{read_json, write_json, SharedStore};
use onair_proto::track::generate_id;

pub const PING_INTERVAL_MS: i64 = 5_000;

/// Most-recent sessions kept in the history key.
pub const SESSIONS_CAP: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub started_at: i64,
    pub listened_ms: i64,
    pub ended_at: Option<i64>,
}

pub struct Presence {
    shared: Arc<dyn SharedStore>,
    client_id: String,
    session: Option<SessionRecord>,
    last_ping_at: i64,
}

impl Presence {
    pub fn new(shared: Arc<dyn SharedStore>) -> Self {
        let client_id = stable_client_id(shared.as_ref());
        Self {
            shared,
            client_id,
            session: None,
            last_ping_at: 0,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Open a session the first time audio is confirmed for this stretch of
    /// live playback.
    pub fn on_audio_confirmed(&mut self, now: i64) {
        if self.session.is_none() {
            self.session = Some(SessionRecord {
                started_at: now,
                listened_ms: 0,
                ended_at: None,
            });
        }
    }

    /// Periodic upkeep while live: refresh the ping key and the session's
    /// listened time.
    pub fn tick(&mut self, now: i64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.listened_ms = (now - session.started_at).max(0);
        if now - self.last_ping_at >= PING_INTERVAL_MS {
            self.last_ping_at = now;
            let key = format!("{}{}", LISTENER_PING_PREFIX, self.client_id);
            if let Err(e) = self.shared.set(&key, &now.to_string()) {
                debug!("presence ping failed: {}", e);
            }
        }
    }

    /// Close the running session (if any) and append it to the capped
    /// history.
    pub fn on_off_air(&mut self, now: i64) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.ended_at = Some(now);
        session.listened_ms = (now - session.started_at).max(0);

        let mut sessions: Vec<SessionRecord> =
            read_json(self.shared.as_ref(), SESSIONS_KEY).unwrap_or_default();
        sessions.push(session);
        if sessions.len() > SESSIONS_CAP {
            let excess = sessions.len() - SESSIONS_CAP;
            sessions.drain(..excess);
        }
        write_json(self.shared.as_ref(), SESSIONS_KEY, &sessions);
    }
}

/// Stable anonymous client id: persisted once, reused across reloads.
/// Storage failure falls back to a session-only id — still anonymous.
fn stable_client_id(store: &dyn SharedStore) -> String {
    if let Some(existing) = store.get(CLIENT_ID_KEY) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let id = generate_id("listener");
    let _ = store.set(CLIENT_ID_KEY, &id);
    id
}
