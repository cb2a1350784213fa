//! The opaque audio transport boundary.
//!
//! The sync engine treats playback as a black box: it issues transport
//! commands, receives coarse lifecycle events, and polls the position.  It
//! never trusts the transport's internal clock as authoritative — all
//! synchronization is position-vs-shared-clock comparison.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetEvent {
    /// Transport is usable.  Not proof of audio.
    Ready,
    /// Playback actually started.
    PlayStarted,
    /// The loaded content ran out.
    Finished,
}

pub trait AudioWidget: Send {
    fn load(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to(&mut self, position_ms: i64);
    fn set_volume(&mut self, volume: f32);
    /// Latest reported position.  None until content is loaded and ready.
    fn position_ms(&mut self) -> Option<i64>;
}

/// Simulated transport: a position clock over wall time.  Lets the listener
/// binary run the whole pipeline end-to-end without a real audio stack.
pub struct SimWidget {
    events: mpsc::Sender<WidgetEvent>,
    loaded: Option<String>,
    playing: bool,
    base_position_ms: i64,
    resumed_at: Option<Instant>,
    volume: f32,
}

impl SimWidget {
    pub fn new(events: mpsc::Sender<WidgetEvent>) -> Self {
        Self {
            events,
            loaded: None,
            playing: false,
            base_position_ms: 0,
            resumed_at: None,
            volume: 1.0,
        }
    }

    fn emit(&self, event: WidgetEvent) {
        let _ = self.events.try_send(event);
    }
}

impl AudioWidget for SimWidget {
    fn load(&mut self, url: &str) {
        debug!("sim widget: load {}", url);
        self.loaded = Some(url.to_string());
        self.playing = false;
        self.base_position_ms = 0;
        self.resumed_at = None;
        self.emit(WidgetEvent::Ready);
    }

    fn play(&mut self) {
        if self.loaded.is_none() || self.playing {
            return;
        }
        self.playing = true;
        self.resumed_at = Some(Instant::now());
        self.emit(WidgetEvent::PlayStarted);
    }

    fn pause(&mut self) {
        if let Some(resumed) = self.resumed_at.take() {
            self.base_position_ms += resumed.elapsed().as_millis() as i64;
        }
        self.playing = false;
    }

    fn seek_to(&mut self, position_ms: i64) {
        self.base_position_ms = position_ms.max(0);
        if self.playing {
            self.resumed_at = Some(Instant::now());
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn position_ms(&mut self) -> Option<i64> {
        self.loaded.as_ref()?;
        let running = self
            .resumed_at
            .map(|r| r.elapsed().as_millis() as i64)
            .unwrap_or(0);
        Some(self.base_position_ms + running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_then_play_emits_lifecycle_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut widget = SimWidget::new(tx);

        assert!(widget.position_ms().is_none());
        widget.load("https://example.com/set");
        assert_eq!(rx.recv().await, Some(WidgetEvent::Ready));

        widget.play();
        assert_eq!(rx.recv().await, Some(WidgetEvent::PlayStarted));

        widget.seek_to(90_000);
        let pos = widget.position_ms().unwrap();
        assert!(pos >= 90_000 && pos < 91_000);

        widget.pause();
        let held = widget.position_ms().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(widget.position_ms().unwrap(), held, "paused position is frozen");
    }
}
