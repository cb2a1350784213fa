//! Drift policy — pure decisions about the gap between the position implied
//! by the shared clock (`now - startedAt`) and the position the transport
//! actually reports.

/// Drift inside this band is left alone; correcting it would be audible
/// jitter for no gain.
pub const DRIFT_SOFT_MS: i64 = 1_500;

/// Drift at or past this band gets a direct seek to the expected position.
pub const DRIFT_HARD_MS: i64 = 3_500;

/// Soft corrections nudge by at most this much per tick, toward expected.
pub const SOFT_NUDGE_MS: i64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftAction {
    /// Within tolerance — just refresh the audio-is-alive timestamp.
    InTolerance,
    /// Nudge the transport a bounded step toward expected.
    SoftNudge { to_ms: i64 },
    /// Jump straight to the expected position.
    HardSeek { to_ms: i64 },
    /// The gap is an order of magnitude past anything playback skew can
    /// produce — a clock artifact.  Never propagate it into a seek.
    ClockSkew,
}

/// Offset the shared clock says we should be at.  Negative offsets are
/// clock-skew artifacts and clamp to zero rather than seeking backwards
/// through the start of the track.
pub fn expected_position_ms(now_ms: i64, started_at_ms: i64) -> i64 {
    (now_ms - started_at_ms).max(0)
}

pub fn decide(expected_ms: i64, position_ms: i64) -> DriftAction {
    let drift = position_ms - expected_ms;
    let magnitude = drift.abs();

    if magnitude > DRIFT_HARD_MS * 2 {
        return DriftAction::ClockSkew;
    }
    if magnitude <= DRIFT_SOFT_MS {
        return DriftAction::InTolerance;
    }
    if magnitude < DRIFT_HARD_MS {
        let step = magnitude.min(SOFT_NUDGE_MS);
        return DriftAction::SoftNudge {
            to_ms: position_ms - drift.signum() * step,
        };
    }
    DriftAction::HardSeek {
        to_ms: expected_ms,
    }
}
