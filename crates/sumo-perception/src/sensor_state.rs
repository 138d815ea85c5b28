//! Latest-value sensor store shared between producers and the control loop.
//!
//! Two producers write independently:
//! - **Vision** – one [`OpponentObservation`] per processed camera frame.
//! - **Range** – one [`RangeSnapshot`] (per-sector minimum distances) per
//!   scan.
//!
//! The control loop reads both once per tick through
//! [`SensorState::snapshot`].  Each stream sits behind its own mutex, so a
//! slow reader never stalls the other producer and each struct is always
//! read whole.  The two halves of a snapshot may come from different
//! instants; their timestamps say which.
//!
//! Nothing is queued: a new value simply replaces the old one.
//!
//! # Example
//!
//! ```rust
//! use sumo_perception::sensor_state::SensorState;
//! use sumo_types::{OpponentObservation, RangeSnapshot};
//!
//! let state = SensorState::new();
//! assert!(state.snapshot().opponent.is_none());
//!
//! state.update_opponent(OpponentObservation::sighted(200, 120, 500.0));
//! state.update_range(RangeSnapshot::new(0.8, -1.0, 1.2, 0.9));
//!
//! let snap = state.snapshot();
//! assert!(snap.opponent_blob().is_some());
//! assert_eq!(snap.range_or_clear().back, f32::INFINITY); // negative → no reading
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use sumo_types::{OpponentBlob, OpponentObservation, RangeSnapshot, SumoError};
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Copy of both sensor streams as read at the start of a control tick.
///
/// `None` means no value has ever been received on that stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    pub opponent: Option<OpponentObservation>,
    pub range: Option<RangeSnapshot>,
}

impl SensorSnapshot {
    /// The opponent blob, if one is currently detected.
    pub fn opponent_blob(&self) -> Option<OpponentBlob> {
        self.opponent.and_then(|o| o.blob())
    }

    /// The latest range snapshot, or an all-clear one if none was received.
    pub fn range_or_clear(&self) -> RangeSnapshot {
        self.range.unwrap_or_else(RangeSnapshot::clear)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SensorState
// ────────────────────────────────────────────────────────────────────────────

/// Thread-safe holder of the latest opponent observation and range snapshot.
///
/// Share it as `Arc<SensorState>`; producers only see the ingestion methods.
#[derive(Debug, Default)]
pub struct SensorState {
    opponent: Mutex<Option<OpponentObservation>>,
    range: Mutex<Option<RangeSnapshot>>,
}

impl SensorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored opponent observation.
    ///
    /// A detection with an unusable area is stored as "not detected".
    pub fn update_opponent(&self, obs: OpponentObservation) {
        let clean = obs.sanitized();
        if clean.detected != obs.detected {
            warn!(area = obs.area, "opponent area not usable; storing as not detected");
        }
        *lock(&self.opponent) = Some(clean);
    }

    /// Replace the stored range snapshot.
    ///
    /// NaN and negative sectors are replaced with `+infinity` before storing.
    pub fn update_range(&self, snap: RangeSnapshot) {
        let invalid = snap.invalid_sectors();
        if invalid > 0 {
            debug!(invalid, "normalized invalid range sectors");
        }
        let clean = snap.sanitized();
        *lock(&self.range) = Some(clean);
    }

    /// Read both streams.  Each lock is held only for the copy.
    pub fn snapshot(&self) -> SensorSnapshot {
        let opponent = *lock(&self.opponent);
        let range = *lock(&self.range);
        SensorSnapshot { opponent, range }
    }

    /// Store a decoded observation, or log and skip a decode failure.
    ///
    /// Returns `true` if the stored value changed.
    pub fn ingest_opponent(&self, decoded: Result<OpponentObservation, SumoError>) -> bool {
        match decoded {
            Ok(obs) => {
                self.update_opponent(obs);
                true
            }
            Err(e) => {
                warn!(
                    stream = "vision",
                    error = %e,
                    "skipping undecodable frame; keeping last observation"
                );
                false
            }
        }
    }

    /// Store a decoded range snapshot, or log and skip a decode failure.
    ///
    /// Returns `true` if the stored value changed.
    pub fn ingest_range(&self, decoded: Result<RangeSnapshot, SumoError>) -> bool {
        match decoded {
            Ok(snap) => {
                self.update_range(snap);
                true
            }
            Err(e) => {
                warn!(
                    stream = "range",
                    error = %e,
                    "skipping undecodable scan; keeping last snapshot"
                );
                false
            }
        }
    }
}

// The guarded values are plain `Copy` data that is always valid, so a
// producer that panicked while holding the lock leaves nothing half-written.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use chrono::Utc;

    fn conversion_error() -> SumoError {
        SumoError::SensorConversion {
            stream: "vision".to_string(),
            details: "bad frame".to_string(),
        }
    }

    #[test]
    fn empty_state_fails_toward_passivity() {
        let state = SensorState::new();
        let snap = state.snapshot();
        assert!(snap.opponent.is_none());
        assert!(snap.opponent_blob().is_none());
        let range = snap.range_or_clear();
        assert_eq!(range.front, f32::INFINITY);
        assert_eq!(range.right, f32::INFINITY);
    }

    #[test]
    fn last_writer_wins() {
        let state = SensorState::new();
        state.update_opponent(OpponentObservation::sighted(10, 10, 100.0));
        state.update_opponent(OpponentObservation::sighted(250, 40, 700.0));

        let blob = state.snapshot().opponent_blob().unwrap();
        assert_eq!(blob.center_x, 250);
        assert!((blob.area - 700.0).abs() < f32::EPSILON);
    }

    #[test]
    fn streams_update_independently() {
        let state = SensorState::new();
        state.update_range(RangeSnapshot::new(0.5, 0.5, 0.5, 0.5));
        let snap = state.snapshot();
        assert!(snap.opponent.is_none());
        assert!(snap.range.is_some());
    }

    #[test]
    fn update_range_normalizes_literal_snapshot() {
        let state = SensorState::new();
        state.update_range(RangeSnapshot {
            front: f32::NAN,
            back: -0.2,
            left: 0.4,
            right: f32::NEG_INFINITY,
            timestamp: Utc::now(),
        });
        let range = state.snapshot().range.unwrap();
        assert_eq!(range.front, f32::INFINITY);
        assert_eq!(range.back, f32::INFINITY);
        assert!((range.left - 0.4).abs() < f32::EPSILON);
        assert_eq!(range.right, f32::INFINITY);
    }

    #[test]
    fn unusable_area_is_stored_as_not_detected() {
        let state = SensorState::new();
        state.update_opponent(OpponentObservation::sighted(100, 100, f32::NAN));
        assert!(state.snapshot().opponent_blob().is_none());
    }

    #[test]
    fn conversion_failure_keeps_last_value() {
        let state = SensorState::new();
        assert!(state.ingest_opponent(Ok(OpponentObservation::sighted(1, 2, 3.0))));
        assert!(!state.ingest_opponent(Err(conversion_error())));
        assert_eq!(state.snapshot().opponent_blob().unwrap().center_x, 1);

        assert!(!state.ingest_range(Err(conversion_error())));
        assert!(state.snapshot().range.is_none());
    }

    #[test]
    fn concurrent_writers_never_produce_torn_reads() {
        let state = Arc::new(SensorState::new());
        let mut producers = Vec::new();

        let range_state = Arc::clone(&state);
        producers.push(thread::spawn(move || {
            for i in 0..2_000 {
                let d = i as f32;
                range_state.update_range(RangeSnapshot::new(d, d, d, d));
            }
        }));

        let vision_state = Arc::clone(&state);
        producers.push(thread::spawn(move || {
            for i in 0..2_000 {
                vision_state.update_opponent(OpponentObservation::sighted(i, i, i as f32));
            }
        }));

        for _ in 0..2_000 {
            let snap = state.snapshot();
            if let Some(r) = snap.range {
                assert_eq!(r.front, r.back);
                assert_eq!(r.left, r.right);
                assert_eq!(r.front, r.left);
            }
            if let Some(blob) = snap.opponent_blob() {
                assert_eq!(blob.center_x, blob.center_y);
                assert_eq!(blob.center_x as f32, blob.area);
            }
        }

        for p in producers {
            p.join().unwrap();
        }
    }
}
