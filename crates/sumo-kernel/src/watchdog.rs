//! [`StreamWatchdog`] – sensor stream staleness monitor.
//!
//! The control loop hands the watchdog the timestamp of the latest value on
//! each stream (`"vision"`, `"range"`) once per tick.  A stream is *stale*
//! when that value is older than its timeout and *silent* when nothing has
//! ever arrived.
//!
//! The watchdog only reports.  Arbitration keeps using the last stored value
//! either way; the point is to make a dead producer visible in the logs
//! without flooding them, so messages are emitted on health transitions only.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Default maximum age of the latest value on a stream.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_millis(500);

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health reported for a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHealth {
    /// The latest value is within the timeout.
    Fresh,
    /// The latest value is older than the timeout.
    Stale,
    /// No value has ever been received.
    Silent,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

struct StreamEntry {
    timeout: Duration,
    health: Option<StreamHealth>,
}

// ────────────────────────────────────────────────────────────────────────────
// StreamWatchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks the age of each sensor stream and logs health transitions.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use chrono::{TimeDelta, Utc};
/// use sumo_kernel::watchdog::{StreamHealth, StreamWatchdog};
///
/// let mut wd = StreamWatchdog::new(Duration::from_millis(500));
/// let now = Utc::now();
///
/// assert_eq!(wd.observe("range", None, now), StreamHealth::Silent);
/// assert_eq!(wd.observe("range", Some(now), now), StreamHealth::Fresh);
/// let later = now + TimeDelta::seconds(1);
/// assert_eq!(wd.observe("range", Some(now), later), StreamHealth::Stale);
/// ```
pub struct StreamWatchdog {
    default_timeout: Duration,
    streams: HashMap<String, StreamEntry>,
}

impl Default for StreamWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_TIMEOUT)
    }
}

impl StreamWatchdog {
    /// Create a watchdog applying `default_timeout` to every stream that is
    /// not registered explicitly.
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            streams: HashMap::new(),
        }
    }

    /// Give `stream` its own timeout.  Resets its recorded health.
    pub fn register(&mut self, stream: &str, timeout: Duration) {
        self.streams.insert(
            stream.to_string(),
            StreamEntry {
                timeout,
                health: None,
            },
        );
    }

    pub fn timeout(&self, stream: &str) -> Duration {
        self.streams
            .get(stream)
            .map_or(self.default_timeout, |e| e.timeout)
    }

    /// Classify `stream` given the timestamp of its latest value, logging if
    /// the health differs from the previous observation.
    ///
    /// A `last_seen` in the future (clock skew between producers) counts as
    /// fresh.
    pub fn observe(
        &mut self,
        stream: &str,
        last_seen: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StreamHealth {
        let default_timeout = self.default_timeout;
        let entry = self
            .streams
            .entry(stream.to_string())
            .or_insert_with(|| StreamEntry {
                timeout: default_timeout,
                health: None,
            });

        let (health, age) = match last_seen {
            None => (StreamHealth::Silent, None),
            Some(ts) => {
                let age = (now - ts).to_std().unwrap_or(Duration::ZERO);
                let health = if age > entry.timeout {
                    StreamHealth::Stale
                } else {
                    StreamHealth::Fresh
                };
                (health, Some(age))
            }
        };

        let previous = entry.health.replace(health);
        if previous != Some(health) {
            let age_ms = age.map(|a| a.as_millis());
            match (previous, health) {
                (Some(StreamHealth::Fresh), StreamHealth::Stale | StreamHealth::Silent) => {
                    warn!(stream, ?health, ?age_ms, "sensor stream went quiet");
                }
                (Some(StreamHealth::Stale | StreamHealth::Silent), StreamHealth::Fresh) => {
                    info!(stream, ?age_ms, "sensor stream recovered");
                }
                _ => debug!(stream, ?previous, ?health, "sensor stream health"),
            }
        }
        health
    }

    /// Health recorded by the most recent [`observe`](Self::observe) call.
    pub fn health(&self, stream: &str) -> Option<StreamHealth> {
        self.streams.get(stream).and_then(|e| e.health)
    }

    /// Streams whose last observation was not [`StreamHealth::Fresh`].
    /// Order is unspecified.
    pub fn unhealthy_streams(&self) -> Vec<String> {
        self.streams
            .iter()
            .filter(|(_, e)| matches!(e.health, Some(h) if h != StreamHealth::Fresh))
            .map(|(id, _)| id.clone())
            .collect()
    }
}
