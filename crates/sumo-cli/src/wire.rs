//! JSON-lines bridge between the harness and the control stack.
//!
//! **In** (stdin): one sensor message per line, tagged by `"type"`:
//!
//! ```text
//! {"type":"opponent","detected":true,"center_x":200,"center_y":120,"area":500.0}
//! {"type":"range","front":0.8,"back":null,"left":1.2,"right":0.9}
//! ```
//!
//! A `null` or missing range sector means "no valid reading".  Either
//! message may carry an RFC 3339 `"timestamp"`; otherwise the receive time
//! is used.  Lines that do not decode are logged and skipped, leaving the
//! stored sensor values as they were.
//!
//! **Out** (stdout): one [`Twist`] per line,
//! `{"linear_x":0.5,"linear_y":0.0,"angular_z":-0.25}`.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sumo_hal::VelocitySink;
use sumo_perception::SensorState;
use sumo_types::{OpponentObservation, RangeSnapshot, SumoError, Twist};
use tracing::warn;

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SensorMessage {
    Opponent(OpponentMessage),
    Range(RangeMessage),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OpponentMessage {
    #[serde(default)]
    pub detected: bool,
    #[serde(default)]
    pub center_x: i32,
    #[serde(default)]
    pub center_y: i32,
    #[serde(default)]
    pub area: f32,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl OpponentMessage {
    pub fn into_observation(self) -> OpponentObservation {
        let obs = if self.detected {
            OpponentObservation::sighted(self.center_x, self.center_y, self.area)
        } else {
            OpponentObservation::absent()
        };
        obs.with_timestamp(self.timestamp.unwrap_or_else(Utc::now))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RangeMessage {
    #[serde(default)]
    pub front: Option<f32>,
    #[serde(default)]
    pub back: Option<f32>,
    #[serde(default)]
    pub left: Option<f32>,
    #[serde(default)]
    pub right: Option<f32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RangeMessage {
    pub fn into_snapshot(self) -> RangeSnapshot {
        let sector = |v: Option<f32>| v.unwrap_or(f32::INFINITY);
        RangeSnapshot::new(
            sector(self.front),
            sector(self.back),
            sector(self.left),
            sector(self.right),
        )
        .with_timestamp(self.timestamp.unwrap_or_else(Utc::now))
    }
}

/// Decode one line and store it in `state`.
///
/// Returns `true` if a stored value was replaced.  Blank lines are ignored.
pub fn ingest_line(state: &SensorState, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    match serde_json::from_str::<SensorMessage>(line) {
        Ok(SensorMessage::Opponent(msg)) => state.ingest_opponent(Ok(msg.into_observation())),
        Ok(SensorMessage::Range(msg)) => state.ingest_range(Ok(msg.into_snapshot())),
        Err(e) => {
            let tag = message_type(line);
            let stream = match tag.as_deref() {
                Some("opponent") => "vision",
                Some("range") => "range",
                _ => "stdin",
            };
            let err = SumoError::SensorConversion {
                stream: stream.to_string(),
                details: e.to_string(),
            };
            match stream {
                "vision" => state.ingest_opponent(Err(err)),
                "range" => state.ingest_range(Err(err)),
                _ => {
                    warn!(error = %err, "skipping unrecognised sensor line");
                    false
                }
            }
        }
    }
}

/// The `"type"` field of a line that is valid JSON but not a valid message.
fn message_type(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("type")?.as_str().map(str::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// A [`VelocitySink`] writing one JSON object per twist to a writer.
pub struct JsonLineSink<W: Write + Send> {
    id: String,
    out: W,
}

impl JsonLineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new("stdout", io::stdout())
    }
}

impl<W: Write + Send> JsonLineSink<W> {
    pub fn new(id: impl Into<String>, out: W) -> Self {
        Self { id: id.into(), out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, twist: &Twist) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, twist)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl<W: Write + Send> VelocitySink for JsonLineSink<W> {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&mut self, twist: Twist) -> Result<(), SumoError> {
        self.write_line(&twist).map_err(|e| SumoError::Actuation {
            sink: self.id.clone(),
            details: e.to_string(),
        })
    }
}
