use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the four range-sensor sectors around the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Front,
    Back,
    Left,
    Right,
}

impl Direction {
    /// Every sector, in the default boundary scan order.
    pub const ALL: [Direction; 4] = [
        Direction::Front,
        Direction::Back,
        Direction::Left,
        Direction::Right,
    ];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Front => write!(f, "front"),
            Direction::Back => write!(f, "back"),
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// Pixel centroid and area of a detected opponent blob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpponentBlob {
    pub center_x: i32,
    pub center_y: i32,
    pub area: f32,
}

/// Best-guess detection of the adversary for a single camera frame.
///
/// When `detected` is `false` the centroid and area carry no meaning; read
/// them through [`OpponentObservation::blob`], which hides them in that case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpponentObservation {
    pub detected: bool,
    pub center_x: i32,
    pub center_y: i32,
    pub area: f32,
    pub timestamp: DateTime<Utc>,
}

impl OpponentObservation {
    /// An observation of an opponent blob, stamped with the current time.
    pub fn sighted(center_x: i32, center_y: i32, area: f32) -> Self {
        Self {
            detected: true,
            center_x,
            center_y,
            area,
            timestamp: Utc::now(),
        }
    }

    /// A frame in which no opponent was found.
    pub fn absent() -> Self {
        Self {
            detected: false,
            center_x: 0,
            center_y: 0,
            area: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The detected blob, or `None` when the opponent is not in view.
    pub fn blob(&self) -> Option<OpponentBlob> {
        self.detected.then_some(OpponentBlob {
            center_x: self.center_x,
            center_y: self.center_y,
            area: self.area,
        })
    }

    /// Demote a detection whose area is NaN, infinite or negative to
    /// "not detected".
    pub fn sanitized(mut self) -> Self {
        if self.detected && !(self.area.is_finite() && self.area >= 0.0) {
            self.detected = false;
        }
        self
    }
}

/// Minimum obstacle distance (metres) in each of the four sectors.
///
/// `f32::INFINITY` means "no valid reading in this sector".  Values built via
/// [`RangeSnapshot::new`] are already normalized; use
/// [`RangeSnapshot::sanitized`] for values deserialized or built literally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSnapshot {
    pub front: f32,
    pub back: f32,
    pub left: f32,
    pub right: f32,
    pub timestamp: DateTime<Utc>,
}

impl RangeSnapshot {
    pub fn new(front: f32, back: f32, left: f32, right: f32) -> Self {
        Self {
            front,
            back,
            left,
            right,
            timestamp: Utc::now(),
        }
        .sanitized()
    }

    /// A snapshot with no valid reading in any sector.
    pub fn clear() -> Self {
        Self::new(f32::INFINITY, f32::INFINITY, f32::INFINITY, f32::INFINITY)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Distance reported for one sector.
    pub fn distance(&self, direction: Direction) -> f32 {
        match direction {
            Direction::Front => self.front,
            Direction::Back => self.back,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    /// Replace every NaN or negative sector with `+infinity`.
    pub fn sanitized(self) -> Self {
        Self {
            front: normalize_distance(self.front),
            back: normalize_distance(self.back),
            left: normalize_distance(self.left),
            right: normalize_distance(self.right),
            timestamp: self.timestamp,
        }
    }

    /// Number of sectors that [`sanitized`][Self::sanitized] would replace.
    pub fn invalid_sectors(&self) -> usize {
        Direction::ALL
            .iter()
            .filter(|d| {
                let v = self.distance(**d);
                v.is_nan() || v < 0.0
            })
            .count()
    }
}

/// Map an invalid distance (NaN, negative, `-inf`) to `+infinity`.
pub fn normalize_distance(value: f32) -> f32 {
    if value.is_nan() || value < 0.0 {
        f32::INFINITY
    } else {
        value
    }
}

/// A named, multi-step attack or evasion pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Direct,
    Zigzag,
    Circle,
    /// Chosen by the arbiter only, never drawn at random.
    Defensive,
}

impl Strategy {
    /// The strategies eligible for random selection.
    pub const RANDOM_POOL: [Strategy; 3] = [Strategy::Direct, Strategy::Zigzag, Strategy::Circle];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Direct => write!(f, "direct"),
            Strategy::Zigzag => write!(f, "zigzag"),
            Strategy::Circle => write!(f, "circle"),
            Strategy::Defensive => write!(f, "defensive"),
        }
    }
}

/// Velocity triple delivered to the actuation layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    /// Forward velocity (m/s).
    pub linear_x: f32,
    /// Lateral velocity (m/s); zero on a plain differential base.
    pub linear_y: f32,
    /// Yaw rate (rad/s), positive counter-clockwise.
    pub angular_z: f32,
}

impl Twist {
    /// The stop command.
    pub const ZERO: Twist = Twist {
        linear_x: 0.0,
        linear_y: 0.0,
        angular_z: 0.0,
    };

    pub fn is_zero(&self) -> bool {
        self.linear_x == 0.0 && self.linear_y == 0.0 && self.angular_z == 0.0
    }
}

/// A constant-velocity motion held for `duration` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotCommand {
    pub linear_x: f32,
    pub linear_y: f32,
    pub angular_z: f32,
    /// Seconds.
    pub duration: f32,
}

impl RobotCommand {
    pub fn new(linear_x: f32, linear_y: f32, angular_z: f32, duration: f32) -> Self {
        Self {
            linear_x,
            linear_y,
            angular_z,
            duration,
        }
    }

    /// Planar drive command (no lateral component).
    pub fn drive(linear_x: f32, angular_z: f32, duration: f32) -> Self {
        Self::new(linear_x, 0.0, angular_z, duration)
    }

    /// The velocity part of the command.
    pub fn twist(&self) -> Twist {
        Twist {
            linear_x: self.linear_x,
            linear_y: self.linear_y,
            angular_z: self.angular_z,
        }
    }
}

/// Errors raised anywhere between sensor ingestion and actuation.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SumoError {
    #[error("Sensor conversion failed on {stream}: {details}")]
    SensorConversion { stream: String, details: String },

    #[error("Command rejected: {0}")]
    InvalidCommand(String),

    #[error("Actuation failed on {sink}: {details}")]
    Actuation { sink: String, details: String },

    #[error("Actuation failed {failures} times in a row; control loop halted")]
    ActuationEscalated { failures: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}
