//! Harvesting Robot Command Vocabulary
//!
//! Outbound command strings understood by the tree-climbing harvester
//! firmware. Motion and speed commands carry their own `*` terminator;
//! joint commands are sent bare (`A90`).

use std::fmt;

/// Terminator the firmware uses for motion and speed commands.
pub const COMMAND_TERMINATOR: char = '*';

/// Highest angle a joint servo accepts.
pub const MAX_JOINT_ANGLE: u16 = 180;

/// Arm joints, each addressed by a single letter prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    Base,
    Shoulder,
    Elbow,
    WristPitch,
    WristRoll,
    Gripper,
}

impl Joint {
    pub fn prefix(&self) -> char {
        match self {
            Self::Base => 'A',
            Self::Shoulder => 'B',
            Self::Elbow => 'C',
            Self::WristPitch => 'D',
            Self::WristRoll => 'E',
            Self::Gripper => 'F',
        }
    }

    /// Case-insensitive inverse of [`Joint::prefix`].
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix.to_ascii_uppercase() {
            'A' => Some(Self::Base),
            'B' => Some(Self::Shoulder),
            'C' => Some(Self::Elbow),
            'D' => Some(Self::WristPitch),
            'E' => Some(Self::WristRoll),
            'F' => Some(Self::Gripper),
            _ => None,
        }
    }
}

/// Climber speed, 1 (low) to 3 (high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpeedLevel(u8);

impl SpeedLevel {
    pub const LOW: SpeedLevel = SpeedLevel(1);
    pub const MEDIUM: SpeedLevel = SpeedLevel(2);
    pub const HIGH: SpeedLevel = SpeedLevel(3);

    /// Returns `None` outside 1..=3.
    pub fn new(level: u8) -> Option<Self> {
        (1..=3).contains(&level).then_some(Self(level))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Next level up, saturating at high.
    pub fn increase(self) -> Self {
        Self((self.0 + 1).min(Self::HIGH.0))
    }

    /// Next level down, saturating at low.
    pub fn decrease(self) -> Self {
        Self((self.0 - 1).max(Self::LOW.0))
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "Low Speed",
            2 => "Medium Speed",
            _ => "High Speed",
        }
    }
}

impl Default for SpeedLevel {
    fn default() -> Self {
        Self::LOW
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotCommand {
    /// Climb up the trunk
    Forward,
    /// Climb down
    Reverse,
    Stop,
    Speed(SpeedLevel),
    /// Move a joint; the angle is clamped to 0..=180
    Joint { joint: Joint, angle: u16 },
    /// Liveness probe
    Ping,
    /// Sent verbatim
    Raw(String),
}

impl RobotCommand {
    pub fn joint(joint: Joint, angle: u16) -> Self {
        Self::Joint {
            joint,
            angle: angle.min(MAX_JOINT_ANGLE),
        }
    }

    /// Wire text for this command.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Forward => format!("FORWARD{}", COMMAND_TERMINATOR),
            Self::Reverse => format!("REVERSE{}", COMMAND_TERMINATOR),
            Self::Stop => format!("STOP{}", COMMAND_TERMINATOR),
            Self::Speed(level) => format!("SPEED_{}{}", level.value(), COMMAND_TERMINATOR),
            Self::Joint { joint, angle } => {
                format!("{}{}", joint.prefix(), (*angle).min(MAX_JOINT_ANGLE))
            }
            Self::Ping => "PING".to_string(),
            Self::Raw(text) => text.clone(),
        }
    }
}

impl fmt::Display for RobotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}
