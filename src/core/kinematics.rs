//! Body models that turn a [`DriveCommand`] into motion.
//!
//! Two interchangeable models are provided:
//!
//! - [`SteeringBody`]: the turtle-style body. The left/right difference
//!   becomes a bounded turn, the sum becomes a bounded forward/backward
//!   translation, and the position is kept inside a rectangular cage.
//! - [`DifferentialDrive`]: a two-wheeled robot. Wheel rotations are split
//!   into a simultaneous part (spin in place or roll straight) and a
//!   single-wheel pivot about the stationary wheel.
//!
//! Headings are radians in both models and wrap circularly with
//! [`bounded_clip`]. Positions saturate (steering) or are unbounded
//! (differential drive).

use std::f64::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RuntimeError};
use crate::motor::DriveCommand;

pub const THETA_MIN: f64 = 0.0;
pub const THETA_MAX: f64 = TAU;

/// Keep a circular quantity within `low <= x <= high`, where
/// `dist == |high - low|`.
///
/// Overshoot past one bound re-enters from the other: `high + d` maps to
/// `low + d` and `low - d` to `high - d`, modulo `dist`. Values already in
/// range (bounds included) are returned unchanged.
pub fn bounded_clip(x: f64, low: f64, high: f64, dist: f64) -> f64 {
    if x < low {
        high - (low - x).abs() % dist
    } else if x > high {
        low + (high - x).abs() % dist
    } else {
        x
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyPose {
    pub x: f64,
    pub y: f64,
    /// Radians.
    pub heading: f64,
}

impl BodyPose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading.is_finite()
    }
}

/// Circular range a heading is wrapped into.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeadingRange {
    pub min: f64,
    pub max: f64,
}

impl Default for HeadingRange {
    fn default() -> Self {
        Self {
            min: THETA_MIN,
            max: THETA_MAX,
        }
    }
}

impl HeadingRange {
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn clip(&self, heading: f64) -> f64 {
        bounded_clip(heading, self.min, self.max, self.width())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.width() <= 0.0 {
            return Err(ConfigError::Invalid("heading range must satisfy min < max"));
        }
        Ok(())
    }
}

/// A body driven by the connectome's motor output.
pub trait Kinematics {
    fn pose(&self) -> BodyPose;

    /// Consume one drive command. On error the pose is unchanged.
    fn apply(&mut self, drive: DriveCommand) -> Result<BodyPose, RuntimeError>;
}

/// Left trim measured by averaging left/right power over a long free run.
pub const CALIBRATED_LEFT_TRIM: f64 = 0.56474;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SteeringConfig {
    /// Largest turn per step, in degrees.
    pub max_turn_angle: f64,
    /// Largest translation per step.
    pub max_translation: f64,
    /// Largest expected |left| or |right|; the raw domain is `[0, 2 * this]`.
    pub max_single_drive: f64,

    pub left_trim: f64,
    pub right_trim: f64,

    /// Position saturates into `[-cage_half_width, cage_half_width]`.
    pub cage_half_width: f64,
    /// Position saturates into `[-cage_half_height, cage_half_height]`.
    pub cage_half_height: f64,

    pub heading: HeadingRange,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_turn_angle: 512.0,
            max_translation: 5.0,
            max_single_drive: 256.0,
            left_trim: 0.0,
            right_trim: 0.0,
            cage_half_width: 250.0,
            cage_half_height: 250.0,
            heading: HeadingRange::default(),
        }
    }
}

impl SteeringConfig {
    /// Defaults plus the measured left/right bias compensation.
    pub fn calibrated() -> Self {
        Self {
            left_trim: CALIBRATED_LEFT_TRIM,
            ..Self::default()
        }
    }

    fn domain(&self) -> f64 {
        2.0 * self.max_single_drive
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let domain = self.domain();
        if domain == 0.0 || !domain.is_finite() {
            return Err(ConfigError::DegenerateNormalization("max_single_drive"));
        }
        if !(self.max_turn_angle.is_finite() && self.max_translation.is_finite()) {
            return Err(ConfigError::DegenerateNormalization("max_turn_angle/max_translation"));
        }
        if !(self.left_trim.is_finite() && self.right_trim.is_finite()) {
            return Err(ConfigError::Invalid("trims must be finite"));
        }
        if !(self.cage_half_width > 0.0 && self.cage_half_height > 0.0)
            || !(self.cage_half_width.is_finite() && self.cage_half_height.is_finite())
        {
            return Err(ConfigError::Invalid("cage extents must be positive"));
        }
        self.heading.validate()
    }
}

/// What a steering move actually did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// Normalized turn, degrees, always >= 0.
    pub turn_angle: f64,
    /// Normalized translation; negative means backward.
    pub magnitude: f64,
}

#[derive(Debug, Clone)]
pub struct SteeringBody {
    cfg: SteeringConfig,
    pose: BodyPose,
}

impl SteeringBody {
    pub fn new(cfg: SteeringConfig) -> Result<Self, ConfigError> {
        Self::with_pose(cfg, BodyPose::default())
    }

    pub fn with_pose(cfg: SteeringConfig, pose: BodyPose) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg, pose })
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.cfg
    }

    /// Rescale raw turn/translation from `[0, 2 * max_single_drive]` into
    /// `[0, max_turn_angle]` / `[0, max_translation]`.
    pub fn normalize(&self, turn: f64, translation: f64) -> (f64, f64) {
        let domain = self.cfg.domain();
        (
            turn / domain * self.cfg.max_turn_angle,
            translation / domain * self.cfg.max_translation,
        )
    }

    /// Turn toward the weaker side, then move along the new heading.
    pub fn drive(&mut self, left: f64, right: f64) -> Result<Motion, RuntimeError> {
        let left = left + self.cfg.left_trim;
        let right = right + self.cfg.right_trim;

        let turn_raw = left.max(right) - left.min(right);
        let translation_raw = left + right;
        let (turn_angle, magnitude) = self.normalize(turn_raw, translation_raw);
        if !turn_angle.is_finite() || !magnitude.is_finite() {
            return Err(RuntimeError::NonFinite("steering normalization"));
        }

        // More power on the left turns clockwise.
        let turn = turn_angle.to_radians();
        let mut heading = if left >= right {
            self.pose.heading - turn
        } else {
            self.pose.heading + turn
        };

        let x = self.pose.x + magnitude * heading.cos();
        let y = self.pose.y + magnitude * heading.sin();
        heading = self.cfg.heading.clip(heading);

        let pose = BodyPose {
            x: x.clamp(-self.cfg.cage_half_width, self.cfg.cage_half_width),
            y: y.clamp(-self.cfg.cage_half_height, self.cfg.cage_half_height),
            heading,
        };
        if !pose.is_finite() {
            return Err(RuntimeError::NonFinite("steering pose"));
        }

        self.pose = pose;
        Ok(Motion {
            turn_angle,
            magnitude,
        })
    }
}

impl Kinematics for SteeringBody {
    fn pose(&self) -> BodyPose {
        self.pose
    }

    fn apply(&mut self, drive: DriveCommand) -> Result<BodyPose, RuntimeError> {
        self.drive(drive.left, drive.right)?;
        Ok(self.pose)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DiffDriveConfig {
    pub wheel_radius: f64,
    /// Center to wheel; used for spinning in place.
    pub bot_radius: f64,
    /// Wheel to wheel; used when pivoting about one wheel.
    pub bot_diameter: f64,

    /// Raw muscle sums are divided by this to get wheel rotations (radians).
    pub drive_scale: f64,
    /// World units per unit of wheel travel.
    pub canvas_scale: f64,

    pub heading: HeadingRange,
}

impl Default for DiffDriveConfig {
    /// A GoPiGo-sized robot in centimetres.
    fn default() -> Self {
        Self {
            wheel_radius: 3.25,
            bot_radius: 5.85,
            bot_diameter: 11.7,
            drive_scale: 180.0,
            canvas_scale: 1.0,
            heading: HeadingRange::default(),
        }
    }
}

impl DiffDriveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drive_scale == 0.0 || !self.drive_scale.is_finite() {
            return Err(ConfigError::DegenerateNormalization("drive_scale"));
        }
        if self.bot_radius <= 0.0 || !self.bot_radius.is_finite() {
            return Err(ConfigError::DegenerateNormalization("bot_radius"));
        }
        if self.bot_diameter <= 0.0 || !self.bot_diameter.is_finite() {
            return Err(ConfigError::DegenerateNormalization("bot_diameter"));
        }
        if self.wheel_radius <= 0.0 || !self.wheel_radius.is_finite() {
            return Err(ConfigError::Invalid("wheel_radius must be positive"));
        }
        if !self.canvas_scale.is_finite() {
            return Err(ConfigError::Invalid("canvas_scale must be finite"));
        }
        self.heading.validate()
    }
}

#[derive(Debug, Clone)]
pub struct DifferentialDrive {
    cfg: DiffDriveConfig,
    pose: BodyPose,
}

/// `np.sign` semantics: zero stays zero.
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl DifferentialDrive {
    pub fn new(cfg: DiffDriveConfig) -> Result<Self, ConfigError> {
        Self::with_pose(cfg, BodyPose::default())
    }

    pub fn with_pose(cfg: DiffDriveConfig, pose: BodyPose) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg, pose })
    }

    pub fn config(&self) -> &DiffDriveConfig {
        &self.cfg
    }

    /// Scale a raw drive command into wheel rotations.
    pub fn wheel_rotations(&self, drive: DriveCommand) -> Result<(f64, f64), RuntimeError> {
        let left = drive.left / self.cfg.drive_scale;
        let right = drive.right / self.cfg.drive_scale;
        if !left.is_finite() || !right.is_finite() {
            return Err(RuntimeError::NonFinite("drive scaling"));
        }
        Ok((left, right))
    }

    /// Rotate the left and right wheels by the given angles (radians).
    pub fn update(&mut self, left: f64, right: f64) -> Result<BodyPose, RuntimeError> {
        let DiffDriveConfig {
            wheel_radius,
            bot_radius,
            bot_diameter,
            canvas_scale,
            ..
        } = self.cfg;
        let BodyPose {
            mut x,
            mut y,
            mut heading,
        } = self.pose;

        // Both wheels turn together until the smaller one is used up.
        let common = left.abs().min(right.abs());
        let left_rest = left - sign(left) * common;
        let right_rest = right - sign(right) * common;

        if left == 0.0 || right == 0.0 {
            // Nothing simultaneous.
        } else if left >= 0.0 && right <= 0.0 {
            heading += common * wheel_radius / bot_radius;
        } else if left <= 0.0 && right >= 0.0 {
            heading -= common * wheel_radius / bot_radius;
        } else {
            let distance = common * wheel_radius * sign(left);
            x += distance * heading.cos() * canvas_scale;
            y += distance * heading.sin() * canvas_scale;
        }

        // Whatever one wheel has left pivots the bot about the other wheel.
        let pivot = if left_rest != 0.0 {
            Some((1.0, left_rest))
        } else if right_rest != 0.0 {
            Some((-1.0, right_rest))
        } else {
            None
        };
        if let Some((direction, rest)) = pivot {
            let delta = rest * wheel_radius / bot_diameter;
            let chord = bot_diameter * (delta / 2.0).sin();
            let along = heading + direction * delta / 2.0;
            x += chord * along.cos() * canvas_scale;
            y += chord * along.sin() * canvas_scale;
            heading += direction * delta;
        }

        let pose = BodyPose {
            x,
            y,
            heading: self.cfg.heading.clip(heading),
        };
        if !pose.is_finite() {
            return Err(RuntimeError::NonFinite("differential drive pose"));
        }
        self.pose = pose;
        Ok(pose)
    }
}

impl Kinematics for DifferentialDrive {
    fn pose(&self) -> BodyPose {
        self.pose
    }

    fn apply(&mut self, drive: DriveCommand) -> Result<BodyPose, RuntimeError> {
        let (left, right) = self.wheel_rotations(drive)?;
        self.update(left, right)
    }
}
