//! Pose and rotation utilities.
//!
//! Two reference frames are in play:
//!
//! - **robot** – x forward, y left, z up.  Gyro rates arrive in this frame.
//! - **camera** – x right, y down, z forward.  Pixel rows grow along +y.
//!
//! Orientations are [`Rotation3<f32>`] matrices that map camera-frame vectors
//! into the world frame.  Angular velocities are integrated with the
//! exponential map (`from_scaled_axis(ω · dt)`), which is exact for a constant
//! rate over the interval.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::Vector3;
//! use tread_perception::pose::{camera_rotation, rotation_from_rates};
//!
//! // Yawing left at 1 rad/s for 100 ms is the same as starting 0.1 rad further left.
//! let start = camera_rotation(0.0, 0.0);
//! let turned = start * rotation_from_rates(Vector3::new(0.0, 0.0, 1.0), 0.1);
//! let expected = camera_rotation(0.1, 0.0);
//! assert!((turned.inverse() * expected).angle() < 1e-5);
//! ```

use nalgebra::{Matrix3, Rotation3, Vector3};
use tread_types::TimeStamp;

use crate::imu_history::{ImuData, ImuDataHistory};

// ────────────────────────────────────────────────────────────────────────────
// Frame conversions
// ────────────────────────────────────────────────────────────────────────────

/// Re-express a robot-frame vector in camera axes.
pub fn robot_to_camera_axes(v: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(-v.y, -v.z, v.x)
}

/// Fixed rotation whose columns are the camera axes written in robot axes.
pub fn camera_to_robot_rotation() -> Rotation3<f32> {
    Rotation3::from_matrix_unchecked(Matrix3::new(
        0.0, 0.0, 1.0, //
        -1.0, 0.0, 0.0, //
        0.0, -1.0, 0.0,
    ))
}

/// Camera orientation (camera → world) for a robot whose body has turned
/// `body_yaw_rad` about world +z and whose head is pitched up by
/// `head_angle_rad`.
pub fn camera_rotation(body_yaw_rad: f32, head_angle_rad: f32) -> Rotation3<f32> {
    let body = Rotation3::from_axis_angle(&Vector3::z_axis(), body_yaw_rad);
    // Positive head angle looks up, i.e. a negative rotation about robot +y.
    let head = Rotation3::from_axis_angle(&Vector3::y_axis(), -head_angle_rad);
    body * head * camera_to_robot_rotation()
}

// ────────────────────────────────────────────────────────────────────────────
// Gyro integration
// ────────────────────────────────────────────────────────────────────────────

/// Incremental camera rotation produced by robot-frame rates held for `dt_s`
/// seconds.  Negative `dt_s` integrates backwards in time.
pub fn rotation_from_rates(rates_robot: Vector3<f32>, dt_s: f32) -> Rotation3<f32> {
    Rotation3::from_scaled_axis(robot_to_camera_axes(rates_robot) * dt_s)
}

/// Linearly interpolate gyro rates between two timestamped samples.
///
/// Samples without a timestamp, or a zero-length span, yield the rates of
/// `before`.  `t` outside the span is clamped to the nearer sample.
pub fn interpolate_rates(before: &ImuData, after: &ImuData, t: TimeStamp) -> Vector3<f32> {
    let (Some(t0), Some(t1)) = (before.timestamp, after.timestamp) else {
        return before.rates();
    };
    if t1 <= t0 {
        return before.rates();
    }
    let alpha = ((t as f32 - t0 as f32) / (t1 - t0) as f32).clamp(0.0, 1.0);
    before.rates() * (1.0 - alpha) + after.rates() * alpha
}

/// Magnitude (radians) of the relative rotation between `a` and `b`.
pub fn rotation_angle_between(a: &Rotation3<f32>, b: &Rotation3<f32>) -> f32 {
    (a.inverse() * b).angle()
}

// ────────────────────────────────────────────────────────────────────────────
// VisionPoseData
// ────────────────────────────────────────────────────────────────────────────

/// Pose bracket for one captured image, supplied by the pose-history
/// subsystem.  Carries its own snapshot of the IMU history so the corrector
/// never touches the live buffer.
#[derive(Debug, Clone)]
pub struct VisionPoseData {
    /// Capture time of the image this pose belongs to.
    pub timestamp: TimeStamp,
    /// Camera orientation (camera → world) at `timestamp`.
    pub camera_rotation: Rotation3<f32>,
    pub head_angle_rad: f32,
    pub imu_data_history: ImuDataHistory,
}

impl VisionPoseData {
    pub fn new(
        timestamp: TimeStamp,
        body_yaw_rad: f32,
        head_angle_rad: f32,
        imu_data_history: ImuDataHistory,
    ) -> Self {
        Self {
            timestamp,
            camera_rotation: camera_rotation(body_yaw_rad, head_angle_rad),
            head_angle_rad,
            imu_data_history,
        }
    }

    /// A zero timestamp marks "no pose yet" (e.g. before the first frame).
    pub fn is_valid(&self) -> bool {
        self.timestamp > 0
    }
}

impl Default for VisionPoseData {
    fn default() -> Self {
        Self {
            timestamp: 0,
            camera_rotation: camera_to_robot_rotation(),
            head_angle_rad: 0.0,
            imu_data_history: ImuDataHistory::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
