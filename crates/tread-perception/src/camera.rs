use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics of the head camera.  Shared read-only (behind an `Arc`)
/// by everything that needs to project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraCalibration {
    pub width: u32,
    pub height: u32,
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Default for CameraCalibration {
    /// QVGA head camera.
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fx: 290.0,
            fy: 290.0,
            cx: 160.0,
            cy: 120.0,
        }
    }
}

impl CameraCalibration {
    /// Camera matrix `K`.
    pub fn intrinsics(&self) -> Matrix3<f32> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Closed-form `K⁻¹`.  Focal lengths must be non-zero.
    pub fn inverse_intrinsics(&self) -> Matrix3<f32> {
        Matrix3::new(
            1.0 / self.fx, 0.0, -self.cx / self.fx, //
            0.0, 1.0 / self.fy, -self.cy / self.fy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.fx != 0.0 && self.fy != 0.0
    }
}
