//! Calibration settings for IMU time alignment and rolling-shutter correction.

use serde::{Deserialize, Serialize};
use tread_types::TreadError;

use crate::imu_history::{IMAGE_TIMESTAMP_OFFSET_MS, MAX_SIZE_OF_HISTORY};
use crate::rolling_shutter::{DEFAULT_NUM_DIVISIONS, TIME_BETWEEN_FRAMES_MS};

/// How a band's rotation is turned into an image-space correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarpModel {
    /// Full rotation homography `K · R · K⁻¹`.
    #[default]
    Projective,
    /// Translation by the band's centre-pixel shift only.
    PixelShift,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub image_timestamp_offset_ms: u32,
    pub time_between_frames_ms: f32,
    pub num_divisions: usize,
    pub max_imu_history: usize,
    pub warp_model: WarpModel,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            image_timestamp_offset_ms: IMAGE_TIMESTAMP_OFFSET_MS,
            time_between_frames_ms: TIME_BETWEEN_FRAMES_MS,
            num_divisions: DEFAULT_NUM_DIVISIONS,
            max_imu_history: MAX_SIZE_OF_HISTORY,
            warp_model: WarpModel::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), TreadError> {
        if self.num_divisions == 0 {
            return Err(TreadError::InvalidConfig(
                "calibration.num_divisions must be at least 1".to_string(),
            ));
        }
        if self.max_imu_history == 0 {
            return Err(TreadError::InvalidConfig(
                "calibration.max_imu_history must be at least 1".to_string(),
            ));
        }
        if !(self.time_between_frames_ms.is_finite() && self.time_between_frames_ms > 0.0) {
            return Err(TreadError::InvalidConfig(format!(
                "calibration.time_between_frames_ms must be positive, got {}",
                self.time_between_frames_ms
            )));
        }
        Ok(())
    }
}
