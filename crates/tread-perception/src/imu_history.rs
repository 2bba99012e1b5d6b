//! Bounded history of gyro samples, time-aligned to camera rows.
//!
//! The robot reports gyro rates tagged with the id of the image being exposed
//! and the sensor line (`line2_number`, 0–255 in coarse row units) that was
//! being read out at the time.  Once the capture time of that image is known,
//! [`ImuDataHistory::calculate_timestamp_for_image_imu`] converts each sample's
//! line number into an absolute basestation timestamp:
//!
//! ```text
//! ts = t_image − image_timestamp_offset_ms + (line2_number / height) · period
//! ```
//!
//! # Example
//!
//! ```rust
//! use tread_perception::imu_history::ImuDataHistory;
//!
//! let mut history = ImuDataHistory::new();
//! history.add_imu_data(7, 0.0, 0.0, 0.5, 0);
//! history.add_imu_data(7, 0.0, 0.0, 0.6, 120);
//! history.calculate_timestamp_for_image_imu(7, 1000, 65.0, 240);
//!
//! let stamps: Vec<_> = history.iter().map(|d| d.timestamp).collect();
//! assert_eq!(stamps, vec![Some(945), Some(978)]);
//! ```

use std::collections::VecDeque;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::warn;
use tread_types::TimeStamp;

use crate::config::CalibrationConfig;

/// Default ring capacity.
pub const MAX_SIZE_OF_HISTORY: usize = 20;

/// Delay between the start of exposure and the timestamp the robot stamps on
/// an image, in milliseconds.
pub const IMAGE_TIMESTAMP_OFFSET_MS: u32 = 55;

/// One gyro sample.  Rates are robot-frame, rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuData {
    pub image_id: u32,
    pub rate_x: f32,
    pub rate_y: f32,
    pub rate_z: f32,
    pub line2_number: u8,
    /// Filled in once the owning image's capture time is known.
    pub timestamp: Option<TimeStamp>,
}

impl ImuData {
    pub fn rates(&self) -> Vector3<f32> {
        Vector3::new(self.rate_x, self.rate_y, self.rate_z)
    }
}

#[derive(Debug, Clone)]
pub struct ImuDataHistory {
    history: VecDeque<ImuData>,
    capacity: usize,
    image_timestamp_offset_ms: u32,
}

impl Default for ImuDataHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ImuDataHistory {
    pub fn new() -> Self {
        Self::with_settings(MAX_SIZE_OF_HISTORY, IMAGE_TIMESTAMP_OFFSET_MS)
    }

    /// A zero `capacity` is bumped to one so the newest sample is always kept.
    pub fn with_settings(capacity: usize, image_timestamp_offset_ms: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            capacity,
            image_timestamp_offset_ms,
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::with_settings(config.max_imu_history, config.image_timestamp_offset_ms)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest ones once capacity is exceeded.
    pub fn add_imu_data(
        &mut self,
        image_id: u32,
        rate_x: f32,
        rate_y: f32,
        rate_z: f32,
        line2_number: u8,
    ) {
        if let Some(last) = self.history.back() {
            if image_id < last.image_id {
                warn!(
                    image_id,
                    last_image_id = last.image_id,
                    "ImuDataHistory.AddImuData.OutOfOrder"
                );
            }
        }

        self.history.push_back(ImuData {
            image_id,
            rate_x,
            rate_y,
            rate_z,
            line2_number,
            timestamp: None,
        });

        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    /// Stamp every buffered sample that belongs to `image_id`.
    ///
    /// `t` is the image timestamp, `time_between_frames_ms` the frame period and
    /// `height` the number of sensor lines `line2_number` is measured against.
    /// Re-running with the same arguments produces the same stamps.
    pub fn calculate_timestamp_for_image_imu(
        &mut self,
        image_id: u32,
        t: TimeStamp,
        time_between_frames_ms: f32,
        height: u32,
    ) {
        if height == 0 {
            warn!(image_id, "ImuDataHistory.CalculateTimestampForImageIMU.ZeroHeight");
            return;
        }

        let offset = self.image_timestamp_offset_ms;
        for data in self.history.iter_mut().filter(|d| d.image_id == image_id) {
            let fraction = f64::from(data.line2_number) / f64::from(height);
            data.timestamp = Some(exposure_time(t, offset, fraction, time_between_frames_ms));
        }
    }

    /// Capture time of the sensor row at `row_fraction` (0 = top, 1 = bottom)
    /// for an image stamped `t`.  Uses the same mapping as the IMU stamps.
    pub fn row_timestamp(&self, t: TimeStamp, row_fraction: f32, time_between_frames_ms: f32) -> TimeStamp {
        let fraction = f64::from(row_fraction.clamp(0.0, 1.0));
        exposure_time(t, self.image_timestamp_offset_ms, fraction, time_between_frames_ms)
    }

    /// The latest stamped sample at or before `t` and the earliest at or after
    /// it.  `None` unless both exist.
    pub fn get_imu_data_before_and_after(&self, t: TimeStamp) -> Option<(ImuData, ImuData)> {
        let mut before: Option<(TimeStamp, ImuData)> = None;
        let mut after: Option<(TimeStamp, ImuData)> = None;

        for data in &self.history {
            let Some(ts) = data.timestamp else { continue };
            if ts <= t && before.is_none_or(|(b, _)| ts >= b) {
                before = Some((ts, *data));
            }
            if ts >= t && after.is_none_or(|(a, _)| ts < a) {
                after = Some((ts, *data));
            }
        }

        Some((before?.1, after?.1))
    }

    /// Whether any of the last `num_to_look_back` stamped samples at or before
    /// `t` exceeds a per-axis rate threshold.  A threshold of `0.0` ignores
    /// that axis.
    pub fn is_imu_data_before_time_greater_than(
        &self,
        t: TimeStamp,
        num_to_look_back: usize,
        rate_x_thresh: f32,
        rate_y_thresh: f32,
        rate_z_thresh: f32,
    ) -> bool {
        self.history
            .iter()
            .rev()
            .filter(|d| d.timestamp.is_some_and(|ts| ts <= t))
            .take(num_to_look_back)
            .any(|d| {
                exceeds(d.rate_x, rate_x_thresh)
                    || exceeds(d.rate_y, rate_y_thresh)
                    || exceeds(d.rate_z, rate_z_thresh)
            })
    }

    /// Whether the head (pitch, `rate_y`) or body (yaw, `rate_z`) was turning
    /// faster than its limit around `t`.
    ///
    /// With `num_to_look_back > 0` the recent samples before `t` are scanned.
    /// Otherwise the samples bracketing `t` are checked, and a missing bracket
    /// counts as too fast since nothing can be said about the motion.
    pub fn was_rotating_too_fast(
        &self,
        t: TimeStamp,
        body_rad_per_sec: f32,
        head_rad_per_sec: f32,
        num_to_look_back: usize,
    ) -> bool {
        if num_to_look_back > 0 {
            return self.is_imu_data_before_time_greater_than(
                t,
                num_to_look_back,
                0.0,
                head_rad_per_sec,
                body_rad_per_sec,
            );
        }

        match self.get_imu_data_before_and_after(t) {
            Some((before, after)) => [before, after].iter().any(|d| {
                exceeds(d.rate_y, head_rad_per_sec) || exceeds(d.rate_z, body_rad_per_sec)
            }),
            None => true,
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ImuData> {
        self.history.iter()
    }

    pub fn front(&self) -> Option<&ImuData> {
        self.history.front()
    }

    pub fn back(&self) -> Option<&ImuData> {
        self.history.back()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

fn exposure_time(t: TimeStamp, offset_ms: u32, fraction: f64, period_ms: f32) -> TimeStamp {
    let ts = f64::from(t) - f64::from(offset_ms) + fraction * f64::from(period_ms);
    ts.round().clamp(0.0, f64::from(TimeStamp::MAX)) as TimeStamp
}

fn exceeds(rate: f32, threshold: f32) -> bool {
    threshold != 0.0 && rate.abs() > threshold
}
