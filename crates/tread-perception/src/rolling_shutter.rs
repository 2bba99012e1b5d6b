//! Rolling-shutter correction.
//!
//! The head camera reads its sensor out one row at a time, so when the head or
//! body turns during readout the bottom of the frame sees the world a few
//! milliseconds later than the top.  The corrector splits the frame into
//! `num_divisions` horizontal bands, estimates the camera orientation at each
//! band's capture time from the gyro history, and builds a warp that maps the
//! band back to the orientation at the image timestamp.
//!
//! # Warp model
//!
//! For band `i` with camera→world rotation `Rᵢ` and reference rotation `R_ref`:
//!
//! ```text
//! Hᵢ = K · R_refᵀ · Rᵢ · K⁻¹          (observed pixel → corrected pixel)
//! shiftᵢ = centre − Hᵢ(centre)        (corrected = observed − shift)
//! ```
//!
//! [`WarpModel::PixelShift`] keeps only the translation part.
//!
//! | Band state | Warp | Shift |
//! |---|---|---|
//! | IMU samples bracket the band time | `Hᵢ` | `centre − Hᵢ(centre)` |
//! | No bracket | identity | zero |

use std::sync::Arc;

use image::{GrayImage, Luma};
use nalgebra::{Matrix3, Point2, Rotation3, Vector2, Vector3};
use tracing::{debug, trace};
use tread_types::TimeStamp;

use crate::camera::CameraCalibration;
use crate::config::{CalibrationConfig, WarpModel};
use crate::pose::{interpolate_rates, rotation_from_rates, VisionPoseData};

/// Number of row bands a frame is split into.
pub const DEFAULT_NUM_DIVISIONS: usize = 10;

/// Nominal frame period used when no earlier pose is available.
pub const TIME_BETWEEN_FRAMES_MS: f32 = 65.0;

#[derive(Debug, Clone)]
pub struct RollingShutterCorrector {
    calibration: Arc<CameraCalibration>,
    num_divisions: usize,
    time_between_frames_ms: f32,
    warp_model: WarpModel,
    warps: Vec<Matrix3<f32>>,
    pixel_shifts: Vec<Vector2<f32>>,
}

impl RollingShutterCorrector {
    pub fn new(calibration: Arc<CameraCalibration>, config: &CalibrationConfig) -> Self {
        let num_divisions = config.num_divisions.max(1);
        Self {
            calibration,
            num_divisions,
            time_between_frames_ms: config.time_between_frames_ms,
            warp_model: config.warp_model,
            warps: vec![Matrix3::identity(); num_divisions],
            pixel_shifts: vec![Vector2::zeros(); num_divisions],
        }
    }

    /// Rebuild one warp per row band for the image described by `pose_data`.
    ///
    /// `prev_pose_data` is the pose of the previous image; pass
    /// `VisionPoseData::default()` when there is none.  Bands the IMU history
    /// cannot cover fall back to identity, the rest are still computed.
    pub fn compute_warps(&mut self, pose_data: &VisionPoseData, prev_pose_data: &VisionPoseData) {
        let k = self.calibration.intrinsics();
        let k_inv = self.calibration.inverse_intrinsics();
        let centre = Point2::new(self.calibration.cx, self.calibration.cy);
        let reference_inv = pose_data.camera_rotation.inverse();

        self.warps.clear();
        self.pixel_shifts.clear();

        for (band, t) in self.band_timestamps(pose_data).into_iter().enumerate() {
            let Some(rotation) = self.compute_camera_rotation_with_image_imu(t, pose_data, prev_pose_data)
            else {
                debug!(
                    band,
                    band_time = t,
                    image_time = pose_data.timestamp,
                    "RollingShutterCorrector.ComputeWarps.NoImuData"
                );
                self.warps.push(Matrix3::identity());
                self.pixel_shifts.push(Vector2::zeros());
                continue;
            };

            let homography = k * (reference_inv * rotation).matrix() * k_inv;
            let shift = centre - project(&homography, centre);
            let warp = match self.warp_model {
                WarpModel::Projective => homography,
                WarpModel::PixelShift => translation(-shift),
            };
            trace!(band, band_time = t, shift_x = shift.x, shift_y = shift.y, "band warp");
            self.warps.push(warp);
            self.pixel_shifts.push(shift);
        }
    }

    /// Camera orientation at time `t`, integrated from the gyro.
    ///
    /// Requires IMU samples on both sides of `t`.  Rates are interpolated at
    /// `t` and integrated from whichever of the two poses is nearer in time.
    pub fn compute_camera_rotation_with_image_imu(
        &self,
        t: TimeStamp,
        pose_data: &VisionPoseData,
        prev_pose_data: &VisionPoseData,
    ) -> Option<Rotation3<f32>> {
        let (before, after) = pose_data.imu_data_history.get_imu_data_before_and_after(t)?;
        let rates = interpolate_rates(&before, &after, t);

        let anchor = if has_earlier_pose(pose_data, prev_pose_data)
            && t.abs_diff(prev_pose_data.timestamp) < t.abs_diff(pose_data.timestamp)
        {
            prev_pose_data
        } else {
            pose_data
        };

        let dt_s = (t as f32 - anchor.timestamp as f32) / 1000.0;
        Some(anchor.camera_rotation * rotation_from_rates(rates, dt_s))
    }

    /// Camera orientation for every band, top to bottom.  Bands without IMU
    /// coverage report the pose's own rotation.
    pub fn precompute_historical_camera_rotations(
        &self,
        pose_data: &VisionPoseData,
        prev_pose_data: &VisionPoseData,
    ) -> Vec<Rotation3<f32>> {
        self.band_timestamps(pose_data)
            .into_iter()
            .map(|t| {
                self.compute_camera_rotation_with_image_imu(t, pose_data, prev_pose_data)
                    .unwrap_or(pose_data.camera_rotation)
            })
            .collect()
    }

    /// Apply the current warps to `img`.  Each output row uses its band's
    /// inverse warp and bilinear sampling; pixels that map outside the source
    /// come out black.
    pub fn warp_image(&self, img: &GrayImage) -> GrayImage {
        let (width, height) = img.dimensions();
        let inverses: Vec<Matrix3<f32>> = self
            .warps
            .iter()
            .map(|h| h.try_inverse().unwrap_or_else(Matrix3::identity))
            .collect();

        let mut out = GrayImage::new(width, height);
        for y in 0..height {
            let inverse = &inverses[band_for_row(y, height, self.num_divisions)];
            for x in 0..width {
                let src = project(inverse, Point2::new(x as f32, y as f32));
                let value = bilinear_sample(img, src.x, src.y).unwrap_or(0.0);
                out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
            }
        }
        out
    }

    /// Move each corner of a detected quad by its band's pixel shift.
    ///
    /// Returns `false`, leaving `corners` untouched, if any corrected corner
    /// falls outside a `width × height` image.
    pub fn correct_quad(&self, corners: &mut [Point2<f32>; 4], width: u32, height: u32) -> bool {
        let mut corrected = *corners;
        for corner in corrected.iter_mut() {
            let row = corner.y.max(0.0) as u32;
            *corner -= self.pixel_shifts[band_for_row(row, height, self.num_divisions)];
            if corner.x < 0.0
                || corner.y < 0.0
                || corner.x >= width as f32
                || corner.y >= height as f32
            {
                return false;
            }
        }
        *corners = corrected;
        true
    }

    pub fn rolling_shutter_warps(&self) -> &[Matrix3<f32>] {
        &self.warps
    }

    /// Per-band translation of the image centre from the last `compute_warps`.
    pub fn pixel_shifts(&self) -> &[Vector2<f32>] {
        &self.pixel_shifts
    }

    pub fn num_divisions(&self) -> usize {
        self.num_divisions
    }

    pub fn calibration(&self) -> &CameraCalibration {
        &self.calibration
    }

    /// Capture time of each band's centre row.  Uses the configured readout
    /// period, the same one the IMU samples were stamped with, so a sensor row
    /// has one capture time whatever the spacing between frames.
    fn band_timestamps(&self, pose_data: &VisionPoseData) -> Vec<TimeStamp> {
        let period = self.time_between_frames_ms;
        let n = self.num_divisions as f32;
        (0..self.num_divisions)
            .map(|band| {
                let fraction = (band as f32 + 0.5) / n;
                pose_data
                    .imu_data_history
                    .row_timestamp(pose_data.timestamp, fraction, period)
            })
            .collect()
    }
}

/// Band index that row `y` of a `height`-row image belongs to.
pub fn band_for_row(y: u32, height: u32, num_divisions: usize) -> usize {
    if height == 0 || num_divisions == 0 {
        return 0;
    }
    ((y as usize * num_divisions) / height as usize).min(num_divisions - 1)
}

fn has_earlier_pose(pose_data: &VisionPoseData, prev_pose_data: &VisionPoseData) -> bool {
    prev_pose_data.is_valid() && prev_pose_data.timestamp < pose_data.timestamp
}

/// Project a pixel through a homography.  Points at infinity map to NaN.
fn project(h: &Matrix3<f32>, p: Point2<f32>) -> Point2<f32> {
    let q = h * Vector3::new(p.x, p.y, 1.0);
    if q.z.abs() < f32::EPSILON {
        return Point2::new(f32::NAN, f32::NAN);
    }
    Point2::new(q.x / q.z, q.y / q.z)
}

fn translation(offset: Vector2<f32>) -> Matrix3<f32> {
    Matrix3::new(
        1.0, 0.0, offset.x, //
        0.0, 1.0, offset.y, //
        0.0, 0.0, 1.0,
    )
}

/// Bilinear sample in raw intensity units.  The last row and column are
/// reachable exactly; anything beyond them (or NaN) is `None`.
fn bilinear_sample(img: &GrayImage, x: f32, y: f32) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    if !(x >= 0.0 && y >= 0.0 && x <= (w - 1) as f32 && y <= (h - 1) as f32) {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let p00 = img.get_pixel(x0, y0)[0] as f32;
    let p10 = img.get_pixel(x1, y0)[0] as f32;
    let p01 = img.get_pixel(x0, y1)[0] as f32;
    let p11 = img.get_pixel(x1, y1)[0] as f32;
    Some(
        (1.0 - fx) * (1.0 - fy) * p00
            + fx * (1.0 - fy) * p10
            + (1.0 - fx) * fy * p01
            + fx * fy * p11,
    )
}
