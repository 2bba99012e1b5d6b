//! `tread-perception` – camera-side math and the vision worker.
//!
//! # Modules
//!
//! - [`pose`] – robot/camera frame conventions, gyro integration and
//!   [`VisionPoseData`][pose::VisionPoseData].
//! - [`imu_history`] – [`ImuDataHistory`][imu_history::ImuDataHistory]: bounded
//!   ring of gyro samples, time-aligned to sensor rows.
//! - [`camera`] – pinhole [`CameraCalibration`][camera::CameraCalibration].
//! - [`config`] – [`CalibrationConfig`][config::CalibrationConfig] and the
//!   warp model selector.
//! - [`rolling_shutter`] –
//!   [`RollingShutterCorrector`][rolling_shutter::RollingShutterCorrector]:
//!   per-band warps that undo rolling-shutter skew.
//! - [`mailbox`] – single-slot latest-wins hand-off cell.
//! - [`vision_thread`] –
//!   [`VisionProcessingThread`][vision_thread::VisionProcessingThread] and the
//!   built-in illumination processor.

pub mod camera;
pub mod config;
pub mod imu_history;
pub mod mailbox;
pub mod pose;
pub mod rolling_shutter;
pub mod vision_thread;

pub use camera::CameraCalibration;
pub use config::{CalibrationConfig, WarpModel};
pub use imu_history::{ImuData, ImuDataHistory};
pub use pose::VisionPoseData;
pub use rolling_shutter::RollingShutterCorrector;
