//! [`EngineContext`] – everything one basestation engine owns, wired together.
//!
//! Built once at startup and passed by reference; there are no globals.
//! The owner feeds it robot messages and calls [`EngineContext::tick`] at the
//! basestation rate:
//!
//! 1. **IMU** – [`handle_imu_data`](EngineContext::handle_imu_data) buffers gyro
//!    samples as they arrive.
//! 2. **Image** – [`set_next_image`](EngineContext::set_next_image) stamps the
//!    buffered samples, computes rolling-shutter warps, corrects the image and
//!    hands it to the vision thread.
//! 3. **Events** – [`handle_engine_event`](EngineContext::handle_engine_event)
//!    updates the robot mirror and arms reaction strategies.
//! 4. **Tick** – collect vision results, then arbitrate and update behaviors.

use std::sync::Arc;

use image::GrayImage;
use tracing::{debug, info, warn};
use tread_middleware::{EventBus, Topic};
use tread_perception::vision_thread::{IlluminationProcessor, IlluminationResult, VisionFrame, VisionProcessingThread};
use tread_perception::{CalibrationConfig, CameraCalibration, ImuDataHistory, RollingShutterCorrector, VisionPoseData};
use tread_types::{EngineEvent, Event, EventPayload, TimeStamp, TreadError};

use crate::behavior_manager::BehaviorManager;
use crate::behaviors;
use crate::reaction::ReactionConfig;
use crate::robot::Robot;

const EVENT_SOURCE: &str = "tread-runtime::engine";

/// Settings needed to build an [`EngineContext`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub calibration: CalibrationConfig,
    pub camera: CameraCalibration,
    /// Empty means the stock wiring from [`behaviors::default_reactions`].
    pub reactions: Vec<ReactionConfig>,
}

pub struct EngineContext {
    robot: Robot,
    imu_history: ImuDataHistory,
    corrector: RollingShutterCorrector,
    prev_pose: VisionPoseData,
    behavior_manager: BehaviorManager,
    bus: EventBus,
    vision: VisionProcessingThread<IlluminationResult>,
    calibration: CalibrationConfig,
    last_illumination: Option<IlluminationResult>,
    tick_count: u64,
}

impl EngineContext {
    /// # Errors
    ///
    /// [`TreadError::InvalidConfig`] for bad calibration or camera settings,
    /// [`TreadError::UnknownBehavior`] if a reaction names an unregistered
    /// behavior, [`TreadError::Vision`] if the worker thread cannot start.
    pub fn new(config: EngineConfig) -> Result<Self, TreadError> {
        config.calibration.validate()?;
        if !config.camera.is_valid() {
            return Err(TreadError::InvalidConfig(format!(
                "camera calibration is degenerate: {:?}",
                config.camera
            )));
        }

        let bus = EventBus::default();

        let mut behavior_manager = BehaviorManager::with_bus(bus.clone());
        for behavior in behaviors::builtin_behaviors() {
            behavior_manager.add_behavior(behavior)?;
        }
        for id in behaviors::default_behavior_ids() {
            behavior_manager.add_default_behavior(id)?;
        }
        let reactions = if config.reactions.is_empty() {
            behaviors::default_reactions()
        } else {
            config.reactions
        };
        behavior_manager.init_reaction_trigger_map(&reactions)?;

        let vision = VisionProcessingThread::spawn(IlluminationProcessor::default())?;

        info!(
            num_divisions = config.calibration.num_divisions,
            warp_model = ?config.calibration.warp_model,
            reactions = reactions.len(),
            "engine context initialised"
        );

        Ok(Self {
            robot: Robot::new(),
            imu_history: ImuDataHistory::from_config(&config.calibration),
            corrector: RollingShutterCorrector::new(Arc::new(config.camera), &config.calibration),
            prev_pose: VisionPoseData::default(),
            behavior_manager,
            bus,
            vision,
            calibration: config.calibration,
            last_illumination: None,
            tick_count: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Robot messages
    // -------------------------------------------------------------------------

    pub fn handle_imu_data(&mut self, image_id: u32, rate_x: f32, rate_y: f32, rate_z: f32, line2_number: u8) {
        self.imu_history
            .add_imu_data(image_id, rate_x, rate_y, rate_z, line2_number);
    }

    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        debug!(event = ?event.tag(), "engine event");
        self.robot.apply_engine_event(&event);
        self.behavior_manager.handle_event(&event, &self.robot);
    }

    /// Correct and queue a freshly captured image stamped `t`.
    ///
    /// # Errors
    ///
    /// [`TreadError::Vision`] for an empty image.
    pub fn set_next_image(&mut self, image: &GrayImage, image_id: u32, t: TimeStamp) -> Result<(), TreadError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TreadError::Vision(format!("image {image_id} is empty")));
        }

        self.imu_history.calculate_timestamp_for_image_imu(
            image_id,
            t,
            self.calibration.time_between_frames_ms,
            height,
        );

        let pose = VisionPoseData::new(
            t,
            self.robot.body_yaw_rad(),
            self.robot.head_angle_rad(),
            self.imu_history.clone(),
        );
        self.corrector.compute_warps(&pose, &self.prev_pose);
        let corrected = self.corrector.warp_image(image);
        self.prev_pose = pose;
        self.robot.set_last_msg_timestamp(t);

        if self.vision.set_next_image(VisionFrame {
            image_id,
            timestamp: t,
            image: corrected,
        }) {
            debug!(image_id, "previous image dropped before vision processed it");
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    pub fn tick(&mut self) {
        if let Some(result) = self.vision.poll_result() {
            self.bus.notify(
                Topic::Vision,
                Event::new(
                    EVENT_SOURCE,
                    EventPayload::Illumination {
                        image_id: result.image_id,
                        mean_intensity: result.mean_intensity,
                    },
                ),
            );
            self.last_illumination = Some(result);
        }

        self.behavior_manager.update(&mut self.robot);
        self.tick_count += 1;
    }

    /// Stop the running behavior and the vision thread.
    pub fn shutdown(&mut self) {
        self.behavior_manager.stop_current_behavior(&mut self.robot);
        self.vision.stop();
        self.bus.notify(
            Topic::SystemAlerts,
            Event::new(
                EVENT_SOURCE,
                EventPayload::SystemFault {
                    component: "engine".to_string(),
                    message: "shutdown".to_string(),
                },
            ),
        );
        if !self.imu_history.is_empty() {
            warn!(pending = self.imu_history.len(), "IMU samples discarded at shutdown");
        }
        info!(ticks = self.tick_count, "engine context shut down");
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut Robot {
        &mut self.robot
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn behavior_manager(&self) -> &BehaviorManager {
        &self.behavior_manager
    }

    pub fn behavior_manager_mut(&mut self) -> &mut BehaviorManager {
        &mut self.behavior_manager
    }

    pub fn corrector(&self) -> &RollingShutterCorrector {
        &self.corrector
    }

    pub fn imu_history(&self) -> &ImuDataHistory {
        &self.imu_history
    }

    pub fn last_illumination(&self) -> Option<&IlluminationResult> {
        self.last_illumination.as_ref()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
