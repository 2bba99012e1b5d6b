//! The robot as seen by the behavior system.
//!
//! Arbitration only ever mutates the robot through two doors: queueing actions
//! and stopping every motor.  Everything else here is state mirrored from
//! engine events so strategies and behaviors can make decisions.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;
use tread_types::{EngineEvent, MotorId, OffTreadsState, TimeStamp};

/// Commands a behavior can ask the robot to carry out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobotAction {
    StopAllMotors,
    DriveStraight { distance_mm: f32, speed_mmps: f32 },
    TurnInPlace { angle_rad: f32 },
    MoveHeadToAngle { angle_rad: f32 },
    MoveLiftToHeight { height_mm: f32 },
    PlayAnimation(String),
}

#[derive(Debug, Clone, Default)]
pub struct Robot {
    last_msg_timestamp: TimeStamp,
    body_yaw_rad: f32,
    head_angle_rad: f32,
    off_treads_state: OffTreadsState,
    cliff_detected: bool,
    on_charger: bool,
    calibrating_motors: HashSet<MotorId>,
    actions: VecDeque<RobotAction>,
}

impl Robot {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // State mirrored from the robot
    // -------------------------------------------------------------------------

    /// Fold an engine event into the mirrored state.
    pub fn apply_engine_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::CliffEvent { detected, timestamp } => {
                self.cliff_detected = *detected;
                self.last_msg_timestamp = self.last_msg_timestamp.max(*timestamp);
            }
            EngineEvent::MotorCalibration {
                motor,
                calib_started,
                ..
            } => {
                if *calib_started {
                    self.calibrating_motors.insert(*motor);
                } else {
                    self.calibrating_motors.remove(motor);
                }
            }
            EngineEvent::UnexpectedMovement { timestamp } => {
                self.last_msg_timestamp = self.last_msg_timestamp.max(*timestamp);
            }
            EngineEvent::RobotOffTreadsStateChanged { current, .. } => {
                self.off_treads_state = *current;
            }
            EngineEvent::ChargerEvent { on_charger } => self.on_charger = *on_charger,
            EngineEvent::RobotStopped { .. } => {}
        }
    }

    pub fn set_pose(&mut self, body_yaw_rad: f32, head_angle_rad: f32) {
        self.body_yaw_rad = body_yaw_rad;
        self.head_angle_rad = head_angle_rad;
    }

    pub fn body_yaw_rad(&self) -> f32 {
        self.body_yaw_rad
    }

    pub fn head_angle_rad(&self) -> f32 {
        self.head_angle_rad
    }

    pub fn set_last_msg_timestamp(&mut self, t: TimeStamp) {
        self.last_msg_timestamp = t;
    }

    pub fn last_msg_timestamp(&self) -> TimeStamp {
        self.last_msg_timestamp
    }

    pub fn off_treads_state(&self) -> OffTreadsState {
        self.off_treads_state
    }

    pub fn is_on_treads(&self) -> bool {
        self.off_treads_state == OffTreadsState::OnTreads
    }

    pub fn is_picked_up(&self) -> bool {
        matches!(
            self.off_treads_state,
            OffTreadsState::InAir | OffTreadsState::Falling
        )
    }

    pub fn is_cliff_detected(&self) -> bool {
        self.cliff_detected
    }

    pub fn is_on_charger(&self) -> bool {
        self.on_charger
    }

    pub fn is_motor_calibrating(&self, motor: MotorId) -> bool {
        self.calibrating_motors.contains(&motor)
    }

    pub fn is_any_motor_calibrating(&self) -> bool {
        !self.calibrating_motors.is_empty()
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    pub fn queue_action(&mut self, action: RobotAction) {
        debug!(action = ?action, "Robot.QueueAction");
        self.actions.push_back(action);
    }

    /// Drop everything queued and halt all motors.
    pub fn stop_all_motors(&mut self) {
        self.actions.clear();
        self.actions.push_back(RobotAction::StopAllMotors);
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = &RobotAction> {
        self.actions.iter()
    }

    /// Hand queued actions to whatever drives the hardware.
    pub fn drain_actions(&mut self) -> Vec<RobotAction> {
        self.actions.drain(..).collect()
    }
}
