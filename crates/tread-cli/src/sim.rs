//! Scripted robot for the demo loop.
//!
//! Produces what a physical robot would stream to the basestation each tick:
//! a body pose, gyro samples tagged with the line they were read on, one
//! camera frame and the occasional engine event.  The event timeline repeats
//! every [`CYCLE_TICKS`] ticks.

use image::{GrayImage, Luma};
use tread_types::{EngineEvent, MotorId, OffTreadsState, TimeStamp};

pub const CYCLE_TICKS: u64 = 120;

/// Sensor lines the gyro is sampled on during each frame.
const IMU_LINES: [u8; 3] = [0, 120, 239];

const HEAD_ANGLE_RAD: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub rate_x: f32,
    pub rate_y: f32,
    pub rate_z: f32,
    pub line2_number: u8,
}

/// Everything the robot sends for one tick.
pub struct SimFrame {
    pub image_id: u32,
    pub timestamp: TimeStamp,
    pub body_yaw_rad: f32,
    pub head_angle_rad: f32,
    pub imu: Vec<ImuSample>,
    pub image: GrayImage,
    pub events: Vec<EngineEvent>,
}

pub struct SimRobot {
    tick: u64,
    tick_interval_ms: u64,
    width: u32,
    height: u32,
    yaw: f32,
    held: bool,
}

impl SimRobot {
    pub fn new(tick_interval_ms: u64, width: u32, height: u32) -> Self {
        Self {
            tick: 0,
            tick_interval_ms,
            width,
            height,
            yaw: 0.0,
            held: false,
        }
    }

    pub fn step(&mut self) -> SimFrame {
        self.tick += 1;
        let timestamp = TimeStamp::try_from(self.tick * self.tick_interval_ms).unwrap_or(TimeStamp::MAX);
        let events = scripted_events(self.tick % CYCLE_TICKS, timestamp);
        for event in &events {
            if let EngineEvent::RobotOffTreadsStateChanged { current, .. } = event {
                self.held = *current != OffTreadsState::OnTreads;
            }
        }

        let yaw_rate = 0.6 * (self.tick as f32 * 0.2).sin();
        self.yaw += yaw_rate * self.tick_interval_ms as f32 / 1000.0;

        let imu = IMU_LINES
            .iter()
            .map(|&line2_number| ImuSample {
                rate_x: 0.0,
                rate_y: 0.0,
                rate_z: yaw_rate,
                line2_number,
            })
            .collect();

        SimFrame {
            image_id: u32::try_from(self.tick).unwrap_or(u32::MAX),
            timestamp,
            body_yaw_rad: self.yaw,
            head_angle_rad: HEAD_ANGLE_RAD,
            imu,
            image: self.render(),
            events,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Diagonal stripes; mostly dark while the robot is held and the lens
    /// is covered.
    fn render(&self) -> GrayImage {
        let phase = (self.tick * 4 % 256) as u32;
        let held = self.held;
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let v = ((x + y + phase) % 256) as u8;
            Luma([if held { v / 16 } else { v }])
        })
    }
}

fn scripted_events(phase: u64, timestamp: TimeStamp) -> Vec<EngineEvent> {
    match phase {
        15 => vec![EngineEvent::CliffEvent {
            detected: true,
            timestamp,
        }],
        18 => vec![EngineEvent::CliffEvent {
            detected: false,
            timestamp,
        }],
        35 => vec![EngineEvent::RobotOffTreadsStateChanged {
            previous: OffTreadsState::OnTreads,
            current: OffTreadsState::InAir,
        }],
        45 => vec![EngineEvent::RobotOffTreadsStateChanged {
            previous: OffTreadsState::InAir,
            current: OffTreadsState::OnTreads,
        }],
        60 => vec![EngineEvent::MotorCalibration {
            motor: MotorId::Head,
            calib_started: true,
            auto_started: true,
        }],
        63 => vec![EngineEvent::MotorCalibration {
            motor: MotorId::Head,
            calib_started: false,
            auto_started: true,
        }],
        75 => vec![EngineEvent::ChargerEvent { on_charger: true }],
        95 => vec![EngineEvent::ChargerEvent { on_charger: false }],
        105 => vec![EngineEvent::UnexpectedMovement { timestamp }],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_numbered_and_stamped() {
        let mut sim = SimRobot::new(60, 32, 24);
        let a = sim.step();
        let b = sim.step();
        assert_eq!((a.image_id, a.timestamp), (1, 60));
        assert_eq!((b.image_id, b.timestamp), (2, 120));
        assert_eq!(a.imu.len(), 3);
        assert_eq!(a.image.dimensions(), (32, 24));
    }

    #[test]
    fn cliff_fires_once_per_cycle() {
        let mut sim = SimRobot::new(60, 8, 8);
        let cliffs = (0..CYCLE_TICKS)
            .flat_map(|_| sim.step().events)
            .filter(|e| matches!(e, EngineEvent::CliffEvent { detected: true, .. }))
            .count();
        assert_eq!(cliffs, 1);
        assert_eq!(sim.tick(), CYCLE_TICKS);
    }

    #[test]
    fn image_darkens_while_held() {
        let mut sim = SimRobot::new(60, 16, 16);
        let mean = |img: &GrayImage| img.pixels().map(|p| u32::from(p[0])).sum::<u32>() / 256;

        let before = (0..34).map(|_| sim.step()).last().unwrap();
        let held = (0..2).map(|_| sim.step()).last().unwrap();
        assert!(mean(&held.image) < mean(&before.image));
    }
}
