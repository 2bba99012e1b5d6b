use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Milliseconds on the basestation clock.
pub type TimeStamp = u32;

/// Reactions the behavior system can fire in response to engine events.
///
/// Ordering matters: the behavior manager evaluates reaction strategies in
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReactionTrigger {
    CliffDetected,
    MotorCalibration,
    PlacedOnCharger,
    ReturnedToTreads,
    RobotOnBack,
    RobotPickedUp,
    UnexpectedMovement,
}

impl ReactionTrigger {
    /// Every trigger, in evaluation order.
    pub const ALL: [ReactionTrigger; 7] = [
        ReactionTrigger::CliffDetected,
        ReactionTrigger::MotorCalibration,
        ReactionTrigger::PlacedOnCharger,
        ReactionTrigger::ReturnedToTreads,
        ReactionTrigger::RobotOnBack,
        ReactionTrigger::RobotPickedUp,
        ReactionTrigger::UnexpectedMovement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionTrigger::CliffDetected => "CliffDetected",
            ReactionTrigger::MotorCalibration => "MotorCalibration",
            ReactionTrigger::PlacedOnCharger => "PlacedOnCharger",
            ReactionTrigger::ReturnedToTreads => "ReturnedToTreads",
            ReactionTrigger::RobotOnBack => "RobotOnBack",
            ReactionTrigger::RobotPickedUp => "RobotPickedUp",
            ReactionTrigger::UnexpectedMovement => "UnexpectedMovement",
        }
    }
}

impl std::fmt::Display for ReactionTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the robot is sitting on its treads, and if not, how it is being held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffTreadsState {
    #[default]
    OnTreads,
    InAir,
    Falling,
    OnBack,
    OnFace,
    OnSide,
}

/// Motors that can report a calibration cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotorId {
    Head,
    Lift,
    LeftWheel,
    RightWheel,
}

/// Closed set of event tags.  Reaction strategies subscribe by tag and the
/// dispatcher routes on exact tag equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineEventTag {
    CliffEvent,
    MotorCalibration,
    UnexpectedMovement,
    RobotOffTreadsStateChanged,
    ChargerEvent,
    RobotStopped,
}

/// Engine-side events delivered to the behavior system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum EngineEvent {
    /// A cliff sensor changed state.
    CliffEvent { detected: bool, timestamp: TimeStamp },
    /// A motor started or finished a calibration cycle.
    MotorCalibration {
        motor: MotorId,
        calib_started: bool,
        auto_started: bool,
    },
    /// The robot moved although no motion was commanded (e.g. it was pushed).
    UnexpectedMovement { timestamp: TimeStamp },
    RobotOffTreadsStateChanged {
        previous: OffTreadsState,
        current: OffTreadsState,
    },
    ChargerEvent { on_charger: bool },
    RobotStopped { reason: String },
}

impl EngineEvent {
    /// The routing tag for this event.
    pub fn tag(&self) -> EngineEventTag {
        match self {
            EngineEvent::CliffEvent { .. } => EngineEventTag::CliffEvent,
            EngineEvent::MotorCalibration { .. } => EngineEventTag::MotorCalibration,
            EngineEvent::UnexpectedMovement { .. } => EngineEventTag::UnexpectedMovement,
            EngineEvent::RobotOffTreadsStateChanged { .. } => {
                EngineEventTag::RobotOffTreadsStateChanged
            }
            EngineEvent::ChargerEvent { .. } => EngineEventTag::ChargerEvent,
            EngineEvent::RobotStopped { .. } => EngineEventTag::RobotStopped,
        }
    }
}

/// Unified event wrapper for the engine-to-game bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "tread-runtime::behavior_manager"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a freshly stamped envelope.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the engine-to-game bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// An engine event forwarded verbatim.
    Engine(EngineEvent),
    /// The active reaction changed (`None` = no reaction running).
    ReactionTriggerTransition {
        old: Option<ReactionTrigger>,
        new: Option<ReactionTrigger>,
    },
    /// The active behavior changed.
    BehaviorTransition {
        old: Option<String>,
        new: Option<String>,
    },
    /// Result of the vision thread's illumination pass over one image.
    Illumination { image_id: u32, mean_intensity: f32 },
    SystemFault { component: String, message: String },
}

/// Global error type spanning behavior arbitration, vision, and configuration.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum TreadError {
    #[error("Behavior {behavior} failed to initialise: {details}")]
    BehaviorInitFailed { behavior: String, details: String },

    #[error("Unknown behavior: {0}")]
    UnknownBehavior(String),

    #[error("Disable lock '{lock_id}' already held on {trigger}")]
    DuplicateDisableLock {
        lock_id: String,
        trigger: ReactionTrigger,
    },

    #[error("Disable lock '{0}' is not held on any reaction")]
    UnknownDisableLock(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Vision Error: {0}")]
    Vision(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_trigger_serialization_roundtrip() {
        let trigger = ReactionTrigger::UnexpectedMovement;
        let json = serde_json::to_string(&trigger).unwrap();
        assert_eq!(json, "\"UnexpectedMovement\"");
        let back: ReactionTrigger = serde_json::from_str(&json).unwrap();
        assert_eq!(trigger, back);
    }

    #[test]
    fn reaction_trigger_all_is_sorted() {
        let mut sorted = ReactionTrigger::ALL;
        sorted.sort();
        assert_eq!(sorted, ReactionTrigger::ALL);
    }

    #[test]
    fn engine_event_tags_match_variants() {
        let cliff = EngineEvent::CliffEvent {
            detected: true,
            timestamp: 10,
        };
        assert_eq!(cliff.tag(), EngineEventTag::CliffEvent);

        let off_treads = EngineEvent::RobotOffTreadsStateChanged {
            previous: OffTreadsState::InAir,
            current: OffTreadsState::OnTreads,
        };
        assert_eq!(off_treads.tag(), EngineEventTag::RobotOffTreadsStateChanged);

        let calib = EngineEvent::MotorCalibration {
            motor: MotorId::Head,
            calib_started: true,
            auto_started: false,
        };
        assert_eq!(calib.tag(), EngineEventTag::MotorCalibration);
    }

    #[test]
    fn engine_event_roundtrip() {
        let event = EngineEvent::ChargerEvent { on_charger: true };
        let json = serde_json::to_string(&event).unwrap();
        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn event_envelope_roundtrip() {
        let event = Event::new(
            "tread-runtime::behavior_manager",
            EventPayload::ReactionTriggerTransition {
                old: None,
                new: Some(ReactionTrigger::CliffDetected),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        match back.payload {
            EventPayload::ReactionTriggerTransition { old, new } => {
                assert_eq!(old, None);
                assert_eq!(new, Some(ReactionTrigger::CliffDetected));
            }
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn tread_error_display() {
        let err = TreadError::UnknownBehavior("ReactToCliff".to_string());
        assert!(err.to_string().contains("ReactToCliff"));

        let err2 = TreadError::DuplicateDisableLock {
            lock_id: "ui_game".to_string(),
            trigger: ReactionTrigger::RobotPickedUp,
        };
        assert!(err2.to_string().contains("ui_game"));
        assert!(err2.to_string().contains("RobotPickedUp"));
    }
}
