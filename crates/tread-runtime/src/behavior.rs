//! The behavior interface and its lifecycle.
//!
//! A behavior is anything the robot can be "doing": driving away from a cliff,
//! looking around, recalibrating.  The manager drives every behavior through
//! an explicit state machine:
//!
//! | From | Transition | To |
//! |---|---|---|
//! | `Idle` | `Init` | `Running` |
//! | `Stopped` | `Init` | `Running` |
//! | `Running` | `Update` | `Running` |
//! | `Running` | `Stop` | `Stopped` |
//!
//! Anything not in the table is rejected by [`ManagedBehavior`].

use tracing::{debug, warn};
use tread_types::{ReactionTrigger, TreadError};

use crate::robot::Robot;

/// Result of one behavior update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorStatus {
    Running,
    Complete,
    Failure,
}

pub trait Behavior: Send {
    fn id(&self) -> &str;

    /// Whether the behavior could start right now.  Must not mutate anything.
    fn is_runnable(&self, robot: &Robot) -> bool;

    fn init(&mut self, robot: &mut Robot) -> Result<(), TreadError>;

    fn update(&mut self, robot: &mut Robot) -> BehaviorStatus;

    fn stop(&mut self, robot: &mut Robot);

    /// Pick up again after a reaction interrupted this behavior.  Behaviors
    /// without resumable state simply start over.
    fn resume(&mut self, robot: &mut Robot, _reason: ReactionTrigger) -> Result<(), TreadError> {
        self.init(robot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorTransition {
    Init,
    Update,
    Stop,
}

/// Lifecycle transition table.  `None` means the transition is not allowed.
pub fn next_state(state: BehaviorState, transition: BehaviorTransition) -> Option<BehaviorState> {
    use BehaviorState::*;
    use BehaviorTransition::*;
    match (state, transition) {
        (Idle | Stopped, Init) => Some(Running),
        (Running, Update) => Some(Running),
        (Running, Stop) => Some(Stopped),
        _ => None,
    }
}

/// A registered behavior plus the lifecycle state the manager tracks for it.
pub struct ManagedBehavior {
    behavior: Box<dyn Behavior>,
    state: BehaviorState,
}

impl ManagedBehavior {
    pub fn new(behavior: Box<dyn Behavior>) -> Self {
        Self {
            behavior,
            state: BehaviorState::Idle,
        }
    }

    pub fn id(&self) -> &str {
        self.behavior.id()
    }

    pub fn state(&self) -> BehaviorState {
        self.state
    }

    pub fn behavior(&self) -> &dyn Behavior {
        self.behavior.as_ref()
    }

    pub fn is_runnable(&self, robot: &Robot) -> bool {
        self.behavior.is_runnable(robot)
    }

    pub fn init(&mut self, robot: &mut Robot) -> Result<(), TreadError> {
        let next = self.check(BehaviorTransition::Init)?;
        self.behavior.init(robot)?;
        self.state = next;
        Ok(())
    }

    pub fn resume(&mut self, robot: &mut Robot, reason: ReactionTrigger) -> Result<(), TreadError> {
        let next = self.check(BehaviorTransition::Init)?;
        self.behavior.resume(robot, reason)?;
        self.state = next;
        Ok(())
    }

    /// A behavior that is not running reports `Failure` without being called.
    pub fn update(&mut self, robot: &mut Robot) -> BehaviorStatus {
        if next_state(self.state, BehaviorTransition::Update).is_none() {
            warn!(behavior = self.id(), state = ?self.state, "ManagedBehavior.Update.NotRunning");
            return BehaviorStatus::Failure;
        }
        self.behavior.update(robot)
    }

    /// Stopping a behavior that is not running is a no-op.
    pub fn stop(&mut self, robot: &mut Robot) {
        match next_state(self.state, BehaviorTransition::Stop) {
            Some(next) => {
                self.behavior.stop(robot);
                self.state = next;
            }
            None => debug!(behavior = self.id(), state = ?self.state, "stop ignored"),
        }
    }

    fn check(&self, transition: BehaviorTransition) -> Result<BehaviorState, TreadError> {
        next_state(self.state, transition).ok_or_else(|| TreadError::BehaviorInitFailed {
            behavior: self.id().to_string(),
            details: format!("{transition:?} not allowed from {:?}", self.state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        fail_init: bool,
    }

    impl Behavior for Probe {
        fn id(&self) -> &str {
            "Probe"
        }
        fn is_runnable(&self, _robot: &Robot) -> bool {
            true
        }
        fn init(&mut self, _robot: &mut Robot) -> Result<(), TreadError> {
            if self.fail_init {
                return Err(TreadError::BehaviorInitFailed {
                    behavior: "Probe".into(),
                    details: "refused".into(),
                });
            }
            Ok(())
        }
        fn update(&mut self, _robot: &mut Robot) -> BehaviorStatus {
            BehaviorStatus::Running
        }
        fn stop(&mut self, _robot: &mut Robot) {}
    }

    fn managed(fail_init: bool) -> ManagedBehavior {
        ManagedBehavior::new(Box::new(Probe { fail_init }))
    }

    #[test]
    fn transition_table() {
        use BehaviorState::*;
        use BehaviorTransition::*;
        assert_eq!(next_state(Idle, Init), Some(Running));
        assert_eq!(next_state(Stopped, Init), Some(Running));
        assert_eq!(next_state(Running, Update), Some(Running));
        assert_eq!(next_state(Running, Stop), Some(Stopped));
        assert_eq!(next_state(Running, Init), None);
        assert_eq!(next_state(Idle, Update), None);
        assert_eq!(next_state(Stopped, Stop), None);
    }

    #[test]
    fn lifecycle_round_trip() {
        let mut robot = Robot::new();
        let mut b = managed(false);
        assert_eq!(b.state(), BehaviorState::Idle);

        b.init(&mut robot).unwrap();
        assert_eq!(b.state(), BehaviorState::Running);
        assert_eq!(b.update(&mut robot), BehaviorStatus::Running);

        b.stop(&mut robot);
        assert_eq!(b.state(), BehaviorState::Stopped);

        // Restart after stopping goes through resume's default (init).
        b.resume(&mut robot, ReactionTrigger::CliffDetected).unwrap();
        assert_eq!(b.state(), BehaviorState::Running);
    }

    #[test]
    fn double_init_is_rejected() {
        let mut robot = Robot::new();
        let mut b = managed(false);
        b.init(&mut robot).unwrap();
        assert!(matches!(
            b.init(&mut robot),
            Err(TreadError::BehaviorInitFailed { .. })
        ));
        assert_eq!(b.state(), BehaviorState::Running);
    }

    #[test]
    fn failed_init_leaves_state_unchanged() {
        let mut robot = Robot::new();
        let mut b = managed(true);
        assert!(b.init(&mut robot).is_err());
        assert_eq!(b.state(), BehaviorState::Idle);
    }

    #[test]
    fn update_when_not_running_fails() {
        let mut robot = Robot::new();
        let mut b = managed(false);
        assert_eq!(b.update(&mut robot), BehaviorStatus::Failure);
        // Stop before init does not call into the behavior.
        b.stop(&mut robot);
        assert_eq!(b.state(), BehaviorState::Idle);
    }
}
