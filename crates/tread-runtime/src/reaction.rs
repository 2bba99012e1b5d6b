//! Reaction-trigger strategies.
//!
//! A strategy watches a fixed set of engine events and decides whether its
//! reaction should pre-empt whatever the robot is doing.  Events are pushed in
//! with [`ReactionTriggerStrategy::always_handle`]; the behavior manager polls
//! [`ReactionTriggerStrategy::should_trigger_behavior`] once per tick.
//!
//! Between the two sits a one-slot latch:
//!
//! ```text
//!            always_handle (wants)           should_trigger_behavior
//!   Idle ───────────────────────────▶ Latched ───────────────────────▶ Idle
//!     ▲            (overwrites)          │
//!     └──────────────────────────────────┘ clear_pending (reaction disabled)
//! ```
//!
//! A poll always empties the latch, so one event fires a reaction at most once.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use tread_types::{EngineEvent, EngineEventTag, OffTreadsState, ReactionTrigger};

use crate::behavior::Behavior;
use crate::robot::Robot;

/// How a reaction interacts with what it interrupts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionPolicy {
    /// Return to the interrupted behavior once the reaction finishes.
    pub should_resume_last_behavior: bool,
    /// May fire while a different reaction is running.
    pub can_interrupt_other_triggered_behavior: bool,
    /// May restart its own reaction while it is running.
    pub can_interrupt_self: bool,
}

/// Maps a reaction trigger to the registered behavior that handles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionConfig {
    pub trigger: ReactionTrigger,
    pub behavior: String,
}

/// State every strategy carries: identity, subscriptions, policy and the
/// pending-event latch.
#[derive(Debug, Clone)]
pub struct StrategyCore {
    trigger: ReactionTrigger,
    name: String,
    tags: Vec<EngineEventTag>,
    policy: ReactionPolicy,
    pending: Option<EngineEvent>,
}

impl StrategyCore {
    pub fn new(
        trigger: ReactionTrigger,
        name: impl Into<String>,
        tags: &[EngineEventTag],
        policy: ReactionPolicy,
    ) -> Self {
        Self {
            trigger,
            name: name.into(),
            tags: tags.to_vec(),
            policy,
            pending: None,
        }
    }

    pub fn subscribes_to(&self, tag: EngineEventTag) -> bool {
        self.tags.contains(&tag)
    }

    fn latch(&mut self, event: &EngineEvent) {
        if self.pending.is_some() {
            debug!(strategy = %self.name, "pending reaction event overwritten");
        }
        self.pending = Some(event.clone());
    }
}

pub trait ReactionTriggerStrategy: Send {
    fn core(&self) -> &StrategyCore;

    fn core_mut(&mut self) -> &mut StrategyCore;

    /// Strategy-specific filter: should this (subscribed) event arm the
    /// reaction?
    fn wants_trigger(&mut self, event: &EngineEvent, robot: &Robot) -> bool;

    fn trigger(&self) -> ReactionTrigger {
        self.core().trigger
    }

    fn name(&self) -> &str {
        &self.core().name
    }

    fn subscribed_tags(&self) -> &[EngineEventTag] {
        &self.core().tags
    }

    /// Feed an engine event to the strategy.  Events outside the
    /// subscription set are logged and dropped.
    fn always_handle(&mut self, event: &EngineEvent, robot: &Robot) {
        let tag = event.tag();
        if !self.core().subscribes_to(tag) {
            error!(strategy = self.name(), tag = ?tag, "ReactionTriggerStrategy.BadEventType");
            return;
        }
        if self.wants_trigger(event, robot) {
            self.core_mut().latch(event);
        }
    }

    /// Consume the latch.  True when an event was pending and `behavior` can
    /// run right now.
    fn should_trigger_behavior(&mut self, robot: &Robot, behavior: &dyn Behavior) -> bool {
        let latched = self.core_mut().pending.take().is_some();
        latched && behavior.is_runnable(robot)
    }

    fn has_pending(&self) -> bool {
        self.core().pending.is_some()
    }

    fn pending_event(&self) -> Option<&EngineEvent> {
        self.core().pending.as_ref()
    }

    fn clear_pending(&mut self) {
        self.core_mut().pending = None;
    }

    fn should_resume_last_behavior(&self) -> bool {
        self.core().policy.should_resume_last_behavior
    }

    fn can_interrupt_other_triggered_behavior(&self) -> bool {
        self.core().policy.can_interrupt_other_triggered_behavior
    }

    fn can_interrupt_self(&self) -> bool {
        self.core().policy.can_interrupt_self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Fires when a cliff sensor reports a drop ahead.
pub struct CliffDetectedStrategy {
    core: StrategyCore,
}

impl Default for CliffDetectedStrategy {
    fn default() -> Self {
        Self {
            core: StrategyCore::new(
                ReactionTrigger::CliffDetected,
                "CliffDetected",
                &[EngineEventTag::CliffEvent],
                ReactionPolicy {
                    should_resume_last_behavior: false,
                    can_interrupt_other_triggered_behavior: true,
                    can_interrupt_self: false,
                },
            ),
        }
    }
}

impl ReactionTriggerStrategy for CliffDetectedStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn wants_trigger(&mut self, event: &EngineEvent, _robot: &Robot) -> bool {
        matches!(event, EngineEvent::CliffEvent { detected: true, .. })
    }
}

/// Fires when a motor begins calibrating, unless the robot is being held.
pub struct MotorCalibrationStrategy {
    core: StrategyCore,
}

impl Default for MotorCalibrationStrategy {
    fn default() -> Self {
        Self {
            core: StrategyCore::new(
                ReactionTrigger::MotorCalibration,
                "MotorCalibration",
                &[EngineEventTag::MotorCalibration],
                ReactionPolicy {
                    should_resume_last_behavior: true,
                    can_interrupt_other_triggered_behavior: true,
                    can_interrupt_self: false,
                },
            ),
        }
    }
}

impl ReactionTriggerStrategy for MotorCalibrationStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn wants_trigger(&mut self, event: &EngineEvent, robot: &Robot) -> bool {
        matches!(
            event,
            EngineEvent::MotorCalibration {
                calib_started: true,
                ..
            }
        ) && !robot.is_picked_up()
    }
}

/// Fires when the robot moves without having been told to.  Ignored while
/// it is off its treads, where any motion is expected.
pub struct UnexpectedMovementStrategy {
    core: StrategyCore,
}

impl Default for UnexpectedMovementStrategy {
    fn default() -> Self {
        Self {
            core: StrategyCore::new(
                ReactionTrigger::UnexpectedMovement,
                "UnexpectedMovement",
                &[EngineEventTag::UnexpectedMovement],
                ReactionPolicy {
                    should_resume_last_behavior: true,
                    can_interrupt_other_triggered_behavior: true,
                    can_interrupt_self: false,
                },
            ),
        }
    }
}

impl ReactionTriggerStrategy for UnexpectedMovementStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn wants_trigger(&mut self, event: &EngineEvent, robot: &Robot) -> bool {
        matches!(event, EngineEvent::UnexpectedMovement { .. }) && robot.is_on_treads()
    }
}

/// Fires on the transition from any off-treads state back onto the treads.
pub struct ReturnedToTreadsStrategy {
    core: StrategyCore,
}

impl Default for ReturnedToTreadsStrategy {
    fn default() -> Self {
        Self {
            core: StrategyCore::new(
                ReactionTrigger::ReturnedToTreads,
                "ReturnedToTreads",
                &[EngineEventTag::RobotOffTreadsStateChanged],
                ReactionPolicy {
                    should_resume_last_behavior: true,
                    can_interrupt_other_triggered_behavior: true,
                    can_interrupt_self: false,
                },
            ),
        }
    }
}

impl ReactionTriggerStrategy for ReturnedToTreadsStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn wants_trigger(&mut self, event: &EngineEvent, _robot: &Robot) -> bool {
        matches!(
            event,
            EngineEvent::RobotOffTreadsStateChanged { previous, current }
                if *current == OffTreadsState::OnTreads && *previous != OffTreadsState::OnTreads
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GenericStrategy
// ─────────────────────────────────────────────────────────────────────────────

type WantsFn = Box<dyn FnMut(&EngineEvent, &Robot) -> bool + Send>;

/// A strategy assembled from a tag set and a predicate, for reactions whose
/// rule fits in one closure.
pub struct GenericStrategy {
    core: StrategyCore,
    wants: WantsFn,
}

impl GenericStrategy {
    pub fn new(
        trigger: ReactionTrigger,
        name: impl Into<String>,
        tags: &[EngineEventTag],
        policy: ReactionPolicy,
        wants: impl FnMut(&EngineEvent, &Robot) -> bool + Send + 'static,
    ) -> Self {
        Self {
            core: StrategyCore::new(trigger, name, tags, policy),
            wants: Box::new(wants),
        }
    }
}

impl ReactionTriggerStrategy for GenericStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn wants_trigger(&mut self, event: &EngineEvent, robot: &Robot) -> bool {
        (self.wants)(event, robot)
    }
}

/// Built-in strategy for `trigger`.
pub fn create_strategy(trigger: ReactionTrigger) -> Box<dyn ReactionTriggerStrategy> {
    match trigger {
        ReactionTrigger::CliffDetected => Box::new(CliffDetectedStrategy::default()),
        ReactionTrigger::MotorCalibration => Box::new(MotorCalibrationStrategy::default()),
        ReactionTrigger::UnexpectedMovement => Box::new(UnexpectedMovementStrategy::default()),
        ReactionTrigger::ReturnedToTreads => Box::new(ReturnedToTreadsStrategy::default()),
        ReactionTrigger::RobotPickedUp => Box::new(GenericStrategy::new(
            trigger,
            "RobotPickedUp",
            &[EngineEventTag::RobotOffTreadsStateChanged],
            ReactionPolicy {
                should_resume_last_behavior: true,
                can_interrupt_other_triggered_behavior: true,
                can_interrupt_self: false,
            },
            |event, _robot| {
                matches!(
                    event,
                    EngineEvent::RobotOffTreadsStateChanged {
                        previous: OffTreadsState::OnTreads,
                        current: OffTreadsState::InAir,
                    }
                )
            },
        )),
        ReactionTrigger::PlacedOnCharger => Box::new(GenericStrategy::new(
            trigger,
            "PlacedOnCharger",
            &[EngineEventTag::ChargerEvent],
            ReactionPolicy::default(),
            |event, _robot| matches!(event, EngineEvent::ChargerEvent { on_charger: true }),
        )),
        ReactionTrigger::RobotOnBack => Box::new(GenericStrategy::new(
            trigger,
            "RobotOnBack",
            &[EngineEventTag::RobotOffTreadsStateChanged],
            ReactionPolicy {
                should_resume_last_behavior: false,
                can_interrupt_other_triggered_behavior: true,
                can_interrupt_self: false,
            },
            |event, _robot| {
                matches!(
                    event,
                    EngineEvent::RobotOffTreadsStateChanged {
                        current: OffTreadsState::OnBack,
                        ..
                    }
                )
            },
        )),
    }
}
