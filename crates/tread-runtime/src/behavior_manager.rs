//! Behavior arbitration.
//!
//! The manager owns every registered behavior and one strategy per reaction
//! trigger.  Each [`update`](BehaviorManager::update):
//!
//! 1. **Reactions** – poll strategies in trigger order.  While a reaction is
//!    running only strategies whose policy allows it are polled
//!    (`can_interrupt_self` for the same trigger,
//!    `can_interrupt_other_triggered_behavior` otherwise).  Disabled triggers
//!    are skipped and their pending events dropped.
//! 2. **Freeplay** – if nothing switched and no reaction is running, start the
//!    first runnable default behavior when idle.
//! 3. **Tick** – update the current behavior.  On `Complete`/`Failure` it is
//!    finished; a finished reaction hands control back to the behavior it
//!    interrupted when its strategy asked for that.
//!
//! Every switch is published on the [`EventBus`] when one is attached.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, error, info, warn};
use tread_middleware::{EventBus, Topic};
use tread_types::{Event, EventPayload, ReactionTrigger, TreadError};

use crate::behavior::{Behavior, BehaviorStatus, ManagedBehavior};
use crate::reaction::{create_strategy, ReactionConfig, ReactionTriggerStrategy};
use crate::robot::Robot;

const EVENT_SOURCE: &str = "tread-runtime::behavior_manager";

struct ReactionEntry {
    strategy: Box<dyn ReactionTriggerStrategy>,
    behavior_id: String,
}

#[derive(Default)]
pub struct BehaviorManager {
    behaviors: HashMap<String, ManagedBehavior>,
    default_behaviors: Vec<String>,
    reactions: BTreeMap<ReactionTrigger, ReactionEntry>,
    /// lock id → triggers it disables
    disable_locks: BTreeMap<String, BTreeSet<ReactionTrigger>>,
    current: Option<String>,
    current_reaction: Option<ReactionTrigger>,
    behavior_to_resume: Option<String>,
    switches_this_tick: usize,
    bus: Option<EventBus>,
}

impl BehaviorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(bus: EventBus) -> Self {
        Self {
            bus: Some(bus),
            ..Self::default()
        }
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    pub fn add_behavior(&mut self, behavior: Box<dyn Behavior>) -> Result<(), TreadError> {
        let id = behavior.id().to_string();
        if self.behaviors.contains_key(&id) {
            return Err(TreadError::InvalidConfig(format!(
                "behavior '{id}' registered twice"
            )));
        }
        self.behaviors.insert(id, ManagedBehavior::new(behavior));
        Ok(())
    }

    /// Append `id` to the freeplay priority list.
    pub fn add_default_behavior(&mut self, id: &str) -> Result<(), TreadError> {
        if !self.behaviors.contains_key(id) {
            return Err(TreadError::UnknownBehavior(id.to_string()));
        }
        self.default_behaviors.push(id.to_string());
        Ok(())
    }

    /// Wire `strategy` to the behavior registered as `behavior_id`.  A second
    /// strategy for the same trigger replaces the first.
    pub fn add_reaction(
        &mut self,
        strategy: Box<dyn ReactionTriggerStrategy>,
        behavior_id: &str,
    ) -> Result<(), TreadError> {
        if !self.behaviors.contains_key(behavior_id) {
            return Err(TreadError::UnknownBehavior(behavior_id.to_string()));
        }
        let trigger = strategy.trigger();
        let replaced = self.reactions.insert(
            trigger,
            ReactionEntry {
                strategy,
                behavior_id: behavior_id.to_string(),
            },
        );
        if replaced.is_some() {
            warn!(trigger = %trigger, "BehaviorManager.AddReaction.Replaced");
        }
        Ok(())
    }

    /// Build the stock strategy for every configured trigger.
    pub fn init_reaction_trigger_map(&mut self, reactions: &[ReactionConfig]) -> Result<(), TreadError> {
        for reaction in reactions {
            self.add_reaction(create_strategy(reaction.trigger), &reaction.behavior)?;
        }
        info!(count = self.reactions.len(), "reaction trigger map initialised");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Route `event` to every strategy subscribed to its tag.
    pub fn handle_event(&mut self, event: &tread_types::EngineEvent, robot: &Robot) {
        let tag = event.tag();
        for entry in self.reactions.values_mut() {
            if entry.strategy.subscribed_tags().contains(&tag) {
                entry.strategy.always_handle(event, robot);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Disable locks
    // -------------------------------------------------------------------------

    /// Disable `triggers` until `lock_id` is removed.  Several locks may
    /// disable the same trigger; it stays disabled until all are gone.
    pub fn disable_reactions_with_lock(
        &mut self,
        lock_id: &str,
        triggers: &[ReactionTrigger],
    ) -> Result<(), TreadError> {
        if let Some(held) = self.disable_locks.get(lock_id) {
            if let Some(&trigger) = triggers.iter().find(|t| held.contains(t)) {
                return Err(TreadError::DuplicateDisableLock {
                    lock_id: lock_id.to_string(),
                    trigger,
                });
            }
        }
        debug!(lock_id, triggers = ?triggers, "reactions disabled");
        self.disable_locks
            .entry(lock_id.to_string())
            .or_default()
            .extend(triggers.iter().copied());
        Ok(())
    }

    pub fn remove_disable_reactions_lock(&mut self, lock_id: &str) -> Result<(), TreadError> {
        match self.disable_locks.remove(lock_id) {
            Some(triggers) => {
                debug!(lock_id, triggers = ?triggers, "reactions re-enabled");
                Ok(())
            }
            None => Err(TreadError::UnknownDisableLock(lock_id.to_string())),
        }
    }

    pub fn is_reaction_enabled(&self, trigger: ReactionTrigger) -> bool {
        !self.disable_locks.values().any(|t| t.contains(&trigger))
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    pub fn update(&mut self, robot: &mut Robot) {
        self.switches_this_tick = 0;

        let switched = self.check_reaction_triggers(robot);
        if !switched && self.current_reaction.is_none() && self.current.is_none() {
            self.choose_next_behavior(robot);
        }

        let Some(id) = self.current.clone() else {
            return;
        };
        let status = match self.behaviors.get_mut(&id) {
            Some(behavior) => behavior.update(robot),
            None => BehaviorStatus::Failure,
        };
        match status {
            BehaviorStatus::Running => {}
            BehaviorStatus::Complete | BehaviorStatus::Failure => {
                debug!(behavior = %id, status = ?status, "behavior finished");
                let was_reaction = self.current_reaction.is_some();
                self.finish_current_behavior(robot, was_reaction);
            }
        }
    }

    /// Poll reaction strategies; returns whether any reaction took over.
    fn check_reaction_triggers(&mut self, robot: &mut Robot) -> bool {
        let mut switched = false;
        let triggers: Vec<ReactionTrigger> = self.reactions.keys().copied().collect();

        for trigger in triggers {
            let enabled = self.is_reaction_enabled(trigger);
            let Some(entry) = self.reactions.get_mut(&trigger) else {
                continue;
            };
            if !enabled {
                entry.strategy.clear_pending();
                continue;
            }

            if let Some(running) = self.current_reaction {
                let allowed = if running == trigger {
                    entry.strategy.can_interrupt_self()
                } else {
                    entry.strategy.can_interrupt_other_triggered_behavior()
                };
                if !allowed {
                    continue;
                }
            }

            let Some(behavior) = self.behaviors.get(&entry.behavior_id) else {
                error!(trigger = %trigger, behavior = %entry.behavior_id, "BehaviorManager.CheckReactions.MissingBehavior");
                continue;
            };
            if entry.strategy.should_trigger_behavior(robot, behavior.behavior()) {
                let behavior_id = entry.behavior_id.clone();
                let resume = entry.strategy.should_resume_last_behavior();
                switched |= self.switch_to_reaction_trigger(robot, trigger, &behavior_id, resume);
            }
        }
        switched
    }

    /// Returns whether the reaction behavior started.  The resume target is
    /// only recorded once it has.
    fn switch_to_reaction_trigger(
        &mut self,
        robot: &mut Robot,
        trigger: ReactionTrigger,
        behavior_id: &str,
        resume_last: bool,
    ) -> bool {
        robot.stop_all_motors();

        let resume_target = if resume_last {
            self.behavior_to_resume.clone().or_else(|| {
                if self.current_reaction.is_none() {
                    self.current.clone()
                } else {
                    None
                }
            })
        } else {
            None
        };

        info!(trigger = %trigger, behavior = behavior_id, "reaction triggered");
        let started = self.switch_to_behavior(robot, Some(behavior_id.to_string()), Some(trigger));
        // A failed start leaves nothing running, so nothing to come back from.
        self.behavior_to_resume = if started { resume_target } else { None };
        started
    }

    /// Stop the current behavior and start `next`.  A start failure leaves
    /// the manager idle.  Returns whether `next` is now running.
    fn switch_to_behavior(
        &mut self,
        robot: &mut Robot,
        next: Option<String>,
        reaction: Option<ReactionTrigger>,
    ) -> bool {
        self.switches_this_tick += 1;
        if self.switches_this_tick > 1 {
            warn!(
                switches = self.switches_this_tick,
                "BehaviorManager.SwitchToBehavior.MultipleSwitchesInOneTick"
            );
        }

        let old = self.current.take();
        let old_reaction = self.current_reaction.take();
        if let Some(behavior) = old.as_ref().and_then(|id| self.behaviors.get_mut(id)) {
            behavior.stop(robot);
        }

        if let Some(id) = next.as_ref() {
            match self.behaviors.get_mut(id) {
                Some(behavior) => match behavior.init(robot) {
                    Ok(()) => {
                        self.current = Some(id.clone());
                        self.current_reaction = reaction;
                    }
                    Err(e) => warn!(behavior = %id, error = %e, "BehaviorManager.SwitchToBehavior.InitFailed"),
                },
                None => error!(behavior = %id, "BehaviorManager.SwitchToBehavior.UnknownBehavior"),
            }
        }

        self.publish_transitions(old, old_reaction);
        self.current.is_some()
    }

    fn finish_current_behavior(&mut self, robot: &mut Robot, attempt_resume: bool) {
        let finished_reaction = self.current_reaction;
        self.switch_to_behavior(robot, None, None);

        match finished_reaction {
            Some(trigger) if attempt_resume => self.try_to_resume_behavior(robot, trigger),
            _ => self.behavior_to_resume = None,
        }
    }

    /// Hand control back to the behavior a reaction interrupted, falling back
    /// to freeplay selection when that is not possible.
    fn try_to_resume_behavior(&mut self, robot: &mut Robot, reason: ReactionTrigger) {
        if let Some(id) = self.behavior_to_resume.take() {
            let resumed = match self.behaviors.get_mut(&id) {
                Some(behavior) if behavior.is_runnable(robot) => match behavior.resume(robot, reason) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(behavior = %id, error = %e, "BehaviorManager.TryToResumeBehavior.Failed");
                        false
                    }
                },
                _ => false,
            };
            if resumed {
                info!(behavior = %id, reason = %reason, "behavior resumed");
                self.current = Some(id.clone());
                self.publish_transitions(None, None);
                return;
            }
        }
        self.choose_next_behavior(robot);
    }

    /// Start the first runnable default behavior.
    fn choose_next_behavior(&mut self, robot: &mut Robot) {
        let next = self
            .default_behaviors
            .iter()
            .find(|id| self.behaviors.get(*id).is_some_and(|b| b.is_runnable(robot)))
            .cloned();
        if let Some(id) = next {
            self.switch_to_behavior(robot, Some(id), None);
        }
    }

    /// Stop whatever is running and forget any pending resume.
    pub fn stop_current_behavior(&mut self, robot: &mut Robot) {
        if self.current.is_some() {
            self.switch_to_behavior(robot, None, None);
        }
        self.behavior_to_resume = None;
    }

    fn publish_transitions(&self, old: Option<String>, old_reaction: Option<ReactionTrigger>) {
        let Some(bus) = self.bus.as_ref() else {
            return;
        };
        if old_reaction != self.current_reaction {
            bus.notify(
                Topic::Reactions,
                Event::new(
                    EVENT_SOURCE,
                    EventPayload::ReactionTriggerTransition {
                        old: old_reaction,
                        new: self.current_reaction,
                    },
                ),
            );
        }
        if old != self.current {
            bus.notify(
                Topic::Behaviors,
                Event::new(
                    EVENT_SOURCE,
                    EventPayload::BehaviorTransition {
                        old,
                        new: self.current.clone(),
                    },
                ),
            );
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn current_behavior_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_reaction(&self) -> Option<ReactionTrigger> {
        self.current_reaction
    }

    pub fn behavior_to_resume(&self) -> Option<&str> {
        self.behavior_to_resume.as_deref()
    }

    pub fn behavior(&self, id: &str) -> Option<&ManagedBehavior> {
        self.behaviors.get(id)
    }

    pub fn reaction_strategy(&self, trigger: ReactionTrigger) -> Option<&dyn ReactionTriggerStrategy> {
        self.reactions.get(&trigger).map(|e| e.strategy.as_ref())
    }

    pub fn has_reaction(&self, trigger: ReactionTrigger) -> bool {
        self.reactions.contains_key(&trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorState;
    use crate::reaction::{GenericStrategy, ReactionPolicy};
    use crate::robot::RobotAction;
    use crate::step_tree::{StepNode, TreeBehavior};
    use tread_types::{EngineEvent, EngineEventTag, MotorId, OffTreadsState};

    fn forever(id: &str) -> Box<dyn Behavior> {
        Box::new(TreeBehavior::new(
            id,
            StepNode::leaf("forever", |_| BehaviorStatus::Running),
        ))
    }

    fn short(id: &str, ticks: u32) -> Box<dyn Behavior> {
        Box::new(TreeBehavior::new(id, StepNode::wait("short", ticks)))
    }

    fn cliff() -> EngineEvent {
        EngineEvent::CliffEvent {
            detected: true,
            timestamp: 10,
        }
    }

    fn charger_strategy(policy: ReactionPolicy) -> Box<dyn ReactionTriggerStrategy> {
        Box::new(GenericStrategy::new(
            ReactionTrigger::PlacedOnCharger,
            "PlacedOnCharger",
            &[EngineEventTag::ChargerEvent],
            policy,
            |event, _| matches!(event, EngineEvent::ChargerEvent { on_charger: true }),
        ))
    }

    /// Manager with a freeplay behavior "Roam" and a cliff reaction
    /// "BackAway" that lasts `reaction_ticks`.
    fn manager(reaction_ticks: u32) -> BehaviorManager {
        let mut m = BehaviorManager::new();
        m.add_behavior(forever("Roam")).unwrap();
        m.add_behavior(short("BackAway", reaction_ticks)).unwrap();
        m.add_default_behavior("Roam").unwrap();
        m.add_reaction(create_strategy(ReactionTrigger::CliffDetected), "BackAway")
            .unwrap();
        m
    }

    #[test]
    fn idle_manager_picks_default_behavior() {
        let mut robot = Robot::new();
        let mut m = manager(1);
        m.update(&mut robot);
        assert_eq!(m.current_behavior_id(), Some("Roam"));
        assert_eq!(m.current_reaction(), None);
    }

    #[test]
    fn reaction_preempts_and_stops_motors() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.update(&mut robot);
        robot.queue_action(RobotAction::TurnInPlace { angle_rad: 1.0 });

        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);

        assert_eq!(m.current_behavior_id(), Some("BackAway"));
        assert_eq!(m.current_reaction(), Some(ReactionTrigger::CliffDetected));
        assert_eq!(robot.drain_actions(), vec![RobotAction::StopAllMotors]);
        assert_eq!(m.behavior("Roam").map(|b| b.state()), Some(BehaviorState::Stopped));
    }

    #[test]
    fn non_resuming_reaction_falls_back_to_freeplay() {
        let mut robot = Robot::new();
        let mut m = manager(1);
        m.update(&mut robot);
        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);
        assert_eq!(m.behavior_to_resume(), None);

        // wait(1): one Running tick, then Complete.
        m.update(&mut robot);
        assert_eq!(m.current_behavior_id(), Some("Roam"));
        assert_eq!(m.current_reaction(), None);
    }

    #[test]
    fn resuming_reaction_returns_to_interrupted_behavior() {
        let mut robot = Robot::new();
        let mut m = BehaviorManager::new();
        m.add_behavior(forever("Roam")).unwrap();
        m.add_behavior(forever("Nap")).unwrap();
        m.add_behavior(short("ChargerDance", 0)).unwrap();
        m.add_default_behavior("Nap").unwrap();
        m.add_default_behavior("Roam").unwrap();
        m.add_reaction(
            charger_strategy(ReactionPolicy {
                should_resume_last_behavior: true,
                ..Default::default()
            }),
            "ChargerDance",
        )
        .unwrap();

        m.update(&mut robot);
        assert_eq!(m.current_behavior_id(), Some("Nap"));

        m.handle_event(&EngineEvent::ChargerEvent { on_charger: true }, &robot);
        // wait(0) completes on its first tick, so the reaction starts and
        // finishes within this update and control returns to Nap.
        m.update(&mut robot);
        assert_eq!(m.current_behavior_id(), Some("Nap"));
        assert_eq!(m.current_reaction(), None);
        assert_eq!(m.behavior_to_resume(), None);
    }

    #[test]
    fn running_reaction_blocks_non_interrupting_strategy() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.add_behavior(forever("ChargerDance")).unwrap();
        m.add_reaction(charger_strategy(ReactionPolicy::default()), "ChargerDance")
            .unwrap();

        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);
        assert_eq!(m.current_reaction(), Some(ReactionTrigger::CliffDetected));

        m.handle_event(&EngineEvent::ChargerEvent { on_charger: true }, &robot);
        m.update(&mut robot);
        assert_eq!(m.current_reaction(), Some(ReactionTrigger::CliffDetected));
    }

    #[test]
    fn interrupting_strategy_overrides_within_same_tick() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.add_behavior(forever("ChargerDance")).unwrap();
        m.add_reaction(
            charger_strategy(ReactionPolicy {
                can_interrupt_other_triggered_behavior: true,
                ..Default::default()
            }),
            "ChargerDance",
        )
        .unwrap();

        // CliffDetected sorts before PlacedOnCharger, so the cliff reaction is
        // chosen first and the charger reaction then overrides it.
        m.handle_event(&cliff(), &robot);
        m.handle_event(&EngineEvent::ChargerEvent { on_charger: true }, &robot);
        m.update(&mut robot);

        assert_eq!(m.current_reaction(), Some(ReactionTrigger::PlacedOnCharger));
        assert_eq!(m.current_behavior_id(), Some("ChargerDance"));
    }

    #[test]
    fn non_interrupting_strategy_does_not_override_within_same_tick() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.add_behavior(forever("ChargerDance")).unwrap();
        m.add_reaction(charger_strategy(ReactionPolicy::default()), "ChargerDance")
            .unwrap();

        m.handle_event(&cliff(), &robot);
        m.handle_event(&EngineEvent::ChargerEvent { on_charger: true }, &robot);
        m.update(&mut robot);

        assert_eq!(m.current_reaction(), Some(ReactionTrigger::CliffDetected));
        // The charger event stays latched because its strategy was never polled.
        assert!(m
            .reaction_strategy(ReactionTrigger::PlacedOnCharger)
            .is_some_and(|s| s.has_pending()));
    }

    #[test]
    fn unexpected_movement_overrides_running_cliff_reaction() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.add_behavior(forever("Startled")).unwrap();
        m.add_reaction(create_strategy(ReactionTrigger::UnexpectedMovement), "Startled")
            .unwrap();

        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);
        assert_eq!(m.current_reaction(), Some(ReactionTrigger::CliffDetected));

        m.handle_event(&EngineEvent::UnexpectedMovement { timestamp: 20 }, &robot);
        m.update(&mut robot);
        assert_eq!(m.current_reaction(), Some(ReactionTrigger::UnexpectedMovement));
        assert_eq!(m.current_behavior_id(), Some("Startled"));
        assert_eq!(m.behavior("BackAway").map(|b| b.state()), Some(BehaviorState::Stopped));
    }

    #[test]
    fn motor_calibration_overrides_running_cliff_reaction() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.add_behavior(forever("Calibrate")).unwrap();
        m.add_reaction(create_strategy(ReactionTrigger::MotorCalibration), "Calibrate")
            .unwrap();

        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);
        m.handle_event(
            &EngineEvent::MotorCalibration {
                motor: MotorId::Head,
                calib_started: true,
                auto_started: true,
            },
            &robot,
        );
        m.update(&mut robot);
        assert_eq!(m.current_reaction(), Some(ReactionTrigger::MotorCalibration));
        assert_eq!(m.current_behavior_id(), Some("Calibrate"));
    }

    /// Reaction behavior whose start always fails.
    struct Broken;

    impl Behavior for Broken {
        fn id(&self) -> &str {
            "Broken"
        }

        fn is_runnable(&self, _robot: &Robot) -> bool {
            true
        }

        fn init(&mut self, _robot: &mut Robot) -> Result<(), TreadError> {
            Err(TreadError::BehaviorInitFailed {
                behavior: "Broken".into(),
                details: "actuator offline".into(),
            })
        }

        fn update(&mut self, _robot: &mut Robot) -> BehaviorStatus {
            BehaviorStatus::Failure
        }

        fn stop(&mut self, _robot: &mut Robot) {}
    }

    #[test]
    fn failed_reaction_start_keeps_no_resume_target() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.add_behavior(Box::new(Broken)).unwrap();
        m.add_reaction(create_strategy(ReactionTrigger::MotorCalibration), "Broken")
            .unwrap();
        m.update(&mut robot);
        assert_eq!(m.current_behavior_id(), Some("Roam"));

        m.handle_event(
            &EngineEvent::MotorCalibration {
                motor: MotorId::Lift,
                calib_started: true,
                auto_started: false,
            },
            &robot,
        );
        m.update(&mut robot);

        // The reaction never ran, so freeplay restarts and nothing is pending.
        assert_eq!(m.current_reaction(), None);
        assert_eq!(m.behavior_to_resume(), None);
        assert_eq!(m.current_behavior_id(), Some("Roam"));
    }

    #[test]
    fn self_interrupt_restarts_only_when_allowed() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);
        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);
        // The cliff strategy cannot interrupt itself; its event waits.
        assert!(m
            .reaction_strategy(ReactionTrigger::CliffDetected)
            .is_some_and(|s| s.has_pending()));
    }

    #[test]
    fn disabled_reaction_is_skipped_and_dropped() {
        let mut robot = Robot::new();
        let mut m = manager(5);
        m.disable_reactions_with_lock("game", &[ReactionTrigger::CliffDetected])
            .unwrap();
        assert!(!m.is_reaction_enabled(ReactionTrigger::CliffDetected));

        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);
        assert_eq!(m.current_reaction(), None);

        // Re-enabling does not resurrect the dropped event.
        m.remove_disable_reactions_lock("game").unwrap();
        m.update(&mut robot);
        assert_eq!(m.current_reaction(), None);
        assert_eq!(m.current_behavior_id(), Some("Roam"));
    }

    #[test]
    fn disable_lock_errors() {
        let mut m = manager(1);
        m.disable_reactions_with_lock("a", &[ReactionTrigger::CliffDetected])
            .unwrap();
        assert!(matches!(
            m.disable_reactions_with_lock("a", &[ReactionTrigger::CliffDetected]),
            Err(TreadError::DuplicateDisableLock { .. })
        ));
        // A second lock on the same trigger is fine; both must go.
        m.disable_reactions_with_lock("b", &[ReactionTrigger::CliffDetected])
            .unwrap();
        m.remove_disable_reactions_lock("a").unwrap();
        assert!(!m.is_reaction_enabled(ReactionTrigger::CliffDetected));
        m.remove_disable_reactions_lock("b").unwrap();
        assert!(m.is_reaction_enabled(ReactionTrigger::CliffDetected));

        assert!(matches!(
            m.remove_disable_reactions_lock("missing"),
            Err(TreadError::UnknownDisableLock(_))
        ));
    }

    #[test]
    fn unrunnable_reaction_behavior_is_not_started() {
        let mut robot = Robot::new();
        let mut m = BehaviorManager::new();
        m.add_behavior(Box::new(
            TreeBehavior::new("Cliff", StepNode::wait("w", 1)).with_runnable(|r: &Robot| r.is_on_treads()),
        ))
        .unwrap();
        m.add_reaction(create_strategy(ReactionTrigger::CliffDetected), "Cliff")
            .unwrap();

        robot.apply_engine_event(&EngineEvent::RobotOffTreadsStateChanged {
            previous: OffTreadsState::OnTreads,
            current: OffTreadsState::InAir,
        });
        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);
        assert_eq!(m.current_reaction(), None);
        assert!(!m
            .reaction_strategy(ReactionTrigger::CliffDetected)
            .is_some_and(|s| s.has_pending()));
    }

    #[test]
    fn registration_errors() {
        let mut m = BehaviorManager::new();
        m.add_behavior(forever("A")).unwrap();
        assert!(matches!(
            m.add_behavior(forever("A")),
            Err(TreadError::InvalidConfig(_))
        ));
        assert!(matches!(
            m.add_default_behavior("B"),
            Err(TreadError::UnknownBehavior(_))
        ));
        assert!(matches!(
            m.init_reaction_trigger_map(&[ReactionConfig {
                trigger: ReactionTrigger::CliffDetected,
                behavior: "Missing".into(),
            }]),
            Err(TreadError::UnknownBehavior(_))
        ));
    }

    #[test]
    fn transitions_are_published() {
        let bus = EventBus::default();
        let mut reactions_rx = bus.subscribe_to(Topic::Reactions);
        let mut behaviors_rx = bus.subscribe_to(Topic::Behaviors);

        let mut robot = Robot::new();
        let mut m = BehaviorManager::with_bus(bus);
        m.add_behavior(forever("Roam")).unwrap();
        m.add_behavior(short("BackAway", 5)).unwrap();
        m.add_default_behavior("Roam").unwrap();
        m.add_reaction(create_strategy(ReactionTrigger::CliffDetected), "BackAway")
            .unwrap();

        m.update(&mut robot);
        m.handle_event(&cliff(), &robot);
        m.update(&mut robot);

        let reaction = reactions_rx.try_recv().expect("reaction transition");
        assert!(matches!(
            reaction.payload,
            EventPayload::ReactionTriggerTransition {
                old: None,
                new: Some(ReactionTrigger::CliffDetected)
            }
        ));
        assert!(reactions_rx.try_recv().is_none());

        let first = behaviors_rx.try_recv().expect("freeplay start");
        assert!(matches!(
            first.payload,
            EventPayload::BehaviorTransition { old: None, ref new } if new.as_deref() == Some("Roam")
        ));
        let second = behaviors_rx.try_recv().expect("reaction start");
        assert!(matches!(
            second.payload,
            EventPayload::BehaviorTransition { ref old, ref new }
                if old.as_deref() == Some("Roam") && new.as_deref() == Some("BackAway")
        ));
    }

    #[test]
    fn stop_current_behavior_goes_idle() {
        let mut robot = Robot::new();
        let mut m = manager(1);
        m.update(&mut robot);
        m.stop_current_behavior(&mut robot);
        assert_eq!(m.current_behavior_id(), None);
        assert_eq!(m.behavior("Roam").map(|b| b.state()), Some(BehaviorState::Stopped));
    }
}
