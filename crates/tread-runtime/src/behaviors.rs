//! Stock behaviors: one reaction per trigger plus a couple of freeplay
//! behaviors to fall back on.

use tread_types::ReactionTrigger;

use crate::behavior::{Behavior, BehaviorStatus};
use crate::reaction::ReactionConfig;
use crate::robot::{Robot, RobotAction};
use crate::step_tree::{StepNode, TreeBehavior};

pub const REACT_TO_CLIFF: &str = "ReactToCliff";
pub const REACT_TO_MOTOR_CALIBRATION: &str = "ReactToMotorCalibration";
pub const REACT_TO_ON_CHARGER: &str = "ReactToOnCharger";
pub const REACT_TO_RETURNED_TO_TREADS: &str = "ReactToReturnedToTreads";
pub const REACT_TO_ROBOT_ON_BACK: &str = "ReactToRobotOnBack";
pub const REACT_TO_PICKUP: &str = "ReactToPickup";
pub const REACT_TO_UNEXPECTED_MOVEMENT: &str = "ReactToUnexpectedMovement";
pub const LOOK_AROUND: &str = "LookAround";
pub const IDLE: &str = "Idle";

fn play(name: &str) -> StepNode {
    StepNode::action(format!("play_{name}"), RobotAction::PlayAnimation(name.to_string()))
}

pub fn react_to_cliff() -> TreeBehavior {
    TreeBehavior::new(
        REACT_TO_CLIFF,
        StepNode::sequence(vec![
            play("cliff_startle"),
            StepNode::action(
                "back_away",
                RobotAction::DriveStraight {
                    distance_mm: -60.0,
                    speed_mmps: 100.0,
                },
            ),
            StepNode::wait("backing_up", 3),
        ]),
    )
    .with_runnable(|robot: &Robot| robot.is_on_treads())
}

/// Holds still until every motor reports calibration done.
pub fn react_to_motor_calibration() -> TreeBehavior {
    TreeBehavior::new(
        REACT_TO_MOTOR_CALIBRATION,
        StepNode::leaf("await_calibration", |robot: &mut Robot| {
            if robot.is_any_motor_calibrating() {
                BehaviorStatus::Running
            } else {
                BehaviorStatus::Complete
            }
        }),
    )
}

pub fn react_to_on_charger() -> TreeBehavior {
    TreeBehavior::new(
        REACT_TO_ON_CHARGER,
        StepNode::sequence(vec![
            play("on_charger"),
            StepNode::action("lift_down", RobotAction::MoveLiftToHeight { height_mm: 0.0 }),
        ]),
    )
    .with_runnable(|robot: &Robot| robot.is_on_charger())
}

pub fn react_to_returned_to_treads() -> TreeBehavior {
    TreeBehavior::new(
        REACT_TO_RETURNED_TO_TREADS,
        StepNode::sequence(vec![
            StepNode::action("level_head", RobotAction::MoveHeadToAngle { angle_rad: 0.0 }),
            play("returned_to_treads"),
            StepNode::wait("settle", 2),
        ]),
    )
    .with_runnable(|robot: &Robot| robot.is_on_treads())
}

pub fn react_to_robot_on_back() -> TreeBehavior {
    TreeBehavior::new(
        REACT_TO_ROBOT_ON_BACK,
        StepNode::sequence(vec![play("on_back_struggle"), StepNode::wait("flail", 4)]),
    )
}

pub fn react_to_pickup() -> TreeBehavior {
    TreeBehavior::new(
        REACT_TO_PICKUP,
        StepNode::sequence(vec![
            play("picked_up"),
            StepNode::leaf("wait_for_put_down", |robot: &mut Robot| {
                if robot.is_picked_up() {
                    BehaviorStatus::Running
                } else {
                    BehaviorStatus::Complete
                }
            }),
        ]),
    )
}

pub fn react_to_unexpected_movement() -> TreeBehavior {
    TreeBehavior::new(
        REACT_TO_UNEXPECTED_MOVEMENT,
        StepNode::sequence(vec![
            play("unexpected_movement"),
            StepNode::action("turn_back", RobotAction::TurnInPlace { angle_rad: 0.5 }),
        ]),
    )
    .with_runnable(|robot: &Robot| robot.is_on_treads())
}

/// Freeplay: scan left and right, then pause.
pub fn look_around() -> TreeBehavior {
    TreeBehavior::new(
        LOOK_AROUND,
        StepNode::sequence(vec![
            StepNode::action("turn_left", RobotAction::TurnInPlace { angle_rad: 0.8 }),
            StepNode::wait("look_left", 2),
            StepNode::action("turn_right", RobotAction::TurnInPlace { angle_rad: -1.6 }),
            StepNode::wait("look_right", 2),
            StepNode::action("recentre", RobotAction::TurnInPlace { angle_rad: 0.8 }),
        ]),
    )
    .with_runnable(|robot: &Robot| robot.is_on_treads() && !robot.is_on_charger())
}

pub fn idle() -> TreeBehavior {
    TreeBehavior::new(IDLE, StepNode::wait("idle", 10))
}

/// Every stock behavior, ready to register.
pub fn builtin_behaviors() -> Vec<Box<dyn Behavior>> {
    vec![
        Box::new(react_to_cliff()),
        Box::new(react_to_motor_calibration()),
        Box::new(react_to_on_charger()),
        Box::new(react_to_returned_to_treads()),
        Box::new(react_to_robot_on_back()),
        Box::new(react_to_pickup()),
        Box::new(react_to_unexpected_movement()),
        Box::new(look_around()),
        Box::new(idle()),
    ]
}

/// Freeplay behaviors in priority order.
pub fn default_behavior_ids() -> Vec<&'static str> {
    vec![LOOK_AROUND, IDLE]
}

/// Stock trigger → reaction wiring.
pub fn default_reactions() -> Vec<ReactionConfig> {
    ReactionTrigger::ALL
        .iter()
        .map(|&trigger| ReactionConfig {
            trigger,
            behavior: reaction_behavior_for(trigger).to_string(),
        })
        .collect()
}

fn reaction_behavior_for(trigger: ReactionTrigger) -> &'static str {
    match trigger {
        ReactionTrigger::CliffDetected => REACT_TO_CLIFF,
        ReactionTrigger::MotorCalibration => REACT_TO_MOTOR_CALIBRATION,
        ReactionTrigger::PlacedOnCharger => REACT_TO_ON_CHARGER,
        ReactionTrigger::ReturnedToTreads => REACT_TO_RETURNED_TO_TREADS,
        ReactionTrigger::RobotOnBack => REACT_TO_ROBOT_ON_BACK,
        ReactionTrigger::RobotPickedUp => REACT_TO_PICKUP,
        ReactionTrigger::UnexpectedMovement => REACT_TO_UNEXPECTED_MOVEMENT,
    }
}
