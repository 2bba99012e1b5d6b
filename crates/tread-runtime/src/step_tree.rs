//! Step trees: composable, tick-driven behavior bodies.
//!
//! A reaction such as "back away from the cliff" is a short script of robot
//! actions with a few waits in between.  Rather than a class per reaction, the
//! script is a small tree of [`StepNode`]s ticked once per engine update and
//! wrapped in a [`TreeBehavior`].
//!
//! # Nodes
//!
//! | Node type    | Description                                                         |
//! |--------------|---------------------------------------------------------------------|
//! | `Sequence`   | Runs children in order; fails on first failure; resumes where it left off. |
//! | `Selector`   | Tries children in order; completes on first success.                |
//! | `Leaf`       | Runs a closure against the robot and returns its status.            |
//! | `Wait`       | Reports `Running` for a fixed number of ticks, then `Complete`.     |
//!
//! # Example
//!
//! ```rust
//! use tread_runtime::behavior::BehaviorStatus;
//! use tread_runtime::robot::{Robot, RobotAction};
//! use tread_runtime::step_tree::StepNode;
//!
//! let mut tree = StepNode::sequence(vec![
//!     StepNode::action("back_up", RobotAction::DriveStraight { distance_mm: -50.0, speed_mmps: 80.0 }),
//!     StepNode::wait("settle", 1),
//! ]);
//!
//! let mut robot = Robot::new();
//! assert_eq!(tree.tick(&mut robot), BehaviorStatus::Running);
//! assert_eq!(tree.tick(&mut robot), BehaviorStatus::Complete);
//! assert_eq!(robot.drain_actions().len(), 1);
//! ```

use tread_types::TreadError;

use crate::behavior::{Behavior, BehaviorStatus};
use crate::robot::{Robot, RobotAction};

type LeafFn = Box<dyn FnMut(&mut Robot) -> BehaviorStatus + Send>;
type RunnableFn = Box<dyn Fn(&Robot) -> bool + Send>;

// ─────────────────────────────────────────────────────────────────────────────
// StepNode
// ─────────────────────────────────────────────────────────────────────────────

pub enum StepNode {
    Sequence {
        children: Vec<StepNode>,
        cursor: usize,
    },
    Selector {
        children: Vec<StepNode>,
        cursor: usize,
    },
    Leaf {
        name: String,
        action: LeafFn,
    },
    Wait {
        name: String,
        ticks: u32,
        remaining: u32,
    },
}

impl StepNode {
    pub fn leaf(
        name: impl Into<String>,
        action: impl FnMut(&mut Robot) -> BehaviorStatus + Send + 'static,
    ) -> Self {
        StepNode::Leaf {
            name: name.into(),
            action: Box::new(action),
        }
    }

    /// Leaf that queues `action` on the robot and completes immediately.
    pub fn action(name: impl Into<String>, action: RobotAction) -> Self {
        Self::leaf(name, move |robot: &mut Robot| {
            robot.queue_action(action.clone());
            BehaviorStatus::Complete
        })
    }

    pub fn wait(name: impl Into<String>, ticks: u32) -> Self {
        StepNode::Wait {
            name: name.into(),
            ticks,
            remaining: ticks,
        }
    }

    pub fn sequence(children: Vec<StepNode>) -> Self {
        StepNode::Sequence { children, cursor: 0 }
    }

    pub fn selector(children: Vec<StepNode>) -> Self {
        StepNode::Selector { children, cursor: 0 }
    }

    /// Advance the tree by one engine tick.
    ///
    /// Composites remember which child was running, so a child that returned
    /// `Running` is ticked again next time instead of restarting the list.
    pub fn tick(&mut self, robot: &mut Robot) -> BehaviorStatus {
        match self {
            StepNode::Leaf { action, .. } => action(robot),

            StepNode::Wait { remaining, ticks, .. } => {
                if *remaining == 0 {
                    *remaining = *ticks;
                    BehaviorStatus::Complete
                } else {
                    *remaining -= 1;
                    BehaviorStatus::Running
                }
            }

            StepNode::Sequence { children, cursor } => {
                while *cursor < children.len() {
                    match children[*cursor].tick(robot) {
                        BehaviorStatus::Complete => *cursor += 1,
                        BehaviorStatus::Running => return BehaviorStatus::Running,
                        BehaviorStatus::Failure => {
                            *cursor = 0;
                            return BehaviorStatus::Failure;
                        }
                    }
                }
                *cursor = 0;
                BehaviorStatus::Complete
            }

            StepNode::Selector { children, cursor } => {
                while *cursor < children.len() {
                    match children[*cursor].tick(robot) {
                        BehaviorStatus::Failure => *cursor += 1,
                        BehaviorStatus::Running => return BehaviorStatus::Running,
                        BehaviorStatus::Complete => {
                            *cursor = 0;
                            return BehaviorStatus::Complete;
                        }
                    }
                }
                *cursor = 0;
                BehaviorStatus::Failure
            }
        }
    }

    /// Rewind every composite cursor and wait counter.
    pub fn reset(&mut self) {
        match self {
            StepNode::Leaf { .. } => {}
            StepNode::Wait { ticks, remaining, .. } => *remaining = *ticks,
            StepNode::Sequence { children, cursor } | StepNode::Selector { children, cursor } => {
                *cursor = 0;
                children.iter_mut().for_each(StepNode::reset);
            }
        }
    }

    /// Name of a leaf or wait node; composites have none.
    pub fn name(&self) -> Option<&str> {
        match self {
            StepNode::Leaf { name, .. } | StepNode::Wait { name, .. } => Some(name),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TreeBehavior
// ─────────────────────────────────────────────────────────────────────────────

/// A [`Behavior`] whose body is a [`StepNode`] tree.
pub struct TreeBehavior {
    id: String,
    root: StepNode,
    runnable: RunnableFn,
}

impl TreeBehavior {
    /// Always runnable until [`with_runnable`](Self::with_runnable) says
    /// otherwise.
    pub fn new(id: impl Into<String>, root: StepNode) -> Self {
        Self {
            id: id.into(),
            root,
            runnable: Box::new(|_| true),
        }
    }

    pub fn with_runnable(mut self, predicate: impl Fn(&Robot) -> bool + Send + 'static) -> Self {
        self.runnable = Box::new(predicate);
        self
    }
}

impl Behavior for TreeBehavior {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_runnable(&self, robot: &Robot) -> bool {
        (self.runnable)(robot)
    }

    fn init(&mut self, _robot: &mut Robot) -> Result<(), TreadError> {
        self.root.reset();
        Ok(())
    }

    fn update(&mut self, robot: &mut Robot) -> BehaviorStatus {
        self.root.tick(robot)
    }

    fn stop(&mut self, _robot: &mut Robot) {
        self.root.reset();
    }
}
