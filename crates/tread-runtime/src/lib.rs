//! `tread-runtime` – behavior arbitration and the engine context.
//!
//! # Modules
//!
//! - [`robot`] – [`Robot`][robot::Robot]: the engine's mirror of robot state
//!   plus the queue of motor commands behaviors issue.
//! - [`behavior`] – the [`Behavior`][behavior::Behavior] trait and
//!   [`ManagedBehavior`][behavior::ManagedBehavior], which enforces the
//!   init → update → stop lifecycle.
//! - [`step_tree`] – [`StepNode`][step_tree::StepNode] trees and
//!   [`TreeBehavior`][step_tree::TreeBehavior], the body of every stock behavior.
//! - [`reaction`] – [`ReactionTriggerStrategy`][reaction::ReactionTriggerStrategy]:
//!   per-trigger event filters with a one-slot latch and interrupt policy.
//! - [`behaviors`] – the stock reactions and freeplay behaviors.
//! - [`behavior_manager`] – [`BehaviorManager`][behavior_manager::BehaviorManager]:
//!   picks which behavior runs each tick, lets reactions preempt it and
//!   resumes it afterwards.
//! - [`engine`] – [`EngineContext`][engine::EngineContext]: owns the robot,
//!   IMU history, rolling-shutter corrector, vision thread and manager.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].

pub mod behavior;
pub mod behavior_manager;
pub mod behaviors;
pub mod engine;
pub mod reaction;
pub mod robot;
pub mod step_tree;
pub mod telemetry;

pub use behavior::{Behavior, BehaviorState, BehaviorStatus, ManagedBehavior};
pub use behavior_manager::BehaviorManager;
pub use engine::{EngineConfig, EngineContext};
pub use reaction::{ReactionConfig, ReactionPolicy, ReactionTriggerStrategy};
pub use robot::{Robot, RobotAction};
pub use step_tree::{StepNode, TreeBehavior};
pub use telemetry::{TracerProviderGuard, init_tracing};
