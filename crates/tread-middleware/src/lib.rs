//! `tread-middleware` – engine-to-game event routing.
//!
//! Carries behavior and reaction transitions, vision results, and system
//! alerts from the engine tick to whatever is listening (game UI, loggers,
//! test harnesses) without the engine waiting on any of them.
//!
//! # Modules
//!
//! - [`bus`] – Topic-partitioned publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
