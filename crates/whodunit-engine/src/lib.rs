//! Whodunit Engine - Turn scheduling, the event bus, and the game worker

pub mod bus;
pub mod config;
pub mod engine;
pub mod scheduler;

pub use bus::{EventBus, EventKind, GameEvent, Handler, HandlerError, HandlerResult, SubscriptionId};
pub use config::{AgentConfig, EndpointConfig, EngineConfig, OracleConfig};
pub use engine::{EngineError, GameEngine, GameHandle};
pub use scheduler::{Applied, Handoff, Rejection, Scheduler, Stage, SubmitOutcome};
