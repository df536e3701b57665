//! Whodunit Core - World model, actions, and the pure action resolver

pub mod error;
pub mod generate;
pub mod protocol;
pub mod resolver;
pub mod types;
pub mod world;

pub use error::{Error, Result};
pub use protocol::*;
pub use resolver::{Resolution, SideEffect};
pub use types::*;
pub use world::{EventLog, WorldCandidate, WorldConfig, WorldState};
