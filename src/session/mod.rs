//! Session layer: reliable stop-and-wait exchange over a shared slot
//! schedule.

mod engine;
mod pipe;

pub use engine::{AgentAction, Role, Session, SlotTiming};
pub use pipe::{MessagePipe, SinkFn, SourceFn};
