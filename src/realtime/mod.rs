//! Realtime channel bus
//!
//! Per-(user, workflow) topic space used to stream run progress to exactly
//! the right subscriber: channel naming and typed messages, an in-process
//! fan-out bus, and scope-bound subscription tokens for the realtime
//! transport collaborator.

pub mod bus;
pub mod channel;
pub mod token;

pub use bus::{BroadcastBus, BusMessage, ChannelBus};
pub use channel::{AiStreamMessage, Channel, StatusLabel, Topic, WorkflowUpdate};
pub use token::SubscriptionTokenIssuer;
