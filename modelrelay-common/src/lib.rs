//! ModelRelay Common Types
//!
//! Shared types used by the gateway and external fleet tooling.

pub mod chat;
pub mod instance;

pub use chat::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice, Usage,
};
pub use instance::{InstanceDescriptor, InstanceSnapshot, InstanceStatus, Priority};
