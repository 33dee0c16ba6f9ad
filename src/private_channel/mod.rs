//! Private channel: connection resolution, membership and hub relay.

pub mod bridge;
pub mod commands;
pub mod membership;
pub mod resolver;

pub use bridge::{PrivateChannelBridge, PrivateChannelDeps};
pub use commands::PrivateChannelCommands;
pub use membership::MembershipLifecycle;
pub use resolver::ConnectionResolver;
