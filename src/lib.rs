//! Chat relay: private channel and tell relay bridges for a multi-protocol
//! chat bot's message hub.

pub mod app;
pub mod commands;
pub mod config;
pub mod conn;
pub mod error;
pub mod events;
pub mod hub;
pub mod private_channel;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod tell_relay;
pub mod text;
