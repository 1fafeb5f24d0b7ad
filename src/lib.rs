//! Reelcast - chat-triggered video repost pipeline
//!
//! This library crate exposes the core functionality for integration testing.

pub mod clients;
pub mod config;
pub mod gate;
pub mod inbound;
pub mod publish;
pub mod report;
pub mod retry;
pub mod session;
pub mod store;
pub mod timeout;
