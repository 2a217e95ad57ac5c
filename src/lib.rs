//! Traffic Engine — routes inbound production-tracking mail to workers.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod notify;
pub mod registry;
pub mod server;
pub mod store;
