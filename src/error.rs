//! Error types for the traffic engine.
//!
//! Nothing here is fatal to the running process: every failure is classified
//! and returned as a value, and the engine decides fail-open vs fail-closed
//! per operation. A duplicate delivery is not an error at all — it surfaces
//! as `engine::Outcome::Duplicate`.

use crate::event::Route;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Record store errors. Reads and writes are kept distinct because the
/// engine treats them differently: read failures fail open (proceed as if
/// absent), write failures are logged and processing continues.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store read failed for {table}: {reason}")]
    Read { table: String, reason: String },

    #[error("Store write failed for {table}: {reason}")]
    Write { table: String, reason: String },

    #[error("Store rejected write to {table}: {status} {body}")]
    Rejected {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Malformed store response from {table}: {reason}")]
    Malformed { table: String, reason: String },
}

/// Worker dispatch errors. Terminal for the event — there is no retry.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Route {route} has no registry entry")]
    UnknownRoute { route: Route },

    #[error("Route {route} has no endpoint configured")]
    NoEndpoint { route: Route },

    #[error("Worker call for {route} failed: {reason}")]
    Http { route: Route, reason: String },

    #[error("Worker for {route} returned {status}: {body}")]
    Endpoint {
        route: Route,
        status: u16,
        body: String,
    },
}

/// Notification sink errors. A missing sink URL is NOT an error — the sink
/// degrades to a `WouldSend` receipt instead.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{sink} sink request failed: {reason}")]
    Http { sink: &'static str, reason: String },

    #[error("{sink} sink rejected delivery: {status} {body}")]
    Delivery {
        sink: &'static str,
        status: u16,
        body: String,
    },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
