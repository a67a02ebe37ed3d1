//! The host-facing layer: a logger session owning all connector state, and
//! the hook handler that feeds it from host lifecycle callbacks.

pub mod logger;
pub mod session;

pub use {logger::BoardLoggerHook, session::LoggerSession};
