//! Typed HTTP client for the remote board service.
//!
//! Every call carries its own short timeout and the configured bearer token.
//! Non-2xx responses, timeouts, and connection failures all surface as
//! [`Error`] values the delivery queue treats as retryable.

pub mod api;
pub mod types;

pub use {
    api::{BoardClient, Error, Result},
    types::{
        LogEntry, Note, ScoredLog, ScoredTask, ScoredTopic, SearchResponse, Task, Topic,
        TopicUpsert,
    },
};
