use thiserror::Error;

/// Message-carrying error shared by crates that have no richer failure
/// taxonomy of their own. Crates with structured failures (client, queue)
/// define their own enums instead.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Error(String);

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can be built from a plain message. Implementing this is
/// the entry ticket for [`impl_context!`].
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait adding `.context()` and
/// `.with_context()` to `Result` and `Option`.
///
/// Invoke inside a module that defines `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`:
///
/// ```ignore
/// pub use pinboard_common::Error;
/// pub type Result<T> = std::result::Result<T, Error>;
/// pinboard_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T>: Sized {
            fn with_context<M: Into<String>>(self, message: impl FnOnce() -> M) -> Result<T>;

            fn context(self, message: impl Into<String>) -> Result<T> {
                self.with_context(|| message)
            }
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn with_context<M: Into<String>>(self, message: impl FnOnce() -> M) -> Result<T> {
                self.map_err(|source| {
                    let message = message().into();
                    <Error as $crate::FromMessage>::from_message(format!("{message}: {source}"))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn with_context<M: Into<String>>(self, message: impl FnOnce() -> M) -> Result<T> {
                self.ok_or_else(|| {
                    <Error as $crate::FromMessage>::from_message(message().into())
                })
            }
        }
    };
}
