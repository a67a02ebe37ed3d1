//! Crate-local error alias with `.context()` helpers on `Result` and
//! `Option`.

pub use pinboard_common::Error;

pub type Result<T> = std::result::Result<T, Error>;

pinboard_common::impl_context!();
