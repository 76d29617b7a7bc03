//! The `utils` module provides shared pieces used across `chatsub`: the
//! error type and logging setup.

pub mod error;
pub mod logging;

pub use error::ChatError;
