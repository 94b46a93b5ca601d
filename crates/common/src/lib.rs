//! Common types for the catalog crawler workspace

mod error;
mod retry;
mod secret;

pub use error::{Error, Result};
pub use retry::{Attempt, Exhausted, RetryPolicy};
pub use secret::Secret;
