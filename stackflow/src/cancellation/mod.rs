//! Cooperative cancellation for deployment runs.

mod token;

pub use token::CancellationToken;
