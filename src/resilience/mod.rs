//! # Resilience Module
//!
//! Bounded retry for infrastructure operations that can fail transiently.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskrelay_core::resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::exponential(5, Duration::from_secs(2), Duration::from_secs(30));
//!
//! let value = policy
//!     .retry("broker_publish", || async { Ok::<_, String>("published") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod retry;

pub use retry::{BackoffStrategy, RetryPolicy};
