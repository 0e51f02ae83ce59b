//! Bounded retry with classification and recovery
//!
//! The executor keeps two questions apart:
//! - is this error worth another attempt? ([`Classification`], decided by the caller)
//! - what happens between attempts? (the caller's recovery action, e.g. rotating identity)
//!
//! # Example
//!
//! ```
//! use nargh::crawler::{Classification, RetryExecutor, RetryOutcome};
//!
//! # async fn example() {
//! let executor = RetryExecutor::new(3);
//! let outcome = executor
//!     .execute(
//!         "answer",
//!         || async { Ok::<_, String>(42) },
//!         |_err: &String| Classification::Transient,
//!         || async { Ok::<_, String>(()) },
//!     )
//!     .await;
//! assert!(matches!(outcome, RetryOutcome::Success(42)));
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;

/// Verdict on a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Stop immediately and propagate the error
    Fatal,

    /// Recover and try again, if attempts remain
    Transient,
}

/// Result of running an operation under the executor
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded
    Success(T),

    /// The operation, or the recovery between attempts, failed fatally
    Fatal(E),

    /// Every attempt failed transiently
    RetriesExhausted {
        /// Name of the operation, for logs
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// Error of the final attempt
        last_error: E,
    },
}

impl<T, E> RetryOutcome<T, E> {
    /// Returns true if the operation succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Runs an operation up to a fixed number of attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    max_attempts: u32,
}

impl RetryExecutor {
    /// Creates an executor making at most `max_attempts` attempts (at least one)
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the maximum number of attempts configured
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `operation` until it succeeds, fails fatally, or attempts run out
    ///
    /// After a transient failure `recover` runs before the next attempt; it
    /// is not run after the final attempt. A failing recovery is returned
    /// as [`RetryOutcome::Fatal`].
    ///
    /// # Arguments
    ///
    /// * `name` - Operation name used in logs and in `RetriesExhausted`
    /// * `operation` - Produces one attempt
    /// * `classify` - Decides whether a failed attempt may be retried
    /// * `recover` - Runs between attempts
    pub async fn execute<T, E, Op, OpFut, Cl, Rc, RcFut>(
        &self,
        name: &str,
        mut operation: Op,
        classify: Cl,
        mut recover: Rc,
    ) -> RetryOutcome<T, E>
    where
        E: Display,
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = Result<T, E>>,
        Cl: Fn(&E) -> Classification,
        Rc: FnMut() -> RcFut,
        RcFut: Future<Output = Result<(), E>>,
    {
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(error) => error,
            };

            if classify(&error) == Classification::Fatal {
                tracing::debug!("{} failed fatally on attempt {}: {}", name, attempt, error);
                return RetryOutcome::Fatal(error);
            }

            if attempt >= self.max_attempts {
                tracing::warn!(
                    "{} failed after {} attempts, giving up: {}",
                    name,
                    attempt,
                    error
                );
                return RetryOutcome::RetriesExhausted {
                    operation: name.to_string(),
                    attempts: attempt,
                    last_error: error,
                };
            }

            tracing::warn!(
                "{} failed on attempt {}/{}, recovering: {}",
                name,
                attempt,
                self.max_attempts,
                error
            );

            if let Err(recovery_error) = recover().await {
                tracing::error!("Recovery for {} failed: {}", name, recovery_error);
                return RetryOutcome::Fatal(recovery_error);
            }

            attempt += 1;
        }
    }
}
