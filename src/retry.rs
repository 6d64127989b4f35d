//! Support utilities for [`keen_retry`]'s retry API.
//!
//! We only ever retry the reader service, and only when it answers with too
//! little text. So every error here is either "try again" (transient) or
//! "give up now" (fatal), and the input is always `()`.

use keen_retry::RetryResult;

/// The [`RetryResult`] type used by the remote extraction attempts.
pub type AttemptResult<T, E> = RetryResult<(), (), T, E>;

/// On error, return a [`RetryResult::Fatal`] value.
macro_rules! try_fatal {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => {
                return ::keen_retry::RetryResult::Fatal {
                    input: (),
                    error: From::from(error),
                };
            }
        }
    };
}

// Export the macro within the crate as if it were a normal symbol.
pub(crate) use try_fatal;

/// Build an [`RetryResult::Ok`] value.
pub(crate) fn retry_result_ok<T, E>(output: T) -> AttemptResult<T, E> {
    RetryResult::Ok {
        reported_input: (),
        output,
    }
}

/// Build an [`RetryResult::Transient`] value.
pub(crate) fn retry_result_transient<T, E>(error: E) -> AttemptResult<T, E> {
    RetryResult::Transient { input: (), error }
}

/// Build an [`RetryResult::Fatal`] value.
pub(crate) fn retry_result_fatal<T, E>(error: E) -> AttemptResult<T, E> {
    RetryResult::Fatal { input: (), error }
}
