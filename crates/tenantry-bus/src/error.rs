use thiserror::Error;

/// Why a subscription returned without a notification
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// The subscriber fell behind and this many notifications were dropped.
    /// The next receive resumes at the oldest one still buffered.
    #[error("Subscriber lagged, {0} notifications dropped")]
    Lagged(u64),

    #[error("Notification bridge closed")]
    Closed,
}
