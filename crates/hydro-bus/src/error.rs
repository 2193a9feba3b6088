use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BusError {
    /// Returned by a handler to refuse a message.  `publish` wraps it into
    /// [`BusError::Handler`] with the subscriber and topic attached.
    #[error("{0}")]
    Rejected(String),

    #[error("subscriber `{subscriber}` failed on `{topic}`: {reason}")]
    Handler { subscriber: String, topic: String, reason: String },

    #[error("subscriber `{subscriber}` is already handling a message; cannot deliver `{topic}`")]
    Reentrant { subscriber: String, topic: String },

    #[error("publish cascade on `{topic}` exceeded depth {limit}")]
    CascadeTooDeep { topic: String, limit: usize },
}

impl BusError {
    /// Convenience constructor for handlers.
    pub fn rejected(reason: impl Into<String>) -> Self {
        BusError::Rejected(reason.into())
    }
}

pub type BusResult<T> = Result<T, BusError>;
