use thiserror::Error;

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Errors raised by the scheduling engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// An argument outside the function's domain, e.g. negative elapsed days.
    #[error("invalid argument `{name}` = {value}: {reason}")]
    InvalidArgument {
        name: &'static str,
        value: i64,
        reason: &'static str,
    },

    /// A document whose fields cannot be classified.
    #[error("malformed document {document_id}: {reason}")]
    MalformedInput { document_id: String, reason: String },
}

impl ScheduleError {
    pub fn malformed(document_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ScheduleError::MalformedInput {
            document_id: document_id.into(),
            reason: reason.into(),
        }
    }
}
