use crate::error::JobError;
use crate::models::{TransportError, TransportErrorKind};

/// Map a transport failure onto the job error taxonomy.
///
/// Timeouts and resolution failures are classified; everything else passes
/// through with its original message.
pub fn classify_transport(error: &TransportError) -> JobError {
    match error.kind {
        TransportErrorKind::Timeout => JobError::Timeout,
        TransportErrorKind::HostNotFound => JobError::HostNotFound,
        TransportErrorKind::Other => JobError::Transport(error.message.clone()),
    }
}

/// Map an HTTP status onto a `status-*` error, or `None` if the response is usable.
///
/// A response without a status cannot be trusted and yields `status-unknown`.
pub fn classify_status(status: Option<u16>) -> Option<JobError> {
    match status {
        Some(code) if code < 400 => None,
        other => Some(JobError::Status { status: other }),
    }
}
