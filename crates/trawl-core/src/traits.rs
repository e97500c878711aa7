use std::future::Future;

use crate::models::{RawResponse, TransportError};
use crate::request::TransportRequest;

/// Performs the HTTP call for a job.
///
/// Implementations forward every option of the [`TransportRequest`] (method,
/// headers, timeout, auth, payload) and report failures with a
/// [`TransportErrorKind`](crate::models::TransportErrorKind) so the engine can
/// classify them. HTTP error statuses are *not* transport errors.
pub trait Transport: Send + Sync + Clone {
    fn send(
        &self,
        request: &TransportRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}
