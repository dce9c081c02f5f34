use race_core::SubmitError;
use tower::BoxError;

/// Errors produced by the Tower Race middleware stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RaceError {
    /// The submission carried a subject id that is not a positive integer.
    ///
    /// When the `axum` feature is enabled, this converts to `400 Bad Request`.
    #[error("user_id must be positive, got {0}")]
    InvalidSubject(i64),

    /// The engine has stopped and no longer accepts submissions.
    ///
    /// When the `axum` feature is enabled, this converts to `503 Service Unavailable`.
    #[error("Engine has stopped accepting submissions")]
    Stopped,

    /// The ingress queue was full and a non-waiting submit path was used.
    ///
    /// When the `axum` feature is enabled, this converts to `503 Service Unavailable`.
    #[error("Ingress queue is full")]
    Overloaded,

    /// The submission waited longer than allowed for room in the ingress queue.
    ///
    /// When the `axum` feature is enabled, this converts to `408 Request Timeout`.
    #[error("Request timed out waiting for queue capacity")]
    Timeout,

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

impl RaceError {
    /// Fold any error raised by a Tower stack into the `RaceError` domain.
    pub fn from_box_error(err: BoxError) -> Self {
        if err.is::<tower::timeout::error::Elapsed>() {
            Self::Timeout
        } else if let Some(race_err) = err.downcast_ref::<RaceError>() {
            race_err.clone()
        } else if let Some(submit_err) = err.downcast_ref::<SubmitError>() {
            Self::from(*submit_err)
        } else {
            Self::Inner(err.to_string())
        }
    }
}

impl From<SubmitError> for RaceError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Full(_) => Self::Overloaded,
            SubmitError::Stopped(_) => Self::Stopped,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for RaceError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            Self::InvalidSubject(_) => StatusCode::BAD_REQUEST,
            Self::Stopped | Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Inner(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
