use crate::Submission;

/// Reasons why a submission was not accepted into the ingress queue.
///
/// Both variants hand the rejected [`Submission`] back to the caller. A rejected
/// submission is never counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The queue is at capacity. Only returned by non-waiting submit paths.
    #[error("ingress queue is full")]
    Full(Submission),

    /// The engine has stopped and no longer accepts submissions.
    ///
    /// Producers that were waiting on a full queue when the engine stopped are
    /// released with this error.
    #[error("engine has stopped accepting submissions")]
    Stopped(Submission),
}

impl SubmitError {
    /// Recover the submission that was not accepted.
    pub fn into_inner(self) -> Submission {
        match self {
            Self::Full(submission) | Self::Stopped(submission) => submission,
        }
    }
}

/// Errors starting the evaluation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("evaluation loop has already been started")]
    AlreadyStarted,
}
