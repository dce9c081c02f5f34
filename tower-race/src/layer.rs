use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use pin_project_lite::pin_project;
use race_core::Submission;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;
use tower::util::Oneshot;

use crate::error::RaceError;

/// Rejects submissions whose subject id is not a positive integer.
///
/// The engine itself accepts any identifier; this is where ingress rules live.
///
/// The service is always ready. Readiness of the inner service is only awaited for
/// submissions that pass validation, so a rejected request never holds a queue slot
/// and is never delayed by backpressure.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidateLayer;

impl<S> Layer<S> for ValidateLayer {
    type Service = ValidateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidateService { inner }
    }
}

#[derive(Clone, Debug)]
pub struct ValidateService<S> {
    inner: S,
}

// Either an immediate rejection or the inner service, driven to readiness and called.
pin_project! {
    #[project = ValidateFutureProj]
    pub enum ValidateFuture<S: Service<Submission>> {
        Rejected { error: RaceError },
        Forwarded {
            #[pin]
            inner: Oneshot<S, Submission>,
        },
    }
}

impl<S> Future for ValidateFuture<S>
where
    S: Service<Submission, Error = BoxError>,
{
    type Output = Result<S::Response, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ValidateFutureProj::Rejected { error } => Poll::Ready(Err(Box::new(error.clone()))),
            ValidateFutureProj::Forwarded { inner } => inner.poll(cx),
        }
    }
}

impl<S> Service<Submission> for ValidateService<S>
where
    S: Service<Submission, Error = BoxError> + Clone,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ValidateFuture<S>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, submission: Submission) -> Self::Future {
        if submission.subject_id <= 0 {
            return ValidateFuture::Rejected {
                error: RaceError::InvalidSubject(submission.subject_id),
            };
        }
        ValidateFuture::Forwarded {
            inner: self.inner.clone().oneshot(submission),
        }
    }
}
