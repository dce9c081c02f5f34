use std::time::Duration;

use race_core::Submission;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::RaceError;
use crate::ValidateLayer;

/// A pre-composed ingress stack for submissions.
///
/// - **Validation (`RaceError::InvalidSubject`)**: non-positive subject ids are
///   rejected before the inner service sees them.
/// - **Timeout (`RaceError::Timeout`)**: the inner service's response future is
///   bounded by `max_wait`.
/// - **Error Mapping**: every error leaving the stack is a [`RaceError`].
///
/// Waiting for room in the queue happens in `poll_ready`, which `tower::timeout`
/// does not bound. Pair this layer with
/// [`SubmitService::with_timeout`](crate::SubmitService::with_timeout) for a
/// deadline on both phases, as [`managed_submit_service`](crate::managed_submit_service)
/// does.
#[derive(Clone, Debug)]
pub struct ManagedSubmitLayer {
    max_wait: Duration,
}

impl<S> Layer<S> for ManagedSubmitLayer
where
    S: Service<Submission, Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Response: 'static,
{
    type Service = BoxCloneSyncService<Submission, S::Response, BoxError>;

    fn layer(&self, inner: S) -> Self::Service {
        let svc = tower::ServiceBuilder::new()
            .map_err(|err: BoxError| BoxError::from(RaceError::from_box_error(err)))
            .layer(ValidateLayer)
            .timeout(self.max_wait)
            .service(inner);

        BoxCloneSyncService::new(svc)
    }
}

impl ManagedSubmitLayer {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }
}
