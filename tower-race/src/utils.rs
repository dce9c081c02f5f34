use std::time::Duration;

use race_core::Engine;
use race_core::Submission;
use tower::BoxError;
use tower::Layer;
use tower::ServiceBuilder;
use tower::layer::util::Stack;
use tower::util::BoxCloneSyncService;

use crate::ManagedSubmitLayer;
use crate::Receipt;
use crate::SubmitService;
use crate::ValidateLayer;

/// Validated, error-mapped submission service with a single deadline covering both
/// the wait for queue room and the enqueue itself.
pub fn managed_submit_service(
    engine: &Engine,
    max_wait: Duration,
) -> BoxCloneSyncService<Submission, Receipt, BoxError> {
    ManagedSubmitLayer::new(max_wait).layer(SubmitService::new(engine).with_timeout(max_wait))
}

/// Service Builder Extension with additional useful functions for tower::ServiceBuilder.
pub trait ServiceBuilderExt<L> {
    /// Add submission validation
    fn validate_submissions(self) -> ServiceBuilder<Stack<ValidateLayer, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn validate_submissions(self) -> ServiceBuilder<Stack<ValidateLayer, L>> {
        self.layer(ValidateLayer)
    }
}
